//! UDP transport exercised against a fake device on the loopback
//! interface. The device port is ephemeral so runs cannot collide.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::net::UdpSocket;

use panlink::protocol::{encode, Packet, FUNC_GET_TIME};
use panlink::transport::{Transport, UdpTransport};

const SERIAL: u32 = 423187757;

/// Bind a loopback socket and answer the first request with `replies`
/// frames, optionally preceded by a garbage datagram.
async fn spawn_fake_device(replies: usize, garbage: bool) -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 128];
        let (len, addr) = socket.recv_from(&mut buf).await.unwrap();
        let request = Packet::decode(&buf[..len]).unwrap();
        if garbage {
            socket.send_to(&[0x17, 0x00, 0xFF], addr).await.unwrap();
        }
        for i in 0..replies {
            let frame = encode(request.function_id, SERIAL + i as u32, &[]).unwrap();
            socket.send_to(&frame, addr).await.unwrap();
        }
    });
    port
}

#[tokio::test]
async fn test_send_and_receive_roundtrip() {
    let port = spawn_fake_device(1, false).await;
    let transport = UdpTransport { device_port: port };

    let frame = encode(FUNC_GET_TIME, SERIAL, &[]).unwrap();
    let reply = transport
        .send_and_receive(&frame, Ipv4Addr::LOCALHOST, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(reply.packet.function_id, FUNC_GET_TIME);
    assert_eq!(reply.packet.serial_number, SERIAL);
    assert_eq!(reply.remote.ip(), &Ipv4Addr::LOCALHOST);
}

#[tokio::test]
async fn test_send_and_receive_skips_malformed_datagrams() {
    let port = spawn_fake_device(1, true).await;
    let transport = UdpTransport { device_port: port };

    let frame = encode(FUNC_GET_TIME, SERIAL, &[]).unwrap();
    let reply = transport
        .send_and_receive(&frame, Ipv4Addr::LOCALHOST, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(reply.packet.serial_number, SERIAL);
}

#[tokio::test]
async fn test_send_and_receive_times_out() {
    // Device that never answers
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let transport = UdpTransport { device_port: port };

    let frame = encode(FUNC_GET_TIME, SERIAL, &[]).unwrap();
    let result = transport
        .send_and_receive(&frame, Ipv4Addr::LOCALHOST, Duration::from_millis(200))
        .await;
    assert!(matches!(result, Err(panlink::LinkError::Timeout)));
}

#[tokio::test]
async fn test_broadcast_and_collect_gathers_every_reply() {
    let port = spawn_fake_device(2, true).await;
    let transport = UdpTransport { device_port: port };

    let frame = encode(FUNC_GET_TIME, 0, &[]).unwrap();
    let replies = transport
        .broadcast_and_collect(
            &frame,
            &[Ipv4Addr::LOCALHOST],
            Duration::from_millis(500),
        )
        .await
        .unwrap();

    // The garbage datagram is dropped, both frames survive
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].packet.serial_number, SERIAL);
    assert_eq!(replies[1].packet.serial_number, SERIAL + 1);
}
