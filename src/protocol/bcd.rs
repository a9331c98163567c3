//! Packed-BCD arithmetic and date conversions.
//!
//! Controller firmware stores all clock and version fields as packed BCD:
//! one byte holds two decimal digits. The conversions here use the
//! arithmetic identities `encode(d) = d + d/10*6` and
//! `decode(b) = b - b/16*6`, which are exact inverses on `0..=99`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::PacketError;

/// Encode a two-digit decimal value as a packed-BCD byte.
pub fn encode(d: u16) -> Result<u8, PacketError> {
    if d > 99 {
        return Err(PacketError::BcdDigit(d));
    }
    Ok((d + d / 10 * 6) as u8)
}

/// Decode a packed-BCD byte to its decimal value.
///
/// Total on all byte values; callers that need strict validation should
/// check [`is_bcd`] first.
pub fn decode(b: u8) -> u8 {
    b - (b >> 4) * 6
}

/// True if both nibbles are decimal digits.
pub fn is_bcd(b: u8) -> bool {
    (b >> 4) <= 9 && (b & 0x0F) <= 9
}

fn decode_strict(b: u8) -> Result<u8, PacketError> {
    if !is_bcd(b) {
        return Err(PacketError::BcdDate(format!("invalid BCD byte {:#04X}", b)));
    }
    Ok(decode(b))
}

/// Convert a date/time to the 7-byte wire form
/// `century year month day hour minute second`, each BCD encoded.
pub fn datetime_to_bcd(dt: &NaiveDateTime) -> Result<[u8; 7], PacketError> {
    let year = dt.year();
    if !(0..=9999).contains(&year) {
        return Err(PacketError::BcdDate(format!(
            "year {} outside representable range 0..=9999",
            year
        )));
    }
    Ok([
        encode((year / 100) as u16)?,
        encode((year % 100) as u16)?,
        encode(dt.month() as u16)?,
        encode(dt.day() as u16)?,
        encode(dt.hour() as u16)?,
        encode(dt.minute() as u16)?,
        encode(dt.second() as u16)?,
    ])
}

/// Convert a 7-byte BCD wire field back to a date/time.
pub fn bcd_to_datetime(fields: &[u8; 7]) -> Result<NaiveDateTime, PacketError> {
    let century = decode_strict(fields[0])? as i32;
    let year = decode_strict(fields[1])? as i32;
    let month = decode_strict(fields[2])? as u32;
    let day = decode_strict(fields[3])? as u32;
    let hour = decode_strict(fields[4])? as u32;
    let minute = decode_strict(fields[5])? as u32;
    let second = decode_strict(fields[6])? as u32;

    NaiveDate::from_ymd_opt(century * 100 + year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(|| {
            PacketError::BcdDate(format!(
                "{:02}{:02}-{:02}-{:02} {:02}:{:02}:{:02} is not a valid date/time",
                century, year, month, day, hour, minute, second
            ))
        })
}

/// Convert a 4-byte BCD `yyyymmdd` wire field to a date.
pub fn bcd_to_date(fields: &[u8; 4]) -> Result<NaiveDate, PacketError> {
    let century = decode_strict(fields[0])? as i32;
    let year = decode_strict(fields[1])? as i32;
    let month = decode_strict(fields[2])? as u32;
    let day = decode_strict(fields[3])? as u32;

    NaiveDate::from_ymd_opt(century * 100 + year, month, day).ok_or_else(|| {
        PacketError::BcdDate(format!(
            "{:02}{:02}-{:02}-{:02} is not a valid date",
            century, year, month, day
        ))
    })
}

/// Convert a date to the 4-byte BCD `yyyymmdd` wire form.
pub fn date_to_bcd(date: &NaiveDate) -> Result<[u8; 4], PacketError> {
    let year = date.year();
    if !(0..=9999).contains(&year) {
        return Err(PacketError::BcdDate(format!(
            "year {} outside representable range 0..=9999",
            year
        )));
    }
    Ok([
        encode((year / 100) as u16)?,
        encode((year % 100) as u16)?,
        encode(date.month() as u16)?,
        encode(date.day() as u16)?,
    ])
}

/// Format a 2-byte BCD driver version field as "major.minor".
///
/// Byte order (first byte = major) is pinned here and in the tests below;
/// some firmware revisions have been reported with the bytes swapped, so
/// this mapping still needs verification against real hardware.
pub fn version_string(version: [u8; 2]) -> String {
    format!("{}.{:02}", decode(version[0]), decode(version[1]))
}
