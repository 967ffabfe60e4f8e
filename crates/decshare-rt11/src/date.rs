//! RT-11 date words.
//!
//! ```text
//! 15 14 | 13 .. 10 | 9 .. 5 | 4 .. 0
//!  age  |  month   |  day   | year - 1972 (mod 32)
//! ```
//!
//! The year is `1972 + (year bits) + 32 * age`.

use chrono::{Datelike, NaiveDate};

const BASE_YEAR: i32 = 1972;
const MAX_YEAR: i32 = BASE_YEAR + 127;

/// Date used for a zero date word.
#[must_use]
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(BASE_YEAR, 1, 1).unwrap_or_default()
}

/// Decode a date word. A zero word is the epoch; a word naming an impossible
/// calendar date yields `None`.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // masked fields, the year stays below 2100
pub fn decode(word: u16) -> Option<NaiveDate> {
    if word == 0 {
        return Some(epoch());
    }
    let age = i32::from(word >> 14);
    let month = u32::from((word >> 10) & 0o17);
    let day = u32::from((word >> 5) & 0o37);
    let year = BASE_YEAR + i32::from(word & 0o37) + 32 * age;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Encode a date. Years outside 1972..=2099 are clamped to the range.
#[must_use]
#[allow(clippy::arithmetic_side_effects)] // the year is clamped to seven bits first
pub fn encode(date: NaiveDate) -> u16 {
    let offset = date.year().clamp(BASE_YEAR, MAX_YEAR) - BASE_YEAR;
    let offset = u16::try_from(offset).unwrap_or(0);
    let month = u16::try_from(date.month()).unwrap_or(1);
    let day = u16::try_from(date.day()).unwrap_or(1);
    ((offset / 32) << 14) | (month << 10) | (day << 5) | (offset % 32)
}
