//! Parsing and formatting of seek positions.
//!
//! Two spellings are accepted:
//! - clock form, `[hh:]mm:ss[.ffffff]`
//! - an integer with an optional unit suffix, e.g. `1500ms`, `90s`, `2m`;
//!   without a suffix the value is in microseconds
//!
//! Everything resolves to a microsecond count.

use thiserror::Error;

const US: u64 = 1;
const MS: u64 = 1_000;
const S: u64 = 1_000_000;
const M: u64 = 60 * S;
const H: u64 = 60 * M;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("empty time")]
    Empty,
    #[error("negative times are not allowed")]
    Negative,
    #[error("invalid time '{0}': try integer[unit] or hh:mm:ss")]
    Malformed(String),
    #[error("invalid time unit '{0}': try us, ms, s, m, h")]
    UnknownUnit(String),
    #[error("time is out of range")]
    OutOfRange,
}

/// Parse a time string into microseconds.
pub fn parse_micros(input: &str) -> Result<u64, TimeError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(TimeError::Empty);
    }
    if s.starts_with('-') {
        return Err(TimeError::Negative);
    }
    if s.contains(':') {
        parse_clock(s)
    } else {
        parse_with_unit(s)
    }
}

/// Render microseconds as `HH:MM:SS.ffffff`; [`parse_micros`] reads it back exactly.
pub fn format_micros(micros: u64) -> String {
    let hours = micros / H;
    let minutes = (micros % H) / M;
    let seconds = (micros % M) / S;
    let frac = micros % S;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{frac:06}")
}

fn parse_clock(s: &str) -> Result<u64, TimeError> {
    let malformed = || TimeError::Malformed(s.to_string());

    let parts: Vec<&str> = s.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, sec] => ("0", *m, *sec),
        [h, m, sec] => (*h, *m, *sec),
        _ => return Err(malformed()),
    };

    let (whole, frac) = match seconds.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (seconds, None),
    };

    let hours = digits(hours).ok_or_else(malformed)?;
    let minutes = digits(minutes).ok_or_else(malformed)?;
    let whole = digits(whole).ok_or_else(malformed)?;
    let frac_us = match frac {
        Some(f) if !f.is_empty() && f.len() <= 6 => {
            let value = digits(f).ok_or_else(malformed)?;
            value * 10u64.pow(6 - f.len() as u32)
        }
        Some(_) => return Err(malformed()),
        None => 0,
    };

    if whole >= 60 || (parts.len() == 3 && minutes >= 60) {
        return Err(TimeError::OutOfRange);
    }

    hours
        .checked_mul(H)
        .and_then(|t| t.checked_add(minutes.checked_mul(M)?))
        .and_then(|t| t.checked_add(whole * S))
        .and_then(|t| t.checked_add(frac_us))
        .ok_or(TimeError::OutOfRange)
}

fn parse_with_unit(s: &str) -> Result<u64, TimeError> {
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    if number.is_empty() {
        return Err(TimeError::Malformed(s.to_string()));
    }
    let value: u64 = number.parse().map_err(|_| TimeError::OutOfRange)?;
    value
        .checked_mul(unit_multiplier(unit.trim_start())?)
        .ok_or(TimeError::OutOfRange)
}

fn unit_multiplier(unit: &str) -> Result<u64, TimeError> {
    let multiplier = match unit {
        "" | "us" | "usec" | "usecs" => US,
        "ms" | "msec" | "msecs" => MS,
        "s" | "sec" | "secs" => S,
        "m" | "min" | "mins" => M,
        "h" | "hour" | "hours" => H,
        other => return Err(TimeError::UnknownUnit(other.to_string())),
    };
    Ok(multiplier)
}

/// Parse a non-empty run of ASCII digits.
fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bare_number_is_microseconds() {
        assert_eq!(parse_micros("1234"), Ok(1234));
        assert_eq!(parse_micros("1234us"), Ok(1234));
    }

    #[test]
    fn unit_suffixes_scale() {
        assert_eq!(parse_micros("1234ms"), Ok(1_234_000));
        assert_eq!(parse_micros("1234s"), Ok(1_234_000_000));
        assert_eq!(parse_micros("2m"), Ok(120_000_000));
        assert_eq!(parse_micros("1h"), Ok(3_600_000_000));
        assert_eq!(parse_micros("10 secs"), Ok(10_000_000));
    }

    #[test]
    fn clock_forms() {
        assert_eq!(parse_micros("00:00:10"), Ok(10_000_000));
        assert_eq!(parse_micros("01:00:00"), Ok(3_600_000_000));
        assert_eq!(parse_micros("1:30"), Ok(90_000_000));
        assert_eq!(parse_micros("00:00:01.5"), Ok(1_500_000));
        assert_eq!(parse_micros("00:00:01.000001"), Ok(1_000_001));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_micros(""), Err(TimeError::Empty));
        assert_eq!(parse_micros("-5s"), Err(TimeError::Negative));
        assert_eq!(
            parse_micros("10parsecs"),
            Err(TimeError::UnknownUnit("parsecs".to_string()))
        );
        assert!(matches!(parse_micros("s"), Err(TimeError::Malformed(_))));
        assert!(matches!(parse_micros("aa:bb"), Err(TimeError::Malformed(_))));
        assert!(matches!(parse_micros("1:2:3:4"), Err(TimeError::Malformed(_))));
        assert!(matches!(parse_micros("00:00:01."), Err(TimeError::Malformed(_))));
        assert!(matches!(parse_micros("00:00:01.1234567"), Err(TimeError::Malformed(_))));
        assert_eq!(parse_micros("00:61:00"), Err(TimeError::OutOfRange));
        assert_eq!(parse_micros("00:00:60"), Err(TimeError::OutOfRange));
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(parse_micros("99999999999999999999"), Err(TimeError::OutOfRange));
        assert_eq!(parse_micros("18446744073709551615h"), Err(TimeError::OutOfRange));
        assert_eq!(
            parse_micros("99999999999999:00:00"),
            Err(TimeError::OutOfRange)
        );
    }

    #[test]
    fn formats_clock() {
        assert_eq!(format_micros(0), "00:00:00.000000");
        assert_eq!(format_micros(10_000_000), "00:00:10.000000");
        assert_eq!(format_micros(3_723_000_042), "01:02:03.000042");
    }

    #[test]
    fn max_value_round_trips() {
        assert_eq!(parse_micros(&format_micros(u64::MAX)), Ok(u64::MAX));
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(us in any::<u64>()) {
            prop_assert_eq!(parse_micros(&format_micros(us)), Ok(us));
        }
    }
}
