//! ISO-8601 week validation.
//!
//! Week specifiers look like `2018-W05`: four-digit ISO year, literal
//! `-W`, two-digit week number. Beyond the shape, the week must actually
//! exist — `W53` is only valid in years that have 53 ISO weeks.

use std::fmt;

use chrono::{NaiveDate, Weekday};

use crate::error::InvalidWeek;

/// A validated ISO-8601 week specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekId {
    year: i32,
    week: u32,
}

impl WeekId {
    /// Parse and validate a `YYYY-Wnn` week specifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidWeek`] if the input does not match the pattern
    /// or names a week the ISO year does not contain.
    pub fn parse(raw: &str) -> Result<Self, InvalidWeek> {
        let bad = || InvalidWeek(raw.to_string());

        let bytes = raw.as_bytes();
        if bytes.len() != 8 || bytes[4] != b'-' || bytes[5] != b'W' {
            return Err(bad());
        }

        if !bytes[..4].iter().all(u8::is_ascii_digit)
            || !bytes[6..].iter().all(u8::is_ascii_digit)
        {
            return Err(bad());
        }
        let year: i32 = raw[..4].parse().map_err(|_| bad())?;
        let week: u32 = raw[6..].parse().map_err(|_| bad())?;

        // chrono rejects week 0 and weeks past the year's last ISO week.
        if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_none() {
            return Err(bad());
        }

        Ok(Self { year, week })
    }

    #[must_use]
    pub fn year(&self) -> i32 {
        self.year
    }

    #[must_use]
    pub fn week(&self) -> u32 {
        self.week
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.year, self.week)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_a_well_formed_week() {
        let id = WeekId::parse("2018-W05").unwrap();
        assert_eq!(id.year(), 2018);
        assert_eq!(id.week(), 5);
        assert_eq!(id.to_string(), "2018-W05");
    }

    #[test]
    fn rejects_calendar_dates() {
        assert!(WeekId::parse("2018-02-15").is_err());
    }

    #[test]
    fn rejects_week_zero() {
        assert!(WeekId::parse("2018-W00").is_err());
    }

    #[test]
    fn rejects_single_digit_weeks() {
        // The pattern requires two digits.
        assert!(WeekId::parse("2018-W5").is_err());
    }

    #[test]
    fn rejects_lowercase_w() {
        assert!(WeekId::parse("2018-w05").is_err());
    }

    #[test]
    fn week_53_exists_only_in_long_years() {
        // 2020 has 53 ISO weeks, 2021 does not.
        assert!(WeekId::parse("2020-W53").is_ok());
        assert!(WeekId::parse("2021-W53").is_err());
    }

    #[test]
    fn rejects_week_54_everywhere() {
        assert!(WeekId::parse("2020-W54").is_err());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(WeekId::parse("").is_err());
        assert!(WeekId::parse("W05").is_err());
        assert!(WeekId::parse("2018W05").is_err());
        assert!(WeekId::parse("2018-Wxx").is_err());
    }

    proptest! {
        #[test]
        fn parse_never_panics(raw in "\\PC{0,12}") {
            let _ = WeekId::parse(&raw);
        }

        #[test]
        fn valid_weeks_round_trip_through_display(year in 1000i32..=9999, week in 1u32..=52) {
            let raw = format!("{year:04}-W{week:02}");
            let id = WeekId::parse(&raw).unwrap();
            prop_assert_eq!(id.to_string(), raw);
        }
    }
}
