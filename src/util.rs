/*!
Miscellaneous utilities for `stockgan`
*/

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Whether a date falls on a weekday, i.e. could be a trading day
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The date `years` calendar years before `date`, clamped to the 28th for February 29th
pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    let year = date.year() - years as i32;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}

/// The date `days` calendar days before `date`
pub fn days_before(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_signed(Duration::days(days as i64))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekdays() {
        // 2024-06-08 was a Saturday
        let saturday = NaiveDate::from_ymd_opt(2024, 6, 8).unwrap();
        assert!(!is_weekday(saturday));
        assert!(!is_weekday(saturday.succ_opt().unwrap()));
        assert!(is_weekday(saturday.pred_opt().unwrap()));
    }

    #[test]
    fn date_arithmetic() {
        let leap = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            years_before(leap, 14),
            NaiveDate::from_ymd_opt(2010, 2, 28).unwrap()
        );
        assert_eq!(
            days_before(leap, 100),
            NaiveDate::from_ymd_opt(2023, 11, 21).unwrap()
        );
    }
}
