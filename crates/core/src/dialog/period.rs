//! Report periods and strict date parsing for free-text entry.

use chrono::{Datelike, Months, NaiveDate};

use crate::domain::event::DateWindow;
use crate::errors::DomainError;

pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEAR: i32 = 2100;

/// Period choice carried by a `period:` button.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportPeriod {
    SpecificMonth,
    SpecificYear,
    LastMonths(u32),
}

impl ReportPeriod {
    pub const RELATIVE_MONTHS: [u32; 4] = [2, 3, 6, 12];

    pub fn from_payload(value: &str) -> Option<Self> {
        match value {
            "month" => Some(Self::SpecificMonth),
            "year" => Some(Self::SpecificYear),
            other => {
                let months = other.strip_prefix("last")?.parse::<u32>().ok()?;
                Self::RELATIVE_MONTHS.contains(&months).then_some(Self::LastMonths(months))
            }
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Self::SpecificMonth => "month".to_owned(),
            Self::SpecificYear => "year".to_owned(),
            Self::LastMonths(months) => format!("last{months}"),
        }
    }
}

/// A resolved window together with the label shown in the report header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPeriod {
    pub window: DateWindow,
    pub label: String,
}

/// `today - months` through `today`. Month arithmetic clamps to the end of
/// shorter months, so 31 March minus one month is 29 or 28 February.
pub fn last_months(today: NaiveDate, months: u32) -> ResolvedPeriod {
    let start = today.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN);
    ResolvedPeriod { window: DateWindow::new(start, today), label: format!("Last {months} months") }
}

/// Parses exactly `YYYY-MM-DD`.
pub fn parse_exact_date(text: &str) -> Result<NaiveDate, DomainError> {
    let invalid = || DomainError::InvalidInput(format!("expected YYYY-MM-DD, got `{text}`"));
    let bytes = text.as_bytes();
    if !text.is_ascii() || bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(invalid());
    }
    let year = digits(&text[0..4]).ok_or_else(invalid)?;
    let month = digits(&text[5..7]).ok_or_else(invalid)?;
    let day = digits(&text[8..10]).ok_or_else(invalid)?;
    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or_else(invalid)
}

/// Parses exactly `YYYY-MM` into the first through last day of that month.
pub fn parse_month(text: &str) -> Result<ResolvedPeriod, DomainError> {
    let invalid = || DomainError::InvalidInput(format!("expected YYYY-MM, got `{text}`"));
    let bytes = text.as_bytes();
    if !text.is_ascii() || bytes.len() != 7 || bytes[4] != b'-' {
        return Err(invalid());
    }
    let year = digits(&text[0..4]).ok_or_else(invalid)? as i32;
    let month = digits(&text[5..7]).ok_or_else(invalid)?;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(invalid());
    }

    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(invalid)?;
    Ok(ResolvedPeriod {
        window: DateWindow::new(start, end),
        label: start.format("%B %Y").to_string(),
    })
}

/// Parses exactly `YYYY` within the supported year range.
pub fn parse_year(text: &str) -> Result<ResolvedPeriod, DomainError> {
    let invalid = || {
        DomainError::InvalidInput(format!("expected a year between {MIN_YEAR} and {MAX_YEAR}, got `{text}`"))
    };
    if text.len() != 4 {
        return Err(invalid());
    }
    let year = digits(text).ok_or_else(invalid)? as i32;
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(invalid());
    }

    let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
    let end = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid)?;
    debug_assert_eq!(start.year(), end.year());
    Ok(ResolvedPeriod { window: DateWindow::new(start, end), label: format!("Year {year}") })
}

fn digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{last_months, parse_exact_date, parse_month, parse_year, ReportPeriod};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn period_payloads_cover_fixed_windows_only() {
        assert_eq!(ReportPeriod::from_payload("month"), Some(ReportPeriod::SpecificMonth));
        assert_eq!(ReportPeriod::from_payload("year"), Some(ReportPeriod::SpecificYear));
        assert_eq!(ReportPeriod::from_payload("last6"), Some(ReportPeriod::LastMonths(6)));
        assert_eq!(ReportPeriod::from_payload("last5"), None);
        assert_eq!(ReportPeriod::from_payload("last"), None);
        assert_eq!(ReportPeriod::from_payload("week"), None);
    }

    #[test]
    fn exact_date_accepts_only_full_pattern() {
        assert_eq!(parse_exact_date("2024-02-29"), Ok(date(2024, 2, 29)));
        assert!(parse_exact_date("2023-02-29").is_err());
        assert!(parse_exact_date("2024-2-29").is_err());
        assert!(parse_exact_date("2024-02-29 ").is_err());
        assert!(parse_exact_date("+024-02-29").is_err());
        assert!(parse_exact_date("29.02.2024").is_err());
    }

    #[test]
    fn month_window_spans_first_to_last_day() {
        let period = parse_month("2024-02").expect("valid month");
        assert_eq!(period.window.start, date(2024, 2, 1));
        assert_eq!(period.window.end, date(2024, 2, 29));
        assert_eq!(period.label, "February 2024");

        let december = parse_month("2023-12").expect("valid month");
        assert_eq!(december.window.end, date(2023, 12, 31));
    }

    #[test]
    fn month_rejects_partial_or_named_input() {
        for text in ["2024-13", "2024-1", "2024", "Nov 2024", "2024-11-01", "1800-01", "202é-01"] {
            assert!(parse_month(text).is_err(), "{text} should be rejected");
        }
    }

    #[test]
    fn year_is_bounded() {
        let period = parse_year("2024").expect("valid year");
        assert_eq!(period.window.start, date(2024, 1, 1));
        assert_eq!(period.window.end, date(2024, 12, 31));
        assert_eq!(period.label, "Year 2024");

        assert!(parse_year("1899").is_err());
        assert!(parse_year("2101").is_err());
        assert!(parse_year("24").is_err());
        assert!(parse_year("-2024").is_err());
    }

    #[test]
    fn relative_window_ends_today() {
        let period = last_months(date(2024, 3, 31), 1);
        assert_eq!(period.window.start, date(2024, 2, 29));
        assert_eq!(period.window.end, date(2024, 3, 31));

        let year = last_months(date(2024, 6, 15), 12);
        assert_eq!(year.window.start, date(2023, 6, 15));
        assert_eq!(year.label, "Last 12 months");
    }
}
