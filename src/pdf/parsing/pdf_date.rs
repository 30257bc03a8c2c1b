//! PDF date strings
//!
//! Document information dates look like `D:YYYYMMDDHHmmSSOHH'mm'`, where
//! everything after the year is optional and `O` is `+`, `-` or `Z`.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use regex::Regex;

static PDF_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:D:)?(\d{4})(\d{2})?(\d{2})?(\d{2})?(\d{2})?(\d{2})?(?:([+\-Zz])(?:(\d{2})'?(?:(\d{2})'?)?)?)?$",
    )
    .expect("PDF date pattern is valid")
});

/// Parse a PDF date string
#[must_use]
pub fn parse_pdf_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let caps = PDF_DATE_RE.captures(raw.trim())?;
    let num = |i: usize, default: u32| -> Option<u32> {
        caps.get(i).map_or(Some(default), |m| m.as_str().parse().ok())
    };

    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month = num(2, 1)?;
    let day = num(3, 1)?;
    let hour = num(4, 0)?;
    let minute = num(5, 0)?;
    let second = num(6, 0)?;

    let offset_secs = match caps.get(7).map(|m| m.as_str()) {
        Some("+") | Some("-") => {
            let hours = i32::try_from(num(8, 0)?).ok()?;
            let minutes = i32::try_from(num(9, 0)?).ok()?;
            let secs = hours * 3600 + minutes * 60;
            if caps.get(7).map(|m| m.as_str()) == Some("-") {
                -secs
            } else {
                secs
            }
        }
        _ => 0,
    };

    let offset = FixedOffset::east_opt(offset_secs)?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&naive).single()
}

/// RFC 3339 form of a PDF date, or the input unchanged if it does not parse
#[must_use]
pub fn normalize_pdf_date(raw: &str) -> String {
    parse_pdf_date(raw).map_or_else(|| raw.to_string(), |date| date.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_date_with_offset() {
        assert_eq!(
            normalize_pdf_date("D:20230415120530+02'00'"),
            "2023-04-15T12:05:30+02:00"
        );
    }

    #[test]
    fn negative_offset_and_no_trailing_quote() {
        assert_eq!(
            normalize_pdf_date("D:19991231235959-05'30"),
            "1999-12-31T23:59:59-05:30"
        );
    }

    #[test]
    fn utc_and_partial_dates() {
        assert_eq!(normalize_pdf_date("D:20200101000000Z"), "2020-01-01T00:00:00+00:00");
        assert_eq!(normalize_pdf_date("D:2021"), "2021-01-01T00:00:00+00:00");
        assert_eq!(normalize_pdf_date("202106"), "2021-06-01T00:00:00+00:00");
    }

    #[test]
    fn unparseable_values_pass_through() {
        assert_eq!(normalize_pdf_date(""), "");
        assert_eq!(normalize_pdf_date("yesterday"), "yesterday");
        assert_eq!(normalize_pdf_date("D:20231345"), "D:20231345");
    }
}
