use chrono::NaiveDate;

/// Formats accepted after the compact `YYYYMMDD` form, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"];

/// Parse a date as written by Tally exports.
///
/// Tries compact numeric `YYYYMMDD`, then ISO `YYYY-MM-DD`, `DD-MM-YYYY` and
/// `DD/MM/YYYY`. The first format that parses wins. Surrounding whitespace is
/// ignored.
pub fn parse_tally_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = raw[0..4].parse().ok()?;
        let month: u32 = raw[4..6].parse().ok()?;
        let day: u32 = raw[6..8].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn compact_numeric() {
        assert_eq!(parse_tally_date("20240115"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn iso() {
        assert_eq!(parse_tally_date("2024-01-15"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn day_first_dash_and_slash() {
        assert_eq!(parse_tally_date("15-01-2024"), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_tally_date("15/01/2024"), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert_eq!(parse_tally_date("  20240115  "), Some(ymd(2024, 1, 15)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_tally_date("not-a-date"), None);
        assert_eq!(parse_tally_date(""), None);
        // Eight digits but month 13
        assert_eq!(parse_tally_date("20241301"), None);
    }
}
