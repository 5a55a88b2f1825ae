// Date Resolver.
//
// A date column can hold spreadsheet serials, YYYY-MM-DD strings, DD/MM/YYYY
// strings and "not happened yet" placeholders side by side, depending on how
// each row got into the file. The cell's shape picks the parse path; every
// failure ends up as a classification, never a panic or an error.
use crate::types::{CellValue, DateClass, DateField, ResolvedDate};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Serial of 1970-01-01, which always means "event has not happened".
pub const PLACEHOLDER_SERIAL: f64 = 25569.0;

/// Serial of 9999-12-31; anything larger cannot be a calendar date.
const MAX_SERIAL: f64 = 2_958_465.0;

const NULL_MARKERS: [&str; 9] = [
    "nan", "none", "\"\"", "nat", "<na>", "null", "n/a", "#n/a", "#value!",
];

const PLACEHOLDER_SPELLINGS: [&str; 6] = [
    "1970-01-01",
    "1970-1-1",
    "01/01/1970",
    "1/1/1970",
    "01-01-1970",
    "1-1-1970",
];

fn serial_epoch() -> NaiveDateTime {
    // 1899-12-30 absorbs the spreadsheet 1900 leap-year bug, so every serial
    // from 61 (1900-03-01) on lines up with what spreadsheet software shows.
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

fn placeholder_date() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
}

/// Resolve one raw cell into a calendar date or a reason why not.
pub fn resolve(raw: &CellValue, field: DateField) -> ResolvedDate {
    match raw {
        CellValue::Empty => ResolvedDate::rejected(DateClass::NullInput),
        CellValue::Number(n) => resolve_serial(*n, field),
        CellValue::DateTime(dt) => {
            if Some(dt.date()) == placeholder_date() {
                return ResolvedDate::rejected(DateClass::PlaceholderSentinel);
            }
            resolve_serial(datetime_to_serial(*dt), field)
        }
        CellValue::Text(s) => resolve_text(s, field),
    }
}

/// Spreadsheet serial for a date/time, counted from 1899-12-30.
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    let delta = dt - serial_epoch();
    delta.num_seconds() as f64 / 86_400.0
}

fn resolve_serial(serial: f64, field: DateField) -> ResolvedDate {
    if !serial.is_finite() {
        return ResolvedDate::rejected(DateClass::Unparseable);
    }
    if serial == 0.0 || serial == PLACEHOLDER_SERIAL {
        return ResolvedDate::rejected(DateClass::PlaceholderSentinel);
    }
    if serial <= PLACEHOLDER_SERIAL || serial > MAX_SERIAL {
        return ResolvedDate::rejected(DateClass::Unparseable);
    }

    let days = serial.trunc();
    let seconds = ((serial - days) * 86_400.0).round() as i64;
    let Some(dt) = serial_epoch()
        .checked_add_signed(Duration::days(days as i64))
        .and_then(|d| d.checked_add_signed(Duration::seconds(seconds)))
    else {
        return ResolvedDate::rejected(DateClass::Unparseable);
    };

    let time = (field.keeps_time() && seconds != 0).then(|| dt.time());
    ResolvedDate::valid(dt.date(), time)
}

fn resolve_text(raw: &str, field: DateField) -> ResolvedDate {
    let s = raw.trim();
    if is_null_marker(s) {
        return ResolvedDate::rejected(DateClass::NullInput);
    }
    let s = s.trim_matches('"').trim();
    if s.is_empty() || is_null_marker(s) {
        return ResolvedDate::rejected(DateClass::NullInput);
    }
    if is_placeholder_spelling(s) {
        return ResolvedDate::rejected(DateClass::PlaceholderSentinel);
    }

    // A bare number in a text column is a serial that lost its cell type,
    // e.g. a spreadsheet exported to CSV.
    if looks_numeric(s) {
        if let Ok(serial) = s.parse::<f64>() {
            return resolve_serial(serial, field);
        }
    }

    if is_year_first(s) {
        return parse_year_first(s, field);
    }
    if s.contains('/') {
        return parse_day_first(s, '/');
    }
    if s.contains('.') {
        return parse_day_first(s, '.');
    }
    ResolvedDate::rejected(DateClass::Unparseable)
}

fn is_null_marker(s: &str) -> bool {
    s.is_empty() || NULL_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m))
}

fn is_placeholder_spelling(s: &str) -> bool {
    s.contains("1970") && PLACEHOLDER_SPELLINGS.iter().any(|p| s.contains(p))
}

fn looks_numeric(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|c| *c == '.').count() <= 1
}

fn is_year_first(s: &str) -> bool {
    match s.split_once('-') {
        Some((head, _)) => head.len() == 4 && head.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// `YYYY-MM-DD[ HH:MM[:SS]]`, also accepting a `T` separator.
fn parse_year_first(s: &str, field: DateField) -> ResolvedDate {
    let (date_part, time_part) = match s.split_once(|c| c == ' ' || c == 'T') {
        Some((d, t)) => (d, t.trim()),
        None => (s, ""),
    };

    let parts: Vec<&str> = date_part.split('-').collect();
    if parts.len() != 3 {
        return ResolvedDate::rejected(DateClass::Unparseable);
    }
    let (Ok(year), Ok(month), Ok(day)) = (
        parts[0].trim().parse::<i32>(),
        parts[1].trim().parse::<u32>(),
        parts[2].trim().parse::<u32>(),
    ) else {
        return ResolvedDate::rejected(DateClass::Unparseable);
    };
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return ResolvedDate::rejected(DateClass::Unparseable);
    };

    if !field.keeps_time() || time_part.is_empty() {
        return ResolvedDate::valid(date, None);
    }
    match parse_time(time_part) {
        Some(t) => ResolvedDate::valid(date, Some(t)),
        None => ResolvedDate::rejected(DateClass::Unparseable),
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim_end_matches('Z');
    ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// `DD<sep>MM<sep>YYYY` with an optional trailing time that is dropped.
fn parse_day_first(s: &str, sep: char) -> ResolvedDate {
    let date_part = s.split_whitespace().next().unwrap_or("");
    let parts: Vec<&str> = date_part.split(sep).collect();
    if parts.len() != 3 {
        return ResolvedDate::rejected(DateClass::Unparseable);
    }
    let (Ok(day), Ok(month), Ok(year)) = (
        parts[0].trim().parse::<u32>(),
        parts[1].trim().parse::<u32>(),
        parts[2].trim().parse::<i32>(),
    ) else {
        return ResolvedDate::rejected(DateClass::Unparseable);
    };
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) || year < 0 {
        return ResolvedDate::rejected(DateClass::Unparseable);
    }

    match NaiveDate::from_ymd_opt(expand_two_digit_year(year), month, day) {
        Some(date) => ResolvedDate::valid(date, None),
        None => ResolvedDate::rejected(DateClass::Unparseable),
    }
}

/// 00-29 -> 2000-2029, 30-99 -> 1930-1999; longer years pass through.
fn expand_two_digit_year(year: i32) -> i32 {
    match year {
        0..=29 => 2000 + year,
        30..=99 => 1900 + year,
        _ => year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn text(s: &str, field: DateField) -> ResolvedDate {
        resolve(&CellValue::from(s), field)
    }

    #[test]
    fn test_null_markers() {
        let markers = [
            "", "  ", "nan", "NaN", "None", "NaT", "<NA>", "NULL", "n/a", "#N/A", "#VALUE!", "\"\"",
        ];
        for s in markers {
            assert_eq!(
                text(s, DateField::Ftd).classification(),
                DateClass::NullInput,
                "{s:?}"
            );
        }
        assert_eq!(
            resolve(&CellValue::Empty, DateField::Kyc).classification(),
            DateClass::NullInput
        );
    }

    #[test]
    fn test_serial_placeholders() {
        for n in [0.0, 25569.0] {
            let r = resolve(&CellValue::Number(n), DateField::Ftd);
            assert_eq!(r.classification(), DateClass::PlaceholderSentinel);
            assert_eq!(r.date(), None);
        }
    }

    #[test]
    fn test_serial_below_placeholder_is_unparseable() {
        for n in [1.0, 60.0, 25568.0, 25568.999, -5.0] {
            assert_eq!(
                resolve(&CellValue::Number(n), DateField::Ftd).classification(),
                DateClass::Unparseable,
                "{n}"
            );
        }
    }

    #[test]
    fn test_serial_after_placeholder_is_valid() {
        let r = resolve(&CellValue::Number(25570.0), DateField::Ftd);
        assert_eq!(r.date(), Some(ymd(1970, 1, 2)));

        // 45292 is 2024-01-01
        let r = resolve(&CellValue::Number(45292.0), DateField::Ftd);
        assert_eq!(r.classification(), DateClass::Valid);
        assert_eq!(r.date(), Some(ymd(2024, 1, 1)));
    }

    #[test]
    fn test_serial_fraction_keeps_time_for_kyc_only() {
        let kyc = resolve(&CellValue::Number(45292.5), DateField::Kyc);
        assert_eq!(kyc.date(), Some(ymd(2024, 1, 1)));
        assert_eq!(kyc.time(), NaiveTime::from_hms_opt(12, 0, 0));

        let ftd = resolve(&CellValue::Number(45292.5), DateField::Ftd);
        assert_eq!(ftd.date(), Some(ymd(2024, 1, 1)));
        assert_eq!(ftd.time(), None);
    }

    #[test]
    fn test_serial_non_finite_and_huge() {
        for n in [f64::NAN, f64::INFINITY, 1e12] {
            assert_eq!(
                resolve(&CellValue::Number(n), DateField::Ftd).classification(),
                DateClass::Unparseable
            );
        }
    }

    #[test]
    fn test_structured_datetime() {
        let dt = ymd(2024, 3, 5).and_hms_opt(9, 30, 0).unwrap();
        let r = resolve(&CellValue::DateTime(dt), DateField::Kyc);
        assert_eq!(r.date(), Some(ymd(2024, 3, 5)));
        assert_eq!(r.time(), NaiveTime::from_hms_opt(9, 30, 0));

        let epoch = ymd(1970, 1, 1).and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(
            resolve(&CellValue::DateTime(epoch), DateField::Ftd).classification(),
            DateClass::PlaceholderSentinel
        );
    }

    #[test]
    fn test_datetime_to_serial_matches_spreadsheet() {
        let dt = ymd(1970, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(datetime_to_serial(dt), PLACEHOLDER_SERIAL);
        let dt = ymd(1900, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(datetime_to_serial(dt), 2.0);
    }

    #[test]
    fn test_numeric_text_uses_serial_path() {
        assert_eq!(
            text("25569", DateField::Ftd).classification(),
            DateClass::PlaceholderSentinel
        );
        assert_eq!(text("45292", DateField::Ftd).date(), Some(ymd(2024, 1, 1)));
        assert_eq!(text("1234", DateField::Ftd).classification(), DateClass::Unparseable);
    }

    #[test]
    fn test_placeholder_spellings() {
        let spellings = [
            "1/1/1970",
            "01/01/1970",
            "1970-01-01",
            "1970-1-1",
            "01-01-1970",
            "1-1-1970",
            "1970-01-01 00:00:00",
            "\"1/1/1970\"",
        ];
        for s in spellings {
            let r = text(s, DateField::Ftd);
            assert_eq!(r.classification(), DateClass::PlaceholderSentinel, "{s}");
        }
    }

    #[test]
    fn test_other_1970_dates_are_not_placeholders() {
        let r = text("15/03/1970", DateField::Ftd);
        assert_eq!(r.classification(), DateClass::Valid);
        assert_eq!(r.date(), Some(ymd(1970, 3, 15)));
    }

    #[test]
    fn test_year_first() {
        let r = text("2024-08-19", DateField::Ftd);
        assert_eq!(r.date(), Some(ymd(2024, 8, 19)));

        let r = text("2024-08-19 14:39:00", DateField::Ftd);
        assert_eq!(r.date(), Some(ymd(2024, 8, 19)));
        assert_eq!(r.time(), None);

        let r = text("2024-08-19 14:39:00", DateField::Kyc);
        assert_eq!(r.time(), NaiveTime::from_hms_opt(14, 39, 0));

        let r = text("2024-08-19T14:39", DateField::Kyc);
        assert_eq!(r.time(), NaiveTime::from_hms_opt(14, 39, 0));
    }

    #[test]
    fn test_year_first_never_day_first() {
        // 2024-03-04 is 4 March, not 3 April, even with slashes later on.
        let r = text("2024-03-04 10/11/12", DateField::Ftd);
        assert_eq!(r.date(), Some(ymd(2024, 3, 4)));
    }

    #[test]
    fn test_year_first_malformed() {
        for s in ["2024-13-01", "2024-02-30", "2024-ab-01", "2024-01"] {
            assert_eq!(text(s, DateField::Ftd).classification(), DateClass::Unparseable, "{s}");
        }
        assert_eq!(
            text("2024-01-05 25:99", DateField::Kyc).classification(),
            DateClass::Unparseable
        );
    }

    #[test]
    fn test_day_first_slash() {
        let r = text("25/08/2024", DateField::Ftd);
        assert_eq!(r.date(), Some(ymd(2024, 8, 25)));

        let r = text("15/01/2024 10:30:00", DateField::Kyc);
        assert_eq!(r.date(), Some(ymd(2024, 1, 15)));
        assert_eq!(r.time(), None);
    }

    #[test]
    fn test_two_digit_years() {
        assert_eq!(text("15/01/24", DateField::Ftd).date(), Some(ymd(2024, 1, 15)));
        assert_eq!(text("15/01/45", DateField::Ftd).date(), Some(ymd(1945, 1, 15)));
        assert_eq!(text("15/01/00", DateField::Ftd).date(), Some(ymd(2000, 1, 15)));
        assert_eq!(text("15/01/30", DateField::Ftd).date(), Some(ymd(1930, 1, 15)));
    }

    #[test]
    fn test_day_first_rejects_bad_parts() {
        for s in ["32/01/2024", "01/13/2024", "08/25", "1/2/3/4", "aa/01/2024", "31/02/2024"] {
            assert_eq!(text(s, DateField::Ftd).classification(), DateClass::Unparseable, "{s}");
        }
    }

    #[test]
    fn test_day_first_dot() {
        assert_eq!(text("05.06.2025", DateField::Ftd).date(), Some(ymd(2025, 6, 5)));
        assert_eq!(text("05.13.2025", DateField::Ftd).classification(), DateClass::Unparseable);
    }

    #[test]
    fn test_unrecognized_shapes() {
        for s in ["yesterday", "19-08-2024", "Aug 19 2024"] {
            assert_eq!(text(s, DateField::Ftd).classification(), DateClass::Unparseable, "{s}");
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let cell = CellValue::from("25/08/2024");
        assert_eq!(resolve(&cell, DateField::Ftd), resolve(&cell, DateField::Ftd));
    }
}
