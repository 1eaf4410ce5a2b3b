use chrono::{NaiveDate, NaiveDateTime};

/// Layouts tried after the fast path, in order.
const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M",
];

/// Fast parse of `"YYYY-MM-DD HH:MM:SS"` (or with a `T` separator) → naive timestamp.
fn parse_fixed(s: &str) -> Option<NaiveDateTime> {
    let b = s.as_bytes();
    if b.len() != 19
        || b[4] != b'-'
        || b[7] != b'-'
        || !(b[10] == b' ' || b[10] == b'T')
        || b[13] != b':'
        || b[16] != b':'
    {
        return None;
    }
    let num = |range: std::ops::Range<usize>| -> Option<u32> {
        let digits = &b[range];
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        Some(digits.iter().fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0')))
    };

    let year = num(0..4)? as i32;
    NaiveDate::from_ymd_opt(year, num(5..7)?, num(8..10)?)?.and_hms_opt(
        num(11..13)?,
        num(14..16)?,
        num(17..19)?,
    )
}

/// Parse the timestamp text found in TLC files into a naive (local) timestamp.
/// Returns `None` if no known layout matches.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Some(ts) = parse_fixed(s) {
        return Some(ts);
    }
    FALLBACK_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
