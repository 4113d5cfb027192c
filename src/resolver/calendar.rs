//! Fixed lookup tables for the Solar Hijri listing calendar.
//!
//! The period table is kept separate from the parser so its mapping can be
//! inspected and changed without touching the rest of the pipeline.

/// Solar Hijri month names and their zero-padded numbers.
pub const PERSIAN_MONTHS: [(&str, u32); 12] = [
    ("فروردین", 1),
    ("اردیبهشت", 2),
    ("خرداد", 3),
    ("تیر", 4),
    ("مرداد", 5),
    ("شهریور", 6),
    ("مهر", 7),
    ("آبان", 8),
    ("آذر", 9),
    ("دی", 10),
    ("بهمن", 11),
    ("اسفند", 12),
];

/// Hour offsets added to `hour % 12` for each day-period token.
///
/// Noon, afternoon and night all map to +12 while morning maps to +0. This
/// folds distinct periods onto the same clock hours (e.g. "8 at night" and
/// "8 in the afternoon" both become 20:00); it is the listing site's observed
/// behavior and is kept as-is so existing archive names stay stable.
pub const PERIOD_OFFSETS: [(&str, u32); 4] = [
    ("صبح", 0),  // morning
    ("ظهر", 12), // noon
    ("عصر", 12), // afternoon
    ("شب", 12),  // night
];

/// Sentinel month number for unrecognized month names in lenient mode.
pub const UNKNOWN_MONTH: u32 = 0;

/// Looks up a month name; `None` when it is not one of the twelve.
#[must_use]
pub fn month_number(name: &str) -> Option<u32> {
    PERSIAN_MONTHS
        .iter()
        .find(|(month, _)| *month == name)
        .map(|(_, number)| *number)
}

/// Returns true if any month name occurs as a substring of `text`.
#[must_use]
pub fn contains_month_token(text: &str) -> bool {
    PERSIAN_MONTHS.iter().any(|(month, _)| text.contains(month))
}

/// Hour offset for a day-period token; unknown tokens add nothing.
#[must_use]
pub fn period_offset(token: &str) -> u32 {
    PERIOD_OFFSETS
        .iter()
        .find(|(period, _)| *period == token)
        .map_or(0, |(_, offset)| *offset)
}

/// Rewrites Persian and Arabic-Indic digits as ASCII digits.
#[must_use]
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => ascii_digit(c as u32 - 0x06F0),
            '\u{0660}'..='\u{0669}' => ascii_digit(c as u32 - 0x0660),
            other => other,
        })
        .collect()
}

fn ascii_digit(value: u32) -> char {
    char::from_digit(value, 10).unwrap_or('0')
}
