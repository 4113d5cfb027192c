//! Listing-entry resolution.
//!
//! Turns one raw listing fragment (the markup of a single recording entry)
//! into a [`RecordingRef`]: the link to fetch from and the deterministic
//! archive/media filenames derived from the entry's index and its Solar Hijri
//! date/time text.
//!
//! # Example
//!
//! ```
//! use harvester_core::resolver::EntryResolver;
//!
//! let resolver = EntryResolver::default();
//! let fragment = r#"<a href="https://lms.example/rec?id=7">آفلاین</a>
//!     (جلسه، ۱۴ مهر ۱۴۰۲، ساعت ۱۰:۳۰ صبح)"#;
//! let recording = resolver.resolve(fragment, 3).unwrap();
//! assert_eq!(recording.archive_name, "03_1402-07-14_10-30.rar");
//! ```

pub mod calendar;
mod error;
mod recording;

pub use error::ParseError;
pub use recording::{RecordingRef, ScheduledAt, SourceAction, TriggerRef, recording_names};

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::navigator::Selector;
use calendar::{UNKNOWN_MONTH, contains_month_token, month_number, normalize_digits, period_offset};

/// Label that marks the offline (recorded) link of an entry.
pub const OFFLINE_MARKER: &str = "آفلاین";

/// List separator used inside the date/time group.
pub const LIST_SEPARATOR: char = '،';

#[allow(clippy::expect_used)]
static OFFLINE_LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]+href=["']([^"']+)["'][^>]*>[^<]*آفلاین"#)
        .expect("offline link regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static PAREN_GROUP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([^)]+)\)").expect("paren group regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+)\s+(\S+)\s+([0-9]+)").expect("date regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+):([0-9]+)\s+(\S+)").expect("time regex is valid") // Static pattern, safe to panic
});

/// Resolves listing fragments into recordings.
#[derive(Debug, Clone)]
pub struct EntryResolver {
    listing_url: Option<String>,
    lenient_months: bool,
    archive_extension: String,
    media_extension: String,
}

impl Default for EntryResolver {
    fn default() -> Self {
        Self {
            listing_url: None,
            lenient_months: true,
            archive_extension: "rar".to_string(),
            media_extension: "mp4".to_string(),
        }
    }
}

impl EntryResolver {
    /// Creates a resolver for entries of the listing at `listing_url`.
    ///
    /// The listing URL is the base for relative links and the parent view for
    /// entries whose link is a click target.
    #[must_use]
    pub fn for_listing(listing_url: Option<String>) -> Self {
        Self {
            listing_url,
            ..Self::default()
        }
    }

    /// Sets whether unknown month names are accepted as month `00`.
    #[must_use]
    pub fn with_lenient_months(mut self, lenient: bool) -> Self {
        self.lenient_months = lenient;
        self
    }

    /// Sets the archive and media extensions used for filenames.
    #[must_use]
    pub fn with_extensions(
        mut self,
        archive_extension: impl Into<String>,
        media_extension: impl Into<String>,
    ) -> Self {
        self.archive_extension = archive_extension.into();
        self.media_extension = media_extension.into();
        self
    }

    /// Resolves a fragment, logging and discarding the cause on failure.
    #[must_use]
    pub fn resolve(&self, fragment: &str, index: u32) -> Option<RecordingRef> {
        match self.try_resolve(fragment, index) {
            Ok(recording) => Some(recording),
            Err(error) => {
                warn!(index, error = %error, "skipping unparseable listing entry");
                None
            }
        }
    }

    /// Resolves a fragment into a recording.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] describing the first part of the fragment
    /// that did not match.
    pub fn try_resolve(&self, fragment: &str, index: u32) -> Result<RecordingRef, ParseError> {
        debug!(index, "parsing listing entry");
        let fragment = normalize_digits(fragment);

        let href = OFFLINE_LINK_PATTERN
            .captures(&fragment)
            .and_then(|caps| caps.get(1))
            .map(|m| decode_entities(m.as_str()))
            .ok_or(ParseError::NoOfflineLink { index })?;

        let groups: Vec<String> = PAREN_GROUP_PATTERN
            .captures_iter(&fragment)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
            .collect();
        let parts: Vec<&str> = groups
            .iter()
            .find(|group| contains_month_token(group))
            .map(|group| group.split(LIST_SEPARATOR).map(str::trim).collect())
            .unwrap_or_default();
        if parts.len() < 3 {
            return Err(ParseError::NoDateGroup { index, groups });
        }
        let (date_part, time_part) = (parts[1], parts[2]);

        let date = DATE_PATTERN
            .captures(date_part)
            .ok_or_else(|| ParseError::BadDate {
                index,
                date_part: date_part.to_string(),
            })?;
        let day = parse_number(&date[1]);
        let month_name = &date[2];
        let year = parse_number(&date[3]);
        let month = match month_number(month_name) {
            Some(month) => month,
            None if self.lenient_months => {
                warn!(index, month = month_name, "unrecognized month name, using 00");
                UNKNOWN_MONTH
            }
            None => {
                return Err(ParseError::UnknownMonth {
                    index,
                    month: month_name.to_string(),
                });
            }
        };

        let time = TIME_PATTERN
            .captures(time_part)
            .ok_or_else(|| ParseError::BadTime {
                index,
                time_part: time_part.to_string(),
            })?;
        let hour = parse_number(&time[1]) % 12 + period_offset(&time[3]);
        let minute = parse_number(&time[2]);

        let scheduled_at = ScheduledAt {
            year,
            month,
            day,
            hour,
            minute,
        };
        let source = self.source_action(&href, index)?;
        let recording = RecordingRef::new(
            index,
            scheduled_at,
            source,
            &self.archive_extension,
            &self.media_extension,
        );
        debug!(
            index,
            source = %recording.source,
            archive = %recording.archive_name,
            "resolved listing entry"
        );
        Ok(recording)
    }

    fn source_action(&self, href: &str, index: u32) -> Result<SourceAction, ParseError> {
        if is_click_target(href) {
            let view = self
                .listing_url
                .clone()
                .ok_or(ParseError::UnresolvableTrigger { index })?;
            return Ok(SourceAction::Trigger(TriggerRef {
                view,
                selector: Selector::Href(href.to_string()),
            }));
        }

        let absolute = self
            .listing_url
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .and_then(|base| base.join(href).ok())
            .map_or_else(|| href.to_string(), String::from);
        Ok(SourceAction::Url(absolute))
    }
}

fn is_click_target(href: &str) -> bool {
    let href = href.trim();
    href.starts_with('#') || href.to_ascii_lowercase().starts_with("javascript:")
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
}

/// Parses a run of ASCII digits; the patterns guarantee digits only, so
/// overflow is the only failure and saturates.
fn parse_number(digits: &str) -> u32 {
    digits.parse().unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const FRAGMENT: &str = r#"<span>جلسه</span> <a class="btn" href="https://lms.example/mod/onlineclass/view.php?id=12&amp;action=recording.view&amp;rid=7">آفلاین</a>
        (something، ۱۴ مهر ۱۴۰۲، ساعت ۱۰:۳۰ صبح)"#;

    #[test]
    fn test_resolve_reference_fragment() {
        let recording = EntryResolver::default().resolve(FRAGMENT, 3).unwrap();
        assert_eq!(recording.archive_name, "03_1402-07-14_10-30.rar");
        assert_eq!(recording.media_name, "03_1402-07-14_10-30.mp4");
        assert_eq!(
            recording.source,
            SourceAction::Url(
                "https://lms.example/mod/onlineclass/view.php?id=12&action=recording.view&rid=7"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let resolver = EntryResolver::default();
        let first = resolver.resolve(FRAGMENT, 5).unwrap();
        let second = resolver.resolve(FRAGMENT, 5).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_afternoon_period_adds_twelve() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (x، ۲ آبان ۱۴۰۲، ساعت ۴:۰۵ عصر)"#;
        let recording = EntryResolver::default().resolve(fragment, 1).unwrap();
        assert_eq!(recording.archive_name, "01_1402-08-02_16-05.rar");
    }

    #[test]
    fn test_resolve_twelve_noon_wraps_to_twelve() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (x، ۲ آبان ۱۴۰۲، ساعت ۱۲:۰۰ ظهر)"#;
        let recording = EntryResolver::default().resolve(fragment, 1).unwrap();
        assert_eq!(recording.scheduled_at.hour, 12);
    }

    #[test]
    fn test_resolve_skips_parens_without_month() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (90 دقیقه) (x، ۱ دی ۱۴۰۳، ساعت ۹:۰۰ صبح)"#;
        let recording = EntryResolver::default().resolve(fragment, 2).unwrap();
        assert_eq!(recording.archive_name, "02_1403-10-01_09-00.rar");
    }

    #[test]
    fn test_resolve_without_offline_link() {
        let fragment = r#"<a href="/r/1">آنلاین</a> (x، ۱۴ مهر ۱۴۰۲، ساعت ۱۰:۳۰ صبح)"#;
        let result = EntryResolver::default().try_resolve(fragment, 1);
        assert_eq!(result, Err(ParseError::NoOfflineLink { index: 1 }));
        assert!(EntryResolver::default().resolve(fragment, 1).is_none());
    }

    #[test]
    fn test_resolve_without_date_group() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (recorded)"#;
        let result = EntryResolver::default().try_resolve(fragment, 4);
        assert!(matches!(result, Err(ParseError::NoDateGroup { index: 4, .. })));
    }

    #[test]
    fn test_resolve_group_with_too_few_parts() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (۱۴ مهر ۱۴۰۲)"#;
        let result = EntryResolver::default().try_resolve(fragment, 1);
        assert!(matches!(result, Err(ParseError::NoDateGroup { .. })));
    }

    #[test]
    fn test_resolve_bad_date() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (x، مهر، ساعت ۱۰:۳۰ صبح)"#;
        let result = EntryResolver::default().try_resolve(fragment, 1);
        assert!(matches!(result, Err(ParseError::BadDate { .. })));
    }

    #[test]
    fn test_resolve_bad_time() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (x، ۱۴ مهر ۱۴۰۲، ساعت ده)"#;
        let result = EntryResolver::default().try_resolve(fragment, 1);
        assert!(matches!(result, Err(ParseError::BadTime { .. })));
    }

    #[test]
    fn test_lenient_unknown_month_maps_to_zero() {
        // "مهرماه" contains a month token but is not itself a month name.
        let fragment = r#"<a href="/r/1">آفلاین</a> (x، ۱۴ مهرماه ۱۴۰۲، ساعت ۱۰:۳۰ صبح)"#;
        let recording = EntryResolver::default().resolve(fragment, 1).unwrap();
        assert_eq!(recording.archive_name, "01_1402-00-14_10-30.rar");
    }

    #[test]
    fn test_strict_unknown_month_rejected() {
        let fragment = r#"<a href="/r/1">آفلاین</a> (x، ۱۴ مهرماه ۱۴۰۲، ساعت ۱۰:۳۰ صبح)"#;
        let result = EntryResolver::default()
            .with_lenient_months(false)
            .try_resolve(fragment, 1);
        assert_eq!(
            result,
            Err(ParseError::UnknownMonth {
                index: 1,
                month: "مهرماه".to_string()
            })
        );
    }

    #[test]
    fn test_relative_href_joined_with_listing() {
        let fragment = r#"<a href="recording.php?id=9">آفلاین</a> (x، ۱ دی ۱۴۰۳، ساعت ۹:۰۰ صبح)"#;
        let resolver =
            EntryResolver::for_listing(Some("https://lms.example/mod/onlineclass/view.php".into()));
        let recording = resolver.resolve(fragment, 1).unwrap();
        assert_eq!(
            recording.source,
            SourceAction::Url("https://lms.example/mod/onlineclass/recording.php?id=9".into())
        );
    }

    #[test]
    fn test_javascript_href_becomes_trigger() {
        let fragment =
            r#"<a href="javascript:void(0)" id="r9">آفلاین</a> (x، ۱ دی ۱۴۰۳، ساعت ۹:۰۰ صبح)"#;
        let resolver = EntryResolver::for_listing(Some("https://lms.example/list".into()));
        let recording = resolver.resolve(fragment, 1).unwrap();
        assert_eq!(
            recording.source,
            SourceAction::Trigger(TriggerRef {
                view: "https://lms.example/list".into(),
                selector: Selector::Href("javascript:void(0)".into()),
            })
        );
    }

    #[test]
    fn test_trigger_without_listing_is_unresolvable() {
        let fragment = r##"<a href="#">آفلاین</a> (x، ۱ دی ۱۴۰۳، ساعت ۹:۰۰ صبح)"##;
        let result = EntryResolver::default().try_resolve(fragment, 6);
        assert_eq!(result, Err(ParseError::UnresolvableTrigger { index: 6 }));
    }

    #[test]
    fn test_custom_extensions() {
        let recording = EntryResolver::default()
            .with_extensions("zip", "mkv")
            .resolve(FRAGMENT, 3)
            .unwrap();
        assert_eq!(recording.archive_name, "03_1402-07-14_10-30.zip");
        assert_eq!(recording.media_name, "03_1402-07-14_10-30.mkv");
    }
}
