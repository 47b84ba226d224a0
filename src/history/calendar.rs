use chrono::{DateTime, Datelike, FixedOffset, Offset, SecondsFormat, Utc};

const FILE_PREFIX: &str = "history-";
const FILE_SUFFIX: &str = ".json";

/// Maps wall-clock instants to day files and entry timestamps.
///
/// Days are counted in a fixed UTC offset. File names carry the year shifted
/// by `year_offset` (543 gives the Thai Buddhist era); entry timestamps keep
/// the Gregorian year.
#[derive(Debug, Clone, Copy)]
pub struct HistoryCalendar {
    offset: FixedOffset,
    year_offset: i32,
}

impl Default for HistoryCalendar {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix()),
            year_offset: 543,
        }
    }
}

impl HistoryCalendar {
    /// Returns `None` when the offset is outside ±23 hours.
    pub fn new(utc_offset_hours: i32, year_offset: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)?;
        Some(Self {
            offset,
            year_offset,
        })
    }

    /// `history-DD-MM-YYYY.json` for the local day containing `now`.
    pub fn file_name(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.offset);
        format!(
            "{}{:02}-{:02}-{}{}",
            FILE_PREFIX,
            local.day(),
            local.month(),
            local.year() + self.year_offset,
            FILE_SUFFIX
        )
    }

    /// RFC 3339 in the local offset, e.g. `2026-10-17T14:03:22+07:00`.
    pub fn timestamp(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false)
    }

    /// Sort key `(year, month, day)` for a day file name, `None` for
    /// anything that is not one.
    pub fn parse_file_name(name: &str) -> Option<(i32, u32, u32)> {
        let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
        let mut parts = stem.splitn(3, '-');
        let day: u32 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next()?.parse().ok()?;
        let year: i32 = parts.next()?.parse().ok()?;
        if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
            return None;
        }
        Some((year, month, day))
    }
}
