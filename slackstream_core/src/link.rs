//! Parsing of the entity references a caller may hand to the stream:
//! bare channel IDs, `CHANNEL:THREAD_TS` links, and Slack archive URLs.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

use crate::error::{Result, StreamError};

const LINK_SEP: char = ':';
const EXCLUDE_PREFIX: char = '^';
const FILE_PREFIX: char = '@';
const TIME_SEP: char = ',';
pub const TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Upper bound on non-empty entries read from an entity list file.
const MAX_FILE_ENTRIES: usize = 1_048_576;

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]+(:[0-9]+\.[0-9]+)?$").expect("valid link regex")
});

// Workspace URLs may only contain lowercase letters, numbers and dashes.
static SLACK_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://[a-zA-Z0-9][-\w]+\.slack\.com/archives/[A-Z][A-Z0-9]+(/p(\d+))?$")
        .expect("valid slack url regex")
});

/// Canonical reference to a channel, or to a thread inside a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SlackLink {
    pub channel: String,
    pub thread_ts: String,
}

impl SlackLink {
    pub fn channel(id: impl Into<String>) -> Self {
        Self {
            channel: id.into(),
            thread_ts: String::new(),
        }
    }

    pub fn thread(id: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel: id.into(),
            thread_ts: thread_ts.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.channel.is_empty()
    }

    pub fn is_thread(&self) -> bool {
        self.is_valid() && !self.thread_ts.is_empty()
    }
}

impl fmt::Display for SlackLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("<invalid slack link>");
        }
        if self.is_thread() {
            write!(f, "{}{}{}", self.channel, LINK_SEP, self.thread_ts)
        } else {
            f.write_str(&self.channel)
        }
    }
}

pub fn is_url(s: &str) -> bool {
    s.to_ascii_lowercase().starts_with("https://")
}

pub fn is_valid_slack_url(s: &str) -> bool {
    SLACK_URL_RE.is_match(s)
}

/// Parses a channel ID, a `CHANNEL:THREAD_TS` link or a Slack archive URL.
pub fn parse_link(link: &str) -> Result<SlackLink> {
    if is_url(link) {
        return parse_url(link);
    }
    if !LINK_RE.is_match(link) {
        return Err(StreamError::InvalidLink(link.to_string()));
    }
    let (channel, ts) = link.split_once(LINK_SEP).unwrap_or((link, ""));
    Ok(SlackLink::thread(channel, ts))
}

/// Parses `https://<workspace>.slack.com/archives/<CHANNEL>[/p<TS>]`.
pub fn parse_url(slack_url: &str) -> Result<SlackLink> {
    if slack_url.is_empty() {
        return Err(StreamError::UnsupportedUrl("no url provided".to_string()));
    }
    if !is_valid_slack_url(slack_url) {
        return Err(StreamError::UnsupportedUrl(slack_url.to_string()));
    }
    let uri = url::Url::parse(slack_url)
        .map_err(|e| StreamError::UnsupportedUrl(format!("{slack_url}: {e}")))?;

    let parts: Vec<&str> = uri.path().trim_start_matches('/').split('/').collect();
    if parts.len() < 2 || !parts[0].eq_ignore_ascii_case("archives") || parts[1].is_empty() {
        return Err(StreamError::UnsupportedUrl(slack_url.to_string()));
    }

    let link = match parts.as_slice() {
        [_, channel] => SlackLink::channel(*channel),
        [_, channel, p] => {
            let ts = parse_thread_id(p)
                .ok_or_else(|| StreamError::UnsupportedUrl(slack_url.to_string()))?;
            SlackLink::thread(*channel, ts)
        }
        _ => return Err(StreamError::UnsupportedUrl(slack_url.to_string())),
    };
    if !link.is_valid() {
        return Err(StreamError::UnsupportedUrl(slack_url.to_string()));
    }
    Ok(link)
}

/// Converts a URL thread segment (`p1577694990000400`) into a Slack
/// timestamp (`1577694990.000400`).
pub fn parse_thread_id(segment: &str) -> Option<String> {
    let digits = segment.strip_prefix('p')?;
    if digits.len() <= 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (secs, micros) = digits.split_at(digits.len() - 6);
    Some(format!("{secs}.{micros}"))
}

/// Formats a time the way the Slack API expects `oldest`/`latest`.
pub fn format_slack_ts(t: &DateTime<Utc>) -> String {
    format!("{}.{:06}", t.timestamp(), t.timestamp_subsec_micros())
}

/// Formats an optional time, empty string meaning "unbounded".
pub fn format_opt_ts(t: Option<&DateTime<Utc>>) -> String {
    t.map(format_slack_ts).unwrap_or_default()
}

/// Parses a Slack timestamp (`1577694990.000400`) into a UTC time.
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
    Utc.timestamp_opt(secs, micros * 1_000).single()
}

/// Parses a time in `TIME_LAYOUT` or `DATE_LAYOUT`.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, TIME_LAYOUT) {
        return Ok(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, DATE_LAYOUT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| StreamError::Config(format!("unparseable time: {s:?}")))
}

// An empty time field leaves that end of the range unset.
fn parse_opt_time(field: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match field.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_time(s).map(Some),
    }
}

/// A caller-supplied reference with an optional time range override.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityItem {
    pub id: String,
    pub oldest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub include: bool,
}

impl EntityItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            oldest: None,
            latest: None,
            include: true,
        }
    }

    #[must_use]
    pub fn with_oldest(mut self, t: DateTime<Utc>) -> Self {
        self.oldest = Some(t);
        self
    }

    #[must_use]
    pub fn with_latest(mut self, t: DateTime<Utc>) -> Self {
        self.latest = Some(t);
        self
    }

    /// Parses one list entry: `[^]ID[,OLDEST[,LATEST]]`.
    pub fn parse(entry: &str) -> Result<Self> {
        let (include, rest) = match entry.strip_prefix(EXCLUDE_PREFIX) {
            Some(rest) => (false, rest),
            None => (true, entry),
        };
        let mut parts = rest.splitn(3, TIME_SEP);
        let id = parts.next().unwrap_or_default().trim();
        if id.is_empty() {
            return Err(StreamError::InvalidLink(entry.to_string()));
        }
        let id = parse_link(id)?.to_string();
        let oldest = parse_opt_time(parts.next())?;
        let latest = parse_opt_time(parts.next())?;
        Ok(Self {
            id,
            oldest,
            latest,
            include,
        })
    }
}

impl fmt::Display for EntityItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.include {
            write!(f, "{EXCLUDE_PREFIX}")?;
        }
        f.write_str(&self.id)?;
        if let Some(t) = &self.oldest {
            write!(f, "{TIME_SEP}{}", t.format(TIME_LAYOUT))?;
        }
        if let Some(t) = &self.latest {
            write!(f, "{TIME_SEP}{}", t.format(TIME_LAYOUT))?;
        }
        Ok(())
    }
}

/// Ordered inclusion/exclusion list of entities, keyed by canonical link.
/// A later inclusion of the same ID replaces the earlier one, and an
/// exclusion wins over any inclusion regardless of position.
#[derive(Debug, Clone, Default)]
pub struct EntityList {
    items: Vec<EntityItem>,
}

impl EntityList {
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut list = EntityList::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            if let Some(path) = entry.strip_prefix(FILE_PREFIX) {
                for item in Self::from_file(path)?.items {
                    list.push(item);
                }
                continue;
            }
            list.push(EntityItem::parse(entry)?);
        }
        Ok(list)
    }

    /// Space separated list, as typed on a command line.
    pub fn from_string(s: &str) -> Result<Self> {
        let entries: Vec<&str> = s.split_whitespace().collect();
        if entries.is_empty() {
            return Err(StreamError::Config("empty list".to_string()));
        }
        Self::from_entries(&entries)
    }

    /// One entry per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect();
        if entries.len() > MAX_FILE_ENTRIES {
            return Err(StreamError::Config(format!(
                "maximum file size exceeded ({MAX_FILE_ENTRIES})"
            )));
        }
        Self::from_entries(&entries)
    }

    fn push(&mut self, item: EntityItem) {
        match self.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) if !existing.include && item.include => {}
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    /// Included items, in insertion order.
    pub fn includes(&self) -> Vec<EntityItem> {
        self.items.iter().filter(|i| i.include).cloned().collect()
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.items.iter().any(|i| !i.include && i.id == id)
    }

    pub fn include_count(&self) -> usize {
        self.items.iter().filter(|i| i.include).count()
    }

    pub fn exclude_count(&self) -> usize {
        self.items.len() - self.include_count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
