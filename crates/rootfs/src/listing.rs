//! Long-format directory listing parser.
//!
//! The elevation shell is asked for `ls -lA <dir>` and this module turns the
//! resulting text back into typed [`DirEntry`] values. Each line carries a
//! fixed number of whitespace-separated fields (permissions, link count,
//! owner, group, size, date) followed by the entry name, which is taken as
//! the untouched remainder of the line so names containing spaces survive.
//!
//! Lines that do not match the grammar are skipped and logged unless the
//! parser is configured as strict.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Number of fixed fields before the size column.
const LEADING_FIELDS: usize = 4;

/// Clock skew allowed before a year-less date is moved to the previous year.
const FUTURE_TOLERANCE_DAYS: i64 = 2;

/// Separator `ls` prints between a symlink's name and its target.
const SYMLINK_ARROW: &str = " -> ";

/// Errors produced for a listing line that does not match the grammar.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line ended before all fixed fields were read.
    #[error("line {line}: missing fields")]
    MissingFields { line: usize },

    /// The permission column is not a valid mode string.
    #[error("line {line}: invalid permission string {value:?}")]
    InvalidPermissions { line: usize, value: String },

    /// A numeric column could not be parsed.
    #[error("line {line}: invalid {field} {value:?}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },

    /// The date columns do not match the configured format.
    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },

    /// Nothing followed the date columns.
    #[error("line {line}: missing entry name")]
    MissingName { line: usize },

    /// The name contains a path separator or is a dot entry.
    #[error("line {line}: invalid entry name {value:?}")]
    InvalidName { line: usize, value: String },
}

/// Kind of filesystem object behind an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Anything else (symlink, device, socket, fifo).
    Other,
}

/// Date layout the listing command prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    /// `Jan  1 00:00` for recent files, `Jan  1  2023` for older ones.
    #[default]
    Traditional,
    /// `2024-01-01 00:00`, as printed by toybox.
    Iso,
}

impl DateFormat {
    /// Number of whitespace-separated fields the date occupies.
    fn field_count(self) -> usize {
        match self {
            DateFormat::Traditional => 3,
            DateFormat::Iso => 2,
        }
    }
}

/// One filesystem object as reported by the listing command.
///
/// Entries are never mutated after construction. A placeholder for a path
/// that was looked up but not found has `exists == false`; its size and kind
/// carry no information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    name: String,
    kind: EntryKind,
    exists: bool,
    size: u64,
    mode: u32,
    modified: SystemTime,
    symlink_target: Option<String>,
}

impl DirEntry {
    /// Create an entry for an object that exists.
    pub fn new(name: impl Into<String>, kind: EntryKind, size: u64, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            kind,
            exists: true,
            size,
            mode: 0,
            modified,
            symlink_target: None,
        }
    }

    /// Create the placeholder for a path that does not exist (yet).
    pub fn missing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Other,
            exists: false,
            size: 0,
            mode: 0,
            modified: UNIX_EPOCH,
            symlink_target: None,
        }
    }

    /// Create the entry standing in for the filesystem root.
    pub fn root() -> Self {
        Self::boundary("/")
    }

    /// Create an existing directory entry for a path whose parent is never
    /// listed, such as the root of a view.
    pub fn boundary(name: impl Into<String>) -> Self {
        Self {
            mode: 0o755,
            ..Self::new(name, EntryKind::Directory, 0, UNIX_EPOCH)
        }
    }

    /// Set the permission bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Permission bits decoded from the mode string (e.g. `0o644`).
    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Link target for symlink entries.
    pub fn symlink_target(&self) -> Option<&str> {
        self.symlink_target.as_deref()
    }

    pub fn is_dir(&self) -> bool {
        self.exists && self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.exists && self.kind == EntryKind::File
    }
}

/// Outcome of parsing a whole listing.
#[derive(Debug, Default)]
pub struct ListingReport {
    /// Entries in the order the command printed them.
    pub entries: Vec<DirEntry>,
    /// Lines that were skipped, with the reason.
    pub rejected: Vec<ParseError>,
}

/// Parser for `ls -l` style output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingParser {
    date_format: DateFormat,
    strict: bool,
    /// "Now" as seen by the listing command.
    reference: NaiveDateTime,
}

impl Default for ListingParser {
    fn default() -> Self {
        Self::new(DateFormat::default())
    }
}

impl ListingParser {
    /// Create a lenient parser for the given date layout.
    pub fn new(date_format: DateFormat) -> Self {
        Self {
            date_format,
            strict: false,
            reference: Utc::now().naive_utc(),
        }
    }

    /// Reject the whole listing on the first malformed line.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Take `now` as the time the listing was produced.
    ///
    /// Traditional dates that print a time instead of a year get the year of
    /// `now`, or the year before when that would put them in the future.
    pub fn with_reference_time(mut self, now: NaiveDateTime) -> Self {
        self.reference = now;
        self
    }

    /// Shorthand for a reference time at the very end of `year`.
    pub fn with_reference_year(self, year: i32) -> Self {
        match NaiveDate::from_ymd_opt(year, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59)) {
            Some(now) => self.with_reference_time(now),
            None => self,
        }
    }

    pub fn date_format(&self) -> DateFormat {
        self.date_format
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Parse a listing into entries.
    ///
    /// In lenient mode malformed lines are dropped and this never fails. In
    /// strict mode the first malformed line is returned as the error.
    pub fn parse(&self, raw: &str) -> Result<Vec<DirEntry>, ParseError> {
        let report = self.parse_report(raw);
        if self.strict {
            if let Some(first) = report.rejected.into_iter().next() {
                return Err(first);
            }
        }
        Ok(report.entries)
    }

    /// Parse a listing, keeping track of every rejected line.
    pub fn parse_report(&self, raw: &str) -> ListingReport {
        let mut report = ListingReport::default();

        for (index, line) in raw.lines().enumerate() {
            let line_no = index + 1;
            if line.trim().is_empty() || is_total_line(line) {
                continue;
            }

            match self.parse_line(line, line_no) {
                Ok(Some(entry)) => report.entries.push(entry),
                Ok(None) => {}
                Err(e) => {
                    warn!(line = line_no, error = %e, "Skipping unparseable listing line");
                    report.rejected.push(e);
                }
            }
        }

        report
    }

    /// Parse one entry line. Returns `None` for the `.` and `..` entries.
    fn parse_line(&self, line: &str, line_no: usize) -> Result<Option<DirEntry>, ParseError> {
        let missing = || ParseError::MissingFields { line: line_no };

        let (head, rest) = split_fields(line, LEADING_FIELDS).ok_or_else(missing)?;
        let perms = head[0];
        let kind = parse_kind(perms).ok_or_else(|| ParseError::InvalidPermissions {
            line: line_no,
            value: perms.to_string(),
        })?;
        let mode = parse_mode(perms).ok_or_else(|| ParseError::InvalidPermissions {
            line: line_no,
            value: perms.to_string(),
        })?;
        head[1]
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidNumber {
                line: line_no,
                field: "link count",
                value: head[1].to_string(),
            })?;

        // Device nodes print "major, minor" in place of a size.
        let (size_field, rest) = next_field(rest).ok_or_else(missing)?;
        let (size, rest) = if let Some(major) = size_field.strip_suffix(',') {
            let (minor, rest) = next_field(rest).ok_or_else(missing)?;
            for (field, value) in [("major device number", major), ("minor device number", minor)] {
                value.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
                    line: line_no,
                    field,
                    value: value.to_string(),
                })?;
            }
            (0, rest)
        } else {
            let size = size_field
                .parse::<u64>()
                .map_err(|_| ParseError::InvalidNumber {
                    line: line_no,
                    field: "size",
                    value: size_field.to_string(),
                })?;
            (size, rest)
        };

        let (date_fields, rest) =
            split_fields(rest, self.date_format.field_count()).ok_or_else(missing)?;
        let modified = self
            .parse_date(&date_fields)
            .ok_or_else(|| ParseError::InvalidTimestamp {
                line: line_no,
                value: date_fields.join(" "),
            })?;

        // Exactly one separator precedes the name; anything after it is the name.
        let mut chars = rest.chars();
        let name = match chars.next() {
            Some(c) if c.is_whitespace() => chars.as_str(),
            _ => return Err(ParseError::MissingName { line: line_no }),
        };
        if name.is_empty() {
            return Err(ParseError::MissingName { line: line_no });
        }

        let (name, symlink_target) = if perms.starts_with('l') {
            match name.split_once(SYMLINK_ARROW) {
                Some((name, target)) => (name, Some(target.to_string())),
                None => (name, None),
            }
        } else {
            (name, None)
        };

        if name == "." || name == ".." {
            return Ok(None);
        }
        if name.contains('/') {
            return Err(ParseError::InvalidName {
                line: line_no,
                value: name.to_string(),
            });
        }

        Ok(Some(DirEntry {
            name: name.to_string(),
            kind,
            exists: true,
            size,
            mode,
            modified,
            symlink_target,
        }))
    }

    fn parse_date(&self, fields: &[&str]) -> Option<SystemTime> {
        let datetime = match self.date_format {
            DateFormat::Traditional => {
                let (month, day, time_or_year) = (fields[0], fields[1], fields[2]);
                if time_or_year.contains(':') {
                    let time = parse_time(time_or_year)?;
                    let latest = self.reference + TimeDelta::days(FUTURE_TOLERANCE_DAYS);
                    let year = self.reference.year();
                    [year, year - 1].into_iter().find_map(|year| {
                        let date = month_day(year, month, day)?;
                        Some(NaiveDateTime::new(date, time)).filter(|dt| *dt <= latest)
                    })?
                } else {
                    let date = month_day(time_or_year.parse().ok()?, month, day)?;
                    NaiveDateTime::new(date, NaiveTime::MIN)
                }
            }
            DateFormat::Iso => {
                let date = NaiveDate::parse_from_str(fields[0], "%Y-%m-%d").ok()?;
                NaiveDateTime::new(date, parse_time(fields[1])?)
            }
        };

        let secs = datetime.and_utc().timestamp();
        Some(UNIX_EPOCH + Duration::from_secs(u64::try_from(secs).unwrap_or(0)))
    }
}

fn month_day(year: i32, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{year} {month} {day}"), "%Y %b %d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S%.f"))
        .ok()
}

/// The summary line `ls -l` prints before the entries of a directory.
fn is_total_line(line: &str) -> bool {
    let mut fields = line.split_whitespace();
    matches!(
        (fields.next(), fields.next(), fields.next()),
        (Some("total"), Some(_), None)
    )
}

fn parse_kind(perms: &str) -> Option<EntryKind> {
    if perms.len() < 10 {
        return None;
    }
    match perms.as_bytes()[0] {
        b'-' => Some(EntryKind::File),
        b'd' => Some(EntryKind::Directory),
        b'l' | b'c' | b'b' | b'p' | b's' => Some(EntryKind::Other),
        _ => None,
    }
}

/// Decode `rwxr-xr-x` style permission bits, including setuid/setgid/sticky.
fn parse_mode(perms: &str) -> Option<u32> {
    let bits = perms.get(1..10)?.as_bytes();
    let mut mode = 0u32;

    for (class, chunk) in bits.chunks(3).enumerate() {
        let shift = 6 - 3 * class as u32;
        if chunk[0] == b'r' {
            mode |= 0o4 << shift;
        } else if chunk[0] != b'-' {
            return None;
        }
        if chunk[1] == b'w' {
            mode |= 0o2 << shift;
        } else if chunk[1] != b'-' {
            return None;
        }

        let special = 0o4000 >> class;
        match chunk[2] {
            b'x' => mode |= 0o1 << shift,
            b'-' => {}
            b's' if class < 2 => mode |= (0o1 << shift) | special,
            b'S' if class < 2 => mode |= special,
            b't' if class == 2 => mode |= 0o1 | 0o1000,
            b'T' if class == 2 => mode |= 0o1000,
            _ => return None,
        }
    }

    Some(mode)
}

/// Take the next whitespace-delimited field, returning it and the remainder
/// starting at the whitespace that ended it.
fn next_field(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    let end = input.find(char::is_whitespace).unwrap_or(input.len());
    Some((&input[..end], &input[end..]))
}

fn split_fields(input: &str, count: usize) -> Option<(Vec<&str>, &str)> {
    let mut fields = Vec::with_capacity(count);
    let mut rest = input;
    for _ in 0..count {
        let (field, remainder) = next_field(rest)?;
        fields.push(field);
        rest = remainder;
    }
    Some((fields, rest))
}
