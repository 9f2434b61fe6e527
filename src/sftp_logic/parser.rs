//! Long-format (`ls -alh`) listing parser
//!
//! The field grammar is the contract with the shell on either backend:
//! permissions, link count, owner, group, size (optional unit suffix), month,
//! day, time-or-year, then the name as the remainder of the line.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::types::{DirectoryEntry, EntryKind};
use crate::error::{EngineError, Result};

static LISTING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<permissions>[bcdlpsD-][rwxsStTl-]{9}[@+.]?)\s+(?P<links>\d+)\s+(?P<owner>\S+)\s+(?P<group>\S+)\s+(?P<size>\d+(?:[.,]\d+)?[BKMGTP]?)\s+(?P<month>\S+)\s+(?P<day>\d{1,2})\s+(?P<time>\d{1,2}:\d{2}|\d{4})\s+(?P<name>.+)$",
    )
    .expect("listing pattern is valid")
});

/// Parse one listing record.
///
/// Blank lines, `total N` headers and anything else that does not match the
/// fixed-field grammar yield [`EngineError::Parse`].
pub fn parse_line(line: &str) -> Result<DirectoryEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let caps = LISTING_LINE
        .captures(line)
        .ok_or_else(|| EngineError::Parse(line.to_string()))?;

    let permissions = caps["permissions"].to_string();
    let links = caps["links"]
        .parse::<u64>()
        .map_err(|_| EngineError::Parse(line.to_string()))?;
    let kind = if permissions.starts_with('d') {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    let raw_name = &caps["name"];
    let (name, link_target) = if permissions.starts_with('l') {
        match raw_name.split_once(" -> ") {
            Some((name, target)) => (name.to_string(), Some(target.to_string())),
            None => (raw_name.to_string(), None),
        }
    } else {
        (raw_name.to_string(), None)
    };

    if name.is_empty() || name.contains('/') {
        return Err(EngineError::Parse(line.to_string()));
    }

    let size = caps["size"].to_string();
    let size_bytes = human_size_to_bytes(&size);

    Ok(DirectoryEntry {
        name,
        kind,
        size,
        size_bytes,
        permissions,
        links,
        owner: caps["owner"].to_string(),
        group: caps["group"].to_string(),
        modified: format!("{} {} {}", &caps["month"], &caps["day"], &caps["time"]),
        link_target,
    })
}

/// Parse a whole listing, skipping unparseable lines and the `.`/`..` pseudo entries
pub fn parse_listing<S: AsRef<str>>(lines: &[S]) -> Vec<DirectoryEntry> {
    let mut entries = Vec::with_capacity(lines.len());
    for line in lines {
        match parse_line(line.as_ref()) {
            Ok(entry) if is_pseudo_entry(&entry.name) => {}
            Ok(entry) => entries.push(entry),
            Err(_) => debug!("Skipping listing line {:?}", line.as_ref()),
        }
    }
    entries
}

pub fn is_pseudo_entry(name: &str) -> bool {
    name == "." || name == ".."
}

/// Decode an `ls -h` size token (`512`, `160B`, `4.0K`, `1,5M`) into bytes
pub fn human_size_to_bytes(token: &str) -> Option<u64> {
    let token = token.trim();
    let (number, unit) = match token.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&token[..idx], Some(c)),
        Some(_) => (token, None),
        None => return None,
    };

    let multiplier: u64 = match unit {
        None | Some('B') => 1,
        Some('K') => 1 << 10,
        Some('M') => 1 << 20,
        Some('G') => 1 << 30,
        Some('T') => 1 << 40,
        Some('P') => 1 << 50,
        Some(_) => return None,
    };

    let value: f64 = number.replace(',', ".").parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier as f64).round() as u64)
}
