use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use raoa_types::AlbumId;
use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};

/// Path of the album metadata sidecar.
pub const METADATA_FILE: &str = ".raoa.json";

/// Path of the autoadd marker sidecar.
pub const AUTOADD_FILE: &str = ".autoadd";

/// Album metadata stored in [`METADATA_FILE`].
///
/// Once `album_id` is assigned it never changes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbumMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<AlbumId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_title: Option<String>,
    /// Path of the entry used as the album's title image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_entry: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl AlbumMeta {
    pub fn new(album_id: AlbumId, title: impl Into<String>) -> Self {
        Self {
            album_id: Some(album_id),
            album_title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn from_json(bytes: &[u8]) -> RepoResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> RepoResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

/// Parse one autoadd line as an ISO-8601 instant.
///
/// Accepts RFC 3339 timestamps, offset-less date-times (taken as UTC) and
/// plain dates (midnight UTC).
pub fn parse_instant(line: &str) -> RepoResult<DateTime<Utc>> {
    let line = line.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(line) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(line, format) {
            return Ok(t.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(line, "%Y-%m-%d") {
        if let Some(t) = date.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    Err(RepoError::InvalidAutoadd {
        line: line.to_string(),
        reason: "not an ISO-8601 instant".into(),
    })
}

/// Decode the autoadd sidecar. Blank lines are skipped.
pub fn parse_autoadd(bytes: &[u8]) -> RepoResult<Vec<DateTime<Utc>>> {
    let text = std::str::from_utf8(bytes).map_err(|e| RepoError::InvalidAutoadd {
        line: String::new(),
        reason: format!("not UTF-8: {e}"),
    })?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_instant)
        .collect()
}

/// Encode autoadd instants, sorted and deduplicated, one per line.
pub fn render_autoadd(instants: &[DateTime<Utc>]) -> Vec<u8> {
    let mut sorted = instants.to_vec();
    sorted.sort();
    sorted.dedup();
    let mut out = String::new();
    for instant in sorted {
        out.push_str(&instant.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        out.push('\n');
    }
    out.into_bytes()
}
