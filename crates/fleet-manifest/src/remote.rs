use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleet_core::FleetError;
use serde::{Deserialize, Serialize};

use crate::record::ImageRecord;

/// One configured image source (§4.3). A remote optionally carries a
/// mirror URL that, when present, replaces the official URL at fetch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub mirror: Option<String>,
}

impl Remote {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Remote {
            name: name.into(),
            url: url.into(),
            mirror: None,
        }
    }

    pub fn effective_url(&self) -> &str {
        self.mirror.as_deref().unwrap_or(&self.url)
    }
}

/// A fetched, parsed catalog for one remote: an ordered set of image
/// records plus an alias-to-index lookup (§3 data model).
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ImageRecord>,
    alias_index: HashMap<String, usize>,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Top-level shape of a fetched manifest document: `{"images": [...]}`.
#[derive(Debug, Deserialize)]
struct ManifestDocument {
    images: Vec<ImageRecord>,
}

impl Manifest {
    pub fn from_entries(entries: Vec<ImageRecord>) -> Self {
        let alias_index = build_alias_index(&entries);
        Manifest {
            entries,
            alias_index,
            fetched_at: Some(Utc::now()),
        }
    }

    /// Parse a fetched manifest document (§4.3).
    pub fn parse(raw: &str) -> Result<Self, FleetError> {
        let document: ManifestDocument = serde_json::from_str(raw).map_err(|e| FleetError::Manifest {
            message: format!("failed to parse manifest: {}", e),
        })?;
        Ok(Self::from_entries(document.images))
    }

    pub fn find_alias(&self, alias: &str) -> Option<&ImageRecord> {
        self.alias_index.get(alias).map(|&idx| &self.entries[idx])
    }

    /// Find entries whose hash starts with `prefix`. Errors with
    /// `TooManyMatches` if more than one supported entry matches (§4.3).
    pub fn find_by_hash_prefix(&self, prefix: &str, allow_unsupported: bool) -> Result<Option<&ImageRecord>, FleetError> {
        let mut matches: Vec<&ImageRecord> = self
            .entries
            .iter()
            .filter(|e| (allow_unsupported || e.supported) && e.hash.as_str().starts_with(prefix))
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(FleetError::TooManyMatches),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn build_alias_index(entries: &[ImageRecord]) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        for alias in &entry.aliases {
            index.entry(alias.clone()).or_insert(idx);
        }
    }
    index
}
