//! Platforms and the extension index built from a registry snapshot
//!
//! Registry records may describe a platform's extensions three ways:
//! a pre-parsed list, a JSON-array string (sometimes hand-edited into plain
//! comma-separated text), or a single legacy field. [`ExtensionSource`]
//! names the variants; [`PlatformExtensionIndex::build`] resolves them once
//! per snapshot so detection never re-parses per file.

use romhold_common::events::PlatformOption;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Platform record as supplied by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub name: String,

    /// Pre-parsed extension list
    #[serde(
        default,
        deserialize_with = "lenient_list",
        skip_serializing_if = "Option::is_none"
    )]
    pub extensions: Option<Vec<String>>,

    /// JSON-array-encoded extension list, e.g. `["snes", "smc"]`
    #[serde(
        default,
        deserialize_with = "lenient_encoded",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_extensions: Option<String>,

    /// Legacy single extension
    #[serde(
        default,
        deserialize_with = "lenient_single",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_extension: Option<String>,
}

/// Decode a registry payload one record at a time
///
/// Records without a usable `id`/`name` are logged and skipped; the rest of
/// the snapshot survives.
pub fn decode_platforms(records: Vec<Value>) -> Vec<Platform> {
    let total = records.len();
    let platforms: Vec<Platform> = records
        .into_iter()
        .enumerate()
        .filter_map(|(position, record)| match serde_json::from_value::<Platform>(record) {
            Ok(platform) => Some(platform),
            Err(e) => {
                tracing::warn!(position, error = %e, "Skipping malformed platform record");
                None
            }
        })
        .collect();

    if platforms.len() < total {
        tracing::warn!(kept = platforms.len(), total, "Registry snapshot had malformed records");
    }
    platforms
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `extensions`: an array (non-text items dropped) or an encoded string
fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(items.iter().filter_map(scalar_text).collect()),
        Some(Value::String(encoded)) => Some(parse_encoded_extensions(&encoded)),
        _ => None,
    })
}

/// `file_extensions`: a string, or an already-decoded array re-encoded
fn lenient_encoded<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(Value::Array(items).to_string()),
        Some(other) => scalar_text(&other),
        None => None,
    })
}

/// `file_extension`: a string or number; an array contributes its first entry
fn lenient_single<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items.iter().find_map(scalar_text),
        Some(other) => scalar_text(&other),
        None => None,
    })
}

impl Platform {
    /// Platform with a pre-parsed extension list
    pub fn with_list(id: i64, name: impl Into<String>, extensions: &[&str]) -> Self {
        Self {
            id,
            name: name.into(),
            extensions: Some(extensions.iter().map(|e| e.to_string()).collect()),
            file_extensions: None,
            file_extension: None,
        }
    }

    /// Platform with a JSON-encoded extension string
    pub fn with_encoded(id: i64, name: impl Into<String>, encoded: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            extensions: None,
            file_extensions: Some(encoded.into()),
            file_extension: None,
        }
    }

    /// Platform with only the legacy single-extension field
    pub fn with_legacy(id: i64, name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            extensions: None,
            file_extensions: None,
            file_extension: Some(extension.into()),
        }
    }

    /// Extension sources present on this record, in resolution order
    pub fn extension_sources(&self) -> Vec<ExtensionSource<'_>> {
        let mut sources = Vec::with_capacity(3);
        if let Some(list) = &self.extensions {
            sources.push(ExtensionSource::List(list));
        }
        if let Some(encoded) = &self.file_extensions {
            sources.push(ExtensionSource::Encoded(encoded));
        }
        if let Some(legacy) = &self.file_extension {
            sources.push(ExtensionSource::Legacy(legacy));
        }
        sources
    }

    /// Normalized extensions from the first source that yields any
    ///
    /// Empty when no source yields an extension; never fails.
    pub fn resolve_extensions(&self) -> Vec<String> {
        self.extension_sources()
            .into_iter()
            .map(|source| source.extract())
            .find(|extensions| !extensions.is_empty())
            .unwrap_or_default()
    }
}

/// One encoding of a platform's extension set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionSource<'a> {
    List(&'a [String]),
    Encoded(&'a str),
    Legacy(&'a str),
}

impl ExtensionSource<'_> {
    /// Normalized, de-duplicated extensions from this source
    pub fn extract(&self) -> Vec<String> {
        let raw: Vec<String> = match self {
            ExtensionSource::List(list) => list.to_vec(),
            ExtensionSource::Encoded(encoded) => parse_encoded_extensions(encoded),
            ExtensionSource::Legacy(legacy) => vec![legacy.to_string()],
        };

        let mut seen = HashSet::new();
        raw.iter()
            .filter_map(|token| normalize_extension(token))
            .filter(|ext| seen.insert(ext.clone()))
            .collect()
    }
}

/// Parse a JSON-array string, falling back to comma-separated text
fn parse_encoded_extensions(encoded: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Ok(Value::String(s)) => split_comma_separated(&s),
        _ => split_comma_separated(encoded),
    }
}

fn split_comma_separated(text: &str) -> Vec<String> {
    text.split(',')
        .map(|part| {
            part.trim_matches(|c: char| c.is_whitespace() || matches!(c, '[' | ']' | '"' | '\''))
                .to_string()
        })
        .filter(|part| !part.is_empty())
        .collect()
}

/// Lowercase, trim, and strip leading dots; `None` if nothing remains
pub fn normalize_extension(token: &str) -> Option<String> {
    let trimmed = token.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Platform that contributed at least one extension to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedPlatform {
    pub id: i64,
    pub name: String,
    pub extensions: Vec<String>,
}

impl IndexedPlatform {
    pub fn option(&self) -> PlatformOption {
        PlatformOption {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Read-only extension → platforms view of one registry snapshot
#[derive(Debug, Clone, Default)]
pub struct PlatformExtensionIndex {
    /// Registry order; platforms without extensions are excluded
    platforms: Vec<IndexedPlatform>,
    /// Extension → positions in `platforms`, ascending
    by_extension: HashMap<String, Vec<usize>>,
    /// Every platform id in the snapshot, including excluded ones
    known_ids: HashMap<i64, String>,
    /// Every platform in registry order, including excluded ones
    all: Vec<PlatformOption>,
}

impl PlatformExtensionIndex {
    /// Resolve every platform's extension encoding once
    pub fn build(platforms: &[Platform]) -> Self {
        let mut index = Self::default();

        for platform in platforms {
            if index.known_ids.contains_key(&platform.id) {
                tracing::warn!(
                    platform_id = platform.id,
                    name = %platform.name,
                    "Duplicate platform id in registry snapshot, keeping first"
                );
                continue;
            }
            index.known_ids.insert(platform.id, platform.name.clone());
            index.all.push(PlatformOption {
                id: platform.id,
                name: platform.name.clone(),
            });

            let extensions = platform.resolve_extensions();
            if extensions.is_empty() {
                tracing::debug!(
                    platform_id = platform.id,
                    name = %platform.name,
                    "Platform has no usable extensions, excluded from matching"
                );
                continue;
            }

            let position = index.platforms.len();
            for ext in &extensions {
                index.by_extension.entry(ext.clone()).or_default().push(position);
            }
            index.platforms.push(IndexedPlatform {
                id: platform.id,
                name: platform.name.clone(),
                extensions,
            });
        }

        tracing::debug!(
            platforms = index.platforms.len(),
            extensions = index.by_extension.len(),
            "Built platform extension index"
        );

        index
    }

    /// Platforms claiming an extension, in registry order
    ///
    /// The extension is normalized before lookup.
    pub fn lookup(&self, extension: &str) -> Vec<&IndexedPlatform> {
        let Some(ext) = normalize_extension(extension) else {
            return Vec::new();
        };
        self.by_extension
            .get(&ext)
            .map(|positions| positions.iter().map(|&i| &self.platforms[i]).collect())
            .unwrap_or_default()
    }

    /// Whether the snapshot contains this platform id at all
    pub fn contains_platform(&self, id: i64) -> bool {
        self.known_ids.contains_key(&id)
    }

    /// Display name for a platform id in the snapshot
    pub fn platform_name(&self, id: i64) -> Option<&str> {
        self.known_ids.get(&id).map(String::as_str)
    }

    /// Every platform in the snapshot as a selectable option, registry order
    ///
    /// Includes platforms without usable extensions: they cannot be
    /// detected but may still be assigned.
    pub fn options(&self) -> Vec<PlatformOption> {
        self.all.clone()
    }

    /// Platforms that contributed extensions
    pub fn platforms(&self) -> &[IndexedPlatform] {
        &self.platforms
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}
