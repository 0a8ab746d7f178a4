//! Bucket catalog and memoized bucket resolution.
//!
//! A bucket collapses a numeric variable into coarser labelled ranges. The
//! catalog is loaded once from a directory of YAML/JSON files and is immutable
//! afterwards; the per-run memo lives in [`BucketResolver`], keyed by bucket
//! identifier and raw code.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::{
    data::{Value, parse_leading_int},
    error::TranscodeError,
};

const CATALOG_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Clone, PartialEq)]
pub struct BucketRange {
    pub low: i64,
    pub high: i64,
    pub label: Value,
}

impl BucketRange {
    pub fn contains(&self, value: i64) -> bool {
        self.low <= value && value <= self.high
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketDefinition {
    pub id: String,
    pub field: String,
    pub ranges: Vec<BucketRange>,
}

impl BucketDefinition {
    /// Classifies a raw code. The first range containing the parsed integer
    /// wins; an unmatched integer passes through unchanged, and a code with no
    /// leading integer passes through as text.
    pub fn classify(&self, raw: &str) -> Value {
        match parse_leading_int(raw) {
            Some(parsed) => self
                .ranges
                .iter()
                .find(|range| range.contains(parsed))
                .map(|range| range.label.clone())
                .unwrap_or(Value::Integer(parsed)),
            None => Value::Text(raw.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BucketFileEntry {
    field: String,
    buckets: Vec<(i64, i64, Value)>,
}

impl BucketFileEntry {
    fn into_definition(self, id: &str) -> Result<BucketDefinition, TranscodeError> {
        let ranges = self
            .buckets
            .into_iter()
            .enumerate()
            .map(|(position, (low, high, label))| {
                if low > high {
                    return Err(TranscodeError::InvalidBucketRange {
                        bucket: id.to_string(),
                        position,
                        reason: format!("low bound {low} exceeds high bound {high}"),
                    });
                }
                Ok(BucketRange { low, high, label })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(BucketDefinition {
            id: id.to_string(),
            field: self.field,
            ranges,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct BucketCatalog {
    definitions: BTreeMap<String, BucketDefinition>,
}

impl BucketCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition, returning the one it replaced.
    pub fn insert(&mut self, definition: BucketDefinition) -> Option<BucketDefinition> {
        self.definitions.insert(definition.id.clone(), definition)
    }

    pub fn get(&self, id: &str) -> Option<&BucketDefinition> {
        self.definitions.get(id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BucketDefinition> {
        self.definitions.values()
    }

    /// Loads every catalog file in `dir`, in file-name order. A missing
    /// directory yields an empty catalog.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = BucketCatalog::new();
        if !dir.is_dir() {
            warn!("Bucket directory {dir:?} not found; no buckets are available");
            return Ok(catalog);
        }
        let mut files = fs::read_dir(dir)
            .with_context(|| format!("Listing bucket directory {dir:?}"))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<PathBuf>>>()
            .with_context(|| format!("Listing bucket directory {dir:?}"))?;
        files.retain(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        CATALOG_EXTENSIONS
                            .iter()
                            .any(|known| ext.eq_ignore_ascii_case(known))
                    })
        });
        files.sort();

        for path in files {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Reading bucket file {path:?}"))?;
            catalog
                .merge_str(&text)
                .with_context(|| format!("Parsing bucket file {path:?}"))?;
        }
        debug!("Loaded {} bucket definition(s) from {dir:?}", catalog.len());
        Ok(catalog)
    }

    /// Merges the definitions in one catalog document. JSON documents are
    /// accepted since they are valid YAML.
    pub fn merge_str(&mut self, text: &str) -> Result<()> {
        let entries: BTreeMap<String, BucketFileEntry> = serde_yaml::from_str(text)?;
        for (id, entry) in entries {
            let definition = entry.into_definition(&id)?;
            if self.insert(definition).is_some() {
                warn!("Two bucket files define the key '{id}'; the later file wins");
            }
        }
        Ok(())
    }
}

/// Resolves raw codes through bucket definitions, remembering each result by
/// bucket identifier and raw code for the rest of the run.
#[derive(Debug, Default)]
pub struct BucketResolver {
    memo: HashMap<String, HashMap<String, Value>>,
}

impl BucketResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&mut self, definition: &BucketDefinition, raw: &str) -> Value {
        if let Some(hit) = self
            .memo
            .get(&definition.id)
            .and_then(|cache| cache.get(raw))
        {
            return hit.clone();
        }
        let resolved = definition.classify(raw);
        self.memo
            .entry(definition.id.clone())
            .or_default()
            .insert(raw.to_string(), resolved.clone());
        resolved
    }

    /// Number of distinct raw codes remembered for `bucket_id`.
    pub fn cached_codes(&self, bucket_id: &str) -> usize {
        self.memo.get(bucket_id).map_or(0, HashMap::len)
    }
}
