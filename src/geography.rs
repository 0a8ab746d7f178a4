//! PUMA geography derivation.
//!
//! PUMA codes are only unique within a state, so the augmenter prefixes the
//! raw PUMA with the raw STATEFIP and resolves the composite against a static
//! table of PUMA areas.

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::BufReader,
    path::Path,
};

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::{
    data::Value,
    decode::{Datum, DatumEntry},
    error::TranscodeError,
    fields::{PUMA, PUMA_AREA_FIELD, PUMASUPR, STATEFIP},
};

#[derive(Debug, Deserialize)]
struct GeographyRecord {
    area: Value,
}

#[derive(Debug, Clone, Default)]
pub struct GeographyTable {
    areas: HashMap<String, Value>,
}

impl GeographyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, area: Value) {
        self.areas.insert(key.into(), area);
    }

    pub fn area(&self, key: &str) -> Option<&Value> {
        self.areas.get(key)
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let records: HashMap<String, GeographyRecord> =
            serde_json::from_str(text).context("Parsing geography table JSON")?;
        Ok(Self::from_records(records))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Opening geography table {path:?}"))?;
        let records: HashMap<String, GeographyRecord> =
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Parsing geography table {path:?}"))?;
        let table = Self::from_records(records);
        debug!("Loaded {} geography entries from {path:?}", table.len());
        Ok(table)
    }

    fn from_records(records: HashMap<String, GeographyRecord>) -> Self {
        Self {
            areas: records
                .into_iter()
                .map(|(key, record)| (key, record.area))
                .collect(),
        }
    }
}

/// What to do when a composite key has no entry in the geography table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingGeographyPolicy {
    /// Warn once per distinct key and emit an empty area.
    #[default]
    Warn,
    /// Abort the run.
    Fail,
}

pub struct GeographyAugmenter<'t> {
    table: &'t GeographyTable,
    policy: MissingGeographyPolicy,
    reported: HashSet<String>,
    misses: usize,
}

impl<'t> GeographyAugmenter<'t> {
    pub fn new(table: &'t GeographyTable, policy: MissingGeographyPolicy) -> Self {
        Self {
            table,
            policy,
            reported: HashSet::new(),
            misses: 0,
        }
    }

    /// Records whose composite key was absent from the table.
    pub fn misses(&self) -> usize {
        self.misses
    }

    pub fn augment(&mut self, datum: &mut Datum<'_>, line: usize) -> Result<(), TranscodeError> {
        if let Some(puma) = datum.get(PUMA) {
            let state = datum.get(STATEFIP).map_or("", |entry| entry.raw.as_str());
            let composite = format!("{state}{}", puma.raw);
            let table = self.table;
            let area = match table.area(&composite) {
                Some(area) => area.clone(),
                None => self.missing(&composite, line)?,
            };
            datum.insert(PUMA, passthrough_entry(composite));
            datum.insert(PUMA_AREA_FIELD, DatumEntry::derived(area));
        } else if let Some(supr) = datum.get(PUMASUPR) {
            let raw = supr.raw.clone();
            datum.insert(PUMASUPR, passthrough_entry(raw));
            datum.insert(PUMA_AREA_FIELD, DatumEntry::derived(Value::default()));
        }
        Ok(())
    }

    fn missing(&mut self, key: &str, line: usize) -> Result<Value, TranscodeError> {
        self.misses += 1;
        match self.policy {
            MissingGeographyPolicy::Fail => Err(TranscodeError::MissingGeography {
                key: key.to_string(),
                line,
            }),
            MissingGeographyPolicy::Warn => {
                if self.reported.insert(key.to_string()) {
                    warn!("Geography key '{key}' (first seen on line {line}) has no PUMA area; leaving it empty");
                }
                Ok(Value::default())
            }
        }
    }
}

/// The composite code is kept as text so leading zeros survive.
fn passthrough_entry(code: String) -> DatumEntry {
    DatumEntry {
        val: Value::Text(code.clone()),
        label: String::new(),
        raw: code,
    }
}
