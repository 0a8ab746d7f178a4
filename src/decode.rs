//! Fixed-width record decoding.
//!
//! Each line is sliced by the codebook's 1-based inclusive column ranges.
//! Variables with a value-label table decode through their label (missing
//! codes become `"N/A"`); the rest decode from the raw substring. Variable
//! specific adjustments live in [`PostProcessRules`] rather than in the loop.

use std::collections::HashMap;

use crate::{
    codebook::{Codebook, ColumnSpec},
    data::{Value, coerce, parse_leading_int},
};

pub const MISSING_LABEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatumEntry {
    pub val: Value,
    pub label: String,
    /// Substring exactly as it appeared in the input line.
    pub raw: String,
}

impl DatumEntry {
    pub fn derived(val: Value) -> Self {
        Self {
            val,
            ..Self::default()
        }
    }
}

/// Decoded values for one input line, keyed by variable or derived field name.
#[derive(Debug, Default)]
pub struct Datum<'a> {
    entries: HashMap<&'a str, DatumEntry>,
}

impl<'a> Datum<'a> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DatumEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: &'a str, entry: DatumEntry) {
        self.entries.insert(name, entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<DatumEntry> {
        self.entries.remove(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostProcessRule {
    /// Divide numeric values, for fields stored with implicit decimals.
    ScaleDown(f64),
    /// Replace the value with the leading integer of the raw substring.
    LeadingInteger,
}

impl PostProcessRule {
    fn apply(&self, val: Value, raw: &str) -> Value {
        match self {
            PostProcessRule::ScaleDown(divisor) => val.scaled_down(*divisor),
            PostProcessRule::LeadingInteger => parse_leading_int(raw)
                .map(Value::Integer)
                .unwrap_or_else(|| Value::Text(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostProcessRules {
    rules: HashMap<String, Vec<PostProcessRule>>,
}

impl PostProcessRules {
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, variable: &str, rule: PostProcessRule) -> Self {
        self.rules.entry(variable.to_string()).or_default().push(rule);
        self
    }

    pub fn rules_for(&self, variable: &str) -> &[PostProcessRule] {
        self.rules.get(variable).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn apply(&self, variable: &str, val: Value, raw: &str) -> Value {
        self.rules_for(variable)
            .iter()
            .fold(val, |current, rule| rule.apply(current, raw))
    }
}

impl Default for PostProcessRules {
    /// Person and household weights carry two implicit decimals; AGE labels
    /// such as "Less than 1 year old" are replaced by the numeric code.
    fn default() -> Self {
        Self::empty()
            .with_rule("PERWT", PostProcessRule::ScaleDown(100.0))
            .with_rule("HHWT", PostProcessRule::ScaleDown(100.0))
            .with_rule("AGE", PostProcessRule::LeadingInteger)
    }
}

/// Character-addressable view of one input line.
struct LineView<'l> {
    line: &'l str,
    char_offsets: Option<Vec<usize>>,
}

impl<'l> LineView<'l> {
    fn new(line: &'l str) -> Self {
        let char_offsets = if line.is_ascii() {
            None
        } else {
            Some(line.char_indices().map(|(idx, _)| idx).collect())
        };
        Self { line, char_offsets }
    }

    fn byte_offset(&self, char_pos: usize) -> usize {
        match &self.char_offsets {
            None => char_pos.min(self.line.len()),
            Some(offsets) => offsets.get(char_pos).copied().unwrap_or(self.line.len()),
        }
    }

    /// Columns past the end of the line yield a short or empty slice.
    fn slice(&self, spec: &ColumnSpec) -> &'l str {
        let begin = self.byte_offset(spec.start.saturating_sub(1));
        let end = self.byte_offset(spec.end).max(begin);
        &self.line[begin..end]
    }
}

pub struct RecordDecoder<'a> {
    codebook: &'a Codebook,
    rules: &'a PostProcessRules,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(codebook: &'a Codebook, rules: &'a PostProcessRules) -> Self {
        Self { codebook, rules }
    }

    pub fn decode(&self, line: &str) -> Datum<'a> {
        let view = LineView::new(line);
        let mut datum = Datum::with_capacity(self.codebook.dictionary.len() + 4);
        for spec in &self.codebook.dictionary {
            let raw = view.slice(spec);
            let (val, label) = match self.codebook.labels_for(&spec.variable) {
                Some(labels) => {
                    let label = labels
                        .get(raw)
                        .map(String::as_str)
                        .unwrap_or(MISSING_LABEL);
                    (coerce(label), label.to_string())
                }
                None => (coerce(raw), String::new()),
            };
            let val = self.rules.apply(&spec.variable, val, raw);
            datum.insert(
                spec.variable.as_str(),
                DatumEntry {
                    val,
                    label,
                    raw: raw.to_string(),
                },
            );
        }
        datum
    }
}
