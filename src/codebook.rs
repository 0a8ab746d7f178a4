//! Codebook model and `.cbk` parsing.
//!
//! A codebook carries two things the transcoder needs:
//!
//! - the column dictionary, an ordered list of [`ColumnSpec`] entries giving
//!   each variable's 1-based inclusive character range in the `.dat` file;
//! - value-label tables mapping a variable's raw codes to readable labels.
//!
//! Dictionary order is significant: it seeds the output field order.

use std::{
    collections::{HashMap, hash_map::Entry},
    fs,
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result};
use log::{debug, warn};
use regex::Regex;

use crate::error::TranscodeError;

pub type ValueLabels = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub variable: String,
    /// First character, 1-based.
    pub start: usize,
    /// Last character, 1-based and inclusive.
    pub end: usize,
}

impl ColumnSpec {
    pub fn new(variable: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            variable: variable.into(),
            start,
            end,
        }
    }

    pub fn width(&self) -> usize {
        self.end + 1 - self.start
    }
}

#[derive(Debug, Clone, Default)]
pub struct Codebook {
    pub description: String,
    pub dictionary: Vec<ColumnSpec>,
    pub definitions: HashMap<String, ValueLabels>,
    positions: HashMap<String, usize>,
}

fn dictionary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Z][A-Z0-9_]*)\s+(?:[A-Z]\s+)?(\d+)(?:-(\d+))?(?:\s|$)")
            .expect("valid dictionary pattern")
    })
}

fn description_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*Description:\s*(.+?)\s*$").expect("valid pattern"))
}

impl Codebook {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    /// Appends a column to the dictionary. Returns `false` when the variable
    /// was already declared, in which case the dictionary is left unchanged.
    pub fn push_column(&mut self, spec: ColumnSpec) -> bool {
        match self.positions.entry(spec.variable.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(self.dictionary.len());
                self.dictionary.push(spec);
                true
            }
        }
    }

    pub fn insert_labels(&mut self, variable: impl Into<String>, labels: ValueLabels) {
        self.definitions.insert(variable.into(), labels);
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.dictionary.iter().map(|spec| spec.variable.as_str())
    }

    pub fn labels_for(&self, variable: &str) -> Option<&ValueLabels> {
        self.definitions.get(variable)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Reading codebook {path:?}"))?;
        let fallback = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("extract");
        Self::parse(&text, fallback).with_context(|| format!("Parsing codebook {path:?}"))
    }

    /// Parses codebook text. `fallback_description` names the table when the
    /// text carries no `Description:` line.
    pub fn parse(text: &str, fallback_description: &str) -> Result<Self> {
        let mut codebook = Codebook::new(String::new());
        let mut description: Option<String> = None;
        let mut open_block: Option<(String, ValueLabels)> = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                if let Some((variable, labels)) = open_block.take() {
                    codebook.insert_labels(variable, labels);
                }
                continue;
            }

            if let Some((_, labels)) = open_block.as_mut() {
                let trimmed = line.trim();
                let (code, label) = match trimmed.split_once(char::is_whitespace) {
                    Some((code, label)) => (code, label.trim()),
                    None => (trimmed, ""),
                };
                labels.insert(code.to_string(), label.to_string());
                continue;
            }

            if description.is_none() {
                if let Some(caps) = description_pattern().captures(line) {
                    description = Some(caps[1].to_string());
                    continue;
                }
            }

            if let Some(caps) = dictionary_pattern().captures(line) {
                let variable = caps[1].to_string();
                let start: usize = caps[2].parse().context("Parsing column start")?;
                let end: usize = match caps.get(3) {
                    Some(m) => m.as_str().parse().context("Parsing column end")?,
                    None => start,
                };
                if start == 0 || end < start {
                    return Err(TranscodeError::InvalidColumnRange {
                        line: line_no,
                        variable,
                        start,
                        end,
                    }
                    .into());
                }
                if !codebook.push_column(ColumnSpec::new(variable.clone(), start, end)) {
                    warn!("Codebook line {line_no}: variable '{variable}' declared twice; keeping the first");
                }
                continue;
            }

            let first = line.split_whitespace().next().unwrap_or_default();
            if codebook.has_variable(first) {
                debug!("Codebook line {line_no}: value labels for '{first}'");
                open_block = Some((first.to_string(), ValueLabels::new()));
            }
        }

        if let Some((variable, labels)) = open_block.take() {
            codebook.insert_labels(variable, labels);
        }

        codebook.description = description.unwrap_or_else(|| fallback_description.to_string());
        debug!(
            "Parsed codebook '{}' with {} variable(s) and {} label table(s)",
            codebook.description,
            codebook.dictionary.len(),
            codebook.definitions.len()
        );
        Ok(codebook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Description: usa_00012

Variable               Columns        Len    2019
YEAR          H      1-4             4     X     Census year
STATEFIP      H      5-6             2     X     State (FIPS code)
SEX           P      7               1     X     Sex
AGE           P      8-10            3     X     Age

STATEFIP         State (FIPS code)
01               Alabama
36               New York

SEX              Sex
1                Male
2                Female
";

    #[test]
    fn parse_reads_dictionary_in_order() {
        let codebook = Codebook::parse(SAMPLE, "fallback").unwrap();
        assert_eq!(codebook.description, "usa_00012");
        let names: Vec<&str> = codebook.variables().collect();
        assert_eq!(names, vec!["YEAR", "STATEFIP", "SEX", "AGE"]);
        assert_eq!(codebook.dictionary[2], ColumnSpec::new("SEX", 7, 7));
        assert_eq!(codebook.dictionary[3].width(), 3);
    }

    #[test]
    fn parse_reads_value_label_blocks() {
        let codebook = Codebook::parse(SAMPLE, "fallback").unwrap();
        let states = codebook.labels_for("STATEFIP").unwrap();
        assert_eq!(states.get("36").map(String::as_str), Some("New York"));
        assert_eq!(states.get("01").map(String::as_str), Some("Alabama"));
        let sex = codebook.labels_for("SEX").unwrap();
        assert_eq!(sex.len(), 2);
        assert!(codebook.labels_for("YEAR").is_none());
    }

    #[test]
    fn parse_falls_back_to_provided_description() {
        let codebook = Codebook::parse("A 1-2\n", "extract_7").unwrap();
        assert_eq!(codebook.description, "extract_7");
        assert_eq!(codebook.dictionary.len(), 1);
    }

    #[test]
    fn parse_rejects_inverted_ranges() {
        let err = Codebook::parse("A 5-2\n", "x").unwrap_err();
        let domain = err.downcast_ref::<TranscodeError>().unwrap();
        assert!(matches!(
            domain,
            TranscodeError::InvalidColumnRange { start: 5, end: 2, .. }
        ));
    }

    #[test]
    fn duplicate_variables_keep_first_declaration() {
        let codebook = Codebook::parse("A 1-2\nA 3-4\n", "x").unwrap();
        assert_eq!(codebook.dictionary, vec![ColumnSpec::new("A", 1, 2)]);
    }
}
