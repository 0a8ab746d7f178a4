//! Output field list construction.
//!
//! The list starts from the codebook's variables, gains one `<FIELD>_bucketed`
//! column per bucketed variable, loses eliminated columns, and finally gains
//! the derived PUMA area column. It is frozen before the first record.

use std::collections::HashSet;

use itertools::Itertools;
use log::{debug, warn};

use crate::{
    buckets::{BucketCatalog, BucketDefinition},
    codebook::Codebook,
};

pub const BUCKETED_SUFFIX: &str = "_bucketed";
pub const SPOUSE_SUFFIX: &str = "_SP";
pub const STATEFIP: &str = "STATEFIP";
pub const PUMA: &str = "PUMA";
pub const PUMASUPR: &str = "PUMASUPR";
pub const PUMA_AREA_FIELD: &str = "PUMAAREA";

#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    /// Bucket identifiers, in request order.
    pub buckets: Vec<String>,
    /// Keep the pre-bucketed columns next to their `_bucketed` counterparts.
    pub keep_original: bool,
    /// Columns removed from the output.
    pub ignore: Vec<String>,
    /// Derive the state+PUMA composite key and the PUMA area column.
    pub full_pumas: bool,
}

/// A variable whose raw code is run through a bucket definition.
#[derive(Debug, Clone)]
pub struct BucketTarget {
    pub field: String,
    pub output: String,
    pub definition: BucketDefinition,
    /// Whether `field` itself survives in the output.
    pub keep_field: bool,
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    fields: Vec<String>,
    targets: Vec<BucketTarget>,
    full_pumas: bool,
}

impl FieldSchema {
    pub fn build(codebook: &Codebook, catalog: &BucketCatalog, options: &FieldOptions) -> Self {
        let mut fields: Vec<String> = codebook.variables().map(str::to_string).collect();
        let mut targets: Vec<BucketTarget> = Vec::new();
        let mut requested: HashSet<&str> = HashSet::new();

        for bucket_id in &options.buckets {
            if !requested.insert(bucket_id.as_str()) {
                warn!("Bucket '{bucket_id}' was requested more than once; ignoring the repeat");
                continue;
            }
            let Some(definition) = catalog.get(bucket_id) else {
                warn!("Couldn't find a bucket matching '{bucket_id}'");
                continue;
            };
            let spouse = format!("{}{SPOUSE_SUFFIX}", definition.field);
            let bucket_fields: Vec<String> = [definition.field.clone(), spouse]
                .into_iter()
                .filter(|field| codebook.has_variable(field))
                .collect();
            if bucket_fields.is_empty() {
                warn!(
                    "Bucket '{bucket_id}' applies to '{}', which is not in the codebook; skipping",
                    definition.field
                );
                continue;
            }
            for field in bucket_fields {
                if targets.iter().any(|target| target.field == field) {
                    warn!("Field '{field}' is already bucketed; ignoring bucket '{bucket_id}' for it");
                    continue;
                }
                let output = format!("{field}{BUCKETED_SUFFIX}");
                debug!("Bucketing '{field}' into '{output}' with '{bucket_id}'");
                fields.push(output.clone());
                targets.push(BucketTarget {
                    field,
                    output,
                    definition: definition.clone(),
                    keep_field: true,
                });
            }
        }

        let mut eliminate: HashSet<&str> = HashSet::new();
        if !options.keep_original {
            eliminate.extend(targets.iter().map(|target| target.field.as_str()));
        }
        eliminate.extend(
            options
                .ignore
                .iter()
                .map(String::as_str)
                .filter(|name| !name.is_empty()),
        );
        if !eliminate.is_empty() {
            debug!("Eliminating fields: {}", eliminate.iter().sorted().join(", "));
        }
        let mut fields: Vec<String> = fields
            .into_iter()
            .filter(|name| !eliminate.contains(name.as_str()))
            .collect();

        let mut full_pumas = options.full_pumas;
        if full_pumas {
            let has_puma = codebook.has_variable(PUMA) || codebook.has_variable(PUMASUPR);
            if !codebook.has_variable(STATEFIP) || !has_puma {
                warn!(
                    "For --full-pumas to work, the extract needs both '{PUMA}' (or '{PUMASUPR}') and '{STATEFIP}'. Ignoring."
                );
                full_pumas = false;
            } else if !fields.iter().any(|name| name == PUMA_AREA_FIELD) {
                fields.push(PUMA_AREA_FIELD.to_string());
            }
        }

        for target in &mut targets {
            target.keep_field = fields.contains(&target.field);
        }

        FieldSchema {
            fields,
            targets,
            full_pumas,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn targets(&self) -> &[BucketTarget] {
        &self.targets
    }

    pub fn full_pumas(&self) -> bool {
        self.full_pumas
    }
}
