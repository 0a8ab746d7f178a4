use std::{fs, path::Path};

use anyhow::{Context, Result};
use itertools::Itertools;

/// Every column is declared as nullable text; widths are not inferred.
pub const COLUMN_TYPE: &str = "varchar(64) DEFAULT NULL";

pub fn render_create_table(description: &str, fields: &[String]) -> String {
    let columns = fields
        .iter()
        .map(|field| format!("`{}` {COLUMN_TYPE}", escape_identifier(field)))
        .join(",\n");
    format!(
        "CREATE TABLE `{}`(\n{columns}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8",
        escape_identifier(description)
    )
}

pub fn write_create_table(path: &Path, description: &str, fields: &[String]) -> Result<()> {
    fs::write(path, render_create_table(description, fields))
        .with_context(|| format!("Writing CREATE TABLE statement to {path:?}"))
}

fn escape_identifier(name: &str) -> String {
    name.replace('`', "``")
}
