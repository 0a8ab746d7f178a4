//! Codebook and bucket catalog listings.

use anyhow::{Context, Result};
use log::info;

use crate::{
    buckets::BucketCatalog,
    cli::{BucketsArgs, ColumnsArgs},
    codebook::Codebook,
    io_utils::ExtractPaths,
    table::{Align, TextTable},
};

pub fn execute(args: &ColumnsArgs) -> Result<()> {
    let paths = ExtractPaths::from_base(&args.base);
    let codebook = Codebook::load(&paths.codebook)
        .with_context(|| format!("Loading codebook for {:?}", args.base))?;

    if codebook.dictionary.is_empty() {
        info!("Codebook {:?} does not declare any variables", paths.codebook);
        return Ok(());
    }

    codebook_table(&codebook).print();
    info!(
        "Listed {} variable(s) from '{}'",
        codebook.dictionary.len(),
        codebook.description
    );
    Ok(())
}

pub fn codebook_table(codebook: &Codebook) -> TextTable {
    let mut table = TextTable::new(&[
        ("#", Align::Right),
        ("variable", Align::Left),
        ("columns", Align::Left),
        ("width", Align::Right),
        ("labels", Align::Right),
    ]);
    for (idx, spec) in codebook.dictionary.iter().enumerate() {
        let labels = codebook
            .labels_for(&spec.variable)
            .map(|labels| labels.len().to_string())
            .unwrap_or_default();
        table.push_row(vec![
            (idx + 1).to_string(),
            spec.variable.clone(),
            format!("{}-{}", spec.start, spec.end),
            spec.width().to_string(),
            labels,
        ]);
    }
    table
}

pub fn execute_buckets(args: &BucketsArgs) -> Result<()> {
    let catalog = BucketCatalog::load_dir(&args.buckets_dir)?;
    if catalog.is_empty() {
        info!("No bucket definitions found in {:?}", args.buckets_dir);
        return Ok(());
    }
    catalog_table(&catalog).print();
    info!(
        "Listed {} bucket definition(s) from {:?}",
        catalog.len(),
        args.buckets_dir
    );
    Ok(())
}

pub fn catalog_table(catalog: &BucketCatalog) -> TextTable {
    let mut table = TextTable::new(&[
        ("bucket", Align::Left),
        ("field", Align::Left),
        ("ranges", Align::Right),
    ]);
    for definition in catalog.iter() {
        table.push_row(vec![
            definition.id.clone(),
            definition.field.clone(),
            definition.ranges.len().to_string(),
        ]);
    }
    table
}
