use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::transcode::{DEFAULT_BUFFER_RECORDS, DEFAULT_PROGRESS_INTERVAL};

#[derive(Debug, Parser)]
#[command(author, version, about = "Convert fixed-width census microdata extracts to TSV", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert `<BASE>.dat` to `<BASE>.tsv` and write `<BASE>.sql`
    Convert(ConvertArgs),
    /// List the variables declared in `<BASE>.cbk`
    Columns(ColumnsArgs),
    /// List the bucket definitions available in a catalog directory
    Buckets(BucketsArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Base path shared by the extract's `.cbk` and `.dat` files
    pub base: PathBuf,
    /// Comma-separated bucket identifiers to apply
    #[arg(long = "bucket", visible_alias = "buckets", action = clap::ArgAction::Append)]
    pub buckets: Vec<String>,
    /// Keep the original columns next to their `_bucketed` counterparts
    #[arg(long = "keep-original", alias = "keep_original")]
    pub keep_original: bool,
    /// Comma-separated field names to drop from the output
    #[arg(long = "ignore", action = clap::ArgAction::Append)]
    pub ignore: Vec<String>,
    /// Combine STATEFIP and PUMA into a full PUMA code and add PUMAAREA
    #[arg(long = "full-pumas", alias = "full_pumas")]
    pub full_pumas: bool,
    /// Number of records buffered between output writes
    #[arg(long, default_value_t = DEFAULT_BUFFER_RECORDS)]
    pub buffer: usize,
    /// Directory of bucket definition files (.yaml, .yml, .json)
    #[arg(long = "buckets-dir", default_value = "buckets")]
    pub buckets_dir: PathBuf,
    /// JSON table mapping full PUMA codes to their areas
    #[arg(long = "geography", default_value = "pumas.json")]
    pub geography: PathBuf,
    /// Fail when a full PUMA code is missing from the geography table
    #[arg(long = "strict-geography")]
    pub strict_geography: bool,
    /// Output delimiter (supports 'tab', ',', ';', '|')
    #[arg(long, value_parser = parse_delimiter, default_value = "tab")]
    pub delimiter: u8,
    /// Character encoding of the `.dat` file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Output file (defaults to `<BASE>.tsv`; `-` for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Lines between progress reports (0 disables)
    #[arg(long = "progress-interval", default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    pub progress_interval: usize,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Base path of the extract, or the `.cbk` file itself
    pub base: PathBuf,
}

#[derive(Debug, Args)]
pub struct BucketsArgs {
    /// Directory of bucket definition files
    #[arg(long = "buckets-dir", default_value = "buckets")]
    pub buckets_dir: PathBuf,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
