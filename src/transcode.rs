//! The `convert` command: stream a fixed-width extract into delimited text.
//!
//! Each input line is decoded, augmented with the PUMA composite (when
//! enabled), run through the requested buckets, and projected onto the frozen
//! field list. Encoded rows accumulate in memory and are written to the sink
//! every `buffer` records and at end of input.
//!
//! A row is each value joined by the delimiter. Only values containing the
//! delimiter or a line break are quoted, so every other value, an empty one
//! included, reaches the output exactly as decoded.

use std::{
    io::{BufRead, Write},
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    buckets::{BucketCatalog, BucketResolver},
    cli::ConvertArgs,
    codebook::Codebook,
    ddl,
    decode::{DatumEntry, PostProcessRules, RecordDecoder},
    error::TranscodeError,
    fields::{FieldOptions, FieldSchema, PUMA},
    geography::{GeographyAugmenter, GeographyTable, MissingGeographyPolicy},
    io_utils::{self, ExtractPaths, LineReader},
};

pub const DEFAULT_BUFFER_RECORDS: usize = 10_000;
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100_000;

pub fn execute(args: &ConvertArgs) -> Result<()> {
    if args.buffer == 0 {
        return Err(TranscodeError::ZeroBuffer.into());
    }
    let paths = ExtractPaths::from_base(&args.base);
    let output_path = args.output.clone().unwrap_or_else(|| paths.output.clone());
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!(
        "Converting '{}' -> {:?} (delimiter '{}')",
        paths.data.display(),
        output_path,
        crate::printable_delimiter(args.delimiter)
    );

    let codebook = Codebook::load(&paths.codebook)?;
    let options = FieldOptions {
        buckets: split_list(&args.buckets),
        keep_original: args.keep_original,
        ignore: split_list(&args.ignore),
        full_pumas: args.full_pumas,
    };
    let catalog = if options.buckets.is_empty() {
        BucketCatalog::new()
    } else {
        BucketCatalog::load_dir(&args.buckets_dir)?
    };
    let schema = FieldSchema::build(&codebook, &catalog, &options);
    debug!("Output fields: {:?}", schema.fields());

    let geography = if schema.full_pumas() && codebook.has_variable(PUMA) {
        GeographyTable::load(&args.geography)?
    } else {
        GeographyTable::new()
    };

    ddl::write_create_table(&paths.sql, &codebook.description, schema.fields())?;

    let reader = io_utils::open_line_reader(&paths.data, encoding)?;
    let sink = io_utils::open_output(&output_path)?;
    let rules = PostProcessRules::default();
    let settings = TranscodeSettings {
        buffer_records: args.buffer,
        progress_interval: args.progress_interval,
        delimiter: args.delimiter,
        missing_geography: if args.strict_geography {
            MissingGeographyPolicy::Fail
        } else {
            MissingGeographyPolicy::Warn
        },
    };

    let started = Instant::now();
    let mut transcoder = Transcoder::new(&codebook, &rules, &schema, &geography, sink, settings);
    transcoder.write_header()?;
    let summary = transcoder
        .run(reader)
        .with_context(|| format!("Converting {:?}", paths.data))?;

    info!(
        "Finished parsing {} lines in {:.1} seconds.",
        summary.lines,
        started.elapsed().as_secs_f64()
    );
    if summary.geography_misses > 0 {
        warn!(
            "{} record(s) had a state+PUMA code missing from {:?}",
            summary.geography_misses, args.geography
        );
    }
    if summary.malformed_lines > 0 {
        warn!(
            "{} line(s) contained malformed {} and were decoded with replacement characters",
            summary.malformed_lines,
            encoding.name()
        );
    }
    info!("Wrote output to {output_path:?}");
    info!("Wrote SQL CREATE TABLE statement to {:?}", paths.sql);
    Ok(())
}

fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|s| s.split(","))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn escape_field(value: String, separator: &str) -> String {
    if value.contains(separator) || value.contains(['\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeSettings {
    pub buffer_records: usize,
    /// Lines between progress reports; 0 disables them.
    pub progress_interval: usize,
    pub delimiter: u8,
    pub missing_geography: MissingGeographyPolicy,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            buffer_records: DEFAULT_BUFFER_RECORDS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            delimiter: b'\t',
            missing_geography: MissingGeographyPolicy::Warn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranscodeSummary {
    pub lines: usize,
    /// Buffer writes of data records, including the final partial buffer.
    pub flushes: usize,
    pub geography_misses: usize,
    /// Input lines with bytes the input encoding could not decode.
    pub malformed_lines: usize,
}

pub struct Transcoder<'a, W: Write> {
    schema: &'a FieldSchema,
    decoder: RecordDecoder<'a>,
    resolver: BucketResolver,
    geography: Option<GeographyAugmenter<'a>>,
    separator: String,
    buffer: Vec<u8>,
    sink: W,
    settings: TranscodeSettings,
    pending: usize,
    total: usize,
    flushes: usize,
}

impl<'a, W: Write> Transcoder<'a, W> {
    pub fn new(
        codebook: &'a Codebook,
        rules: &'a PostProcessRules,
        schema: &'a FieldSchema,
        geography: &'a GeographyTable,
        sink: W,
        settings: TranscodeSettings,
    ) -> Self {
        let geography = schema
            .full_pumas()
            .then(|| GeographyAugmenter::new(geography, settings.missing_geography));
        Self {
            schema,
            decoder: RecordDecoder::new(codebook, rules),
            resolver: BucketResolver::new(),
            geography,
            separator: char::from(settings.delimiter).to_string(),
            buffer: Vec::new(),
            sink,
            settings,
            pending: 0,
            total: 0,
            flushes: 0,
        }
    }

    /// Writes the field names straight to the sink, ahead of any record.
    pub fn write_header(&mut self) -> Result<()> {
        let separator = self.separator.as_str();
        let header = self
            .schema
            .fields()
            .iter()
            .map(|name| escape_field(name.clone(), separator))
            .join(separator);
        writeln!(self.sink, "{header}").context("Writing output header")?;
        Ok(())
    }

    pub fn process_line(&mut self, line: &str) -> Result<()> {
        self.total += 1;
        let line_no = self.total;
        let schema = self.schema;

        let mut datum = self.decoder.decode(line);
        if let Some(augmenter) = self.geography.as_mut() {
            augmenter.augment(&mut datum, line_no)?;
        }

        for target in schema.targets() {
            let resolved = match datum.get(&target.field) {
                Some(entry) => self.resolver.resolve(&target.definition, &entry.raw),
                None => continue,
            };
            datum.insert(target.output.as_str(), DatumEntry::derived(resolved));
            if !target.keep_field {
                datum.remove(&target.field);
            }
        }

        let separator = self.separator.as_str();
        let row = schema
            .fields()
            .iter()
            .map(|name| {
                datum
                    .get(name)
                    .map(|entry| escape_field(entry.val.as_display(), separator))
                    .ok_or_else(|| anyhow!("Line {line_no}: no value decoded for field '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        self.buffer.extend_from_slice(row.join(separator).as_bytes());
        self.buffer.push(b'\n');
        self.pending += 1;

        if self.settings.progress_interval > 0 && self.total % self.settings.progress_interval == 0
        {
            info!("Scanned {} lines", self.total);
        }
        if self.pending >= self.settings.buffer_records {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Records encoded but not yet written to the sink.
    pub fn pending_records(&self) -> usize {
        self.pending
    }

    pub fn lines_processed(&self) -> usize {
        self.total
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        self.sink
            .write_all(&self.buffer)
            .context("Writing buffered records")?;
        self.sink.flush().context("Flushing output")?;
        debug!(
            "Flushed {} record(s) ({} bytes)",
            self.pending,
            self.buffer.len()
        );
        self.buffer.clear();
        self.pending = 0;
        self.flushes += 1;
        Ok(())
    }

    pub fn run<R: BufRead>(mut self, mut reader: LineReader<R>) -> Result<TranscodeSummary> {
        while let Some(line) = reader
            .next_line()
            .with_context(|| format!("Reading input line {}", self.total + 1))?
        {
            self.process_line(&line)?;
        }
        let malformed_lines = reader.malformed_lines();
        let summary = self.finish()?;
        Ok(TranscodeSummary {
            malformed_lines,
            ..summary
        })
    }

    pub fn finish(mut self) -> Result<TranscodeSummary> {
        self.flush_pending()?;
        self.sink.flush().context("Flushing output")?;
        for target in self.schema.targets() {
            debug!(
                "Bucket '{}' cached {} distinct code(s) for '{}'",
                target.definition.id,
                self.resolver.cached_codes(&target.definition.id),
                target.field
            );
        }
        Ok(TranscodeSummary {
            lines: self.total,
            flushes: self.flushes,
            geography_misses: self
                .geography
                .as_ref()
                .map_or(0, GeographyAugmenter::misses),
            malformed_lines: 0,
        })
    }
}
