//! Artifact paths, input line decoding and output sinks.
//!
//! An extract is named by a base path shared by its artifacts:
//! `<base>.cbk` (codebook), `<base>.dat` (fixed-width data), and the outputs
//! `<base>.tsv` and `<base>.sql`. The `-` path routes output to stdout.

use std::{
    ffi::OsString,
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::warn;

pub const CODEBOOK_EXTENSION: &str = "cbk";
pub const DATA_EXTENSION: &str = "dat";
pub const OUTPUT_EXTENSION: &str = "tsv";
pub const SQL_EXTENSION: &str = "sql";

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractPaths {
    pub base: PathBuf,
    pub codebook: PathBuf,
    pub data: PathBuf,
    pub output: PathBuf,
    pub sql: PathBuf,
}

impl ExtractPaths {
    /// Accepts either the bare base path or the path of the `.cbk`/`.dat`
    /// artifact itself.
    pub fn from_base(base: &Path) -> Self {
        let base = match base.extension().and_then(|ext| ext.to_str()) {
            Some(ext)
                if ext.eq_ignore_ascii_case(CODEBOOK_EXTENSION)
                    || ext.eq_ignore_ascii_case(DATA_EXTENSION) =>
            {
                base.with_extension("")
            }
            _ => base.to_path_buf(),
        };
        Self {
            codebook: with_suffix(&base, CODEBOOK_EXTENSION),
            data: with_suffix(&base, DATA_EXTENSION),
            output: with_suffix(&base, OUTPUT_EXTENSION),
            sql: with_suffix(&base, SQL_EXTENSION),
            base,
        }
    }
}

/// Appends `.ext` without replacing any dot already in the file name.
fn with_suffix(base: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Decodes `bytes`, replacing malformed sequences with U+FFFD. The flag
/// reports whether any replacement happened.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    (text.into_owned(), had_errors)
}

/// Reads one logical line at a time, with `\n` or `\r\n` stripped.
pub struct LineReader<R> {
    inner: R,
    encoding: &'static Encoding,
    buf: Vec<u8>,
    line: usize,
    malformed_lines: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buf: Vec::with_capacity(512),
            line: 0,
            malformed_lines: 0,
        }
    }

    /// Lines that contained bytes invalid in the input encoding.
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines
    }

    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .context("Reading input line")?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let (text, had_errors) = decode_bytes(&self.buf, self.encoding);
        if had_errors {
            if self.malformed_lines == 0 {
                warn!(
                    "Line {} is not valid {}; malformed bytes were replaced",
                    self.line,
                    self.encoding.name()
                );
            }
            self.malformed_lines += 1;
        }
        Ok(Some(text))
    }
}

pub fn open_line_reader(
    path: &Path,
    encoding: &'static Encoding,
) -> Result<LineReader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Opening data file {path:?}"))?;
    Ok(LineReader::new(BufReader::new(file), encoding))
}

pub fn open_output(path: &Path) -> Result<Box<dyn Write>> {
    if is_dash(path) {
        return Ok(Box::new(std::io::stdout()));
    }
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    Ok(Box::new(BufWriter::new(file)))
}
