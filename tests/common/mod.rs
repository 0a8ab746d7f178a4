#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Scratch directory holding one extract (`<name>.cbk` + `<name>.dat`) plus
/// any bucket catalog or geography table a test needs.
pub struct ExtractWorkspace {
    temp_dir: TempDir,
    name: String,
}

impl ExtractWorkspace {
    pub fn new(name: &str, codebook: &str, data: &str) -> Self {
        let workspace = Self {
            temp_dir: tempdir().expect("temp dir"),
            name: name.to_string(),
        };
        workspace.write(&format!("{name}.cbk"), codebook);
        workspace.write(&format!("{name}.dat"), data);
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Base path shared by the extract's artifacts.
    pub fn base(&self) -> PathBuf {
        self.path().join(&self.name)
    }

    pub fn base_str(&self) -> String {
        self.base().to_str().expect("utf-8 path").to_string()
    }

    pub fn path_str(&self, name: &str) -> String {
        self.path()
            .join(name)
            .to_str()
            .expect("utf-8 path")
            .to_string()
    }

    pub fn artifact(&self, ext: &str) -> PathBuf {
        self.path().join(format!("{}.{ext}", self.name))
    }

    pub fn read_artifact(&self, ext: &str) -> String {
        fs::read_to_string(self.artifact(ext)).expect("read artifact")
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write temp file");
        path
    }
}

pub const SIMPLE_CODEBOOK: &str = "\
Description: simple_extract

Variable   Columns   Len
A          1-2       2     First value
AGE        3-4       2     Age

AGE        Age
00         Less than 1 year old
07         7
";

pub const GEO_CODEBOOK: &str = "\
Variable   Columns   Len
STATEFIP   1-2       2     State
PUMA       3-7       5     Public use microdata area
PERWT      8-12      5     Person weight
";
