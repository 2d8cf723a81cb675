#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sheet_migrator::{CellValue, ModelSchema, RawRow, SchemaCatalog};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// The newsroom catalog shared by the integration tests.
pub fn newsroom_catalog() -> SchemaCatalog {
    SchemaCatalog::load(&fixture_path("schema.yaml")).expect("load newsroom schema")
}

pub fn newsroom_model(name: &str) -> ModelSchema {
    newsroom_catalog()
        .require_model(name)
        .expect("model in newsroom schema")
        .clone()
}

/// Builds a raw row from header/text pairs; empty text becomes an empty cell.
pub fn text_row(pairs: &[(&str, &str)]) -> RawRow {
    pairs
        .iter()
        .map(|(header, value)| (header.to_string(), CellValue::from(*value)))
        .collect()
}

/// Scratch directory that cleans up its files on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, contents).expect("write temp file");
        path
    }

    /// Copies a fixture from `tests/data` into the workspace.
    pub fn copy_fixture(&self, name: &str) -> PathBuf {
        let target = self.temp_dir.path().join(name);
        fs::copy(fixture_path(name), &target).expect("copy fixture");
        target
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read workspace file")
    }
}
