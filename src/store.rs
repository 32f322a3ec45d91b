use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::error::OniError;
use crate::locator::url_to_filename;

pub const DATABASE_EXT: &str = "db";

/// Local directory holding one database per collection fetch URL.
#[derive(Debug, Clone)]
pub struct Store {
    data_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct StoreSummary {
    pub databases: usize,
    pub bytes: u64,
}

impl Store {
    pub fn new() -> Result<Self, OniError> {
        let data_dir = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("oni-tabulator")).ok()
            })
            .ok_or_else(|| OniError::Filesystem("unable to resolve data directory".to_string()))?;
        Ok(Self { data_dir })
    }

    pub fn new_with_path(data_dir: Utf8PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn ensure_data_dir(&self) -> Result<(), OniError> {
        fs::create_dir_all(self.data_dir.as_std_path())
            .map_err(|err| OniError::Filesystem(err.to_string()))
    }

    /// `<data dir>/<sanitized fetch url>.db`
    pub fn database_path(&self, fetch_url: &str) -> Utf8PathBuf {
        self.data_dir
            .join(format!("{}.{DATABASE_EXT}", url_to_filename(fetch_url)))
    }

    pub fn summary(&self) -> StoreSummary {
        let Ok(entries) = fs::read_dir(self.data_dir.as_std_path()) else {
            return StoreSummary::default();
        };
        let mut summary = StoreSummary::default();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_db = path
                .extension()
                .map(|ext| ext == DATABASE_EXT)
                .unwrap_or(false);
            if !is_db {
                continue;
            }
            summary.databases += 1;
            if let Ok(meta) = entry.metadata() {
                summary.bytes = summary.bytes.saturating_add(meta.len());
            }
        }
        summary
    }
}

/// Sibling of a database file with its extension swapped, e.g.
/// `x.db` -> `x.config.json`.
pub fn side_file(database: &Path, suffix: &str) -> PathBuf {
    database.with_extension(suffix)
}

pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), OniError> {
    let parent = path
        .parent()
        .ok_or_else(|| OniError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| OniError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".oni-tab-file")
        .tempfile_in(parent)
        .map_err(|err| OniError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| OniError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| OniError::Filesystem(err.to_string()))?;
    Ok(())
}
