use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::datetime::iso_day_serde;

const SELECTION_FILE: &str = "selected-dates.json";
const FORMAT_VERSION: u32 = 1;

/// Where the selected dates live between sessions.
///
/// `save(&[])` must leave the store in a state where `load()` returns an
/// empty list; implementations remove their record instead of writing an
/// empty collection.
pub trait DateStorage {
    fn save(&mut self, dates: &[NaiveDate]) -> anyhow::Result<()>;
    fn load(&self) -> anyhow::Result<Vec<NaiveDate>>;
}

impl<T: DateStorage + ?Sized> DateStorage for Box<T> {
    fn save(&mut self, dates: &[NaiveDate]) -> anyhow::Result<()> {
        (**self).save(dates)
    }

    fn load(&self) -> anyhow::Result<Vec<NaiveDate>> {
        (**self).load()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectionDocument {
    version: u32,
    #[serde(with = "iso_day_serde::vec")]
    dates: Vec<NaiveDate>,
}

/// Stores the selection as a single JSON document inside a data directory.
#[derive(Debug)]
pub struct JsonFileDateStorage {
    pub data_dir: PathBuf,
    pub path: PathBuf,
}

impl JsonFileDateStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let path = data_dir.join(SELECTION_FILE);

        info!(
            data_dir = %data_dir.display(),
            file = %path.display(),
            "opened date storage"
        );

        Ok(Self { data_dir, path })
    }

    fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(file = %self.path.display(), "removed stored selection");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}

impl DateStorage for JsonFileDateStorage {
    #[tracing::instrument(skip(self, dates), fields(count = dates.len()))]
    fn save(&mut self, dates: &[NaiveDate]) -> anyhow::Result<()> {
        if dates.is_empty() {
            return self.clear();
        }

        let doc = SelectionDocument {
            version: FORMAT_VERSION,
            dates: dates.to_vec(),
        };
        save_json_atomic(&self.path, &doc).context("failed to save selected dates")
    }

    #[tracing::instrument(skip(self))]
    fn load(&self) -> anyhow::Result<Vec<NaiveDate>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(file = %self.path.display(), "no stored selection");
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed reading {}", self.path.display()));
            }
        };

        let doc: SelectionDocument = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.path.display()))?;
        if doc.version != FORMAT_VERSION {
            return Err(anyhow!(
                "unsupported selection format version {} in {}",
                doc.version,
                self.path.display()
            ));
        }

        debug!(count = doc.dates.len(), "loaded selected dates");
        Ok(doc.dates)
    }
}

#[tracing::instrument(skip(path, doc))]
fn save_json_atomic(path: &Path, doc: &SelectionDocument) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = doc.dates.len(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string(doc)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

/// Keeps the selection in memory only; for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDateStorage {
    stored: Option<Vec<NaiveDate>>,
}

impl MemoryDateStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dates(dates: Vec<NaiveDate>) -> Self {
        let mut storage = Self::new();
        if !dates.is_empty() {
            storage.stored = Some(dates);
        }
        storage
    }

    pub fn is_cleared(&self) -> bool {
        self.stored.is_none()
    }
}

impl DateStorage for MemoryDateStorage {
    fn save(&mut self, dates: &[NaiveDate]) -> anyhow::Result<()> {
        self.stored = if dates.is_empty() {
            None
        } else {
            Some(dates.to_vec())
        };
        Ok(())
    }

    fn load(&self) -> anyhow::Result<Vec<NaiveDate>> {
        Ok(self.stored.clone().unwrap_or_default())
    }
}
