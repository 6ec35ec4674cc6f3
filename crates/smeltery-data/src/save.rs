//! Text save files for furnaces.
//!
//! A save holds a `count` and a list of records (`type`, `world`, `x`, `y`,
//! `z`, `temperature`). The format follows the file extension.

use crate::loader::{DataLoadError, deserialize_file, serialize_file};
use serde::{Deserialize, Serialize};
use smeltery_core::persist::FurnaceRecord;
use std::path::Path;

/// On-disk save layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFile {
    pub count: u32,
    #[serde(default)]
    pub furnaces: Vec<FurnaceRecord>,
}

impl SaveFile {
    pub fn new(furnaces: Vec<FurnaceRecord>) -> Self {
        Self {
            count: furnaces.len() as u32,
            furnaces,
        }
    }

    /// The records the header vouches for. A count above the stored entries
    /// is capped; a count below them drops the tail.
    pub fn into_records(mut self) -> Vec<FurnaceRecord> {
        let count = self.count as usize;
        if count != self.furnaces.len() {
            tracing::warn!(count, stored = self.furnaces.len(), "save count does not match stored furnaces");
        }
        self.furnaces.truncate(count);
        self.furnaces
    }
}

/// Write records to `path`, replacing any previous save.
pub fn write_save(path: &Path, records: &[FurnaceRecord]) -> Result<(), DataLoadError> {
    serialize_file(path, &SaveFile::new(records.to_vec()))?;
    tracing::info!(file = %path.display(), count = records.len(), "furnaces saved");
    Ok(())
}

/// Read records from `path`. A missing file is an empty save.
pub fn read_save(path: &Path) -> Result<Vec<FurnaceRecord>, DataLoadError> {
    if !path.exists() {
        tracing::debug!(file = %path.display(), "no save file, starting empty");
        return Ok(Vec::new());
    }
    let save: SaveFile = deserialize_file(path)?;
    Ok(save.into_records())
}
