//! Persisted furnace records and the binary dump format.
//!
//! Only type, location and temperature survive a save. Slot contents belong
//! to the host's block inventories, and progress is deliberately dropped.
//! The binary form is `bitcode` with a versioned header; the text form lives
//! in `smeltery-data`.

use crate::id::BlockLocation;
use serde::{Deserialize, Serialize};

/// Magic number identifying a furnace dump.
pub const SAVE_MAGIC: u32 = 0x5E17_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

/// One saved furnace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FurnaceRecord {
    /// Furnace type name.
    #[serde(rename = "type")]
    pub furnace_type: String,
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub temperature: u32,
}

impl FurnaceRecord {
    pub fn new(furnace_type: impl Into<String>, location: &BlockLocation, temperature: u32) -> Self {
        Self {
            furnace_type: furnace_type.into(),
            world: location.world.clone(),
            x: location.x,
            y: location.y,
            z: location.z,
            temperature,
        }
    }

    pub fn location(&self) -> BlockLocation {
        BlockLocation::new(self.world.clone(), self.x, self.y, self.z)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SAVE_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("dump from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("header counts {expected} furnaces but {actual} are stored")]
    CountMismatch { expected: u32, actual: usize },
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

/// Header prepended to every dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveHeader {
    pub magic: u32,
    pub version: u32,
    pub count: u32,
}

impl SaveHeader {
    pub fn new(count: u32) -> Self {
        Self {
            magic: SAVE_MAGIC,
            version: FORMAT_VERSION,
            count,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SAVE_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SaveDump {
    header: SaveHeader,
    furnaces: Vec<FurnaceRecord>,
}

pub fn encode_records(records: &[FurnaceRecord]) -> Result<Vec<u8>, SerializeError> {
    let dump = SaveDump {
        header: SaveHeader::new(records.len() as u32),
        furnaces: records.to_vec(),
    };
    bitcode::serialize(&dump).map_err(|e| SerializeError::Encode(e.to_string()))
}

pub fn decode_records(data: &[u8]) -> Result<Vec<FurnaceRecord>, DeserializeError> {
    let dump: SaveDump = bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    dump.header.validate()?;
    if dump.header.count as usize != dump.furnaces.len() {
        return Err(DeserializeError::CountMismatch {
            expected: dump.header.count,
            actual: dump.furnaces.len(),
        });
    }
    Ok(dump.furnaces)
}
