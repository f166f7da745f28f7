//! Versioned binary snapshots of a [`SourceWorld`].
//!
//! Layout: `[magic u32 LE][version u32 LE][bitcode payload]`. The header is
//! read before the payload so foreign or future data is rejected without a
//! decode attempt. Belt buffers are validated after decoding, so a snapshot
//! that loads always builds.

use crate::cargo::{CargoPathBuffer, CargoPathError};
use crate::id::SourceId;
use crate::source::SourceWorld;
use tracing::debug;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a Millwright world snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x4D57_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("data too short for snapshot header")]
    TooShort,
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("belt {belt:?} holds an invalid cargo buffer: {source}")]
    CorruptBelt {
        belt: SourceId,
        #[source]
        source: CargoPathError,
    },
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
}

impl SnapshotHeader {
    pub fn current() -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
    }
}

/// Read only the header of `data`.
pub fn read_header(data: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
    let (Some(magic), Some(version)) = (data.get(0..4), data.get(4..HEADER_LEN)) else {
        return Err(SnapshotError::TooShort);
    };
    let word = |b: &[u8]| u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    Ok(SnapshotHeader {
        magic: word(magic),
        version: word(version),
    })
}

// ---------------------------------------------------------------------------
// Encode / decode
// ---------------------------------------------------------------------------

pub fn encode_world(world: &SourceWorld) -> Result<Vec<u8>, SnapshotError> {
    let payload = bitcode::serialize(world).map_err(|e| SnapshotError::Encode(e.to_string()))?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    SnapshotHeader::current().write(&mut out);
    out.extend_from_slice(&payload);
    debug!(bytes = out.len(), entities = world.entity_count(), "world encoded");
    Ok(out)
}

pub fn decode_world(data: &[u8]) -> Result<SourceWorld, SnapshotError> {
    read_header(data)?.validate()?;
    let world: SourceWorld = bitcode::deserialize(&data[HEADER_LEN..])
        .map_err(|e| SnapshotError::Decode(e.to_string()))?;
    for (id, belt) in world.belts.iter() {
        CargoPathBuffer::from_bytes(belt.buffer.clone(), belt.speed, false)
            .map_err(|source| SnapshotError::CorruptBelt { belt: id, source })?;
    }
    Ok(world)
}
