//! Reading and writing world snapshot files.

use crate::loader::DataLoadError;
use millwright_core::snapshot::{decode_world, encode_world};
use millwright_core::source::SourceWorld;
use std::path::Path;
use tracing::info;

/// Load a world saved with [`save_world`].
pub fn load_world(path: &Path) -> Result<SourceWorld, DataLoadError> {
    let bytes = std::fs::read(path)?;
    let world = decode_world(&bytes).map_err(|source| DataLoadError::Snapshot {
        file: path.to_path_buf(),
        source,
    })?;
    info!(
        file = %path.display(),
        entities = world.entity_count(),
        tick = world.tick,
        "world loaded"
    );
    Ok(world)
}

/// Write `world` as a versioned binary snapshot.
pub fn save_world(path: &Path, world: &SourceWorld) -> Result<(), DataLoadError> {
    let bytes = encode_world(world).map_err(|source| DataLoadError::Snapshot {
        file: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::{cleanup, make_test_dir};
    use millwright_core::snapshot::SnapshotError;
    use millwright_core::test_utils::smelting_line_world;

    #[test]
    fn saved_world_loads_back() {
        let dir = make_test_dir("world_roundtrip");
        let path = dir.join("factory.mwsnap");
        let mut world = smelting_line_world();
        world.tick = 1234;
        save_world(&path, &world).unwrap();
        assert_eq!(load_world(&path).unwrap(), world);
        cleanup(&dir);
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = make_test_dir("world_foreign");
        let path = dir.join("notes.mwsnap");
        std::fs::write(&path, b"hello world").unwrap();
        assert!(matches!(
            load_world(&path),
            Err(DataLoadError::Snapshot {
                source: SnapshotError::InvalidMagic(_),
                ..
            })
        ));
        cleanup(&dir);
    }
}
