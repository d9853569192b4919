use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PersistError;
use crate::state::GepaState;

/// State snapshot file inside the run directory.
pub const STATE_FILE: &str = "gepa_state.json";

/// Sentinel file: its presence asks the engine to exit cooperatively at the
/// next iteration boundary (after persisting).
pub const STOP_SENTINEL: &str = "gepa.stop";

/// Snapshot schema version. Loaders reject anything else.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    state: &'a GepaState,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    state: GepaState,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

pub fn save_state(run_dir: &Path, state: &GepaState) -> Result<(), PersistError> {
    fs::create_dir_all(run_dir).map_err(|source| PersistError::Io {
        path: run_dir.to_path_buf(),
        source,
    })?;
    let bytes = serde_json::to_vec(&EnvelopeRef {
        version: SCHEMA_VERSION,
        state,
    })
    .map_err(|source| PersistError::Encode { source })?;

    let path = run_dir.join(STATE_FILE);
    fs::write(&path, bytes).map_err(|source| PersistError::Io {
        path: path.clone(),
        source,
    })?;
    debug!(path = %path.display(), "state snapshot persisted");
    Ok(())
}

/// Loads the snapshot from `run_dir`, or `None` when no snapshot exists.
pub fn load_state(run_dir: &Path) -> Result<Option<GepaState>, PersistError> {
    let path = run_dir.join(STATE_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(PersistError::Io { path, source }),
    };

    // Check the version before decoding the full snapshot so an unknown
    // schema fails with the right error instead of a field mismatch.
    let probe: VersionProbe =
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode {
            path: path.clone(),
            source,
        })?;
    if probe.version != SCHEMA_VERSION {
        return Err(PersistError::UnsupportedVersion {
            found: probe.version,
            supported: SCHEMA_VERSION,
        });
    }

    let envelope: Envelope =
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode { path, source })?;
    Ok(Some(envelope.state))
}

pub fn stop_requested(run_dir: &Path) -> bool {
    run_dir.join(STOP_SENTINEL).exists()
}
