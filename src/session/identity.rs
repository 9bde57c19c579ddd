//! Client session identifier persisted between launches.
//!
//! The API scopes chat history by this identifier, sent as `X-Session-ID`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IDENTITY_FILE: &str = "session_id";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("USERPROFILE").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_dir() -> PathBuf {
    home_dir().join(".bloodwise")
}

pub fn load(dir: &Path) -> Result<Option<String>, IdentityError> {
    let path = dir.join(IDENTITY_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let id = raw.trim();
            Ok((!id.is_empty()).then(|| id.to_string()))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(IdentityError::Read { path, source }),
    }
}

pub fn save(dir: &Path, session_id: &str) -> Result<(), IdentityError> {
    let final_path = dir.join(IDENTITY_FILE);
    let tmp_path = dir.join(format!("{IDENTITY_FILE}.tmp"));
    let write_err = |source| IdentityError::Write {
        path: final_path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(write_err)?;
    fs::write(&tmp_path, session_id).map_err(write_err)?;
    match fs::rename(&tmp_path, &final_path) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if final_path.exists() {
                fs::remove_file(&final_path).map_err(write_err)?;
                fs::rename(&tmp_path, &final_path).map_err(write_err)
            } else {
                Err(write_err(rename_err))
            }
        }
    }
}

/// Returns the stored identifier, minting and persisting a new one on first
/// launch.
pub fn load_or_create(dir: &Path) -> Result<String, IdentityError> {
    if let Some(existing) = load(dir)? {
        return Ok(existing);
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    save(dir, &session_id)?;
    tracing::info!(dir = %dir.display(), "created new client session id");
    Ok(session_id)
}
