//! One JSON document per session, written atomically.

use std::fs;
use std::path::{Path, PathBuf};

use super::session::{validate_session_id, Session};
use crate::error::ProgressError;

const SNAPSHOT_EXT: &str = "json";
const TMP_SUFFIX: &str = ".json.tmp";

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if missing) the snapshot directory.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, ProgressError> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                ProgressError::Storage(format!(
                    "failed to create snapshot directory {}: {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.{SNAPSHOT_EXT}"))
    }

    /// Write `<id>.json.tmp` then rename over `<id>.json`, so readers never
    /// observe a half-written document.
    pub fn save(&self, session: &Session) -> Result<(), ProgressError> {
        validate_session_id(&session.session_id)?;
        let json = serde_json::to_vec_pretty(session)?;

        let tmp = self.dir.join(format!("{}{TMP_SUFFIX}", session.session_id));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.path_for(&session.session_id))?;
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> Result<Option<Session>, ProgressError> {
        validate_session_id(session_id)?;
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Load every readable snapshot. Leftover temp files are ignored and
    /// corrupt documents are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<Session>, ProgressError> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with(TMP_SUFFIX)
                || path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT)
            {
                continue;
            }

            let parsed = fs::read(&path)
                .map_err(ProgressError::from)
                .and_then(|bytes| serde_json::from_slice::<Session>(&bytes).map_err(ProgressError::from));
            match parsed {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable session snapshot");
                }
            }
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }
}
