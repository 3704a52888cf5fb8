//! Fingerprint-keyed model bundle store
//!
//! One bincode file per fingerprint under the cache directory. Writes go to a
//! temporary file first and are published with a hard link (create-if-absent)
//! or, when duplicates may be replaced, a rename.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Fingerprint, ModelBundle};
use crate::error::{PipelineError, Result};

/// Bumped whenever the persisted layout changes
pub const FORMAT_VERSION: u32 = 1;

pub const MODEL_EXTENSION: &str = "model";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Replace an existing bundle instead of rejecting the save
    pub allow_duplicates: bool,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    format_version: u32,
    fingerprint: &'a Fingerprint,
    bundle: &'a ModelBundle,
}

#[derive(Deserialize)]
struct Envelope {
    format_version: u32,
    fingerprint: Fingerprint,
    bundle: ModelBundle,
}

pub struct ModelCache {
    config: CacheConfig,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ModelCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir).map_err(|e| storage(&config.dir, e))?;
        info!(
            dir = %config.dir.display(),
            allow_duplicates = config.allow_duplicates,
            "model cache ready"
        );
        Ok(Self {
            config,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn allows_duplicates(&self) -> bool {
        self.config.allow_duplicates
    }

    /// Canonical location of the bundle for `fingerprint`
    pub fn path_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{MODEL_EXTENSION}", fingerprint.file_stem()))
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.path_for(fingerprint).is_file()
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Persist `bundle`. Fails with `DuplicateModel` when a bundle already exists
    /// and duplicates are not allowed.
    pub fn save(&self, fingerprint: &Fingerprint, bundle: &ModelBundle) -> Result<PathBuf> {
        let path = self.path_for(fingerprint);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        if !self.config.allow_duplicates && path.exists() {
            return Err(duplicate(fingerprint));
        }

        let bytes = bincode::serialize(&EnvelopeRef {
            format_version: FORMAT_VERSION,
            fingerprint,
            bundle,
        })
        .map_err(|e| PipelineError::Storage(format!("cannot encode bundle {fingerprint}: {e}")))?;

        let tmp = self
            .config
            .dir
            .join(format!(".{}.{}.tmp", fingerprint.file_stem(), Uuid::new_v4()));
        write_synced(&tmp, &bytes)?;

        let published = if self.config.allow_duplicates {
            fs::rename(&tmp, &path).map_err(|e| storage(&path, e))
        } else {
            let linked = match fs::hard_link(&tmp, &path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(duplicate(fingerprint)),
                Err(e) => Err(storage(&path, e)),
            };
            if let Err(e) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %e, "failed to remove temporary bundle");
            }
            linked
        };
        if published.is_err() && tmp.exists() {
            let _ = fs::remove_file(&tmp);
        }
        published?;

        info!(
            fingerprint = %fingerprint,
            path = %path.display(),
            bytes = bytes.len(),
            "model bundle saved"
        );
        Ok(path)
    }

    /// Bundle stored for `fingerprint`. Absent, undecodable or mismatching files
    /// all report `ModelNotFound`.
    pub fn load(&self, fingerprint: &Fingerprint) -> Result<ModelBundle> {
        let path = self.path_for(fingerprint);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::ModelNotFound(fingerprint.to_string()));
            }
            Err(e) => return Err(storage(&path, e)),
        };

        let envelope: Envelope = bincode::deserialize(&bytes).map_err(|e| {
            warn!(path = %path.display(), error = %e, "undecodable model bundle");
            PipelineError::ModelNotFound(format!("{fingerprint} (corrupt bundle)"))
        })?;

        if envelope.format_version != FORMAT_VERSION {
            warn!(
                path = %path.display(),
                version = envelope.format_version,
                "unsupported bundle format"
            );
            return Err(PipelineError::ModelNotFound(format!(
                "{fingerprint} (format version {})",
                envelope.format_version
            )));
        }
        if envelope.fingerprint != *fingerprint {
            warn!(
                path = %path.display(),
                stored = %envelope.fingerprint,
                "bundle key does not match its path"
            );
            return Err(PipelineError::ModelNotFound(format!(
                "{fingerprint} (stored under a different key)"
            )));
        }

        debug!(fingerprint = %fingerprint, "model bundle loaded");
        Ok(envelope.bundle)
    }

    /// Remove the bundle for `fingerprint`; false if there was none
    pub fn delete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        let path = self.path_for(fingerprint);
        let lock = self.lock_for(&path);
        let _guard = lock.lock();

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(fingerprint = %fingerprint, "model bundle deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage(&path, e)),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| storage(path, e))?;
    file.write_all(bytes).map_err(|e| storage(path, e))?;
    file.sync_all().map_err(|e| storage(path, e))
}

fn storage(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::Storage(format!("{}: {err}", path.display()))
}

fn duplicate(fingerprint: &Fingerprint) -> PipelineError {
    PipelineError::DuplicateModel(fingerprint.to_string())
}
