// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blob store — where finished artifacts are handed off.
//
// The pipeline only depends on the `BlobStore` trait; a store value is
// constructed by the caller and injected. `LocalBlobStore` keeps logical
// folders as subdirectories of a root directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;

use scanprep_core::error::{Result, ScanprepError};
use scanprep_core::types::mime_type_for_extension;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::retry::{RetryDecision, RetryPolicy};

/// Identifier of a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteId {
    pub folder: String,
    pub name: String,
    pub mime_type: String,
    /// Lowercase hex SHA-256 of the stored bytes.
    pub sha256: String,
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.folder, self.name)
    }
}

/// Destination for finished artifacts.
pub trait BlobStore: Send + Sync {
    /// Store the file at `local` under the logical `folder`.
    ///
    /// A missing or zero-byte file is skipped and yields `Ok(None)`.
    fn put(&self, local: &Path, folder: &str) -> Result<Option<RemoteId>>;

    /// Fetch the artifact called `name` into `download_dir`, returning the
    /// local path.
    fn get(&self, name: &str, download_dir: &Path) -> Result<PathBuf>;
}

/// `put` with the store retry budget. Only transient store errors are
/// retried.
pub fn put_with_retry(
    store: &dyn BlobStore,
    local: &Path,
    folder: &str,
    policy: &RetryPolicy,
) -> Result<Option<RemoteId>> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match store.put(local, folder) {
            Ok(id) => return Ok(id),
            Err(err) => err,
        };
        warn!(
            file = %local.display(),
            folder,
            attempt,
            max = policy.max_attempts,
            error = %err,
            "Upload failed"
        );
        match policy.decide(&err, attempt) {
            RetryDecision::RetryAfter(delay) => {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            RetryDecision::GiveUp(_) | RetryDecision::Exhausted => return Err(err),
        }
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// Directory-backed store
// ---------------------------------------------------------------------------

/// Stores artifacts as `<root>/<folder>/<file name>`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder_dir(&self, folder: &str) -> Result<PathBuf> {
        let valid = !folder.is_empty()
            && Path::new(folder)
                .components()
                .all(|c| matches!(c, std::path::Component::Normal(_)));
        if !valid {
            return Err(ScanprepError::Store(format!("invalid folder name '{folder}'")));
        }
        Ok(self.root.join(folder))
    }

    /// Artifact names are bare file names; anything with a separator or a
    /// `..` component is rejected.
    fn check_name(name: &str) -> Result<()> {
        let mut components = Path::new(name).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        );
        if !single {
            return Err(ScanprepError::InputNotFound(format!(
                "invalid artifact name '{name}'"
            )));
        }
        Ok(())
    }

    fn locate(&self, name: &str) -> Result<Option<PathBuf>> {
        Self::check_name(name)?;
        let direct = self.root.join(name);
        if direct.is_file() {
            return Ok(Some(direct));
        }
        let mut folders: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        folders.sort();
        Ok(folders
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file()))
    }
}

impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, local), fields(local = %local.display()))]
    fn put(&self, local: &Path, folder: &str) -> Result<Option<RemoteId>> {
        let metadata = match std::fs::metadata(local) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => meta,
            _ => {
                warn!("Skipping upload of missing or empty file");
                return Ok(None);
            }
        };
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ScanprepError::Store(format!("{} has no file name", local.display())))?;

        let dir = self.folder_dir(folder)?;
        std::fs::create_dir_all(&dir).map_err(|e| store_error("create folder", &dir, e))?;
        let bytes = std::fs::read(local).map_err(|e| store_error("read", local, e))?;
        let target = dir.join(&name);
        std::fs::write(&target, &bytes).map_err(|e| store_error("write", &target, e))?;

        let extension = target.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let id = RemoteId {
            folder: folder.to_string(),
            mime_type: mime_type_for_extension(extension).to_string(),
            name,
            sha256: fingerprint(&bytes),
        };
        info!(id = %id, bytes = metadata.len(), "Uploaded");
        Ok(Some(id))
    }

    #[instrument(skip(self, download_dir))]
    fn get(&self, name: &str, download_dir: &Path) -> Result<PathBuf> {
        let source = self
            .locate(name)?
            .ok_or_else(|| ScanprepError::InputNotFound(format!("{name} is not in the store")))?;
        std::fs::create_dir_all(download_dir)?;
        let target = download_dir.join(name);
        std::fs::copy(&source, &target).map_err(|e| store_error("download", &source, e))?;
        debug!(target = %target.display(), "Downloaded");
        Ok(target)
    }
}

fn store_error(action: &str, path: &Path, err: std::io::Error) -> ScanprepError {
    ScanprepError::Store(format!("failed to {} {}: {}", action, path.display(), err))
}
