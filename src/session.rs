use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("no upload directory given")]
    MissingLocation,
    #[error("{} is not an upload directory", .0.display())]
    InvalidLocation(PathBuf),
    #[error("invalid item name {0:?}")]
    InvalidItemName(String),
    #[error("upload content is not a base64 data URL")]
    MalformedUpload,
}

// ---------------------------------------------------------------------------
// UploadStore – per-session directories under one base directory
// ---------------------------------------------------------------------------

/// Owns the upload base directory. Each session gets its own directory
/// inside it; every path coming back from the UI is checked against the
/// base before anything touches the filesystem.
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_dir: PathBuf,
}

impl UploadStore {
    /// Use (and create, if needed) `base_dir` as the upload root.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)
            .with_context(|| format!("creating upload base directory {}", base_dir.display()))?;
        Ok(UploadStore { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// A fresh, uniquely named session directory inside the base directory.
    pub fn create_session_dir(&self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("session_")
            .disable_cleanup(true)
            .tempdir_in(&self.base_dir)
            .with_context(|| format!("creating session directory in {}", self.base_dir.display()))?;
        let path = dir.path().to_path_buf();
        log::info!("new session directory {}", path.display());
        Ok(path)
    }

    /// Check that `dir` was given and lies inside the base directory.
    ///
    /// Purely lexical: `..` components are refused outright, so no
    /// filesystem access is needed to decide.
    pub fn validate_upload_dir(&self, dir: Option<&Path>) -> Result<PathBuf, SessionError> {
        let dir = dir
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or(SessionError::MissingLocation)?;
        let escapes = dir.components().any(|c| matches!(c, Component::ParentDir));
        if escapes || !dir.starts_with(&self.base_dir) {
            return Err(SessionError::InvalidLocation(dir.to_path_buf()));
        }
        Ok(dir.to_path_buf())
    }

    /// Store an upload given as `data:<mime>;base64,<payload>` in the session directory.
    pub fn save_upload(&self, dir: Option<&Path>, item_name: &str, data_url: &str) -> Result<PathBuf> {
        let bytes = decode_data_url(data_url)?;
        self.save_bytes(dir, item_name, &bytes)
    }

    /// Write `bytes` as `item_name` in the session directory. The file is
    /// written to a temporary name first and renamed into place.
    pub fn save_bytes(&self, dir: Option<&Path>, item_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.validate_upload_dir(dir)?;
        let target = dir.join(checked_item_name(item_name)?);
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("creating temporary file in {}", dir.display()))?;
        tmp.write_all(bytes).context("writing upload")?;
        tmp.persist(&target)
            .with_context(|| format!("storing {}", target.display()))?;
        log::info!("stored upload {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }

    /// Names of the regular files in the session directory, sorted.
    pub fn list_items(&self, dir: Option<&Path>) -> Result<Vec<String>> {
        let dir = self.validate_upload_dir(dir)?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).with_context(|| format!("listing {}", dir.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

// ---------------------------------------------------------------------------
// Item resolution
// ---------------------------------------------------------------------------

fn checked_item_name(name: &str) -> Result<&str, SessionError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(SessionError::InvalidItemName(name.to_string())),
    }
}

/// Path of `item_name` inside `dir`, if such a file exists.
pub fn item_path(item_name: &str, dir: &Path) -> Option<PathBuf> {
    let name = checked_item_name(item_name).ok()?;
    let path = dir.join(name);
    path.exists().then_some(path)
}

pub fn item_paths<S: AsRef<str>>(item_names: &[S], dir: &Path) -> Vec<Option<PathBuf>> {
    item_names
        .iter()
        .map(|name| item_path(name.as_ref(), dir))
        .collect()
}

/// Paths of the items that still exist; missing ones are skipped.
pub fn existing_item_paths<S: AsRef<str>>(item_names: &[S], dir: &Path) -> Vec<PathBuf> {
    item_names
        .iter()
        .filter_map(|name| {
            let path = item_path(name.as_ref(), dir);
            if path.is_none() {
                log::warn!("item {:?} no longer exists in {}", name.as_ref(), dir.display());
            }
            path
        })
        .collect()
}

/// Decode the payload of a browser-style data URL. Both the standard and
/// the URL-safe base64 alphabets are accepted.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, SessionError> {
    let (header, payload) = data_url.split_once(',').ok_or(SessionError::MalformedUpload)?;
    if !header.ends_with(";base64") {
        return Err(SessionError::MalformedUpload);
    }
    let payload = payload.trim();
    STANDARD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .or_else(|_| URL_SAFE_NO_PAD.decode(payload))
        .map_err(|_| SessionError::MalformedUpload)
}
