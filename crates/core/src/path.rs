//! Translation between volume-relative paths and backend addresses.
//!
//! Callers always speak in forward-slash paths relative to the volume root.
//! [`RootedPath`] maps those onto a directory tree, [`KeyPrefix`] onto keys
//! under a virtual mount point in a bucket. Both reject `..` segments that
//! would climb above the root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Lexically resolves `path` against the volume root.
///
/// Empty and `.` segments are dropped, `..` pops the previous segment and
/// leading slashes are ignored. A trailing slash survives so that listing
/// prefixes keep their "directory" meaning.
pub fn clean(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::escapes_root(path));
                }
            }
            other => segments.push(other),
        }
    }

    let mut cleaned = segments.join("/");
    if path.ends_with('/') && !cleaned.is_empty() {
        cleaned.push('/');
    }
    Ok(cleaned)
}

/// Filesystem addressing: paths live under an absolute root directory.
#[derive(Debug, Clone)]
pub struct RootedPath {
    root: PathBuf,
}

impl RootedPath {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = std::path::absolute(root).map_err(|e| Error::Unknown {
            path: root.display().to_string(),
            bucket: None,
            underlying: crate::error::Underlying::from_io(&e),
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn normalize(&self, path: &str) -> Result<PathBuf> {
        let cleaned = clean(path)?;
        if cleaned.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(cleaned.trim_end_matches('/')))
    }

    /// Strips the root from an absolute path. Returns `None` for paths that
    /// are not inside the root or whose names are not valid UTF-8.
    pub fn denormalize(&self, full: &Path) -> Option<String> {
        let relative = full.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }
}

/// Object-store addressing: keys live under a prefix acting as the mount
/// point. The prefix is kept without surrounding slashes.
#[derive(Debug, Clone, Default)]
pub struct KeyPrefix {
    prefix: String,
}

impl KeyPrefix {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    pub fn normalize(&self, path: &str) -> Result<String> {
        let cleaned = clean(path)?;
        Ok(match (self.prefix.is_empty(), cleaned.is_empty()) {
            (true, _) => cleaned,
            (false, true) => format!("{}/", self.prefix),
            (false, false) => format!("{}/{cleaned}", self.prefix),
        })
    }

    pub fn denormalize(&self, key: &str) -> String {
        key.strip_prefix(self.prefix.as_str())
            .unwrap_or(key)
            .trim_matches('/')
            .to_string()
    }
}
