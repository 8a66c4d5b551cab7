use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::fs::ReadDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{EntryStream, Volume};
use crate::entry::{
    Content, CopyOptions, Entry, Exists, FileMeta, MoveOptions, Outcome, Payload, Raw,
    ReadOptions, Removed, RequestParams, WriteOptions,
};
use crate::error::{Error, Result, Underlying};
use crate::path::{self, RootedPath};

pub const PROTOCOL: &str = "fs";

/// Volume backed by a directory tree.
#[derive(Debug, Clone)]
pub struct LocalVolume {
    paths: RootedPath,
}

impl LocalVolume {
    /// The root is resolved to an absolute path once and never changes. It
    /// does not need to exist yet; the first write creates it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            paths: RootedPath::new(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn paths(&self) -> &RootedPath {
        &self.paths
    }

    async fn write_atomic(&self, full: &Path, data: &[u8]) -> std::io::Result<u64> {
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = full.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = tokio::fs::rename(&tmp, full).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(data.len() as u64)
    }

    async fn file_meta(full: &Path) -> Raw {
        match tokio::fs::metadata(full).await {
            Ok(meta) => Raw::File(FileMeta::from_metadata(full.to_path_buf(), &meta)),
            Err(_) => Raw::None,
        }
    }
}

#[async_trait]
impl Volume for LocalVolume {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    async fn exists(&self, path: &str, _params: RequestParams) -> Result<Exists> {
        let full = self.paths.normalize(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(Exists {
                exists: true,
                raw: Raw::File(FileMeta::from_metadata(full, &meta)),
            }),
            Err(e) if is_missing(&e) => Ok(Exists {
                exists: false,
                raw: Raw::Missing(Underlying::from_io(&e)),
            }),
            Err(e) => Err(translate(e, path)),
        }
    }

    async fn write(&self, path: &str, content: Content, _options: WriteOptions) -> Result<Outcome> {
        let full = self.paths.normalize(path)?;
        if full == self.paths.root() {
            return Err(Error::MissingArgument {
                operation: "write",
                argument: "path",
            });
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| translate(e, path))?;
        }

        let written = match content {
            Content::Stream(mut reader) => {
                let mut file = tokio::fs::File::create(&full)
                    .await
                    .map_err(|e| translate(e, path))?;
                let copied = tokio::io::copy(&mut reader, &mut file)
                    .await
                    .map_err(|e| translate(e, path))?;
                file.flush().await.map_err(|e| translate(e, path))?;
                copied
            }
            Content::Bytes(data) => self
                .write_atomic(&full, &data)
                .await
                .map_err(|e| translate(e, path))?,
            Content::Text(text) => self
                .write_atomic(&full, text.as_bytes())
                .await
                .map_err(|e| translate(e, path))?,
        };

        debug!(path, bytes = written, "wrote file");
        Ok(Outcome {
            raw: Self::file_meta(&full).await,
        })
    }

    async fn read(&self, path: &str, options: ReadOptions) -> Result<Entry> {
        let full = self.paths.normalize(path)?;
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| translate(e, path))?;
        let raw = Raw::File(FileMeta {
            len: data.len() as u64,
            modified: None,
            path: full,
        });
        let content = Payload::decode(data.into(), &options).map_err(|underlying| Error::Unknown {
            path: path.to_string(),
            bucket: None,
            underlying,
        })?;
        Ok(Entry {
            path: path::clean(path)?,
            content: Some(content),
            raw,
        })
    }

    async fn copy(&self, source: &str, target: &str, options: CopyOptions) -> Result<Outcome> {
        let from = self.paths.normalize(source)?;
        let to = self.paths.normalize(target)?;
        let location = format!("{source} -> {target}");

        let meta = tokio::fs::metadata(&from)
            .await
            .map_err(|e| translate(e, source))?;
        if from == to || (meta.is_dir() && to.starts_with(&from)) {
            return Err(Error::OperationNotPermitted {
                path: location,
                hint: Some("cannot copy a path onto itself or into its own subtree".to_string()),
                underlying: Underlying::new("InvalidInput", "source contains target"),
            });
        }
        if !options.overwrite && exists_on_disk(&to).await.map_err(|e| translate(e, target))? {
            return Err(Error::target_exists(&location));
        }

        if meta.is_dir() {
            copy_tree(&from, &to)
                .await
                .map_err(|e| translate(e, &location))?;
        } else {
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| translate(e, &location))?;
            }
            tokio::fs::copy(&from, &to)
                .await
                .map_err(|e| translate(e, &location))?;
        }

        debug!(source, target, "copied");
        Ok(Outcome {
            raw: Self::file_meta(&to).await,
        })
    }

    async fn rename(&self, source: &str, target: &str, options: MoveOptions) -> Result<Outcome> {
        let from = self.paths.normalize(source)?;
        let to = self.paths.normalize(target)?;
        let location = format!("{source} -> {target}");

        tokio::fs::symlink_metadata(&from)
            .await
            .map_err(|e| translate(e, &location))?;
        if from == to {
            return Ok(Outcome {
                raw: Self::file_meta(&to).await,
            });
        }

        match tokio::fs::symlink_metadata(&to).await {
            Ok(_) if !options.overwrite => return Err(Error::target_exists(&location)),
            Ok(existing) if existing.is_dir() => tokio::fs::remove_dir_all(&to)
                .await
                .map_err(|e| translate(e, &location))?,
            Ok(_) => {}
            Err(e) if is_missing(&e) => {}
            Err(e) => return Err(translate(e, &location)),
        }

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| translate(e, &location))?;
        }
        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| translate(e, &location))?;

        debug!(source, target, "moved");
        Ok(Outcome {
            raw: Self::file_meta(&to).await,
        })
    }

    async fn remove(&self, path: &str, _params: RequestParams) -> Result<Removed> {
        let full = self.paths.normalize(path)?;
        if full == self.paths.root() {
            return Err(Error::MissingArgument {
                operation: "remove",
                argument: "path",
            });
        }

        let meta = match tokio::fs::symlink_metadata(&full).await {
            Ok(meta) => meta,
            Err(e) if is_missing(&e) => {
                return Ok(Removed {
                    deleted: Some(false),
                    raw: Raw::None,
                });
            }
            Err(e) => return Err(translate(e, path)),
        };
        let raw = Raw::File(FileMeta::from_metadata(full.clone(), &meta));

        let removal = if meta.is_dir() {
            tokio::fs::remove_dir_all(&full).await
        } else {
            tokio::fs::remove_file(&full).await
        };
        match removal {
            Ok(()) => {
                debug!(path, "removed");
                Ok(Removed {
                    deleted: Some(true),
                    raw,
                })
            }
            Err(e) if is_missing(&e) => Ok(Removed {
                deleted: Some(false),
                raw: Raw::None,
            }),
            Err(e) => Err(translate(e, path)),
        }
    }

    fn list<'a>(&'a self, prefix: &str, _params: RequestParams) -> EntryStream<'a> {
        let walk = match Walk::new(self.paths.clone(), prefix) {
            Ok(walk) => walk,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        stream::try_unfold(walk, |mut walk| async move {
            let next = walk.next_file().await?;
            Ok::<_, Error>(next.map(|entry| (entry, walk)))
        })
        .boxed()
    }
}

/// Depth-first traversal state for one `list` call.
struct Walk {
    paths: RootedPath,
    /// Cleaned prefix every yielded path must start with.
    prefix: String,
    /// Caller's pattern, kept for error reports.
    pattern: String,
    start: Option<PathBuf>,
    stack: Vec<ReadDir>,
}

impl Walk {
    fn new(paths: RootedPath, pattern: &str) -> Result<Self> {
        let prefix = path::clean(pattern)?;
        let start_dir = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.trim_end_matches('/')
        } else {
            prefix.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
        };
        let start = paths.normalize(start_dir)?;
        Ok(Self {
            paths,
            prefix,
            pattern: pattern.to_string(),
            start: Some(start),
            stack: Vec::new(),
        })
    }

    async fn open(&mut self, dir: &Path) -> Result<()> {
        match tokio::fs::read_dir(dir).await {
            Ok(read_dir) => {
                self.stack.push(read_dir);
                Ok(())
            }
            Err(e) if is_missing(&e) => Ok(()),
            Err(e) => Err(translate(e, &self.pattern)),
        }
    }

    async fn next_file(&mut self) -> Result<Option<Entry>> {
        if let Some(start) = self.start.take() {
            self.open(&start).await?;
        }

        while let Some(dir) = self.stack.last_mut() {
            let next = match dir.next_entry().await {
                Ok(next) => next,
                Err(e) if is_missing(&e) => None,
                Err(e) => return Err(translate(e, &self.pattern)),
            };
            let Some(item) = next else {
                self.stack.pop();
                continue;
            };

            let full = item.path();
            // Names that are not UTF-8 could not be addressed by a later call.
            let Some(relative) = self.paths.denormalize(&full) else {
                warn!(path = %full.display(), "skipping entry without a UTF-8 volume path");
                continue;
            };
            let file_type = match item.file_type().await {
                Ok(file_type) => file_type,
                Err(e) if is_missing(&e) => continue,
                Err(e) => return Err(translate(e, &self.pattern)),
            };

            if file_type.is_dir() {
                if format!("{relative}/").starts_with(&self.prefix) {
                    self.open(&full).await?;
                }
            } else if file_type.is_file() && relative.starts_with(&self.prefix) {
                let raw = match item.metadata().await {
                    Ok(meta) => Raw::File(FileMeta::from_metadata(full, &meta)),
                    Err(e) if is_missing(&e) => continue,
                    Err(e) => return Err(translate(e, &self.pattern)),
                };
                return Ok(Some(Entry {
                    path: relative,
                    content: None,
                    raw,
                }));
            }
        }

        Ok(None)
    }
}

fn is_missing(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

async fn exists_on_disk(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if is_missing(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

async fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dst)) = pending.pop() {
        tokio::fs::create_dir_all(&dst).await?;
        let mut read_dir = tokio::fs::read_dir(&src).await?;
        while let Some(item) = read_dir.next_entry().await? {
            let file_type = item.file_type().await?;
            let target = dst.join(item.file_name());
            if file_type.is_dir() {
                pending.push((item.path(), target));
            } else if file_type.is_file() {
                tokio::fs::copy(item.path(), &target).await?;
            }
        }
    }
    Ok(())
}

fn translate(err: std::io::Error, location: &str) -> Error {
    let underlying = Underlying::from_io(&err);
    let path = location.to_string();
    match err.kind() {
        ErrorKind::NotFound => Error::NotFound { path, underlying },
        ErrorKind::PermissionDenied => Error::OperationNotPermitted {
            path,
            hint: None,
            underlying,
        },
        ErrorKind::AlreadyExists => Error::OperationNotPermitted {
            path,
            hint: Some("Use overwrite option.".to_string()),
            underlying,
        },
        _ => Error::Unknown {
            path,
            bucket: None,
            underlying,
        },
    }
}
