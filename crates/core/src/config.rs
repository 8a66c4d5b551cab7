//! Volume definitions and how their settings are resolved.
//!
//! Every setting is resolved once, when a driver is built, with the
//! precedence: value in the definition, then the injected
//! [`ObjectStoreDefaults`], then the built-in default.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backend::s3::DEFAULT_MAX_KEYS;
use crate::client::{ClientOptions, StaticCredentials};
use crate::error::{Error, Result, Underlying};

pub const DEFAULT_FS_ROOT: &str = "/tmp";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_VOLUME: &str = "fs";

/// How a named volume is backed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol")]
pub enum VolumeDefinition {
    #[serde(rename = "fs")]
    Local(LocalSettings),
    #[serde(rename = "s3")]
    S3(S3Settings),
}

impl VolumeDefinition {
    pub fn protocol(&self) -> &'static str {
        match self {
            VolumeDefinition::Local(_) => crate::backend::local::PROTOCOL,
            VolumeDefinition::S3(_) => crate::backend::s3::PROTOCOL,
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        VolumeDefinition::Local(LocalSettings {
            root: Some(root.into()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSettings {
    pub root: Option<PathBuf>,
}

impl LocalSettings {
    pub fn resolve(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FS_ROOT))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    /// Key prefix acting as the volume's mount point.
    pub root: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Keys per listing page.
    pub max_keys: Option<usize>,
}

/// Object-store settings supplied from outside the definitions, typically
/// the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStoreDefaults {
    pub root: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Development endpoint; switches the client to path-style addressing.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

impl ObjectStoreDefaults {
    /// Reads `VOLUME_S3_ROOT`, `VOLUME_S3_BUCKET`, `AWS_ACCESS_REGION`,
    /// `AWS_DEV_ENDPOINT`, `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            root: get("VOLUME_S3_ROOT"),
            bucket: get("VOLUME_S3_BUCKET"),
            region: get("AWS_ACCESS_REGION"),
            endpoint: get("AWS_DEV_ENDPOINT"),
            access_key: get("AWS_ACCESS_KEY_ID"),
            secret_key: get("AWS_SECRET_ACCESS_KEY"),
        }
    }
}

/// Fully resolved settings an [`S3Volume`](crate::backend::s3::S3Volume)
/// is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub root: String,
    pub bucket: String,
    pub client: ClientOptions,
    pub max_keys: usize,
}

impl S3Settings {
    pub fn resolve(&self, defaults: &ObjectStoreDefaults) -> Result<S3Config> {
        fn pick(explicit: &Option<String>, injected: &Option<String>) -> Option<String> {
            explicit.clone().or_else(|| injected.clone())
        }

        let bucket = pick(&self.bucket, &defaults.bucket).ok_or(Error::MissingArgument {
            operation: "configure",
            argument: "bucket",
        })?;
        let endpoint = pick(&self.endpoint, &defaults.endpoint);
        let credentials = match (
            pick(&self.access_key, &defaults.access_key),
            pick(&self.secret_key, &defaults.secret_key),
        ) {
            (Some(access_key), Some(secret_key)) => Some(StaticCredentials {
                access_key,
                secret_key,
            }),
            (None, None) => None,
            _ => {
                return Err(Error::Unknown {
                    path: String::new(),
                    bucket: Some(bucket),
                    underlying: Underlying::new(
                        "IncompleteCredentials",
                        "access key and secret key must be given together",
                    ),
                });
            }
        };

        Ok(S3Config {
            root: pick(&self.root, &defaults.root).unwrap_or_default(),
            bucket,
            client: ClientOptions {
                region: pick(&self.region, &defaults.region)
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                path_style: endpoint.is_some(),
                endpoint,
                credentials,
            },
            max_keys: self.max_keys.unwrap_or(DEFAULT_MAX_KEYS).max(1),
        })
    }
}

/// Contents of a `volumes.toml` file.
///
/// ```toml
/// default_volume = "uploads"
///
/// [volumes.uploads]
/// protocol = "fs"
/// root = "/var/lib/uploads"
///
/// [volumes.media]
/// protocol = "s3"
/// bucket = "media"
/// root = "public"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumesConfig {
    pub default_volume: Option<String>,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeDefinition>,
}

impl VolumesConfig {
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
