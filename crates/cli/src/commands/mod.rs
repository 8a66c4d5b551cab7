pub mod cat;
pub mod demo;
pub mod exists;
pub mod ls;
pub mod put;
pub mod rm;
pub mod transfer;
pub mod volumes;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Subcommand;

use volumes_core::config::ObjectStoreDefaults;
use volumes_core::{RequestParams, Volume, VolumeManager};

use crate::config;

#[derive(Subcommand)]
pub enum Command {
    /// Check whether a file exists
    Exists(exists::ExistsArgs),
    /// Write a file from text, a local file or stdin
    Put(put::PutArgs),
    /// Print a file
    Cat(cat::CatArgs),
    /// Copy a file or directory within a volume
    Cp(transfer::CopyArgs),
    /// Move a file or directory within a volume
    Mv(transfer::MoveArgs),
    /// Remove a file or directory
    Rm(rm::RmArgs),
    /// List files below a prefix
    Ls(ls::LsArgs),
    /// Show the defined volumes
    Volumes,
    /// Run a write/read/copy/remove round trip against a volume
    Demo(demo::DemoArgs),
}

/// Shared state for every subcommand.
pub struct Context {
    pub manager: VolumeManager,
    volume: Option<String>,
    params: RequestParams,
}

impl Context {
    pub fn open(
        config_path: Option<&Path>,
        volume: Option<String>,
        params: RequestParams,
    ) -> Result<Self> {
        let config = config::load(config_path)?;
        let manager = VolumeManager::from_config(
            config,
            ObjectStoreDefaults::from_env(),
            volumes_core::client::default_factory(),
        );
        Ok(Self {
            manager,
            volume,
            params,
        })
    }

    /// The volume selected with `--volume`, or the default one.
    pub fn volume(&self) -> Result<Arc<dyn Volume>> {
        Ok(self.manager.volume(self.volume.as_deref())?)
    }

    /// Request extensions from `--header` and `--query`.
    pub fn params(&self) -> RequestParams {
        self.params.clone()
    }

    pub fn volume_name(&self) -> &str {
        self.volume
            .as_deref()
            .unwrap_or_else(|| self.manager.default_volume())
    }
}
