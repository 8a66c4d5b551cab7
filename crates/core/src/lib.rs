pub mod backend;
pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod manager;
pub mod path;

pub use backend::Volume;
pub use entry::{
    Content, CopyOptions, Entry, MoveOptions, ReadOptions, RequestParams, WriteOptions,
};
pub use error::{Error, Result};
pub use manager::VolumeManager;
