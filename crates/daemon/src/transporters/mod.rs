// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transporters: per-destination upload/delete workers
//!
//! A [`Storage`] implements one destination kind (the contract network
//! transporters must satisfy); a [`TransporterWorker`] wraps one storage in
//! a task that serializes its operations; a [`TransporterPool`] grows
//! workers on demand within the configured connection caps.

pub mod pool;
pub mod symlink_or_copy;
pub mod worker;

pub use pool::TransporterPool;
pub use symlink_or_copy::SymlinkOrCopyStorage;
pub use worker::{TransportReport, TransporterWorker};

use conveyor_core::Server;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    /// Delete any artifact already at the destination path, then store the
    /// source file there and produce its canonical public URL.
    AddModify,
    /// Remove the artifact if present; absence is not an error.
    Delete,
}

#[derive(Debug, thiserror::Error)]
pub enum TransporterError {
    #[error("unknown transporter kind '{0}'")]
    UnknownKind(String),
    #[error("server '{server}': missing required setting '{setting}'")]
    MissingSetting { server: String, setting: &'static str },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One destination kind. Implementations run on worker threads and may
/// block; construction performs whatever connection test the kind needs and
/// fails with [`TransporterError::Connection`] when the destination is
/// unreachable.
pub trait Storage: Send {
    fn exists(&mut self, dst: &str) -> Result<bool, TransporterError>;
    /// Store `src` at the destination-relative path `dst` and return the
    /// canonical public URL of the stored artifact.
    fn save(&mut self, src: &std::path::Path, dst: &str) -> Result<String, TransporterError>;
    fn delete(&mut self, dst: &str) -> Result<(), TransporterError>;
}

pub type StorageFactory = fn(&Server) -> Result<Box<dyn Storage>, TransporterError>;

fn symlink_or_copy_factory(server: &Server) -> Result<Box<dyn Storage>, TransporterError> {
    Ok(Box::new(SymlinkOrCopyStorage::from_server(server)?))
}

/// Static registry of transporter kinds. Network kinds (S3, FTP, SFTP, …)
/// register here the same way; an unknown kind in the configuration is a
/// fatal startup error.
pub fn lookup(kind: &str) -> Option<StorageFactory> {
    match kind {
        "symlink_or_copy" => Some(symlink_or_copy_factory),
        // Development transporter: same local storage under its legacy name.
        "none" => Some(symlink_or_copy_factory),
        _ => None,
    }
}
