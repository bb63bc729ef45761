use std::{fmt, io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to take a process snapshot: {0}")]
    Snapshot(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Access denied to process {process_id}")]
    AccessDenied { process_id: u32 },

    #[error("Failed to open process {process_id}: {source}")]
    OpenFailed {
        process_id: u32,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Scan(#[from] ScanError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Read,
    Write,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Read => f.write_str("read"),
            TransferKind::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Process session is detached")]
    Detached,

    #[error("Failed to {kind} {requested} bytes at {address:#x}: {source}")]
    Os {
        kind: TransferKind,
        address: usize,
        requested: usize,
        #[source]
        source: io::Error,
    },

    #[error("Incomplete {kind} at {address:#x}: {transferred} of {requested} bytes")]
    Incomplete {
        kind: TransferKind,
        address: usize,
        requested: usize,
        transferred: usize,
    },
}

#[derive(Debug, Error)]
pub enum DeviceCreationError {
    #[error("Failed to create a probe device: {0}")]
    Create(#[source] io::Error),

    #[error("Probe device returned no {0}")]
    MissingInterface(&'static str),
}

#[derive(Debug, Error)]
pub enum HookInstallError {
    #[error("A hook is already installed")]
    AlreadyInstalled,

    #[error("Slot at {address:#x} already points to the hook")]
    AlreadyPatched { address: usize },

    #[error("Failed to change protection of {address:#x}: {source}")]
    Protect {
        address: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Failed to enumerate modules: {0}")]
    Modules(#[source] io::Error),

    #[error("Address overflow: {base:#x} + {offset:#x}")]
    Overflow { base: usize, offset: u64 },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid profile: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown value: {0}")]
    UnknownValue(String),

    #[error("Invalid {kind} value: {text}")]
    InvalidValue { kind: &'static str, text: String },
}
