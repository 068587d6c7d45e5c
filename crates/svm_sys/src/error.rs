use std::path::PathBuf;
use svm_core::SvmError;

/// Failures of the Linux glue layer.
#[derive(Debug, thiserror::Error)]
pub enum SysError {
    #[error(transparent)]
    Svm(#[from] SvmError),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// The physical memory window could not be opened or mapped. There is no
    /// safe fallback for addressing hardware, so callers treat this as fatal.
    #[error("cannot map physical {address:#010x} through {path}: {source}")]
    MapFailed {
        path: PathBuf,
        address: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {what}: {line}")]
    Malformed { what: &'static str, line: String },
}

pub type SysResult<T> = Result<T, SysError>;
