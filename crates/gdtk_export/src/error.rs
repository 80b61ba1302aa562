use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::cfg::CfgError;

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors that can abort (or, for [`ExportError::Remap`], be logged during)
/// an export run.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Malformed preset or project configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO failure on a specific file. Fatal for the current build.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Pack emission failure.
    #[error("pack error: {0}")]
    Pck(#[from] gdtk_pck::PckError),

    /// ZIP emission failure.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Config file parse failure.
    #[error(transparent)]
    Cfg(#[from] CfgError),

    /// The encrypted writer could not be set up.
    #[error("can't create encrypted file")]
    EncryptionSetup,

    /// An `.import` sidecar could not be parsed. The offending file is
    /// skipped; the build continues.
    #[error("could not parse '{path}.import'")]
    Remap {
        path: String,
        #[source]
        source: CfgError,
    },

    /// The progress reporter asked to stop. Cleanup still runs; the
    /// destination must be treated as garbage.
    #[error("export cancelled")]
    Cancelled,

    /// The save function was invoked with an empty file set.
    #[error("must select at least one file to export")]
    ParameterRange,

    /// No export template was found for the requested configuration.
    #[error("no export template found: {0}")]
    TemplateMissing(String),

    /// A caller-supplied parameter combination is unusable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl ExportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Cancellation is an orderly stop, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
