//! Step-level errors.

use std::{io, path::PathBuf};

use crate::{
    artifact::ArtifactError,
    config::ConfigError,
    export::ExportError,
    jspackage::InstallError,
    process::CommandError,
    version::ParseError,
};

/// Everything that can fail a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to change working directory to {}: {source}", .path.display())]
    Workdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to install {package}: {source}")]
    Install {
        package: String,
        #[source]
        source: InstallError,
    },

    #[error("failed to get {tool} version: {source}")]
    ToolVersion {
        tool: &'static str,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    Version(#[from] ParseError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to collect {kind} outputs: {source}")]
    Artifact {
        kind: &'static str,
        #[source]
        source: ArtifactError,
    },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("{0}")]
    NoOutputs(&'static str),
}

pub type Result<T> = core::result::Result<T, Error>;
