//! Build artifact discovery and deployment.
//!
//! Locating outputs copes with the Cordova iOS layout change in version 7
//! and filters on modification time, so artifacts left behind by an
//! earlier build are never picked up.

mod deploy;
mod locate;

use std::{io, path::PathBuf};

pub use deploy::{Exported, move_and_export};
pub use locate::{find_artifacts, ios_output_dir};

/// Errors that can occur while locating or deploying artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk output directory: {0}")]
    Walk(#[from] ignore::Error),

    #[error("resolved path {} does not exist", .0.display())]
    MissingTarget(PathBuf),

    #[error("resolved path {} is still a symlink", .0.display())]
    NestedSymlink(PathBuf),
}

pub type Result<T> = core::result::Result<T, ArtifactError>;

impl ArtifactError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
