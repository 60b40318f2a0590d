//! Where builds leave their outputs, and which of them are new.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use ignore::WalkBuilder;
use jiff::Timestamp;
use tracing::warn;

use super::Result;
use crate::version::SemanticVersion;

/// First Cordova major that writes `<Configuration>-<sdk>` build directories.
const MODERN_IOS_LAYOUT_MAJOR: u64 = 7;

/// Candidate iOS output directories, legacy layout first.
///
/// ```text
/// <workdir>/platforms/ios/build/<target>                     # before Cordova 7
/// <workdir>/platforms/ios/build/<Configuration>-<sdk>        # Cordova 7 and later
/// ```
pub fn ios_output_candidate_dirs(workdir: &Path, target: &str, configuration: &str) -> Vec<PathBuf> {
    let build = ios_build_dir(workdir);
    vec![
        build.join(target),
        build.join(modern_component(target, configuration)),
    ]
}

/// The build directory component the detected Cordova version writes to.
pub fn ios_target_path_component(
    target: &str,
    configuration: &str,
    cordova: &SemanticVersion,
) -> String {
    if cordova.major() >= MODERN_IOS_LAYOUT_MAJOR {
        modern_component(target, configuration)
    } else {
        target.to_string()
    }
}

/// The existing iOS output directory, if any.
///
/// The directory the detected Cordova version writes to is tried first,
/// then the remaining candidates in [`ios_output_candidate_dirs`] order.
pub fn ios_output_dir(
    workdir: &Path,
    target: &str,
    configuration: &str,
    cordova: &SemanticVersion,
) -> Option<PathBuf> {
    let detected =
        ios_build_dir(workdir).join(ios_target_path_component(target, configuration, cordova));
    let ordered: Vec<PathBuf> = std::iter::once(detected.clone())
        .chain(
            ios_output_candidate_dirs(workdir, target, configuration)
                .into_iter()
                .filter(|c| *c != detected),
        )
        .collect();
    find_first_existing_dir(&ordered)
}

/// The first candidate that exists as a directory.
///
/// A failed check is logged and treated as missing.
pub fn find_first_existing_dir(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find_map(|path| match fs::metadata(path) {
        Ok(metadata) => metadata.is_dir().then(|| path.clone()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("failed to check if dir ({}) exists: {e}", path.display());
            None
        }
    })
}

/// Find entries under `dir` with the given extension, modified at or after
/// `not_before`.
///
/// Matches files and directories alike (`.app` and `.dSYM` are bundles).
/// The extension match is case-sensitive. Matched directories are not
/// descended into. Entries are returned depth-first, sorted by file name
/// within each directory.
pub fn find_artifacts(dir: &Path, extension: &str, not_before: Timestamp) -> Result<Vec<PathBuf>> {
    let root = dir.to_path_buf();
    let ext = extension.to_string();
    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            // Stop at bundles: anything inside them was reported with the bundle.
            entry
                .path()
                .parent()
                .is_none_or(|parent| parent == root || !has_extension(parent, &ext))
        })
        .sort_by_file_name(Ord::cmp)
        .build();

    let mut matches = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 || !has_extension(entry.path(), extension) {
            continue;
        }
        let modified = entry
            .metadata()?
            .modified()
            .map_err(super::ArtifactError::io(entry.path()))?;
        if Timestamp::try_from(modified).is_ok_and(|t| t >= not_before) {
            matches.push(entry.into_path());
        }
    }
    Ok(matches)
}

fn ios_build_dir(workdir: &Path) -> PathBuf {
    workdir.join("platforms").join("ios").join("build")
}

fn modern_component(target: &str, configuration: &str) -> String {
    let sdk = if target == "device" {
        "iphoneos"
    } else {
        "iphonesimulator"
    };
    format!("{}-{sdk}", capitalize(configuration))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|e| e == extension)
}
