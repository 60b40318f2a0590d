//! Handing results to later CI steps.
//!
//! Values are exported through `envman`, the CI's environment store.
//! Bundle directories are zipped next to their deployed copy.

use std::{
    env, fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use ignore::WalkBuilder;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::process::{CommandError, Cmd};

pub const IPA_PATH: &str = "BITRISE_IPA_PATH";
pub const APP_ZIP_PATH: &str = "BITRISE_APP_PATH";
pub const APP_DIR_PATH: &str = "BITRISE_APP_DIR_PATH";
pub const DSYM_DIR_PATH: &str = "BITRISE_DSYM_DIR_PATH";
pub const DSYM_ZIP_PATH: &str = "BITRISE_DSYM_PATH";
pub const APK_PATH: &str = "BITRISE_APK_PATH";
pub const APK_PATH_LIST: &str = "BITRISE_APK_PATH_LIST";
pub const AAB_PATH: &str = "BITRISE_AAB_PATH";
pub const AAB_PATH_LIST: &str = "BITRISE_AAB_PATH_LIST";
pub const CACHE_INCLUDE_PATHS: &str = "BITRISE_CACHE_INCLUDE_PATHS";

/// Separator for multi-path list variables.
pub const LIST_SEPARATOR: &str = "|";

/// Errors that can occur while exporting results.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to export {key}: {source}")]
    Env {
        key: String,
        #[source]
        source: CommandError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to zip {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("local dependency directory does not exist: {}", .0.display())]
    MissingCachePath(PathBuf),
}

pub type Result<T> = core::result::Result<T, ExportError>;

impl ExportError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + use<> {
        let path = path.to_path_buf();
        move |source| Self::Io { path, source }
    }
}

/// Destination for exported environment variables.
pub trait EnvExporter {
    fn export(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Exports through `envman add --key <KEY> --value <VALUE>`.
#[derive(Debug, Default)]
pub struct Envman;

impl EnvExporter for Envman {
    fn export(&mut self, key: &str, value: &str) -> Result<()> {
        Cmd::new("envman")
            .args(["add", "--key", key, "--value", value])
            .run_captured(None)
            .map(|_| ())
            .map_err(|source| ExportError::Env {
                key: key.to_string(),
                source,
            })
    }
}

/// Zip `dir` into `destination`, with the directory itself as the root entry.
///
/// Symlinks are stored as links, which keeps `.app` and `.dSYM` bundles intact.
pub fn zip_dir(dir: &Path, destination: &Path) -> Result<()> {
    let zip_err = |source: zip::result::ZipError| ExportError::Zip {
        path: dir.to_path_buf(),
        source,
    };
    let base = dir.parent().unwrap_or(dir);
    let file = fs::File::create(destination).map_err(ExportError::io(destination))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkBuilder::new(dir)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(Ord::cmp)
        .build();

    for entry in walker {
        let entry = entry.map_err(|source| ExportError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let name = archive_name(path.strip_prefix(base).unwrap_or(path));
        let Some(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(ExportError::io(path))?;
            writer
                .add_symlink(name, target.to_string_lossy(), options)
                .map_err(zip_err)?;
        } else if file_type.is_dir() {
            writer
                .add_directory(format!("{name}/"), options)
                .map_err(zip_err)?;
        } else {
            writer.start_file(name, options).map_err(zip_err)?;
            let mut source = fs::File::open(path).map_err(ExportError::io(path))?;
            io::copy(&mut source, &mut writer).map_err(ExportError::io(path))?;
        }
    }

    let mut file = writer.finish().map_err(zip_err)?;
    file.flush().map_err(ExportError::io(destination))?;
    Ok(())
}

/// Mark `<workdir>/node_modules` for the CI cache.
///
/// Appends to any paths earlier steps already registered.
pub fn cache_local_deps(workdir: &Path, exporter: &mut dyn EnvExporter) -> Result<()> {
    let local = workdir.join("node_modules");
    match fs::metadata(&local) {
        Ok(m) if m.is_dir() => {}
        Ok(_) => return Err(ExportError::MissingCachePath(local)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ExportError::MissingCachePath(local));
        }
        Err(source) => return Err(ExportError::Io { path: local, source }),
    }

    let existing = env::var(CACHE_INCLUDE_PATHS).unwrap_or_default();
    let value = append_cache_path(&existing, &local);
    exporter.export(CACHE_INCLUDE_PATHS, &value)
}

fn append_cache_path(existing: &str, path: &Path) -> String {
    let path = path.display().to_string();
    let mut paths: Vec<&str> = existing.lines().filter(|l| !l.trim().is_empty()).collect();
    if !paths.contains(&path.as_str()) {
        paths.push(&path);
    }
    paths.join("\n")
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}


#[cfg(test)]
mod tests {
    use super::*;

    use std::{io::Read, os::unix::fs::symlink};

    use tempfile::TempDir;

    use super::testing::Recorder;

    // ── Zip ──

    #[test]
    fn zip_keeps_directory_as_root() {
        let dir = TempDir::new().unwrap();
        let dsym = dir.path().join("App.app.dSYM");
        fs::create_dir_all(dsym.join("Contents/Resources")).unwrap();
        fs::write(dsym.join("Contents/Info.plist"), "plist").unwrap();
        fs::write(dsym.join("Contents/Resources/App"), "dwarf").unwrap();

        let destination = dir.path().join("App.app.dSYM.zip");
        zip_dir(&dsym, &destination).unwrap();

        let mut archive = zip::ZipArchive::new(fs::File::open(&destination).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"App.app.dSYM/"));
        assert!(names.contains(&"App.app.dSYM/Contents/Info.plist"));
        assert!(names.contains(&"App.app.dSYM/Contents/Resources/App"));

        let mut content = String::new();
        archive
            .by_name("App.app.dSYM/Contents/Resources/App")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "dwarf");
    }

    #[test]
    fn zip_stores_symlinks_as_links() {
        let dir = TempDir::new().unwrap();
        let app = dir.path().join("App.app");
        fs::create_dir_all(app.join("Versions/A")).unwrap();
        fs::write(app.join("Versions/A/Lib"), "bin").unwrap();
        symlink("Versions/A/Lib", app.join("Lib")).unwrap();

        let destination = dir.path().join("App.app.zip");
        zip_dir(&app, &destination).unwrap();

        let mut archive = zip::ZipArchive::new(fs::File::open(&destination).unwrap()).unwrap();
        let link = archive.by_name("App.app/Lib").unwrap();
        let mode = link.unix_mode().unwrap();
        assert_eq!(mode & 0o170_000, 0o120_000);
    }

    #[test]
    fn zip_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let result = zip_dir(&dir.path().join("nope"), &dir.path().join("nope.zip"));
        assert!(result.is_err());
    }

    // ── Cache ──

    #[test]
    fn appends_cache_paths() {
        let path = Path::new("/w/node_modules");
        assert_eq!(append_cache_path("", path), "/w/node_modules");
        assert_eq!(append_cache_path("/a\n/b\n", path), "/a\n/b\n/w/node_modules");
        assert_eq!(append_cache_path("/w/node_modules", path), "/w/node_modules");
    }

    #[test]
    fn cache_requires_node_modules() {
        let dir = TempDir::new().unwrap();
        let mut recorder = Recorder::default();

        let err = cache_local_deps(dir.path(), &mut recorder).unwrap_err();
        assert!(matches!(err, ExportError::MissingCachePath(_)));
        assert!(recorder.is_empty());
    }

    #[test]
    fn cache_exports_node_modules() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        let mut recorder = Recorder::default();

        cache_local_deps(dir.path(), &mut recorder).unwrap();
        let value = recorder.get(CACHE_INCLUDE_PATHS).unwrap();
        assert!(value.ends_with(&dir.path().join("node_modules").display().to_string()));
    }
}
