//! Copying located artifacts into the deploy directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::warn;

use super::{ArtifactError, Result};

/// Where artifacts ended up in the deploy directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    /// The last artifact copied. Usually the only one.
    pub primary: PathBuf,
    /// Every copied artifact, in input order.
    pub all: Vec<PathBuf>,
}

/// Copy each artifact into `deploy_dir` under its base name.
///
/// A symlinked artifact is resolved exactly one level: the link target
/// must exist and must not itself be a symlink. Returns `None` when
/// `paths` is empty.
pub fn move_and_export(paths: &[PathBuf], deploy_dir: &Path) -> Result<Option<Exported>> {
    if paths.is_empty() {
        return Ok(None);
    }

    fs::create_dir_all(deploy_dir).map_err(ArtifactError::io(deploy_dir))?;

    let mut all = Vec::with_capacity(paths.len());
    for path in paths {
        let source = resolve_one_level(path)?;
        let Some(name) = source.file_name() else {
            return Err(ArtifactError::MissingTarget(source));
        };
        let destination = deploy_dir.join(name);

        let metadata = fs::metadata(&source).map_err(ArtifactError::io(&source))?;
        if metadata.is_dir() {
            copy_dir(&source, &destination)?;
        } else {
            fs::copy(&source, &destination).map_err(ArtifactError::io(&source))?;
        }
        all.push(destination);
    }

    let primary = all.last().cloned().unwrap_or_default();
    Ok(Some(Exported { primary, all }))
}

/// Resolve `path` if it is a symlink. Relative link targets are taken
/// relative to the link's directory.
fn resolve_one_level(path: &Path) -> Result<PathBuf> {
    let metadata = fs::symlink_metadata(path).map_err(ArtifactError::io(path))?;
    if !metadata.is_symlink() {
        return Ok(path.to_path_buf());
    }

    let link = fs::read_link(path).map_err(ArtifactError::io(path))?;
    let resolved = match path.parent() {
        Some(parent) if link.is_relative() => parent.join(link),
        _ => link,
    };
    warn!(
        "output {} is a symlink to {}",
        path.display(),
        resolved.display()
    );

    let resolved_metadata = match fs::symlink_metadata(&resolved) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ArtifactError::MissingTarget(resolved));
        }
        Err(e) => return Err(ArtifactError::Io { path: resolved, source: e }),
    };
    if resolved_metadata.is_symlink() {
        return Err(ArtifactError::NestedSymlink(resolved));
    }
    Ok(resolved)
}

/// Recursively copy a directory tree. Symlinks inside it are recreated,
/// not followed, so framework bundles keep their structure.
fn copy_dir(source: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination).map_err(ArtifactError::io(destination))?;

    let entries = fs::read_dir(source).map_err(ArtifactError::io(source))?;
    for entry in entries {
        let entry = entry.map_err(ArtifactError::io(source))?;
        let from = entry.path();
        let to = destination.join(entry.file_name());
        let file_type = entry.file_type().map_err(ArtifactError::io(&from))?;

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(ArtifactError::io(&from))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let link = fs::read_link(from).map_err(ArtifactError::io(from))?;
    if fs::symlink_metadata(to).is_ok() {
        fs::remove_file(to).map_err(ArtifactError::io(to))?;
    }
    std::os::unix::fs::symlink(link, to).map_err(ArtifactError::io(to))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        copy_dir(from, to)
    } else {
        fs::copy(from, to).map(|_| ()).map_err(ArtifactError::io(from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::os::unix::fs::symlink;

    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let outputs = dir.path().join("outputs");
        let deploy = dir.path().join("deploy");
        fs::create_dir(&outputs).unwrap();
        (dir, outputs, deploy)
    }

    #[test]
    fn empty_input_exports_nothing() {
        let (_dir, _outputs, deploy) = setup();
        assert_eq!(move_and_export(&[], &deploy).unwrap(), None);
        assert!(!deploy.exists());
    }

    #[test]
    fn last_copied_is_primary() {
        let (_dir, outputs, deploy) = setup();
        fs::write(outputs.join("app-arm64.apk"), "arm").unwrap();
        fs::write(outputs.join("app-x86.apk"), "x86").unwrap();

        let exported = move_and_export(
            &[outputs.join("app-arm64.apk"), outputs.join("app-x86.apk")],
            &deploy,
        )
        .unwrap()
        .unwrap();

        assert_eq!(exported.primary, deploy.join("app-x86.apk"));
        assert_eq!(
            exported.all,
            [deploy.join("app-arm64.apk"), deploy.join("app-x86.apk")]
        );
        assert_eq!(fs::read_to_string(deploy.join("app-arm64.apk")).unwrap(), "arm");
    }

    #[test]
    fn copies_bundle_directories() {
        let (_dir, outputs, deploy) = setup();
        let app = outputs.join("App.app");
        fs::create_dir_all(app.join("Frameworks/Lib.framework/Versions/A")).unwrap();
        fs::write(app.join("Info.plist"), "plist").unwrap();
        fs::write(app.join("Frameworks/Lib.framework/Versions/A/Lib"), "bin").unwrap();
        symlink("Versions/A/Lib", app.join("Frameworks/Lib.framework/Lib")).unwrap();

        let exported = move_and_export(&[app], &deploy).unwrap().unwrap();

        let copied = deploy.join("App.app");
        assert_eq!(exported.primary, copied);
        assert_eq!(fs::read_to_string(copied.join("Info.plist")).unwrap(), "plist");
        let link = copied.join("Frameworks/Lib.framework/Lib");
        assert!(fs::symlink_metadata(&link).unwrap().is_symlink());
        assert_eq!(fs::read_to_string(link).unwrap(), "bin");
    }

    #[test]
    fn resolves_one_symlink_level() {
        let (_dir, outputs, deploy) = setup();
        fs::write(outputs.join("real.ipa"), "ipa").unwrap();
        symlink("real.ipa", outputs.join("link.ipa")).unwrap();

        let exported = move_and_export(&[outputs.join("link.ipa")], &deploy)
            .unwrap()
            .unwrap();

        // Deployed under the resolved name.
        assert_eq!(exported.primary, deploy.join("real.ipa"));
        assert_eq!(fs::read_to_string(deploy.join("real.ipa")).unwrap(), "ipa");
    }

    #[test]
    fn symlink_chain_is_rejected() {
        let (_dir, outputs, deploy) = setup();
        fs::write(outputs.join("real.ipa"), "ipa").unwrap();
        symlink("real.ipa", outputs.join("middle.ipa")).unwrap();
        symlink("middle.ipa", outputs.join("link.ipa")).unwrap();

        let err = move_and_export(&[outputs.join("link.ipa")], &deploy).unwrap_err();
        assert!(matches!(err, ArtifactError::NestedSymlink(p) if p == outputs.join("middle.ipa")));
    }

    #[test]
    fn dangling_symlink_is_rejected() {
        let (_dir, outputs, deploy) = setup();
        symlink("gone.apk", outputs.join("link.apk")).unwrap();

        let err = move_and_export(&[outputs.join("link.apk")], &deploy).unwrap_err();
        assert!(matches!(err, ArtifactError::MissingTarget(_)));
    }

    #[test]
    fn missing_artifact_is_an_error() {
        let (_dir, outputs, deploy) = setup();
        let err = move_and_export(&[outputs.join("nope.apk")], &deploy).unwrap_err();
        assert!(matches!(err, ArtifactError::Io { .. }));
    }
}
