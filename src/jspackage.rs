//! JavaScript package manager selection and install command assembly.
//!
//! Pinning a global CLI tool is expressed as an ordered list of
//! [`InstallStep`]s. Each step says whether its failure may be ignored,
//! so the runner never needs to know why a step exists.

use std::{io, path::Path};

use tracing::{info, warn};

use crate::process::{self, Cmd, Runner};

/// The two package names the Ionic CLI has been published under.
pub const IONIC_LEGACY_PACKAGE: &str = "ionic";
pub const IONIC_SCOPED_PACKAGE: &str = "@ionic/cli";

/// Errors from building install sequences.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsPackageError {
    #[error("dependency name unspecified")]
    UnspecifiedDependency,
}

/// Errors from running install sequences.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error(transparent)]
    Sequence(#[from] JsPackageError),

    #[error(transparent)]
    Command(#[from] process::CommandError),
}

/// A JavaScript package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Npm,
    Yarn,
}

impl PackageManager {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Yarn => "yarn",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an operation targets the project or the machine-wide package set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Add,
    Remove,
}

/// One package manager invocation within a pin sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallStep {
    pub command: Cmd,
    pub ignore_failure: bool,
}

/// Detect the package manager used in `dir`.
///
/// Yarn iff `dir/yarn.lock` exists. A failed existence check falls back to npm
/// and hands the error back for the caller to report.
pub fn detect_manager(dir: &Path) -> (PackageManager, Option<io::Error>) {
    match dir.join("yarn.lock").try_exists() {
        Ok(true) => (PackageManager::Yarn, None),
        Ok(false) => (PackageManager::Npm, None),
        Err(e) => (PackageManager::Npm, Some(e)),
    }
}

/// Command adding packages in the given scope.
pub fn add_command(manager: PackageManager, scope: CommandScope, packages: &[&str]) -> Cmd {
    manager_command(manager, Verb::Add, scope, packages)
}

/// Build the ordered steps that pin `dependency@version` as a global tool.
///
/// 1. Remove any project-local copy (yarn errors if there is none, so
///    that failure is ignorable under yarn).
/// 2. Yarn only, for the Ionic CLI: remove the other package name globally.
///    Yarn does not relink a binary that another package already linked.
/// 3. Add the pinned version globally. This is the step that must succeed.
pub fn install_global_dependency(
    manager: PackageManager,
    dependency: &str,
    version: &str,
) -> Result<Vec<InstallStep>, JsPackageError> {
    if dependency.is_empty() {
        return Err(JsPackageError::UnspecifiedDependency);
    }

    let yarn = manager == PackageManager::Yarn;
    let mut steps = vec![InstallStep {
        command: pin_command(manager, Verb::Remove, CommandScope::Local, dependency),
        ignore_failure: yarn,
    }];

    if yarn && let Some(other) = other_ionic_alias(dependency) {
        steps.push(InstallStep {
            command: pin_command(manager, Verb::Remove, CommandScope::Global, other),
            ignore_failure: true,
        });
    }

    steps.push(InstallStep {
        command: pin_command(
            manager,
            Verb::Add,
            CommandScope::Global,
            &format!("{dependency}@{version}"),
        ),
        ignore_failure: false,
    });

    Ok(steps)
}

/// Run steps in order, capturing output.
///
/// Stops at the first failure that is not marked ignorable.
pub fn run_install_steps(
    runner: &mut dyn Runner,
    steps: &[InstallStep],
) -> Result<(), process::CommandError> {
    for step in steps {
        info!("$ {}", step.command.printable());
        match runner.run_captured(&step.command, None) {
            Ok(_) => {}
            Err(e) if step.ignore_failure => warn!("ignoring failure: {e}"),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Pin `dependency@version` globally with the given manager.
pub fn install_global(
    runner: &mut dyn Runner,
    manager: PackageManager,
    dependency: &str,
    version: &str,
) -> Result<(), InstallError> {
    let steps = install_global_dependency(manager, dependency, version)?;
    run_install_steps(runner, &steps)?;
    Ok(())
}

fn other_ionic_alias(dependency: &str) -> Option<&'static str> {
    match dependency {
        IONIC_LEGACY_PACKAGE => Some(IONIC_SCOPED_PACKAGE),
        IONIC_SCOPED_PACKAGE => Some(IONIC_LEGACY_PACKAGE),
        _ => None,
    }
}

/// Commands used for pinning. npm needs `--force` to replace a binary that
/// a differently named package already linked.
fn pin_command(manager: PackageManager, verb: Verb, scope: CommandScope, package: &str) -> Cmd {
    let cmd = manager_command(manager, verb, scope, &[package]);
    match manager {
        PackageManager::Npm => cmd.arg("--force"),
        PackageManager::Yarn => cmd,
    }
}

fn manager_command(
    manager: PackageManager,
    verb: Verb,
    scope: CommandScope,
    packages: &[&str],
) -> Cmd {
    match manager {
        PackageManager::Npm => {
            let verb = match verb {
                Verb::Add => "install",
                Verb::Remove => "remove",
            };
            let mut cmd = Cmd::new("npm").arg(verb);
            if scope == CommandScope::Global {
                cmd = cmd.arg("-g");
            }
            cmd.args(packages.iter().copied())
        }
        PackageManager::Yarn => {
            let mut cmd = Cmd::new("yarn");
            if scope == CommandScope::Global {
                cmd = cmd.arg("global");
            }
            let verb = match verb {
                Verb::Add => "add",
                Verb::Remove => "remove",
            };
            cmd.arg(verb).args(packages.iter().copied())
        }
    }
}
