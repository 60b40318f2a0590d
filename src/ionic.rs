//! Ionic CLI invocations.
//!
//! [`IonicCommand`] turns a build configuration into argv for the
//! platform, prepare and build subcommands. The shape depends on the CLI
//! generation: from major 3 on, Cordova commands live under `ionic cordova`,
//! and each generation has its own way of switching prompts off.

use clap::ValueEnum;
use serde::Deserialize;

use crate::{
    jspackage::{IONIC_LEGACY_PACKAGE, IONIC_SCOPED_PACKAGE},
    process::Cmd,
    version::{self, ParseError},
};

/// First CLI major published as `@ionic/cli` instead of `ionic`.
const SCOPED_PACKAGE_MAJOR: u64 = 6;

/// Token separating passthrough arguments for the wrapped tools.
const PASSTHROUGH: &str = "--";

/// CLIs matching this need the Cordova and Angular plugins installed locally.
pub const LEGACY_PLUGINS_CONSTRAINT: &str = "< 3.8.0";

pub const LEGACY_PLUGINS: [&str; 2] = [
    "@ionic/cli-plugin-ionic-angular@latest",
    "@ionic/cli-plugin-cordova@latest",
];

/// Pick the installable package for a tool alias at a version spec.
///
/// Only the Ionic CLI was renamed; any other alias resolves to itself.
/// `latest` and unparsable specs resolve to the scoped name; a parse
/// failure is returned alongside so the caller can decide how loud to be.
pub fn resolve_package_name(alias: &str, version_spec: &str) -> (String, Option<ParseError>) {
    if alias != IONIC_LEGACY_PACKAGE && alias != IONIC_SCOPED_PACKAGE {
        return (alias.to_string(), None);
    }
    if version_spec == "latest" {
        return (IONIC_SCOPED_PACKAGE.to_string(), None);
    }
    match version::major_version(version_spec) {
        Ok(major) if major < SCOPED_PACKAGE_MAJOR => (IONIC_LEGACY_PACKAGE.to_string(), None),
        Ok(_) => (IONIC_SCOPED_PACKAGE.to_string(), None),
        Err(e) => (IONIC_SCOPED_PACKAGE.to_string(), Some(e)),
    }
}

/// Android packaging selected through `--packageType`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AndroidPackageType {
    #[default]
    Apk,
    Aab,
}

impl AndroidPackageType {
    pub fn flag(self) -> &'static str {
        match self {
            Self::Apk => "--packageType=apk",
            Self::Aab => "--packageType=bundle",
        }
    }

    /// File extension of the produced package.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Apk => "apk",
            Self::Aab => "aab",
        }
    }
}

/// Prompt-suppression flags for CLI generations starting at `min_major`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InteractivityRule {
    pub min_major: u64,
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Prompt-suppression flags keyed by CLI major version.
///
/// The rule with the highest `min_major` not above the detected major wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct InteractivityTable {
    rules: Vec<InteractivityRule>,
}

impl InteractivityTable {
    pub fn new(rules: Vec<InteractivityRule>) -> Self {
        Self { rules }
    }

    pub fn flags_for(&self, major: u64) -> &[String] {
        self.rules
            .iter()
            .filter(|rule| rule.min_major <= major)
            .max_by_key(|rule| rule.min_major)
            .map(|rule| rule.flags.as_slice())
            .unwrap_or_default()
    }
}

impl Default for InteractivityTable {
    fn default() -> Self {
        let rule = |min_major, flags: &[&str]| InteractivityRule {
            min_major,
            flags: flags.iter().map(ToString::to_string).collect(),
        };
        Self::new(vec![
            rule(0, &[]),
            rule(3, &["--no-interactive"]),
            rule(6, &["--no-interactive", "--confirm"]),
        ])
    }
}

/// `platform` subcommand verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformVerb {
    Add,
    Remove,
}

impl PlatformVerb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "rm",
        }
    }
}

/// Argv builder for Ionic CLI commands.
///
/// Pure: produces [`Cmd`] values and never runs anything.
#[derive(Debug, Clone, Default)]
pub struct IonicCommand {
    major: u64,
    interactivity: InteractivityTable,
    platforms: Vec<String>,
    configuration: String,
    target: String,
    build_config: String,
    custom_options: Vec<String>,
    package_type: Option<AndroidPackageType>,
}

impl IonicCommand {
    pub fn new(major: u64) -> Self {
        Self {
            major,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn interactivity(mut self, table: InteractivityTable) -> Self {
        self.interactivity = table;
        self
    }

    #[must_use]
    pub fn platforms<I, S>(mut self, platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.platforms = platforms.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn configuration(mut self, configuration: impl Into<String>) -> Self {
        self.configuration = configuration.into();
        self
    }

    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    #[must_use]
    pub fn build_config(mut self, path: impl Into<String>) -> Self {
        self.build_config = path.into();
        self
    }

    #[must_use]
    pub fn custom_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Packaging for Android builds. Ignored unless `android` is a platform.
    #[must_use]
    pub fn package_type(mut self, package_type: Option<AndroidPackageType>) -> Self {
        self.package_type = package_type;
        self
    }

    /// `ionic [cordova] [flags] platform add|rm <platforms...>`
    pub fn platform_command(&self, verb: PlatformVerb) -> Cmd {
        self.prefix()
            .args(["platform", verb.as_str()])
            .args(self.platforms.iter().cloned())
    }

    /// `ionic [cordova] [flags] prepare --no-build`
    pub fn prepare_command(&self) -> Cmd {
        self.prefix().args(["prepare", "--no-build"])
    }

    /// `ionic [cordova] [flags] build [--<configuration>] [--<target>] <platforms...>
    /// [--buildConfig <path>] [options...] [-- -- --packageType=...]`
    pub fn build_command(&self) -> Cmd {
        let mut cmd = self.prefix().arg("build");

        if !self.configuration.is_empty() {
            cmd = cmd.arg(format!("--{}", self.configuration));
        }
        if !self.target.is_empty() {
            cmd = cmd.arg(format!("--{}", self.target));
        }

        cmd = cmd.args(self.platforms.iter().cloned());

        if !self.build_config.is_empty() {
            cmd = cmd.args(["--buildConfig", self.build_config.as_str()]);
        }

        cmd = cmd.args(self.custom_options.iter().cloned());

        if let Some(package_type) = self.package_type
            && self.platforms.iter().any(|p| p == "android")
        {
            // Reuse a passthrough group the caller already opened.
            if !self.custom_options.iter().any(|o| o == PASSTHROUGH) {
                cmd = cmd.args([PASSTHROUGH, PASSTHROUGH]);
            }
            cmd = cmd.arg(package_type.flag());
        }

        cmd
    }

    fn prefix(&self) -> Cmd {
        let mut cmd = Cmd::new("ionic");
        if self.major > 2 {
            cmd = cmd.arg("cordova");
        }
        cmd.args(self.interactivity.flags_for(self.major).iter().cloned())
    }
}

/// `ionic login <username> <password>`, credentials masked in logs.
pub fn login_command(username: &str, password: &str) -> Cmd {
    Cmd::new("ionic")
        .arg("login")
        .secret_arg(username)
        .secret_arg(password)
}

/// `ionic -v`
pub fn version_command() -> Cmd {
    Cmd::new("ionic").arg("-v")
}

/// `cordova -v`
pub fn cordova_version_command() -> Cmd {
    Cmd::new("cordova").arg("-v")
}
