//! Step configuration.
//!
//! Every input resolves through a chain:
//!
//! 1. command-line flag
//! 2. environment variable (the names the CI passes step inputs under)
//! 3. optional TOML file given with `--config`
//! 4. built-in default
//!
//! The merged inputs are validated into a [`Config`] before any external
//! command runs.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::{Args, ValueEnum};
use serde::{Deserialize, Deserializer};

use crate::ionic::{AndroidPackageType, InteractivityTable};

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("unknown platform {0:?}, expected ios or android")]
    UnknownPlatform(String),

    #[error("invalid {input}: {value:?}")]
    Invalid { input: &'static str, value: String },

    #[error("failed to split options ({options}): {source}")]
    Options {
        options: String,
        #[source]
        source: shell_words::ParseError,
    },

    #[error("failed to resolve {}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = core::result::Result<T, ConfigError>;

/// A build target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Android,
    Ios,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Android => "android",
            Self::Ios => "ios",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "android" => Ok(Self::Android),
            "ios" => Ok(Self::Ios),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Raw step inputs, as flags/env vars or as a TOML file.
///
/// Every field is optional so the two sources can be layered. Booleans and
/// the package type stay strings until validation: the CI passes unset
/// inputs as empty variables, which must mean "default", not "invalid".
#[derive(Debug, Clone, Default, Args, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct StepInputs {
    /// Platforms to build, comma separated (`ios`, `android`).
    #[arg(long, env = "platform")]
    pub platform: Option<String>,

    /// Build configuration, passed as `--<configuration>` (e.g. `release`).
    #[arg(long, env = "configuration")]
    pub configuration: Option<String>,

    /// Build target, passed as `--<target>` (`device` or `emulator`).
    #[arg(long, env = "target")]
    pub target: Option<String>,

    /// Path to a Cordova `build.json`.
    #[arg(long, env = "build_config")]
    pub build_config: Option<String>,

    /// Extra options for the build command, split with shell quoting rules.
    #[arg(long, env = "options", allow_hyphen_values = true)]
    pub options: Option<String>,

    #[arg(long, env = "ionic_username")]
    pub ionic_username: Option<String>,

    #[arg(long, env = "ionic_password", hide_env_values = true)]
    pub ionic_password: Option<String>,

    /// Run `platform add` before building. Otherwise `prepare` is run.
    #[arg(long, env = "add_platform", value_name = "BOOL")]
    #[serde(deserialize_with = "bool_input")]
    pub add_platform: Option<String>,

    /// Remove platforms before adding them again.
    #[arg(long, env = "readd_platform", value_name = "BOOL")]
    #[serde(deserialize_with = "bool_input")]
    pub readd_platform: Option<String>,

    /// Ionic CLI version to install globally.
    #[arg(long, env = "ionic_version")]
    pub ionic_version: Option<String>,

    /// Cordova version to install globally.
    #[arg(long, env = "cordova_version")]
    pub cordova_version: Option<String>,

    /// cordova-ios version for `platform add` (`master` for the git head).
    #[arg(long, env = "cordova_ios_version")]
    pub cordova_ios_version: Option<String>,

    /// cordova-android version for `platform add` (`master` for the git head).
    #[arg(long, env = "cordova_android_version")]
    pub cordova_android_version: Option<String>,

    /// Android package format (`apk` or `aab`).
    #[arg(long, env = "android_app_type")]
    pub android_app_type: Option<String>,

    /// Mark `node_modules` for the CI cache after a successful build.
    #[arg(long, env = "cache_local_deps", value_name = "BOOL")]
    #[serde(deserialize_with = "bool_input")]
    pub cache_local_deps: Option<String>,

    /// Project directory containing `config.xml`.
    #[arg(long, env = "workdir")]
    pub workdir: Option<PathBuf>,

    /// Directory exported artifacts are copied to.
    #[arg(long, env = "BITRISE_DEPLOY_DIR")]
    pub deploy_dir: Option<PathBuf>,

    /// Prompt-suppression flags per CLI generation. File only.
    #[arg(skip)]
    pub interactive_flags: Option<InteractivityTable>,
}

impl StepInputs {
    /// Load inputs from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fill unset (or empty) fields from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            platform: or_non_empty(self.platform, fallback.platform),
            configuration: or_non_empty(self.configuration, fallback.configuration),
            target: or_non_empty(self.target, fallback.target),
            build_config: or_non_empty(self.build_config, fallback.build_config),
            options: or_non_empty(self.options, fallback.options),
            ionic_username: or_non_empty(self.ionic_username, fallback.ionic_username),
            ionic_password: or_non_empty(self.ionic_password, fallback.ionic_password),
            add_platform: or_non_empty(self.add_platform, fallback.add_platform),
            readd_platform: or_non_empty(self.readd_platform, fallback.readd_platform),
            ionic_version: or_non_empty(self.ionic_version, fallback.ionic_version),
            cordova_version: or_non_empty(self.cordova_version, fallback.cordova_version),
            cordova_ios_version: or_non_empty(
                self.cordova_ios_version,
                fallback.cordova_ios_version,
            ),
            cordova_android_version: or_non_empty(
                self.cordova_android_version,
                fallback.cordova_android_version,
            ),
            android_app_type: or_non_empty(self.android_app_type, fallback.android_app_type),
            cache_local_deps: or_non_empty(self.cache_local_deps, fallback.cache_local_deps),
            workdir: self.workdir.filter(|p| !p.as_os_str().is_empty()).or(fallback.workdir),
            deploy_dir: self
                .deploy_dir
                .filter(|p| !p.as_os_str().is_empty())
                .or(fallback.deploy_dir),
            interactive_flags: self.interactive_flags.or(fallback.interactive_flags),
        }
    }
}

fn or_non_empty(value: Option<String>, fallback: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).or(fallback)
}

/// TOML booleans land in the same string slot flags and env vars use.
fn bool_input<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> core::result::Result<Option<String>, D::Error> {
    Ok(Some(bool::deserialize(deserializer)?.to_string()))
}

fn parse_bool(input: &'static str, value: Option<&str>, default: bool) -> Result<bool> {
    match value.map(str::trim) {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            input,
            value: other.to_string(),
        }),
    }
}

fn parse_package_type(value: Option<&str>) -> Result<AndroidPackageType> {
    match value.map(str::trim) {
        None => Ok(AndroidPackageType::default()),
        Some(v) => <AndroidPackageType as ValueEnum>::from_str(v, true).map_err(|_| {
            ConfigError::Invalid {
                input: "android_app_type",
                value: v.to_string(),
            }
        }),
    }
}

/// Ionic account used for `ionic login`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"***")
            .field("password", &"***")
            .finish()
    }
}

/// Validated step configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sorted, deduplicated.
    pub platforms: Vec<Platform>,
    pub configuration: String,
    pub target: String,
    pub build_config: String,
    pub options: Vec<String>,
    pub credentials: Option<Credentials>,
    pub add_platform: bool,
    pub readd_platform: bool,
    pub ionic_version: Option<String>,
    pub cordova_version: Option<String>,
    pub cordova_ios_version: Option<String>,
    pub cordova_android_version: Option<String>,
    pub android_package_type: AndroidPackageType,
    pub cache_local_deps: bool,
    /// Absolute.
    pub workdir: PathBuf,
    /// Absolute.
    pub deploy_dir: PathBuf,
    pub interactivity: InteractivityTable,
}

impl Config {
    /// Validate merged inputs.
    ///
    /// Empty values count as unset, whichever source they came from.
    pub fn from_inputs(inputs: StepInputs) -> Result<Self> {
        let inputs = inputs.or(StepInputs::default());

        let mut platforms = inputs
            .platform
            .as_deref()
            .unwrap_or("ios,android")
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(Platform::from_str)
            .collect::<Result<Vec<_>>>()?;
        platforms.sort();
        platforms.dedup();
        if platforms.is_empty() {
            return Err(ConfigError::Missing("platform"));
        }

        let configuration = inputs
            .configuration
            .ok_or(ConfigError::Missing("configuration"))?;
        let target = inputs.target.ok_or(ConfigError::Missing("target"))?;

        let options = match inputs.options {
            Some(options) => {
                shell_words::split(&options).map_err(|source| ConfigError::Options {
                    options: options.clone(),
                    source,
                })?
            }
            None => Vec::new(),
        };

        let credentials = match (inputs.ionic_username, inputs.ionic_password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let add_platform = parse_bool("add_platform", inputs.add_platform.as_deref(), true)?;
        let readd_platform =
            parse_bool("readd_platform", inputs.readd_platform.as_deref(), false)?;
        let cache_local_deps =
            parse_bool("cache_local_deps", inputs.cache_local_deps.as_deref(), false)?;
        let android_package_type = parse_package_type(inputs.android_app_type.as_deref())?;

        let workdir = absolute(&inputs.workdir.unwrap_or_else(|| PathBuf::from(".")))?;
        let deploy_dir = absolute(&inputs.deploy_dir.ok_or(ConfigError::Missing("deploy_dir"))?)?;

        Ok(Self {
            platforms,
            configuration,
            target,
            build_config: inputs.build_config.unwrap_or_default(),
            options,
            credentials,
            add_platform,
            readd_platform,
            ionic_version: inputs.ionic_version,
            cordova_version: inputs.cordova_version,
            cordova_ios_version: inputs.cordova_ios_version,
            cordova_android_version: inputs.cordova_android_version,
            android_package_type,
            cache_local_deps,
            workdir,
            deploy_dir,
            interactivity: inputs.interactive_flags.unwrap_or_default(),
        })
    }

    /// The version override configured for a platform, if any.
    pub fn platform_version(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Ios => self.cordova_ios_version.as_deref(),
            Platform::Android => self.cordova_android_version.as_deref(),
        }
    }

    /// Argument for `platform add`: `<platform>`, `<platform>@<version>`,
    /// or the git repository for `master`.
    pub fn platform_spec(&self, platform: Platform) -> String {
        match self.platform_version(platform) {
            Some("master") => format!("https://github.com/apache/cordova-{platform}.git"),
            Some(version) => format!("{platform}@{version}"),
            None => platform.to_string(),
        }
    }

    pub fn has_platform(&self, platform: Platform) -> bool {
        self.platforms.contains(&platform)
    }
}

/// Expand a leading `~` and make the path absolute.
fn absolute(path: &Path) -> Result<PathBuf> {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    std::path::absolute(&expanded).map_err(|source| ConfigError::Path {
        path: path.to_path_buf(),
        source,
    })
}
