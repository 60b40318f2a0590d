//! Command-line interface.
//!
//! The step is normally driven by environment variables set by the CI.
//! Every input also has a flag, and `--config` layers a TOML file
//! underneath both:
//!
//! ```text
//! ionic-archive --platform android --target device --configuration release
//! ionic-archive --config ionic-archive.toml --android-app-type aab
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::{
    config::{Config, StepInputs},
    error::Result,
    export::Envman,
    process::System,
    step,
};

/// Build an Ionic/Cordova project and export its artifacts.
#[derive(Debug, Parser)]
#[command(name = "ionic-archive", version)]
pub struct Cli {
    /// TOML file with input defaults. Flags and environment variables win.
    #[arg(long, env = "IONIC_ARCHIVE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub inputs: StepInputs,
}

impl Cli {
    /// Merge flags, environment and the optional config file.
    pub fn resolve(self) -> Result<Config> {
        let inputs = match &self.config {
            Some(path) => {
                info!("loading config from {}", path.display());
                self.inputs.or(StepInputs::load(path)?)
            }
            None => self.inputs,
        };
        Ok(Config::from_inputs(inputs)?)
    }
}

/// Parse the command line and run the step.
pub fn run() -> Result<()> {
    let config = Cli::parse().resolve()?;
    info!(
        platforms = ?config.platforms,
        configuration = %config.configuration,
        target = %config.target,
        "configuration"
    );
    step::run(&config, &mut System, &mut Envman)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use clap::CommandFactory;
    use tempfile::TempDir;

    use crate::{
        config::{ConfigError, Platform},
        ionic::AndroidPackageType,
    };

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "ionic-archive",
            "--platform",
            "android",
            "--configuration",
            "debug",
            "--target",
            "emulator",
            "--options",
            "--prod --aot",
            "--add-platform",
            "false",
            "--android-app-type",
            "aab",
            "--deploy-dir",
            "/tmp/deploy",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();
        assert_eq!(config.platforms, [Platform::Android]);
        assert_eq!(config.configuration, "debug");
        assert_eq!(config.options, ["--prod", "--aot"]);
        assert!(!config.add_platform);
        assert_eq!(config.android_package_type, AndroidPackageType::Aab);
    }

    #[test]
    fn empty_values_resolve_to_defaults() {
        let cli = Cli::try_parse_from([
            "ionic-archive",
            "--configuration",
            "release",
            "--target",
            "device",
            "--ionic-version",
            "",
            "--add-platform",
            "",
            "--readd-platform",
            "",
            "--android-app-type",
            "",
            "--cache-local-deps",
            "",
            "--deploy-dir",
            "/tmp/deploy",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();
        assert_eq!(config.ionic_version, None);
        assert!(config.add_platform);
        assert!(!config.readd_platform);
        assert!(!config.cache_local_deps);
        assert_eq!(config.android_package_type, AndroidPackageType::Apk);
    }

    #[test]
    fn empty_configuration_flag_is_missing() {
        let cli = Cli::try_parse_from([
            "ionic-archive",
            "--configuration",
            "",
            "--target",
            "device",
            "--deploy-dir",
            "/tmp/deploy",
        ])
        .unwrap();

        assert!(matches!(
            cli.resolve(),
            Err(crate::error::Error::Config(ConfigError::Missing("configuration")))
        ));
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ionic-archive.toml");
        fs::write(
            &path,
            "platform = \"ios\"\nconfiguration = \"release\"\ntarget = \"device\"\ndeploy-dir = \"/tmp/deploy\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "ionic-archive",
            "--config",
            path.to_str().unwrap(),
            "--target",
            "emulator",
        ])
        .unwrap();

        let config = cli.resolve().unwrap();
        assert_eq!(config.platforms, [Platform::Ios]);
        assert_eq!(config.configuration, "release");
        assert_eq!(config.target, "emulator");
    }
}
