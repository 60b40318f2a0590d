//! The build step: pin tools, prepare platforms, build, collect outputs.
//!
//! ```text
//! pin cordova/ionic ─► read versions ─► plugins (< 3.8) ─► login
//!        ─► platform rm/add | prepare ─► build per platform
//!        ─► collect + export outputs ─► verify ─► cache
//! ```

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use jiff::Timestamp;
use tracing::{error, info, warn};

use crate::{
    artifact::{self, ArtifactError, Exported},
    config::{Config, Platform},
    error::{Error, Result},
    export::{self, EnvExporter, ExportError},
    ionic::{self, AndroidPackageType, IonicCommand, PlatformVerb},
    jspackage::{self, CommandScope, PackageManager},
    process::{Cmd, Runner},
    version::{self, SemanticVersion},
};

/// Changes into a directory and restores the previous one on drop.
pub struct WorkdirGuard {
    previous: Option<PathBuf>,
}

impl WorkdirGuard {
    pub fn enter(dir: &Path) -> Result<Self> {
        let workdir_err = |source: io::Error| Error::Workdir {
            path: dir.to_path_buf(),
            source,
        };
        let current = env::current_dir().map_err(workdir_err)?;
        if current == dir {
            return Ok(Self { previous: None });
        }

        info!("switching working directory to {}", dir.display());
        env::set_current_dir(dir).map_err(workdir_err)?;
        Ok(Self {
            previous: Some(current),
        })
    }
}

impl Drop for WorkdirGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take()
            && let Err(e) = env::set_current_dir(&previous)
        {
            error!(
                "failed to restore working directory {}: {e}",
                previous.display()
            );
        }
    }
}

/// Deployed outputs of one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Outputs {
    pub ipas: Vec<PathBuf>,
    pub dsyms: Vec<PathBuf>,
    pub apps: Vec<PathBuf>,
    /// APKs or AABs, depending on the configured package type.
    pub android: Vec<PathBuf>,
}

/// Answer for the confirmation prompts platform and build commands may raise.
const CONFIRM: &str = "y";

/// Run the whole step.
///
/// Every external tool goes through `runner`; exported values go to `exporter`.
pub fn run(
    config: &Config,
    runner: &mut dyn Runner,
    exporter: &mut dyn EnvExporter,
) -> Result<()> {
    let _workdir = WorkdirGuard::enter(&config.workdir)?;

    let (manager, detect_err) = jspackage::detect_manager(&config.workdir);
    if let Some(e) = detect_err {
        warn!("failed to check for yarn.lock, falling back to npm: {e}");
    }
    info!("js package manager: {manager}");

    pin_tools(config, runner, manager)?;

    let cordova_version =
        tool_version(runner, "cordova", &ionic::cordova_version_command(), None)?;
    info!("cordova version: {cordova_version}");
    // Newer CLIs ask about telemetry on first run.
    let ionic_version = tool_version(runner, "ionic", &ionic::version_command(), Some("Y"))?;
    info!("ionic version: {ionic_version}");

    if ionic_version.satisfies(ionic::LEGACY_PLUGINS_CONSTRAINT)? {
        info!("installing cordova and angular plugins");
        let cmd = jspackage::add_command(manager, CommandScope::Local, &ionic::LEGACY_PLUGINS);
        info!("$ {}", cmd.printable());
        runner.run_captured(&cmd, None)?;
    }

    if let Some(credentials) = &config.credentials {
        info!("ionic login");
        let cmd = ionic::login_command(&credentials.username, &credentials.password);
        info!("$ {}", cmd.printable());
        runner.run_streaming(&cmd, Some(CONFIRM))?;
    }

    let builder = IonicCommand::new(ionic_version.major())
        .interactivity(config.interactivity.clone())
        .configuration(config.configuration.as_str())
        .target(config.target.as_str())
        .build_config(config.build_config.as_str())
        .custom_options(config.options.iter().cloned());

    prepare_platforms(config, runner, &builder)?;

    let build_start = Timestamp::now();
    for &platform in &config.platforms {
        info!("building {platform}");
        let package_type =
            (platform == Platform::Android).then_some(config.android_package_type);
        run_logged(
            runner,
            &builder
                .clone()
                .platforms([platform.as_str()])
                .package_type(package_type)
                .build_command(),
        )?;
    }

    let mut outputs = collect_ios_outputs(config, &cordova_version, build_start, exporter)?;
    outputs.android = collect_android_outputs(config, build_start, exporter)?;
    verify_outputs(config, &outputs)?;
    info!(
        ipa = outputs.ipas.len(),
        dsym = outputs.dsyms.len(),
        app = outputs.apps.len(),
        android = outputs.android.len(),
        "outputs exported"
    );

    if config.cache_local_deps {
        match export::cache_local_deps(&config.workdir, exporter) {
            Ok(()) => info!("local dependencies marked for caching"),
            Err(e @ ExportError::MissingCachePath(_)) => warn!("{e}"),
            Err(e) => warn!("failed to mark local dependencies for caching: {e}"),
        }
    }

    Ok(())
}

fn pin_tools(config: &Config, runner: &mut dyn Runner, manager: PackageManager) -> Result<()> {
    if let Some(version) = &config.cordova_version {
        info!("updating cordova to {version}");
        jspackage::install_global(runner, manager, "cordova", version).map_err(|source| {
            Error::Install {
                package: "cordova".to_string(),
                source,
            }
        })?;
    }

    if let Some(version) = &config.ionic_version {
        let (package, resolve_err) =
            ionic::resolve_package_name(jspackage::IONIC_LEGACY_PACKAGE, version);
        if let Some(e) = resolve_err {
            warn!("{e}, installing {package}");
        }
        info!("updating ionic to {version}");
        jspackage::install_global(runner, manager, &package, version)
            .map_err(|source| Error::Install { package, source })?;
    }

    Ok(())
}

fn tool_version(
    runner: &mut dyn Runner,
    tool: &'static str,
    cmd: &Cmd,
    stdin: Option<&str>,
) -> Result<SemanticVersion> {
    let output = runner.run_captured(cmd, stdin)?;
    version::parse_tool_output(&output).map_err(|source| Error::ToolVersion { tool, source })
}

fn prepare_platforms(
    config: &Config,
    runner: &mut dyn Runner,
    builder: &IonicCommand,
) -> Result<()> {
    if !config.add_platform {
        info!("preparing project");
        return run_logged(runner, &builder.prepare_command());
    }

    if config.readd_platform {
        for &platform in &config.platforms {
            info!("removing {platform}");
            run_logged(
                runner,
                &builder
                    .clone()
                    .platforms([platform.as_str()])
                    .platform_command(PlatformVerb::Remove),
            )?;
        }
    }

    for &platform in &config.platforms {
        info!("adding {platform}");
        run_logged(
            runner,
            &builder
                .clone()
                .platforms([config.platform_spec(platform)])
                .platform_command(PlatformVerb::Add),
        )?;
    }
    Ok(())
}

fn run_logged(runner: &mut dyn Runner, cmd: &Cmd) -> Result<()> {
    info!("$ {}", cmd.printable());
    runner.run_streaming(cmd, Some(CONFIRM))?;
    Ok(())
}

// ── Outputs ──

/// Collect and export iOS outputs, if an iOS build directory exists.
pub fn collect_ios_outputs(
    config: &Config,
    cordova: &SemanticVersion,
    build_start: Timestamp,
    exporter: &mut dyn EnvExporter,
) -> Result<Outputs> {
    let mut outputs = Outputs::default();
    let Some(dir) = artifact::ios_output_dir(
        &config.workdir,
        &config.target,
        &config.configuration,
        cordova,
    ) else {
        return Ok(outputs);
    };
    info!("collecting iOS outputs from {}", dir.display());
    let ios_err = |source: ArtifactError| Error::Artifact { kind: "iOS", source };

    let ipas = artifact::find_artifacts(&dir, "ipa", build_start).map_err(ios_err)?;
    if let Some(exported) = artifact::move_and_export(&ipas, &config.deploy_dir).map_err(ios_err)? {
        exporter.export(export::IPA_PATH, &path_str(&exported.primary))?;
        info!("ipa: {}", exported.primary.display());
        outputs.ipas = exported.all;
    }

    let dsyms = artifact::find_artifacts(&dir, "dSYM", build_start).map_err(ios_err)?;
    if let Some(exported) = artifact::move_and_export(&dsyms, &config.deploy_dir).map_err(ios_err)? {
        exporter.export(export::DSYM_DIR_PATH, &path_str(&exported.primary))?;
        let zip = zip_path(&exported.primary);
        export::zip_dir(&exported.primary, &zip)?;
        exporter.export(export::DSYM_ZIP_PATH, &path_str(&zip))?;
        info!("dSYM: {}", zip.display());
        outputs.dsyms = exported.all;
    }

    let apps = artifact::find_artifacts(&dir, "app", build_start).map_err(ios_err)?;
    match artifact::move_and_export(&apps, &config.deploy_dir) {
        Ok(Some(exported)) => {
            export_app(&exported, exporter)?;
            outputs.apps = exported.all;
        }
        Ok(None) => {}
        Err(e) => warn!("failed to copy app: {e}"),
    }

    Ok(outputs)
}

/// Export a deployed `.app` and its zip. A failed zip fails the step.
fn export_app(exported: &Exported, exporter: &mut dyn EnvExporter) -> Result<()> {
    exporter.export(export::APP_DIR_PATH, &path_str(&exported.primary))?;
    let zip = zip_path(&exported.primary);
    export::zip_dir(&exported.primary, &zip)?;
    exporter.export(export::APP_ZIP_PATH, &path_str(&zip))?;
    info!("app: {}", zip.display());
    Ok(())
}

/// Collect and export Android packages of the configured type.
pub fn collect_android_outputs(
    config: &Config,
    build_start: Timestamp,
    exporter: &mut dyn EnvExporter,
) -> Result<Vec<PathBuf>> {
    let dir = config.workdir.join("platforms").join("android");
    match fs::metadata(&dir) {
        Ok(m) if m.is_dir() => {}
        Ok(_) => return Ok(Vec::new()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            warn!("failed to check if dir ({}) exists: {e}", dir.display());
            return Ok(Vec::new());
        }
    }
    info!("collecting Android outputs from {}", dir.display());

    let package_type = config.android_package_type;
    let android_err = |source: ArtifactError| Error::Artifact {
        kind: "Android",
        source,
    };
    let packages = artifact::find_artifacts(&dir, package_type.extension(), build_start)
        .map_err(android_err)?;
    let Some(exported) =
        artifact::move_and_export(&packages, &config.deploy_dir).map_err(android_err)?
    else {
        return Ok(Vec::new());
    };

    let (single, list) = match package_type {
        AndroidPackageType::Apk => (export::APK_PATH, export::APK_PATH_LIST),
        AndroidPackageType::Aab => (export::AAB_PATH, export::AAB_PATH_LIST),
    };
    exporter.export(single, &path_str(&exported.primary))?;
    let joined = exported
        .all
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(export::LIST_SEPARATOR);
    exporter.export(list, &joined)?;
    for path in &exported.all {
        info!("{}: {}", package_type.extension(), path.display());
    }

    Ok(exported.all)
}

/// Fail when a requested platform produced nothing installable.
pub fn verify_outputs(config: &Config, outputs: &Outputs) -> Result<()> {
    if config.has_platform(Platform::Android) && outputs.android.is_empty() {
        return Err(Error::NoOutputs(match config.android_package_type {
            AndroidPackageType::Apk => "no apk generated",
            AndroidPackageType::Aab => "no aab generated",
        }));
    }
    if config.has_platform(Platform::Ios) {
        if config.target == "emulator" && outputs.apps.is_empty() {
            return Err(Error::NoOutputs("no app generated"));
        }
        if config.target == "device" && outputs.ipas.is_empty() {
            return Err(Error::NoOutputs("no ipa generated"));
        }
    }
    Ok(())
}

fn zip_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
