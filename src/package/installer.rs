use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ignore::WalkBuilder;

use crate::model::config::PackageSettings;
use crate::package::classify::resolve_path;
use crate::package::error::InstallError;
use crate::package::locate::{self, PayloadSource};
use crate::package::manifest::{self, Manifest};

/// Subdirectory of a configuration directory that Houdini scans for package files.
pub const PACKAGES_DIR: &str = "packages";

/// Everything one installation run needs from the wizard.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Configuration directories, written in this order.
    pub targets: Vec<PathBuf>,
    /// Existing package file to update, if one was found.
    pub package_manifest: Option<PathBuf>,
    /// Where the payload should live. Without it the package file's
    /// directory is used as the install path.
    pub destination: Option<PathBuf>,
    /// Payload root; located automatically when absent.
    pub payload: Option<PathBuf>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Idle,
    LocatingPayload,
    SynthesizingManifest,
    WritingTargets(usize),
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadCopy {
    /// Payload already lives at the install path.
    NotNeeded,
    Copied,
    SkippedDryRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub config_dir: PathBuf,
    pub package_file: PathBuf,
    pub created_packages_dir: bool,
    pub written: bool,
}

#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Install path as embedded in every package file (forward slashes).
    pub install_path: String,
    pub payload_copy: PayloadCopy,
    /// The one package file written to every target.
    pub manifest: Manifest,
    pub targets: Vec<TargetOutcome>,
    pub dry_run: bool,
}

/// Copies the payload and writes the same package file into each target.
///
/// Targets are processed strictly in order and the first failure stops the
/// run: earlier targets stay written, later ones are never touched.
pub struct Installer {
    settings: PackageSettings,
    search_start: PathBuf,
    payload_source: PayloadSource,
    cancel: Arc<AtomicBool>,
    phase: InstallPhase,
}

impl Installer {
    pub fn new(
        settings: PackageSettings,
        search_start: PathBuf,
        payload_source: PayloadSource,
    ) -> Self {
        Self {
            settings,
            search_start,
            payload_source,
            cancel: Arc::new(AtomicBool::new(false)),
            phase: InstallPhase::Idle,
        }
    }

    /// Checked between targets, never during one.
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    pub fn install(&mut self, request: &InstallRequest) -> Result<InstallReport, InstallError> {
        tracing::info!(
            "installing {} to {} configuration(s){}",
            self.settings.name,
            request.targets.len(),
            if request.dry_run { " (dry run)" } else { "" }
        );

        let result = self.run(request);
        self.phase = match &result {
            Ok(_) => InstallPhase::Done,
            Err(err) => {
                tracing::error!("installation failed: {err}");
                InstallPhase::Failed
            }
        };
        result
    }

    fn run(&mut self, request: &InstallRequest) -> Result<InstallReport, InstallError> {
        self.phase = InstallPhase::LocatingPayload;
        let (install_path, payload_copy) = self.resolve_install_path(request)?;
        let install_path = install_path.to_string_lossy().replace('\\', "/");

        self.phase = InstallPhase::SynthesizingManifest;
        let existing = Manifest::load_or_fresh(request.package_manifest.as_deref());
        let manifest = manifest::synthesize(existing, &install_path, &self.settings);
        let contents = manifest.to_pretty_json()?;
        tracing::debug!("package contents: {}", String::from_utf8_lossy(&contents));

        let mut targets = Vec::with_capacity(request.targets.len());
        for (index, config_dir) in request.targets.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                tracing::warn!("installation cancelled before {}", config_dir.display());
                return Err(InstallError::Cancelled { completed: index });
            }
            self.phase = InstallPhase::WritingTargets(index);
            targets.push(self.write_target(config_dir, &contents, request.dry_run)?);
        }

        Ok(InstallReport {
            install_path,
            payload_copy,
            manifest,
            targets,
            dry_run: request.dry_run,
        })
    }

    fn resolve_install_path(
        &self,
        request: &InstallRequest,
    ) -> Result<(PathBuf, PayloadCopy), InstallError> {
        if let Some(destination) = &request.destination {
            let payload = match &request.payload {
                Some(payload) => payload.clone(),
                None => locate::find_payload_path(&self.search_start, &self.payload_source)
                    .ok_or(InstallError::PayloadNotFound)?,
            };

            if same_location(&payload, destination) {
                tracing::info!(
                    "using existing payload location as package install path: {}",
                    payload.display()
                );
                return Ok((destination.clone(), PayloadCopy::NotNeeded));
            }

            tracing::info!(
                "copying payload at {} to install path: {}",
                payload.display(),
                destination.display()
            );
            if request.dry_run {
                check_not_nested(&payload, destination)?;
                tracing::info!("dry run: payload copy skipped");
                return Ok((destination.clone(), PayloadCopy::SkippedDryRun));
            }
            copy_tree(&payload, destination)?;
            return Ok((destination.clone(), PayloadCopy::Copied));
        }

        if let Some(package) = request.package_manifest.as_ref().filter(|p| p.is_file()) {
            if let Some(parent) = package.parent() {
                tracing::info!(
                    "using package file directory as install path: {}",
                    parent.display()
                );
                return Ok((parent.to_path_buf(), PayloadCopy::NotNeeded));
            }
        }

        Err(InstallError::NoInstallLocation)
    }

    fn write_target(
        &self,
        config_dir: &Path,
        contents: &[u8],
        dry_run: bool,
    ) -> Result<TargetOutcome, InstallError> {
        let packages_dir = config_dir.join(PACKAGES_DIR);
        let created_packages_dir = !packages_dir.is_dir();

        if !created_packages_dir {
            tracing::info!(
                "writing package to existing Houdini packages directory: {}",
                packages_dir.display()
            );
        } else if dry_run {
            tracing::info!(
                "dry run: would create Houdini packages directory: {}",
                packages_dir.display()
            );
        } else {
            fs::create_dir_all(&packages_dir).map_err(|source| InstallError::CreatePackagesDir {
                path: packages_dir.clone(),
                source,
            })?;
            tracing::info!(
                "created Houdini packages directory: {}",
                packages_dir.display()
            );
        }

        let package_file = packages_dir.join(format!("{}.json", self.settings.name));
        let written = if dry_run {
            tracing::debug!(
                "package file would be written to: {}",
                package_file.display()
            );
            false
        } else {
            write_atomically(&package_file, contents).map_err(|source| {
                InstallError::WriteManifest {
                    path: package_file.clone(),
                    source,
                }
            })?;
            tracing::info!("wrote Houdini package file: {}", package_file.display());
            true
        };

        Ok(TargetOutcome {
            config_dir: config_dir.to_path_buf(),
            package_file,
            created_packages_dir,
            written,
        })
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }

    let a_canon = fs::canonicalize(a);
    let b_canon = fs::canonicalize(b);
    matches!((a_canon, b_canon), (Ok(ca), Ok(cb)) if ca == cb)
}

/// Copying into the payload's own tree would recurse into its output.
fn check_not_nested(payload: &Path, destination: &Path) -> Result<(), InstallError> {
    if resolve_path(destination).starts_with(resolve_path(payload)) {
        return Err(InstallError::DestinationInsidePayload {
            payload: payload.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }
    Ok(())
}

fn copy_err(from: &Path, to: &Path) -> impl FnOnce(io::Error) -> InstallError {
    let (from, to) = (from.to_path_buf(), to.to_path_buf());
    move |source| InstallError::Copy { from, to, source }
}

/// Merge `payload` into `destination`. Same-named files are overwritten,
/// files only present at the destination are left alone.
fn copy_tree(payload: &Path, destination: &Path) -> Result<(), InstallError> {
    check_not_nested(payload, destination)?;
    fs::create_dir_all(destination).map_err(copy_err(payload, destination))?;

    let walker = WalkBuilder::new(payload)
        .standard_filters(false)
        .follow_links(true)
        .build();

    for entry in walker {
        let entry = entry.map_err(|err| InstallError::Walk {
            path: payload.to_path_buf(),
            message: err.to_string(),
        })?;

        let Ok(relative) = entry.path().strip_prefix(payload) else {
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = destination.join(relative);
        if entry.file_type().is_some_and(|kind| kind.is_dir()) {
            fs::create_dir_all(&target).map_err(copy_err(entry.path(), &target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(copy_err(entry.path(), parent))?;
        }
        fs::copy(entry.path(), &target).map_err(copy_err(entry.path(), &target))?;
        tracing::debug!("copied {}", relative.display());
    }

    Ok(())
}

/// Write to a `.json.tmp` sibling, then rename over `path`. The temporary
/// file is removed if any step fails.
fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let result = write_and_rename(&tmp, path, contents);
    if result.is_err() && tmp.exists() {
        if let Err(err) = fs::remove_file(&tmp) {
            tracing::warn!("failed to remove {}: {err}", tmp.display());
        }
    }
    result
}

fn write_and_rename(tmp: &Path, path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut writer = io::BufWriter::new(fs::File::create(tmp)?);
    writer.write_all(contents)?;
    writer.flush()?;
    drop(writer);
    fs::rename(tmp, path)
}
