use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::model::config::{self, PackageSettings};
use crate::package::host::HostLayout;
use crate::package::locate::{self, PayloadSource};

/// Facts about the machine the wizard runs on, probed once at startup.
#[derive(Debug, Clone)]
pub struct InstallEnvironment {
    /// `None` when no home or documents directory could be determined.
    pub layout: Option<HostLayout>,
    /// Upward searches for the payload and package file start here.
    pub work_dir: PathBuf,
    pub home_dir: PathBuf,
    pub payload_source: PayloadSource,
    pub log_path: PathBuf,
}

impl InstallEnvironment {
    pub fn detect(settings: &PackageSettings) -> Result<Self> {
        let work_dir = std::env::current_dir().context("reading current directory")?;
        let home_dir = directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| work_dir.clone());
        let layout = HostLayout::detect();

        if layout.is_none() {
            tracing::warn!("cannot determine the Houdini configuration root");
        }

        Ok(Self {
            layout,
            work_dir,
            home_dir,
            payload_source: PayloadSource::detect(settings),
            log_path: config::log_file_path(),
        })
    }

    /// `~/<name>` when bundled or when no payload can be found, otherwise the
    /// payload root itself.
    pub fn default_destination(&self, settings: &PackageSettings) -> PathBuf {
        let fallback = self.home_dir.join(&settings.name);
        if self.payload_source.is_bundled() {
            return fallback;
        }
        locate::find_payload_path(&self.work_dir, &self.payload_source).unwrap_or(fallback)
    }

    /// Expand a leading `~` in a user-typed path.
    pub fn expand_user_path(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        if raw == "~" {
            return self.home_dir.clone();
        }
        if let Some(rest) = raw.strip_prefix("~/").or_else(|| raw.strip_prefix("~\\")) {
            return self.home_dir.join(rest);
        }
        Path::new(raw).to_path_buf()
    }
}
