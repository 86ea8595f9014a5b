use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

pub const SETTINGS_FILE: &str = "hpackage.toml";
pub const LOG_FILE: &str = "hpackage.log";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub package: PackageSettings,
    #[serde(default)]
    pub wizard: WizardText,
}

/// What gets installed and how its package file is configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageSettings {
    /// Package file stem: `<name>.json`.
    pub name: String,
    /// Env vars set to the install path and referenced from `hpath`.
    #[serde(default)]
    pub path_vars: Vec<String>,
    /// Static env entries appended after the path variables.
    #[serde(default)]
    pub extra_vars: Map<String, Value>,
    /// `major.minor` allowlist. Empty means every detected version.
    #[serde(default)]
    pub supported_versions: Vec<String>,
    /// Payload directory shipped next to the executable.
    #[serde(default)]
    pub bundled_payload: Option<PathBuf>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WizardText {
    pub title: String,
    pub intro: String,
    pub chooser: String,
    pub location: String,
}

impl Default for WizardText {
    fn default() -> Self {
        Self {
            title: "Houdini Package Installer".to_string(),
            intro: "Welcome to the package installation wizard.".to_string(),
            chooser: "Select the Houdini configurations to install the package to.".to_string(),
            location: "Choose where the package files should live. Do not install into a \
                       Houdini installation or configuration directory."
                .to_string(),
        }
    }
}

impl Settings {
    /// Load settings: embedded defaults, replaced by the first `hpackage.toml`
    /// found next to the executable, in the working directory, or in the
    /// user config directory.
    pub fn load() -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut settings = Self::from_toml(defaults).context("embedded default settings")?;

        if let Some(path) = settings_candidates().into_iter().find(|p| p.is_file()) {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            settings = Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?;
            tracing::info!("loaded settings from {}", path.display());
        } else {
            tracing::info!("using embedded default settings");
        }

        Ok(settings)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(raw)?;
        if settings.package.name.trim().is_empty() {
            anyhow::bail!("package.name must not be empty");
        }
        Ok(settings)
    }
}

fn settings_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
    {
        candidates.push(exe_dir.join(SETTINGS_FILE));
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(SETTINGS_FILE));
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "hpackage") {
        candidates.push(proj_dirs.config_dir().join(SETTINGS_FILE));
    }

    candidates
}

/// Where the per-run diagnostic log is written.
pub fn log_file_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(LOG_FILE))
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let settings = Settings::from_toml(include_str!("../../config/default.toml"))
            .expect("defaults parse");
        assert!(!settings.package.name.is_empty());
        assert!(!settings.wizard.title.is_empty());
    }

    #[test]
    fn optional_fields_fall_back() {
        let settings = Settings::from_toml("[package]\nname = \"Pkg\"\n").expect("parse");
        assert_eq!(settings.package.name, "Pkg");
        assert!(settings.package.path_vars.is_empty());
        assert!(settings.package.extra_vars.is_empty());
        assert!(settings.package.supported_versions.is_empty());
        assert!(settings.package.bundled_payload.is_none());
        assert!(!settings.package.dry_run);
        assert_eq!(settings.wizard.title, WizardText::default().title);
    }

    #[test]
    fn extra_vars_keep_document_order() {
        let raw = r#"
[package]
name = "Pkg"

[package.extra_vars]
ZETA = "last"
HOUDINI_PYTHONWARNINGS = "ignore"
load_package_once = true
"#;
        let settings = Settings::from_toml(raw).expect("parse");
        let keys: Vec<&str> = settings
            .package
            .extra_vars
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["ZETA", "HOUDINI_PYTHONWARNINGS", "load_package_once"]);
        assert_eq!(
            settings.package.extra_vars["load_package_once"],
            Value::Bool(true)
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(Settings::from_toml("[package]\nname = \"  \"\n").is_err());
    }
}
