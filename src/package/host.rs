use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::config::PackageSettings;

/// Name prefix of per-version configuration directories on Windows and Linux.
pub const PRODUCT_PREFIX: &str = "houdini";

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:houdini)?(?P<major>\d{1,2})\.(?P<minor>\d{1,2})").expect("valid version regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::MacOs
        } else {
            OsFamily::Linux
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OsFamily::Windows => "Windows",
            OsFamily::MacOs => "macOS",
            OsFamily::Linux => "Linux",
        }
    }
}

/// `major.minor` parsed from a configuration directory name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
}

impl HostVersion {
    /// Parse `20.5` or `houdini20.5` (anything may follow the minor digits).
    pub fn parse(name: &str) -> Option<Self> {
        let caps = VERSION_RE.captures(name.trim())?;
        Some(Self {
            major: caps["major"].parse().ok()?,
            minor: caps["minor"].parse().ok()?,
        })
    }

    /// Empty allowlists allow everything. Entries are matched as the exact
    /// `major.minor` text, so `20.05` does not allow `20.5`.
    pub fn is_allowed(&self, allowlist: &[String]) -> bool {
        if allowlist.is_empty() {
            return true;
        }
        let version = self.to_string();
        allowlist.iter().any(|entry| entry.trim() == version)
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationDirectory {
    pub path: PathBuf,
    pub version: HostVersion,
    pub supported: bool,
}

impl ConfigurationDirectory {
    /// Path with forward slashes, as shown to the user and logged.
    pub fn display_path(&self) -> String {
        self.path.to_string_lossy().replace('\\', "/")
    }
}

/// The single per-user root that holds the versioned configuration directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub family: OsFamily,
    pub root: PathBuf,
}

impl HostLayout {
    pub fn new(family: OsFamily, root: impl Into<PathBuf>) -> Self {
        Self {
            family,
            root: root.into(),
        }
    }

    /// Documents folder on Windows, `~/Library/Preferences/Houdini` on macOS,
    /// home on Linux.
    pub fn detect() -> Option<Self> {
        let family = OsFamily::current();
        let root = match family {
            OsFamily::Windows => directories::UserDirs::new()?
                .document_dir()?
                .to_path_buf(),
            OsFamily::MacOs => directories::BaseDirs::new()?
                .home_dir()
                .join("Library/Preferences/Houdini"),
            OsFamily::Linux => directories::BaseDirs::new()?.home_dir().to_path_buf(),
        };
        Some(Self::new(family, root))
    }

    fn is_candidate_name(&self, name: &str) -> bool {
        match self.family {
            OsFamily::MacOs => VERSION_RE.is_match(name),
            OsFamily::Windows | OsFamily::Linux => name.starts_with(PRODUCT_PREFIX),
        }
    }
}

/// Every versioned configuration directory under the layout root, with its
/// allowlist verdict. Names without a parseable version are skipped.
pub fn scan_configuration_dirs(
    layout: &HostLayout,
    settings: &PackageSettings,
) -> Vec<ConfigurationDirectory> {
    tracing::debug!(
        "{} configuration root: {}",
        layout.family.label(),
        layout.root.display()
    );

    let entries = match fs::read_dir(&layout.root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(
                "cannot list configuration root {}: {err}",
                layout.root.display()
            );
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !layout.is_candidate_name(&name) {
            continue;
        }

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        tracing::debug!("testing Houdini configuration path: {name}");
        let Some(version) = HostVersion::parse(&name) else {
            tracing::warn!("skipping {}: no major.minor version in name", path.display());
            continue;
        };

        let supported = version.is_allowed(&settings.supported_versions);
        tracing::debug!("version parsed: {version} (supported: {supported})");
        found.push(ConfigurationDirectory {
            path,
            version,
            supported,
        });
    }

    found
}

/// Configuration directories the package may be installed to, in listing order.
pub fn discover_configuration_dirs(
    layout: &HostLayout,
    settings: &PackageSettings,
) -> Vec<ConfigurationDirectory> {
    let dirs: Vec<ConfigurationDirectory> = scan_configuration_dirs(layout, settings)
        .into_iter()
        .filter(|dir| dir.supported)
        .collect();

    tracing::debug!(
        "Houdini configurations found: {:?}",
        dirs.iter().map(|d| d.display_path()).collect::<Vec<_>>()
    );
    dirs
}
