use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::config::PackageSettings;

/// Upper bound on parent directories visited by an upward search.
pub const MAX_ASCENT: usize = 50;

/// Subdirectory that marks a payload root.
pub const PAYLOAD_MARKER: &str = "otls";

/// Where the payload comes from for this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// Shipped next to the executable.
    Bundled(PathBuf),
    /// Searched for from the working directory.
    Loose,
}

impl PayloadSource {
    pub fn detect(settings: &PackageSettings) -> Self {
        let Some(bundled) = settings.bundled_payload.as_deref() else {
            return PayloadSource::Loose;
        };

        match std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            Some(exe_dir) => Self::resolve(bundled, &exe_dir),
            None => PayloadSource::Loose,
        }
    }

    pub fn resolve(bundled: &Path, base: &Path) -> Self {
        let dir = base.join(bundled);
        if dir.is_dir() {
            tracing::info!("running with bundled payload at {}", dir.display());
            PayloadSource::Bundled(dir)
        } else {
            tracing::debug!("no bundled payload at {}", dir.display());
            PayloadSource::Loose
        }
    }

    pub fn is_bundled(&self) -> bool {
        matches!(self, PayloadSource::Bundled(_))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadRejection {
    #[error("{0} does not exist")]
    Missing(PathBuf),
    #[error("{0} has no otls directory")]
    NoMarker(PathBuf),
}

/// Locate the payload root: the bundled directory, or the nearest directory
/// at or above `start` that contains `otls/`.
pub fn find_payload_path(start: &Path, source: &PayloadSource) -> Option<PathBuf> {
    if let PayloadSource::Bundled(dir) = source {
        return Some(dir.clone());
    }

    tracing::debug!("finding payload starting from path: {}", start.display());
    let found = walk_up(start, |dir| is_payload_root(dir).then(|| dir.to_path_buf()));
    match &found {
        Some(path) => tracing::info!("found payload path: {}", path.display()),
        None => tracing::warn!("payload path not found above {}", start.display()),
    }
    found
}

/// Locate `<name>.json` at or above `start`.
pub fn find_package_path(start: &Path, name: &str) -> Option<PathBuf> {
    tracing::debug!("finding package JSON starting from path: {}", start.display());
    let file_name = format!("{name}.json");
    let found = walk_up(start, |dir| {
        let candidate = dir.join(&file_name);
        candidate.is_file().then_some(candidate)
    });
    match &found {
        Some(path) => tracing::info!("found package path: {}", path.display()),
        None => tracing::info!("no existing {file_name} above {}", start.display()),
    }
    found
}

pub fn is_payload_root(dir: &Path) -> bool {
    dir.join(PAYLOAD_MARKER).is_dir()
}

/// Check a payload root typed in by the user.
pub fn validate_user_payload(path: &Path) -> Result<PathBuf, PayloadRejection> {
    if !path.exists() {
        return Err(PayloadRejection::Missing(path.to_path_buf()));
    }
    if !is_payload_root(path) {
        return Err(PayloadRejection::NoMarker(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

fn walk_up<F>(start: &Path, mut probe: F) -> Option<PathBuf>
where
    F: FnMut(&Path) -> Option<PathBuf>,
{
    let start = std::path::absolute(start).unwrap_or_else(|_| start.to_path_buf());
    let mut current: &Path = &start;

    for _ in 0..MAX_ASCENT {
        tracing::debug!("testing path: {}", current.display());
        if let Some(hit) = probe(current) {
            return Some(hit);
        }
        current = current.parent()?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn chain(base: &Path, depth: usize) -> PathBuf {
        let mut dir = base.to_path_buf();
        for i in 0..depth {
            dir = dir.join(format!("d{i}"));
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn payload_found_in_ancestor() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("MOPs");
        fs::create_dir_all(root.join("otls")).unwrap();
        let start = chain(&root.join("installer"), 3);

        assert_eq!(find_payload_path(&start, &PayloadSource::Loose), Some(root));
    }

    #[test]
    fn payload_marker_must_be_a_directory() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("otls"), "").unwrap();
        assert!(!is_payload_root(tmp.path()));
    }

    #[test]
    fn deep_chain_without_marker_terminates() {
        let tmp = TempDir::new().unwrap();
        let start = chain(tmp.path(), MAX_ASCENT + 10);

        assert_eq!(find_payload_path(&start, &PayloadSource::Loose), None);
        assert_eq!(find_package_path(&start, "NoSuchPackage_7f3a"), None);
    }

    #[test]
    fn marker_beyond_step_bound_is_not_reached() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("otls")).unwrap();
        fs::write(tmp.path().join("Pkg.json"), "{}").unwrap();
        let start = chain(tmp.path(), MAX_ASCENT + 5);

        assert_eq!(find_payload_path(&start, &PayloadSource::Loose), None);
        assert_eq!(find_package_path(&start, "Pkg"), None);
    }

    #[test]
    fn package_file_found_in_parent() {
        let tmp = TempDir::new().unwrap();
        let package = tmp.path().join("Pkg.json");
        fs::write(&package, "{}").unwrap();
        let start = chain(tmp.path(), 2);

        assert_eq!(find_package_path(&start, "Pkg"), Some(package));
        assert_eq!(find_package_path(&start, "Other"), None);
    }

    #[test]
    fn bundled_payload_short_circuits_the_walk() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("payload")).unwrap();

        let source = PayloadSource::resolve(Path::new("payload"), tmp.path());
        assert!(source.is_bundled());
        assert_eq!(
            find_payload_path(Path::new("/"), &source),
            Some(tmp.path().join("payload"))
        );

        let missing = PayloadSource::resolve(Path::new("absent"), tmp.path());
        assert_eq!(missing, PayloadSource::Loose);
    }

    #[test]
    fn user_payload_must_exist_and_hold_otls() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        assert_eq!(
            validate_user_payload(&missing),
            Err(PayloadRejection::Missing(missing.clone()))
        );
        assert_eq!(
            validate_user_payload(tmp.path()),
            Err(PayloadRejection::NoMarker(tmp.path().to_path_buf()))
        );

        fs::create_dir(tmp.path().join("otls")).unwrap();
        assert_eq!(validate_user_payload(tmp.path()), Ok(tmp.path().to_path_buf()));
    }
}
