use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::model::config::PackageSettings;
use crate::package::host::{self, HostLayout};

/// Path segment present in every vendor installation tree.
pub const VENDOR_MARKER: &str = "Side Effects Software";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    InsideConfiguration(PathBuf),
    InsideHostInstall,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn explanation(&self) -> String {
        match self {
            Verdict::Accepted => "path accepted".to_string(),
            Verdict::InsideConfiguration(root) => format!(
                "{} is a Houdini configuration directory; choose a location outside it",
                root.display()
            ),
            Verdict::InsideHostInstall => {
                "that path is inside a Houdini installation directory".to_string()
            }
        }
    }
}

/// Rejects destinations inside configuration roots or vendor install trees.
///
/// Roots are captured when the classifier is built; build a new one after
/// rescanning configuration directories.
#[derive(Debug, Clone, Default)]
pub struct PathClassifier {
    roots: Vec<PathBuf>,
}

impl PathClassifier {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().map(|root| resolve_path(&root)).collect(),
        }
    }

    /// Every versioned configuration directory counts, supported or not.
    pub fn scan(layout: Option<&HostLayout>, settings: &PackageSettings) -> Self {
        let roots = layout
            .map(|layout| {
                host::scan_configuration_dirs(layout, settings)
                    .into_iter()
                    .map(|dir| dir.path)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Self::new(roots)
    }

    pub fn classify(&self, candidate: &Path) -> Verdict {
        let candidate = resolve_path(candidate);

        if let Some(root) = self.roots.iter().find(|root| candidate.starts_with(root)) {
            tracing::warn!(
                "path {} appears to be within a Houdini preferences path",
                candidate.display()
            );
            return Verdict::InsideConfiguration(root.clone());
        }

        if candidate
            .components()
            .any(|component| component.as_os_str() == VENDOR_MARKER)
        {
            tracing::warn!(
                "path {} appears to be in a Houdini installation directory",
                candidate.display()
            );
            return Verdict::InsideHostInstall;
        }

        Verdict::Accepted
    }

    pub fn is_valid_install_path(&self, candidate: &Path) -> bool {
        self.classify(candidate).is_accepted()
    }
}

/// Absolute form of `path` with `.` and `..` folded away and the longest
/// existing prefix canonicalized, so symlinked and relative spellings of one
/// location compare equal. The path itself need not exist.
pub fn resolve_path(path: &Path) -> PathBuf {
    let path = PathBuf::from(path.to_string_lossy().replace('\\', "/"));
    let absolute = std::path::absolute(&path).unwrap_or(path);

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }
    canonical_prefix(&lexical)
}

fn canonical_prefix(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => canonical_prefix(parent).join(name),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::host::OsFamily;
    use std::fs;
    use tempfile::TempDir;

    fn settings(versions: &[&str]) -> PackageSettings {
        PackageSettings {
            name: "Pkg".to_string(),
            supported_versions: versions.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_root_and_descendants() {
        let classifier = PathClassifier::new([PathBuf::from("/home/u/houdini20.0")]);

        assert!(!classifier.is_valid_install_path(Path::new("/home/u/houdini20.0")));
        assert!(!classifier.is_valid_install_path(Path::new("/home/u/houdini20.0/")));
        assert!(!classifier.is_valid_install_path(Path::new("/home/u/houdini20.0/packages/Pkg")));
        assert_eq!(
            classifier.classify(Path::new("/home/u/houdini20.0/otls")),
            Verdict::InsideConfiguration(PathBuf::from("/home/u/houdini20.0"))
        );
    }

    #[test]
    fn parent_components_cannot_escape_into_a_root() {
        let classifier = PathClassifier::new([PathBuf::from("/home/u/houdini20.0")]);

        assert!(!classifier.is_valid_install_path(Path::new("/home/u/Pkg/../houdini20.0/Pkg")));
        assert!(!classifier.is_valid_install_path(Path::new("/home/u/./houdini20.0")));
        assert!(classifier.is_valid_install_path(Path::new("/home/u/houdini20.0/../Pkg")));
    }

    #[test]
    fn relative_paths_resolve_against_the_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let classifier = PathClassifier::new([cwd.join("src")]);

        assert!(!classifier.is_valid_install_path(Path::new("src/Pkg")));
        assert!(!classifier.is_valid_install_path(Path::new("./src")));
        assert!(classifier.is_valid_install_path(Path::new("src/../Pkg")));
    }

    #[test]
    fn symlinked_spelling_of_a_root_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("houdini20.5");
        fs::create_dir(&config).unwrap();
        let classifier = PathClassifier::new([config.clone()]);

        #[cfg(unix)]
        {
            let link = tmp.path().join("prefs");
            std::os::unix::fs::symlink(&config, &link).unwrap();
            assert!(!classifier.is_valid_install_path(&link.join("Pkg")));
        }
        assert!(!classifier.is_valid_install_path(&tmp.path().join("x/../houdini20.5/Pkg")));
    }

    #[test]
    fn sibling_with_shared_prefix_is_accepted() {
        let classifier = PathClassifier::new([PathBuf::from("/home/u/houdini20.0")]);
        assert!(classifier.is_valid_install_path(Path::new("/home/u/houdini20.0_tools")));
        assert!(classifier.is_valid_install_path(Path::new("/home/u/Pkg")));
    }

    #[test]
    fn windows_separators_are_normalized() {
        let classifier = PathClassifier::new([PathBuf::from("C:/Users/u/Documents/houdini20.5")]);
        assert!(
            !classifier.is_valid_install_path(Path::new(r"C:\Users\u\Documents\houdini20.5\Pkg"))
        );
    }

    #[test]
    fn vendor_segment_is_rejected_without_any_roots() {
        let classifier = PathClassifier::default();
        assert_eq!(
            classifier.classify(Path::new(
                r"C:\Program Files\Side Effects Software\Houdini 20.5\packages"
            )),
            Verdict::InsideHostInstall
        );
        assert!(
            !classifier.is_valid_install_path(Path::new("/opt/Side Effects Software/hfs20.5"))
        );
        assert!(classifier.is_valid_install_path(Path::new("/opt/Side Effects/hfs20.5")));
    }

    #[test]
    fn scan_includes_versions_outside_the_allowlist() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("houdini19.5")).unwrap();
        fs::create_dir(tmp.path().join("houdini20.5")).unwrap();
        let layout = HostLayout::new(OsFamily::Linux, tmp.path());

        let classifier = PathClassifier::scan(Some(&layout), &settings(&["20.5"]));
        assert!(!classifier.is_valid_install_path(&tmp.path().join("houdini19.5/Pkg")));
        assert!(!classifier.is_valid_install_path(&tmp.path().join("houdini20.5")));
        assert!(classifier.is_valid_install_path(&tmp.path().join("Pkg")));
    }
}
