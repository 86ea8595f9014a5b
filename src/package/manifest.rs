use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::config::PackageSettings;
use crate::package::error::ManifestError;

/// Prefix Houdini uses to reference an env var from `hpath`.
pub const VAR_SIGIL: char = '$';

/// Key older package files used instead of `hpath`.
pub const LEGACY_PATH_KEY: &str = "path";

pub const ENV_KEY: &str = "env";
pub const HPATH_KEY: &str = "hpath";

/// One `env` element: normally a single `{NAME: value}` pair.
pub type EnvEntry = Map<String, Value>;

/// A Houdini package file, kept as the ordered JSON document it was read
/// from. Only `env` and `hpath` are touched; every other key keeps its value
/// and position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Empty `env` list followed by an empty `hpath` list.
    pub fn fresh() -> Self {
        let mut doc = Map::new();
        doc.insert(ENV_KEY.to_string(), Value::Array(Vec::new()));
        doc.insert(HPATH_KEY.to_string(), Value::Array(Vec::new()));
        Self(doc)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest: Manifest =
            serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        manifest.migrate_legacy_path();
        Ok(manifest)
    }

    /// Load `path` if given, falling back to an empty manifest on any error.
    pub fn load_or_fresh(path: Option<&Path>) -> Option<Self> {
        let path = path?;
        match Self::load(path) {
            Ok(manifest) => {
                tracing::info!("loaded existing package file {}", path.display());
                Some(manifest)
            }
            Err(err) => {
                tracing::warn!("{err}; starting from a fresh package file");
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn hpath(&self) -> Option<&Value> {
        self.get(HPATH_KEY)
    }

    /// Replace a legacy `path` key with `hpath`. The value lands wherever the
    /// first of the two keys sat in the document.
    pub fn migrate_legacy_path(&mut self) {
        if !self.0.contains_key(LEGACY_PATH_KEY) {
            return;
        }
        tracing::debug!("migrating legacy `path` key to `hpath`");

        let mut migrated = Map::new();
        for (key, value) in std::mem::take(&mut self.0) {
            match key.as_str() {
                LEGACY_PATH_KEY => {
                    migrated.insert(HPATH_KEY.to_string(), value);
                }
                HPATH_KEY => {
                    migrated.entry(HPATH_KEY).or_insert(Value::Null);
                }
                _ => {
                    migrated.insert(key, value);
                }
            }
        }
        self.0 = migrated;
    }

    /// Three-space indented JSON.
    pub fn to_pretty_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        buf.push(b'\n');
        Ok(buf)
    }

    /// Run `f` on the `env` list, appending an empty list when absent. A
    /// non-list value is discarded.
    fn with_env<R>(&mut self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let slot = self
            .0
            .entry(ENV_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        let mut items = match slot.take() {
            Value::Array(items) => items,
            other => {
                tracing::warn!("package file `env` is not a list, replacing {other}");
                Vec::new()
            }
        };
        let out = f(&mut items);
        *slot = Value::Array(items);
        out
    }

    /// Overwrite `key` in the first entry that has it.
    fn set_existing_env(&mut self, key: &str, value: &Value) -> bool {
        self.with_env(|env| {
            let slot = env
                .iter_mut()
                .find_map(|entry| entry.as_object_mut().and_then(|entry| entry.get_mut(key)));
            match slot {
                Some(slot) => {
                    *slot = value.clone();
                    true
                }
                None => false,
            }
        })
    }

    fn push_env(&mut self, key: &str, value: Value) {
        let mut entry = EnvEntry::new();
        entry.insert(key.to_string(), value);
        self.with_env(|env| env.push(Value::Object(entry)));
    }

    /// Append `reference` to a list `hpath`; anything else is replaced by the
    /// single reference.
    fn add_hpath_reference(&mut self, reference: String) {
        let hpath = self
            .0
            .entry(HPATH_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        match hpath {
            Value::Array(items) => {
                if !items.iter().any(|item| item.as_str() == Some(reference.as_str())) {
                    items.push(Value::String(reference));
                }
            }
            other => *other = Value::String(reference),
        }
    }

    fn set_hpath(&mut self, value: Value) {
        self.0.insert(HPATH_KEY.to_string(), value);
    }
}

/// Build the package file for `install_path` from an existing one (or none).
///
/// Path variables already present in `env` are overwritten in place, new ones
/// are appended along with a `$NAME` reference in `hpath`. Without path
/// variables `hpath` becomes the literal install path. Extra variables are
/// set by key.
pub fn synthesize(
    existing: Option<Manifest>,
    install_path: &str,
    settings: &PackageSettings,
) -> Manifest {
    let mut manifest = existing.unwrap_or_else(Manifest::fresh);
    manifest.migrate_legacy_path();

    let install_value = Value::String(install_path.to_string());

    for var in &settings.path_vars {
        if !manifest.set_existing_env(var, &install_value) {
            manifest.push_env(var, install_value.clone());
            manifest.add_hpath_reference(format!("{VAR_SIGIL}{var}"));
        }
    }

    if settings.path_vars.is_empty() {
        manifest.set_hpath(install_value);
    }

    for (key, value) in &settings.extra_vars {
        if !manifest.set_existing_env(key, value) {
            manifest.push_env(key, value.clone());
        }
    }

    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings(path_vars: &[&str], extra: Value) -> PackageSettings {
        PackageSettings {
            name: "Pkg".to_string(),
            path_vars: path_vars.iter().map(|v| v.to_string()).collect(),
            extra_vars: extra.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    fn as_json(manifest: &Manifest) -> Value {
        serde_json::to_value(manifest).unwrap()
    }

    #[test]
    fn fresh_manifest_references_path_var() {
        let manifest = synthesize(None, "/home/u/Pkg", &settings(&["PKG"], json!({})));
        assert_eq!(
            as_json(&manifest),
            json!({"env": [{"PKG": "/home/u/Pkg"}], "hpath": ["$PKG"]})
        );
    }

    #[test]
    fn no_path_vars_writes_literal_hpath() {
        let manifest = synthesize(None, "/home/u/Pkg", &settings(&[], json!({})));
        assert_eq!(as_json(&manifest), json!({"env": [], "hpath": "/home/u/Pkg"}));
    }

    #[test]
    fn repeated_synthesis_does_not_duplicate_path_vars() {
        let s = settings(&["MOPS", "MOPSPLUS"], json!({"HOUDINI_PYTHONWARNINGS": "ignore"}));
        let once = synthesize(None, "/opt/mops", &s);
        let twice = synthesize(Some(once.clone()), "/opt/mops", &s);

        assert_eq!(once, twice);
        assert_eq!(
            as_json(&twice),
            json!({
                "env": [
                    {"MOPS": "/opt/mops"},
                    {"MOPSPLUS": "/opt/mops"},
                    {"HOUDINI_PYTHONWARNINGS": "ignore"}
                ],
                "hpath": ["$MOPS", "$MOPSPLUS"]
            })
        );
    }

    #[test]
    fn existing_primary_entry_is_overwritten_in_place() {
        let existing: Manifest = serde_json::from_value(json!({
            "env": [{"PKG": "/old/location", "method": "prepend"}],
            "hpath": ["$PKG", "/shared/otls"],
            "load_package_once": true
        }))
        .unwrap();

        let manifest = synthesize(Some(existing), "/new/location", &settings(&["PKG"], json!({})));
        assert_eq!(
            as_json(&manifest),
            json!({
                "env": [{"PKG": "/new/location", "method": "prepend"}],
                "hpath": ["$PKG", "/shared/otls"],
                "load_package_once": true
            })
        );
    }

    #[test]
    fn legacy_path_key_is_migrated() {
        let legacy: Manifest = serde_json::from_value(json!({"path": "X"})).unwrap();

        let literal = synthesize(Some(legacy.clone()), "/p", &settings(&[], json!({})));
        assert!(!as_json(&literal).as_object().unwrap().contains_key("path"));
        assert_eq!(literal.hpath(), Some(&json!("/p")));

        let with_var = synthesize(Some(legacy), "/p", &settings(&["PKG"], json!({})));
        assert!(!as_json(&with_var).as_object().unwrap().contains_key("path"));
        assert_eq!(with_var.hpath(), Some(&json!("$PKG")));
    }

    #[test]
    fn legacy_list_path_keeps_entries() {
        let legacy: Manifest =
            serde_json::from_value(json!({"env": [], "path": ["/shared"]})).unwrap();
        let manifest = synthesize(Some(legacy), "/p", &settings(&["PKG"], json!({})));
        assert_eq!(manifest.hpath(), Some(&json!(["/shared", "$PKG"])));
    }

    #[test]
    fn extra_vars_are_set_by_key() {
        let existing: Manifest = serde_json::from_value(json!({
            "env": [{"PKG": "/p"}, {"MODE": "old"}],
            "hpath": ["$PKG"]
        }))
        .unwrap();

        let manifest = synthesize(
            Some(existing),
            "/p",
            &settings(&["PKG"], json!({"MODE": "new", "FLAG": 1})),
        );
        assert_eq!(
            as_json(&manifest)["env"],
            json!([{"PKG": "/p"}, {"MODE": "new"}, {"FLAG": 1}])
        );
    }

    #[test]
    fn pretty_json_uses_three_space_indent() {
        let manifest = synthesize(None, "/p", &settings(&["PKG"], json!({})));
        let text = String::from_utf8(manifest.to_pretty_json().unwrap()).unwrap();
        assert!(text.starts_with("{\n   \"env\": [\n      {\n         \"PKG\": \"/p\""));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(matches!(
            Manifest::load(&missing),
            Err(ManifestError::Read { .. })
        ));
        assert!(Manifest::load_or_fresh(Some(&missing)).is_none());

        let malformed = tmp.path().join("bad.json");
        fs::write(&malformed, "{ not json").unwrap();
        assert!(matches!(
            Manifest::load(&malformed),
            Err(ManifestError::Parse { .. })
        ));
        assert!(Manifest::load_or_fresh(Some(&malformed)).is_none());
        assert!(Manifest::load_or_fresh(None).is_none());
    }

    #[test]
    fn load_migrates_and_keeps_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Pkg.json");
        fs::write(&path, r#"{"enable": true, "path": "/legacy", "env": []}"#).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.hpath(), Some(&json!("/legacy")));
        assert_eq!(manifest.get("enable"), Some(&json!(true)));
        assert!(manifest.get("path").is_none());

        let text = String::from_utf8(manifest.to_pretty_json().unwrap()).unwrap();
        let position = |key: &str| text.find(&format!("\"{key}\"")).unwrap();
        assert!(position("enable") < position("hpath"));
        assert!(position("hpath") < position("env"));
    }

    #[test]
    fn rewrite_keeps_document_key_order() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("Pkg.json");
        fs::write(
            &path,
            r#"{"enable": true, "hpath": ["$PKG"], "env": [{"PKG": "/old"}], "load_package_once": true}"#,
        )
        .unwrap();

        let manifest = synthesize(
            Some(Manifest::load(&path).unwrap()),
            "/new",
            &settings(&["PKG"], json!({})),
        );
        let text = String::from_utf8(manifest.to_pretty_json().unwrap()).unwrap();
        assert_eq!(
            text,
            concat!(
                "{\n",
                "   \"enable\": true,\n",
                "   \"hpath\": [\n",
                "      \"$PKG\"\n",
                "   ],\n",
                "   \"env\": [\n",
                "      {\n",
                "         \"PKG\": \"/new\"\n",
                "      }\n",
                "   ],\n",
                "   \"load_package_once\": true\n",
                "}\n",
            )
        );
    }

    #[test]
    fn legacy_path_takes_the_earlier_position() {
        let legacy: Manifest = serde_json::from_value(json!({
            "enable": true,
            "path": ["/legacy"],
            "env": [],
            "hpath": ["/ignored"]
        }))
        .unwrap();

        let manifest = synthesize(Some(legacy), "/p", &settings(&["PKG"], json!({})));
        let text = String::from_utf8(manifest.to_pretty_json().unwrap()).unwrap();
        let position = |key: &str| text.find(&format!("\"{key}\"")).unwrap();
        assert!(position("hpath") < position("env"));
        assert_eq!(manifest.hpath(), Some(&json!(["/legacy", "$PKG"])));
    }
}
