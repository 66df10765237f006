use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::error::LocaleError;

/// A single locale: its identifier (the definition file's stem) and the
/// substitution strings available to template rendering.
#[derive(Debug, Clone)]
pub struct Locale {
    pub id: String,
    pub strings: serde_json::Map<String, Value>,
}

/// The set of locales discovered at startup. Empty means the build runs
/// unscoped with the configured default locale.
#[derive(Debug, Clone, Default)]
pub struct LocaleSet {
    locales: Vec<Locale>,
}

impl LocaleSet {
    /// Scan a directory for `<locale>.json` files. Each file's stem is a
    /// locale identifier and its body a map of substitution strings. A
    /// missing directory yields an empty set, not an error.
    pub fn discover(dir: &Utf8Path) -> Result<Self, LocaleError> {
        let mut locales = Vec::new();

        if !dir.is_dir() {
            return Ok(Self::default());
        }

        for entry in fs::read_dir(dir)? {
            let path = Utf8PathBuf::try_from(entry?.path())?;

            if path.extension() != Some("json") {
                continue;
            }

            let Some(id) = path.file_stem() else {
                continue;
            };

            let text = fs::read_to_string(&path)?;
            let strings = serde_json::from_str(&text)
                .map_err(|e| LocaleError::Parse(path.clone(), e))?;

            locales.push(Locale {
                id: id.to_string(),
                strings,
            });
        }

        locales.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(Self { locales })
    }

    pub fn is_empty(&self) -> bool {
        self.locales.is_empty()
    }

    pub fn len(&self) -> usize {
        self.locales.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Locale> {
        self.locales.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Locale> {
        self.locales.iter().find(|l| l.id == id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;

    #[test]
    fn test_discovery_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        fs::write(root.join("de.json"), r#"{"title": "Hallo"}"#).unwrap();
        fs::write(root.join("en.json"), r#"{"title": "Hello"}"#).unwrap();
        fs::write(root.join("notes.txt"), "ignored").unwrap();

        let set = LocaleSet::discover(&root).unwrap();

        assert_eq!(set.len(), 2);
        let ids: Vec<_> = set.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["de", "en"]);
        assert_eq!(
            set.get("en").unwrap().strings["title"],
            Value::String("Hello".into())
        );
    }

    #[test]
    fn test_missing_directory_is_unscoped() {
        let set = LocaleSet::discover(Utf8Path::new("no/such/dir")).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("en.json"), "{ not json").unwrap();

        assert!(matches!(
            LocaleSet::discover(&root),
            Err(LocaleError::Parse(..))
        ));
    }
}
