//! Content-hash revisioning of the deploy tree.
//!
//! Runs once, strictly after every producing task has settled (the planner
//! sequences it as a barrier). Each static asset is renamed to
//! `name.<hash>.ext`, references inside HTML and CSS are rewritten, and the
//! mapping is persisted as a manifest. HTML files, source maps, dotfiles and
//! already-hashed names are left alone, which also makes a second run over
//! the same tree a no-op.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::utils::short_hash;

pub const MANIFEST_NAME: &str = "rev-manifest.json";

static HASHED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[0-9a-f]{8}\.[A-Za-z0-9]+$").expect("invalid regex"));

/// Mapping from a logical asset path to its content-hashed output path, both
/// relative to the revisioned root.
#[derive(Debug, Default)]
pub struct Manifest {
    pub entries: BTreeMap<String, String>,
}

impl Manifest {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn hashed_paths(&self, root: &Utf8Path) -> Vec<Utf8PathBuf> {
        self.entries.values().map(|rel| root.join(rel)).collect()
    }
}

pub(crate) fn revise(root: &Utf8Path) -> anyhow::Result<Manifest> {
    let mut manifest = Manifest::default();

    for path in walk(root)? {
        let rel = path.strip_prefix(root)?.to_path_buf();
        if !revisable(&rel) {
            continue;
        }

        let data = fs::read(&path)?;
        let hash = short_hash(&data);

        let stem = rel.file_stem().unwrap_or_default();
        let ext = rel.extension().unwrap_or_default();
        let hashed_name = format!("{stem}.{hash}.{ext}");

        fs::rename(&path, path.with_file_name(&hashed_name))?;

        manifest.entries.insert(
            rel.to_string(),
            rel.with_file_name(hashed_name).to_string(),
        );
    }

    rewrite_references(root, &manifest)?;

    if !manifest.is_empty() {
        let json = serde_json::to_string_pretty(&manifest.entries)?;
        fs::write(root.join(MANIFEST_NAME), json)?;
    }

    Ok(manifest)
}

fn revisable(rel: &Utf8Path) -> bool {
    let Some(name) = rel.file_name() else {
        return false;
    };

    if name.starts_with('.') || name == MANIFEST_NAME {
        return false;
    }

    let Some(ext) = rel.extension() else {
        return false;
    };

    if matches!(ext, "html" | "map") {
        return false;
    }

    !HASHED_NAME.is_match(name)
}

/// Rewrite references in text outputs from logical to hashed basenames. A
/// reference boundary is anything that can't be part of a filename, so
/// `href="css/style.css"` matches while `mystyle.css` doesn't. Ambiguous
/// basenames (the same name in two directories) are left unrewritten and
/// reported.
fn rewrite_references(root: &Utf8Path, manifest: &Manifest) -> anyhow::Result<()> {
    if manifest.is_empty() {
        return Ok(());
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for logical in manifest.entries.keys() {
        if let Some(name) = Utf8Path::new(logical).file_name() {
            *seen.entry(name).or_default() += 1;
        }
    }

    let mut replacements = Vec::new();
    for (logical, hashed) in &manifest.entries {
        let name = Utf8Path::new(logical).file_name().unwrap_or_default();
        let hashed_name = Utf8Path::new(hashed).file_name().unwrap_or_default();

        if seen.get(name) != Some(&1) {
            tracing::warn!("revision: ambiguous basename '{name}', references not rewritten");
            continue;
        }

        let pattern = format!("(^|[^A-Za-z0-9_.-]){}", regex::escape(name));
        replacements.push((Regex::new(&pattern)?, hashed_name.to_string()));
    }

    for path in walk(root)? {
        if !matches!(path.extension(), Some("html") | Some("css")) {
            continue;
        }

        let text = fs::read_to_string(&path)?;
        let mut replaced = text.clone();

        for (regex, hashed_name) in &replacements {
            replaced = regex
                .replace_all(&replaced, |caps: &regex::Captures| {
                    format!("{}{hashed_name}", &caps[1])
                })
                .into_owned();
        }

        if replaced != text {
            fs::write(&path, replaced)?;
        }
    }

    Ok(())
}

pub(crate) fn walk(root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
    fn rec(dir: &Utf8Path, acc: &mut Vec<Utf8PathBuf>) -> anyhow::Result<()> {
        let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = Utf8PathBuf::try_from(entry.path())?;
            if path.is_dir() {
                rec(&path, acc)?;
            } else {
                acc.push(path);
            }
        }

        Ok(())
    }

    let mut acc = Vec::new();
    if root.is_dir() {
        rec(root, &mut acc)?;
    }
    Ok(acc)
}
