//! Script bundling.
//!
//! The bundler itself is an external collaborator: each entry file is handed
//! to `esbuild` and the bundled output captured from stdout. When the bundler
//! toggle is off, a plain include-directive stage concatenates sources
//! instead.

use std::fs;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail};
use camino::Utf8Path;

use crate::config::Target;
use crate::stage::{Asset, Stage, StageContext, StageOutput, each_asset};

pub struct BundleScripts;

impl Stage for BundleScripts {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn apply(&self, cx: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        if assets.is_empty() {
            return Ok(StageOutput::default());
        }

        // A missing bundler fails the whole task, not file by file.
        which::which("esbuild")
            .map_err(|_| anyhow!("'esbuild' is not available in the environment"))?;

        let target = cx.target;

        let assets = each_asset(self.name(), assets, |asset| {
            let source = asset
                .source
                .as_ref()
                .ok_or_else(|| anyhow!("bundling requires an on-disk entry file"))?;

            let mut command = Command::new("esbuild");
            command.arg(source.as_str()).arg("--bundle");

            match target {
                Target::Build => command.arg("--sourcemap=inline"),
                Target::Deploy => command.arg("--minify"),
            };

            let output = command
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()?;

            if !output.status.success() {
                bail!(
                    "esbuild failed:\n{}",
                    String::from_utf8_lossy(&output.stderr)
                );
            }

            Ok(asset.with_data(output.stdout))
        });

        Ok(StageOutput::assets(assets))
    }
}

/// Resolves `//= include <path>` directives relative to the including file,
/// recursively. The fallback when the bundler toggle is off.
pub struct IncludeScripts;

const MAX_INCLUDE_DEPTH: usize = 16;

impl Stage for IncludeScripts {
    fn name(&self) -> &'static str {
        "include"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        let assets = each_asset(self.name(), assets, |asset| {
            let source = asset
                .source
                .clone()
                .ok_or_else(|| anyhow!("include resolution requires an on-disk file"))?;
            let text = asset.text()?.to_string();

            let resolved = resolve_includes(&source, &text, 0)?;
            Ok(asset.with_data(resolved.into_bytes()))
        });

        Ok(StageOutput::assets(assets))
    }
}

fn resolve_includes(file: &Utf8Path, text: &str, depth: usize) -> anyhow::Result<String> {
    if depth > MAX_INCLUDE_DEPTH {
        bail!("include depth exceeded in '{file}'");
    }

    let dir = file.parent().unwrap_or(Utf8Path::new(""));
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        match line.trim().strip_prefix("//= include ") {
            None => {
                out.push_str(line);
                out.push('\n');
            }
            Some(rel) => {
                let target = dir.join(rel.trim());
                let included = fs::read_to_string(&target)
                    .map_err(|e| anyhow!("couldn't include '{target}': {e}"))?;
                out.push_str(&resolve_includes(&target, &included, depth + 1)?);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    use camino::Utf8PathBuf;

    use crate::config::Config;
    use crate::pipeline::snapshot;

    #[test]
    fn test_include_directives_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("partials")).unwrap();
        fs::write(
            root.join("main.js"),
            "//= include partials/util.js\nmain();\n",
        )
        .unwrap();
        fs::write(root.join("partials/util.js"), "function util() {}\n").unwrap();

        let config = Config::default();
        let cx = StageContext {
            config: &config,
            target: Target::Build,
            locale: None,
            port: None,
        };

        let assets = snapshot(&[format!("{root}/*.js")]).unwrap();
        let out = IncludeScripts.apply(&cx, assets).unwrap();

        let text = out.assets[0].text().unwrap();
        assert!(text.contains("function util() {}"));
        assert!(text.contains("main();"));
        assert!(!text.contains("//= include"));
    }

    #[test]
    fn test_missing_include_drops_only_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("ok.js"), "ok();\n").unwrap();
        fs::write(root.join("bad.js"), "//= include nope.js\n").unwrap();

        let config = Config::default();
        let cx = StageContext {
            config: &config,
            target: Target::Build,
            locale: None,
            port: None,
        };

        let assets = snapshot(&[format!("{root}/*.js")]).unwrap();
        let out = IncludeScripts.apply(&cx, assets).unwrap();

        assert_eq!(out.assets.len(), 1);
        assert_eq!(out.assets[0].path, "ok.js");
    }
}
