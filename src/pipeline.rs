//! Source-to-sink transform pipelines.
//!
//! A leaf task snapshots the files matching its glob patterns at invocation
//! time, pushes them through an ordered list of [`Stage`]s and writes the
//! survivors to its bound output directory under the active target root.
//! Stages may also emit auxiliary outputs (generated stylesheet fragments)
//! which land outside the sink, before any dependent task starts.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::stage::{Asset, Stage, StageContext};
use crate::task::{RunContext, TaskReport, TaskResult};

pub struct Pipeline {
    name: &'static str,
    sources: Vec<String>,
    stages: Vec<Box<dyn Stage>>,
    sink: Utf8PathBuf,
    localized: bool,
}

impl Pipeline {
    pub fn new(name: &'static str, sources: Vec<String>, sink: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name,
            sources,
            stages: Vec::new(),
            sink: sink.into(),
            localized: false,
        }
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Fan this pipeline out once per discovered locale, binding each locale
    /// into the stage context and scoping output into a locale subdirectory.
    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn into_runner(self) -> impl Fn(&RunContext) -> TaskResult + Send + Sync + 'static {
        move |cx| self.run(cx)
    }

    pub fn run(&self, cx: &RunContext) -> TaskResult {
        let snapshot = snapshot(&self.sources)?;
        let mut written = Vec::new();

        if self.localized && !cx.locales.is_empty() {
            for locale in cx.locales.iter() {
                if let Some(filter) = cx.locale_filter {
                    if locale.id != filter {
                        continue;
                    }
                }

                let scoped = cx.locale_filter.is_none()
                    && !(cx.config.flatten_default_locale
                        && locale.id == cx.config.default_locale);

                let out_root = if scoped {
                    cx.root.join(&locale.id)
                } else {
                    cx.root.clone()
                };

                written.extend(self.run_once(cx, Some(locale), &out_root, snapshot.clone())?);
            }
        } else {
            written.extend(self.run_once(cx, None, &cx.root, snapshot)?);
        }

        Ok(TaskReport { written })
    }

    fn run_once(
        &self,
        cx: &RunContext,
        locale: Option<&crate::locale::Locale>,
        out_root: &Utf8Path,
        mut set: Vec<Asset>,
    ) -> anyhow::Result<Vec<Utf8PathBuf>> {
        let scx = StageContext {
            config: cx.config,
            target: cx.target,
            locale,
            port: cx.port,
        };

        let mut written = Vec::new();

        for stage in &self.stages {
            let output = stage.apply(&scx, set)?;
            set = output.assets;

            for aux in output.aux {
                if let Some(dir) = aux.path.parent() {
                    fs::create_dir_all(dir)?;
                }
                fs::write(&aux.path, &aux.data)?;
                tracing::debug!("{}: wrote fragment {}", self.name, aux.path);
                written.push(aux.path);
            }
        }

        let dest = out_root.join(&self.sink);

        for asset in set {
            let path = dest.join(&asset.path);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&path, &asset.data)?;
            written.push(path);
        }

        Ok(written)
    }
}

/// Read every file matching the patterns into memory, with paths relative to
/// the static portion of the matching pattern. The snapshot is sorted so a
/// pipeline always observes its inputs in a stable order.
pub(crate) fn snapshot(patterns: &[String]) -> anyhow::Result<Vec<Asset>> {
    let mut assets = Vec::new();

    for pattern in patterns {
        let base = glob_base(pattern);

        for entry in glob::glob(pattern)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if !path.is_file() {
                continue;
            }

            let rel = path.strip_prefix(&base).unwrap_or(&path).to_path_buf();
            let data = fs::read(&path)?;

            assets.push(Asset {
                path: rel,
                source: Some(path),
                data,
            });
        }
    }

    assets.sort_by(|a, b| a.path.cmp(&b.path));
    assets.dedup_by(|a, b| a.path == b.path);

    Ok(assets)
}

/// The static prefix of a glob pattern: every leading component free of
/// wildcard characters.
pub(crate) fn glob_base(pattern: &str) -> Utf8PathBuf {
    let mut base = Utf8PathBuf::new();

    for component in Utf8Path::new(pattern).components() {
        let part = component.as_str();
        if part.contains(['*', '?', '[']) {
            break;
        }
        base.push(part);
    }

    base
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::config::{Config, Target};
    use crate::locale::LocaleSet;
    use crate::stage::{StageOutput, each_asset};
    use crate::workspace::FsWorkspace;

    struct Upper;

    impl Stage for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
            Ok(StageOutput::assets(each_asset("upper", assets, |asset| {
                let text = std::str::from_utf8(&asset.data)?.to_uppercase();
                Ok(asset.with_data(text.into_bytes()))
            })))
        }
    }

    /// Fails on any file whose content contains "bad".
    struct Picky;

    impl Stage for Picky {
        fn name(&self) -> &'static str {
            "picky"
        }

        fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
            Ok(StageOutput::assets(each_asset("picky", assets, |asset| {
                if asset.data.windows(3).any(|w| w == b"bad") {
                    anyhow::bail!("unparseable input");
                }
                Ok(asset)
            })))
        }
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/style/[!_]*.scss"), Utf8PathBuf::from("src/style"));
        assert_eq!(glob_base("src/img/**/*.png"), Utf8PathBuf::from("src/img"));
        assert_eq!(glob_base("src/*.html"), Utf8PathBuf::from("src"));
    }

    #[test]
    fn test_per_file_failure_spares_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let src = root.join("in");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("good.txt"), "fine").unwrap();
        fs::write(src.join("broken.txt"), "bad content").unwrap();

        let pipeline = Pipeline::new(
            "picky",
            vec![format!("{src}/*.txt")],
            "out",
        )
        .stage(Picky)
        .stage(Upper);

        let config = Config::default();
        let locales = LocaleSet::default();
        let cx = RunContext {
            config: &config,
            target: Target::Build,
            root: root.join("dist"),
            locales: &locales,
            locale_filter: None,
            port: None,
            workspace: &FsWorkspace,
        };

        let report = pipeline.run(&cx).unwrap();

        assert_eq!(report.written.len(), 1);
        assert_eq!(
            fs::read_to_string(root.join("dist/out/good.txt")).unwrap(),
            "FINE"
        );
        assert!(!root.join("dist/out/broken.txt").exists());
    }

    #[test]
    fn test_snapshot_is_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let src = root.join("files");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("b.txt"), "b").unwrap();
        fs::write(src.join("a.txt"), "a").unwrap();
        fs::write(src.join("nested/c.txt"), "c").unwrap();

        let assets = snapshot(&[format!("{src}/**/*.txt")]).unwrap();

        let paths: Vec<_> = assets.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, ["a.txt", "b.txt", "nested/c.txt"]);
    }
}
