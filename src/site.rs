use std::sync::Arc;

use camino::Utf8PathBuf;
use console::style;

use crate::archive;
use crate::config::{Config, Target};
use crate::error::KarakuriError;
use crate::executor::{self, RunSummary};
use crate::locale::LocaleSet;
use crate::plan::plan;
use crate::task::{Registry, RunContext};
use crate::workspace::{FsWorkspace, Workspace};

/// A configured site: the immutable [`Config`], the locales discovered at
/// startup and the task registry planned from both. This is the invocation
/// surface: `build`, `deploy`, `archive`, `watch` and partial per-task runs.
pub struct Site {
    config: Config,
    locales: LocaleSet,
    registry: Registry,
    workspace: Arc<dyn Workspace>,
}

impl Site {
    pub fn new(config: Config) -> Result<Self, KarakuriError> {
        config.validate()?;

        let locales = LocaleSet::discover(&config.locales_dir)?;
        let registry = plan(&config)?;

        Ok(Self {
            config,
            locales,
            registry,
            workspace: Arc::new(FsWorkspace),
        })
    }

    /// Swap the filesystem collaborator, mainly for tests.
    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn locales(&self) -> &LocaleSet {
        &self.locales
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Full clean build into the development root.
    pub fn build(&self) -> Result<RunSummary, KarakuriError> {
        crate::utils::init_logging();
        eprintln!(
            "Running {} in {} mode.",
            style("karakuri").red(),
            style("build").blue()
        );

        self.run_scoped("build", Target::Build, None, None)
    }

    /// Full clean build into the production root, minified and revisioned.
    pub fn deploy(&self) -> Result<RunSummary, KarakuriError> {
        crate::utils::init_logging();
        eprintln!(
            "Running {} in {} mode.",
            style("karakuri").red(),
            style("deploy").blue()
        );

        self.run_scoped("deploy", Target::Deploy, None, None)
    }

    /// Partial build: one named task (plus its in-graph prerequisites),
    /// development target, no clean.
    pub fn run(&self, name: &str) -> Result<RunSummary, KarakuriError> {
        self.run_scoped(name, Target::Build, None, None)
    }

    /// Per-locale deploy staged into isolated directories and packed into
    /// one zip artifact each. Returns the artifact paths.
    pub fn archive(&self) -> Result<Vec<Utf8PathBuf>, KarakuriError> {
        crate::utils::init_logging();

        if self.locales.is_empty() {
            return Err(KarakuriError::NoLocales);
        }

        eprintln!(
            "Running {} in {} mode ({} locales).",
            style("karakuri").red(),
            style("archive").blue(),
            self.locales.len()
        );

        self.workspace.clear_tree(&self.config.archive_root)?;

        // Shared asset baseline, built once.
        let shared = self.config.archive_root.join("shared");
        let summary = self.run_in_root("static", Target::Deploy, shared.clone(), None, None)?;
        if !summary.success() {
            tracing::warn!("Shared asset build finished with failures");
        }

        let mut artifacts = Vec::new();

        for locale in self.locales.iter() {
            let staging = self.config.archive_root.join(&locale.id);
            self.workspace.copy_tree(&shared, &staging)?;

            let summary = self.run_in_root(
                "templates",
                Target::Deploy,
                staging.clone(),
                Some(&locale.id),
                None,
            )?;
            if !summary.success() {
                tracing::warn!("Locale '{}' build finished with failures", locale.id);
            }

            self.run_in_root("revision", Target::Deploy, staging.clone(), None, None)?;

            let artifact = self
                .config
                .archive_root
                .join(format!("{}-{}.zip", self.config.product, locale.id));
            archive::pack_dir(&staging, &artifact)?;
            artifacts.push(artifact);
        }

        Ok(artifacts)
    }

    /// Snapshot the deploy root with git (add, commit, push).
    pub fn push(&self) -> Result<(), KarakuriError> {
        archive::git_snapshot(&self.config.deploy_root)
    }

    /// Build once, then hold the process open watching the source tree and
    /// live-reloading connected browsers. Runs until the process ends.
    #[cfg(feature = "live")]
    pub fn watch(&self) -> Result<(), KarakuriError> {
        crate::utils::init_logging();
        eprintln!(
            "Running {} in {} mode.",
            style("karakuri").red(),
            style("watch").blue()
        );

        crate::watch::watch(self)
    }

    pub(crate) fn run_scoped(
        &self,
        name: &str,
        target: Target,
        locale_filter: Option<&str>,
        port: Option<u16>,
    ) -> Result<RunSummary, KarakuriError> {
        let root = self.config.target_root(target).to_path_buf();
        self.run_in_root(name, target, root, locale_filter, port)
    }

    fn run_in_root(
        &self,
        name: &str,
        target: Target,
        root: Utf8PathBuf,
        locale_filter: Option<&str>,
        port: Option<u16>,
    ) -> Result<RunSummary, KarakuriError> {
        let blueprint = self.registry.lower(name)?;

        let cx = RunContext {
            config: &self.config,
            target,
            root,
            locales: &self.locales,
            locale_filter,
            port,
            workspace: &*self.workspace,
        };

        Ok(executor::run(&blueprint, &cx))
    }
}
