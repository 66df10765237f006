use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;

/// The build target active for a single invocation. Exactly one target is
/// active per run; it selects the output root and the minification and
/// revisioning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Fast, unminified, source-mapped output for local development.
    Build,
    /// Minified, revisioned output for production.
    Deploy,
}

/// An association between a task and its input glob patterns plus the output
/// directory, relative to the active target root. Watch patterns are usually
/// broader than the entry globs: a stylesheet partial never compiles on its
/// own but editing it must still rebuild the entries.
#[derive(Debug, Clone, Deserialize)]
pub struct Binding {
    pub sources: Vec<String>,
    pub dest: Utf8PathBuf,
    #[serde(default)]
    pub watch: Vec<String>,
}

impl Binding {
    fn new(sources: &[&str], dest: &str, watch: &[&str]) -> Self {
        Self {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            dest: dest.into(),
            watch: watch.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The patterns the watcher observes for this binding.
    pub fn watch_patterns(&self) -> &[String] {
        if self.watch.is_empty() {
            &self.sources
        } else {
            &self.watch
        }
    }
}

/// Feature toggles deciding which tasks exist in the planned graph.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Generate a raster sprite sheet plus a stylesheet fragment.
    pub sprites: bool,
    /// Generate an SVG symbol sheet.
    pub svg_sprites: bool,
    /// Generate an icon font from glyph SVGs (external tool).
    pub icon_font: bool,
    /// Bundle scripts with esbuild; otherwise resolve include directives.
    pub bundler: bool,
    /// Push reload signals to connected browsers in watch mode.
    pub live_reload: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            sprites: true,
            svg_sprites: true,
            icon_font: true,
            bundler: true,
            live_reload: true,
        }
    }
}

/// Per-asset-class glob bindings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub templates: Binding,
    pub styles: Binding,
    pub scripts: Binding,
    pub images: Binding,
    pub svg: Binding,
    pub sprites: Binding,
    pub svg_sprites: Binding,
    pub icon_glyphs: Binding,
    pub fonts: Binding,
    pub copy: Binding,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            templates: Binding::new(&["src/*.html"], "", &["src/**/*.html"]),
            styles: Binding::new(
                &["src/style/[!_]*.scss"],
                "css",
                &["src/style/**/*.scss"],
            ),
            scripts: Binding::new(&["src/js/*.js"], "js", &["src/js/**/*.js"]),
            images: Binding::new(&["src/img/**/*.*"], "img", &[]),
            svg: Binding::new(&["src/svg/**/*.svg"], "img/svg", &[]),
            sprites: Binding::new(
                &["src/sprite/**/*.png", "src/sprite/**/*.jpg"],
                "img",
                &[],
            ),
            svg_sprites: Binding::new(&["src/sprite_svg/*.svg"], "img/svg", &[]),
            icon_glyphs: Binding::new(&["src/svgico/*.svg"], "fonts/icons", &[]),
            fonts: Binding::new(&["src/fonts/**/*.*"], "fonts", &[]),
            copy: Binding::new(&["src/copy/**/*.*"], "", &[]),
        }
    }
}

/// The immutable configuration of a site. Constructed once at startup and
/// passed by reference into every component; nothing reads it through a
/// global.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the source tree; the watcher observes this directory.
    pub source_root: Utf8PathBuf,
    /// Output root for the development target.
    pub build_root: Utf8PathBuf,
    /// Output root for the deploy target.
    pub deploy_root: Utf8PathBuf,
    /// Staging and artifact directory for the archive target.
    pub archive_root: Utf8PathBuf,
    /// Directory scanned for `<locale>.json` definition files.
    pub locales_dir: Utf8PathBuf,
    /// Directory receiving generated stylesheet fragments (sprite
    /// coordinates, icon glyph classes) consumed by the styles task.
    pub fragments_dir: Utf8PathBuf,
    /// Locale used when no definitions are discovered, and the one that may
    /// be flattened to the root of the output tree.
    pub default_locale: String,
    /// Write the default locale at the output root instead of its own
    /// subdirectory.
    pub flatten_default_locale: bool,
    /// Product identifier, names archive artifacts.
    pub product: String,
    /// External command generating the icon font.
    pub icon_font_tool: String,
    /// Preferred port for the live-reload websocket.
    pub reload_port: u16,
    /// Port for the development HTTP server.
    pub server_port: u16,
    pub features: Features,
    pub paths: Paths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_root: "src".into(),
            build_root: "build".into(),
            deploy_root: "www".into(),
            archive_root: "archive".into(),
            locales_dir: "src/locales".into(),
            fragments_dir: "src/style/partials".into(),
            default_locale: "en".into(),
            flatten_default_locale: true,
            product: "site".into(),
            icon_font_tool: "fantasticon".into(),
            reload_port: 1337,
            server_port: 8080,
            features: Features::default(),
            paths: Paths::default(),
        }
    }
}

impl Config {
    /// Load a configuration file layered over the defaults.
    pub fn from_file(path: impl AsRef<Utf8Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Every output directory must stay under its target root and no target
    /// root may live inside the source tree, so a task can never consume its
    /// own output.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for root in [&self.build_root, &self.deploy_root, &self.archive_root] {
            if root.starts_with(&self.source_root) {
                return Err(ConfigError::RootInSource(root.clone()));
            }
        }

        for binding in self.bindings() {
            if binding.dest.is_absolute() || binding.dest.components().any(|c| c.as_str() == "..")
            {
                return Err(ConfigError::OutputEscapesRoot(binding.dest.clone()));
            }
        }

        Ok(())
    }

    pub(crate) fn bindings(&self) -> impl Iterator<Item = &Binding> {
        [
            &self.paths.templates,
            &self.paths.styles,
            &self.paths.scripts,
            &self.paths.images,
            &self.paths.svg,
            &self.paths.sprites,
            &self.paths.svg_sprites,
            &self.paths.icon_glyphs,
            &self.paths.fonts,
            &self.paths.copy,
        ]
        .into_iter()
    }

    pub(crate) fn target_root(&self, target: Target) -> &Utf8Path {
        match target {
            Target::Build => &self.build_root,
            Target::Deploy => &self.deploy_root,
        }
    }
}
