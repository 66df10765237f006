//! The planner: a pure function from configuration to the task registry.
//!
//! Feature toggles decide which leaf tasks exist and which composites
//! include them; nothing is spliced in or out at execution time. The
//! resulting registry (and any graph lowered from it) is inspectable and
//! testable without running a single task.

use camino::Utf8PathBuf;

use crate::config::Config;
use crate::error::RegistryError;
use crate::pipeline::{Pipeline, glob_base};
use crate::revision;
use crate::stage::iconfont::IconFont;
use crate::stage::images::OptimizeSvg;
use crate::stage::scripts::{BundleScripts, IncludeScripts};
use crate::stage::sprite::SvgSymbolSheet;
use crate::task::{Compose, Registry, TaskReport};

/// Build the task registry for a configuration.
pub fn plan(config: &Config) -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    let paths = &config.paths;

    registry.register("clean", |cx: &crate::task::RunContext| {
        cx.workspace.clear_tree(&cx.root)?;
        Ok(TaskReport::default())
    })?;

    // Templates fan out per locale; includes resolve against the glob base.
    {
        let base = template_base(config);
        let pipeline = Pipeline::new(
            "templates",
            paths.templates.sources.clone(),
            paths.templates.dest.clone(),
        )
        .localized();

        #[cfg(feature = "minijinja")]
        let pipeline = pipeline.stage(crate::stage::templates::RenderTemplates::new(base));
        #[cfg(not(feature = "minijinja"))]
        let _ = base;

        registry.register("templates", pipeline.into_runner())?;
    }

    {
        let pipeline = Pipeline::new(
            "styles",
            paths.styles.sources.clone(),
            paths.styles.dest.clone(),
        );

        #[cfg(feature = "grass")]
        let pipeline = pipeline.stage(crate::stage::styles::CompileStyles);

        #[cfg(all(feature = "grass", feature = "lightningcss"))]
        let pipeline = pipeline.stage(crate::stage::styles::PostProcess);

        registry.register("styles", pipeline.into_runner())?;
    }

    {
        let pipeline = Pipeline::new(
            "scripts",
            paths.scripts.sources.clone(),
            paths.scripts.dest.clone(),
        );

        let pipeline = if config.features.bundler {
            pipeline.stage(BundleScripts)
        } else {
            pipeline.stage(IncludeScripts)
        };

        registry.register("scripts", pipeline.into_runner())?;
    }

    {
        let pipeline = Pipeline::new(
            "raster",
            paths.images.sources.clone(),
            paths.images.dest.clone(),
        );

        #[cfg(feature = "image")]
        let pipeline = pipeline.stage(crate::stage::images::OptimizeRaster);

        registry.register("raster", pipeline.into_runner())?;
    }

    registry.register(
        "svg",
        Pipeline::new("svg", paths.svg.sources.clone(), paths.svg.dest.clone())
            .stage(OptimizeSvg)
            .into_runner(),
    )?;

    registry.register(
        "fonts",
        Pipeline::new(
            "fonts",
            paths.fonts.sources.clone(),
            paths.fonts.dest.clone(),
        )
        .into_runner(),
    )?;

    registry.register(
        "copy",
        Pipeline::new("copy", paths.copy.sources.clone(), paths.copy.dest.clone()).into_runner(),
    )?;

    let sprites = sprites_enabled(config);
    #[cfg(feature = "image")]
    if sprites {
        registry.register(
            "sprite",
            Pipeline::new(
                "sprite",
                paths.sprites.sources.clone(),
                paths.sprites.dest.clone(),
            )
            .stage(crate::stage::sprite::PackSprites::new(
                "sprite.png",
                config.fragments_dir.join("_sprites.scss"),
                format!("../{}/", paths.sprites.dest),
            ))
            .into_runner(),
        )?;
        registry.order("sprite", "styles")?;
    }

    if config.features.svg_sprites {
        registry.register(
            "sprite-svg",
            Pipeline::new(
                "sprite-svg",
                paths.svg_sprites.sources.clone(),
                paths.svg_sprites.dest.clone(),
            )
            .stage(OptimizeSvg)
            .stage(SvgSymbolSheet::new("symbols.svg"))
            .into_runner(),
        )?;
    }

    if config.features.icon_font {
        registry.register(
            "icon-font",
            Pipeline::new(
                "icon-font",
                paths.icon_glyphs.sources.clone(),
                paths.icon_glyphs.dest.clone(),
            )
            .stage(OptimizeSvg)
            .stage(IconFont::new(
                config.icon_font_tool.clone(),
                config.fragments_dir.join("_font-icons.scss"),
            ))
            .into_runner(),
        )?;
        registry.order("icon-font", "styles")?;
    }

    registry.register("revision", |cx: &crate::task::RunContext| {
        let manifest = revision::revise(&cx.root)?;
        Ok(TaskReport {
            written: manifest.hashed_paths(&cx.root),
        })
    })?;

    // The image suite: sheet producers strictly before the raster pass.
    let mut images: Vec<&str> = Vec::new();
    if sprites {
        images.push("sprite");
    }
    if config.features.svg_sprites {
        images.push("sprite-svg");
    }
    images.push("raster");
    registry.compose("images", Compose::Series, &images)?;

    let mut statics: Vec<&str> = vec!["styles", "scripts"];
    if config.features.icon_font {
        statics.push("icon-font");
    }
    statics.extend(["fonts", "copy", "images", "svg"]);
    registry.compose("static", Compose::Parallel, &statics)?;

    let mut assets = vec!["templates"];
    assets.extend(statics.iter().copied());
    registry.compose("assets", Compose::Parallel, &assets)?;

    registry.compose("build", Compose::Series, &["clean", "assets"])?;
    registry.compose("deploy", Compose::Series, &["clean", "assets", "revision"])?;

    Ok(registry)
}

fn sprites_enabled(config: &Config) -> bool {
    cfg!(feature = "image") && config.features.sprites
}

pub(crate) fn template_base(config: &Config) -> Utf8PathBuf {
    config
        .paths
        .templates
        .sources
        .first()
        .map(|p| glob_base(p))
        .unwrap_or_else(|| config.source_root.clone())
}

#[cfg(test)]
mod test {
    use super::*;

    use petgraph::Direction;

    #[test]
    fn test_default_plan_composes_the_full_graph() {
        let registry = plan(&Config::default()).unwrap();
        let blueprint = registry.lower("build").unwrap();

        let mut names = blueprint.task_names();
        names.sort();

        assert!(names.contains(&"clean"));
        assert!(names.contains(&"templates"));
        assert!(names.contains(&"styles"));
        assert!(names.contains(&"sprite"));
        assert!(names.contains(&"icon-font"));
        assert!(!names.contains(&"revision"));
    }

    #[test]
    fn test_toggles_splice_tasks_out() {
        let mut config = Config::default();
        config.features.sprites = false;
        config.features.svg_sprites = false;
        config.features.icon_font = false;

        let registry = plan(&config).unwrap();
        let blueprint = registry.lower("build").unwrap();
        let names = blueprint.task_names();

        assert!(!names.contains(&"sprite"));
        assert!(!names.contains(&"sprite-svg"));
        assert!(!names.contains(&"icon-font"));
        assert!(names.contains(&"raster"));
    }

    #[test]
    fn test_fragment_producers_precede_styles() {
        let registry = plan(&Config::default()).unwrap();
        let blueprint = registry.lower("build").unwrap();
        let graph = &blueprint.graph;

        let find = |name: &str| {
            graph
                .node_indices()
                .find(|&i| graph[i].name == name)
                .unwrap()
        };

        let styles = find("styles");
        let producers: Vec<_> = graph
            .neighbors_directed(styles, Direction::Incoming)
            .map(|i| graph[i].name.clone())
            .collect();

        assert!(producers.contains(&"sprite".to_string()));
        assert!(producers.contains(&"icon-font".to_string()));
    }

    #[test]
    fn test_deploy_revisions_after_every_producer() {
        let registry = plan(&Config::default()).unwrap();
        let blueprint = registry.lower("deploy").unwrap();
        let graph = &blueprint.graph;

        let revision = graph
            .node_indices()
            .find(|&i| graph[i].name == "revision")
            .unwrap();

        let incoming = graph
            .neighbors_directed(revision, Direction::Incoming)
            .count();

        // The eight sinks of the asset suite feed the barrier; the sprite
        // and symbol-sheet producers reach it transitively through their
        // consumers.
        assert_eq!(incoming, 8);
    }

    #[test]
    fn test_partial_runs_stay_minimal() {
        let registry = plan(&Config::default()).unwrap();
        let blueprint = registry.lower("styles").unwrap();

        assert_eq!(blueprint.task_names(), ["styles"]);
    }
}
