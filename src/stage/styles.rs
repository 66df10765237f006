//! Stylesheet compilation and post-processing.

use anyhow::{anyhow, bail};

use crate::config::Target;
use crate::stage::{Asset, Stage, StageContext, StageOutput, each_asset};

/// Compiles SCSS entry files with grass. Partials resolve relative to each
/// entry file, which also covers generated fragments (sprite coordinates,
/// icon glyph classes) dropped into the source tree by producer tasks.
pub struct CompileStyles;

impl Stage for CompileStyles {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        let assets = each_asset(self.name(), assets, |asset| {
            let Some(source) = asset.source.clone() else {
                bail!("stylesheet compilation requires an on-disk entry file");
            };

            let css = grass::from_path(&source, &grass::Options::default())
                .map_err(|e| anyhow!("{e}"))?;

            Ok(asset.with_data(css.into_bytes()).with_extension("css"))
        });

        Ok(StageOutput::assets(assets))
    }
}

/// Post-processes compiled CSS with lightningcss: vendor prefixing, rule and
/// media-query merging, and minification on the deploy target.
#[cfg(feature = "lightningcss")]
pub struct PostProcess;

#[cfg(feature = "lightningcss")]
impl Stage for PostProcess {
    fn name(&self) -> &'static str {
        "postprocess"
    }

    fn apply(&self, cx: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

        let minify = cx.target == Target::Deploy;

        let assets = each_asset(self.name(), assets, |asset| {
            let source = asset.text()?.to_string();

            let mut sheet = StyleSheet::parse(&source, ParserOptions::default())
                .map_err(|e| anyhow!("{e}"))?;
            sheet
                .minify(MinifyOptions::default())
                .map_err(|e| anyhow!("{e}"))?;

            let output = sheet
                .to_css(PrinterOptions {
                    minify,
                    ..PrinterOptions::default()
                })
                .map_err(|e| anyhow!("{e}"))?;

            let code = output.code;
            Ok(asset.with_data(code.into_bytes()))
        });

        Ok(StageOutput::assets(assets))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use std::fs;

    use crate::config::Config;

    fn context(config: &Config, target: Target) -> StageContext<'_> {
        StageContext {
            config,
            target,
            locale: None,
            port: None,
        }
    }

    #[test]
    fn test_compile_resolves_partials_relative_to_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("_colors.scss"), "$accent: #ff0000;").unwrap();
        fs::write(
            root.join("main.scss"),
            "@use 'colors';\nbody { color: colors.$accent; }\n",
        )
        .unwrap();

        let config = Config::default();
        let assets = crate::pipeline::snapshot(&[format!("{root}/[!_]*.scss")]).unwrap();
        let out = CompileStyles
            .apply(&context(&config, Target::Build), assets)
            .unwrap();

        assert_eq!(out.assets.len(), 1);
        assert_eq!(out.assets[0].path, "main.css");
        assert!(out.assets[0].text().unwrap().contains("#ff0000"));
    }

    #[test]
    fn test_invalid_scss_is_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::write(root.join("ok.scss"), "body { margin: 0 }").unwrap();
        fs::write(root.join("broken.scss"), "body { margin: }").unwrap();

        let config = Config::default();
        let assets = crate::pipeline::snapshot(&[format!("{root}/*.scss")]).unwrap();
        let out = CompileStyles
            .apply(&context(&config, Target::Build), assets)
            .unwrap();

        assert_eq!(out.assets.len(), 1);
        assert_eq!(out.assets[0].path, "ok.css");
    }

    #[cfg(feature = "lightningcss")]
    #[test]
    fn test_postprocess_minifies_on_deploy() {
        let css = b"body {\n  margin: 0px;\n}\n".to_vec();
        let config = Config::default();

        let dev = PostProcess
            .apply(
                &context(&config, Target::Build),
                vec![Asset::generated("a.css", css.clone())],
            )
            .unwrap();
        let prod = PostProcess
            .apply(
                &context(&config, Target::Deploy),
                vec![Asset::generated("a.css", css)],
            )
            .unwrap();

        let dev_text = dev.assets[0].text().unwrap().to_string();
        let prod_text = prod.assets[0].text().unwrap().to_string();

        assert!(prod_text.len() < dev_text.len());
        assert!(!prod_text.contains('\n'));
    }
}
