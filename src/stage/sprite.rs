//! Sprite sheet generation.
//!
//! The raster packer stacks source images into a single sheet and emits a
//! stylesheet fragment with the coordinates as an auxiliary output, so the
//! styles task can `@use` it. The SVG packer combines icons into a symbol
//! sheet, prefixing internal ids per symbol exactly so defs from different
//! icons can't collide.

#[cfg(feature = "image")]
use std::io::Cursor;
use std::sync::LazyLock;

#[cfg(feature = "image")]
use camino::Utf8PathBuf;
use regex::Regex;

#[cfg(feature = "image")]
use crate::stage::Aux;
use crate::stage::{Asset, Stage, StageContext, StageOutput};

#[cfg(feature = "image")]
const PADDING: u32 = 10;

/// Packs raster sprites into a vertical sheet plus a generated SCSS partial.
#[cfg(feature = "image")]
pub struct PackSprites {
    sheet_name: String,
    fragment: Utf8PathBuf,
    /// URL prefix prepended to the sheet name in the generated CSS, relative
    /// to the compiled stylesheet location.
    url_prefix: String,
}

#[cfg(feature = "image")]
impl PackSprites {
    pub fn new(
        sheet_name: impl Into<String>,
        fragment: impl Into<Utf8PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            fragment: fragment.into(),
            url_prefix: url_prefix.into(),
        }
    }
}

#[cfg(feature = "image")]
impl Stage for PackSprites {
    fn name(&self) -> &'static str {
        "sprite"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        if assets.is_empty() {
            return Ok(StageOutput::default());
        }

        let mut decoded = Vec::new();
        for asset in &assets {
            match image::load_from_memory(&asset.data) {
                Ok(img) => {
                    let stem = asset.path.file_stem().unwrap_or("sprite").to_string();
                    decoded.push((stem, img.to_rgba8()));
                }
                Err(e) => {
                    tracing::warn!("sprite: '{}' failed:\n{e:#}", asset.path);
                }
            }
        }

        if decoded.is_empty() {
            return Ok(StageOutput::default());
        }

        let width = decoded.iter().map(|(_, img)| img.width()).max().unwrap();
        let height = decoded.iter().map(|(_, img)| img.height()).sum::<u32>()
            + PADDING * (decoded.len() as u32 - 1);

        let mut sheet = image::RgbaImage::new(width, height);
        let mut scss = String::from("// Generated sprite coordinates, do not edit.\n");
        let mut y = 0u32;

        for (stem, img) in &decoded {
            image::imageops::overlay(&mut sheet, img, 0, y as i64);

            scss.push_str(&format!(
                ".sprite-{stem} {{\n  background-image: url({prefix}{sheet});\n  background-position: 0 -{y}px;\n  width: {w}px;\n  height: {h}px;\n}}\n",
                prefix = self.url_prefix,
                sheet = self.sheet_name,
                w = img.width(),
                h = img.height(),
            ));

            y += img.height() + PADDING;
        }

        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(sheet)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)?;

        Ok(StageOutput {
            assets: vec![Asset::generated(self.sheet_name.clone(), out)],
            aux: vec![Aux {
                path: self.fragment.clone(),
                data: scss.into_bytes(),
            }],
        })
    }
}

static SVG_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<svg\b([^>]*)>(.*)</svg>").expect("invalid regex")
});
static VIEW_BOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"viewBox="([^"]+)""#).expect("invalid regex")
});
static ID_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="([^"]+)""#).expect("invalid regex")
});
static URL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(fill|stroke|mask|filter)="url\(#([^)"]+)\)""#).expect("invalid regex")
});

/// Combines SVG icons into one `<symbol>` sheet addressable by file stem.
pub struct SvgSymbolSheet {
    sheet_name: String,
}

impl SvgSymbolSheet {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
        }
    }
}

impl Stage for SvgSymbolSheet {
    fn name(&self) -> &'static str {
        "svg-sprite"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        if assets.is_empty() {
            return Ok(StageOutput::default());
        }

        let mut sheet =
            String::from(r#"<svg xmlns="http://www.w3.org/2000/svg" style="display:none">"#);

        for asset in &assets {
            let stem = asset.path.file_stem().unwrap_or("icon");

            let text = match asset.text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("svg-sprite: '{}' failed:\n{e:#}", asset.path);
                    continue;
                }
            };

            let Some(root) = SVG_ROOT.captures(text) else {
                tracing::warn!("svg-sprite: '{}' has no <svg> root, skipped", asset.path);
                continue;
            };

            let attrs = root.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = root.get(2).map(|m| m.as_str()).unwrap_or("");

            // Internal ids get a per-symbol prefix so gradients and masks
            // from different icons can't shadow each other on one page.
            let body = ID_ATTR.replace_all(body, |caps: &regex::Captures| {
                format!(r#"id="{stem}-{}""#, &caps[1])
            });
            let body = URL_REF.replace_all(&body, |caps: &regex::Captures| {
                format!(r#"{}="url(#{stem}-{})""#, &caps[1], &caps[2])
            });

            let view_box = VIEW_BOX
                .captures(attrs)
                .map(|caps| format!(r#" viewBox="{}""#, &caps[1]))
                .unwrap_or_default();

            sheet.push_str(&format!(r#"<symbol id="{stem}"{view_box}>{body}</symbol>"#));
        }

        sheet.push_str("</svg>");

        Ok(StageOutput::assets(vec![Asset::generated(
            self.sheet_name.clone(),
            sheet.into_bytes(),
        )]))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::config::{Config, Target};

    fn context(config: &Config) -> StageContext<'_> {
        StageContext {
            config,
            target: Target::Build,
            locale: None,
            port: None,
        }
    }

    #[cfg(feature = "image")]
    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([255, 0, 0, 255]),
        ));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_sheet_layout_and_fragment() {
        let assets = vec![
            Asset::generated("arrow.png", png(16, 8)),
            Asset::generated("cart.png", png(10, 20)),
        ];

        let config = Config::default();
        let stage = PackSprites::new("sprite.png", "frag/_sprites.scss", "../img/");
        let out = stage.apply(&context(&config), assets).unwrap();

        assert_eq!(out.assets.len(), 1);
        assert_eq!(out.assets[0].path, "sprite.png");

        let sheet = image::load_from_memory(&out.assets[0].data).unwrap();
        assert_eq!(sheet.width(), 16);
        assert_eq!(sheet.height(), 8 + PADDING + 20);

        assert_eq!(out.aux.len(), 1);
        let scss = std::str::from_utf8(&out.aux[0].data).unwrap();
        assert!(scss.contains(".sprite-arrow"));
        assert!(scss.contains("background-position: 0 -0px"));
        assert!(scss.contains(&format!("background-position: 0 -{}px", 8 + PADDING)));
        assert!(scss.contains("url(../img/sprite.png)"));
    }

    #[test]
    fn test_symbol_sheet_prefixes_ids() {
        let icon = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24">
            <linearGradient id="grad"/>
            <rect fill="url(#grad)" width="24" height="24"/>
        </svg>"##;

        let assets = vec![Asset::generated("logo.svg", icon.as_bytes().to_vec())];

        let config = Config::default();
        let out = SvgSymbolSheet::new("symbols.svg")
            .apply(&context(&config), assets)
            .unwrap();

        let text = out.assets[0].text().unwrap();
        assert!(text.contains(r#"<symbol id="logo" viewBox="0 0 24 24">"#));
        assert!(text.contains(r#"id="logo-grad""#));
        assert!(text.contains(r#"fill="url(#logo-grad)""#));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_empty_input_produces_nothing() {
        let config = Config::default();
        let out = PackSprites::new("sprite.png", "frag/_sprites.scss", "../img/")
            .apply(&context(&config), vec![])
            .unwrap();

        assert!(out.assets.is_empty());
        assert!(out.aux.is_empty());
    }
}
