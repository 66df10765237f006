//! Raster and vector image optimization.

#[cfg(feature = "image")]
use std::io::Cursor;
use std::sync::LazyLock;

use regex::Regex;

use crate::stage::{Asset, Stage, StageContext, StageOutput, each_asset};

/// Re-encodes raster images in place, stripping metadata. Animated GIFs and
/// formats the decoder doesn't handle pass through untouched.
#[cfg(feature = "image")]
pub struct OptimizeRaster;

#[cfg(feature = "image")]
impl Stage for OptimizeRaster {
    fn name(&self) -> &'static str {
        "images"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        let assets = each_asset(self.name(), assets, |asset| {
            let format = match image::guess_format(&asset.data) {
                Ok(format) => format,
                Err(_) => return Ok(asset),
            };

            if matches!(format, image::ImageFormat::Gif) {
                return Ok(asset);
            }

            let decoded = image::load_from_memory(&asset.data)?;

            let mut out = Vec::new();
            decoded.write_to(&mut Cursor::new(&mut out), format)?;

            Ok(asset.with_data(out))
        });

        Ok(StageOutput::assets(assets))
    }
}

static XML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("invalid regex"));
static METADATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<metadata\b.*?</metadata>").expect("invalid regex"));
static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("invalid regex"));

/// Textual SVG cleanup: comments and metadata stripped, inter-tag whitespace
/// collapsed. The heavy optimization lives in the upstream editors; this
/// keeps shipped markup lean without touching geometry.
pub struct OptimizeSvg;

impl Stage for OptimizeSvg {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        let assets = each_asset(self.name(), assets, |asset| {
            let text = asset.text()?;
            let text = XML_COMMENT.replace_all(text, "");
            let text = METADATA.replace_all(&text, "");
            let text = BETWEEN_TAGS.replace_all(&text, "><");
            let text = text.trim().to_string();

            Ok(asset.with_data(text.into_bytes()))
        });

        Ok(StageOutput::assets(assets))
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

    #[test]
    fn test_svg_cleanup() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <!-- an editor comment -->
            <metadata>export info</metadata>
            <circle r="4"/>
        </svg>"#;

        let config = Config::default();
        let out = OptimizeSvg
            .apply(
                &context(&config),
                vec![Asset::generated("dot.svg", svg.as_bytes().to_vec())],
            )
            .unwrap();

        let text = out.assets[0].text().unwrap();
        assert!(!text.contains("comment"));
        assert!(!text.contains("metadata"));
        assert!(text.contains(r#"<circle r="4"/>"#));
        assert!(text.starts_with("<svg"));
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_undecodable_raster_passes_through() {
        let config = Config::default();
        let data = b"not an image at all".to_vec();
        let out = OptimizeRaster
            .apply(
                &context(&config),
                vec![Asset::generated("weird.bin", data.clone())],
            )
            .unwrap();

        assert_eq!(out.assets[0].data, data);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_png_survives_reencoding() {
        use image::{DynamicImage, RgbaImage};

        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([10, 20, 30, 255]),
        ));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let config = Config::default();
        let out = OptimizeRaster
            .apply(&context(&config), vec![Asset::generated("px.png", png)])
            .unwrap();

        let decoded = image::load_from_memory(&out.assets[0].data).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0, [10, 20, 30, 255]);
    }
}
