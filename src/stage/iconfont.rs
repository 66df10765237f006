//! Icon font generation.
//!
//! The generator is an external collaborator invoked through a stable
//! contract: glyph SVGs go into a scratch directory, the tool is run with
//! `<tool> <glyphs> -o <out>`, and whatever it produces is collected: font
//! files join the asset set, generated stylesheets become the fragment the
//! styles task consumes. A missing tool fails the task, never the process.

use std::fs;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail};
use camino::Utf8PathBuf;

use crate::stage::{Asset, Aux, Stage, StageContext, StageOutput};

const FONT_EXTENSIONS: &[&str] = &["ttf", "eot", "woff", "woff2", "svg"];

pub struct IconFont {
    tool: String,
    fragment: Utf8PathBuf,
}

impl IconFont {
    pub fn new(tool: impl Into<String>, fragment: impl Into<Utf8PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            fragment: fragment.into(),
        }
    }
}

impl Stage for IconFont {
    fn name(&self) -> &'static str {
        "icon-font"
    }

    fn apply(&self, _: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        if assets.is_empty() {
            return Ok(StageOutput::default());
        }

        which::which(&self.tool)
            .map_err(|_| anyhow!("'{}' is not available in the environment", self.tool))?;

        let scratch = std::env::temp_dir().join(format!("karakuri-fico-{}", std::process::id()));
        let scratch = Utf8PathBuf::try_from(scratch)?;
        let glyphs = scratch.join("glyphs");
        let out = scratch.join("out");

        let result = self.generate(&glyphs, &out, &assets);

        // Scratch space is disposable either way.
        let _ = fs::remove_dir_all(&scratch);

        result
    }
}

impl IconFont {
    fn generate(
        &self,
        glyphs: &Utf8PathBuf,
        out: &Utf8PathBuf,
        assets: &[Asset],
    ) -> anyhow::Result<StageOutput> {
        fs::create_dir_all(glyphs)?;
        fs::create_dir_all(out)?;

        for asset in assets {
            let name = asset.path.file_name().unwrap_or("glyph.svg");
            fs::write(glyphs.join(name), &asset.data)?;
        }

        let output = Command::new(&self.tool)
            .arg(glyphs.as_str())
            .arg("-o")
            .arg(out.as_str())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            bail!(
                "'{}' failed:\n{}",
                self.tool,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let mut fonts = Vec::new();
        let mut aux = Vec::new();

        let mut entries: Vec<_> = fs::read_dir(out)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .collect();
        entries.sort();

        for path in entries {
            let path = Utf8PathBuf::try_from(path)?;
            let Some(ext) = path.extension() else {
                continue;
            };

            let data = fs::read(&path)?;
            let name = path.file_name().unwrap_or_default().to_string();

            if FONT_EXTENSIONS.contains(&ext) {
                fonts.push(Asset::generated(name, data));
            } else if matches!(ext, "scss" | "css") {
                aux.push(Aux {
                    path: self.fragment.clone(),
                    data,
                });
            }
        }

        if fonts.is_empty() {
            bail!("'{}' produced no font files", self.tool);
        }

        Ok(StageOutput { assets: fonts, aux })
    }
}
