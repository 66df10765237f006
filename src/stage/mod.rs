//! Transformation stages.
//!
//! A [`Stage`] consumes the in-flight file set of a pipeline and emits the
//! next one, optionally with auxiliary outputs written outside the sink. A
//! failure on a single file is logged and drops that file only; a failure of
//! the stage as a whole fails the owning task.

use camino::Utf8PathBuf;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::config::{Config, Target};
use crate::locale::Locale;

pub mod iconfont;
pub mod images;
pub mod scripts;
pub mod sprite;
#[cfg(feature = "grass")]
pub mod styles;
#[cfg(feature = "minijinja")]
pub mod templates;

/// A file travelling through a pipeline.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Path relative to the pipeline's glob base; becomes the path under the
    /// sink directory.
    pub path: Utf8PathBuf,
    /// The file this asset was snapshotted from, if any. Generated assets
    /// (a packed sprite sheet) have none.
    pub source: Option<Utf8PathBuf>,
    pub data: Vec<u8>,
}

impl Asset {
    pub fn generated(path: impl Into<Utf8PathBuf>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            source: None,
            data,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_extension(mut self, ext: &str) -> Self {
        self.path = self.path.with_extension(ext);
        self
    }

    pub fn text(&self) -> anyhow::Result<&str> {
        Ok(std::str::from_utf8(&self.data)?)
    }
}

/// An auxiliary output: a workspace path plus contents, written before the
/// owning task completes so dependent tasks can consume it.
#[derive(Debug, Clone)]
pub struct Aux {
    pub path: Utf8PathBuf,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct StageOutput {
    pub assets: Vec<Asset>,
    pub aux: Vec<Aux>,
}

impl StageOutput {
    pub fn assets(assets: Vec<Asset>) -> Self {
        Self {
            assets,
            aux: Vec::new(),
        }
    }
}

/// Read-only context available to every stage invocation.
pub struct StageContext<'a> {
    pub config: &'a Config,
    pub target: Target,
    /// Locale bound for this pass, when the pipeline fans out per locale.
    pub locale: Option<&'a Locale>,
    /// Live-reload websocket port, when a watch session is active.
    pub port: Option<u16>,
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, cx: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput>;
}

/// Apply `f` to every asset in parallel. A failing file is logged with its
/// path and excluded from the output; siblings continue.
pub(crate) fn each_asset<F>(stage: &str, assets: Vec<Asset>, f: F) -> Vec<Asset>
where
    F: (Fn(Asset) -> anyhow::Result<Asset>) + Send + Sync,
{
    assets
        .into_par_iter()
        .filter_map(|asset| {
            let path = asset.path.clone();
            match f(asset) {
                Ok(asset) => Some(asset),
                Err(e) => {
                    tracing::warn!("{stage}: '{path}' failed:\n{e:#}");
                    None
                }
            }
        })
        .collect()
}

/// The script a page can embed to subscribe to the live-reload channel.
pub fn refresh_script(port: u16) -> String {
    format!(
        r#"
const socket = new WebSocket("ws://localhost:{port}");
socket.addEventListener("message", event => {{
    if (event.data === "refresh:css") {{
        for (const link of document.querySelectorAll("link[rel=stylesheet]")) {{
            link.href = link.href.split("?")[0] + "?t=" + Date.now();
        }}
    }} else {{
        window.location.reload();
    }}
}});
"#
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_each_asset_drops_failures_in_order() {
        let assets = vec![
            Asset::generated("a.txt", b"1".to_vec()),
            Asset::generated("b.txt", b"x".to_vec()),
            Asset::generated("c.txt", b"2".to_vec()),
        ];

        let out = each_asset("test", assets, |asset| {
            if asset.data == b"x" {
                anyhow::bail!("nope");
            }
            Ok(asset)
        });

        let paths: Vec<_> = out.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, ["a.txt", "c.txt"]);
    }
}
