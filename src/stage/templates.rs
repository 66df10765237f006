//! Template rendering with internationalization substitution.

use camino::Utf8PathBuf;
use minijinja::value::Value;
use minijinja::{Environment, context, path_loader};

use crate::stage::{Asset, Stage, StageContext, StageOutput, each_asset, refresh_script};

/// Renders the entry templates of the source tree. Includes and inheritance
/// resolve against the source directory; the bound locale's strings are
/// exposed as `t`, its identifier as `locale`.
pub struct RenderTemplates {
    source_dir: Utf8PathBuf,
}

impl RenderTemplates {
    pub fn new(source_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

impl Stage for RenderTemplates {
    fn name(&self) -> &'static str {
        "templates"
    }

    fn apply(&self, cx: &StageContext, assets: Vec<Asset>) -> anyhow::Result<StageOutput> {
        let mut env = Environment::new();
        env.set_loader(path_loader(&self.source_dir));

        let (locale, strings) = match cx.locale {
            Some(locale) => (
                locale.id.as_str(),
                Value::from_serialize(&locale.strings),
            ),
            None => (
                cx.config.default_locale.as_str(),
                Value::from_serialize(&serde_json::Map::<String, serde_json::Value>::new()),
            ),
        };

        let refresh = cx.port.map(refresh_script).unwrap_or_default();

        let assets = each_asset(self.name(), assets, |asset| {
            let template = env.get_template(asset.path.as_str())?;
            let html = template.render(context! {
                locale => locale,
                t => strings.clone(),
                refresh_script => refresh.clone(),
            })?;

            Ok(asset.with_data(html.into_bytes()).with_extension("html"))
        });

        Ok(StageOutput::assets(assets))
    }
}
