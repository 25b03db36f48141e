use config::builder::DefaultState;
use config::{File, FileFormat, Source};

use crate::config::settings::Settings;
use crate::SWIM_CLUSTER_CONFIG;

pub mod settings;

/// Layers user sources over the embedded `cluster.toml`; later sources win.
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    builder: config::ConfigBuilder<DefaultState>,
}

impl SettingsBuilder {
    pub fn add_source<T>(self, source: T) -> Self
    where
        T: Source + Send + Sync + 'static,
    {
        Self {
            builder: self.builder.add_source(source),
        }
    }

    pub fn add_toml(self, toml: &str) -> Self {
        self.add_source(File::from_str(toml, FileFormat::Toml))
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let config = config::Config::builder()
            .add_source(File::from_str(SWIM_CLUSTER_CONFIG, FileFormat::Toml))
            .add_source(self.builder.build()?)
            .build()?;
        Settings::new(&config)
    }
}
