use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::TemplateVariant;
use crate::error::Stac2IsoError;
use crate::normalize::LicenseSource;
use crate::xml::Namespaces;

pub const DEFAULT_CONFIG_FILE: &str = "stac2iso.json";
pub const DEFAULT_CATALOG_ROOT: &str = "https://data.inpe.br/bdc/stac/v1/collections";
pub const DEFAULT_OUTPUT_DIR: &str = "output_xml_files";
pub const DEFAULT_CATALOG_LABEL: &str = "INPE Spatio Temporal Asset Catalog (STAC) server";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog_root: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub template_variant: Option<TemplateVariant>,
    #[serde(default)]
    pub license: Option<LicenseSource>,
    #[serde(default)]
    pub namespaces: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub catalog_label: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Values given on the command line; they win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub catalog_root: Option<String>,
    pub template: Option<String>,
    pub output_dir: Option<String>,
    pub template_variant: Option<TemplateVariant>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub catalog_root: String,
    pub template: Option<Utf8PathBuf>,
    pub output_dir: Utf8PathBuf,
    pub template_variant: TemplateVariant,
    pub license: LicenseSource,
    pub namespaces: Namespaces,
    pub catalog_label: String,
    pub timeout: Duration,
}

impl ResolvedConfig {
    pub fn template_path(&self) -> Result<&Utf8PathBuf, Stac2IsoError> {
        self.template
            .as_ref()
            .ok_or(Stac2IsoError::MissingSetting("template"))
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, Stac2IsoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default(), overrides);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| Stac2IsoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| Stac2IsoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, Stac2IsoError> {
        let catalog_root = overrides
            .catalog_root
            .or(config.catalog_root)
            .unwrap_or_else(|| DEFAULT_CATALOG_ROOT.to_string());
        if catalog_root.trim().is_empty() {
            return Err(Stac2IsoError::MissingSetting("catalog_root"));
        }

        let template = overrides
            .template
            .or(config.template)
            .map(Utf8PathBuf::from);
        let output_dir = Utf8PathBuf::from(
            overrides
                .output_dir
                .or(config.output_dir)
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
        );

        let namespaces = match config.namespaces {
            Some(map) => Namespaces::default().with_bindings(map),
            None => Namespaces::default(),
        };

        Ok(ResolvedConfig {
            catalog_root,
            template,
            output_dir,
            template_variant: overrides
                .template_variant
                .or(config.template_variant)
                .unwrap_or_default(),
            license: config.license.unwrap_or_default(),
            namespaces,
            catalog_label: config
                .catalog_label
                .unwrap_or_else(|| DEFAULT_CATALOG_LABEL.to_string()),
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}
