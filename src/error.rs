use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::app::{EXIT_CATALOG_UNREACHABLE, EXIT_SETUP};

#[derive(Debug, Error, Diagnostic)]
pub enum Stac2IsoError {
    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("catalog response is not valid JSON: {0}")]
    CatalogDecode(String),

    #[error("collection entry has no id")]
    MissingCollectionId,

    #[error("failed to read template at {0}")]
    TemplateRead(PathBuf),

    #[error("template is not well-formed XML: {0}")]
    TemplateParse(String),

    #[error("namespace prefix `{0}` is not configured")]
    UnknownPrefix(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing required setting: {0}")]
    #[diagnostic(help("set it in stac2iso.json or pass it on the command line"))]
    MissingSetting(&'static str),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

impl Stac2IsoError {
    /// Exit status when this error ends the process before a run report exists.
    pub fn exit_code(&self) -> u8 {
        match self {
            Stac2IsoError::CatalogHttp(_)
            | Stac2IsoError::CatalogStatus { .. }
            | Stac2IsoError::CatalogDecode(_) => EXIT_CATALOG_UNREACHABLE,
            _ => EXIT_SETUP,
        }
    }
}
