use std::fs;

use camino::Utf8Path;

use crate::error::Stac2IsoError;
use crate::xml::Document;

/// Parsed ISO template; every collection gets its own deep copy.
#[derive(Debug, Clone)]
pub struct Template {
    document: Document,
}

impl Template {
    pub fn load(path: &Utf8Path) -> Result<Self, Stac2IsoError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| Stac2IsoError::TemplateRead(path.as_std_path().to_path_buf()))?;
        Self::from_xml(&content)
    }

    pub fn from_xml(xml: &str) -> Result<Self, Stac2IsoError> {
        Ok(Self {
            document: Document::parse(xml)?,
        })
    }

    pub fn instantiate(&self) -> Document {
        self.document.clone()
    }
}
