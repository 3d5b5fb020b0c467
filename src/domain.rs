use std::collections::BTreeSet;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Substituted for any textual field the catalog does not provide.
pub const NOT_AVAILABLE: &str = "not available";

/// Written to the overview node when no item carries a PNG asset.
pub const NO_OVERVIEW_FOUND: &str = "No PNG image found.";

pub const DEFAULT_TEMPORAL_START: &str = "2000-01-01T00:00:00Z";
pub const DEFAULT_TEMPORAL_END: &str = "2100-01-01T00:00:00Z";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct License {
    pub title: String,
    pub href: String,
}

impl License {
    pub fn not_available() -> Self {
        Self {
            title: NOT_AVAILABLE.to_string(),
            href: NOT_AVAILABLE.to_string(),
        }
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.href)
    }
}

/// Geographic bounding box in the slot layout the ISO template expects.
///
/// The source bbox `[a, b, c, d]` lands as west=a, north=b, east=c, south=d.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpatialExtent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl SpatialExtent {
    pub const ZERO: Self = Self {
        west: 0.0,
        south: 0.0,
        east: 0.0,
        north: 0.0,
    };

    pub fn from_source_bbox(bbox: [f64; 4]) -> Self {
        Self {
            west: bbox[0],
            north: bbox[1],
            east: bbox[2],
            south: bbox[3],
        }
    }

    /// `[west, south, east, north]`
    pub fn to_array(self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

impl Default for SpatialExtent {
    fn default() -> Self {
        Self::ZERO
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemporalExtent {
    pub start: String,
    pub end: String,
}

impl Default for TemporalExtent {
    fn default() -> Self {
        Self {
            start: DEFAULT_TEMPORAL_START.to_string(),
            end: DEFAULT_TEMPORAL_END.to_string(),
        }
    }
}

/// Canonical view of one STAC collection, built fresh per collection per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub license: License,
    pub spatial_extent: SpatialExtent,
    pub temporal_extent: TemporalExtent,
    pub online_resources: Vec<String>,
    pub overview_image_url: Option<String>,
    pub distribution_formats: BTreeSet<String>,
}

impl CollectionRecord {
    pub fn overview_text(&self) -> &str {
        match &self.overview_image_url {
            Some(url) => url,
            None => NO_OVERVIEW_FOUND,
        }
    }

    pub fn with_asset_facts(mut self, facts: AssetFacts) -> Self {
        self.overview_image_url = facts.overview_image_url;
        self.distribution_formats = facts.distribution_formats;
        self
    }
}

/// Facts derived from a collection's items rather than the collection document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetFacts {
    pub overview_image_url: Option<String>,
    pub distribution_formats: BTreeSet<String>,
    pub items_scanned: usize,
    pub fetch_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogScope {
    All,
    Single(String),
}

impl fmt::Display for CatalogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogScope::All => write!(f, "all collections"),
            CatalogScope::Single(id) => write!(f, "collection {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVariant {
    #[default]
    Standard,
    Legacy,
}

impl fmt::Display for TemplateVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateVariant::Standard => write!(f, "standard"),
            TemplateVariant::Legacy => write!(f, "legacy"),
        }
    }
}

pub fn collection_url(catalog_root: &str, id: &str) -> String {
    format!("{}/{}", catalog_root.trim_end_matches('/'), id)
}

pub fn items_url(collection_url: &str) -> String {
    format!("{}/items", collection_url.trim_end_matches('/'))
}

pub fn output_file_name(id: &str) -> String {
    let safe = id.replace(['/', '\\'], "_");
    format!("{safe}_metadata.xml")
}
