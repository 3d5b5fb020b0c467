use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{CollectionRecord, TemplateVariant};
use crate::error::Stac2IsoError;
use crate::xml::{Document, Namespaces, NodeId, XPath};

pub const ONLINE_RESOURCE_PROTOCOL: &str = "WWW:LINK-2.0-http--link";

const FILE_IDENTIFIER: &str = ".//gmd:fileIdentifier/gco:CharacterString";
const TITLE: &str = ".//gmd:title/gco:CharacterString";
const ABSTRACT: &str = ".//gmd:abstract/gco:CharacterString";
const KEYWORD_CONTAINER: &str = ".//gmd:descriptiveKeywords/gmd:MD_Keywords";
const KEYWORD_SLOTS: &str = ".//gmd:keyword/gco:CharacterString";
const OVERVIEW: &str = ".//gmd:MD_BrowseGraphic/gmd:fileName/gco:CharacterString";
const CONSTRAINTS: &str =
    ".//gmd:resourceConstraints/gmd:MD_LegalConstraints/gmd:otherConstraints/gco:CharacterString";
const BOUNDING_BOX: &str =
    ".//gmd:extent/gmd:EX_Extent/gmd:geographicElement/gmd:EX_GeographicBoundingBox";
const TIME_PERIOD: &str =
    ".//gmd:temporalElement/gmd:EX_TemporalExtent/gmd:extent/gml:TimePeriod";
const ONLINE_BLOCKS: &str =
    ".//gmd:distributionInfo/gmd:MD_Distribution/gmd:transferOptions/gmd:MD_DigitalTransferOptions/gmd:onLine";
const DISTRIBUTION_FORMAT: &str = ".//gmd:distributionFormat";

static FRACTIONAL_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{1,6}Z$")
        .expect("valid timestamp pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FileIdentifier,
    Title,
    Abstract,
    Keywords,
    Overview,
    Constraints,
    BoundingBox,
    TemporalExtent,
    OnlineResource,
    DistributionFormats,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::FileIdentifier => "file identifier",
            Field::Title => "title",
            Field::Abstract => "abstract",
            Field::Keywords => "keywords",
            Field::Overview => "overview",
            Field::Constraints => "resource constraints",
            Field::BoundingBox => "bounding box",
            Field::TemporalExtent => "temporal extent",
            Field::OnlineResource => "online resource",
            Field::DistributionFormats => "distribution formats",
        };
        f.write_str(name)
    }
}

/// A field that could not be (fully) written into the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldWarning {
    pub field: Field,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Populated {
    pub document: Document,
    pub warnings: Vec<FieldWarning>,
}

impl Populated {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PopulatorSettings {
    pub variant: TemplateVariant,
    pub namespaces: Namespaces,
    pub catalog_label: String,
}

#[derive(Debug, Clone)]
pub struct Populator {
    settings: PopulatorSettings,
}

impl Populator {
    pub fn new(settings: PopulatorSettings) -> Self {
        Self { settings }
    }

    /// Writes `record` into `document`, field by field.
    ///
    /// A missing anchor only skips its own field; the rest are still written.
    pub fn populate(&self, document: Document, record: &CollectionRecord) -> Populated {
        let mut pass = Pass {
            doc: document,
            ns: &self.settings.namespaces,
            warnings: Vec::new(),
        };

        pass.run(Field::FileIdentifier, |p| {
            p.set_text_at(Field::FileIdentifier, FILE_IDENTIFIER, &record.id)
        });
        pass.run(Field::Title, |p| p.set_text_at(Field::Title, TITLE, &record.title));
        pass.run(Field::Abstract, |p| {
            p.set_text_at(Field::Abstract, ABSTRACT, &record.description)
        });
        match self.settings.variant {
            TemplateVariant::Standard => {
                pass.run(Field::Keywords, |p| p.rebuild_keywords(&record.keywords))
            }
            TemplateVariant::Legacy => {
                pass.run(Field::Keywords, |p| p.fill_keyword_slots(&record.keywords))
            }
        }
        pass.run(Field::Overview, |p| {
            p.set_text_at(Field::Overview, OVERVIEW, record.overview_text())
        });
        pass.run(Field::Constraints, |p| {
            p.set_text_at(Field::Constraints, CONSTRAINTS, &record.license.to_string())
        });
        pass.run(Field::BoundingBox, |p| p.bounding_box(record));
        pass.run(Field::TemporalExtent, |p| p.temporal_extent(record));
        match self.settings.variant {
            TemplateVariant::Standard => pass.run(Field::OnlineResource, |p| {
                p.second_online_resource(record, &self.settings.catalog_label)
            }),
            TemplateVariant::Legacy => {
                pass.run(Field::OnlineResource, |p| p.first_online_linkage(record))
            }
        }
        if self.settings.variant == TemplateVariant::Standard {
            pass.run(Field::DistributionFormats, |p| p.distribution_formats(record));
        }

        Populated {
            document: pass.doc,
            warnings: pass.warnings,
        }
    }
}

struct Pass<'a> {
    doc: Document,
    ns: &'a Namespaces,
    warnings: Vec<FieldWarning>,
}

impl Pass<'_> {
    fn run<F>(&mut self, field: Field, step: F)
    where
        F: FnOnce(&mut Self) -> Result<(), Stac2IsoError>,
    {
        if let Err(err) = step(self) {
            self.warn(field, err.to_string());
        }
    }

    fn warn(&mut self, field: Field, message: String) {
        warn!(%field, "{message}");
        self.warnings.push(FieldWarning { field, message });
    }

    fn anchor_missing(&mut self, field: Field, path: &str) {
        self.warn(field, format!("template anchor `{path}` not found"));
    }

    fn find_from(
        &mut self,
        field: Field,
        from: NodeId,
        path: &str,
    ) -> Result<Option<NodeId>, Stac2IsoError> {
        let compiled = XPath::compile(path, self.ns)?;
        let found = self.doc.find(from, &compiled);
        if found.is_none() {
            self.anchor_missing(field, path);
        }
        Ok(found)
    }

    fn find(&mut self, field: Field, path: &str) -> Result<Option<NodeId>, Stac2IsoError> {
        let root = self.doc.root();
        self.find_from(field, root, path)
    }

    fn set_text_at(&mut self, field: Field, path: &str, text: &str) -> Result<(), Stac2IsoError> {
        if let Some(node) = self.find(field, path)? {
            self.doc.set_text(node, text);
        }
        Ok(())
    }

    fn set_text_below(
        &mut self,
        field: Field,
        from: NodeId,
        path: &str,
        text: &str,
    ) -> Result<(), Stac2IsoError> {
        if let Some(node) = self.find_from(field, from, path)? {
            self.doc.set_text(node, text);
        }
        Ok(())
    }

    fn rebuild_keywords(&mut self, keywords: &[String]) -> Result<(), Stac2IsoError> {
        let Some(container) = self.find(Field::Keywords, KEYWORD_CONTAINER)? else {
            return Ok(());
        };
        let existing = XPath::compile("gmd:keyword", self.ns)?;
        for keyword in self.doc.find_all(container, &existing) {
            self.doc.remove_child(container, keyword);
        }
        for keyword in keywords {
            let node = self.doc.append_element(container, "gmd:keyword", self.ns)?;
            let text = self.doc.append_element(node, "gco:CharacterString", self.ns)?;
            self.doc.set_text(text, keyword);
        }
        Ok(())
    }

    fn fill_keyword_slots(&mut self, keywords: &[String]) -> Result<(), Stac2IsoError> {
        let slots_path = XPath::compile(KEYWORD_SLOTS, self.ns)?;
        let slots = self.doc.find_all(self.doc.root(), &slots_path);
        if slots.is_empty() {
            self.anchor_missing(Field::Keywords, KEYWORD_SLOTS);
            return Ok(());
        }
        if keywords.len() > slots.len() {
            debug!(
                dropped = keywords.len() - slots.len(),
                "template has fewer keyword slots than keywords"
            );
        }
        for (index, slot) in slots.into_iter().enumerate() {
            let text = keywords.get(index).map(String::as_str).unwrap_or("");
            self.doc.set_text(slot, text);
        }
        Ok(())
    }

    fn bounding_box(&mut self, record: &CollectionRecord) -> Result<(), Stac2IsoError> {
        let Some(bbox) = self.find(Field::BoundingBox, BOUNDING_BOX)? else {
            return Ok(());
        };
        let extent = record.spatial_extent;
        let slots = [
            ("gmd:westBoundLongitude/gco:Decimal", extent.west),
            ("gmd:eastBoundLongitude/gco:Decimal", extent.east),
            ("gmd:southBoundLatitude/gco:Decimal", extent.south),
            ("gmd:northBoundLatitude/gco:Decimal", extent.north),
        ];
        for (path, value) in slots {
            self.set_text_below(Field::BoundingBox, bbox, path, &format_decimal(value))?;
        }
        Ok(())
    }

    fn temporal_extent(&mut self, record: &CollectionRecord) -> Result<(), Stac2IsoError> {
        let Some(period) = self.find(Field::TemporalExtent, TIME_PERIOD)? else {
            return Ok(());
        };
        let extent = &record.temporal_extent;
        self.set_text_below(
            Field::TemporalExtent,
            period,
            "gml:beginPosition",
            &format_calendar_date(&extent.start),
        )?;
        self.set_text_below(
            Field::TemporalExtent,
            period,
            "gml:endPosition",
            &format_calendar_date(&extent.end),
        )
    }

    fn second_online_resource(
        &mut self,
        record: &CollectionRecord,
        catalog_label: &str,
    ) -> Result<(), Stac2IsoError> {
        let Some(url) = record.online_resources.first() else {
            debug!(id = %record.id, "collection has no self link");
            return Ok(());
        };
        let blocks_path = XPath::compile(ONLINE_BLOCKS, self.ns)?;
        let blocks = self.doc.find_all(self.doc.root(), &blocks_path);
        let Some(block) = blocks.get(1).copied() else {
            self.warn(
                Field::OnlineResource,
                format!(
                    "template has {} online resource block(s) under `{ONLINE_BLOCKS}`, expected at least 2",
                    blocks.len()
                ),
            );
            return Ok(());
        };

        let field = Field::OnlineResource;
        self.set_text_below(field, block, ".//gmd:CI_OnlineResource/gmd:linkage/gmd:URL", url)?;
        self.set_text_below(
            field,
            block,
            ".//gmd:CI_OnlineResource/gmd:protocol/gco:CharacterString",
            ONLINE_RESOURCE_PROTOCOL,
        )?;
        self.set_text_below(
            field,
            block,
            ".//gmd:CI_OnlineResource/gmd:name/gco:CharacterString",
            &format!("{} Collection", record.title),
        )?;
        self.set_text_below(
            field,
            block,
            ".//gmd:CI_OnlineResource/gmd:description/gco:CharacterString",
            &format!(
                "End point to access {catalog_label}, collection {}",
                record.id
            ),
        )
    }

    fn first_online_linkage(&mut self, record: &CollectionRecord) -> Result<(), Stac2IsoError> {
        let Some(url) = record.online_resources.first() else {
            return Ok(());
        };
        let path = format!("{ONLINE_BLOCKS}/gmd:CI_OnlineResource/gmd:linkage/gmd:URL");
        self.set_text_at(Field::OnlineResource, &path, url)
    }

    fn distribution_formats(&mut self, record: &CollectionRecord) -> Result<(), Stac2IsoError> {
        if record.distribution_formats.is_empty() {
            return Ok(());
        }
        let Some(container) = self.find(Field::DistributionFormats, DISTRIBUTION_FORMAT)? else {
            return Ok(());
        };
        for format in &record.distribution_formats {
            let md_format = self.doc.append_element(container, "gmd:MD_Format", self.ns)?;
            let name = self.doc.append_element(md_format, "gmd:name", self.ns)?;
            let name_text = self.doc.append_element(name, "gco:CharacterString", self.ns)?;
            self.doc.set_text(name_text, format);
            let version = self.doc.append_element(md_format, "gmd:version", self.ns)?;
            let version_text = self
                .doc
                .append_element(version, "gco:CharacterString", self.ns)?;
            self.doc
                .set_attribute(version_text, "gco:nilReason", "unknown", self.ns)?;
        }
        Ok(())
    }
}

/// `YYYY-MM-DD` for `YYYY-MM-DDThh:mm:ss.ffffffZ` timestamps; anything else unchanged.
pub fn format_calendar_date(value: &str) -> String {
    if !FRACTIONAL_TIMESTAMP.is_match(value) {
        return value.to_string();
    }
    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.fZ") {
        Ok(timestamp) => timestamp.format("%Y-%m-%d").to_string(),
        Err(_) => value.to_string(),
    }
}

/// Renders coordinates like Python's `repr(float)`: `1.0`, `-43.25`, `1e-05`, `1e+16`.
///
/// Positional notation is used for decimal exponents in `-4..16`, scientific
/// notation with a signed two-digit exponent otherwise.
pub fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let shortest = format!("{value:e}");
    let (mantissa, exponent) = shortest.split_once('e').unwrap_or((shortest.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        if value.fract() == 0.0 {
            format!("{value:.1}")
        } else {
            format!("{value}")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}
