use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    CollectionRecord, DEFAULT_TEMPORAL_END, DEFAULT_TEMPORAL_START, License, NOT_AVAILABLE,
    SpatialExtent, TemporalExtent,
};

/// Where the license title and href come from inside a collection's `links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseSource {
    /// Fixed position in the link list. Catalogs we target put the license at 4.
    LinkIndex(usize),
    LinkRelation(String),
}

impl Default for LicenseSource {
    fn default() -> Self {
        LicenseSource::LinkIndex(4)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub license: LicenseSource,
}

/// Builds the canonical record for a raw STAC collection object.
///
/// Never fails: every missing or malformed field falls back to its default.
/// Overview and distribution formats are left empty; they come from the items.
pub fn normalize(raw: &Value, options: &NormalizeOptions) -> CollectionRecord {
    let links = raw
        .get("links")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    CollectionRecord {
        id: string_or_sentinel(raw.get("id")),
        title: string_or_sentinel(raw.get("title")),
        description: string_or_sentinel(raw.get("description")),
        keywords: keywords(raw),
        license: license_from_links(links, &options.license),
        spatial_extent: spatial_extent(raw),
        temporal_extent: temporal_extent(raw),
        online_resources: self_links(links),
        overview_image_url: None,
        distribution_formats: BTreeSet::new(),
    }
}

pub fn license_from_links(links: &[Value], source: &LicenseSource) -> License {
    let link = match source {
        LicenseSource::LinkIndex(index) => links.get(*index),
        LicenseSource::LinkRelation(rel) => links
            .iter()
            .find(|link| link.get("rel").and_then(Value::as_str) == Some(rel.as_str())),
    };
    match link {
        Some(link) => License {
            title: string_or_sentinel(link.get("title")),
            href: string_or_sentinel(link.get("href")),
        },
        None => License::not_available(),
    }
}

fn string_or_sentinel(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn keywords(raw: &Value) -> Vec<String> {
    raw.get("keywords")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn self_links(links: &[Value]) -> Vec<String> {
    links
        .iter()
        .filter(|link| link.get("rel").and_then(Value::as_str) == Some("self"))
        .filter_map(|link| link.get("href").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn first_of<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a [Value]> {
    let mut cursor = raw;
    for key in path {
        cursor = cursor.get(*key)?;
    }
    cursor.as_array()?.first()?.as_array().map(Vec::as_slice)
}

fn spatial_extent(raw: &Value) -> SpatialExtent {
    let Some(bbox) = first_of(raw, &["extent", "spatial", "bbox"]) else {
        return SpatialExtent::ZERO;
    };
    if bbox.len() != 4 {
        return SpatialExtent::ZERO;
    }
    let mut values = [0.0; 4];
    for (slot, value) in values.iter_mut().zip(bbox) {
        match coordinate(value) {
            Some(number) => *slot = number,
            None => return SpatialExtent::ZERO,
        }
    }
    SpatialExtent::from_source_bbox(values)
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn temporal_extent(raw: &Value) -> TemporalExtent {
    let Some(interval) = first_of(raw, &["extent", "temporal", "interval"]) else {
        return TemporalExtent::default();
    };
    if interval.len() != 2 {
        return TemporalExtent::default();
    }
    let bound = |value: &Value, fallback: &str| {
        value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    };
    TemporalExtent {
        start: bound(&interval[0], DEFAULT_TEMPORAL_START),
        end: bound(&interval[1], DEFAULT_TEMPORAL_END),
    }
}
