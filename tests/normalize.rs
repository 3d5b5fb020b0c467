use serde_json::{Value, json};

use stac2iso::domain::{
    DEFAULT_TEMPORAL_END, DEFAULT_TEMPORAL_START, License, NOT_AVAILABLE, SpatialExtent,
    TemporalExtent,
};
use stac2iso::normalize::{LicenseSource, NormalizeOptions, license_from_links, normalize};

fn scenario_collection() -> Value {
    json!({
        "id": "C1",
        "title": "T",
        "keywords": ["a", "b"],
        "extent": {
            "spatial": {"bbox": [[1, 2, 3, 4]]},
            "temporal": {"interval": [["2020-01-01T00:00:00.000000Z", "2021-01-01T00:00:00.000000Z"]]}
        },
        "links": []
    })
}

fn links(count: usize) -> Vec<Value> {
    (0..count)
        .map(|index| {
            json!({
                "rel": if index == 0 { "self" } else { "related" },
                "href": format!("https://catalog.example/link/{index}"),
                "title": format!("Link {index}"),
            })
        })
        .collect()
}

#[test]
fn scenario_collection_is_normalized() {
    let record = normalize(&scenario_collection(), &NormalizeOptions::default());

    assert_eq!(record.id, "C1");
    assert_eq!(record.title, "T");
    assert_eq!(record.description, NOT_AVAILABLE);
    assert_eq!(record.keywords, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(record.spatial_extent.to_array(), [1.0, 4.0, 3.0, 2.0]);
    assert_eq!(record.spatial_extent.west, 1.0);
    assert_eq!(record.spatial_extent.east, 3.0);
    assert_eq!(record.spatial_extent.south, 4.0);
    assert_eq!(record.spatial_extent.north, 2.0);
    assert_eq!(record.temporal_extent.start, "2020-01-01T00:00:00.000000Z");
    assert_eq!(record.temporal_extent.end, "2021-01-01T00:00:00.000000Z");
    assert_eq!(record.license, License::not_available());
    assert!(record.online_resources.is_empty());
    assert_eq!(record.overview_image_url, None);
    assert!(record.distribution_formats.is_empty());
}

#[test]
fn malformed_bounding_boxes_default_to_zero() {
    let extents = [
        json!({}),
        json!({"spatial": {}}),
        json!({"spatial": {"bbox": []}}),
        json!({"spatial": {"bbox": [[1, 2, 3]]}}),
        json!({"spatial": {"bbox": [[1, 2, 3, 4, 5, 6]]}}),
        json!({"spatial": {"bbox": [1, 2, 3, 4]}}),
        json!({"spatial": {"bbox": "world"}}),
        json!({"spatial": {"bbox": [[null, 2, 3, 4]]}}),
    ];
    for extent in extents {
        let raw = json!({"id": "x", "extent": extent});
        let record = normalize(&raw, &NormalizeOptions::default());
        assert_eq!(record.spatial_extent, SpatialExtent::ZERO, "extent: {extent}");
    }
}

#[test]
fn malformed_temporal_intervals_take_sentinels() {
    let extents = [
        json!({}),
        json!({"temporal": {"interval": []}}),
        json!({"temporal": {"interval": [["2020-01-01T00:00:00Z"]]}}),
        json!({"temporal": {"interval": "always"}}),
        json!({"temporal": {"interval": [[]]}}),
    ];
    for extent in extents {
        let raw = json!({"extent": extent});
        let record = normalize(&raw, &NormalizeOptions::default());
        assert_eq!(record.temporal_extent, TemporalExtent::default(), "extent: {extent}");
        assert_eq!(record.temporal_extent.start, DEFAULT_TEMPORAL_START);
        assert_eq!(record.temporal_extent.end, DEFAULT_TEMPORAL_END);
    }
}

#[test]
fn fewer_than_five_links_yield_license_sentinels() {
    for count in 0..5 {
        let raw = json!({"id": "x", "links": links(count)});
        let record = normalize(&raw, &NormalizeOptions::default());
        assert_eq!(record.license.title, NOT_AVAILABLE);
        assert_eq!(record.license.href, NOT_AVAILABLE);
    }
}

#[test]
fn license_is_taken_from_fifth_link() {
    let raw = json!({"id": "x", "links": links(6)});
    let record = normalize(&raw, &NormalizeOptions::default());
    assert_eq!(record.license.title, "Link 4");
    assert_eq!(record.license.href, "https://catalog.example/link/4");
    assert_eq!(
        record.license.to_string(),
        "Link 4: https://catalog.example/link/4"
    );
}

#[test]
fn license_link_without_title_keeps_href() {
    let mut links = links(5);
    links[4] = json!({"rel": "license", "href": "https://spdx.org/licenses/MIT"});
    let license = license_from_links(&links, &LicenseSource::LinkIndex(4));
    assert_eq!(license.title, NOT_AVAILABLE);
    assert_eq!(license.href, "https://spdx.org/licenses/MIT");
}

#[test]
fn license_index_is_configurable() {
    let options = NormalizeOptions {
        license: LicenseSource::LinkIndex(1),
    };
    let record = normalize(&json!({"links": links(2)}), &options);
    assert_eq!(record.license.title, "Link 1");
}

#[test]
fn self_links_become_online_resources_in_order() {
    let raw = json!({
        "links": [
            {"rel": "self", "href": "https://a/self"},
            {"rel": "root", "href": "https://a/"},
            {"rel": "self"},
            {"rel": "self", "href": "https://b/self"},
        ]
    });
    let record = normalize(&raw, &NormalizeOptions::default());
    assert_eq!(record.online_resources, vec!["https://a/self", "https://b/self"]);
}

#[test]
fn missing_text_fields_take_sentinels() {
    let raw = json!({"title": 42, "keywords": ["ok", 7, null, "fine"]});
    let record = normalize(&raw, &NormalizeOptions::default());
    assert_eq!(record.id, NOT_AVAILABLE);
    assert_eq!(record.title, NOT_AVAILABLE);
    assert_eq!(record.description, NOT_AVAILABLE);
    assert_eq!(record.keywords, vec!["ok", "fine"]);
}

#[test]
fn normalize_is_deterministic() {
    let raw = scenario_collection();
    let options = NormalizeOptions::default();
    assert_eq!(normalize(&raw, &options), normalize(&raw, &options));
    assert_eq!(normalize(&Value::Null, &options), normalize(&Value::Null, &options));
}
