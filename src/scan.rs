use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::AssetFacts;
use crate::stac::CatalogClient;

fn assets(item: &Value) -> impl Iterator<Item = &Value> {
    item.get("assets")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|assets| assets.values())
}

/// Href of the first asset, in item then asset order, ending in `.png`.
pub fn first_overview_image(items: &[Value]) -> Option<String> {
    items
        .iter()
        .flat_map(assets)
        .filter_map(|asset| asset.get("href").and_then(Value::as_str))
        .find(|href| href.ends_with(".png"))
        .map(str::to_string)
}

/// Distinct asset media types across all items.
pub fn distribution_formats(items: &[Value]) -> BTreeSet<String> {
    items
        .iter()
        .flat_map(assets)
        .filter_map(|asset| asset.get("type").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

/// Fetches the first items page once and derives both facts from it.
///
/// A failed fetch degrades to no overview and no formats.
pub fn scan_collection_items<C: CatalogClient + ?Sized>(
    client: &C,
    collection_url: &str,
) -> AssetFacts {
    match client.fetch_items(collection_url) {
        Ok(items) => {
            let facts = AssetFacts {
                overview_image_url: first_overview_image(&items),
                distribution_formats: distribution_formats(&items),
                items_scanned: items.len(),
                fetch_error: None,
            };
            debug!(
                collection_url,
                items = facts.items_scanned,
                formats = facts.distribution_formats.len(),
                "scanned items"
            );
            facts
        }
        Err(err) => {
            warn!(collection_url, error = %err, "could not fetch items");
            AssetFacts {
                fetch_error: Some(err.to_string()),
                ..AssetFacts::default()
            }
        }
    }
}
