use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{CatalogScope, CollectionRecord, collection_url, output_file_name};
use crate::error::Stac2IsoError;
use crate::normalize::{NormalizeOptions, normalize};
use crate::output::OutputDir;
use crate::populate::{FieldWarning, Populator};
use crate::scan::scan_collection_items;
use crate::stac::CatalogClient;
use crate::template::Template;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_SETUP: u8 = 1;
pub const EXIT_CATALOG_UNREACHABLE: u8 = 3;
pub const EXIT_PARTIAL: u8 = 4;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub catalog_root: String,
    pub scope: String,
    pub started_at: String,
    pub catalog_error: Option<String>,
    pub collections: Vec<CollectionOutcome>,
}

impl RunReport {
    pub fn written(&self) -> impl Iterator<Item = &CollectionOutcome> {
        self.collections
            .iter()
            .filter(|outcome| matches!(outcome.status, OutcomeStatus::Written { .. }))
    }

    pub fn failed(&self) -> impl Iterator<Item = &CollectionOutcome> {
        self.collections
            .iter()
            .filter(|outcome| matches!(outcome.status, OutcomeStatus::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.catalog_error.is_none() && self.failed().next().is_none()
    }

    /// Process exit status for a finished run over `scope`.
    pub fn exit_code(&self, scope: &CatalogScope) -> u8 {
        if self.is_success() {
            return EXIT_SUCCESS;
        }
        match (scope, &self.catalog_error) {
            (CatalogScope::Single(_), Some(_)) => EXIT_CATALOG_UNREACHABLE,
            _ => EXIT_PARTIAL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionOutcome {
    pub id: String,
    pub collection_url: Option<String>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Written {
        path: String,
        warnings: Vec<FieldWarning>,
        items_scanned: usize,
        items_error: Option<String>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Normalizes a raw collection and augments it with facts from its items.
pub fn resolve_record<C: CatalogClient + ?Sized>(
    client: &C,
    raw: &Value,
    collection_url: &str,
    options: &NormalizeOptions,
) -> CollectionRecord {
    let record = normalize(raw, options);
    let facts = scan_collection_items(client, collection_url);
    record.with_asset_facts(facts)
}

pub struct App<C: CatalogClient> {
    client: C,
    catalog_root: String,
    template: Template,
    populator: Populator,
    normalize: NormalizeOptions,
    output: OutputDir,
}

impl<C: CatalogClient> App<C> {
    pub fn new(
        client: C,
        catalog_root: impl Into<String>,
        template: Template,
        populator: Populator,
        normalize: NormalizeOptions,
        output: OutputDir,
    ) -> Self {
        Self {
            client,
            catalog_root: catalog_root.into(),
            template,
            populator,
            normalize,
            output,
        }
    }

    pub fn run(
        &self,
        scope: &CatalogScope,
        output_name: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let mut report = RunReport {
            catalog_root: self.catalog_root.clone(),
            scope: scope.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            catalog_error: None,
            collections: Vec::new(),
        };
        info!(catalog = %self.catalog_root, %scope, "starting run");

        match scope {
            CatalogScope::All => self.run_all(&mut report, sink),
            CatalogScope::Single(id) => self.run_single(id, output_name, &mut report, sink),
        }
        report
    }

    fn run_all(&self, report: &mut RunReport, sink: &dyn ProgressSink) {
        let collections = match self.client.fetch_collection_list(&self.catalog_root) {
            Ok(collections) => collections,
            Err(err) => {
                warn!(catalog = %self.catalog_root, error = %err, "collection list request failed");
                report.catalog_error = Some(err.to_string());
                sink.event(ProgressEvent {
                    message: "collection list request failed".to_string(),
                    elapsed: None,
                });
                return;
            }
        };

        if collections.is_empty() {
            sink.event(ProgressEvent {
                message: "no collections found".to_string(),
                elapsed: None,
            });
            return;
        }

        for raw in &collections {
            let Some(id) = raw.get("id").and_then(Value::as_str) else {
                warn!("skipping collection entry without id");
                report.collections.push(CollectionOutcome {
                    id: String::new(),
                    collection_url: None,
                    status: OutcomeStatus::Failed {
                        error: Stac2IsoError::MissingCollectionId.to_string(),
                    },
                });
                continue;
            };
            let url = collection_url(&self.catalog_root, id);
            let outcome = self.process(id, raw, &url, &output_file_name(id), sink);
            report.collections.push(outcome);
        }
    }

    fn run_single(
        &self,
        id: &str,
        output_name: Option<&str>,
        report: &mut RunReport,
        sink: &dyn ProgressSink,
    ) {
        let url = collection_url(&self.catalog_root, id);
        let raw = match self.client.fetch_collection(&url) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(collection = id, error = %err, "collection request failed");
                report.catalog_error = Some(err.to_string());
                return;
            }
        };
        let file_name = output_name
            .map(str::to_string)
            .unwrap_or_else(|| output_file_name(id));
        let outcome = self.process(id, &raw, &url, &file_name, sink);
        report.collections.push(outcome);
    }

    fn process(
        &self,
        id: &str,
        raw: &Value,
        url: &str,
        file_name: &str,
        sink: &dyn ProgressSink,
    ) -> CollectionOutcome {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("processing collection {id}"),
            elapsed: None,
        });

        let facts = scan_collection_items(&self.client, url);
        let items_scanned = facts.items_scanned;
        let items_error = facts.fetch_error.clone();
        let record = normalize(raw, &self.normalize).with_asset_facts(facts);
        let populated = self.populator.populate(self.template.instantiate(), &record);
        let written = populated
            .document
            .to_xml()
            .and_then(|bytes| self.output.write_document(file_name, &bytes));

        let status = match written {
            Ok(path) => {
                sink.event(ProgressEvent {
                    message: format!("wrote {path}"),
                    elapsed: Some(started.elapsed()),
                });
                OutcomeStatus::Written {
                    path: path.to_string(),
                    warnings: populated.warnings,
                    items_scanned,
                    items_error,
                }
            }
            Err(err) => {
                warn!(collection = id, error = %err, "collection failed");
                sink.event(ProgressEvent {
                    message: format!("failed collection {id}: {err}"),
                    elapsed: Some(started.elapsed()),
                });
                OutcomeStatus::Failed {
                    error: err.to_string(),
                }
            }
        };

        CollectionOutcome {
            id: id.to_string(),
            collection_url: Some(url.to_string()),
            status,
        }
    }

    pub fn output_root(&self) -> &Utf8PathBuf {
        self.output.root()
    }
}
