use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};
use tempfile::TempDir;

use stac2iso::app::{
    App, EXIT_CATALOG_UNREACHABLE, EXIT_PARTIAL, EXIT_SUCCESS, OutcomeStatus, ProgressEvent,
    ProgressSink,
};
use stac2iso::config::DEFAULT_CATALOG_LABEL;
use stac2iso::domain::{CatalogScope, NO_OVERVIEW_FOUND, TemplateVariant};
use stac2iso::error::Stac2IsoError;
use stac2iso::normalize::NormalizeOptions;
use stac2iso::output::OutputDir;
use stac2iso::populate::{Populator, PopulatorSettings};
use stac2iso::stac::CatalogClient;
use stac2iso::template::Template;
use stac2iso::xml::Namespaces;

const ROOT: &str = "https://catalog.example/stac/collections";
const TEMPLATE: &str = include_str!("fixtures/iso19139_template.xml");

#[derive(Default)]
struct MockCatalog {
    list: Option<Vec<Value>>,
    collections: HashMap<String, Value>,
    items: HashMap<String, Vec<Value>>,
    failing_items: HashSet<String>,
}

impl MockCatalog {
    fn with_list(list: Vec<Value>) -> Self {
        Self {
            list: Some(list),
            ..Self::default()
        }
    }
}

impl CatalogClient for MockCatalog {
    fn fetch_collection_list(&self, catalog_root: &str) -> Result<Vec<Value>, Stac2IsoError> {
        assert_eq!(catalog_root, ROOT);
        self.list
            .clone()
            .ok_or_else(|| Stac2IsoError::CatalogHttp("connection refused".to_string()))
    }

    fn fetch_collection(&self, collection_url: &str) -> Result<Value, Stac2IsoError> {
        self.collections
            .get(collection_url)
            .cloned()
            .ok_or(Stac2IsoError::CatalogStatus {
                status: 404,
                message: "not found".to_string(),
            })
    }

    fn fetch_items(&self, collection_url: &str) -> Result<Vec<Value>, Stac2IsoError> {
        if self.failing_items.contains(collection_url) {
            return Err(Stac2IsoError::CatalogHttp("timed out".to_string()));
        }
        Ok(self.items.get(collection_url).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: RefCell<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.borrow_mut().push(event.message);
    }
}

fn app(client: MockCatalog, output: &TempDir) -> App<MockCatalog> {
    let root = Utf8PathBuf::from_path_buf(output.path().join("out")).unwrap();
    App::new(
        client,
        ROOT,
        Template::from_xml(TEMPLATE).unwrap(),
        Populator::new(PopulatorSettings {
            variant: TemplateVariant::Standard,
            namespaces: Namespaces::default(),
            catalog_label: DEFAULT_CATALOG_LABEL.to_string(),
        }),
        NormalizeOptions::default(),
        OutputDir::new(root),
    )
}

fn collection(id: &str) -> Value {
    json!({
        "id": id,
        "title": format!("{id} title"),
        "links": [{"rel": "self", "href": format!("{ROOT}/{id}")}]
    })
}

fn written_files(app: &App<MockCatalog>) -> Vec<String> {
    let Ok(entries) = fs::read_dir(app.output_root().as_std_path()) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn batch_writes_one_document_per_collection() {
    let dir = TempDir::new().unwrap();
    let mut client = MockCatalog::with_list(vec![collection("A"), collection("B")]);
    client.items.insert(
        format!("{ROOT}/A"),
        vec![json!({"assets": {
            "thumbnail": {"href": "https://data.example/a.png", "type": "image/png"}
        }})],
    );
    let app = app(client, &dir);
    let sink = RecordingSink::default();

    let report = app.run(&CatalogScope::All, None, &sink);

    assert!(report.is_success());
    assert_eq!(report.written().count(), 2);
    assert_eq!(written_files(&app), vec!["A_metadata.xml", "B_metadata.xml"]);

    let xml = fs::read_to_string(app.output_root().join("A_metadata.xml")).unwrap();
    assert!(xml.contains("<gco:CharacterString>A</gco:CharacterString>"));
    assert!(xml.contains("https://data.example/a.png"));
    let xml = fs::read_to_string(app.output_root().join("B_metadata.xml")).unwrap();
    assert!(xml.contains(NO_OVERVIEW_FOUND));

    let messages = sink.messages.borrow();
    assert_eq!(messages[0], "processing collection A");
    assert!(messages[1].starts_with("wrote "));
    assert_eq!(messages[2], "processing collection B");
}

#[test]
fn failed_write_does_not_stop_later_collections() {
    let dir = TempDir::new().unwrap();
    let client = MockCatalog::with_list(vec![collection("A"), collection("B"), collection("C")]);
    let app = app(client, &dir);
    fs::create_dir_all(app.output_root().join("B_metadata.xml")).unwrap();

    let report = app.run(&CatalogScope::All, None, &RecordingSink::default());

    assert!(!report.is_success());
    assert_eq!(report.collections.len(), 3);
    assert_matches!(report.collections[0].status, OutcomeStatus::Written { .. });
    assert_matches!(report.collections[1].status, OutcomeStatus::Failed { .. });
    assert_matches!(report.collections[2].status, OutcomeStatus::Written { .. });
    assert!(app.output_root().join("C_metadata.xml").is_file());
}

#[test]
fn entry_without_id_is_reported_and_skipped() {
    let dir = TempDir::new().unwrap();
    let client = MockCatalog::with_list(vec![json!({"title": "anonymous"}), collection("A")]);
    let app = app(client, &dir);

    let report = app.run(&CatalogScope::All, None, &RecordingSink::default());

    assert_eq!(report.failed().count(), 1);
    assert_matches!(
        &report.collections[0].status,
        OutcomeStatus::Failed { error } if error == "collection entry has no id"
    );
    assert_eq!(written_files(&app), vec!["A_metadata.xml"]);
}

#[test]
fn empty_catalog_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let app = app(MockCatalog::with_list(Vec::new()), &dir);
    let sink = RecordingSink::default();

    let report = app.run(&CatalogScope::All, None, &sink);

    assert!(report.is_success());
    assert!(report.collections.is_empty());
    assert_eq!(*sink.messages.borrow(), vec!["no collections found".to_string()]);
    assert!(written_files(&app).is_empty());
}

#[test]
fn unreachable_catalog_is_recorded() {
    let dir = TempDir::new().unwrap();
    let app = app(MockCatalog::default(), &dir);
    let sink = RecordingSink::default();

    let report = app.run(&CatalogScope::All, None, &sink);

    assert!(!report.is_success());
    assert_matches!(&report.catalog_error, Some(error) if error.contains("connection refused"));
    assert!(report.collections.is_empty());
    assert_eq!(
        *sink.messages.borrow(),
        vec!["collection list request failed".to_string()]
    );
    assert!(written_files(&app).is_empty());
}

#[test]
fn single_collection_honours_output_name() {
    let dir = TempDir::new().unwrap();
    let mut client = MockCatalog::default();
    client
        .collections
        .insert(format!("{ROOT}/S2"), collection("S2"));
    let app = app(client, &dir);

    let report = app.run(
        &CatalogScope::Single("S2".to_string()),
        Some("sentinel.xml"),
        &RecordingSink::default(),
    );

    assert!(report.is_success());
    assert_eq!(report.scope, "collection S2");
    assert_eq!(written_files(&app), vec!["sentinel.xml"]);
    assert_eq!(
        report.collections[0].collection_url.as_deref(),
        Some("https://catalog.example/stac/collections/S2")
    );
}

#[test]
fn single_collection_fetch_failure_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let app = app(MockCatalog::default(), &dir);

    let report = app.run(
        &CatalogScope::Single("missing".to_string()),
        None,
        &RecordingSink::default(),
    );

    assert_matches!(&report.catalog_error, Some(error) if error.contains("404"));
    assert!(report.collections.is_empty());
    assert!(written_files(&app).is_empty());
}

#[test]
fn item_failure_still_writes_document() {
    let dir = TempDir::new().unwrap();
    let mut client = MockCatalog::with_list(vec![collection("A")]);
    client.failing_items.insert(format!("{ROOT}/A"));
    let app = app(client, &dir);

    let report = app.run(&CatalogScope::All, None, &RecordingSink::default());

    assert!(report.is_success());
    assert_matches!(
        &report.collections[0].status,
        OutcomeStatus::Written { items_scanned: 0, items_error: Some(error), .. }
            if error.contains("timed out")
    );
    let xml = fs::read_to_string(app.output_root().join("A_metadata.xml")).unwrap();
    assert!(xml.contains(NO_OVERVIEW_FOUND));
}

#[test]
fn report_serializes_outcome_status() {
    let dir = TempDir::new().unwrap();
    let app = app(MockCatalog::with_list(vec![collection("A"), json!({})]), &dir);

    let report = app.run(&CatalogScope::All, None, &RecordingSink::default());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["catalog_root"], ROOT);
    assert_eq!(json["scope"], "all collections");
    assert_eq!(json["collections"][0]["status"], "written");
    assert_eq!(json["collections"][0]["id"], "A");
    assert_eq!(json["collections"][1]["status"], "failed");
}

#[test]
fn identical_runs_write_identical_bytes() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let first = app(MockCatalog::with_list(vec![collection("A")]), &first_dir);
    let second = app(MockCatalog::with_list(vec![collection("A")]), &second_dir);

    first.run(&CatalogScope::All, None, &RecordingSink::default());
    second.run(&CatalogScope::All, None, &RecordingSink::default());

    assert_eq!(
        fs::read(first.output_root().join("A_metadata.xml")).unwrap(),
        fs::read(second.output_root().join("A_metadata.xml")).unwrap()
    );
}

#[test]
fn batch_exit_codes() {
    let scope = CatalogScope::All;

    let written_dir = TempDir::new().unwrap();
    let written = app(MockCatalog::with_list(vec![collection("A")]), &written_dir);
    let report = written.run(&scope, None, &RecordingSink::default());
    assert_eq!(report.exit_code(&scope), EXIT_SUCCESS);

    let partial_dir = TempDir::new().unwrap();
    let partial = app(
        MockCatalog::with_list(vec![collection("A"), collection("B")]),
        &partial_dir,
    );
    fs::create_dir_all(partial.output_root().join("A_metadata.xml")).unwrap();
    let report = partial.run(&scope, None, &RecordingSink::default());
    assert_eq!(report.exit_code(&scope), EXIT_PARTIAL);

    let unreachable_dir = TempDir::new().unwrap();
    let unreachable = app(MockCatalog::default(), &unreachable_dir);
    let report = unreachable.run(&scope, None, &RecordingSink::default());
    assert_eq!(report.exit_code(&scope), EXIT_PARTIAL);
}

#[test]
fn single_scope_exit_codes() {
    let scope = CatalogScope::Single("S2".to_string());

    let missing_dir = TempDir::new().unwrap();
    let missing = app(MockCatalog::default(), &missing_dir);
    let report = missing.run(&scope, None, &RecordingSink::default());
    assert_eq!(report.exit_code(&scope), EXIT_CATALOG_UNREACHABLE);

    let blocked_dir = TempDir::new().unwrap();
    let mut client = MockCatalog::default();
    client.collections.insert(format!("{ROOT}/S2"), collection("S2"));
    let blocked = app(client, &blocked_dir);
    fs::create_dir_all(blocked.output_root().join("S2_metadata.xml")).unwrap();
    let report = blocked.run(&scope, None, &RecordingSink::default());
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.exit_code(&scope), EXIT_PARTIAL);
}
