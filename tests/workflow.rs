use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use oni_tabulator::app::{App, Notification, ProgressEvent, ProgressSink};
use oni_tabulator::domain::{ApiKey, ConfigDocument};
use oni_tabulator::error::OniError;
use oni_tabulator::provider::ProviderRegistry;
use oni_tabulator::session::SessionState;
use oni_tabulator::store::Store;
use oni_tabulator::tabulator::Tabulator;
use serde_json::json;

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<String>>,
    notifications: Mutex<Vec<Notification>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event.message);
    }

    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// Stand-in tabulator holding its database and configuration in memory.
#[derive(Default)]
struct InMemoryTabulator {
    entities: Vec<String>,
    config: ConfigDocument,
    urls: Vec<String>,
    keys_seen: usize,
    broken_table: Option<String>,
}

impl Tabulator for InMemoryTabulator {
    fn crate_to_db(
        &mut self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
    ) -> Result<(), OniError> {
        if fetch_url.contains("missing") {
            return Err(OniError::Conversion("provider returned 404".to_string()));
        }
        if api_key.is_some() {
            self.keys_seen += 1;
        }
        self.urls.push(fetch_url.to_string());
        self.entities = vec!["RepositoryObject".to_string(), "Person".to_string()];
        std::fs::write(destination, fetch_url).map_err(|err| OniError::Filesystem(err.to_string()))
    }

    fn open_database(&mut self, database: &Path) -> Result<(), OniError> {
        if !database.is_file() {
            return Err(OniError::Configuration(format!(
                "no collection database at {}",
                database.display()
            )));
        }
        self.entities = vec!["RepositoryObject".to_string(), "Person".to_string()];
        Ok(())
    }

    fn infer_config(&mut self) -> Result<(), OniError> {
        let tables: serde_json::Map<String, serde_json::Value> = self
            .entities
            .iter()
            .map(|entity| (entity.clone(), json!({ "all_props": [] })))
            .collect();
        self.config = ConfigDocument::from_value(json!({ "export_queries": {}, "tables": tables }))?;
        Ok(())
    }

    fn write_config(&self) -> Result<ConfigDocument, OniError> {
        Ok(self.config.clone())
    }

    fn load_config(&mut self, document: &ConfigDocument) -> Result<(), OniError> {
        document.validate()?;
        self.config = document.clone();
        Ok(())
    }

    fn configured_tables(&self) -> Vec<String> {
        self.config.tables()
    }

    fn entity_table(&mut self, table: &str, _filter: Option<&str>) -> Result<(), OniError> {
        if self.broken_table.as_deref() == Some(table) {
            return Err(OniError::TableBuild {
                table: table.to_string(),
                built: 0,
                message: "no such entity".to_string(),
            });
        }
        Ok(())
    }
}

fn app(temp: &tempfile::TempDir) -> App<InMemoryTabulator> {
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    App::new(
        Store::new_with_path(root),
        ProviderRegistry::default(),
        InMemoryTabulator::default(),
    )
}

#[test]
fn retrieve_then_parameters_round() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    let key = ApiKey::new("af6391e0-f873-11ee-8355-bae397411a92");

    let retrieved = app
        .retrieve_collection("arcp://name,doi10.26180%2F23961609", key.as_ref(), &RecordingSink::default())
        .unwrap();
    assert_eq!(retrieved.status, "converted");
    assert_eq!(retrieved.tables, vec!["RepositoryObject", "Person"]);
    assert!(retrieved.database_path.ends_with(
        "https_data.ldaca.edu.au_api_object_meta_id_arcp_name,doi10.26180_23961609_noUrid_resolve-parts.db"
    ));

    // The user drops a table before asking for parameters.
    let edited = ConfigDocument::from_value(json!({ "tables": { "Person": {} } })).unwrap();
    app.edit_document(edited.clone());
    assert_eq!(app.session_state(), SessionState::Edited);

    let sink = RecordingSink::default();
    let parameters = app
        .get_table_parameters("arcp://name,doi10.26180%2F23961609", key.as_ref(), edited.clone(), &sink)
        .unwrap();
    assert_eq!(parameters.built_tables, vec!["Person"]);
    assert_eq!(parameters.document, edited);
    assert_eq!(app.document(), &edited);
    assert_eq!(app.session().tabulator().urls.len(), 2);
    assert_eq!(app.session().tabulator().keys_seen, 2);

    let events = sink.events.lock().unwrap();
    let phases: Vec<&str> = events
        .iter()
        .filter_map(|event| event.strip_prefix("phase="))
        .filter_map(|event| event.split(';').next())
        .collect();
    assert_eq!(phases, vec!["Resolve", "Build", "Fetch", "Export"]);
}

#[test]
fn parameters_with_empty_document_infers() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    app.retrieve_collection("corpus", None, &RecordingSink::default())
        .unwrap();

    let result = app
        .get_table_parameters("corpus", None, ConfigDocument::new(), &RecordingSink::default())
        .unwrap();
    assert_eq!(result.built_tables, vec!["RepositoryObject", "Person"]);
    assert_eq!(app.session_state(), SessionState::Inferred);
}

#[test]
fn failed_retrieve_is_reported_not_raised() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    let sink = RecordingSink::default();

    let result = app.retrieve_collection("missing", None, &sink).unwrap();
    assert_eq!(result.status, "failed");
    assert_matches!(result.error.as_deref(), Some(message) if message.contains("404"));
    assert!(result.document.is_empty());
    assert_eq!(sink.notifications.lock().unwrap().len(), 1);
    assert!(!app.busy().is_busy());
}

#[test]
fn table_failure_clears_busy_and_reports_table() {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
    let mut app = App::new(
        Store::new_with_path(root),
        ProviderRegistry::default(),
        InMemoryTabulator {
            broken_table: Some("Person".to_string()),
            ..Default::default()
        },
    );
    app.retrieve_collection("corpus", None, &RecordingSink::default())
        .unwrap();
    let doc = app.document().clone();

    let err = app
        .get_table_parameters("corpus", None, doc, &RecordingSink::default())
        .unwrap_err();
    assert_matches!(
        err,
        OniError::TableBuild { table, built: 1, .. } if table == "Person"
    );
    assert!(!app.busy().is_busy());
}

#[test]
fn malformed_configuration_is_rejected_before_any_build() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    app.retrieve_collection("corpus", None, &RecordingSink::default())
        .unwrap();
    let before = app.document().clone();

    let sink = RecordingSink::default();
    let bad = ConfigDocument::from_value(json!({ "tables": "Person" })).unwrap();
    let err = app.get_table_parameters("corpus", None, bad, &sink).unwrap_err();
    assert_matches!(err, OniError::Configuration(_));
    assert_eq!(app.document(), &before);
    assert!(
        !sink
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|event| event.starts_with("phase=Build"))
    );
}

#[test]
fn concurrent_trigger_is_refused() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    let busy = app.busy().clone();
    let guard = busy.try_begin("Retrieving collection info...").unwrap();

    assert_matches!(
        app.get_table_parameters("corpus", None, ConfigDocument::new(), &RecordingSink::default()),
        Err(OniError::Busy(label)) if label == "Retrieving collection info..."
    );
    drop(guard);
    assert!(
        app.retrieve_collection("corpus", None, &RecordingSink::default())
            .is_ok()
    );
}

#[test]
fn failed_rebuild_is_reported_in_parameters_status() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    // A database converted earlier, but the provider no longer serves it.
    let located = app.locate("missing");
    std::fs::create_dir_all(app.store().data_dir().as_std_path()).unwrap();
    std::fs::write(&located.database_path, b"db").unwrap();

    let doc = ConfigDocument::from_value(json!({ "tables": { "Person": {} } })).unwrap();
    let sink = RecordingSink::default();
    let result = app.get_table_parameters("missing", None, doc.clone(), &sink).unwrap();
    assert_eq!(result.status, "failed");
    assert_matches!(result.error.as_deref(), Some(message) if message.contains("404"));
    assert_eq!(result.built_tables, vec!["Person"]);
    assert_eq!(result.document, doc);
    assert_eq!(sink.notifications.lock().unwrap().len(), 1);
}

#[test]
fn parameters_use_the_requested_collection_database() {
    let temp = tempfile::tempdir().unwrap();
    let mut app = app(&temp);
    app.retrieve_collection("first", None, &RecordingSink::default())
        .unwrap();

    let err = app
        .get_table_parameters("second", None, ConfigDocument::new(), &RecordingSink::default())
        .unwrap_err();
    assert_matches!(err, OniError::Configuration(message) if message.contains("second"));
}
