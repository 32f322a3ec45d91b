use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::busy::BusyState;
use crate::domain::{ApiKey, ConfigDocument};
use crate::error::OniError;
use crate::locator::collection_url;
use crate::provider::ProviderRegistry;
use crate::session::{ConfigurationSession, Retrieval, SessionState};
use crate::store::Store;
use crate::tabulator::Tabulator;

pub const RETRIEVE_LABEL: &str = "Retrieving collection info...";
pub const PARAMETERS_LABEL: &str = "Obtaining parameters...";

#[derive(Debug, Clone, Serialize)]
pub struct LocateResult {
    pub provider: String,
    pub collection_id: String,
    pub fetch_url: String,
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResult {
    pub provider: String,
    pub collection_id: String,
    pub fetch_url: String,
    pub database_path: String,
    pub status: String,
    pub error: Option<String>,
    pub tables: Vec<String>,
    pub document: ConfigDocument,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParametersResult {
    pub provider: String,
    pub collection_id: String,
    pub database_path: String,
    pub built_tables: Vec<String>,
    pub status: String,
    pub error: Option<String>,
    pub document: ConfigDocument,
    pub finished_at: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "lowercase")]
pub enum Notification {
    Info(String),
    Error(String),
}

impl Notification {
    pub fn message(&self) -> &str {
        match self {
            Notification::Info(message) | Notification::Error(message) => message,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);

    fn notify(&self, notification: Notification) {
        self.event(ProgressEvent::new(notification.message()));
    }
}

/// The retrieval and configuration workflow behind both front-ends.
pub struct App<T: Tabulator> {
    store: Store,
    providers: ProviderRegistry,
    session: ConfigurationSession<T>,
    busy: BusyState,
}

impl<T: Tabulator> App<T> {
    pub fn new(store: Store, providers: ProviderRegistry, tabulator: T) -> Self {
        Self {
            store,
            providers,
            session: ConfigurationSession::new(tabulator),
            busy: BusyState::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn providers_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.providers
    }

    pub fn session(&self) -> &ConfigurationSession<T> {
        &self.session
    }

    pub fn busy(&self) -> &BusyState {
        &self.busy
    }

    pub fn document(&self) -> &ConfigDocument {
        self.session.document()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn add_provider(&mut self, provider: &str) -> bool {
        self.providers.add(provider)
    }

    pub fn select_provider(&mut self, provider: &str) -> Result<(), OniError> {
        self.providers.select(provider)
    }

    pub fn edit_document(&mut self, document: ConfigDocument) {
        self.session.edit(document);
    }

    pub fn locate(&self, collection_id: &str) -> LocateResult {
        let provider = self.providers.selected().to_string();
        let fetch_url = collection_url(&provider, collection_id);
        let database_path = self.store.database_path(&fetch_url).to_string();
        LocateResult {
            provider,
            collection_id: collection_id.trim_end().to_string(),
            fetch_url,
            database_path,
        }
    }

    /// Converts the collection, then replaces the session document with an
    /// inferred configuration. A failed conversion is reported and the
    /// document is left as it was.
    pub fn retrieve_collection(
        &mut self,
        collection_id: &str,
        api_key: Option<&ApiKey>,
        sink: &dyn ProgressSink,
    ) -> Result<RetrieveResult, OniError> {
        let _busy = self.busy.try_begin(RETRIEVE_LABEL)?;
        let start = Instant::now();
        let target = self.locate(collection_id);
        sink.event(ProgressEvent::new(format!(
            "phase=Resolve; {}",
            target.fetch_url
        )));
        self.store.ensure_data_dir()?;

        sink.event(ProgressEvent::new("phase=Fetch; converting collection"));
        let retrieval = self.session.retrieve(
            &target.fetch_url,
            api_key,
            Path::new(&target.database_path),
            sink,
        )?;

        if retrieval.is_converted() {
            sink.event(ProgressEvent::new("phase=Infer; inferring configuration"));
            self.session.infer_configuration()?;
            info!(
                collection = %target.collection_id,
                tables = self.session.document().tables().len(),
                "collection retrieved"
            );
        }
        finish(sink, start);

        Ok(RetrieveResult {
            provider: target.provider,
            collection_id: target.collection_id,
            fetch_url: target.fetch_url,
            database_path: target.database_path,
            status: status_label(&retrieval).to_string(),
            error: retrieval.error_message(),
            tables: self.session.document().tables(),
            document: self.session.document().clone(),
            finished_at: iso_timestamp(),
        })
    }

    /// Loads `document` (or infers when it is empty), builds every configured
    /// table, rebuilds the database and re-exports the configuration.
    pub fn get_table_parameters(
        &mut self,
        collection_id: &str,
        api_key: Option<&ApiKey>,
        document: ConfigDocument,
        sink: &dyn ProgressSink,
    ) -> Result<ParametersResult, OniError> {
        let _busy = self.busy.try_begin(PARAMETERS_LABEL)?;
        let start = Instant::now();
        let target = self.locate(collection_id);
        self.session
            .open_database(Path::new(&target.database_path))?;

        if document.is_empty() {
            sink.event(ProgressEvent::new("phase=Infer; inferring configuration"));
        } else {
            sink.event(ProgressEvent::new("phase=Resolve; loading configuration"));
        }
        self.session.apply_configuration(document)?;
        let built_tables = self.session.materialize_tables(sink)?;

        self.store.ensure_data_dir()?;
        sink.event(ProgressEvent::new("phase=Fetch; rebuilding database"));
        let retrieval = self.session.refresh(
            &target.fetch_url,
            api_key,
            Path::new(&target.database_path),
            sink,
        )?;
        sink.event(ProgressEvent::new("phase=Export; configuration refreshed"));
        info!(
            collection = %target.collection_id,
            tables = built_tables.len(),
            "table parameters obtained"
        );
        finish(sink, start);

        Ok(ParametersResult {
            provider: target.provider,
            collection_id: target.collection_id,
            database_path: target.database_path,
            built_tables,
            status: status_label(&retrieval).to_string(),
            error: retrieval.error_message(),
            document: self.session.document().clone(),
            finished_at: iso_timestamp(),
        })
    }
}

fn status_label(retrieval: &Retrieval) -> &'static str {
    match retrieval {
        Retrieval::Converted => "converted",
        Retrieval::Failed(_) => "failed",
    }
}

fn finish(sink: &dyn ProgressSink, start: Instant) {
    let elapsed = start.elapsed();
    sink.event(ProgressEvent {
        message: format!("done latency_ms={}", elapsed.as_millis()),
        elapsed: Some(elapsed),
    });
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use camino::Utf8PathBuf;
    use serde_json::json;

    use super::*;
    use crate::output::JsonOutput;

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

    #[derive(Default)]
    struct MockTabulator {
        config: ConfigDocument,
        unreachable: bool,
    }

    impl Tabulator for MockTabulator {
        fn crate_to_db(
            &mut self,
            _fetch_url: &str,
            _api_key: Option<&ApiKey>,
            destination: &Path,
        ) -> Result<(), OniError> {
            if self.unreachable {
                return Err(OniError::Conversion("provider unreachable".to_string()));
            }
            std::fs::write(destination, b"db").map_err(|err| OniError::Filesystem(err.to_string()))
        }

        fn open_database(&mut self, database: &Path) -> Result<(), OniError> {
            if !database.is_file() {
                return Err(OniError::Configuration("no collection database".to_string()));
            }
            Ok(())
        }

        fn infer_config(&mut self) -> Result<(), OniError> {
            self.config =
                ConfigDocument::from_value(json!({ "tables": { "Person": {} } })).unwrap();
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

        fn entity_table(&mut self, _table: &str, _filter: Option<&str>) -> Result<(), OniError> {
            Ok(())
        }
    }

    fn app_in(temp: &tempfile::TempDir, tabulator: MockTabulator) -> App<MockTabulator> {
        let root = Utf8PathBuf::from_path_buf(temp.path().join("data")).unwrap();
        App::new(
            Store::new_with_path(root),
            ProviderRegistry::default(),
            tabulator,
        )
    }

    #[test]
    fn retrieve_writes_database_and_infers() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app_in(&temp, MockTabulator::default());

        let result = app
            .retrieve_collection("arcp://name,corpus ", None, &JsonOutput)
            .unwrap();
        assert_eq!(result.status, "converted");
        assert_eq!(result.tables, vec!["Person"]);
        assert!(Path::new(&result.database_path).exists());
        assert!(result.database_path.ends_with(".db"));
        assert_eq!(app.session_state(), SessionState::Inferred);
        assert!(!app.busy().is_busy());
    }

    #[test]
    fn failed_retrieve_notifies_and_keeps_document() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app_in(
            &temp,
            MockTabulator {
                unreachable: true,
                ..Default::default()
            },
        );
        let edited = ConfigDocument::from_value(json!({ "tables": ["Person"] })).unwrap();
        app.edit_document(edited.clone());

        let sink = RecordingSink::default();
        let result = app.retrieve_collection("x", None, &sink).unwrap();
        assert_eq!(result.status, "failed");
        assert_eq!(app.document(), &edited);
        assert_eq!(app.session_state(), SessionState::Edited);
        assert_matches!(
            sink.notifications.lock().unwrap().as_slice(),
            [Notification::Error(message)] if message.contains("provider unreachable")
        );
    }

    #[test]
    fn busy_rejects_overlapping_operation() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app_in(&temp, MockTabulator::default());
        let busy = app.busy().clone();
        let _held = busy.try_begin("elsewhere").unwrap();

        let err = app.retrieve_collection("x", None, &JsonOutput).unwrap_err();
        assert_matches!(err, OniError::Busy(_));
    }

    #[test]
    fn parameters_cycle_emits_phases() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app_in(&temp, MockTabulator::default());
        app.retrieve_collection("x", None, &JsonOutput).unwrap();

        let sink = RecordingSink::default();
        let doc = app.document().clone();
        let result = app.get_table_parameters("x", None, doc, &sink).unwrap();
        assert_eq!(result.built_tables, vec!["Person"]);

        let events = sink.events.lock().unwrap();
        assert!(events.iter().any(|event| event == "phase=Build; table Person"));
        assert!(events.last().unwrap().starts_with("done latency_ms="));
    }

    #[test]
    fn parameters_without_database_fails_before_building() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app_in(&temp, MockTabulator::default());
        let sink = RecordingSink::default();

        let err = app
            .get_table_parameters("never-retrieved", None, ConfigDocument::new(), &sink)
            .unwrap_err();
        assert_matches!(err, OniError::Configuration(_));
        assert!(sink.events.lock().unwrap().is_empty());
        assert!(!app.busy().is_busy());
    }

    #[test]
    fn locate_uses_selected_provider() {
        let temp = tempfile::tempdir().unwrap();
        let mut app = app_in(&temp, MockTabulator::default());
        app.add_provider("https://oni.example.org");

        let located = app.locate("abc  ");
        assert_eq!(located.collection_id, "abc");
        assert_eq!(
            located.fetch_url,
            "https://oni.example.org/api/object/meta?id=abc&noUrid&resolve-parts"
        );
        assert!(located.database_path.ends_with(
            "https_oni.example.org_api_object_meta_id_abc_noUrid_resolve-parts.db"
        ));
    }
}
