use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::app::{Notification, ProgressEvent, ProgressSink};
use crate::domain::{ApiKey, ConfigDocument};
use crate::error::OniError;
use crate::tabulator::Tabulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Inferred,
    Loaded,
    Edited,
}

/// Outcome of handing a collection to the tabulator. A failed conversion is
/// reported, not raised.
#[derive(Debug)]
pub enum Retrieval {
    Converted,
    Failed(OniError),
}

impl Retrieval {
    pub fn is_converted(&self) -> bool {
        matches!(self, Retrieval::Converted)
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            Retrieval::Converted => None,
            Retrieval::Failed(err) => Some(err.to_string()),
        }
    }
}

/// The configuration document shown to the user, kept in step with the
/// tabulator's working configuration.
pub struct ConfigurationSession<T: Tabulator> {
    tabulator: T,
    document: ConfigDocument,
    state: SessionState,
}

impl<T: Tabulator> ConfigurationSession<T> {
    pub fn new(tabulator: T) -> Self {
        Self {
            tabulator,
            document: ConfigDocument::new(),
            state: SessionState::Empty,
        }
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tabulator(&self) -> &T {
        &self.tabulator
    }

    pub fn edit(&mut self, document: ConfigDocument) {
        self.document = document;
        self.state = SessionState::Edited;
    }

    pub fn retrieve(
        &mut self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Retrieval, OniError> {
        match self.tabulator.crate_to_db(fetch_url, api_key, destination) {
            Ok(()) => {
                info!(database = %destination.display(), "collection converted");
                Ok(Retrieval::Converted)
            }
            Err(err) if err.is_conversion() => {
                warn!(error = %err, "collection conversion failed");
                sink.notify(Notification::Error(err.to_string()));
                Ok(Retrieval::Failed(err))
            }
            Err(err) => Err(err),
        }
    }

    pub fn open_database(&mut self, database: &Path) -> Result<(), OniError> {
        self.tabulator.open_database(database)
    }

    pub fn infer_configuration(&mut self) -> Result<&ConfigDocument, OniError> {
        self.tabulator.infer_config()?;
        self.document = self.tabulator.write_config()?;
        self.state = SessionState::Inferred;
        Ok(&self.document)
    }

    /// Loads a non-empty document into the tabulator; an empty one means
    /// "infer from scratch".
    pub fn apply_configuration(&mut self, document: ConfigDocument) -> Result<(), OniError> {
        if document.is_empty() {
            self.infer_configuration()?;
            return Ok(());
        }
        self.tabulator.load_config(&document)?;
        self.document = document;
        self.state = SessionState::Loaded;
        Ok(())
    }

    /// Builds every configured table in order and stops at the first failure.
    pub fn materialize_tables(&mut self, sink: &dyn ProgressSink) -> Result<Vec<String>, OniError> {
        let tables = self.tabulator.configured_tables();
        let mut built = Vec::with_capacity(tables.len());
        for table in tables {
            sink.event(ProgressEvent::new(format!("phase=Build; table {table}")));
            if let Err(err) = self.tabulator.entity_table(&table, None) {
                let message = match err {
                    OniError::TableBuild { message, .. } => message,
                    other => other.to_string(),
                };
                return Err(OniError::TableBuild {
                    table,
                    built: built.len(),
                    message,
                });
            }
            built.push(table);
        }
        Ok(built)
    }

    pub fn refresh(
        &mut self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<Retrieval, OniError> {
        let retrieval = self.retrieve(fetch_url, api_key, destination, sink)?;
        self.export_document()?;
        Ok(retrieval)
    }

    pub fn export_document(&mut self) -> Result<&ConfigDocument, OniError> {
        self.document = self.tabulator.write_config()?;
        Ok(&self.document)
    }
}
