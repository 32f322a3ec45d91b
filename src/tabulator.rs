use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{ApiKey, ConfigDocument};
use crate::error::OniError;
use crate::store::{side_file, write_bytes_atomic};

pub const DEFAULT_PROGRAM: &str = "rocrate-tabulator";
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The conversion library the workflow delegates to. Implementations keep
/// their own working configuration between calls.
pub trait Tabulator: Send {
    /// Fetches the crate behind `fetch_url` and writes it as a database at
    /// `destination`. Fails with [`OniError::Conversion`].
    fn crate_to_db(
        &mut self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
    ) -> Result<(), OniError>;

    /// Points later inference and table builds at an already converted
    /// database. Fails with [`OniError::Configuration`] when it is missing.
    fn open_database(&mut self, database: &Path) -> Result<(), OniError>;

    /// Replaces the working configuration with one inferred from the current
    /// database.
    fn infer_config(&mut self) -> Result<(), OniError>;

    fn write_config(&self) -> Result<ConfigDocument, OniError>;

    /// Fails with [`OniError::Configuration`] for a malformed document.
    fn load_config(&mut self, document: &ConfigDocument) -> Result<(), OniError>;

    fn configured_tables(&self) -> Vec<String>;

    /// Fails with [`OniError::TableBuild`].
    fn entity_table(&mut self, table: &str, filter: Option<&str>) -> Result<(), OniError>;
}

#[derive(Debug, Clone)]
pub struct TabulatorOptions {
    pub program: Option<PathBuf>,
    pub timeout: Duration,
    pub retries: usize,
}

impl Default for TabulatorOptions {
    fn default() -> Self {
        Self {
            program: None,
            timeout: Duration::from_secs(300),
            retries: 3,
        }
    }
}

/// Downloads crate metadata over HTTP and drives an external tabulator
/// program for conversion, inference and table builds.
pub struct ProcessTabulator {
    client: Client,
    program: Option<PathBuf>,
    timeout: Duration,
    retries: usize,
    database: Option<PathBuf>,
    config: ConfigDocument,
}

impl ProcessTabulator {
    pub fn new(options: TabulatorOptions) -> Result<Self, OniError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("oni-tab/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| OniError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .map_err(|err| OniError::Http(err.to_string()))?;
        let program = options
            .program
            .or_else(|| find_in_path(DEFAULT_PROGRAM));
        Ok(Self {
            client,
            program,
            timeout: options.timeout,
            retries: options.retries,
            database: None,
            config: ConfigDocument::new(),
        })
    }

    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    pub fn database(&self) -> Option<&Path> {
        self.database.as_deref()
    }

    /// Stores the crate metadata JSON at `destination` after checking it
    /// looks like an RO-Crate.
    pub fn download_crate(
        &self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
    ) -> Result<usize, OniError> {
        let response = self.send_with_retries(|| {
            let request = self.client.get(fetch_url);
            match api_key {
                Some(key) => request.bearer_auth(key.expose()),
                None => request,
            }
        })?;
        let response = handle_status(response)?;
        let body = response
            .bytes()
            .map_err(|err| OniError::Http(err.to_string()))?;
        let payload: Value = serde_json::from_slice(&body)
            .map_err(|err| OniError::Conversion(format!("response is not JSON: {err}")))?;
        let entities = payload
            .get("@graph")
            .and_then(|graph| graph.as_array())
            .map(|graph| graph.len())
            .ok_or_else(|| {
                OniError::Conversion("response is not an RO-Crate: missing @graph".to_string())
            })?;
        write_bytes_atomic(destination, &body)?;
        info!(entities, bytes = body.len(), "downloaded crate metadata");
        Ok(entities)
    }

    fn require_program(&self) -> Result<&Path, OniError> {
        self.program
            .as_deref()
            .ok_or_else(|| OniError::MissingTool(DEFAULT_PROGRAM.to_string()))
    }

    fn require_database(&self) -> Result<&Path, OniError> {
        self.database.as_deref().ok_or_else(|| {
            OniError::Configuration(
                "no collection database yet; retrieve a collection first".to_string(),
            )
        })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, OniError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.retries && is_retryable_status(status) {
                        warn!(status, attempt, "provider busy, retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.retries && is_retryable_error(&err) {
                        warn!(attempt, "provider request failed, retrying");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(OniError::Http(err.to_string()));
                }
            }
        }
    }

    /// Runs the tabulator, killing it once the timeout elapses. Standard error
    /// goes to a scratch file so a chatty tool cannot fill a pipe and stall.
    fn run_tool(
        &self,
        operation: &str,
        args: &[String],
        fail: impl Fn(String) -> OniError,
    ) -> Result<(), OniError> {
        let program = self.require_program()?;
        let mut stderr_file =
            tempfile::tempfile().map_err(|err| OniError::Filesystem(err.to_string()))?;
        let stderr_handle = stderr_file
            .try_clone()
            .map_err(|err| OniError::Filesystem(err.to_string()))?;

        debug!(program = %program.display(), operation, "running tabulator");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(|err| fail(format!("failed to start {}: {err}", program.display())))?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OniError::Timeout {
                        operation: operation.to_string(),
                        seconds: self.timeout.as_secs(),
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => return Err(fail(err.to_string())),
            }
        };
        if status.success() {
            return Ok(());
        }

        let stderr = read_scratch(&mut stderr_file);
        let message = if stderr.is_empty() {
            format!("{operation} failed: {status}")
        } else {
            stderr
        };
        Err(fail(message))
    }

    fn convert(
        &mut self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
    ) -> Result<(), OniError> {
        self.require_program()?;
        let parent = destination
            .parent()
            .ok_or_else(|| OniError::Filesystem("invalid database path".to_string()))?;
        fs::create_dir_all(parent).map_err(|err| OniError::Filesystem(err.to_string()))?;

        let crate_path = side_file(destination, "crate.json");
        self.download_crate(fetch_url, api_key, &crate_path)?;

        let staged = tempfile::Builder::new()
            .prefix(".oni-tab-db")
            .suffix(".db")
            .tempfile_in(parent)
            .map_err(|err| OniError::Filesystem(err.to_string()))?;
        let args = vec![
            "load".to_string(),
            crate_path.to_string_lossy().to_string(),
            staged.path().to_string_lossy().to_string(),
        ];
        self.run_tool("load", &args, OniError::Conversion)?;
        staged
            .persist(destination)
            .map_err(|err| OniError::Filesystem(err.to_string()))?;
        self.database = Some(destination.to_path_buf());
        Ok(())
    }
}

impl Tabulator for ProcessTabulator {
    fn crate_to_db(
        &mut self,
        fetch_url: &str,
        api_key: Option<&ApiKey>,
        destination: &Path,
    ) -> Result<(), OniError> {
        self.convert(fetch_url, api_key, destination)
            .map_err(|err| match err {
                OniError::Conversion(_) => err,
                other => OniError::Conversion(other.to_string()),
            })
    }

    fn open_database(&mut self, database: &Path) -> Result<(), OniError> {
        if !database.is_file() {
            return Err(OniError::Configuration(format!(
                "no collection database at {}; retrieve the collection first",
                database.display()
            )));
        }
        debug!(database = %database.display(), "opened collection database");
        self.database = Some(database.to_path_buf());
        Ok(())
    }

    fn infer_config(&mut self) -> Result<(), OniError> {
        let database = self.require_database()?.to_path_buf();
        let parent = database
            .parent()
            .ok_or_else(|| OniError::Filesystem("invalid database path".to_string()))?;
        let output = tempfile::Builder::new()
            .prefix(".oni-tab-infer")
            .suffix(".json")
            .tempfile_in(parent)
            .map_err(|err| OniError::Filesystem(err.to_string()))?;
        let args = vec![
            "infer".to_string(),
            database.to_string_lossy().to_string(),
            "--output".to_string(),
            output.path().to_string_lossy().to_string(),
        ];
        self.run_tool("infer", &args, OniError::Configuration)?;

        let content = fs::read_to_string(output.path())
            .map_err(|err| OniError::Filesystem(err.to_string()))?;
        let inferred: ConfigDocument = content.parse()?;
        inferred.validate()?;
        info!(tables = inferred.tables().len(), "inferred configuration");
        self.config = inferred;
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

    fn entity_table(&mut self, table: &str, filter: Option<&str>) -> Result<(), OniError> {
        let table_error = |message: String| OniError::TableBuild {
            table: table.to_string(),
            built: 0,
            message,
        };
        let database = self.require_database()?.to_path_buf();
        let config_path = side_file(&database, "config.json");
        let bytes = serde_json::to_vec_pretty(&self.config)
            .map_err(|err| OniError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&config_path, &bytes)?;

        let mut args = vec![
            "table".to_string(),
            database.to_string_lossy().to_string(),
            "--config".to_string(),
            config_path.to_string_lossy().to_string(),
            "--table".to_string(),
            table.to_string(),
        ];
        if let Some(filter) = filter {
            args.push("--filter".to_string());
            args.push(filter.to_string());
        }
        self.run_tool("table", &args, table_error)
    }
}

fn handle_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, OniError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "provider request failed".to_string());
    Err(OniError::HttpStatus { status, message })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn read_scratch(file: &mut File) -> String {
    let mut content = String::new();
    if file.seek(SeekFrom::Start(0)).is_ok() {
        let _ = file.read_to_string(&mut content);
    }
    content.trim().to_string()
}

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}
