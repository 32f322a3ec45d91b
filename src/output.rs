use std::io::{self, Write};

use serde::Serialize;
use tracing::{error, info};

use crate::app::{
    LocateResult, Notification, ParametersResult, ProgressEvent, ProgressSink, RetrieveResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_locate(result: &LocateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_retrieve(result: &RetrieveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_parameters(result: &ParametersResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

// Stdout carries only the JSON result; notifications go to the log.
impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}

    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Info(message) => info!("{message}"),
            Notification::Error(message) => error!("{message}"),
        }
    }
}
