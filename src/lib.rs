pub mod app;
pub mod busy;
pub mod config;
pub mod domain;
pub mod error;
pub mod locator;
pub mod output;
pub mod provider;
pub mod session;
pub mod store;
pub mod tabulator;
pub mod tui;
