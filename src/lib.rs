// Library interface for manhuagui_scraper
// The server binary and the integration tests both build on these modules

pub mod api;
pub mod app_state;
pub mod cache;
pub mod config;
pub mod error;
pub mod filters;
pub mod http_client;
pub mod manifest;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod unpacker;

pub use error::{Result, ScrapeError, UnpackError};
