//! Application state for the Actix-web server
//!
//! `AppState` is wrapped in `web::Data` and shared by every handler. The
//! pipeline owns the HTTP client and the caches, so handlers never touch
//! shared mutable state directly.

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{Caches, Pipeline};

/// Shared application state for Actix-web handlers
pub struct AppState {
    /// Fetch, decode and parse pipelines with their caches
    pub pipeline: Pipeline,
    /// Application configuration
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let pipeline = Pipeline::new(&config)?;
        Ok(Self { pipeline, config })
    }

    /// State with caller-supplied caches, for tests and embedding hosts
    pub fn with_caches(config: Config, caches: Caches) -> Result<Self> {
        let pipeline = Pipeline::with_caches(&config, caches)?;
        Ok(Self { pipeline, config })
    }
}
