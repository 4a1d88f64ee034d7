use crate::config::Config;
use crate::screening::ScreeningPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ScreeningPipeline,
    pub config: Config,
}
