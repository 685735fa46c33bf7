use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::interceptor::UsageSink;
use crate::services::graph_cache::GraphCache;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub http_client: reqwest::Client,
    pub graph_cache: Arc<GraphCache>,
    pub usage_sink: Arc<dyn UsageSink>,
}
