pub mod cost_engine;
pub mod credential_store;
pub mod graph_cache;
pub mod model_registry;
pub mod usage_parser;
pub mod usage_store;
