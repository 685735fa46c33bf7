use std::env;

/// Process-wide configuration, loaded once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_addr: String,
    pub admin_key: String,

    /// Azure deployment name, e.g. "gpt4-prod".
    pub deployment_name: String,
    /// Azure resource host suffix, e.g. "openai.azure.com".
    pub base_url: String,
    /// Azure resource name, also used as the Models Endpoint fallback.
    pub ressource_name: String,
    /// Shared upstream secret. Sent as `Api-Key` (Azure) or
    /// `Authorization: Bearer` (OpenAI-shape backends).
    pub azure_api_key: String,

    /// Backend used when the client sends no `Backend:` header.
    pub default_backend: String,

    /// CSV of model ids to seed the Configured Model table with at startup
    /// when the table is otherwise empty.
    pub models: Option<String>,
    pub azure_use_model: Option<String>,
    /// `owned_by` field in the Models Endpoint response.
    pub models_owner: String,

    /// Display timezone for dashboards (not used by the core, kept for
    /// parity with the admin surface this proxy feeds).
    pub timezone: String,

    pub dev_log_token_count: bool,
    pub dev_log_token_debug: bool,
    pub dev_log_raw_response: bool,
    pub dev_log_request: bool,
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => v == "1",
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = match env::var("DATABASE_PATH") {
            Ok(path) => path,
            Err(_) => {
                let username = env::var("DATABASE_USERNAME").unwrap_or_default();
                let password = env::var("DATABASE_PASSWORD").unwrap_or_default();
                let host = env::var("DATABASE_HOST").unwrap_or_default();
                let name = env::var("DATABASE_NAME").unwrap_or_default();
                if host.is_empty() || name.is_empty() {
                    anyhow::bail!(
                        "DATABASE_PATH or DATABASE_{{USERNAME,PASSWORD,HOST,NAME}} is required"
                    );
                }
                format!("postgresql://{username}:{password}@{host}/{name}")
            }
        };

        Ok(Self {
            database_url,
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8082".into()),
            admin_key: env::var("ADMIN_KEY")
                .map_err(|_| anyhow::anyhow!("ADMIN_KEY is required"))?,

            deployment_name: env::var("DEPLOYMENT_NAME").unwrap_or_default(),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| "openai.azure.com".into()),
            ressource_name: env::var("RESSOURCE_NAME").unwrap_or_default(),
            azure_api_key: env::var("AZURE_API_KEY").unwrap_or_default(),

            default_backend: env::var("DEFAULT_BACKEND").unwrap_or_else(|_| "azure".into()),

            models: env::var("MODELS").ok(),
            azure_use_model: env::var("AZURE_USE_MODEL").ok(),
            models_owner: env::var("MODELS_OWNER").unwrap_or_else(|_| "system".into()),

            timezone: env::var("TIMEZONE").unwrap_or_else(|_| "Europe/Berlin".into()),

            dev_log_token_count: parse_bool_env("DEV_LOG_TOKEN_COUNT", false),
            dev_log_token_debug: parse_bool_env("DEV_LOG_TOKEN_DEBUG", false),
            dev_log_raw_response: parse_bool_env("DEV_LOG_RAW_RESPONSE", false),
            dev_log_request: parse_bool_env("DEV_LOG_REQUEST", false),
        })
    }

    /// The models-table seed list, in priority order: `MODELS` (CSV), then
    /// `RESSOURCE_NAME`, then `AZURE_USE_MODEL`. Empty if none are set.
    pub fn fallback_models(&self) -> Vec<String> {
        if let Some(csv) = &self.models {
            return csv
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if !self.ressource_name.is_empty() {
            return vec![self.ressource_name.clone()];
        }
        if let Some(m) = &self.azure_use_model {
            if !m.is_empty() {
                return vec![m.clone()];
            }
        }
        Vec::new()
    }

    pub fn azure_base(&self) -> String {
        format!("https://{}.{}/openai", self.deployment_name, self.base_url)
    }
}
