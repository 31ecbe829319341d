use std::env;

pub const DEFAULT_CLEANUP_SCHEDULE: &str = "0 0 3 * * *";
pub const DEFAULT_PROXY_TEST_URL: &str = "https://api.ipify.org?format=json";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Base URL of the WhatsApp backend service
    pub backend_url: String,
    pub backend_api_key: Option<String>,
    /// Externally reachable URL of this service, used to build the webhook URL
    pub public_url: String,
    pub webhook_secret: Option<String>,
    pub cron_secret: Option<String>,
    pub cleanup_schedule: String,
    pub session_ttl_hours: i64,
    pub message_retention_days: i64,
    pub proxy_test_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let port: u16 = parse_var("PORT", 8080)?;
        let backend_url = non_empty_var("BACKEND_URL")
            .ok_or_else(|| "BACKEND_URL must be set".to_string())?;
        url::Url::parse(&backend_url).map_err(|e| format!("BACKEND_URL is not a valid URL: {}", e))?;

        let public_url = non_empty_var("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        Ok(Self {
            port,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/wahub.db".to_string()),
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_api_key: non_empty_var("BACKEND_API_KEY"),
            public_url: public_url.trim_end_matches('/').to_string(),
            webhook_secret: non_empty_var("WEBHOOK_SECRET"),
            cron_secret: non_empty_var("CRON_SECRET"),
            cleanup_schedule: non_empty_var("CLEANUP_SCHEDULE")
                .unwrap_or_else(|| DEFAULT_CLEANUP_SCHEDULE.to_string()),
            session_ttl_hours: parse_var("SESSION_TTL_HOURS", 168)?,
            message_retention_days: parse_var("MESSAGE_RETENTION_DAYS", 30)?,
            proxy_test_url: non_empty_var("PROXY_TEST_URL")
                .unwrap_or_else(|| DEFAULT_PROXY_TEST_URL.to_string()),
        })
    }

    /// URL the WhatsApp backend should post events to
    pub fn webhook_url(&self) -> String {
        format!("{}/api/webhooks/whatsapp", self.public_url)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            port: 8080,
            database_url: ":memory:".to_string(),
            backend_url: "http://127.0.0.1:9".to_string(),
            backend_api_key: None,
            public_url: "http://localhost:8080".to_string(),
            webhook_secret: None,
            cron_secret: Some("cron-secret".to_string()),
            cleanup_schedule: DEFAULT_CLEANUP_SCHEDULE.to_string(),
            session_ttl_hours: 168,
            message_retention_days: 30,
            proxy_test_url: DEFAULT_PROXY_TEST_URL.to_string(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, String> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("{} must be a valid number, got '{}'", name, raw)),
        None => Ok(default),
    }
}
