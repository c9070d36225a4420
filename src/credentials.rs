use std::collections::HashMap;

/// Source of secrets keyed by service name.
pub trait CredentialStore: Send + Sync {
    fn secret(&self, service: &str, key: &str) -> Option<String>;
}

/// Reads `<SERVICE>_<KEY>` from the process environment (after `.env` is loaded).
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self
    }

    pub fn var_name(service: &str, key: &str) -> String {
        format!("{}_{}", service, key)
            .to_ascii_uppercase()
            .replace(['-', '.', ' '], "_")
    }
}

impl CredentialStore for EnvCredentialStore {
    fn secret(&self, service: &str, key: &str) -> Option<String> {
        std::env::var(Self::var_name(service, key))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Fixed in-memory secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    secrets: HashMap<(String, String), String>,
}

impl StaticCredentialStore {
    pub fn with(mut self, service: &str, key: &str, value: &str) -> Self {
        self.secrets.insert(
            (service.to_ascii_lowercase(), key.to_ascii_lowercase()),
            value.to_string(),
        );
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn secret(&self, service: &str, key: &str) -> Option<String> {
        self.secrets
            .get(&(service.to_ascii_lowercase(), key.to_ascii_lowercase()))
            .cloned()
    }
}

/// Slack incoming-webhook credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackCredentials {
    webhook_url: String,
}

impl SlackCredentials {
    pub const SERVICE: &'static str = "slack";

    pub fn from_store(store: &dyn CredentialStore) -> Option<Self> {
        store
            .secret(Self::SERVICE, "webhook_url")
            .map(|webhook_url| Self { webhook_url })
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }
}
