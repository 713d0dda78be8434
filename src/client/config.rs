use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError};

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Client configuration: shared sync settings plus credentials.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    app: AppConfig,
    token: Option<String>,
}

impl ClientConfig {
    pub fn new(app: AppConfig) -> Self {
        Self { app, token: None }
    }

    /// Read `CLIENT_API_URL` and `SYNC_TOKEN`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup("CLIENT_API_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let app = AppConfig::builder().server_url(server_url).build()?;
        let token = lookup("SYNC_TOKEN").filter(|token| !token.is_empty());
        Ok(Self { app, token })
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        Ok(Self::new(builder.build()?))
    }

    /// Set the JWT token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
