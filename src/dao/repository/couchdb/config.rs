use crate::config::ConnectionSettings;

/// Runtime configuration describing how to reach the CouchDB database.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL, optionally with a path prefix.
    pub base_url: String,
    /// Database holding every collection.
    pub database: String,
    /// Logical collection; becomes the document id prefix.
    pub collection: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
}

impl CouchConfig {
    /// Anonymous access to `collection` inside `database`.
    pub fn new(
        base_url: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            collection: collection.into(),
            username: None,
            password: None,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Map the shared connection settings; the auth key is used as the password.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        let config = Self::new(
            settings.endpoint_url.trim(),
            settings.database.as_str(),
            settings.collection.as_str(),
        );
        match &settings.username {
            Some(username) => config.with_credentials(username, settings.auth_key.as_str()),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_require_a_username() {
        let mut settings = ConnectionSettings {
            endpoint_url: " http://localhost:5984/ ".into(),
            auth_key: "secret".into(),
            ..ConnectionSettings::default()
        };
        let config = CouchConfig::from_settings(&settings);
        assert_eq!(config.base_url, "http://localhost:5984/");
        assert_eq!(config.username, None);

        settings.username = Some("admin".into());
        let config = CouchConfig::from_settings(&settings);
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.collection, "Games");
    }
}
