use mongodb::options::{ClientOptions, Credential};

use crate::config::ConnectionSettings;

use super::error::{MongoDaoError, MongoResult};

const APP_NAME: &str = "games-console";

/// Client options plus the database and collection to operate on.
#[derive(Clone)]
pub struct MongoConfig {
    /// Driver options parsed from the endpoint.
    pub options: ClientOptions,
    /// Database name.
    pub database_name: String,
    /// Collection holding the documents.
    pub collection_name: String,
    /// Initial ping attempts before giving up.
    pub connect_attempts: u32,
}

impl MongoConfig {
    /// Parse the connection string and attach credentials when a username is configured.
    ///
    /// The auth key doubles as the password, matching account-key style
    /// document services.
    pub async fn from_settings(settings: &ConnectionSettings) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(&settings.endpoint_url)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: settings.endpoint_url.clone(),
                source,
            })?;
        options.app_name = Some(APP_NAME.to_owned());
        if let Some(username) = &settings.username {
            options.credential = Some(
                Credential::builder()
                    .username(username.clone())
                    .password(settings.auth_key.clone())
                    .build(),
            );
        }

        Ok(Self {
            options,
            database_name: settings.database.clone(),
            collection_name: settings.collection.clone(),
            connect_attempts: settings.connect_attempts.max(1),
        })
    }
}
