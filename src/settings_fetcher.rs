//! An HTTP client that fetches project settings from the settings CDN.

use chrono::Utc;
use reqwest::{StatusCode, Url};

use crate::{Error, ProjectSettings, Result};

pub struct SettingsFetcherConfig {
    pub base_url: String,
    pub write_key: String,
    /// SDK name reported to the server.
    pub sdk_name: String,
    /// Version of SDK.
    pub sdk_version: String,
}

/// Default base URL for settings fetches.
pub const DEFAULT_BASE_URL: &str = "https://cdn-settings.beacon-analytics.dev/v1";

const SETTINGS_ENDPOINT: &str = "/projects";

/// A client that fetches [`ProjectSettings`] from the server.
pub struct SettingsFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    config: SettingsFetcherConfig,
    /// If we receive a 401 Unauthorized error during a request, it means the write key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
}

impl SettingsFetcher {
    pub fn new(config: SettingsFetcherConfig) -> SettingsFetcher {
        let client = reqwest::blocking::Client::new();

        SettingsFetcher {
            client,
            config,
            unauthorized: false,
        }
    }

    /// Fetch a fresh settings snapshot, stamping it with the fetch time.
    pub fn fetch_settings(&mut self) -> Result<ProjectSettings> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let url = Url::parse_with_params(
            &format!(
                "{}{}/{}/settings",
                self.config.base_url, SETTINGS_ENDPOINT, self.config.write_key
            ),
            &[
                ("sdkName", &*self.config.sdk_name),
                ("sdkVersion", &*self.config.sdk_version),
            ],
        )
        .map_err(Error::InvalidBaseUrl)?;

        log::debug!(target: "beacon", "fetching project settings");
        let response = self.client.get(url).send()?;

        let response = response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "beacon", "client is not authorized. Check your write key");
                self.unauthorized = true;
                Error::Unauthorized
            } else {
                log::warn!(target: "beacon", "received non-200 response while fetching settings: {:?}", err);
                Error::from(err)
            }
        })?;

        let mut settings: ProjectSettings = response.json()?;
        settings.fetched_at = Some(Utc::now());

        log::debug!(target: "beacon", "successfully fetched project settings");

        Ok(settings)
    }
}
