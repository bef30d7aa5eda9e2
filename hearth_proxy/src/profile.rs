// Player avatar lookup with a process-wide cache.
//
// Webhook messages show the player's profile picture. Lookups go to the Xbox
// profile API and are cached per xuid in a `DashMap`, which any session thread
// may read or fill concurrently. Failures fall back to a default avatar and
// are not cached, so a later message retries.

use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_AVATAR_URL: &str = "https://media.forgecdn.net/avatars/121/268/636409261203329160.png";
const PROFILE_API: &str = "https://xbl.io/api/v2/account";
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("profile request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("profile api returned status {0}")]
    Status(u16),
    #[error("profile api rate limit not lifted after {MAX_ATTEMPTS} attempts")]
    RateLimited,
    #[error("profile has no picture setting")]
    Missing,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default)]
    profile_users: Vec<ProfileUser>,
}

#[derive(Deserialize)]
struct ProfileUser {
    #[serde(default)]
    settings: Vec<ProfileSetting>,
}

#[derive(Deserialize)]
struct ProfileSetting {
    value: String,
}

pub struct ProfileCache {
    urls: DashMap<String, String>,
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    initial_backoff: Duration,
}

impl ProfileCache {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProfileError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            urls: DashMap::new(),
            client,
            api_key: api_key.into(),
            base_url: PROFILE_API.to_string(),
            initial_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn cached(&self, xuid: &str) -> Option<String> {
        self.urls.get(xuid).map(|url| url.value().clone())
    }

    pub fn insert(&self, xuid: impl Into<String>, url: impl Into<String>) {
        self.urls.insert(xuid.into(), url.into());
    }

    /// Avatar URL for `xuid`, or the default avatar if it cannot be fetched.
    pub fn avatar_url(&self, xuid: &str) -> String {
        if let Some(url) = self.cached(xuid) {
            return url;
        }
        if self.api_key.is_empty() || xuid.is_empty() {
            return DEFAULT_AVATAR_URL.to_string();
        }
        match self.fetch(xuid) {
            Ok(url) => {
                self.insert(xuid, url.clone());
                url
            }
            Err(e) => {
                debug!(xuid, error = %e, "avatar lookup failed, using default");
                DEFAULT_AVATAR_URL.to_string()
            }
        }
    }

    fn fetch(&self, xuid: &str) -> Result<String, ProfileError> {
        let url = format!("{}/{xuid}", self.base_url);
        let mut backoff = self.initial_backoff;
        for attempt in 1..=MAX_ATTEMPTS {
            let response = match self
                .client
                .get(&url)
                .header("X-Authorization", &self.api_key)
                .send()
            {
                Ok(response) => response,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(error = %e, attempt, "profile api connection error, retrying");
                    thread::sleep(backoff);
                    backoff *= 2;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                warn!(attempt, "profile api rate limited, retrying");
                thread::sleep(retry_after.unwrap_or(backoff));
                backoff *= 2;
                continue;
            }
            if !status.is_success() {
                return Err(ProfileError::Status(status.as_u16()));
            }
            let body: ProfileResponse = response.json()?;
            return body
                .profile_users
                .into_iter()
                .next()
                .and_then(|user| user.settings.into_iter().next())
                .map(|setting| setting.value)
                .ok_or(ProfileError::Missing);
        }
        Err(ProfileError::RateLimited)
    }
}
