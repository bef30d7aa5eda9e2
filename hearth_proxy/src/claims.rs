// Region (claim) data: lookup service, remote source, and refresher.
//
// `ClaimStore` is the injected lookup interface the claim guards use: a
// point+dimension query returning the claim covering it, and the
// owner/trust test on the returned claim. Its contents are replaced
// wholesale by `refresh` from a `ClaimSource`.
//
// `HttpClaimSource` reads the `claims` table from the region database
// (`GET {host}/api/database/{name}/table/claims`). Rows look like
// `[{"_key": "...", "data": {claim}}]`; claim rectangles are given in block
// coordinates as two corners, normalised here so that min <= max.
//
// `spawn_refresher` reloads the store on a fixed interval until the cancel
// token fires. A failed refresh keeps the previous claims. Retry backoff in
// `HttpClaimSource` waits on the same token, so stopping the refresher never
// sits out a full retry sequence.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hearth_protocol::types::{DIMENSION_END, DIMENSION_NETHER, DIMENSION_OVERWORLD};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::shutdown::CancelToken;

/// Owner id of admin claims.
pub const ADMIN_OWNER: &str = "*";
const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ClaimsError {
    #[error("claims request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("claims source returned status {0}")]
    Status(u16),
    #[error("claims table is malformed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("claims source still failing after {MAX_ATTEMPTS} attempts")]
    Exhausted,
    #[error("claims fetch cancelled")]
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimAction {
    BreakBlock,
    InteractWithBlock,
    InteractWithEntity,
    UseItem,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Claim {
    pub id: String,
    pub owner: String,
    pub trusts: Vec<String>,
    pub dimension: i32,
    pub min_x: i32,
    pub min_z: i32,
    pub max_x: i32,
    pub max_z: i32,
}

impl Claim {
    pub fn contains(&self, dimension: i32, x: i32, z: i32) -> bool {
        self.dimension == dimension
            && (self.min_x..=self.max_x).contains(&x)
            && (self.min_z..=self.max_z).contains(&z)
    }

    pub fn is_admin(&self) -> bool {
        self.owner == ADMIN_OWNER
    }

    /// Anyone may touch blocks and entities in an admin claim; otherwise
    /// only the owner and trusted players may act.
    pub fn allows(&self, xuid: &str, action: ClaimAction) -> bool {
        if self.is_admin()
            && matches!(action, ClaimAction::InteractWithBlock | ClaimAction::InteractWithEntity)
        {
            return true;
        }
        self.owner == xuid || self.trusts.iter().any(|t| t == xuid)
    }
}

/// Map a database dimension name to a dimension id.
pub fn dimension_id(name: &str) -> Option<i32> {
    match name {
        "minecraft:overworld" => Some(DIMENSION_OVERWORLD),
        "minecraft:nether" => Some(DIMENSION_NETHER),
        "minecraft:end" => Some(DIMENSION_END),
        _ => None,
    }
}

#[derive(Deserialize)]
struct Row {
    #[serde(rename = "_key")]
    key: String,
    data: ClaimRecord,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRecord {
    #[serde(default)]
    claim_id: String,
    #[serde(rename = "playerXUID")]
    player_xuid: String,
    location: Location,
    #[serde(default)]
    trusts: Vec<String>,
}

#[derive(Deserialize)]
struct Location {
    dimension: String,
    pos1: Corner,
    pos2: Corner,
}

#[derive(Deserialize)]
struct Corner {
    x: f64,
    z: f64,
}

impl ClaimRecord {
    fn into_claim(self, key: &str) -> Option<Claim> {
        let Some(dimension) = dimension_id(&self.location.dimension) else {
            warn!(claim = key, dimension = %self.location.dimension, "claim has unknown dimension, skipping");
            return None;
        };
        // Coordinates truncate toward zero like the game's block lookup.
        let (x1, z1) = (self.location.pos1.x as i32, self.location.pos1.z as i32);
        let (x2, z2) = (self.location.pos2.x as i32, self.location.pos2.z as i32);
        let id = if self.claim_id.is_empty() {
            key.to_string()
        } else {
            self.claim_id
        };
        Some(Claim {
            id,
            owner: self.player_xuid,
            trusts: self.trusts,
            dimension,
            min_x: x1.min(x2),
            min_z: z1.min(z2),
            max_x: x1.max(x2),
            max_z: z1.max(z2),
        })
    }
}

/// Decode a claims table response into claims keyed by row key.
pub fn parse_rows(body: &str) -> Result<HashMap<String, Claim>, serde_json::Error> {
    let rows: Vec<Row> = serde_json::from_str(body)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let claim = row.data.into_claim(&row.key)?;
            Some((row.key, claim))
        })
        .collect())
}

#[derive(Default)]
pub struct ClaimStore {
    claims: RwLock<HashMap<String, Claim>>,
}

impl ClaimStore {
    pub fn new(claims: HashMap<String, Claim>) -> Self {
        Self {
            claims: RwLock::new(claims),
        }
    }

    pub fn replace(&self, claims: HashMap<String, Claim>) {
        *self.claims.write() = claims;
    }

    pub fn len(&self) -> usize {
        self.claims.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The claim covering block column `(x, z)` in `dimension`, if any.
    pub fn claim_at(&self, dimension: i32, x: i32, z: i32) -> Option<Claim> {
        self.claims
            .read()
            .values()
            .find(|claim| claim.contains(dimension, x, z))
            .cloned()
    }

    /// Reload from `source`. On failure the current claims are kept.
    pub fn refresh(&self, source: &dyn ClaimSource) -> Result<usize, ClaimsError> {
        let claims = source.fetch()?;
        let count = claims.len();
        self.replace(claims);
        info!(count, "loaded claims");
        Ok(count)
    }
}

pub trait ClaimSource: Send + Sync {
    fn fetch(&self) -> Result<HashMap<String, Claim>, ClaimsError>;
}

pub struct HttpClaimSource {
    client: reqwest::blocking::Client,
    url: String,
    key: String,
    initial_backoff: Duration,
    cancel: CancelToken,
}

impl HttpClaimSource {
    pub fn new(host: &str, database: &str, key: &str) -> Result<Self, ClaimsError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: format!(
                "{}/api/database/{database}/table/claims",
                host.trim_end_matches('/')
            ),
            key: key.to_string(),
            initial_backoff: Duration::from_secs(1),
            cancel: CancelToken::new(),
        })
    }

    /// Abandon retries as soon as `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sleep out a retry delay. Returns false if cancelled meanwhile.
    fn back_off(&self, delay: Duration) -> bool {
        !self.cancel.wait_timeout(delay)
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}

impl ClaimSource for HttpClaimSource {
    fn fetch(&self) -> Result<HashMap<String, Claim>, ClaimsError> {
        debug!(url = %self.url, "fetching claims");
        let mut backoff = self.initial_backoff;
        for attempt in 1..=MAX_ATTEMPTS {
            if self.cancel.is_cancelled() {
                return Err(ClaimsError::Cancelled);
            }
            let result = self
                .client
                .get(&self.url)
                .header("Content-Type", "application/json")
                .header("authorization", &self.key)
                .send();
            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, attempt, "claims source connection error, retrying");
                    if attempt == MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    if !self.back_off(backoff) {
                        return Err(ClaimsError::Cancelled);
                    }
                    backoff *= 2;
                    continue;
                }
            };
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                info!(attempt, delay = ?backoff, "claims source rate limited, retrying");
                if attempt < MAX_ATTEMPTS {
                    if !self.back_off(backoff) {
                        return Err(ClaimsError::Cancelled);
                    }
                    backoff *= 2;
                }
                continue;
            }
            if !status.is_success() {
                return Err(ClaimsError::Status(status.as_u16()));
            }
            let body = response.text()?;
            return Ok(parse_rows(&body)?);
        }
        Err(ClaimsError::Exhausted)
    }
}

/// Refresh `store` now and then every `interval` until `cancel` fires.
pub fn spawn_refresher(
    store: std::sync::Arc<ClaimStore>,
    source: Box<dyn ClaimSource>,
    interval: Duration,
    cancel: CancelToken,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("claims-refresh".into())
        .spawn(move || {
            loop {
                match store.refresh(source.as_ref()) {
                    Ok(_) => {}
                    Err(ClaimsError::Cancelled) => {
                        debug!("claims refresher stopped mid-fetch");
                        return;
                    }
                    Err(e) => warn!(error = %e, "claims refresh failed, keeping previous claims"),
                }
                if cancel.wait_timeout(interval) {
                    debug!("claims refresher stopped");
                    return;
                }
            }
        })
}
