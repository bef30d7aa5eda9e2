// Admission control: the allow-list and the slot arithmetic.
//
// `admit` decides whether a player may take a slot given the upstream's live
// status. The last `secured_slots` slots are reserved for allow-listed
// players:
//
// - allow-listed players are refused only when the server is full (C >= M);
// - everyone else is refused once the unreserved slots are used (C >= M - S).
//
// `AllowList` is the persisted name -> xuid mapping (`allowlist.json`). A
// lookup matches on xuid or on name, case-insensitively, and repairs the
// entry in place when a player renamed or when the entry was added by name
// with a `"none"` placeholder xuid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hearth_protocol::packet::StatusResponse;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::store::{self, StoreError};

/// Xuid placeholder for entries added by name only.
pub const UNKNOWN_XUID: &str = "none";

/// Decide whether `name` may join. The error is the disconnect reason.
pub fn admit(
    status: &StatusResponse,
    secured_slots: u32,
    allow_listed: bool,
    name: &str,
) -> Result<(), String> {
    let current = status.player_count;
    let max = status.max_players;
    if current < max.saturating_sub(secured_slots) {
        return Ok(());
    }
    if allow_listed {
        if current >= max {
            return Err(format!(
                "Sorry {name}, even though you have priority access, all secured slots are taken! ({current}/{max})"
            ));
        }
        return Ok(());
    }
    if current < max {
        return Err(format!(
            "Sorry {name}, even though the server is not full, the remaining slots are reserved for our staff! ({current}/{max})"
        ));
    }
    Err(format!(
        "Sorry {name}, the server is full, please try again later! ({current}/{max})"
    ))
}

pub struct AllowList {
    path: PathBuf,
    players: Mutex<BTreeMap<String, String>>,
}

impl AllowList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let players = store::load_or_create(&path)?;
        Ok(Self {
            path,
            players: Mutex::new(players),
        })
    }

    pub fn len(&self) -> usize {
        self.players.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the name -> xuid mapping.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.players.lock().clone()
    }

    /// Add or replace an entry and persist it.
    pub fn insert(&self, name: &str, xuid: &str) -> Result<(), StoreError> {
        let mut players = self.players.lock();
        players.insert(name.to_string(), xuid.to_string());
        store::save_pretty(&self.path, &*players)
    }

    /// Whether the player is allow-listed, repairing a stale entry if the
    /// match was only partial. A failed save is logged; the answer stands.
    pub fn contains(&self, name: &str, xuid: &str) -> bool {
        let mut players = self.players.lock();

        let by_xuid = (!xuid.is_empty())
            .then(|| {
                players
                    .iter()
                    .find(|(_, stored)| stored.eq_ignore_ascii_case(xuid))
                    .map(|(stored_name, _)| stored_name.clone())
            })
            .flatten();
        if let Some(stored_name) = by_xuid {
            if !stored_name.eq_ignore_ascii_case(name) {
                info!(old = %stored_name, new = name, xuid, "allow-list entry renamed");
                players.remove(&stored_name);
                players.insert(name.to_string(), xuid.to_string());
                self.persist(&players);
            }
            return true;
        }

        let by_name = players
            .keys()
            .find(|stored_name| stored_name.eq_ignore_ascii_case(name))
            .cloned();
        let Some(stored_name) = by_name else {
            return false;
        };
        if !xuid.is_empty() && players.get(&stored_name).is_some_and(|x| x == UNKNOWN_XUID) {
            info!(name = %stored_name, xuid, "allow-list xuid filled in");
            players.insert(stored_name, xuid.to_string());
            self.persist(&players);
        }
        true
    }

    fn persist(&self, players: &BTreeMap<String, String>) {
        if let Err(e) = store::save_pretty(&self.path, players) {
            warn!(error = %e, "failed to save allow-list");
        }
    }
}
