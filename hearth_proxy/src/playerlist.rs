// First-seen identity per xuid (`playerlist.json`).
//
// The upstream keys player data by the identity UUID and self-signed id the
// client presents. Those can change between logins, so the proxy records the
// first values it sees for each xuid and replays them on every later dial.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hearth_protocol::types::{ClientData, IdentityData};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::store::{self, StoreError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "playerName")]
    pub player_name: String,
    pub identity: String,
    #[serde(rename = "clientSelfSignedID")]
    pub client_self_signed_id: String,
}

pub struct PlayerList {
    path: PathBuf,
    players: Mutex<BTreeMap<String, PlayerRecord>>,
}

impl PlayerList {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let players = store::load_or_create(&path)?;
        Ok(Self {
            path,
            players: Mutex::new(players),
        })
    }

    pub fn get(&self, xuid: &str) -> Option<PlayerRecord> {
        self.players.lock().get(xuid).cloned()
    }

    /// Return the identity and client data to present upstream. Known xuids
    /// get their recorded values; a new xuid is recorded as seen and its
    /// data is returned unchanged.
    pub fn remember(
        &self,
        identity: &IdentityData,
        client_data: &ClientData,
    ) -> Result<(IdentityData, ClientData), StoreError> {
        let mut players = self.players.lock();
        if let Some(record) = players.get(&identity.xuid) {
            let identity = IdentityData {
                xuid: identity.xuid.clone(),
                display_name: record.player_name.clone(),
                identity: record.identity.clone(),
                title_id: identity.title_id.clone(),
            };
            let client_data = ClientData {
                self_signed_id: record.client_self_signed_id.clone(),
                ..client_data.clone()
            };
            return Ok((identity, client_data));
        }
        players.insert(
            identity.xuid.clone(),
            PlayerRecord {
                player_name: identity.display_name.clone(),
                identity: identity.identity.clone(),
                client_self_signed_id: client_data.self_signed_id.clone(),
            },
        );
        store::save_pretty(&self.path, &*players)?;
        Ok((identity.clone(), client_data.clone()))
    }
}
