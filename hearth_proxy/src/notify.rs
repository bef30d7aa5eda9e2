// Outbound operator notifications.
//
// Sessions and handlers report events through the `Notifier` trait. The
// production `WebhookNotifier` renders each event into an HTTP delivery
// (a Discord webhook payload or a moderation API call) and posts it from a
// short-lived thread, so a slow or failing sink never stalls a relay loop.
// Sinks whose URL is not configured drop events with a debug log.
//
// `render` is pure and covers the payload shapes; `MemoryNotifier` records
// events for tests and embedders that want to observe them.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::profile::{DEFAULT_AVATAR_URL, ProfileCache};

/// Embed colour of staff alerts (red).
pub const ALERT_COLOR: u32 = 16_711_680;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// Something an operator should investigate.
    StaffAlert {
        title: String,
        description: String,
        fields: Vec<(String, String)>,
    },
    /// A chat message typed by a player.
    ChatMirror {
        player: String,
        xuid: String,
        message: String,
    },
    /// A command run by a player.
    CommandLog {
        player: String,
        xuid: String,
        command: String,
    },
    /// A player finished joining.
    PlayerDetails {
        xuid: String,
        name: String,
        ip: String,
    },
}

pub trait Notifier: Send + Sync {
    /// Fire-and-forget delivery.
    fn notify(&self, notification: Notification);
}

/// A rendered HTTP POST.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub url: String,
    pub body: Value,
    pub authorization: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct Sinks {
    staff_alerts: String,
    chat_logs: String,
    command_logs: String,
    player_details: String,
    api_key: String,
    prefix: String,
}

pub struct WebhookNotifier {
    sinks: Sinks,
    client: reqwest::blocking::Client,
    profiles: Arc<ProfileCache>,
}

impl WebhookNotifier {
    pub fn new(config: &Config, profiles: Arc<ProfileCache>) -> Result<Self, reqwest::Error> {
        let logging = &config.logging;
        let enabled = |url: &str| {
            if logging.discord_logging_enabled {
                url.to_string()
            } else {
                String::new()
            }
        };
        let player_details = if config.api.api_host.is_empty() {
            String::new()
        } else {
            format!(
                "{}/api/moderation/playerDetails",
                config.api.api_host.trim_end_matches('/')
            )
        };
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            sinks: Sinks {
                staff_alerts: enabled(&logging.staff_alerts_webhook),
                chat_logs: enabled(&logging.chat_logs_webhook),
                command_logs: enabled(&logging.command_logs_webhook),
                player_details,
                api_key: config.api.api_key.clone(),
                prefix: config.server.prefix.clone(),
            },
            client,
            profiles,
        })
    }

    /// Build the HTTP delivery for `notification`, or `None` when its sink
    /// is disabled. `avatar_url` is used for player-attributed messages.
    pub fn render(&self, notification: &Notification, avatar_url: &str) -> Option<Delivery> {
        let sinks = &self.sinks;
        let prefix = &sinks.prefix;
        let (url, body, authorization) = match notification {
            Notification::StaffAlert {
                title,
                description,
                fields,
            } => {
                let fields: Vec<Value> = fields
                    .iter()
                    .map(|(name, value)| json!({"name": name, "value": format!("```{value}```"), "inline": true}))
                    .collect();
                (
                    &sinks.staff_alerts,
                    json!({
                        "username": format!("[{prefix}] Staff Alert"),
                        "avatar_url": DEFAULT_AVATAR_URL,
                        "content": "@everyone",
                        "embeds": [{
                            "title": title,
                            "description": description,
                            "color": ALERT_COLOR,
                            "timestamp": chrono::Utc::now().to_rfc3339(),
                            "fields": fields,
                        }],
                    }),
                    None,
                )
            }
            Notification::ChatMirror {
                player, message, ..
            } => (
                &sinks.chat_logs,
                json!({
                    "username": format!("[{prefix}] {player}"),
                    "avatar_url": avatar_url,
                    "content": message,
                    "allowed_mentions": {"parse": []},
                }),
                None,
            ),
            Notification::CommandLog {
                player, command, ..
            } => (
                &sinks.command_logs,
                json!({
                    "username": format!("[{prefix}] {player}"),
                    "avatar_url": avatar_url,
                    "content": format!("`{command}`"),
                    "allowed_mentions": {"parse": []},
                }),
                None,
            ),
            Notification::PlayerDetails { xuid, name, ip } => (
                &sinks.player_details,
                json!({"xuid": xuid, "name": name, "ip": ip}),
                Some(sinks.api_key.clone()),
            ),
        };
        if url.is_empty() {
            return None;
        }
        Some(Delivery {
            url: url.clone(),
            body,
            authorization,
        })
    }

    fn sink_enabled(&self, notification: &Notification) -> bool {
        let url = match notification {
            Notification::StaffAlert { .. } => &self.sinks.staff_alerts,
            Notification::ChatMirror { .. } => &self.sinks.chat_logs,
            Notification::CommandLog { .. } => &self.sinks.command_logs,
            Notification::PlayerDetails { .. } => &self.sinks.player_details,
        };
        !url.is_empty()
    }

    fn post(client: &reqwest::blocking::Client, delivery: Delivery) {
        let mut request = client.post(&delivery.url).json(&delivery.body);
        if let Some(auth) = &delivery.authorization {
            request = request.header("authorization", auth);
        }
        match request.send() {
            Ok(response) if !response.status().is_success() => {
                warn!(url = %delivery.url, status = %response.status(), "notification rejected");
            }
            Ok(_) => {}
            Err(e) => warn!(url = %delivery.url, error = %e, "notification failed"),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        if !self.sink_enabled(&notification) {
            debug!(?notification, "notification sink disabled");
            return;
        }
        let client = self.client.clone();
        let profiles = self.profiles.clone();
        let sinks = self.sinks.clone();
        thread::spawn(move || {
            let avatar = match &notification {
                Notification::ChatMirror { xuid, .. } | Notification::CommandLog { xuid, .. } => {
                    profiles.avatar_url(xuid)
                }
                _ => DEFAULT_AVATAR_URL.to_string(),
            };
            let renderer = WebhookNotifier {
                sinks,
                client: client.clone(),
                profiles,
            };
            if let Some(delivery) = renderer.render(&notification, &avatar) {
                Self::post(&client, delivery);
            }
        });
    }
}

/// Records notifications in memory.
#[derive(Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.events.lock().push(notification);
    }
}
