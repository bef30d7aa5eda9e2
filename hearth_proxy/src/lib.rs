// hearth_proxy — transparent game-protocol proxy.
//
// The proxy sits between game clients and one upstream server. It accepts a
// client, checks it against the allow-list and slot reservation, logs in to
// the upstream on the player's behalf, runs the spawn handshake on both
// sides, and then relays packets in both directions. Every relayed packet
// passes through a chain of handlers that can inspect it, mutate it, send
// packets of their own, or suppress it.
//
// Module overview:
// - `server.rs`:     Listener, per-connection setup, `Proxy` lifecycle and
//                    the `Services` it runs with.
// - `session.rs`:    One player's connection pair, tracked state, teardown,
//                    and the per-xuid `SessionRegistry`.
// - `handler.rs`:    `PacketHandler` contract and the dispatch chain.
// - `handlers/`:     The built-in handlers and their registration order.
// - `relay.rs`:      The directional relay loops.
// - `handshake.rs`:  Two-sided spawn handshake with a join barrier.
// - `upstream.rs`:   Status probe and upstream login.
// - `conn.rs`:       Framed packet connection over TCP.
// - `admission.rs`:  Allow-list store and slot admission.
// - `playerlist.rs`: Stable identity per xuid across logins.
// - `claims.rs`:     Claim lookup service and its remote refresher.
// - `items.rs`:      Item registry from the upstream's game data.
// - `notify.rs`:     Operator notifications (webhooks, moderation API).
// - `profile.rs`:    Cached avatar lookup for webhook messages.
// - `obfuscate.rs`:  Reversible token used to hand xuids to the addon.
// - `config.rs`:     TOML configuration.
// - `store.rs`:      JSON file persistence shared by the stores.
// - `shutdown.rs`:   Cancellation token and cleanup hooks.
//
// The proxy can run as the `hearth` binary (`main.rs`) or be embedded via
// `Proxy::new(config, services).spawn()`.

pub mod admission;
pub mod claims;
pub mod config;
pub mod conn;
pub mod handler;
pub mod handlers;
pub mod handshake;
pub mod items;
pub mod notify;
pub mod obfuscate;
pub mod playerlist;
pub mod profile;
pub mod relay;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod store;
pub mod upstream;

pub use config::Config;
pub use server::{Proxy, ProxyError, ProxyHandle, Services, ShutdownHandle};
