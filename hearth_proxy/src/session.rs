// One player's pair of connections and the state the proxy keeps about them.
//
// A `Session` is created after the two-sided handshake succeeds and lives
// until teardown. It is shared (`Arc`) between the two relay threads and the
// handlers they run, so everything mutable sits behind a lock or an atomic:
//
// - `PlayerData` (mutex): the open container, the transient-container slots
//   the player has filled, a copy of the inventory slots the server reported,
//   dimension and last position.
// - the item-stack request id counter. Proxy-made requests use odd negative
//   ids (-1, -3, ...) so they never collide with the client's own.
// - the `disconnecting` flag, which makes `disconnect` idempotent when both
//   relay threads (or a handler) race to tear the session down.
//
// Teardown order: before closing anything, items left in an open transient
// container are dropped server-side with an ItemStackRequest and the session
// waits a grace period for the server to process it. A non-empty held-item
// slot raises a staff alert. Then the side opposite the initiator is closed
// first, and the client always receives a `Disconnect` with the reason.
//
// `SessionRegistry` enforces one live session per xuid.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use hearth_protocol::packet::{ItemStackRequest, Packet, Text};
use hearth_protocol::types::{
    CONTAINER_COMBINED_HOTBAR_AND_INVENTORY, IdentityData, ItemStack, ItemStackRequestEntry,
    StackRequestAction, StackSlot, Vec3,
};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::conn::{Conn, ConnError};
use crate::handler::Origin;
use crate::notify::{Notification, Notifier};

pub const REASON_INTERNAL: &str = "An internal error occurred";
pub const REASON_CLIENT_CLOSED: &str = "Client Connection closed";
pub const REASON_SERVER_CLOSED: &str = "Server Connection closed";
pub const REASON_REPLACED: &str = "You logged in from another location";
pub const REASON_SHUTTING_DOWN: &str = "The proxy is shutting down";

/// Slot watched for items carried out of the world on disconnect.
pub const HELD_ITEM_SLOT: (u8, u32) = (CONTAINER_COMBINED_HOTBAR_AND_INVENTORY, 0);

/// Count used when dropping a buffered slot; covers any stack size.
const FLUSH_DROP_COUNT: u8 = 64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug, Default)]
pub struct PlayerData {
    /// Window id of the open container, if any.
    pub open_container: Option<u8>,
    /// Transient-container slots the player put items into while the
    /// container was open.
    pub items_in_containers: Vec<StackSlot>,
    /// Last known contents per (container id, slot).
    pub inventory: HashMap<(u8, u32), ItemStack>,
    pub dimension: i32,
    pub position: Vec3,
}

impl PlayerData {
    pub fn item_at(&self, container_id: u8, slot: u32) -> ItemStack {
        self.inventory
            .get(&(container_id, slot))
            .copied()
            .unwrap_or_default()
    }
}

pub struct Session {
    id: u64,
    identity: IdentityData,
    client: Arc<Conn>,
    server: Arc<Conn>,
    data: Mutex<PlayerData>,
    next_request_id: AtomicI32,
    disconnecting: AtomicBool,
    notifier: Arc<dyn Notifier>,
    disconnect_grace: Duration,
}

impl Session {
    pub fn new(
        identity: IdentityData,
        client: Arc<Conn>,
        server: Arc<Conn>,
        notifier: Arc<dyn Notifier>,
        disconnect_grace: Duration,
    ) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            identity,
            client,
            server,
            data: Mutex::new(PlayerData::default()),
            next_request_id: AtomicI32::new(-1),
            disconnecting: AtomicBool::new(false),
            notifier,
            disconnect_grace,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &IdentityData {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.display_name
    }

    pub fn xuid(&self) -> &str {
        &self.identity.xuid
    }

    pub fn client(&self) -> &Arc<Conn> {
        &self.client
    }

    pub fn server(&self) -> &Arc<Conn> {
        &self.server
    }

    /// The connection packets from `origin` are read from.
    pub fn source(&self, origin: Origin) -> &Arc<Conn> {
        match origin {
            Origin::Client => &self.client,
            Origin::Server => &self.server,
        }
    }

    /// The connection packets from `origin` are forwarded to.
    pub fn destination(&self, origin: Origin) -> &Arc<Conn> {
        match origin {
            Origin::Client => &self.server,
            Origin::Server => &self.client,
        }
    }

    pub fn data(&self) -> MutexGuard<'_, PlayerData> {
        self.data.lock()
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Allocate a request id for a proxy-made item-stack request.
    pub fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_sub(2, Ordering::SeqCst)
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::SeqCst)
    }

    pub fn send_to_client(&self, packet: &Packet) -> Result<(), ConnError> {
        self.client.write_packet(packet)
    }

    pub fn send_to_server(&self, packet: &Packet) -> Result<(), ConnError> {
        self.server.write_packet(packet)
    }

    /// Show a raw chat message to the player.
    pub fn send_message(&self, message: &str) -> Result<(), ConnError> {
        self.send_to_client(&Packet::from(Text::raw(message)))
    }

    /// Tear the session down. `initiator` is the side whose failure or
    /// request caused it; the other side is closed first. Returns false if
    /// the session was already disconnecting.
    pub fn disconnect(&self, initiator: Origin, reason: &str) -> bool {
        if self.disconnecting.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!(player = self.name(), reason, "disconnecting player");

        self.flush_open_container();
        self.check_held_item();

        match initiator {
            Origin::Client => {
                self.server.close();
                self.client.disconnect(reason);
            }
            Origin::Server => {
                self.client.disconnect(reason);
                self.server.close();
            }
        }
        true
    }

    /// Drop whatever the player left in an open transient container so the
    /// server does not lose (or duplicate) it.
    fn flush_open_container(&self) {
        let (window, slots, position) = {
            let mut data = self.data();
            let Some(window) = data.open_container.take() else {
                return;
            };
            (window, std::mem::take(&mut data.items_in_containers), data.position)
        };
        if slots.is_empty() {
            return;
        }
        info!(
            player = self.name(),
            window,
            slots = slots.len(),
            location = %format_location(position),
            "player disconnecting with items in open container"
        );
        let actions = slots
            .into_iter()
            .map(|source| StackRequestAction::Drop {
                count: FLUSH_DROP_COUNT,
                source,
                randomly: false,
            })
            .collect();
        let request = ItemStackRequest {
            requests: vec![ItemStackRequestEntry {
                request_id: self.next_request_id(),
                actions,
            }],
        };
        if let Err(e) = self.send_to_server(&Packet::from(request)) {
            warn!(player = self.name(), error = %e, "failed to flush open container");
            return;
        }
        debug!(grace = ?self.disconnect_grace, "waiting for server to drop container items");
        thread::sleep(self.disconnect_grace);
    }

    fn check_held_item(&self) {
        let (held, position) = {
            let data = self.data();
            (data.item_at(HELD_ITEM_SLOT.0, HELD_ITEM_SLOT.1), data.position)
        };
        if held.stack_network_id == 0 {
            return;
        }
        warn!(player = self.name(), stack = held.stack_network_id, "player disconnected holding an item");
        self.notifier.notify(Notification::StaffAlert {
            title: "Disconnecting With Item".into(),
            description: "A Player Has disconnected with a item in ContainerCombinedHotBarAndInventory, please investigate!".into(),
            fields: vec![
                ("Player Name".into(), self.name().to_string()),
                ("Stack Network ID".into(), held.stack_network_id.to_string()),
                ("Player Location".into(), format_location(position)),
            ],
        });
    }
}

fn format_location(position: Vec3) -> String {
    format!(
        "[{}, {}, {}]",
        position.x as i32, position.y as i32, position.z as i32
    )
}

/// Live sessions keyed by xuid.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    /// Register `session`, returning the session it replaced, if any. The
    /// caller disconnects the replaced session.
    pub fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .insert(session.xuid().to_string(), session)
    }

    /// Remove `session` if it is still the registered one for its xuid.
    pub fn remove(&self, session: &Session) {
        let mut sessions = self.sessions.lock();
        if sessions
            .get(session.xuid())
            .is_some_and(|current| current.id() == session.id())
        {
            sessions.remove(session.xuid());
        }
    }

    pub fn get(&self, xuid: &str) -> Option<Arc<Session>> {
        self.sessions.lock().get(xuid).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disconnect every registered session with `reason`. Each goes through
    /// the normal teardown, so players get the reason and open containers
    /// are flushed.
    pub fn close_all(&self, reason: &str) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.disconnect(Origin::Server, reason);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::notify::MemoryNotifier;
    use std::net::{TcpListener, TcpStream};

    pub fn conn_pair() -> (Conn, Conn) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let near = TcpStream::connect(addr).unwrap();
        let (far, _) = listener.accept().unwrap();
        (Conn::new(near).unwrap(), Conn::new(far).unwrap())
    }

    pub fn identity(name: &str, xuid: &str) -> IdentityData {
        IdentityData {
            xuid: xuid.into(),
            display_name: name.into(),
            identity: format!("uuid-{xuid}"),
            title_id: String::new(),
        }
    }

    /// A session wired to real sockets. The returned conns are the far ends:
    /// what the game client and the upstream server see.
    pub struct Harness {
        pub session: Arc<Session>,
        pub client_peer: Conn,
        pub server_peer: Conn,
        pub notifier: Arc<MemoryNotifier>,
    }

    pub fn harness(name: &str, xuid: &str) -> Harness {
        let (client, client_peer) = conn_pair();
        let (server, server_peer) = conn_pair();
        let notifier = Arc::new(MemoryNotifier::default());
        let session = Arc::new(Session::new(
            identity(name, xuid),
            Arc::new(client),
            Arc::new(server),
            notifier.clone(),
            Duration::from_millis(10),
        ));
        Harness {
            session,
            client_peer,
            server_peer,
            notifier,
        }
    }
}
