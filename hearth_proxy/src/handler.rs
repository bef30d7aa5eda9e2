// Packet handler dispatch chain.
//
// Handlers are registered per packet id at startup and the chain is
// read-only afterwards (shared behind an `Arc`, no locking). `dispatch` runs
// every handler registered for a packet's id in registration order as a
// left fold over a `Verdict`:
//
// - the fold starts at `Forward(packet)`;
// - while forwarding, each handler's verdict replaces the current one;
// - once any handler suppresses, later handlers still run and may still
//   mutate the packet, but the result stays `Suppress`;
// - a handler error aborts the rest of the chain and is returned; the packet
//   is not forwarded.
//
// Handlers get the `Session` so they can read/mutate player state and send
// packets to either peer. Panics are not caught here; the relay loop catches
// them at its boundary.

use std::collections::HashMap;

use hearth_protocol::packet::Packet;
use tracing::debug;

use crate::config::{PacketTraceConfig, TraceLevel};
use crate::conn::ConnError;
use crate::session::Session;

/// Which peer a packet came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    Client,
    Server,
}

impl Origin {
    pub fn opposite(self) -> Self {
        match self {
            Origin::Client => Origin::Server,
            Origin::Server => Origin::Client,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Client => "client",
            Origin::Server => "server",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Forward(Packet),
    Suppress(Packet),
}

impl Verdict {
    pub fn is_forward(&self) -> bool {
        matches!(self, Verdict::Forward(_))
    }

    pub fn packet(&self) -> &Packet {
        match self {
            Verdict::Forward(p) | Verdict::Suppress(p) => p,
        }
    }

    pub fn into_packet(self) -> Packet {
        match self {
            Verdict::Forward(p) | Verdict::Suppress(p) => p,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{handler}: failed to send packet: {source}")]
    Send {
        handler: &'static str,
        #[source]
        source: ConnError,
    },
    #[error("custom command schema rejected: {0}")]
    Schema(#[from] hearth_commands::SchemaError),
    #[error("{handler}: {message}")]
    Failed {
        handler: &'static str,
        message: String,
    },
}

pub trait PacketHandler: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError>;
}

#[derive(Default)]
pub struct HandlerChainBuilder {
    handlers: HashMap<u32, Vec<Box<dyn PacketHandler>>>,
    trace: PacketTraceConfig,
}

impl HandlerChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the handlers for packet `id`.
    pub fn register(mut self, id: u32, handler: Box<dyn PacketHandler>) -> Self {
        self.handlers.entry(id).or_default().push(handler);
        self
    }

    pub fn trace(mut self, trace: PacketTraceConfig) -> Self {
        self.trace = trace;
        self
    }

    pub fn build(self) -> HandlerChain {
        HandlerChain {
            handlers: self.handlers,
            trace: self.trace,
        }
    }
}

pub struct HandlerChain {
    handlers: HashMap<u32, Vec<Box<dyn PacketHandler>>>,
    trace: PacketTraceConfig,
}

impl HandlerChain {
    /// Number of handlers registered for `id`.
    pub fn handler_count(&self, id: u32) -> usize {
        self.handlers.get(&id).map_or(0, Vec::len)
    }

    pub fn dispatch(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        self.trace_packet(&packet, session, origin);
        let Some(handlers) = self.handlers.get(&packet.id()) else {
            return Ok(Verdict::Forward(packet));
        };
        handlers
            .iter()
            .try_fold(Verdict::Forward(packet), |current, handler| {
                let forwarding = current.is_forward();
                let next = handler.handle(current.into_packet(), session, origin)?;
                Ok(if forwarding {
                    next
                } else {
                    Verdict::Suppress(next.into_packet())
                })
            })
    }

    fn trace_packet(&self, packet: &Packet, session: &Session, origin: Origin) {
        let id = packet.id();
        let traced = match self.trace.level {
            TraceLevel::Off => false,
            TraceLevel::All => true,
            TraceLevel::NotIgnored => !self.trace.ignored.contains(&id),
            TraceLevel::Target => self.trace.targets.contains(&id),
        };
        if traced {
            debug!(player = session.name(), sender = origin.as_str(), id, ?packet, "packet trace");
        }
    }
}
