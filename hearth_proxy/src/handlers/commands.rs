// Command table handlers.
//
// - `NativeCommandCapture` keeps the most recent `AvailableCommands` the
//   upstream sent, so custom commands can be merged on top of it.
// - `CommandRegisterTrigger` watches object text messages from the server
//   for the addon's tagged schema broadcast. A match is compiled against the
//   captured native table, sent to the player as their new command table, and
//   the broadcast itself is hidden.
// - `CommandLog` mirrors every command a player runs to the notifier.

use std::sync::Arc;

use hearth_commands::{MergeStrategy, SchemaError, compile, parse_trigger};
use hearth_protocol::AvailableCommands;
use hearth_protocol::packet::Packet;
use hearth_protocol::types::TextType;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::notify::Notification;
use crate::session::Session;

/// The upstream's own command table, shared by the capture and trigger
/// handlers.
#[derive(Default)]
pub struct NativeCommands {
    table: RwLock<AvailableCommands>,
}

impl NativeCommands {
    pub fn store(&self, table: AvailableCommands) {
        *self.table.write() = table;
    }

    pub fn snapshot(&self) -> AvailableCommands {
        self.table.read().clone()
    }
}

pub struct NativeCommandCapture {
    native: Arc<NativeCommands>,
}

impl NativeCommandCapture {
    pub fn new(native: Arc<NativeCommands>) -> Self {
        Self { native }
    }
}

impl PacketHandler for NativeCommandCapture {
    fn name(&self) -> &'static str {
        "native_command_capture"
    }

    fn handle(&self, packet: Packet, _session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        if let (Packet::AvailableCommands(table), Origin::Server) = (&packet, origin) {
            debug!(commands = table.commands.len(), "captured native command table");
            self.native.store(table.clone());
        }
        Ok(Verdict::Forward(packet))
    }
}

pub struct CommandRegisterTrigger {
    prefix: String,
    native: Arc<NativeCommands>,
    merge: Arc<dyn MergeStrategy>,
}

impl CommandRegisterTrigger {
    pub fn new(prefix: impl Into<String>, native: Arc<NativeCommands>, merge: Arc<dyn MergeStrategy>) -> Self {
        Self {
            prefix: prefix.into(),
            native,
            merge,
        }
    }
}

impl PacketHandler for CommandRegisterTrigger {
    fn name(&self) -> &'static str {
        "command_register_trigger"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        let Packet::Text(text) = &packet else {
            return Ok(Verdict::Forward(packet));
        };
        if origin != Origin::Server || text.text_type != TextType::Object {
            return Ok(Verdict::Forward(packet));
        }

        let schema = match parse_trigger(&text.message, &self.prefix) {
            Ok(Some(schema)) => schema,
            Ok(None) => return Ok(Verdict::Forward(packet)),
            Err(e @ SchemaError::RawText(_)) => {
                warn!(player = session.name(), error = %e, "dropping unparseable object text");
                return Ok(Verdict::Suppress(packet));
            }
            Err(e) => return Err(e.into()),
        };

        let table = compile(&schema, &self.native.snapshot(), self.merge.as_ref())?;
        info!(
            player = session.name(),
            custom = schema.len(),
            total = table.commands.len(),
            "sending custom command table"
        );
        session
            .send_to_client(&Packet::from(table))
            .map_err(|source| HandlerError::Send {
                handler: self.name(),
                source,
            })?;
        Ok(Verdict::Suppress(packet))
    }
}

pub struct CommandLog;

impl PacketHandler for CommandLog {
    fn name(&self) -> &'static str {
        "command_log"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        if let (Packet::CommandRequest(request), Origin::Client) = (&packet, origin) {
            info!(player = session.name(), command = %request.command_line, "player ran command");
            session.notifier().notify(Notification::CommandLog {
                player: session.name().to_string(),
                xuid: session.xuid().to_string(),
                command: request.command_line.clone(),
            });
        }
        Ok(Verdict::Forward(packet))
    }
}
