// Chat mirror: forwards what players type in chat to the notifier.

use hearth_protocol::packet::Packet;
use hearth_protocol::types::TextType;

use crate::handler::{HandlerError, Origin, PacketHandler, Verdict};
use crate::notify::Notification;
use crate::session::Session;

pub struct ChatMirror;

/// Messages that are commands to the server or to the proxy itself.
fn is_command_like(message: &str) -> bool {
    message.starts_with('/') || message.starts_with('-')
}

impl PacketHandler for ChatMirror {
    fn name(&self) -> &'static str {
        "chat_mirror"
    }

    fn handle(&self, packet: Packet, session: &Session, origin: Origin) -> Result<Verdict, HandlerError> {
        if let (Packet::Text(text), Origin::Client) = (&packet, origin) {
            if text.text_type == TextType::Chat && text.source_name == session.name() && !is_command_like(&text.message)
            {
                session.notifier().notify(Notification::ChatMirror {
                    player: session.name().to_string(),
                    xuid: session.xuid().to_string(),
                    message: text.message.clone(),
                });
            }
        }
        Ok(Verdict::Forward(packet))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::harness;
    use hearth_protocol::packet::Text;

    fn chat(source: &str, message: &str) -> Packet {
        Packet::from(Text {
            text_type: TextType::Chat,
            source_name: source.into(),
            ..Text::raw(message)
        })
    }

    #[test]
    fn mirrors_own_chat_only() {
        let h = harness("Steve", "1");
        for packet in [chat("Steve", "hello"), chat("Alex", "spoofed"), chat("Steve", "-menu"), chat("Steve", "/tp")] {
            assert!(ChatMirror.handle(packet, &h.session, Origin::Client).unwrap().is_forward());
        }
        assert_eq!(
            h.notifier.events(),
            vec![Notification::ChatMirror {
                player: "Steve".into(),
                xuid: "1".into(),
                message: "hello".into(),
            }]
        );
    }

    #[test]
    fn server_text_is_not_mirrored() {
        let h = harness("Steve", "1");
        ChatMirror.handle(chat("Steve", "echo"), &h.session, Origin::Server).unwrap();
        assert!(h.notifier.events().is_empty());
    }
}
