//! Built-in triggers.
//!
//! Registered ahead of user handlers so that protocol housekeeping (ping
//! replies, the auto-join wave, prefix and nick tracking) is never blocked
//! by slow user triggers.

use futures_util::future::BoxFuture;
use tracing::{debug, error, info};

use crate::bot::Bot;
use crate::handler::Trigger;
use crate::message::Message;

/// Answer server PINGs. Without this the server assumes the client timed
/// out and closes the connection.
pub(crate) fn ping_pong() -> Trigger {
    fn condition(_bot: &Bot, m: &Message) -> bool {
        m.command == "PING"
    }
    fn action<'a>(bot: &'a Bot, m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            bot.send(format!("PONG :{}", m.content)).await;
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}

/// Join the configured channels once the server has welcomed us.
///
/// Fires on 001 and on end-of-MOTD, whichever arrives first; the join wave
/// runs exactly once per session. A `name:key` entry becomes a keyed join.
pub(crate) fn join_channels() -> Trigger {
    fn condition(_bot: &Bot, m: &Message) -> bool {
        m.command == "001" || m.command == "372"
    }
    fn action<'a>(bot: &'a Bot, _m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if !bot.begin_join_wave() {
                return;
            }
            for channel in bot.channels() {
                match channel.split_once(':') {
                    Some((name, key)) => {
                        info!(channel = %name, "joining with key");
                        bot.send(format!("JOIN {} {}", name, key)).await;
                    }
                    None => {
                        info!(channel = %channel, "joining");
                        bot.send(format!("JOIN {}", channel)).await;
                    }
                }
            }
            bot.fire_joined();
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}

/// Capture the server's view of our own prefix by catching our join.
pub(crate) fn capture_prefix() -> Trigger {
    fn condition(bot: &Bot, m: &Message) -> bool {
        m.command == "JOIN" && m.from == bot.current_nick()
    }
    fn action<'a>(bot: &'a Bot, m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(prefix) = &m.prefix {
                bot.set_prefix(prefix.clone());
                debug!(prefix = %bot.prefix(), "captured own prefix");
            }
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}

/// Track our own nick changes so the prefix stays accurate.
pub(crate) fn track_nick() -> Trigger {
    fn condition(bot: &Bot, m: &Message) -> bool {
        m.command == "NICK" && m.from == bot.current_nick()
    }
    fn action<'a>(bot: &'a Bot, m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            // Servers deliver the new nick as either a middle or a
            // trailing parameter.
            let new_nick = m.param(0);
            if new_nick.is_empty() {
                return;
            }
            bot.set_current_nick(new_nick);
            bot.prefix_change(new_nick, "", "");
            info!(nick = %new_nick, "nick changed successfully");
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}

/// Surface nick-change failures.
pub(crate) fn nick_error() -> Trigger {
    fn condition(_bot: &Bot, m: &Message) -> bool {
        matches!(m.command.as_str(), "400" | "431" | "432" | "433" | "436")
    }
    fn action<'a>(_bot: &'a Bot, m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            error!(nick = %m.param(1), error = %m.content, "nick change error");
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}

/// Log SASL authentication success.
pub(crate) fn sasl_success() -> Trigger {
    fn condition(_bot: &Bot, m: &Message) -> bool {
        m.command == "900" || m.command == "903"
    }
    fn action<'a>(_bot: &'a Bot, m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            info!(info = %m.content, "sasl authentication succeeded");
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}

/// Log SASL authentication failure. Negotiation is latched done separately;
/// the server will typically close the link afterwards.
pub(crate) fn sasl_fail() -> Trigger {
    fn condition(_bot: &Bot, m: &Message) -> bool {
        matches!(m.command.as_str(), "904" | "905" | "906" | "907")
    }
    fn action<'a>(_bot: &'a Bot, m: &'a Message) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            error!(error = %m.content, "sasl authentication failed");
        })
    }
    Trigger {
        condition: Box::new(condition),
        action: Box::new(action),
    }
}
