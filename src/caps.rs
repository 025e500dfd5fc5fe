//! IRCv3 capability negotiation and SASL PLAIN authentication.
//!
//! The engine runs as an ordinary handler: it watches `CAP` subcommands and
//! the `AUTHENTICATE`/`903`/`904` exchange, requests the capabilities it can
//! deal with, and closes negotiation with `CAP END`. A `done` latch makes it
//! a no-op once negotiation has settled.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>
//! - SASL 3.1: <https://ircv3.net/specs/extensions/sasl-3.1>

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::bot::Bot;
use crate::handler::Handler;
use crate::message::Message;
use crate::sasl;

/// account-notify capability.
pub const CAP_ACCOUNT_NOTIFY: &str = "account-notify";
/// away-notify capability.
pub const CAP_AWAY_NOTIFY: &str = "away-notify";
/// extended-join capability.
pub const CAP_EXTENDED_JOIN: &str = "extended-join";
/// SASL authentication capability.
pub const CAP_SASL: &str = "sasl";
/// chghost capability.
pub const CAP_CHGHOST: &str = "chghost";
/// invite-notify capability.
pub const CAP_INVITE_NOTIFY: &str = "invite-notify";
/// multi-prefix capability.
pub const CAP_MULTI_PREFIX: &str = "multi-prefix";
/// cap-notify capability.
pub const CAP_CAP_NOTIFY: &str = "cap-notify";
/// setname capability.
pub const CAP_SETNAME: &str = "setname";
/// server-time capability.
pub const CAP_SERVER_TIME: &str = "server-time";
/// account-tag capability.
pub const CAP_ACCOUNT_TAG: &str = "account-tag";
/// message-tags capability.
pub const CAP_MESSAGE_TAGS: &str = "message-tags";
/// identify-msg capability. When enabled, the outgoing byte budget reserves
/// one byte for the `+`/`-` marker the server prepends to relayed messages.
pub const CAP_IDENTIFY_MSG: &str = "identify-msg";

/// Capabilities the library can deal with without modeling extra semantics.
/// Anything outside this list is recorded as present but never requested.
pub const ALLOWED_CAPS: &[&str] = &[
    CAP_ACCOUNT_NOTIFY,
    CAP_AWAY_NOTIFY,
    CAP_EXTENDED_JOIN,
    CAP_SASL,
    CAP_CHGHOST,
    CAP_INVITE_NOTIFY,
    CAP_MULTI_PREFIX,
    CAP_CAP_NOTIFY,
    CAP_SETNAME,
    CAP_SERVER_TIME,
    CAP_ACCOUNT_TAG,
    CAP_MESSAGE_TAGS,
    CAP_IDENTIFY_MSG,
];

fn is_allowed(cap: &str) -> bool {
    ALLOWED_CAPS.contains(&cap)
}

/// Negotiation state, guarded by its own lock on the bot.
///
/// Reset on each run; the `enabled` map survives a session handoff.
#[derive(Debug, Default)]
pub(crate) struct CapState {
    sasl_on: bool,
    sasl_user: String,
    sasl_pass: String,
    /// Caps we asked for, in server-advertised order.
    requested: Vec<String>,
    /// Advertised caps and whether we requested them.
    enabled: HashMap<String, bool>,
    done: bool,
}

impl CapState {
    pub(crate) fn reset(&mut self) {
        self.sasl_on = false;
        self.done = false;
        self.requested.clear();
        self.enabled.clear();
    }

    pub(crate) fn enable_sasl(&mut self) {
        self.sasl_on = true;
    }

    pub(crate) fn set_sasl_credentials(&mut self, user: &str, pass: &str) {
        self.sasl_user = user.to_string();
        self.sasl_pass = pass.to_string();
    }

    /// `(enabled, present)` for a capability name.
    ///
    /// `present` means the server advertised it; `enabled` means we also
    /// requested it during negotiation.
    pub(crate) fn status(&self, cap: &str) -> (bool, bool) {
        match self.enabled.get(cap) {
            Some(&enabled) => (enabled, true),
            None => (false, false),
        }
    }

    /// Copy of the negotiation outcome, carried across a session handoff.
    pub(crate) fn snapshot(&self) -> HashMap<String, bool> {
        self.enabled.clone()
    }

    pub(crate) fn restore(&mut self, enabled: HashMap<String, bool>) {
        self.enabled = enabled;
    }
}

/// Handler driving CAP negotiation and SASL PLAIN.
pub(crate) struct CapEngine;

#[async_trait]
impl Handler for CapEngine {
    async fn handle(&self, bot: &Bot, msg: &Message) {
        match msg.command.as_str() {
            "CAP" | "AUTHENTICATE" | "903" | "904" => {}
            _ => return,
        }

        let mut caps = bot.cap_state().lock().await;
        if caps.done {
            return;
        }

        if msg.command == "CAP" && msg.param(1) == "LS" {
            for cap in msg.content.split(' ') {
                if cap.is_empty() {
                    continue;
                }
                if is_allowed(cap) {
                    caps.enabled.insert(cap.to_string(), true);
                    caps.requested.push(cap.to_string());
                } else {
                    caps.enabled.insert(cap.to_string(), false);
                }
            }
            bot.send(format!("CAP REQ :{}", caps.requested.join(" ")))
                .await;
        }

        if msg.command == "CAP" && msg.param(1) == "ACK" {
            info!(capabilities = %msg.content, "ircv3 capabilities acknowledged");
            if caps.sasl_on && msg.content.split(' ').any(|c| c == CAP_SASL) {
                debug!("received sasl ack");
                bot.send("AUTHENTICATE PLAIN").await;
            } else {
                if caps.sasl_on {
                    error!("sasl not supported");
                }
                bot.send("CAP END").await;
                caps.done = true;
            }
        }

        if msg.command == "AUTHENTICATE" && msg.param(0) == "+" {
            debug!("got sasl challenge");
            let payload =
                sasl::encode_plain_with_authzid(&caps.sasl_user, &caps.sasl_user, &caps.sasl_pass);
            bot.send(format!("AUTHENTICATE {}", payload)).await;
        }

        if msg.command == "903" || msg.command == "904" {
            bot.send("CAP END").await;
            caps.done = true;
        }
    }
}
