//! Public command surface of the bot.
//!
//! Everything here enqueues complete wire lines (minus CR LF) onto the
//! outgoing queue; the writer task applies throttling. The messaging
//! commands run user text through the splitting pipeline first, so a single
//! call may produce several wire lines.

use tracing::{debug, warn};

use crate::bot::Bot;
use crate::caps::CAP_IDENTIFY_MSG;
use crate::message::Message;
use crate::text;

impl Bot {
    /// Enqueue a raw command line.
    ///
    /// Lines from one call keep their order; lines from concurrent callers
    /// may interleave.
    pub async fn send(&self, line: impl Into<String>) {
        let line = line.into();
        if self.outgoing_sender().send(line).await.is_err() {
            debug!("outgoing queue closed, dropping line");
        }
    }

    /// Send a message to `who` (a channel or a nick).
    pub async fn msg(&self, who: &str, text: &str) {
        self.send_split("PRIVMSG", who, text, false).await;
    }

    /// Send a NOTICE to `who` (a channel or a nick).
    pub async fn notice(&self, who: &str, text: &str) {
        self.send_split("NOTICE", who, text, false).await;
    }

    /// Send a CTCP ACTION to `who` (a channel or a nick).
    pub async fn action(&self, who: &str, text: &str) {
        self.msg(who, &format!("\u{1}ACTION {}\u{1}", text)).await;
    }

    /// Send a message back to where `msg` came from: the channel for
    /// channel messages, the sender for private ones.
    ///
    /// When reply limiting is on, each wire line consumes a token; lines
    /// that find the bucket empty are dropped and logged.
    pub async fn reply(&self, msg: &Message, text: &str) {
        let who = reply_target(msg).to_string();
        self.send_split("PRIVMSG", &who, text, true).await;
    }

    /// Set the topic of `channel`. Needs appropriate channel permissions.
    pub async fn topic(&self, channel: &str, topic: &str) {
        self.send(format!("TOPIC {} :{}", channel, topic)).await;
    }

    /// Join a channel.
    pub async fn join(&self, channel: &str) {
        self.send(format!("JOIN {}", channel)).await;
    }

    /// Part a channel with a message.
    pub async fn part(&self, channel: &str, msg: &str) {
        self.send(format!("PART {} {}", channel, msg)).await;
    }

    /// Change a user's mode in a channel, e.g. `+o` to op, `+b` to ban.
    pub async fn ch_mode(&self, user: &str, channel: &str, mode: &str) {
        self.send(format!("MODE {} {} {}", channel, mode, user)).await;
    }

    /// Ask the server for a new nick. The configured nick is untouched;
    /// the confirmed rename shows up in [`Bot::current_nick`].
    pub async fn set_nick(&self, nick: &str) {
        self.send(format!("NICK {}", nick)).await;
    }

    /// `(enabled, present)` for a server capability. `present` means the
    /// server advertised it, `enabled` that we also requested it.
    pub async fn cap_status(&self, cap: &str) -> (bool, bool) {
        self.cap_state().lock().await.status(cap)
    }

    /// Maximum number of payload bytes that fit into one message to `who`.
    ///
    /// Useful to pre-pack output that must land in a single message, like a
    /// wall of emojis.
    pub async fn msg_max_size(&self, who: &str) -> usize {
        self.max_msg_size("PRIVMSG", who).await
    }

    /// Like [`Bot::msg_max_size`] for NOTICE.
    pub async fn notice_max_size(&self, who: &str) -> usize {
        self.max_msg_size("NOTICE", who).await
    }

    /// Like [`Bot::msg_max_size`] for the target a reply to `msg` would go
    /// to.
    pub async fn reply_max_size(&self, msg: &Message) -> usize {
        self.max_msg_size("PRIVMSG", reply_target(msg)).await
    }

    async fn max_msg_size(&self, command: &str, who: &str) -> usize {
        let (identify_msg, _) = self.cap_status(CAP_IDENTIFY_MSG).await;
        text::max_msg_size(
            &self.prefix(),
            command,
            who,
            identify_msg,
            self.msg_safety_buffer(),
        )
    }

    async fn send_split(&self, command: &str, who: &str, text: &str, limited: bool) {
        let max_size = self.max_msg_size(command, who).await;
        let limiter = self.limiter();
        for line in text::split_text(text, max_size) {
            if limited && self.limit_replies() {
                if let Some(limiter) = &limiter {
                    if !limiter.try_take() {
                        warn!(
                            dropped = %text::truncate_preview(&line),
                            "reply limiter dropped line"
                        );
                        continue;
                    }
                }
            }
            self.send(format!("{} {} :{}", command, who, line)).await;
        }
    }
}

fn reply_target(m: &Message) -> &str {
    if m.to.contains('#') {
        &m.to
    } else {
        &m.from
    }
}
