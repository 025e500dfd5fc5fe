//! IRC message prefix handling.
//!
//! A prefix identifies the origin of a message as `nick!user@host`. The bot
//! tracks its own prefix because the server prepends it when relaying, and
//! the outgoing byte budget has to account for those bytes.
//!
//! # Reference
//! - RFC 2812 Section 2.3.1: Message format

use std::fmt;

/// The `nick!user@host` triple identifying a message source.
///
/// Parsing is lenient: a bare server name ends up in `nick` with empty
/// `user`/`host`, which is all the bot needs to compare senders.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Prefix {
    /// Nickname (or server name for server-originated messages).
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Hostname.
    pub host: String,
}

impl Prefix {
    /// Create a prefix from its components.
    pub fn new(
        nick: impl Into<String>,
        user: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            nick: nick.into(),
            user: user.into(),
            host: host.into(),
        }
    }

    /// Parse a prefix string of the form `nick[!user][@host]`.
    pub fn parse(s: &str) -> Self {
        let (before_host, host) = match s.split_once('@') {
            Some((b, h)) => (b, h),
            None => (s, ""),
        };
        let (nick, user) = match before_host.split_once('!') {
            Some((n, u)) => (n, u),
            None => (before_host, ""),
        };
        Self::new(nick, user, host)
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)?;
        if !self.user.is_empty() {
            write!(f, "!{}", self.user)?;
        }
        if !self.host.is_empty() {
            write!(f, "@{}", self.host)?;
        }
        Ok(())
    }
}
