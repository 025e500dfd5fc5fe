//! Parsed incoming IRC messages.
//!
//! Each line read from the server is scanned into a [`Message`] and handed to
//! every registered handler. Messages are immutable after parse; concurrent
//! dispatch depends on handlers treating them as read-only.

use std::time::SystemTime;

use crate::prefix::Prefix;

/// A message received from the server.
///
/// Carries the raw line plus the parsed pieces and a few derived fields that
/// triggers commonly need (`to`, `from`, `content`).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// The raw line as received (without the trailing CR LF).
    pub raw: String,
    /// IRCv3 message tags, raw and unsplit, when the line carried any.
    pub tags: Option<String>,
    /// Source prefix, when present.
    pub prefix: Option<Prefix>,
    /// The command or numeric, as sent by the server.
    pub command: String,
    /// Middle parameters, in order.
    pub params: Vec<String>,
    /// Trailing parameter, when present.
    pub trailing: Option<String>,
    /// The trailing text, or empty. For a PRIVMSG this is the message body.
    pub content: String,
    /// Entity this message was addressed to: the first parameter, or for
    /// JOIN the trailing when the channel arrives there. Empty otherwise.
    pub to: String,
    /// Nick of the sender (the prefix nick), or empty.
    pub from: String,
    /// When this message was received.
    pub timestamp: SystemTime,
}

impl Message {
    /// Parse a raw line into a message.
    ///
    /// Returns `None` for empty or command-less lines; the reader skips
    /// those. Tags and prefix are optional per the wire grammar
    /// `[@tags ][:prefix ]command params [:trailing]`.
    pub fn parse(raw: &str) -> Option<Message> {
        let line = raw.trim_end_matches(['\r', '\n']);
        let mut rest = line;

        let mut tags = None;
        if let Some(r) = rest.strip_prefix('@') {
            let (t, r) = r.split_once(' ')?;
            tags = Some(t.to_string());
            rest = r.trim_start_matches(' ');
        }

        let mut prefix = None;
        if let Some(r) = rest.strip_prefix(':') {
            let (p, r) = r.split_once(' ')?;
            prefix = Some(Prefix::parse(p));
            rest = r.trim_start_matches(' ');
        }

        let (command, mut rest) = match rest.split_once(' ') {
            Some((c, r)) => (c, r.trim_start_matches(' ')),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        let mut trailing = None;
        while !rest.is_empty() {
            if let Some(t) = rest.strip_prefix(':') {
                trailing = Some(t.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((p, r)) => {
                    if !p.is_empty() {
                        params.push(p.to_string());
                    }
                    rest = r.trim_start_matches(' ');
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        let content = trailing.clone().unwrap_or_default();
        let to = match params.first() {
            Some(p) => p.clone(),
            // Servers commonly send JOIN's channel as the trailing.
            None if command == "JOIN" => content.clone(),
            None => String::new(),
        };
        let from = prefix
            .as_ref()
            .map(|p| p.nick.clone())
            .unwrap_or_default();

        Some(Message {
            raw: line.to_string(),
            tags,
            prefix,
            command: command.to_string(),
            params,
            trailing,
            content,
            to,
            from,
            timestamp: SystemTime::now(),
        })
    }

    /// Positional parameter access, with the trailing counted as the last
    /// parameter. Returns an empty string when out of range.
    pub fn param(&self, i: usize) -> &str {
        if i < self.params.len() {
            &self.params[i]
        } else if i == self.params.len() {
            self.trailing.as_deref().unwrap_or("")
        } else {
            ""
        }
    }

    /// Look up an IRCv3 message tag by key, unescaping its value.
    pub fn tag(&self, key: &str) -> Option<String> {
        let tags = self.tags.as_deref()?;
        for item in tags.split(';') {
            let (k, v) = item.split_once('=').unwrap_or((item, ""));
            if k == key {
                return Some(unescape_tag_value(v));
            }
        }
        None
    }
}

/// Undo the tag value escaping from the message-tags specification.
fn unescape_tag_value(v: &str) -> String {
    let mut out = String::with_capacity(v.len());
    let mut chars = v.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
