//! Outgoing text budgeting and splitting.
//!
//! The server relays outgoing messages with the bot's own prefix prepended,
//! so the usable payload of a 512-byte wire line depends on that prefix, the
//! command, and the target. Text that does not fit is split into several wire
//! lines at UTF-8 boundaries.

use crate::prefix::Prefix;

/// Bytes shown when logging a dropped line.
const PREVIEW_LEN: usize = 30;

/// Maximum number of payload bytes that fit into one relayed message.
///
/// CR LF is not counted here; the writer appends it. The extra byte for
/// `identify-msg` covers the `+`/`-` marker the server prepends, and the
/// safety buffer compensates servers that tag on more than the prefix.
pub(crate) fn max_msg_size(
    prefix: &Prefix,
    command: &str,
    who: &str,
    identify_msg: bool,
    safety_buffer: bool,
) -> usize {
    let header = format!(":{} {} {} :", prefix, command, who);
    let mut max = 510usize.saturating_sub(header.len());
    if identify_msg {
        max = max.saturating_sub(1);
    }
    if safety_buffer {
        max = max.saturating_sub(10);
    }
    max
}

/// Split `text` into chunks that each fit into `max_size` bytes.
///
/// The text is first split on newlines (a trailing `\r` is stripped), then
/// any line still over budget is cut at UTF-8 boundaries so that no chunk
/// bisects a codepoint. A single codepoint wider than the budget is emitted
/// as-is rather than mangled.
pub(crate) fn split_text(text: &str, max_size: usize) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let mut rest = line;
        while rest.len() > max_size {
            let mut cut = 0;
            for (idx, ch) in rest.char_indices() {
                if idx + ch.len_utf8() > max_size {
                    break;
                }
                cut = idx + ch.len_utf8();
            }
            if cut == 0 {
                break;
            }
            out.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        out.push(rest.to_string());
    }
    out
}

/// Abbreviate a line for log output, respecting UTF-8 boundaries.
pub(crate) fn truncate_preview(line: &str) -> String {
    if line.len() <= PREVIEW_LEN {
        return line.to_string();
    }
    let mut cut = 0;
    for (idx, ch) in line.char_indices() {
        if idx + ch.len_utf8() > PREVIEW_LEN {
            break;
        }
        cut = idx + ch.len_utf8();
    }
    format!("{}...", &line[..cut])
}
