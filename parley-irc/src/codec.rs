//! IRC wire codec.
//!
//! Inbound bytes are split into lines by [`LineBuffer`] and turned into
//! [`ProtocolEvent`]s by [`parse_line`]. Outbound [`Command`]s serialize to
//! exactly one CRLF-terminated line each.

use crate::message::ChannelMessage;

/// Longest line a server accepts or relays, CRLF included.
pub const MAX_LINE_BYTES: usize = 512;

/// Room kept for the `:nick!user@host ` prefix the server adds when it
/// relays our messages to other clients.
pub const RELAY_PREFIX_ALLOWANCE: usize = 100;

/// Floor for the body budget when the target name is absurdly long.
const MIN_BODY_BYTES: usize = 64;

/// Upper bound for an unterminated line kept between reads.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Numeric reply sent once registration succeeds (`RPL_WELCOME`).
const RPL_WELCOME: &str = "001";

/// Event parsed from one inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// `PING` with the token to echo back.
    Keepalive(String),
    /// `PRIVMSG` to a channel or to us.
    ChannelMessage(ChannelMessage),
    /// Registration accepted by the server.
    RegistrationComplete,
    /// Anything else, kept for logging.
    Unrecognized(String),
}

/// Outbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pass(String),
    Nick(String),
    User { ident: String, realname: String },
    Join(String),
    Pong(String),
    Privmsg { target: String, text: String },
}

impl Command {
    /// Command word, safe to log.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pass(_) => "PASS",
            Self::Nick(_) => "NICK",
            Self::User { .. } => "USER",
            Self::Join(_) => "JOIN",
            Self::Pong(_) => "PONG",
            Self::Privmsg { .. } => "PRIVMSG",
        }
    }

    /// Serialize to a single wire line including the trailing CRLF.
    ///
    /// Line breaks inside parameters are replaced with spaces.
    pub fn to_line(&self) -> String {
        let body = match self {
            Self::Pass(password) => format!("PASS {password}"),
            Self::Nick(nick) => format!("NICK {nick}"),
            Self::User { ident, realname } => format!("USER {ident} 0 * :{realname}"),
            Self::Join(channel) => format!("JOIN {channel}"),
            Self::Pong(token) if token.is_empty() => "PONG".to_string(),
            Self::Pong(token) => format!("PONG {token}"),
            Self::Privmsg { target, text } => format!("PRIVMSG {target} :{text}"),
        };

        let mut line = body.replace(['\r', '\n'], " ");
        line.push_str("\r\n");
        line
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_line().into_bytes()
    }

    /// Build the `PRIVMSG` commands needed to deliver `text` to `target`.
    ///
    /// Each non-blank line of `text` becomes at least one message; lines
    /// longer than [`privmsg_body_budget`] are split, preferably at a space.
    pub fn privmsg_lines(target: &str, text: &str) -> Vec<Self> {
        let budget = privmsg_body_budget(target);
        text.lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .flat_map(|line| split_message(line, budget))
            .map(|chunk| Self::Privmsg {
                target: target.to_string(),
                text: chunk.to_string(),
            })
            .collect()
    }
}

/// Bytes available for one `PRIVMSG` body addressed to `target`.
///
/// The relayed line `:prefix PRIVMSG <target> :<body>\r\n` must fit in
/// [`MAX_LINE_BYTES`].
pub fn privmsg_body_budget(target: &str) -> usize {
    let overhead = "PRIVMSG  :\r\n".len() + target.len() + RELAY_PREFIX_ALLOWANCE;
    MAX_LINE_BYTES.saturating_sub(overhead).max(MIN_BODY_BYTES)
}

/// Split one line into chunks of at most `max_len` bytes on char boundaries.
fn split_message(line: &str, max_len: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut remaining = line;

    while remaining.len() > max_len {
        let split_point = find_split_point(remaining, max_len);
        let (head, tail) = remaining.split_at(split_point);
        let head = head.trim_end();
        if !head.is_empty() {
            chunks.push(head);
        }
        remaining = tail.trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining);
    }
    chunks
}

fn find_split_point(text: &str, max_len: usize) -> usize {
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    // Look for last space before the limit
    match text[..end].rfind(' ') {
        Some(pos) if pos > 0 => pos + 1,
        _ => end,
    }
}

/// Parse one line (without terminator) into an event.
pub fn parse_line(line: &str) -> ProtocolEvent {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(token) = keepalive_token(line) {
        return ProtocolEvent::Keepalive(token.to_string());
    }

    let Some(stripped) = line.strip_prefix(':') else {
        return ProtocolEvent::Unrecognized(line.to_string());
    };
    let Some((prefix, rest)) = stripped.split_once(' ') else {
        return ProtocolEvent::Unrecognized(line.to_string());
    };

    let rest = rest.trim_start();
    let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));

    match command.to_ascii_uppercase().as_str() {
        RPL_WELCOME => ProtocolEvent::RegistrationComplete,
        "PING" => ProtocolEvent::Keepalive(params.trim().to_string()),
        "PRIVMSG" => parse_privmsg(prefix, params)
            .map(ProtocolEvent::ChannelMessage)
            .unwrap_or_else(|| ProtocolEvent::Unrecognized(line.to_string())),
        _ => ProtocolEvent::Unrecognized(line.to_string()),
    }
}

/// Token of an unprefixed `PING` line, echoed verbatim.
fn keepalive_token(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("PING")?;
    if rest.is_empty() {
        return Some("");
    }
    rest.starts_with(' ').then(|| rest.trim())
}

/// Split `PRIVMSG` parameters into target and body.
///
/// Only the first delimiter after the target separates header from body,
/// so colons inside the text survive.
fn parse_privmsg(prefix: &str, params: &str) -> Option<ChannelMessage> {
    let sender = prefix.split('!').next().unwrap_or(prefix);
    let (target, body) = params.trim_start().split_once(' ')?;
    if sender.is_empty() || target.is_empty() {
        return None;
    }

    let body = body.trim_start();
    let text = body.strip_prefix(':').unwrap_or(body);

    Some(ChannelMessage {
        sender: sender.to_string(),
        channel: target.to_string(),
        text: text.to_string(),
    })
}

/// Reassembles lines from arbitrary receive chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete line it finished.
    ///
    /// Lines are decoded as UTF-8 with invalid sequences replaced. Empty
    /// lines are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }

        if self.pending.len() > MAX_PENDING_BYTES {
            tracing::warn!(
                bytes = self.pending.len(),
                "Discarding oversized unterminated line"
            );
            self.pending.clear();
        }

        lines
    }

    /// Append a chunk and parse every completed line.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<ProtocolEvent> {
        self.push(bytes).iter().map(|line| parse_line(line)).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
