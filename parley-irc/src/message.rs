//! Message types exchanged between the session and the dispatcher.

/// A `PRIVMSG` received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Nick of the sender
    pub sender: String,
    /// Target of the message: a channel, or our own nick for private messages
    pub channel: String,
    /// Message body, colons preserved
    pub text: String,
}

impl ChannelMessage {
    /// Whether this message was sent privately to `nickname`.
    ///
    /// IRC nicknames compare case-insensitively.
    pub fn is_private_to(&self, nickname: &str) -> bool {
        self.channel.eq_ignore_ascii_case(nickname)
    }
}

/// A reply to send back to a channel or user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Channel or nick the reply is addressed to
    pub target: String,
    /// Reply text, may span multiple lines
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_message_detection() {
        let msg = ChannelMessage {
            sender: "alice".into(),
            channel: "Parley".into(),
            text: "hi".into(),
        };
        assert!(msg.is_private_to("parley"));
        assert!(!msg.is_private_to("other"));
    }
}
