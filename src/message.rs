//! Line protocol definitions
//!
//! Client input is one line per message, with a single control form
//! (`nickname:<name>`). Server output is one line per [`ServerMessage`].

use std::fmt;

/// Prefix of the control line that sets a session's nickname
pub const NICKNAME_PREFIX: &str = "nickname:";

/// Client → Server line
///
/// No validation is done: anything that is not a nickname line is chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Set nickname (may be empty)
    Nickname(String),
    /// Chat text, relayed to everyone
    Chat(String),
}

impl ClientLine {
    /// Classify one input line (terminator already stripped)
    pub fn parse(line: &str) -> Self {
        match line.strip_prefix(NICKNAME_PREFIX) {
            Some(nickname) => ClientLine::Nickname(nickname.to_string()),
            None => ClientLine::Chat(line.to_string()),
        }
    }
}

/// Server → Client line
///
/// `Display` renders the exact wire text, without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Private greeting sent only to the new session
    Welcome { identity: String },
    /// A session joined
    Arrived { name: String },
    /// A session set its nickname
    Renamed { identity: String, nickname: String },
    /// Chat line
    Chat { from: String, text: String },
    /// A session left
    Left { name: String },
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { identity } => write!(f, "You are {}", identity),
            ServerMessage::Arrived { name } => write!(f, "{} has arrived", name),
            ServerMessage::Renamed { identity, nickname } => {
                write!(f, "{} is now {}", identity, nickname)
            }
            ServerMessage::Chat { from, text } => write!(f, "{}: {}", from, text),
            ServerMessage::Left { name } => write!(f, "{} has left", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nickname() {
        assert_eq!(
            ClientLine::parse("nickname:Alice"),
            ClientLine::Nickname("Alice".to_string())
        );
    }

    #[test]
    fn test_parse_empty_nickname() {
        assert_eq!(
            ClientLine::parse("nickname:"),
            ClientLine::Nickname(String::new())
        );
    }

    #[test]
    fn test_parse_chat() {
        assert_eq!(
            ClientLine::parse("hello nickname:Bob"),
            ClientLine::Chat("hello nickname:Bob".to_string())
        );
        // Prefix match is case-sensitive
        assert_eq!(
            ClientLine::parse("Nickname:Bob"),
            ClientLine::Chat("Nickname:Bob".to_string())
        );
        assert_eq!(ClientLine::parse(""), ClientLine::Chat(String::new()));
    }

    #[test]
    fn test_server_message_wire_text() {
        let addr = "127.0.0.1:5000".to_string();
        assert_eq!(
            ServerMessage::Welcome { identity: addr.clone() }.to_string(),
            "You are 127.0.0.1:5000"
        );
        assert_eq!(
            ServerMessage::Arrived { name: addr.clone() }.to_string(),
            "127.0.0.1:5000 has arrived"
        );
        assert_eq!(
            ServerMessage::Renamed {
                identity: addr.clone(),
                nickname: "Alice".to_string(),
            }
            .to_string(),
            "127.0.0.1:5000 is now Alice"
        );
        assert_eq!(
            ServerMessage::Chat {
                from: "Alice".to_string(),
                text: "hi there".to_string(),
            }
            .to_string(),
            "Alice: hi there"
        );
        assert_eq!(
            ServerMessage::Left { name: "Alice".to_string() }.to_string(),
            "Alice has left"
        );
    }
}
