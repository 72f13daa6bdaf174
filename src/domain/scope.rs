//! Chat Scope Value Object
//!
//! A chat scope identifies one broadcast context: a server channel, a direct
//! conversation, a private group, or a whole server (used for invitation
//! notices). Each scope maps to exactly one group tag, the opaque string key
//! the gateway indexes memberships under.
//!
//! Group tag grammar:
//! - `channel:<id>`
//! - `dm:<id>`
//! - `privateGroup:<id>`
//! - `server:<id>`

use serde::{Deserialize, Serialize};

/// A chat scope, discriminated by kind and carrying the scope's numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum ChatScope {
    /// A text channel inside a server.
    Channel(i64),
    /// A one-to-one direct conversation.
    Direct(i64),
    /// A multi-member private group conversation.
    PrivateGroup(i64),
    /// A whole server; used to fan out invitation notices to subscribers.
    Server(i64),
}

impl ChatScope {
    /// Build the group tag for this scope. Pure and deterministic.
    pub fn group_tag(&self) -> String {
        match self {
            ChatScope::Channel(id) => format!("channel:{}", id),
            ChatScope::Direct(id) => format!("dm:{}", id),
            ChatScope::PrivateGroup(id) => format!("privateGroup:{}", id),
            ChatScope::Server(id) => format!("server:{}", id),
        }
    }

    /// Parse a group tag back into a scope.
    ///
    /// Tags are opaque to the transport; this is the only place their
    /// structure is interpreted.
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let (kind, id) = tag.split_once(':')?;
        let id: i64 = id.parse().ok()?;
        match kind {
            "channel" => Some(ChatScope::Channel(id)),
            "dm" => Some(ChatScope::Direct(id)),
            "privateGroup" => Some(ChatScope::PrivateGroup(id)),
            "server" => Some(ChatScope::Server(id)),
            _ => None,
        }
    }

    /// The scope's numeric id.
    pub fn id(&self) -> i64 {
        match self {
            ChatScope::Channel(id)
            | ChatScope::Direct(id)
            | ChatScope::PrivateGroup(id)
            | ChatScope::Server(id) => *id,
        }
    }

    /// Human-readable kind label, used in logs and client displays.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ChatScope::Channel(_) => "channel",
            ChatScope::Direct(_) => "direct message",
            ChatScope::PrivateGroup(_) => "private group",
            ChatScope::Server(_) => "server",
        }
    }
}

impl std::fmt::Display for ChatScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.group_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(ChatScope::Channel(42), "channel:42")]
    #[test_case(ChatScope::Direct(7), "dm:7")]
    #[test_case(ChatScope::PrivateGroup(3), "privateGroup:3")]
    #[test_case(ChatScope::Server(99), "server:99")]
    fn group_tag_grammar(scope: ChatScope, expected: &str) {
        assert_eq!(scope.group_tag(), expected);
        assert_eq!(ChatScope::parse_tag(expected), Some(scope));
    }

    #[test_case("channel"; "missing id")]
    #[test_case("channel:abc"; "non numeric id")]
    #[test_case("voice:42"; "unknown kind")]
    #[test_case(""; "empty")]
    fn malformed_tags_do_not_parse(tag: &str) {
        assert_eq!(ChatScope::parse_tag(tag), None);
    }

    #[test]
    fn tags_are_stable_for_equal_scopes() {
        assert_eq!(
            ChatScope::Channel(42).group_tag(),
            ChatScope::Channel(42).group_tag()
        );
    }
}
