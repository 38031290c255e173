//! Topic management
//!
//! A topic is the logical channel name used by applications. Before it goes
//! on the wire it is prefixed with the namespace hash resolved at connect time.
//!
//! A small closed set of names is reserved for connectivity events. These can
//! be listened to through `RelayClient::on` but never published to.

pub mod validator;

pub use validator::validate;

use std::fmt;

/// Reserved topics carrying connectivity events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemTopic {
    Connected,
    Disconnected,
    Reconnecting,
    Reconnected,
    MessageResend,
}

impl SystemTopic {
    pub const ALL: [SystemTopic; 5] = [
        SystemTopic::Connected,
        SystemTopic::Disconnected,
        SystemTopic::Reconnecting,
        SystemTopic::Reconnected,
        SystemTopic::MessageResend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemTopic::Connected => "connected",
            SystemTopic::Disconnected => "disconnected",
            SystemTopic::Reconnecting => "reconnecting",
            SystemTopic::Reconnected => "reconnected",
            SystemTopic::MessageResend => "message-resend",
        }
    }

    pub fn parse(topic: &str) -> Option<SystemTopic> {
        Self::ALL.into_iter().find(|t| t.as_str() == topic)
    }

    pub fn is_reserved(topic: &str) -> bool {
        Self::parse(topic).is_some()
    }
}

impl fmt::Display for SystemTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests;
