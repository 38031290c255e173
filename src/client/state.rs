use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reserved. The client never enters this state; a transport suspension moves it to `Reconnecting`.
    Suspended,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Suspended => "suspended",
            ConnectionState::Closed => "closed",
        }
    }

    /// States from which `connect()` starts a new session.
    pub fn can_connect(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Closed
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two independent disconnect flags plus the resend re-entrancy guard.
///
/// `manual` is set by `close()` and suppresses any reaction to transport
/// events produced by the shutdown. `unexpected` is set when the transport
/// drops a live connection and cleared once the following reconnect has run
/// its resend pass.
#[derive(Debug, Default)]
pub struct ConnectionFlags {
    manual: AtomicBool,
    unexpected: AtomicBool,
    resending: AtomicBool,
}

impl ConnectionFlags {
    pub fn manual(&self) -> bool {
        self.manual.load(Ordering::SeqCst)
    }

    pub fn set_manual(&self, value: bool) {
        self.manual.store(value, Ordering::SeqCst);
    }

    pub fn unexpected(&self) -> bool {
        self.unexpected.load(Ordering::SeqCst)
    }

    pub fn set_unexpected(&self, value: bool) {
        self.unexpected.store(value, Ordering::SeqCst);
    }

    /// Claim the resend slot. The returned guard releases it on drop.
    pub fn begin_resend(&self) -> Option<ResendGuard<'_>> {
        self.resending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ResendGuard { flag: &self.resending })
    }
}

pub struct ResendGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ResendGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
