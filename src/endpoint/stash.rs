//! Reload-preserving socket stash (§4.2 "Reload-preserving sockets", §8
//! "Stash timeout bound"): a process-wide registry that lets an endpoint
//! restarted across a reload adopt its predecessor's listening socket
//! instead of rebinding.

use crate::config::InterfaceAddress;
use dashmap::DashMap;
use std::net::TcpListener as StdTcpListener;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct StashedSocket {
    listener: StdTcpListener,
    stashed_at: Instant,
}

/// Default stash timeout (§4.2, §5): 5 seconds.
pub const DEFAULT_STASH_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-wide holding area for listening sockets across reload (§3
/// "Stashed socket", GLOSSARY "Stash"). At most one stashed socket per
/// interface; re-stash replaces (§4.2 invariants).
#[derive(Default)]
pub struct SocketStash {
    entries: DashMap<InterfaceAddress, StashedSocket>,
}

impl SocketStash {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Stashes `listener` for `interface`, replacing any prior entry for the
    /// same interface (whose socket is dropped/closed).
    pub fn stash(&self, interface: InterfaceAddress, listener: StdTcpListener) {
        self.entries.insert(interface, StashedSocket { listener, stashed_at: Instant::now() });
    }

    /// Adopts a stashed socket for `interface`, if one exists and has not
    /// expired. Interface equality follows [`InterfaceAddress::same_interface`]
    /// (an `{fd:N}` interface is equal only to itself, §9).
    pub fn adopt(&self, interface: &InterfaceAddress, timeout: Duration) -> Option<StdTcpListener> {
        let (_, entry) = self.entries.remove_if(interface, |_, _| true)?;
        if entry.stashed_at.elapsed() > timeout {
            // Expired: drop closes the socket; report as no adoption.
            None
        } else {
            Some(entry.listener)
        }
    }

    /// Removes (and thereby closes) any entries whose stash timer has
    /// expired (§8 "Stash timeout bound").
    pub fn sweep(&self, timeout: Duration) {
        self.entries.retain(|_, entry| entry.stashed_at.elapsed() <= timeout);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Spawns a background sweeper that periodically expires stale stashed
/// sockets, stopping when `cancel` fires.
pub fn spawn_sweeper(stash: std::sync::Arc<SocketStash>, timeout: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(250).min(timeout));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => stash.sweep(timeout),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_any() -> StdTcpListener {
        StdTcpListener::bind("127.0.0.1:0").unwrap()
    }

    #[test]
    fn stash_then_adopt_same_interface() {
        let stash = SocketStash::new();
        let listener = bind_any();
        let interface = InterfaceAddress::for_address("127.0.0.1", listener.local_addr().unwrap().port());
        stash.stash(interface.clone(), listener);
        assert_eq!(stash.len(), 1);
        let adopted = stash.adopt(&interface, Duration::from_secs(5));
        assert!(adopted.is_some());
        assert_eq!(stash.len(), 0);
    }

    #[test]
    fn expired_stash_is_not_adopted() {
        let stash = SocketStash::new();
        let listener = bind_any();
        let interface = InterfaceAddress::for_address("127.0.0.1", listener.local_addr().unwrap().port());
        stash.stash(interface.clone(), listener);
        std::thread::sleep(Duration::from_millis(5));
        let adopted = stash.adopt(&interface, Duration::from_millis(1));
        assert!(adopted.is_none());
    }

    #[test]
    fn fd_interface_equal_only_to_itself() {
        let a = InterfaceAddress::for_fd(3);
        let b = InterfaceAddress::for_fd(3);
        let c = InterfaceAddress::for_fd(4);
        assert!(a.same_interface(&b));
        assert!(!a.same_interface(&c));
    }

    #[test]
    fn restash_replaces_prior_entry() {
        let stash = SocketStash::new();
        let l1 = bind_any();
        let port = l1.local_addr().unwrap().port();
        let interface = InterfaceAddress::for_address("127.0.0.1", port);
        stash.stash(interface.clone(), l1);
        let l2 = bind_any();
        stash.stash(interface.clone(), l2);
        assert_eq!(stash.len(), 1);
    }
}
