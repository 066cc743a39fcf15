//! Presence debouncing for mobile devices.
//!
//! Reachability probes are lossy, so a single failed ping must not mark a
//! phone as gone. Leaving needs [`DISCONNECT_THRESHOLD`] consecutive
//! unreachable samples; coming back needs [`CONNECT_THRESHOLD`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::debug;

/// Consecutive unreachable samples needed to confirm a disconnect.
pub const DISCONNECT_THRESHOLD: u32 = 5;

/// Consecutive reachable samples needed to confirm a connect.
pub const CONNECT_THRESHOLD: u32 = 1;

/// A confirmed change in presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected,
    Disconnected,
}

impl Transition {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DebounceState {
    confirmed: bool,
    mismatches: u32,
}

/// Hysteresis filter over raw reachability samples, keyed by IP address.
///
/// All entries sit behind one mutex; each sample is a single
/// read-modify-write under that lock.
#[derive(Debug, Default)]
pub struct PresenceDebouncer {
    states: Mutex<HashMap<String, DebounceState>>,
}

impl PresenceDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample and return the transition it confirms, if any.
    ///
    /// The first sample for an address only establishes the baseline.
    pub fn observe(&self, ip_address: &str, reachable: bool) -> Option<Transition> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(state) = states.get_mut(ip_address) else {
            states.insert(
                ip_address.to_string(),
                DebounceState {
                    confirmed: reachable,
                    mismatches: 0,
                },
            );
            debug!(ip_address, reachable, "presence baseline established");
            return None;
        };

        if state.confirmed == reachable {
            state.mismatches = 0;
            return None;
        }

        let threshold = if reachable {
            CONNECT_THRESHOLD
        } else {
            DISCONNECT_THRESHOLD
        };

        state.mismatches += 1;
        if state.mismatches < threshold {
            debug!(
                ip_address,
                mismatches = state.mismatches,
                threshold,
                "presence mismatch counted"
            );
            return None;
        }

        state.confirmed = reachable;
        state.mismatches = 0;
        Some(if reachable {
            Transition::Connected
        } else {
            Transition::Disconnected
        })
    }

    /// Last confirmed reachability for an address.
    #[cfg(test)]
    fn confirmed(&self, ip_address: &str) -> Option<bool> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(ip_address).map(|s| s.confirmed)
    }
}
