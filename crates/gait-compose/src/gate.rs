//! Latest-submission-wins admission control.
//!
//! Every pipeline owns one gate. A submission takes a [`Ticket`]; when its
//! work finishes, the result is admitted only if no newer ticket has been
//! issued in the meantime. Stale results are dropped without touching shared
//! state, which gives switch-to-latest semantics without cancelling the
//! underlying service call.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;

/// Sequence number of one pipeline submission. The default ticket precedes
/// every issued one and is never admitted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct GateInner {
    latest: u64,
    retired: bool,
}

#[derive(Debug, Default)]
pub struct LatestGate {
    inner: Mutex<GateInner>,
}

impl LatestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next ticket, superseding every earlier one.
    pub fn issue(&self) -> Ticket {
        let mut inner = self.inner.lock();
        inner.latest += 1;
        Ticket(inner.latest)
    }

    /// Run `apply` if `ticket` is still the latest one.
    ///
    /// The gate stays locked while `apply` runs, so no newer ticket can be
    /// issued between the check and the write.
    pub fn admit<R>(&self, ticket: Ticket, apply: impl FnOnce() -> R) -> Option<R> {
        let inner = self.inner.lock();
        if inner.retired || inner.latest != ticket.0 {
            return None;
        }
        let out = apply();
        drop(inner);
        Some(out)
    }

    /// Refuse every outstanding and future ticket.
    pub fn retire(&self) {
        self.inner.lock().retired = true;
    }
}
