//! Correlates outstanding peer requests to their response handlers with
//! per-entry deadlines (spec.md §4.5).

use rand::random;
use std::collections::HashMap;
use std::time::Instant;

/// A fresh, opaque 128-bit request correlation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u128);

impl RequestId {
    /// Generate a fresh request ID.
    pub fn generate() -> Self {
        Self(random())
    }
}

type Handler<R> = Box<dyn FnMut(Option<R>) -> Vec<RequestId>>;

struct Entry<R> {
    handler: Handler<R>,
    deadline: Instant,
}

/// Tracks outstanding requests awaiting either a peer reply or a timeout.
///
/// Exactly one of `resolve` or a `sweep_timeouts` firing ever reaches a given
/// handler for a given ID: whichever happens first removes the entry, and the
/// handler's own ID is always forgotten afterward even if it forgets to name
/// itself in its return value.
pub struct PendingRequests<R> {
    entries: HashMap<RequestId, Entry<R>>,
}

impl<R> Default for PendingRequests<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> PendingRequests<R> {
    /// Build an empty tracker.
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no outstanding requests.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a fresh request with its deadline and handler, returning its ID.
    pub fn register(
        &mut self,
        deadline: Instant,
        handler: impl FnMut(Option<R>) -> Vec<RequestId> + 'static,
    ) -> RequestId {
        let id = RequestId::generate();
        self.entries.insert(id, Entry { handler: Box::new(handler), deadline });
        id
    }

    /// Register a request under an already-generated ID (used when the ID
    /// must be threaded through a handler closure before the entry exists,
    /// e.g. fan-out siblings that reference each other).
    pub fn register_with_id(
        &mut self,
        id: RequestId,
        deadline: Instant,
        handler: impl FnMut(Option<R>) -> Vec<RequestId> + 'static,
    ) {
        self.entries.insert(id, Entry { handler: Box::new(handler), deadline });
    }

    /// A reply arrived for `id`. If still outstanding, invokes its handler
    /// with the response and forgets every ID the handler names as resolved,
    /// plus `id` itself. Returns `true` if `id` was found.
    pub fn resolve(&mut self, id: RequestId, response: R) -> bool {
        let Some(mut entry) = self.entries.remove(&id) else {
            return false;
        };
        let completed = (entry.handler)(Some(response));
        for done in completed {
            self.entries.remove(&done);
        }
        true
    }

    /// Fire every entry whose deadline has passed, invoking its handler with
    /// `None` and forgetting every ID it names plus itself.
    pub fn sweep_timeouts(&mut self, now: Instant) {
        let expired: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.deadline)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            let Some(mut entry) = self.entries.remove(&id) else { continue };
            let completed = (entry.handler)(None);
            for done in completed {
                self.entries.remove(&done);
            }
        }
    }

    /// Forget an ID without invoking its handler (used to cancel a sibling
    /// whose outcome was already decided by another handler's return value,
    /// mirroring what `resolve`/`sweep_timeouts` already do for the IDs a
    /// handler reports — exposed for callers that pre-compute cancellations).
    pub fn forget(&mut self, id: RequestId) {
        self.entries.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[test]
    fn resolve_invokes_handler_once_and_forgets_it() {
        let mut pending: PendingRequests<u32> = PendingRequests::new();
        let calls = Rc::new(RefCell::new(0));
        let calls2 = calls.clone();
        let id = pending.register(Instant::now() + Duration::from_secs(1), move |resp| {
            *calls2.borrow_mut() += 1;
            assert_eq!(resp, Some(42));
            vec![]
        });
        assert!(pending.resolve(id, 42));
        assert_eq!(*calls.borrow(), 1);
        // Second resolve for the same ID is a no-op: exactly-once guarantee.
        assert!(!pending.resolve(id, 7));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn timeout_fires_with_none_and_removes_entry() {
        let mut pending: PendingRequests<u32> = PendingRequests::new();
        let fired = Rc::new(RefCell::new(false));
        let fired2 = fired.clone();
        let id = pending.register(Instant::now(), move |resp| {
            *fired2.borrow_mut() = true;
            assert_eq!(resp, None);
            vec![]
        });
        pending.sweep_timeouts(Instant::now());
        assert!(*fired.borrow());
        assert_eq!(pending.len(), 0);
        // Handler's own ID is forgotten even though it returned an empty vec.
        assert!(!pending.resolve(id, 1));
    }

    #[test]
    fn handler_can_cancel_siblings_on_first_reply() {
        let mut pending: PendingRequests<&'static str> = PendingRequests::new();
        let sibling_ids = Rc::new(RefCell::new(Vec::new()));

        let a_id = pending.register(Instant::now() + Duration::from_secs(5), {
            let sibling_ids = sibling_ids.clone();
            move |_resp| sibling_ids.borrow().clone()
        });
        let b_id = pending.register(Instant::now() + Duration::from_secs(5), |_resp| vec![]);
        sibling_ids.borrow_mut().push(b_id);

        assert_eq!(pending.len(), 2);
        pending.resolve(a_id, "first");
        // a's handler named b as resolved too, so both should be gone now.
        assert_eq!(pending.len(), 0);
    }
}
