//! Scoped State Lifecycle
//!
//! Handles are created lazily on first demand within a scope instance and
//! released exactly once when the scope ends, on every exit path. Ownership
//! is explicit: a [`ScopedState`] belongs to one fork, run-scoped handles are
//! shared read-only behind `Arc`, worker-scoped handles are owned by their
//! worker, invocation-scoped handles live for a single measured call.

use crate::provider::{BackingKind, BufferHandle, SetupError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Lifetime boundary that decides when a handle is created and destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// One handle per fork, shared by all workers in it.
    Run,
    /// One handle per worker thread. The default.
    Worker,
    /// A fresh handle for every measured invocation, built outside the
    /// timed window.
    Invocation,
}

/// Per-fork state factory. Dropped when the fork ends, which releases any
/// run-scoped handle it still caches.
pub struct ScopedState {
    backing: BackingKind,
    scope: ScopeKind,
    temp_dir: Option<PathBuf>,
    // Lazily created run-scoped handle, shared across workers.
    run_handle: Mutex<Option<Arc<BufferHandle>>>,
}

impl ScopedState {
    /// State factory for one fork of `backing` under `scope`.
    pub fn new(backing: BackingKind, scope: ScopeKind, temp_dir: Option<&Path>) -> Self {
        Self {
            backing,
            scope,
            temp_dir: temp_dir.map(Path::to_path_buf),
            run_handle: Mutex::new(None),
        }
    }

    /// The scope this state hands out handles under.
    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    /// Lease a handle for one worker, creating it on first demand.
    ///
    /// Run scope returns a shared clone of the fork-wide handle; worker scope
    /// returns a handle the caller owns outright. Invocation scope returns an
    /// empty lease — the worker asks for a [`ScopedState::fresh`] handle
    /// before each measured call instead.
    pub fn lease(&self) -> Result<HandleLease, SetupError> {
        match self.scope {
            ScopeKind::Run => {
                let mut cached = self.run_handle.lock().expect("run handle lock");
                let handle = match cached.as_ref() {
                    Some(shared) => Arc::clone(shared),
                    None => {
                        let shared = Arc::new(self.create()?);
                        *cached = Some(Arc::clone(&shared));
                        shared
                    }
                };
                Ok(HandleLease::Shared(handle))
            }
            ScopeKind::Worker => Ok(HandleLease::Owned(self.create()?)),
            ScopeKind::Invocation => Ok(HandleLease::PerInvocation),
        }
    }

    /// Create a handle that lives for a single invocation.
    pub fn fresh(&self) -> Result<BufferHandle, SetupError> {
        self.create()
    }

    fn create(&self) -> Result<BufferHandle, SetupError> {
        self.backing.create(self.temp_dir.as_deref())
    }
}

/// A worker's hold on its scoped handle. Dropping the lease is the worker's
/// teardown; the last lease (or the owning [`ScopedState`]) releases the
/// underlying handle exactly once.
pub enum HandleLease {
    /// Run-scoped: shared with the other workers of this fork.
    Shared(Arc<BufferHandle>),
    /// Worker-scoped: exclusively owned.
    Owned(BufferHandle),
    /// Invocation-scoped: no standing handle.
    PerInvocation,
}

impl HandleLease {
    /// The standing handle, if this lease carries one.
    #[inline]
    pub fn handle(&self) -> Option<&BufferHandle> {
        match self {
            HandleLease::Shared(shared) => Some(shared),
            HandleLease::Owned(owned) => Some(owned),
            HandleLease::PerInvocation => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SEED_VALUE;

    #[test]
    fn run_scope_shares_one_handle() {
        let state = ScopedState::new(BackingKind::DirectBuffer, ScopeKind::Run, None);
        let a = state.lease().unwrap();
        let b = state.lease().unwrap();
        let (HandleLease::Shared(a), HandleLease::Shared(b)) = (&a, &b) else {
            panic!("run scope must lease shared handles");
        };
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(a.get_int(0).unwrap(), SEED_VALUE);
    }

    #[test]
    fn worker_scope_hands_out_distinct_handles() {
        let state = ScopedState::new(BackingKind::HeapBuffer, ScopeKind::Worker, None);
        let a = state.lease().unwrap();
        let b = state.lease().unwrap();
        let (Some(a), Some(b)) = (a.handle(), b.handle()) else {
            panic!("worker scope must lease standing handles");
        };
        assert!(!std::ptr::eq(a, b));
        assert_eq!(a.get_int(0).unwrap(), SEED_VALUE);
        assert_eq!(b.get_int(0).unwrap(), SEED_VALUE);
    }

    #[test]
    fn invocation_scope_leases_nothing_standing() {
        let state = ScopedState::new(BackingKind::HeapArray, ScopeKind::Invocation, None);
        let lease = state.lease().unwrap();
        assert!(lease.handle().is_none());
        let fresh = state.fresh().unwrap();
        assert_eq!(fresh.get_int(0).unwrap(), SEED_VALUE);
    }

    #[test]
    fn run_scope_teardown_happens_once_at_state_drop() {
        let state = ScopedState::new(BackingKind::MappedBuffer, ScopeKind::Run, None);
        let path = {
            let lease = state.lease().unwrap();
            let Some(BufferHandle::MappedBuffer(region)) = lease.handle() else {
                panic!("expected mapped handle");
            };
            let path = region.backing_path().unwrap().to_path_buf();
            assert!(path.exists());
            path
        };
        // Lease dropped, but the run-scoped handle outlives it.
        assert!(path.exists(), "handle must survive individual leases");
        drop(state);
        assert!(!path.exists(), "teardown runs when the scope ends");
    }

    #[test]
    fn worker_scope_teardown_happens_at_lease_drop() {
        let state = ScopedState::new(BackingKind::MappedBuffer, ScopeKind::Worker, None);
        let lease = state.lease().unwrap();
        let Some(BufferHandle::MappedBuffer(region)) = lease.handle() else {
            panic!("expected mapped handle");
        };
        let path = region.backing_path().unwrap().to_path_buf();
        assert!(path.exists());
        drop(lease);
        assert!(!path.exists());
    }

    #[test]
    fn setup_failure_propagates_from_lease() {
        let missing = Path::new("/nonexistent/bufbench-scope-test");
        let state = ScopedState::new(BackingKind::MappedBuffer, ScopeKind::Worker, Some(missing));
        assert!(state.lease().is_err());
    }
}
