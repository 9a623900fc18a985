//! Scoped resource tracking.
//!
//! Every session, operation and open editor node owns a [`ResourceScope`].
//! A scope is released exactly once: explicitly via [`ResourceScope::release`]
//! or implicitly when it is dropped, whichever comes first. The shared
//! [`ScopeRegistry`] counts live scopes so that leaks show up in tests.

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::trace;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: AtomicUsize,
    opened: AtomicU64,
}

/// Counts the scopes opened through it and the scopes still live.
#[derive(Clone, Debug, Default)]
pub struct ScopeRegistry {
    inner: Arc<RegistryInner>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new top-level scope.
    pub fn open(&self, label: impl Into<Cow<'static, str>>) -> ResourceScope {
        self.open_with_parent(label.into(), None)
    }

    fn open_with_parent(&self, label: Cow<'static, str>, parent: Option<u64>) -> ResourceScope {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live.fetch_add(1, Ordering::AcqRel);
        self.inner.opened.fetch_add(1, Ordering::Relaxed);
        trace!(scope = id, parent, label = %label, "scope opened");
        ResourceScope {
            id,
            parent,
            label,
            registry: self.clone(),
            released: false,
        }
    }

    /// Number of scopes opened and not yet released.
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Total number of scopes ever opened through this registry.
    pub fn opened(&self) -> u64 {
        self.inner.opened.load(Ordering::Relaxed)
    }
}

/// A resource arena that is released exactly once.
#[derive(Debug)]
pub struct ResourceScope {
    id: u64,
    parent: Option<u64>,
    label: Cow<'static, str>,
    registry: ScopeRegistry,
    released: bool,
}

impl ResourceScope {
    /// Opens a child scope in the same registry.
    pub fn child(&self, label: impl Into<Cow<'static, str>>) -> ResourceScope {
        self.registry.open_with_parent(label.into(), Some(self.id))
    }

    /// Scope identifier, unique within its registry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Label given when the scope was opened.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The registry this scope belongs to.
    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Releases the scope now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.registry.inner.live.fetch_sub(1, Ordering::AcqRel);
        trace!(scope = self.id, label = %self.label, "scope released");
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        self.release_once();
    }
}
