//! The seam between a session and the wire.
//!
//! A [`Connector`] opens an [`RaTransport`] for a URL; the session drives
//! everything else through that transport. This crate ships no network
//! transport: real ones speak `svn://`, DAV or the local filesystem, and the
//! integration tests use an in-memory repository.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;

use crate::editor::{EditorEvent, EditorEventHandler, Report};
use crate::lock::{LockDesc, LockManyOptions, LockTarget, UnlockManyOptions, UnlockTarget};
use crate::{
    AuthChain, CommitInfo, CommitOptions, DirListing, DirentFields, FileRev, LogEntry, LogOptions,
    NodeKind, PropertyList, ReplayOptions, SessionConfig, SvnError, SvnUrl, SwitchOptions,
    UpdateOptions,
};

/// A boxed, `Send` future returned by transport methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SvnError>> + Send + 'a>>;

type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Forwards transfer progress to the caller's callback, if any.
#[derive(Clone, Default)]
pub struct ProgressNotifier {
    callback: Option<Arc<ProgressFn>>,
}

impl ProgressNotifier {
    /// A notifier that drops every report.
    pub fn none() -> Self {
        Self::default()
    }

    /// Reports `progress` bytes so far out of `total`, when known.
    pub fn notify(&self, progress: u64, total: Option<u64>) {
        if let Some(callback) = &self.callback {
            callback(progress, total);
        }
    }
}

impl fmt::Debug for ProgressNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressNotifier")
            .field("enabled", &self.callback.is_some())
            .finish()
    }
}

/// Caller callbacks owned by a session.
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    progress: ProgressNotifier,
}

impl SessionCallbacks {
    /// No callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress callback, called with `(progress, total)`.
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.progress = ProgressNotifier {
            callback: Some(Arc::new(progress)),
        };
        self
    }

    /// The notifier handed to transports.
    pub fn progress(&self) -> &ProgressNotifier {
        &self.progress
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("progress", &self.progress)
            .finish()
    }
}

/// Everything a connector needs to open a transport.
#[derive(Debug)]
pub struct ConnectRequest<'a> {
    /// URL the session is opened at.
    pub url: &'a SvnUrl,
    /// Credential providers.
    pub auth: &'a AuthChain,
    /// Session configuration.
    pub config: &'a SessionConfig,
    /// Progress sink for transfer accounting.
    pub progress: ProgressNotifier,
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Connects to `request.url`. Failures should be reported as
    /// [`SvnError::Transport`] or [`SvnError::AuthFailed`].
    fn connect<'a>(&'a self, request: ConnectRequest<'a>) -> BoxFuture<'a, Box<dyn RaTransport>>;
}

/// Log entry sink used by [`RaTransport::get_log`].
pub type LogSink<'a> = dyn FnMut(LogEntry) -> ControlFlow<()> + Send + 'a;
/// File revision sink used by [`RaTransport::get_file_revs`].
pub type FileRevSink<'a> = dyn FnMut(FileRev) -> Result<(), SvnError> + Send + 'a;

/// One connection to a repository.
///
/// Paths are relative to the transport's current URL. Implementations need
/// not validate call ordering; the session does that.
pub trait RaTransport: Send {
    /// Moves the transport to `url`, which lies in the same repository.
    fn reparent<'a>(&'a mut self, url: &'a SvnUrl) -> BoxFuture<'a, ()>;

    /// Repository UUID.
    fn get_uuid(&mut self) -> BoxFuture<'_, String>;

    /// Repository root URL.
    fn get_repos_root(&mut self) -> BoxFuture<'_, SvnUrl>;

    /// Youngest revision.
    fn get_latest_revnum(&mut self) -> BoxFuture<'_, u64>;

    /// Streams log entries until exhausted or until `sink` breaks.
    fn get_log<'a>(
        &'a mut self,
        options: &'a LogOptions,
        sink: &'a mut LogSink<'_>,
    ) -> BoxFuture<'a, ()>;

    /// Sends `report` and drives `editor` with the resulting edit.
    fn update<'a>(
        &'a mut self,
        options: &'a UpdateOptions,
        report: &'a Report,
        editor: &'a mut dyn EditorEventHandler,
    ) -> BoxFuture<'a, ()>;

    /// Like [`RaTransport::update`] against `options.switch_url`.
    fn switch<'a>(
        &'a mut self,
        options: &'a SwitchOptions,
        report: &'a Report,
        editor: &'a mut dyn EditorEventHandler,
    ) -> BoxFuture<'a, ()>;

    /// Drives `editor` with the changes made in one revision.
    fn replay<'a>(
        &'a mut self,
        options: &'a ReplayOptions,
        editor: &'a mut dyn EditorEventHandler,
    ) -> BoxFuture<'a, ()>;

    /// Submits a complete edit as a new revision.
    fn commit<'a>(
        &'a mut self,
        options: &'a CommitOptions,
        events: &'a [EditorEvent],
    ) -> BoxFuture<'a, CommitInfo>;

    /// Lists a directory. The session masks entries to `fields` afterwards.
    fn get_dir<'a>(
        &'a mut self,
        path: &'a str,
        rev: Option<u64>,
        fields: DirentFields,
    ) -> BoxFuture<'a, DirListing>;

    /// Kind of the node at `path`.
    fn check_path<'a>(&'a mut self, path: &'a str, rev: Option<u64>) -> BoxFuture<'a, NodeKind>;

    /// Whether the server advertises `capability`.
    fn has_capability<'a>(&'a mut self, capability: &'a str) -> BoxFuture<'a, bool>;

    /// Locks each target. Returns one result per target, in order.
    fn lock<'a>(
        &'a mut self,
        options: &'a LockManyOptions,
        targets: &'a [LockTarget],
    ) -> BoxFuture<'a, Vec<Result<LockDesc, SvnError>>>;

    /// Unlocks each target. Returns one result per target, in order.
    fn unlock<'a>(
        &'a mut self,
        options: &'a UnlockManyOptions,
        targets: &'a [UnlockTarget],
    ) -> BoxFuture<'a, Vec<Result<(), SvnError>>>;

    /// The lock on `path`, if any.
    fn get_lock<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Option<LockDesc>>;

    /// Every lock at or below `path`, keyed by repository path.
    fn get_locks<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, BTreeMap<String, LockDesc>>;

    /// Locations of the node `path@peg` at each of `revisions`.
    fn get_locations<'a>(
        &'a mut self,
        path: &'a str,
        peg: u64,
        revisions: &'a [u64],
    ) -> BoxFuture<'a, BTreeMap<u64, String>>;

    /// Streams the revisions of a file between `start` and `end`.
    fn get_file_revs<'a>(
        &'a mut self,
        path: &'a str,
        start: u64,
        end: u64,
        sink: &'a mut FileRevSink<'_>,
    ) -> BoxFuture<'a, ()>;

    /// Every property of revision `rev`.
    fn rev_proplist(&mut self, rev: u64) -> BoxFuture<'_, PropertyList>;

    /// Sets or deletes a revision property.
    fn change_rev_prop<'a>(
        &'a mut self,
        rev: u64,
        name: &'a str,
        value: Option<&'a [u8]>,
    ) -> BoxFuture<'a, ()>;
}
