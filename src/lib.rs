//! Subversion remote-access core: tree-delta editing, working-copy reports,
//! text-delta windows and repository sessions.
//!
//! This crate implements the protocol layer a Subversion client uses to keep
//! its view of a versioned tree in sync with a server. It does **not**
//! implement a working copy or a network transport: sessions talk to the
//! repository through a caller-supplied [`Connector`] / [`RaTransport`] pair.
//!
//! Most users start by opening a [`RaSession`].
//!
//! ## Getting started
//!
//! ```rust,no_run
//! use std::ops::ControlFlow;
//! use std::sync::Arc;
//!
//! use svn_ra::{
//!     AuthChain, Connector, LogOptions, RaSession, SessionCallbacks, SessionConfig,
//!     StaticCredentials,
//! };
//!
//! async fn show_history(connector: Arc<dyn Connector>) -> svn_ra::Result<()> {
//!     let auth = AuthChain::new().with_provider(StaticCredentials::simple("alice", "secret"));
//!     let mut session = RaSession::open(
//!         connector,
//!         "svn://example.com/repo/trunk",
//!         SessionCallbacks::new(),
//!         auth,
//!         SessionConfig::new().with_ra_client("history-tool/1.0"),
//!     )
//!     .await?;
//!
//!     let head = session.get_latest_revnum().await?;
//!     let options = LogOptions::between(head, 1).with_limit(10);
//!     session
//!         .get_log(&options, |entry| {
//!             println!("r{} {:?}", entry.rev, entry.message);
//!             ControlFlow::Continue(())
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Editing
//!
//! An edit is a depth-first walk over a tree. [`Editor`] drives one with
//! typed handles and rejects out-of-order calls; [`CheckedEditor`] applies
//! the same rules to an edit arriving from a server. File contents travel
//! as [`TextDeltaWindow`] streams, see the [`delta`] module.
//!
//! ## Features
//!
//! - `serde`: enables `Serialize`/`Deserialize` for public data types.

#![deny(unsafe_code)]

mod auth;
mod commit;
mod config;
pub mod delta;
mod editor;
mod error;
mod lock;
mod options;
mod path;
mod reporter;
pub mod scope;
mod session;
mod transport;
mod types;
mod url;

pub use auth::{
    AuthChain, AuthProvider, Credential, CredentialKind, Credentials,
    SVN_AUTH_PARAM_DEFAULT_PASSWORD, SVN_AUTH_PARAM_DEFAULT_USERNAME,
    SVN_AUTH_PARAM_NO_AUTH_CACHE, SVN_AUTH_PARAM_NON_INTERACTIVE, SimplePrompt,
    SslServerCertInfo, SslServerTrustPrompt, StaticCredentials, UsernamePrompt,
};
pub use commit::CommitEditor;
pub use config::SessionConfig;
pub use delta::{DeltaAction, DeltaApplier, DeltaOp, TextDeltaWindow, WindowSink};
pub use editor::{
    CheckedEditor, CollectedFile, ContentCollector, DirHandle, EditRecorder, EditState, Editor,
    EditorEvent, EditorEventHandler, FileHandle, Report, ReportCommand, WindowHandler,
};
pub use error::{
    ErrorKind, SVN_ERR_FS_BAD_LOCK_TOKEN, SVN_ERR_FS_LOCK_OWNER_MISMATCH, SVN_ERR_FS_NO_SUCH_LOCK,
    SVN_ERR_FS_NOT_FOUND, SVN_ERR_FS_PATH_ALREADY_LOCKED, SVN_ERR_RA_NOT_AUTHORIZED,
    SVN_ERR_RA_NOT_IMPLEMENTED, ServerError, ServerErrorItem, SvnError,
};
pub use lock::{LockDesc, LockManyOptions, LockTarget, UnlockManyOptions, UnlockTarget};
pub use options::{
    CommitOptions, LogOptions, LogRevProps, ReplayOptions, SwitchOptions, UpdateOptions,
};
pub use reporter::{Reporter, ReporterState};
pub use session::RaSession;
pub use transport::{
    BoxFuture, ConnectRequest, Connector, FileRevSink, LogSink, ProgressNotifier, RaTransport,
    SessionCallbacks,
};
pub use types::{
    Capability, ChangeAction, ChangedPath, CommitInfo, Depth, DirEntry, DirListing, DirentFields,
    FileRev, FileRevContents, LogEntry, NodeKind, PropDelta, PropertyList,
    SVN_PROP_REVISION_AUTHOR, SVN_PROP_REVISION_DATE, SVN_PROP_REVISION_LOG,
    SVN_PROP_TXN_USER_AGENT,
};
pub use url::SvnUrl;

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, SvnError>;
