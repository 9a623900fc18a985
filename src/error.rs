use thiserror::Error;

/// `SVN_ERR_FS_NOT_FOUND`: the path does not exist in the requested revision.
pub const SVN_ERR_FS_NOT_FOUND: u64 = 160013;
/// `SVN_ERR_FS_NO_SUCH_LOCK`: the path is not locked.
pub const SVN_ERR_FS_NO_SUCH_LOCK: u64 = 160034;
/// `SVN_ERR_FS_PATH_ALREADY_LOCKED`: another owner holds the lock.
pub const SVN_ERR_FS_PATH_ALREADY_LOCKED: u64 = 160035;
/// `SVN_ERR_FS_BAD_LOCK_TOKEN`: the supplied token does not match the lock.
pub const SVN_ERR_FS_BAD_LOCK_TOKEN: u64 = 160037;
/// `SVN_ERR_FS_LOCK_OWNER_MISMATCH`: the lock belongs to another user.
pub const SVN_ERR_FS_LOCK_OWNER_MISMATCH: u64 = 160039;
/// `SVN_ERR_RA_NOT_AUTHORIZED`: the server refused the credentials.
pub const SVN_ERR_RA_NOT_AUTHORIZED: u64 = 170001;
/// `SVN_ERR_RA_NOT_IMPLEMENTED`: the server lacks a required capability.
pub const SVN_ERR_RA_NOT_IMPLEMENTED: u64 = 170003;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// One entry of a server-reported error chain.
pub struct ServerErrorItem {
    /// Subversion error code.
    pub code: u64,
    /// Human-readable error message.
    pub message: Option<String>,
    /// Source file on the server side, if provided.
    pub file: Option<String>,
    /// Source line on the server side, if provided.
    pub line: Option<u64>,
}

impl ServerErrorItem {
    /// Creates an item with a code and message and no source location.
    pub fn new(code: u64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            file: None,
            line: None,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A structured repository error reported by the server.
///
/// `context` is typically the operation name and `chain` is the
/// server-provided error stack, outermost first.
pub struct ServerError {
    /// High-level context for the failure (for example, the operation name).
    pub context: Option<String>,
    /// The server-provided error chain.
    pub chain: Vec<ServerErrorItem>,
}

impl ServerError {
    /// Creates a single-item error.
    pub fn new(code: u64, message: impl Into<String>) -> Self {
        Self {
            context: None,
            chain: vec![ServerErrorItem::new(code, message)],
        }
    }

    /// Attaches additional context to this error.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns the outermost error code, if the chain is non-empty.
    pub fn code(&self) -> Option<u64> {
        self.chain.first().map(|item| item.code)
    }

    /// Returns `true` if any item in the chain carries `code`.
    pub fn has_code(&self, code: u64) -> bool {
        self.chain.iter().any(|item| item.code == code)
    }

    /// Returns a single-line, human-readable message.
    pub fn message_summary(&self) -> String {
        let mut messages = Vec::new();
        for err in &self.chain {
            if let Some(message) = err.message.as_deref()
                && !message.is_empty()
            {
                messages.push(message);
            }
        }
        if messages.is_empty() {
            "unknown error".to_string()
        } else {
            messages.join("; ")
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ctx) = self.context.as_deref()
            && !ctx.is_empty()
        {
            write!(f, "{ctx}: ")?;
        }
        write!(f, "{}", self.message_summary())
    }
}

/// Broad classification of an [`SvnError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection or network failure. The caller may retry the session open.
    Transport,
    /// Illegal call ordering on an editor, reporter or session.
    ProtocolState,
    /// Failure reported by the repository.
    Repository,
    /// An applied text delta produced unexpected content.
    ChecksumMismatch,
    /// The peer sent data that does not follow the protocol.
    MalformedData,
    /// Caller input was rejected before anything was sent.
    InvalidInput,
    /// No usable credentials.
    Auth,
}

#[derive(Debug, Error)]
#[non_exhaustive]
/// Errors returned by this crate.
pub enum SvnError {
    /// The provided URL is syntactically invalid or outside the repository.
    #[error("invalid svn url: {0}")]
    InvalidUrl(String),
    /// The provided repository path is invalid or unsafe.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// An I/O error occurred while reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport failed to connect or lost its connection.
    #[error("transport error: {0}")]
    Transport(String),
    /// The peer sent data that does not match the protocol shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// An editor, reporter or session call was made in an illegal state.
    #[error("protocol state error: {0}")]
    ProtocolState(String),
    /// Applying a text delta produced content with an unexpected checksum.
    #[error("checksum mismatch for '{path}': expected {expected}, actual {actual}")]
    ChecksumMismatch {
        /// Path of the file whose content disagreed.
        path: String,
        /// Checksum announced by the sender.
        expected: String,
        /// Checksum of the content actually produced.
        actual: String,
    },
    /// No provider in the auth chain produced a credential.
    #[error("no credentials available for realm '{0}'")]
    AuthUnavailable(String),
    /// Authentication failed (for example, invalid username/password).
    #[error("auth failed: {0}")]
    AuthFailed(String),
    /// The server returned a failure.
    #[error("server error: {0}")]
    Server(ServerError),
}

impl SvnError {
    /// Classifies this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Io(_) => ErrorKind::Transport,
            Self::ProtocolState(_) => ErrorKind::ProtocolState,
            Self::Server(_) => ErrorKind::Repository,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::Protocol(_) => ErrorKind::MalformedData,
            Self::InvalidUrl(_) | Self::InvalidPath(_) => ErrorKind::InvalidInput,
            Self::AuthUnavailable(_) | Self::AuthFailed(_) => ErrorKind::Auth,
        }
    }

    /// Returns `true` for failures a caller may reasonably retry.
    ///
    /// The crate itself never retries.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::ProtocolState(message.into())
    }

    /// Returns the server error, if this is a repository failure.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ServerError> for SvnError {
    fn from(err: ServerError) -> Self {
        Self::Server(err)
    }
}
