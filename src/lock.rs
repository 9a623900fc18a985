//! Lock descriptions and bulk lock/unlock requests.

use std::collections::BTreeSet;

use crate::SvnError;
use crate::path::validate_rel_path;

/// A lock held on one repository path.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDesc {
    /// Repository-relative path (no leading `/`) that is locked.
    pub path: String,
    /// Opaque lock token.
    pub token: String,
    /// Lock owner.
    pub owner: String,
    /// Optional lock comment.
    pub comment: Option<String>,
    /// Whether the comment was produced by a WebDAV client.
    pub is_dav_comment: bool,
    /// Creation date string as reported by the server.
    pub created: String,
    /// Expiration date string as reported by the server, if any.
    pub expires: Option<String>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Default)]
/// Options for [`crate::RaSession::lock`].
pub struct LockManyOptions {
    /// Optional lock comment.
    pub comment: Option<String>,
    /// Whether to steal existing locks.
    pub steal_lock: bool,
}

impl LockManyOptions {
    /// Creates default lock options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a lock comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Enables stealing existing locks.
    pub fn steal_lock(mut self) -> Self {
        self.steal_lock = true;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// A lock target for [`crate::RaSession::lock`].
pub struct LockTarget {
    /// Repository path to lock.
    pub path: String,
    /// The revision the caller believes is current for the path. The lock
    /// fails if the path changed after it.
    pub current_rev: Option<u64>,
}

impl LockTarget {
    /// Creates a lock target for a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            current_rev: None,
        }
    }

    /// Sets a current revision constraint for this target.
    pub fn with_current_rev(mut self, current_rev: u64) -> Self {
        self.current_rev = Some(current_rev);
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Default)]
/// Options for [`crate::RaSession::unlock`].
pub struct UnlockManyOptions {
    /// Whether to break locks held by someone else.
    pub break_lock: bool,
}

impl UnlockManyOptions {
    /// Creates default unlock options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables breaking locks (force unlock).
    pub fn break_lock(mut self) -> Self {
        self.break_lock = true;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// An unlock target for [`crate::RaSession::unlock`].
pub struct UnlockTarget {
    /// Repository path to unlock.
    pub path: String,
    /// Lock token; may be omitted when breaking the lock.
    pub token: Option<String>,
}

impl UnlockTarget {
    /// Creates an unlock target for a path.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            token: None,
        }
    }

    /// Sets the lock token for this target.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Canonicalizes target paths and rejects duplicates.
pub(crate) fn normalize_targets<'a, I>(paths: I) -> Result<Vec<String>, SvnError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for path in paths {
        let path = validate_rel_path(path)?;
        if !seen.insert(path.clone()) {
            return Err(SvnError::InvalidPath(format!(
                "path '{path}' is listed more than once"
            )));
        }
        out.push(path);
    }
    Ok(out)
}

/// Hands every per-path result to `notify` in target order.
///
/// Per-path failures are reported through the callback only; the batch as a
/// whole fails only when the transport returned a different number of
/// results than there were targets.
pub(crate) fn dispatch<T, F>(
    op: &str,
    is_lock: bool,
    paths: &[String],
    results: Vec<Result<T, SvnError>>,
    mut notify: F,
) -> Result<(), SvnError>
where
    T: LockResult,
    F: FnMut(&str, bool, Option<&LockDesc>, Option<&SvnError>),
{
    if results.len() != paths.len() {
        return Err(SvnError::Protocol(format!(
            "{op} returned {} results for {} paths",
            results.len(),
            paths.len()
        )));
    }
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(value) => {
                tracing::trace!(op, path = %path, "lock operation succeeded");
                notify(path, is_lock, value.lock(), None);
            }
            Err(err) => {
                tracing::debug!(op, path = %path, error = %err, "lock operation failed for path");
                notify(path, is_lock, None, Some(&err));
            }
        }
    }
    Ok(())
}

/// A per-path success value of a lock batch.
pub(crate) trait LockResult {
    fn lock(&self) -> Option<&LockDesc>;
}

impl LockResult for LockDesc {
    fn lock(&self) -> Option<&LockDesc> {
        Some(self)
    }
}

impl LockResult for () {
    fn lock(&self) -> Option<&LockDesc> {
        None
    }
}
