//! Builder-style option types for session operations.

use std::collections::BTreeMap;

use crate::{Depth, PropertyList, SVN_PROP_REVISION_LOG};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Which revision properties to request for `log` operations.
pub enum LogRevProps {
    /// Request all revision properties.
    All,
    /// Request only a specific set of revision property names.
    Custom(Vec<String>),
}

impl LogRevProps {
    /// The author, date and log message properties. Every server can
    /// return these without the `log-revprops` capability.
    pub fn standard() -> Self {
        Self::Custom(vec![
            crate::SVN_PROP_REVISION_AUTHOR.to_string(),
            crate::SVN_PROP_REVISION_DATE.to_string(),
            crate::SVN_PROP_REVISION_LOG.to_string(),
        ])
    }

    /// Returns `true` if the standard author/date/log trio is all that is asked for.
    pub fn is_standard_only(&self) -> bool {
        match self {
            Self::All => false,
            Self::Custom(names) => names.iter().all(|name| {
                matches!(
                    name.as_str(),
                    crate::SVN_PROP_REVISION_AUTHOR
                        | crate::SVN_PROP_REVISION_DATE
                        | crate::SVN_PROP_REVISION_LOG
                )
            }),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RaSession::get_log`].
///
/// Entries are delivered from `start_rev` towards `end_rev`, so
/// `start_rev > end_rev` asks for newest-first order.
pub struct LogOptions {
    /// Target paths (relative to the session URL). Empty means the session URL itself.
    pub target_paths: Vec<String>,
    /// First revision delivered (inclusive).
    pub start_rev: u64,
    /// Last revision delivered (inclusive).
    pub end_rev: u64,
    /// Whether to include changed paths in each log entry.
    pub changed_paths: bool,
    /// Whether to stop at copy operations instead of following history.
    pub strict_node: bool,
    /// Maximum number of entries to deliver (`0` means unlimited).
    pub limit: u64,
    /// Whether to include merged revisions.
    pub include_merged_revisions: bool,
    /// Which revision properties to request.
    pub revprops: LogRevProps,
}

impl LogOptions {
    /// Options for a revision range with the standard revision properties
    /// and no changed paths.
    pub fn between(start_rev: u64, end_rev: u64) -> Self {
        Self {
            target_paths: Vec::new(),
            start_rev,
            end_rev,
            changed_paths: false,
            strict_node: false,
            limit: 0,
            include_merged_revisions: false,
            revprops: LogRevProps::standard(),
        }
    }

    /// Restricts the log to these paths.
    pub fn with_target_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Caps the number of delivered entries.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Requests changed paths for each entry.
    pub fn with_changed_paths(mut self) -> Self {
        self.changed_paths = true;
        self
    }

    /// Stops following history at copies.
    pub fn strict_node_history(mut self) -> Self {
        self.strict_node = true;
        self
    }

    /// Selects which revision properties to fetch.
    pub fn with_revprops(mut self, revprops: LogRevProps) -> Self {
        self.revprops = revprops;
        self
    }

    /// Returns `true` when entries are expected newest first.
    pub fn is_descending(&self) -> bool {
        self.start_rev > self.end_rev
    }

    /// Returns `true` if `rev` lies between the two ends of the range.
    pub fn contains(&self, rev: u64) -> bool {
        let (low, high) = if self.is_descending() {
            (self.end_rev, self.start_rev)
        } else {
            (self.start_rev, self.end_rev)
        };
        (low..=high).contains(&rev)
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RaSession::do_update`].
pub struct UpdateOptions {
    /// Revision to update to; `None` means HEAD.
    pub rev: Option<u64>,
    /// Single path component to update, or empty for the session URL itself.
    pub target: String,
    /// Update depth.
    pub depth: Depth,
    /// Whether to request copyfrom arguments from the server.
    pub send_copyfrom_args: bool,
    /// Whether to ignore ancestry when applying the report.
    pub ignore_ancestry: bool,
}

impl UpdateOptions {
    /// Creates update options for a target and depth.
    pub fn new(target: impl Into<String>, depth: Depth) -> Self {
        Self {
            rev: None,
            target: target.into(),
            depth,
            send_copyfrom_args: true,
            ignore_ancestry: false,
        }
    }

    /// Creates options from the classic `recurse` flag.
    pub fn recursive(target: impl Into<String>, recurse: bool) -> Self {
        Self::new(target, Depth::from_recurse(recurse))
    }

    /// Sets the revision to update to.
    pub fn with_rev(mut self, rev: u64) -> Self {
        self.rev = Some(rev);
        self
    }

    /// Disables copyfrom arguments.
    pub fn without_copyfrom_args(mut self) -> Self {
        self.send_copyfrom_args = false;
        self
    }

    /// Ignores ancestry when applying the update.
    pub fn ignore_ancestry(mut self) -> Self {
        self.ignore_ancestry = true;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RaSession::do_switch`].
pub struct SwitchOptions {
    /// Revision to switch to; `None` means HEAD.
    pub rev: Option<u64>,
    /// Single path component to switch, or empty for the session URL itself.
    pub target: String,
    /// URL to switch to. Must be in the session's repository.
    pub switch_url: String,
    /// Switch depth.
    pub depth: Depth,
    /// Whether to request copyfrom arguments from the server.
    pub send_copyfrom_args: bool,
    /// Whether to ignore ancestry when applying the report.
    pub ignore_ancestry: bool,
}

impl SwitchOptions {
    /// Creates switch options for a target, URL, and depth.
    pub fn new(target: impl Into<String>, switch_url: impl Into<String>, depth: Depth) -> Self {
        Self {
            rev: None,
            target: target.into(),
            switch_url: switch_url.into(),
            depth,
            send_copyfrom_args: true,
            ignore_ancestry: false,
        }
    }

    /// Sets the revision to switch to.
    pub fn with_rev(mut self, rev: u64) -> Self {
        self.rev = Some(rev);
        self
    }

    /// Ignores ancestry when applying the switch.
    pub fn ignore_ancestry(mut self) -> Self {
        self.ignore_ancestry = true;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Options for [`crate::RaSession::replay`].
pub struct ReplayOptions {
    /// Revision to replay.
    pub revision: u64,
    /// Changes below this revision are assumed to be present already.
    pub low_water_mark: u64,
    /// Whether to send text deltas. When `false` only structure and
    /// properties are replayed.
    pub send_deltas: bool,
}

impl ReplayOptions {
    /// Creates replay options for a single revision.
    pub fn new(revision: u64) -> Self {
        Self {
            revision,
            low_water_mark: 0,
            send_deltas: true,
        }
    }

    /// Sets the low water mark.
    pub fn with_low_water_mark(mut self, low_water_mark: u64) -> Self {
        self.low_water_mark = low_water_mark;
        self
    }

    /// Sets whether to request deltas.
    pub fn with_send_deltas(mut self, send_deltas: bool) -> Self {
        self.send_deltas = send_deltas;
        self
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Options for [`crate::RaSession::get_commit_editor`].
pub struct CommitOptions {
    /// Revision properties for the new revision, including `svn:log`.
    pub rev_props: PropertyList,
    /// Lock tokens keyed by repository path, presented during the commit.
    pub lock_tokens: BTreeMap<String, String>,
    /// Whether to keep locks after a successful commit.
    pub keep_locks: bool,
}

impl CommitOptions {
    /// Creates commit options with a log message.
    pub fn new(log_message: impl Into<String>) -> Self {
        Self::default().with_log_message(log_message)
    }

    /// Sets `svn:log`.
    pub fn with_log_message(mut self, log_message: impl Into<String>) -> Self {
        self.rev_props.insert(
            SVN_PROP_REVISION_LOG.to_string(),
            log_message.into().into_bytes(),
        );
        self
    }

    /// Adds one revision property.
    pub fn with_rev_prop(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.rev_props.insert(name.into(), value.into());
        self
    }

    /// Adds a lock token for `path`.
    pub fn with_lock_token(mut self, path: impl Into<String>, token: impl Into<String>) -> Self {
        self.lock_tokens.insert(path.into(), token.into());
        self
    }

    /// Requests that locks be kept after the commit.
    pub fn keep_locks(mut self) -> Self {
        self.keep_locks = true;
        self
    }

    /// Returns `true` if any revision property other than `svn:log` is set.
    pub fn has_custom_rev_props(&self) -> bool {
        self.rev_props
            .keys()
            .any(|name| name != SVN_PROP_REVISION_LOG)
    }
}
