//! Public data types exchanged with a remote-access session.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::delta::TextDeltaWindow;

/// A Subversion property list (`name -> raw bytes`).
///
/// Property values can be binary; callers should treat the value as opaque
/// bytes unless they know it is UTF-8.
pub type PropertyList = BTreeMap<String, Vec<u8>>;

/// Revision property holding the log message.
pub const SVN_PROP_REVISION_LOG: &str = "svn:log";
/// Revision property holding the author.
pub const SVN_PROP_REVISION_AUTHOR: &str = "svn:author";
/// Revision property holding the commit date.
pub const SVN_PROP_REVISION_DATE: &str = "svn:date";
/// Ephemeral transaction property naming the committing client.
pub const SVN_PROP_TXN_USER_AGENT: &str = "svn:txn-user-agent";

/// A successful commit result, handed to the commit callback.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// The new committed revision number.
    pub new_rev: u64,
    /// Commit date, if provided by the server.
    pub date: Option<String>,
    /// Commit author, if provided by the server.
    pub author: Option<String>,
    /// Server-reported post-commit error, if any.
    pub post_commit_err: Option<String>,
}

/// A single property delta entry (name + new value).
///
/// `value == None` represents deletion of the property.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropDelta {
    /// Property name.
    pub name: String,
    /// New property value (raw bytes), or `None` to delete.
    pub value: Option<Vec<u8>>,
}

/// One revision of a file as streamed by `get_file_revs`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRev {
    /// Repository-relative path at this revision.
    pub path: String,
    /// Revision number.
    pub rev: u64,
    /// Revision properties for this revision.
    pub rev_props: PropertyList,
    /// Property deltas relative to the previously streamed revision.
    pub prop_deltas: Vec<PropDelta>,
    /// Whether this revision was reached through a merge.
    pub merged_revision: bool,
    /// Text delta against the previously streamed revision.
    ///
    /// `None` means the text is unchanged. The first revision is a delta
    /// against the empty text.
    pub delta: Option<Vec<TextDeltaWindow>>,
}

/// A [`FileRev`] with its materialized contents.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRevContents {
    /// The streamed revision.
    pub file_rev: FileRev,
    /// Full file contents at this revision.
    pub contents: Vec<u8>,
}

/// The kind of change recorded for one path in a [`LogEntry`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    /// `A`
    Add,
    /// `D`
    Delete,
    /// `R`
    Replace,
    /// `M`
    Modify,
}

impl ChangeAction {
    /// Parses the single-letter action code.
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'A' => Some(Self::Add),
            'D' => Some(Self::Delete),
            'R' => Some(Self::Replace),
            'M' => Some(Self::Modify),
            _ => None,
        }
    }

    /// The single-letter action code.
    pub fn code(self) -> char {
        match self {
            Self::Add => 'A',
            Self::Delete => 'D',
            Self::Replace => 'R',
            Self::Modify => 'M',
        }
    }
}

/// A single path change within a [`LogEntry`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangedPath {
    /// Change action.
    pub action: ChangeAction,
    /// Copy source path, if this change was made by a copy.
    pub copy_from_path: Option<String>,
    /// Copy source revision, if this change was made by a copy.
    pub copy_from_rev: Option<u64>,
    /// Node kind, if provided by the server.
    pub node_kind: Option<NodeKind>,
}

impl ChangedPath {
    /// A change without copy history.
    pub fn new(action: ChangeAction) -> Self {
        Self {
            action,
            copy_from_path: None,
            copy_from_rev: None,
            node_kind: None,
        }
    }

    /// Records the copy source.
    pub fn with_copy_from(mut self, path: impl Into<String>, rev: u64) -> Self {
        self.copy_from_path = Some(path.into());
        self.copy_from_rev = Some(rev);
        self
    }
}

/// A log entry delivered by `get_log`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    /// Revision number.
    pub rev: u64,
    /// Changed paths keyed by repository path, when they were requested.
    pub changed_paths: Option<BTreeMap<String, ChangedPath>>,
    /// Author, if provided.
    pub author: Option<String>,
    /// Date, if provided.
    pub date: Option<String>,
    /// Commit message, if provided.
    pub message: Option<String>,
    /// Revision properties returned for this entry.
    pub rev_props: PropertyList,
}

impl LogEntry {
    /// An entry with only a revision number.
    pub fn new(rev: u64) -> Self {
        Self {
            rev,
            changed_paths: None,
            author: None,
            date: None,
            message: None,
            rev_props: PropertyList::new(),
        }
    }

    /// Fills `author`, `date` and `message` from the standard revision
    /// properties when they are not already set.
    pub fn fill_standard_fields(&mut self) {
        let text = |props: &PropertyList, name: &str| {
            props
                .get(name)
                .map(|value| String::from_utf8_lossy(value).into_owned())
        };
        if self.author.is_none() {
            self.author = text(&self.rev_props, SVN_PROP_REVISION_AUTHOR);
        }
        if self.date.is_none() {
            self.date = text(&self.rev_props, SVN_PROP_REVISION_DATE);
        }
        if self.message.is_none() {
            self.message = text(&self.rev_props, SVN_PROP_REVISION_LOG);
        }
    }
}

/// The kind of a node in the repository.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum NodeKind {
    /// No node exists at the requested path/revision.
    None,
    /// A file node.
    File,
    /// A directory node.
    Dir,
    /// An unknown kind (usually a forward-compatibility fallback).
    Unknown,
}

impl NodeKind {
    /// Parses the protocol word for a node kind.
    pub fn from_word(word: &str) -> Self {
        match word {
            "none" => Self::None,
            "file" => Self::File,
            "dir" => Self::Dir,
            _ => Self::Unknown,
        }
    }

    /// Returns the protocol word for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::File => "file",
            Self::Dir => "dir",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bitmask selecting which [`DirEntry`] fields `get_dir` populates.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DirentFields(u32);

impl DirentFields {
    /// Node kind.
    pub const KIND: Self = Self(0x1);
    /// File size.
    pub const SIZE: Self = Self(0x2);
    /// Whether properties are present.
    pub const HAS_PROPS: Self = Self(0x4);
    /// Last-changed revision.
    pub const CREATED_REV: Self = Self(0x8);
    /// Last-changed time.
    pub const TIME: Self = Self(0x10);
    /// Last-changed author.
    pub const LAST_AUTHOR: Self = Self(0x20);
    /// Every field.
    pub const ALL: Self = Self(0x3f);
    /// No fields.
    pub const NONE: Self = Self(0);

    /// Builds a mask from raw bits, ignoring unknown bits.
    pub fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DirentFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One entry of a directory listing.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (basename).
    pub name: String,
    /// Node kind.
    pub kind: Option<NodeKind>,
    /// File size.
    pub size: Option<u64>,
    /// Whether the node has properties.
    pub has_props: Option<bool>,
    /// Last-changed revision.
    pub created_rev: Option<u64>,
    /// Last-changed time.
    pub time: Option<String>,
    /// Last-changed author.
    pub last_author: Option<String>,
}

impl DirEntry {
    /// Clears every field not selected by `fields`.
    pub fn retain_fields(&mut self, fields: DirentFields) {
        if !fields.contains(DirentFields::KIND) {
            self.kind = None;
        }
        if !fields.contains(DirentFields::SIZE) {
            self.size = None;
        }
        if !fields.contains(DirentFields::HAS_PROPS) {
            self.has_props = None;
        }
        if !fields.contains(DirentFields::CREATED_REV) {
            self.created_rev = None;
        }
        if !fields.contains(DirentFields::TIME) {
            self.time = None;
        }
        if !fields.contains(DirentFields::LAST_AUTHOR) {
            self.last_author = None;
        }
    }
}

/// Result of `get_dir`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirListing {
    /// The revision actually listed.
    pub rev: u64,
    /// Entries keyed by name.
    pub entries: BTreeMap<String, DirEntry>,
    /// Properties of the directory itself.
    pub props: PropertyList,
}

/// Subversion depth value used by update and switch.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Depth {
    /// The target itself only.
    Empty,
    /// Include file children.
    Files,
    /// Include immediate children (files and dirs) but not recurse.
    Immediates,
    /// Fully recursive.
    Infinity,
}

impl Depth {
    /// Maps the classic `recurse` flag to a depth.
    pub fn from_recurse(recurse: bool) -> Self {
        if recurse { Self::Infinity } else { Self::Files }
    }
}

/// A repository capability that can be queried with `has_capability`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Depth-aware update and switch.
    Depth,
    /// Mergeinfo queries.
    MergeInfo,
    /// Arbitrary revision properties in log.
    LogRevProps,
    /// Revision properties other than `svn:log` at commit time.
    CommitRevProps,
    /// Partial replay.
    PartialReplay,
    /// Atomic revision property changes.
    AtomicRevProps,
    /// Inherited properties.
    InheritedProps,
    /// Ephemeral transaction properties.
    EphemeralTxnProps,
    /// File revisions in reverse order.
    GetFileRevsReverse,
}

impl Capability {
    /// Capability name as passed to `has_capability`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Depth => "depth",
            Self::MergeInfo => "mergeinfo",
            Self::LogRevProps => "log-revprops",
            Self::CommitRevProps => "commit-revprops",
            Self::PartialReplay => "partial-replay",
            Self::AtomicRevProps => "atomic-revprops",
            Self::InheritedProps => "inherited-props",
            Self::EphemeralTxnProps => "ephemeral-txnprops",
            Self::GetFileRevsReverse => "get-file-revs-reverse",
        }
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
