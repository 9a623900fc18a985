//! Tree-delta editing and working-copy reports.
//!
//! An edit describes the transformation of one tree into another as a
//! depth-first walk: `open_root`, then nested directory and file operations,
//! each node closed after all of its children, and finally `close_edit` (or
//! `abort_edit` at any point). The walk travels as [`EditorEvent`] values
//! delivered to an [`EditorEventHandler`].
//!
//! - [`Editor`] is the caller-facing driver with typed handles.
//! - [`CheckedEditor`] validates an incoming event stream before forwarding it.
//! - [`EditRecorder`] and [`ContentCollector`] are stock consumers.

use crate::delta::TextDeltaWindow;
use crate::{Depth, SvnError};

mod collect;
mod driver;
mod tree;

pub use collect::{CollectedFile, ContentCollector, EditRecorder};
pub use driver::{Editor, WindowHandler};
pub use tree::{CheckedEditor, EditState};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// Client-to-server report commands used by update and switch.
pub enum ReportCommand {
    /// Reports the revision of a path the client holds.
    SetPath {
        /// Path relative to the update target.
        path: String,
        /// Revision to report for this path.
        rev: u64,
        /// Whether this path should start empty.
        start_empty: bool,
        /// Optional lock token to include.
        lock_token: Option<String>,
        /// Depth of the client's copy of the path.
        depth: Depth,
    },
    /// Reports that a path is missing from the client.
    DeletePath {
        /// Path relative to the update target.
        path: String,
    },
    /// Reports that a path is sourced from a different URL.
    LinkPath {
        /// Path relative to the update target.
        path: String,
        /// URL the path is linked to.
        url: String,
        /// Revision to report for this link.
        rev: u64,
        /// Whether this path should start empty.
        start_empty: bool,
        /// Optional lock token to include.
        lock_token: Option<String>,
        /// Depth of the client's copy of the path.
        depth: Depth,
    },
    /// Terminates the report successfully.
    FinishReport,
    /// Aborts the report.
    AbortReport,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// A sequence of [`ReportCommand`] values.
pub struct Report {
    /// Commands in the report. A complete report ends with `FinishReport`
    /// or `AbortReport`.
    pub commands: Vec<ReportCommand>,
}

impl Report {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Appends a command to the report.
    pub fn push(&mut self, cmd: ReportCommand) -> &mut Self {
        self.commands.push(cmd);
        self
    }

    /// Appends a `FinishReport` terminator.
    pub fn finish(&mut self) -> &mut Self {
        self.commands.push(ReportCommand::FinishReport);
        self
    }

    /// Appends an `AbortReport` terminator.
    pub fn abort(&mut self) -> &mut Self {
        self.commands.push(ReportCommand::AbortReport);
        self
    }

    /// Returns `true` once a terminator has been appended.
    pub fn is_terminated(&self) -> bool {
        matches!(
            self.commands.last(),
            Some(ReportCommand::FinishReport | ReportCommand::AbortReport)
        )
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
/// One step of an edit.
///
/// Tokens name open nodes. They are chosen by the side that drives the edit
/// and stay valid until the node is closed.
pub enum EditorEvent {
    /// Reports the target revision. Only legal before `OpenRoot`.
    TargetRev {
        /// Target revision number.
        rev: u64,
    },
    /// Opens the root directory.
    OpenRoot {
        /// Optional base revision.
        rev: Option<u64>,
        /// Root token.
        token: String,
    },
    /// Deletes an entry.
    DeleteEntry {
        /// Repository-relative path.
        path: String,
        /// Revision the entry is known at, if any.
        rev: Option<u64>,
        /// Directory token.
        dir_token: String,
    },
    /// Adds a directory.
    AddDir {
        /// Repository-relative path.
        path: String,
        /// Parent directory token.
        parent_token: String,
        /// Child directory token.
        child_token: String,
        /// Optional copy source `(path, rev)`.
        copy_from: Option<(String, u64)>,
    },
    /// Opens an existing directory.
    OpenDir {
        /// Repository-relative path.
        path: String,
        /// Parent directory token.
        parent_token: String,
        /// Child directory token.
        child_token: String,
        /// Base revision.
        rev: Option<u64>,
    },
    /// Changes a directory property.
    ChangeDirProp {
        /// Directory token.
        dir_token: String,
        /// Property name.
        name: String,
        /// Property value (raw bytes), or `None` to delete.
        value: Option<Vec<u8>>,
    },
    /// Closes a directory.
    CloseDir {
        /// Directory token.
        dir_token: String,
    },
    /// Marks a directory as absent (for example, not readable).
    AbsentDir {
        /// Repository-relative path.
        path: String,
        /// Parent directory token.
        parent_token: String,
    },
    /// Adds a file.
    AddFile {
        /// Repository-relative path.
        path: String,
        /// Directory token.
        dir_token: String,
        /// File token.
        file_token: String,
        /// Optional copy source `(path, rev)`.
        copy_from: Option<(String, u64)>,
    },
    /// Opens an existing file.
    OpenFile {
        /// Repository-relative path.
        path: String,
        /// Directory token.
        dir_token: String,
        /// File token.
        file_token: String,
        /// Base revision.
        rev: Option<u64>,
    },
    /// Begins a text delta stream for a file.
    ApplyTextDelta {
        /// File token.
        file_token: String,
        /// Optional MD5 of the base text.
        base_checksum: Option<String>,
    },
    /// One window of a text delta stream.
    DeltaWindow {
        /// File token.
        file_token: String,
        /// The window.
        window: TextDeltaWindow,
    },
    /// Terminates the delta stream.
    TextDeltaEnd {
        /// File token.
        file_token: String,
    },
    /// Changes a file property.
    ChangeFileProp {
        /// File token.
        file_token: String,
        /// Property name.
        name: String,
        /// Property value (raw bytes), or `None` to delete.
        value: Option<Vec<u8>>,
    },
    /// Closes a file.
    CloseFile {
        /// File token.
        file_token: String,
        /// Optional MD5 of the resulting text.
        text_checksum: Option<String>,
    },
    /// Marks a file as absent.
    AbsentFile {
        /// Repository-relative path.
        path: String,
        /// Parent directory token.
        parent_token: String,
    },
    /// Closes the edit successfully.
    CloseEdit,
    /// Aborts the edit.
    AbortEdit,
}

impl EditorEvent {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::TargetRev { .. } => "target-rev",
            Self::OpenRoot { .. } => "open-root",
            Self::DeleteEntry { .. } => "delete-entry",
            Self::AddDir { .. } => "add-dir",
            Self::OpenDir { .. } => "open-dir",
            Self::ChangeDirProp { .. } => "change-dir-prop",
            Self::CloseDir { .. } => "close-dir",
            Self::AbsentDir { .. } => "absent-dir",
            Self::AddFile { .. } => "add-file",
            Self::OpenFile { .. } => "open-file",
            Self::ApplyTextDelta { .. } => "apply-textdelta",
            Self::DeltaWindow { .. } => "textdelta-window",
            Self::TextDeltaEnd { .. } => "textdelta-end",
            Self::ChangeFileProp { .. } => "change-file-prop",
            Self::CloseFile { .. } => "close-file",
            Self::AbsentFile { .. } => "absent-file",
            Self::CloseEdit => "close-edit",
            Self::AbortEdit => "abort-edit",
        }
    }
}

/// Consumer of an [`EditorEvent`] stream.
pub trait EditorEventHandler: Send {
    /// Called for each event, in order.
    ///
    /// Returning an error aborts the edit.
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError>;
}

impl<H> EditorEventHandler for &mut H
where
    H: EditorEventHandler + ?Sized,
{
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        (**self).on_event(event)
    }
}

impl<H> EditorEventHandler for Box<H>
where
    H: EditorEventHandler + ?Sized,
{
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        (**self).on_event(event)
    }
}

/// A directory opened in an [`Editor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirHandle {
    pub(crate) edit: u64,
    pub(crate) node: usize,
}

/// A file opened in an [`Editor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileHandle {
    pub(crate) edit: u64,
    pub(crate) node: usize,
}
