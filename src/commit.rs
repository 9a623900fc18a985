//! Commit editing.

use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::{debug, trace};

use crate::editor::{EditRecorder, EditState, Editor};
use crate::scope::ResourceScope;
use crate::{CommitInfo, CommitOptions, RaSession, SvnError};

type CommitCallback<'s> = Box<dyn FnOnce(&CommitInfo) + Send + 's>;

/// An [`Editor`] whose edit becomes a new revision.
///
/// All editing calls are available through `Deref`. The edit is buffered
/// until [`CommitEditor::close_edit`] submits it; dropping the editor, or
/// calling [`CommitEditor::abort_edit`], discards it and frees the session.
///
/// ```no_run
/// # async fn demo(session: &mut svn_ra::RaSession) -> svn_ra::Result<()> {
/// use svn_ra::CommitOptions;
///
/// let mut editor = session
///     .get_commit_editor(CommitOptions::new("Add README"), |info| {
///         println!("committed r{}", info.new_rev);
///     })
///     .await?;
/// let root = editor.open_root(Some(41))?;
/// let file = editor.add_file(root, "README", None)?;
/// let md5 = editor.send_contents(file, None, b"hello\n")?;
/// editor.close_file(file, Some(md5.as_str()))?;
/// editor.close_directory(root)?;
/// let info = editor.close_edit().await?;
/// assert_eq!(info.new_rev, 42);
/// # Ok(())
/// # }
/// ```
pub struct CommitEditor<'s> {
    session: &'s mut RaSession,
    editor: Editor<EditRecorder>,
    options: CommitOptions,
    callback: Option<CommitCallback<'s>>,
    submitting: bool,
    done: bool,
}

impl fmt::Debug for CommitEditor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitEditor")
            .field("state", &self.editor.state())
            .field("options", &self.options)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<'s> CommitEditor<'s> {
    pub(crate) fn new(
        session: &'s mut RaSession,
        options: CommitOptions,
        callback: CommitCallback<'s>,
        scope: ResourceScope,
    ) -> Self {
        Self {
            session,
            editor: Editor::with_scope(EditRecorder::new(), scope),
            options,
            callback: Some(callback),
            submitting: false,
            done: false,
        }
    }

    /// Options the commit will be submitted with, including any revision
    /// properties added by the session.
    pub fn options(&self) -> &CommitOptions {
        &self.options
    }

    /// Closes the edit and submits it.
    ///
    /// On success the commit callback runs once with the returned
    /// [`CommitInfo`].
    pub async fn close_edit(mut self) -> Result<CommitInfo, SvnError> {
        let result = self.submit().await;
        self.done = true;
        let error = result.as_ref().err();
        self.session.release_op("commit", error);
        let info = result?;
        if let Some(callback) = self.callback.take() {
            callback(&info);
        }
        Ok(info)
    }

    async fn submit(&mut self) -> Result<CommitInfo, SvnError> {
        if self.editor.state() != EditState::Closed {
            self.editor.close_edit()?;
        }
        self.submitting = true;
        let info = self
            .session
            .transport_mut()
            .commit(&self.options, self.editor.consumer().events())
            .await?;
        self.submitting = false;
        debug!(rev = info.new_rev, "commit submitted");
        Ok(info)
    }

    /// Discards the edit.
    pub fn abort_edit(mut self) -> Result<(), SvnError> {
        let result = self.editor.abort_edit();
        self.done = true;
        self.session.release_op("commit", result.as_ref().err());
        result
    }
}

impl Deref for CommitEditor<'_> {
    type Target = Editor<EditRecorder>;

    fn deref(&self) -> &Self::Target {
        &self.editor
    }
}

impl DerefMut for CommitEditor<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.editor
    }
}

impl Drop for CommitEditor<'_> {
    fn drop(&mut self) {
        if self.done || self.submitting {
            return;
        }
        trace!("commit editor dropped before close");
        if matches!(self.editor.state(), EditState::NotStarted | EditState::Open) {
            let _ = self.editor.abort_edit();
        }
        self.session.release_op("commit", None);
    }
}
