//! Caller-facing edit driver with typed handles.

use tracing::trace;

use super::tree::CheckedEditor;
use super::{DirHandle, EditState, EditorEvent, EditorEventHandler, FileHandle};
use crate::SvnError;
use crate::delta::{TextDeltaWindow, WindowSink, send_contents};
use crate::path::validate_rel_path;
use crate::scope::ResourceScope;

/// Drives an edit into a consumer.
///
/// Every call is validated before it reaches the consumer: handles must come
/// from this edit and still be open, children must be direct children of
/// their parent, and a node closes only after all of its children. The
/// first violation aborts the edit and every later call fails with
/// [`SvnError::ProtocolState`].
///
/// ```
/// use svn_ra::{EditRecorder, Editor};
///
/// let mut editor = Editor::new(EditRecorder::new());
/// let root = editor.open_root(Some(1))?;
/// let file = editor.add_file(root, "README", None)?;
/// editor.send_contents(file, None, b"hello\n")?;
/// editor.close_file(file, None)?;
/// editor.close_directory(root)?;
/// editor.close_edit()?;
/// # Ok::<(), svn_ra::SvnError>(())
/// ```
#[derive(Debug)]
pub struct Editor<H> {
    checked: CheckedEditor<H>,
    next_dir: u64,
    next_file: u64,
}

impl<H: EditorEventHandler> Editor<H> {
    /// Starts a standalone edit into `consumer`.
    pub fn new(consumer: H) -> Self {
        Self::from_checked(CheckedEditor::new(consumer))
    }

    pub(crate) fn with_scope(consumer: H, scope: ResourceScope) -> Self {
        Self::from_checked(CheckedEditor::with_scope(consumer, scope))
    }

    fn from_checked(checked: CheckedEditor<H>) -> Self {
        Self {
            checked,
            next_dir: 0,
            next_file: 0,
        }
    }

    /// Current edit state.
    pub fn state(&self) -> EditState {
        self.checked.state()
    }

    /// The consumer receiving the edit.
    pub fn consumer(&self) -> &H {
        self.checked.consumer()
    }

    /// Unwraps the consumer.
    pub fn into_consumer(self) -> H {
        self.checked.into_consumer()
    }

    fn send(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        trace!(event = event.name(), "editor call");
        self.checked.on_event(event)
    }

    fn dir_token(&mut self, dir: DirHandle) -> Result<String, SvnError> {
        let token = self
            .checked
            .tree()
            .token_of(dir.edit, dir.node, false)
            .map(str::to_string);
        token.map_err(|err| self.checked.fail(err))
    }

    fn file_token(&mut self, file: FileHandle) -> Result<String, SvnError> {
        let token = self
            .checked
            .tree()
            .token_of(file.edit, file.node, true)
            .map(str::to_string);
        token.map_err(|err| self.checked.fail(err))
    }

    fn child_path(&mut self, path: &str) -> Result<String, SvnError> {
        validate_rel_path(path).map_err(|err| self.checked.fail(err))
    }

    fn alloc_dir_token(&mut self) -> String {
        self.next_dir += 1;
        format!("d{}", self.next_dir)
    }

    fn alloc_file_token(&mut self) -> String {
        self.next_file += 1;
        format!("f{}", self.next_file)
    }

    fn node(&self, token: &str) -> Result<usize, SvnError> {
        self.checked
            .tree()
            .node_of(token)
            .ok_or_else(|| SvnError::state(format!("token '{token}' vanished")))
    }

    /// Announces the revision the edit moves the tree to.
    pub fn set_target_revision(&mut self, rev: u64) -> Result<(), SvnError> {
        self.send(EditorEvent::TargetRev { rev })
    }

    /// Opens the edit root.
    pub fn open_root(&mut self, base_revision: Option<u64>) -> Result<DirHandle, SvnError> {
        let token = "r".to_string();
        self.send(EditorEvent::OpenRoot {
            rev: base_revision,
            token: token.clone(),
        })?;
        Ok(DirHandle {
            edit: self.checked.tree().id(),
            node: self.node(&token)?,
        })
    }

    /// Deletes the entry `path` inside `dir`.
    pub fn delete_entry(
        &mut self,
        dir: DirHandle,
        path: &str,
        rev: Option<u64>,
    ) -> Result<(), SvnError> {
        let dir_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        self.send(EditorEvent::DeleteEntry {
            path,
            rev,
            dir_token,
        })
    }

    /// Adds a directory, optionally copied from `(path, rev)`.
    pub fn add_directory(
        &mut self,
        dir: DirHandle,
        path: &str,
        copy_from: Option<(&str, u64)>,
    ) -> Result<DirHandle, SvnError> {
        let parent_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        let child_token = self.alloc_dir_token();
        self.send(EditorEvent::AddDir {
            path,
            parent_token,
            child_token: child_token.clone(),
            copy_from: copy_from.map(|(p, r)| (p.to_string(), r)),
        })?;
        Ok(DirHandle {
            edit: dir.edit,
            node: self.node(&child_token)?,
        })
    }

    /// Opens an existing directory.
    pub fn open_directory(
        &mut self,
        dir: DirHandle,
        path: &str,
        base_revision: Option<u64>,
    ) -> Result<DirHandle, SvnError> {
        let parent_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        let child_token = self.alloc_dir_token();
        self.send(EditorEvent::OpenDir {
            path,
            parent_token,
            child_token: child_token.clone(),
            rev: base_revision,
        })?;
        Ok(DirHandle {
            edit: dir.edit,
            node: self.node(&child_token)?,
        })
    }

    /// Reports a directory the driver cannot describe.
    pub fn absent_directory(&mut self, dir: DirHandle, path: &str) -> Result<(), SvnError> {
        let parent_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        self.send(EditorEvent::AbsentDir { path, parent_token })
    }

    /// Adds a file, optionally copied from `(path, rev)`.
    pub fn add_file(
        &mut self,
        dir: DirHandle,
        path: &str,
        copy_from: Option<(&str, u64)>,
    ) -> Result<FileHandle, SvnError> {
        let dir_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        let file_token = self.alloc_file_token();
        self.send(EditorEvent::AddFile {
            path,
            dir_token,
            file_token: file_token.clone(),
            copy_from: copy_from.map(|(p, r)| (p.to_string(), r)),
        })?;
        Ok(FileHandle {
            edit: dir.edit,
            node: self.node(&file_token)?,
        })
    }

    /// Opens an existing file.
    pub fn open_file(
        &mut self,
        dir: DirHandle,
        path: &str,
        base_revision: Option<u64>,
    ) -> Result<FileHandle, SvnError> {
        let dir_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        let file_token = self.alloc_file_token();
        self.send(EditorEvent::OpenFile {
            path,
            dir_token,
            file_token: file_token.clone(),
            rev: base_revision,
        })?;
        Ok(FileHandle {
            edit: dir.edit,
            node: self.node(&file_token)?,
        })
    }

    /// Reports a file the driver cannot describe.
    pub fn absent_file(&mut self, dir: DirHandle, path: &str) -> Result<(), SvnError> {
        let parent_token = self.dir_token(dir)?;
        let path = self.child_path(path)?;
        self.send(EditorEvent::AbsentFile { path, parent_token })
    }

    /// Sets (`Some`) or deletes (`None`) a directory property.
    pub fn change_dir_prop(
        &mut self,
        dir: DirHandle,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError> {
        let dir_token = self.dir_token(dir)?;
        self.send(EditorEvent::ChangeDirProp {
            dir_token,
            name: name.to_string(),
            value: value.map(<[u8]>::to_vec),
        })
    }

    /// Closes a directory. All of its children must be closed.
    pub fn close_directory(&mut self, dir: DirHandle) -> Result<(), SvnError> {
        let dir_token = self.dir_token(dir)?;
        self.send(EditorEvent::CloseDir { dir_token })
    }

    /// Sets (`Some`) or deletes (`None`) a file property.
    pub fn change_file_prop(
        &mut self,
        file: FileHandle,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError> {
        let file_token = self.file_token(file)?;
        self.send(EditorEvent::ChangeFileProp {
            file_token,
            name: name.to_string(),
            value: value.map(<[u8]>::to_vec),
        })
    }

    /// Starts the text delta of `file`. The returned handler must be
    /// terminated with `send(None)` before the file is closed.
    pub fn apply_textdelta(
        &mut self,
        file: FileHandle,
        base_checksum: Option<&str>,
    ) -> Result<WindowHandler<'_, H>, SvnError> {
        let file_token = self.file_token(file)?;
        self.send(EditorEvent::ApplyTextDelta {
            file_token: file_token.clone(),
            base_checksum: base_checksum.map(str::to_string),
        })?;
        Ok(WindowHandler {
            editor: self,
            file_token,
        })
    }

    /// Streams `contents` as the new text of `file` and returns its MD5.
    pub fn send_contents(
        &mut self,
        file: FileHandle,
        base_checksum: Option<&str>,
        contents: &[u8],
    ) -> Result<String, SvnError> {
        let mut handler = self.apply_textdelta(file, base_checksum)?;
        send_contents(contents, &mut handler)
    }

    /// Closes a file. A started text delta must have been terminated.
    pub fn close_file(
        &mut self,
        file: FileHandle,
        text_checksum: Option<&str>,
    ) -> Result<(), SvnError> {
        let file_token = self.file_token(file)?;
        self.send(EditorEvent::CloseFile {
            file_token,
            text_checksum: text_checksum.map(str::to_string),
        })
    }

    /// Completes the edit. The root must have been opened and closed.
    pub fn close_edit(&mut self) -> Result<(), SvnError> {
        self.send(EditorEvent::CloseEdit)
    }

    /// Aborts the edit, invalidating every handle. Repeated aborts are
    /// no-ops; aborting a closed edit is an error.
    pub fn abort_edit(&mut self) -> Result<(), SvnError> {
        self.send(EditorEvent::AbortEdit)
    }
}

/// Receives the windows of one file's text delta.
///
/// Borrows the editor, so no other edit call can interleave with the
/// window stream.
#[derive(Debug)]
pub struct WindowHandler<'e, H: EditorEventHandler> {
    editor: &'e mut Editor<H>,
    file_token: String,
}

impl<H: EditorEventHandler> WindowSink for WindowHandler<'_, H> {
    fn send(&mut self, window: Option<TextDeltaWindow>) -> Result<(), SvnError> {
        let file_token = self.file_token.clone();
        match window {
            Some(window) => self
                .editor
                .send(EditorEvent::DeltaWindow { file_token, window }),
            None => self.editor.send(EditorEvent::TextDeltaEnd { file_token }),
        }
    }
}
