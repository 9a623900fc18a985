//! Arena-indexed edit state and the validating [`CheckedEditor`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use super::{EditorEvent, EditorEventHandler};
use crate::SvnError;
use crate::path::{is_direct_child, validate_rel_path};
use crate::scope::{ResourceScope, ScopeRegistry};

static NEXT_EDIT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of one edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditState {
    /// `open_root` has not been called yet.
    NotStarted,
    /// The root is open.
    Open,
    /// `close_edit` succeeded.
    Closed,
    /// The edit was aborted, by request or after an error.
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Root,
    Directory,
    File,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeltaState {
    None,
    Streaming,
    Done,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<usize>,
    path: String,
    token: String,
    open: bool,
    open_children: usize,
    props: BTreeMap<String, Option<Vec<u8>>>,
    delta: DeltaState,
    scope: Option<ResourceScope>,
}

/// What to do with an event that passed validation.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Forward,
    /// A repeated `AbortEdit`; nothing to deliver.
    Skip,
}

/// Per-edit node arena.
///
/// Parents are referenced by index only. Tokens map to the node they name
/// while the node is open.
#[derive(Debug)]
pub(crate) struct EditTree {
    id: u64,
    nodes: Vec<Node>,
    tokens: HashMap<String, usize>,
    state: EditState,
    target_rev: Option<u64>,
    text_deltas: bool,
    scope: Option<ResourceScope>,
}

impl EditTree {
    pub(crate) fn new(scope: ResourceScope) -> Self {
        Self {
            id: NEXT_EDIT_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            tokens: HashMap::new(),
            state: EditState::NotStarted,
            target_rev: None,
            text_deltas: true,
            scope: Some(scope),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> EditState {
        self.state
    }

    fn is_live(&self) -> bool {
        matches!(self.state, EditState::NotStarted | EditState::Open)
    }

    /// Token of an open node, checked against the expected kind.
    pub(crate) fn token_of(&self, edit: u64, node: usize, file: bool) -> Result<&str, SvnError> {
        self.ensure_live()?;
        if edit != self.id {
            return Err(SvnError::state("handle belongs to a different edit"));
        }
        let entry = self
            .nodes
            .get(node)
            .ok_or_else(|| SvnError::state("unknown editor handle"))?;
        if (entry.kind == NodeKind::File) != file {
            return Err(SvnError::state("handle has the wrong node kind"));
        }
        if !entry.open {
            return Err(SvnError::state(format!(
                "'{}' is already closed",
                display_path(&entry.path)
            )));
        }
        Ok(&entry.token)
    }

    pub(crate) fn node_of(&self, token: &str) -> Option<usize> {
        self.tokens.get(token).copied()
    }

    fn ensure_live(&self) -> Result<(), SvnError> {
        match self.state {
            EditState::Aborted => Err(SvnError::state("edit has been aborted")),
            EditState::Closed => Err(SvnError::state("edit has been closed")),
            EditState::NotStarted | EditState::Open => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), SvnError> {
        self.ensure_live()?;
        if self.state == EditState::NotStarted {
            return Err(SvnError::state("edit root has not been opened"));
        }
        Ok(())
    }

    fn lookup(&self, token: &str, file: bool) -> Result<usize, SvnError> {
        let idx = self.node_of(token).ok_or_else(|| {
            SvnError::state(format!("token '{token}' does not name an open node"))
        })?;
        if (self.nodes[idx].kind == NodeKind::File) != file {
            let want = if file { "file" } else { "directory" };
            return Err(SvnError::state(format!(
                "token '{token}' does not name a {want}"
            )));
        }
        Ok(idx)
    }

    fn child_path(&self, parent: usize, path: &str) -> Result<String, SvnError> {
        let path = validate_rel_path(path)?;
        if !is_direct_child(&self.nodes[parent].path, &path) {
            return Err(SvnError::state(format!(
                "'{path}' is not a direct child of '{}'",
                display_path(&self.nodes[parent].path)
            )));
        }
        Ok(path)
    }

    fn insert(
        &mut self,
        kind: NodeKind,
        parent: Option<usize>,
        path: String,
        token: &str,
    ) -> Result<usize, SvnError> {
        if self.tokens.contains_key(token) {
            return Err(SvnError::state(format!("token '{token}' is already in use")));
        }
        let label = match kind {
            NodeKind::Root => "root".to_string(),
            NodeKind::Directory => format!("dir:{path}"),
            NodeKind::File => format!("file:{path}"),
        };
        let scope = self.scope.as_ref().map(|scope| scope.child(label));
        let idx = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent,
            path,
            token: token.to_string(),
            open: true,
            open_children: 0,
            props: BTreeMap::new(),
            delta: DeltaState::None,
            scope,
        });
        self.tokens.insert(token.to_string(), idx);
        if let Some(parent) = parent {
            self.nodes[parent].open_children += 1;
        }
        Ok(idx)
    }

    fn close(&mut self, idx: usize) -> Result<(), SvnError> {
        let node = &self.nodes[idx];
        if node.open_children > 0 {
            return Err(SvnError::state(format!(
                "cannot close '{}' with {} open children",
                display_path(&node.path),
                node.open_children
            )));
        }
        if node.delta == DeltaState::Streaming {
            return Err(SvnError::state(format!(
                "cannot close '{}' before its text delta is terminated",
                node.path
            )));
        }

        let node = &mut self.nodes[idx];
        node.open = false;
        if let Some(scope) = node.scope.take() {
            scope.release();
        }
        let token = std::mem::take(&mut node.token);
        let parent = node.parent;
        self.tokens.remove(&token);
        if let Some(parent) = parent {
            self.nodes[parent].open_children -= 1;
        }
        Ok(())
    }

    /// Validates `event` against the tree and records its effect.
    pub(crate) fn apply(&mut self, event: &EditorEvent) -> Result<Outcome, SvnError> {
        if matches!(event, EditorEvent::AbortEdit) {
            return match self.state {
                EditState::Aborted => Ok(Outcome::Skip),
                EditState::Closed => Err(SvnError::state("cannot abort an edit after close-edit")),
                EditState::NotStarted | EditState::Open => {
                    self.abort();
                    Ok(Outcome::Forward)
                }
            };
        }

        match event {
            EditorEvent::TargetRev { rev } => {
                self.ensure_live()?;
                if !self.nodes.is_empty() {
                    return Err(SvnError::state(
                        "set-target-revision must precede open-root",
                    ));
                }
                self.target_rev = Some(*rev);
            }
            EditorEvent::OpenRoot { token, .. } => {
                self.ensure_live()?;
                if !self.nodes.is_empty() {
                    return Err(SvnError::state("open-root called twice"));
                }
                self.insert(NodeKind::Root, None, String::new(), token)?;
                self.state = EditState::Open;
            }
            EditorEvent::DeleteEntry {
                path, dir_token, ..
            } => {
                self.ensure_open()?;
                let dir = self.lookup(dir_token, false)?;
                self.child_path(dir, path)?;
            }
            EditorEvent::AbsentDir { path, parent_token }
            | EditorEvent::AbsentFile { path, parent_token } => {
                self.ensure_open()?;
                let dir = self.lookup(parent_token, false)?;
                self.child_path(dir, path)?;
            }
            EditorEvent::AddDir {
                path,
                parent_token,
                child_token,
                ..
            }
            | EditorEvent::OpenDir {
                path,
                parent_token,
                child_token,
                ..
            } => {
                self.ensure_open()?;
                let dir = self.lookup(parent_token, false)?;
                let path = self.child_path(dir, path)?;
                self.insert(NodeKind::Directory, Some(dir), path, child_token)?;
            }
            EditorEvent::AddFile {
                path,
                dir_token,
                file_token,
                ..
            }
            | EditorEvent::OpenFile {
                path,
                dir_token,
                file_token,
                ..
            } => {
                self.ensure_open()?;
                let dir = self.lookup(dir_token, false)?;
                let path = self.child_path(dir, path)?;
                self.insert(NodeKind::File, Some(dir), path, file_token)?;
            }
            EditorEvent::ChangeDirProp {
                dir_token,
                name,
                value,
            } => {
                self.ensure_open()?;
                let dir = self.lookup(dir_token, false)?;
                self.nodes[dir].props.insert(name.clone(), value.clone());
            }
            EditorEvent::ChangeFileProp {
                file_token,
                name,
                value,
            } => {
                self.ensure_open()?;
                let file = self.lookup(file_token, true)?;
                self.nodes[file].props.insert(name.clone(), value.clone());
            }
            EditorEvent::CloseDir { dir_token } => {
                self.ensure_open()?;
                let dir = self.lookup(dir_token, false)?;
                self.close(dir)?;
            }
            EditorEvent::ApplyTextDelta { file_token, .. } => {
                self.ensure_open()?;
                let file = self.lookup(file_token, true)?;
                let node = &mut self.nodes[file];
                if node.delta != DeltaState::None {
                    return Err(SvnError::state(format!(
                        "'{}' already received a text delta",
                        node.path
                    )));
                }
                node.delta = DeltaState::Streaming;
            }
            EditorEvent::DeltaWindow { file_token, window } => {
                self.ensure_open()?;
                if !self.text_deltas {
                    return Err(SvnError::Protocol(
                        "text delta window received while deltas are disabled".into(),
                    ));
                }
                let file = self.lookup(file_token, true)?;
                if self.nodes[file].delta != DeltaState::Streaming {
                    return Err(SvnError::state(format!(
                        "window for '{}' outside of apply-textdelta",
                        self.nodes[file].path
                    )));
                }
                window.validate()?;
            }
            EditorEvent::TextDeltaEnd { file_token } => {
                self.ensure_open()?;
                let file = self.lookup(file_token, true)?;
                let node = &mut self.nodes[file];
                if node.delta != DeltaState::Streaming {
                    return Err(SvnError::state(format!(
                        "textdelta-end for '{}' without apply-textdelta",
                        node.path
                    )));
                }
                node.delta = DeltaState::Done;
            }
            EditorEvent::CloseFile { file_token, .. } => {
                self.ensure_open()?;
                let file = self.lookup(file_token, true)?;
                self.close(file)?;
            }
            EditorEvent::CloseEdit => {
                self.ensure_open()?;
                if self.nodes.first().is_some_and(|root| root.open) {
                    return Err(SvnError::state("close-edit while the root is still open"));
                }
                self.state = EditState::Closed;
                self.release_scopes();
            }
            EditorEvent::AbortEdit => {}
        }
        Ok(Outcome::Forward)
    }

    /// Moves the whole edit to [`EditState::Aborted`].
    pub(crate) fn abort(&mut self) {
        if self.state != EditState::Aborted {
            trace!(edit = self.id, "edit aborted");
        }
        self.state = EditState::Aborted;
        self.tokens.clear();
        for node in &mut self.nodes {
            node.open = false;
        }
        self.release_scopes();
    }

    fn release_scopes(&mut self) {
        for node in self.nodes.iter_mut().rev() {
            if let Some(scope) = node.scope.take() {
                scope.release();
            }
        }
        if let Some(scope) = self.scope.take() {
            scope.release();
        }
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

/// Validates an incoming [`EditorEvent`] stream and forwards it to `H`.
///
/// Nesting, single-close and text-delta ordering are enforced exactly as for
/// [`crate::Editor`]. The first violation, or the first error returned by
/// the consumer, aborts the edit; the consumer then receives a best-effort
/// `AbortEdit` unless the edit was already over.
#[derive(Debug)]
pub struct CheckedEditor<H> {
    tree: EditTree,
    consumer: H,
}

impl<H: EditorEventHandler> CheckedEditor<H> {
    /// Wraps `consumer` in a standalone edit.
    pub fn new(consumer: H) -> Self {
        Self::with_scope(consumer, ScopeRegistry::new().open("edit"))
    }

    pub(crate) fn with_scope(consumer: H, scope: ResourceScope) -> Self {
        Self {
            tree: EditTree::new(scope),
            consumer,
        }
    }

    /// Enables or disables text deltas. With deltas disabled every window
    /// event is rejected.
    pub fn with_text_deltas(mut self, enabled: bool) -> Self {
        self.tree.text_deltas = enabled;
        self
    }

    /// Current edit state.
    pub fn state(&self) -> EditState {
        self.tree.state()
    }

    /// Target revision announced by the driver, if any.
    pub fn target_revision(&self) -> Option<u64> {
        self.tree.target_rev
    }

    /// Properties changed on the open or closed node at `path`.
    pub fn changed_props(&self, path: &str) -> Option<&BTreeMap<String, Option<Vec<u8>>>> {
        self.tree
            .nodes
            .iter()
            .rev()
            .find(|node| node.path == path)
            .map(|node| &node.props)
    }

    /// The wrapped consumer.
    pub fn consumer(&self) -> &H {
        &self.consumer
    }

    /// Mutable access to the wrapped consumer.
    pub fn consumer_mut(&mut self) -> &mut H {
        &mut self.consumer
    }

    /// Unwraps the consumer.
    pub fn into_consumer(self) -> H {
        self.consumer
    }

    pub(crate) fn tree(&self) -> &EditTree {
        &self.tree
    }

    /// Records `err` against the edit: a live edit is aborted and the
    /// consumer notified.
    pub(crate) fn fail(&mut self, err: SvnError) -> SvnError {
        if self.tree.is_live() {
            self.tree.abort();
            self.notify_abort(&err);
        }
        err
    }

    fn notify_abort(&mut self, cause: &SvnError) {
        debug!(edit = self.tree.id(), error = %cause, "aborting edit");
        if let Err(err) = self.consumer.on_event(EditorEvent::AbortEdit) {
            debug!(edit = self.tree.id(), error = %err, "consumer failed to abort edit");
        }
    }
}

impl<H: EditorEventHandler> EditorEventHandler for CheckedEditor<H> {
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        let outcome = match self.tree.apply(&event) {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail(err)),
        };
        if outcome == Outcome::Skip {
            return Ok(());
        }

        let is_abort = matches!(event, EditorEvent::AbortEdit);
        let name = event.name();
        if let Err(err) = self.consumer.on_event(event) {
            debug!(edit = self.tree.id(), event = name, error = %err, "edit consumer failed");
            if !is_abort && self.tree.state() != EditState::Aborted {
                self.tree.abort();
                self.notify_abort(&err);
            }
            return Err(err);
        }
        Ok(())
    }
}
