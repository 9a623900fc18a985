//! Stock edit consumers.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{EditorEvent, EditorEventHandler};
use crate::SvnError;
use crate::delta::{DeltaApplier, md5_hex, verify_checksum};

/// Records every event it receives.
#[derive(Clone, Debug, Default)]
pub struct EditRecorder {
    events: Vec<EditorEvent>,
}

impl EditRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> &[EditorEvent] {
        &self.events
    }

    /// Takes all recorded events, leaving the recorder empty.
    pub fn take_events(&mut self) -> Vec<EditorEvent> {
        std::mem::take(&mut self.events)
    }

    /// Consumes the recorder and returns its events.
    pub fn into_events(self) -> Vec<EditorEvent> {
        self.events
    }
}

impl EditorEventHandler for EditRecorder {
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        self.events.push(event);
        Ok(())
    }
}

/// A file produced by an edit, as seen by [`ContentCollector`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectedFile {
    /// Full text after the edit.
    pub contents: Vec<u8>,
    /// Property changes (`None` deletes the property).
    pub props: BTreeMap<String, Option<Vec<u8>>>,
    /// Whether the file was added rather than opened.
    pub added: bool,
    /// Copy source of an added file.
    pub copy_from: Option<(String, u64)>,
}

#[derive(Debug)]
struct PendingFile {
    path: String,
    file: CollectedFile,
    base: Vec<u8>,
    applier: Option<DeltaApplier>,
}

/// Applies an edit to a set of known base texts and collects the results.
///
/// Base texts are keyed by repository-relative path. An opened file without
/// a base starts from the empty text; an added file with history starts from
/// its copy source's base. Checksums sent with `apply_textdelta` and
/// `close_file` are verified when present.
#[derive(Debug, Default)]
pub struct ContentCollector {
    base: BTreeMap<String, Vec<u8>>,
    dirs: HashMap<String, String>,
    pending: HashMap<String, PendingFile>,
    files: BTreeMap<String, CollectedFile>,
    dir_props: BTreeMap<String, BTreeMap<String, Option<Vec<u8>>>>,
    added_dirs: BTreeSet<String>,
    deleted: BTreeSet<String>,
    absent: BTreeSet<String>,
    target_rev: Option<u64>,
    closed: bool,
    aborted: bool,
}

impl ContentCollector {
    /// Creates a collector with no base texts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a base text.
    pub fn with_base(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.base.insert(path.into(), contents.into());
        self
    }

    /// Files closed so far, keyed by path.
    pub fn files(&self) -> &BTreeMap<String, CollectedFile> {
        &self.files
    }

    /// Contents of a closed file.
    pub fn contents(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(|file| file.contents.as_slice())
    }

    /// Property changes made on a directory (`""` is the edit root).
    pub fn dir_props(&self, path: &str) -> Option<&BTreeMap<String, Option<Vec<u8>>>> {
        self.dir_props.get(path)
    }

    /// Directories added by the edit.
    pub fn added_dirs(&self) -> &BTreeSet<String> {
        &self.added_dirs
    }

    /// Paths deleted by the edit.
    pub fn deleted(&self) -> &BTreeSet<String> {
        &self.deleted
    }

    /// Paths reported as absent.
    pub fn absent(&self) -> &BTreeSet<String> {
        &self.absent
    }

    /// Target revision announced by the edit.
    pub fn target_revision(&self) -> Option<u64> {
        self.target_rev
    }

    /// Whether the edit completed with `close_edit`.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the edit was aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn dir_path(&self, token: &str) -> Result<&str, SvnError> {
        self.dirs
            .get(token)
            .map(String::as_str)
            .ok_or_else(|| SvnError::Protocol(format!("unknown directory token '{token}'")))
    }

    fn pending(&mut self, token: &str) -> Result<&mut PendingFile, SvnError> {
        self.pending
            .get_mut(token)
            .ok_or_else(|| SvnError::Protocol(format!("unknown file token '{token}'")))
    }

    fn open_file(
        &mut self,
        path: String,
        dir_token: &str,
        file_token: String,
        added: bool,
        copy_from: Option<(String, u64)>,
    ) -> Result<(), SvnError> {
        self.dir_path(dir_token)?;
        let base_path = match (&copy_from, added) {
            (Some((src, _)), true) => Some(src.trim_start_matches('/')),
            (None, true) => None,
            (_, false) => Some(path.as_str()),
        };
        let base = base_path
            .and_then(|p| self.base.get(p))
            .cloned()
            .unwrap_or_default();
        self.pending.insert(
            file_token,
            PendingFile {
                path,
                file: CollectedFile {
                    added,
                    copy_from,
                    ..CollectedFile::default()
                },
                base,
                applier: None,
            },
        );
        Ok(())
    }
}

impl EditorEventHandler for ContentCollector {
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        match event {
            EditorEvent::TargetRev { rev } => self.target_rev = Some(rev),
            EditorEvent::OpenRoot { token, .. } => {
                self.dirs.insert(token, String::new());
            }
            EditorEvent::AddDir {
                path,
                parent_token,
                child_token,
                ..
            } => {
                self.dir_path(&parent_token)?;
                self.added_dirs.insert(path.clone());
                self.dirs.insert(child_token, path);
            }
            EditorEvent::OpenDir {
                path,
                parent_token,
                child_token,
                ..
            } => {
                self.dir_path(&parent_token)?;
                self.dirs.insert(child_token, path);
            }
            EditorEvent::ChangeDirProp {
                dir_token,
                name,
                value,
            } => {
                let path = self.dir_path(&dir_token)?.to_string();
                self.dir_props.entry(path).or_default().insert(name, value);
            }
            EditorEvent::CloseDir { dir_token } => {
                self.dirs.remove(&dir_token);
            }
            EditorEvent::DeleteEntry { path, .. } => {
                self.files.remove(&path);
                self.deleted.insert(path);
            }
            EditorEvent::AbsentDir { path, .. } | EditorEvent::AbsentFile { path, .. } => {
                self.absent.insert(path);
            }
            EditorEvent::AddFile {
                path,
                dir_token,
                file_token,
                copy_from,
            } => self.open_file(path, &dir_token, file_token, true, copy_from)?,
            EditorEvent::OpenFile {
                path,
                dir_token,
                file_token,
                ..
            } => self.open_file(path, &dir_token, file_token, false, None)?,
            EditorEvent::ApplyTextDelta {
                file_token,
                base_checksum,
            } => {
                let pending = self.pending(&file_token)?;
                if let Some(expected) = base_checksum.as_deref() {
                    verify_checksum(&pending.path, expected, &md5_hex(&pending.base))?;
                }
                pending.applier = Some(DeltaApplier::new(pending.base.clone()));
            }
            EditorEvent::DeltaWindow { file_token, window } => {
                let pending = self.pending(&file_token)?;
                let applier = pending.applier.as_mut().ok_or_else(|| {
                    SvnError::Protocol(format!(
                        "window for '{}' before apply-textdelta",
                        pending.path
                    ))
                })?;
                applier.apply_window(&window)?;
            }
            EditorEvent::TextDeltaEnd { file_token } => {
                let pending = self.pending(&file_token)?;
                let applier = pending.applier.as_mut().ok_or_else(|| {
                    SvnError::Protocol(format!(
                        "textdelta-end for '{}' before apply-textdelta",
                        pending.path
                    ))
                })?;
                applier.finish()?;
            }
            EditorEvent::ChangeFileProp {
                file_token,
                name,
                value,
            } => {
                self.pending(&file_token)?.file.props.insert(name, value);
            }
            EditorEvent::CloseFile {
                file_token,
                text_checksum,
            } => {
                let PendingFile {
                    path,
                    mut file,
                    base,
                    applier,
                } = self.pending.remove(&file_token).ok_or_else(|| {
                    SvnError::Protocol(format!("unknown file token '{file_token}'"))
                })?;
                file.contents = match applier {
                    Some(applier) => applier.into_target(),
                    None => base,
                };
                if let Some(expected) = text_checksum.as_deref() {
                    verify_checksum(&path, expected, &md5_hex(&file.contents))?;
                }
                self.deleted.remove(&path);
                self.files.insert(path, file);
            }
            EditorEvent::CloseEdit => self.closed = true,
            EditorEvent::AbortEdit => {
                self.aborted = true;
                self.pending.clear();
                self.dirs.clear();
            }
        }
        Ok(())
    }
}
