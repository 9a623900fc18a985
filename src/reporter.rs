//! Working-copy state reports for update and switch.

use std::fmt;

use tracing::{debug, trace};

use crate::editor::{CheckedEditor, EditState, EditorEventHandler, Report, ReportCommand};
use crate::path::{validate_rel_dir_path, validate_rel_path};
use crate::scope::ResourceScope;
use crate::{Depth, RaSession, SvnError, SvnUrl, SwitchOptions, UpdateOptions};

/// Lifecycle of a [`Reporter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReporterState {
    /// Accepting report calls.
    Active,
    /// `finish` completed and the edit was applied.
    Finished,
    /// Aborted explicitly, by an error, or by drop.
    Aborted,
}

impl fmt::Display for ReporterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        })
    }
}

#[derive(Debug)]
pub(crate) enum ReporterTarget {
    Update(UpdateOptions),
    Switch(SwitchOptions),
}

impl ReporterTarget {
    fn op(&self) -> &'static str {
        match self {
            Self::Update(_) => "update",
            Self::Switch(_) => "switch",
        }
    }
}

/// Describes the working copy to the server, then applies the server's edit.
///
/// Obtained from [`RaSession::do_update`] or [`RaSession::do_switch`]. Paths
/// are relative to the update target; the empty path names the target
/// itself. Exactly one of [`Reporter::finish`] or [`Reporter::abort`] ends
/// the report. Any error leaves the reporter aborted, and every later call
/// fails with [`SvnError::ProtocolState`].
pub struct Reporter<'s> {
    session: &'s mut RaSession,
    target: ReporterTarget,
    editor: &'s mut dyn EditorEventHandler,
    report: Report,
    state: ReporterState,
    driving: bool,
    scope: Option<ResourceScope>,
}

impl fmt::Debug for Reporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("target", &self.target)
            .field("report", &self.report)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'s> Reporter<'s> {
    pub(crate) fn new(
        session: &'s mut RaSession,
        target: ReporterTarget,
        editor: &'s mut dyn EditorEventHandler,
        scope: ResourceScope,
    ) -> Self {
        trace!(op = target.op(), "reporter started");
        Self {
            session,
            target,
            editor,
            report: Report::new(),
            state: ReporterState::Active,
            driving: false,
            scope: Some(scope),
        }
    }

    /// Current state.
    pub fn state(&self) -> ReporterState {
        self.state
    }

    /// Commands reported so far.
    pub fn report(&self) -> &Report {
        &self.report
    }

    fn check_active(&self, call: &str) -> Result<(), SvnError> {
        if self.state == ReporterState::Active {
            Ok(())
        } else {
            Err(SvnError::state(format!(
                "{call} called on {} reporter",
                self.state
            )))
        }
    }

    fn terminate(&mut self, state: ReporterState, error: Option<&SvnError>) {
        self.state = state;
        if state == ReporterState::Aborted && !self.report.is_terminated() {
            self.report.abort();
        }
        self.scope = None;
        self.session.release_op(self.target.op(), error);
    }

    fn fail(&mut self, err: SvnError) -> SvnError {
        self.terminate(ReporterState::Aborted, Some(&err));
        err
    }

    /// Reports that `path` is at `rev` with full depth.
    pub fn set_path(
        &mut self,
        path: &str,
        rev: u64,
        start_empty: bool,
        lock_token: Option<&str>,
    ) -> Result<(), SvnError> {
        self.set_path_with_depth(path, rev, Depth::Infinity, start_empty, lock_token)
    }

    /// Reports that `path` is at `rev`, present to `depth`.
    pub fn set_path_with_depth(
        &mut self,
        path: &str,
        rev: u64,
        depth: Depth,
        start_empty: bool,
        lock_token: Option<&str>,
    ) -> Result<(), SvnError> {
        self.check_active("set_path")?;
        let path = validate_rel_dir_path(path).map_err(|err| self.fail(err))?;
        self.report.push(ReportCommand::SetPath {
            path,
            rev,
            start_empty,
            lock_token: lock_token.map(str::to_string),
            depth,
        });
        Ok(())
    }

    /// Reports that `path` is missing from the working copy.
    pub fn delete_path(&mut self, path: &str) -> Result<(), SvnError> {
        self.check_active("delete_path")?;
        let path = validate_rel_path(path).map_err(|err| self.fail(err))?;
        self.report.push(ReportCommand::DeletePath { path });
        Ok(())
    }

    /// Reports that `path` is switched to `url` at `rev`.
    pub fn link_path(
        &mut self,
        path: &str,
        url: &str,
        rev: u64,
        start_empty: bool,
        lock_token: Option<&str>,
    ) -> Result<(), SvnError> {
        self.check_active("link_path")?;
        let checked =
            validate_rel_dir_path(path).and_then(|path| Ok((path, SvnUrl::parse(url)?)));
        let (path, url) = checked.map_err(|err| self.fail(err))?;
        self.report.push(ReportCommand::LinkPath {
            path,
            url: url.url,
            rev,
            start_empty,
            lock_token: lock_token.map(str::to_string),
            depth: Depth::Infinity,
        });
        Ok(())
    }

    /// Sends the report and applies the server's edit to the editor.
    ///
    /// The edit is validated on the way in. If the server stops without
    /// closing the edit, or the editor fails, the editor receives
    /// `AbortEdit` and the call fails.
    pub async fn finish(&mut self) -> Result<(), SvnError> {
        self.check_active("finish")?;
        self.report.finish();
        self.driving = true;
        let result = self.drive().await;
        self.driving = false;
        match result {
            Ok(()) => {
                debug!(
                    op = self.target.op(),
                    commands = self.report.commands.len(),
                    "report applied"
                );
                self.terminate(ReporterState::Finished, None);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn drive(&mut self) -> Result<(), SvnError> {
        let scope = match &self.scope {
            Some(scope) => scope.child("edit"),
            None => return Err(SvnError::state("reporter has no open scope")),
        };
        let mut checked = CheckedEditor::with_scope(&mut *self.editor, scope);
        let transport = self.session.transport_mut();
        let result = match &self.target {
            ReporterTarget::Update(options) => {
                transport.update(options, &self.report, &mut checked).await
            }
            ReporterTarget::Switch(options) => {
                transport.switch(options, &self.report, &mut checked).await
            }
        };
        match result {
            Ok(()) if checked.state() == EditState::Closed => Ok(()),
            Ok(()) => Err(checked.fail(SvnError::Protocol(format!(
                "{} edit ended without close-edit",
                self.target.op()
            )))),
            Err(err) => Err(checked.fail(err)),
        }
    }

    /// Cancels the report without asking the server for an edit.
    ///
    /// Aborting an aborted reporter does nothing; aborting a finished one
    /// fails.
    pub fn abort(&mut self) -> Result<(), SvnError> {
        if self.state == ReporterState::Aborted {
            return Ok(());
        }
        self.check_active("abort")?;
        self.terminate(ReporterState::Aborted, None);
        Ok(())
    }
}

impl Drop for Reporter<'_> {
    fn drop(&mut self) {
        // A dropped `finish` leaves the transport mid-edit; the session stays
        // blocked until reconnect.
        if self.state == ReporterState::Active && !self.driving {
            trace!(op = self.target.op(), "reporter dropped while active");
            self.terminate(ReporterState::Aborted, None);
        }
    }
}
