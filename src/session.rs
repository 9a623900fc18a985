use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::commit::CommitEditor;
use crate::delta::DeltaApplier;
use crate::editor::{CheckedEditor, EditState, EditorEventHandler};
use crate::error::SVN_ERR_RA_NOT_IMPLEMENTED;
use crate::lock::{self, LockDesc, LockManyOptions, LockTarget, UnlockManyOptions, UnlockTarget};
use crate::path::{validate_rel_dir_path, validate_rel_path};
use crate::reporter::{Reporter, ReporterTarget};
use crate::scope::{ResourceScope, ScopeRegistry};
use crate::transport::{ConnectRequest, Connector, RaTransport, SessionCallbacks};
use crate::{
    AuthChain, Capability, CommitInfo, CommitOptions, DirListing, DirentFields, FileRev,
    FileRevContents, LogEntry, LogOptions, NodeKind, PropertyList, ReplayOptions, ServerError,
    SessionConfig, SvnError, SvnUrl, SwitchOptions, UpdateOptions, SVN_PROP_TXN_USER_AGENT,
};

/// A session with one repository.
///
/// Every operation takes `&mut self`, so at most one runs at a time. A
/// [`Reporter`] or [`CommitEditor`] borrows the session until it finishes.
/// If an operation's future is dropped while it waits on the transport, the
/// session refuses further work until [`RaSession::reconnect`].
pub struct RaSession {
    url: SvnUrl,
    repos_root: Option<SvnUrl>,
    transport: Box<dyn RaTransport>,
    connector: Arc<dyn Connector>,
    auth: AuthChain,
    config: SessionConfig,
    callbacks: SessionCallbacks,
    registry: ScopeRegistry,
    scope: ResourceScope,
    in_flight: Option<&'static str>,
}

impl fmt::Debug for RaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaSession")
            .field("url", &self.url)
            .field("repos_root", &self.repos_root)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RaSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteAccess({})", self.url)
    }
}

fn not_implemented(message: impl Into<String>) -> SvnError {
    ServerError::new(SVN_ERR_RA_NOT_IMPLEMENTED, message).into()
}

impl RaSession {
    /// Opens a session at `url` through `connector`.
    pub async fn open(
        connector: Arc<dyn Connector>,
        url: &str,
        callbacks: SessionCallbacks,
        auth: AuthChain,
        config: SessionConfig,
    ) -> Result<Self, SvnError> {
        let url = SvnUrl::parse(url)?;
        let transport = connector
            .connect(ConnectRequest {
                url: &url,
                auth: &auth,
                config: &config,
                progress: callbacks.progress().clone(),
            })
            .await
            .inspect_err(|err| debug!(url = %url, error = %err, "connect failed"))?;
        let registry = ScopeRegistry::new();
        let scope = registry.open("session");
        debug!(url = %url, "session opened");
        Ok(Self {
            url,
            repos_root: None,
            transport,
            connector,
            auth,
            config,
            callbacks,
            registry,
            scope,
            in_flight: None,
        })
    }

    /// The current session URL.
    pub fn url(&self) -> &SvnUrl {
        &self.url
    }

    /// The configuration the session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registry counting the scopes opened by this session.
    pub fn scopes(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Name of the operation that is still holding the session, if any.
    pub fn in_flight(&self) -> Option<&'static str> {
        self.in_flight
    }

    pub(crate) fn begin(&mut self, op: &'static str) -> Result<ResourceScope, SvnError> {
        if let Some(current) = self.in_flight {
            return Err(SvnError::state(format!(
                "cannot start {op}: {current} is still in flight"
            )));
        }
        self.in_flight = Some(op);
        trace!(op, url = %self.url, "operation started");
        Ok(self.scope.child(op))
    }

    pub(crate) fn finish_op<T>(
        &mut self,
        op: &'static str,
        result: Result<T, SvnError>,
    ) -> Result<T, SvnError> {
        self.release_op(op, result.as_ref().err());
        result
    }

    pub(crate) fn release_op(&mut self, op: &'static str, error: Option<&SvnError>) {
        self.in_flight = None;
        match error {
            None => trace!(op, "operation finished"),
            Some(err) => debug!(op, url = %self.url, error = %err, "operation failed"),
        }
    }

    pub(crate) fn transport_mut(&mut self) -> &mut dyn RaTransport {
        self.transport.as_mut()
    }

    pub(crate) async fn capability(&mut self, capability: Capability) -> Result<bool, SvnError> {
        self.transport.has_capability(capability.as_str()).await
    }

    /// Replaces the transport with a fresh connection.
    ///
    /// This also clears an operation left in flight by a dropped future.
    pub async fn reconnect(&mut self) -> Result<(), SvnError> {
        let transport = self
            .connector
            .connect(ConnectRequest {
                url: &self.url,
                auth: &self.auth,
                config: &self.config,
                progress: self.callbacks.progress().clone(),
            })
            .await?;
        if let Some(op) = self.in_flight.take() {
            debug!(op, url = %self.url, "discarding interrupted operation");
        }
        self.transport = transport;
        self.repos_root = None;
        debug!(url = %self.url, "session reconnected");
        Ok(())
    }

    async fn cached_repos_root(&mut self) -> Result<SvnUrl, SvnError> {
        if let Some(root) = &self.repos_root {
            return Ok(root.clone());
        }
        let root = self.transport.get_repos_root().await?;
        self.repos_root = Some(root.clone());
        Ok(root)
    }

    /// Moves the session to another URL in the same repository.
    pub async fn reparent(&mut self, url: &str) -> Result<(), SvnError> {
        let url = SvnUrl::parse(url)?;
        let _scope = self.begin("reparent")?;
        let result = self.reparent_inner(&url).await;
        self.finish_op("reparent", result)?;
        debug!(url = %url, "session reparented");
        self.url = url;
        Ok(())
    }

    async fn reparent_inner(&mut self, url: &SvnUrl) -> Result<(), SvnError> {
        let root = self.cached_repos_root().await?;
        if !url.is_within(&root) {
            return Err(SvnError::InvalidUrl(format!(
                "'{url}' is not in repository '{root}'"
            )));
        }
        self.transport.reparent(url).await
    }

    /// Repository UUID.
    pub async fn get_uuid(&mut self) -> Result<String, SvnError> {
        let _scope = self.begin("get-uuid")?;
        let result = self.transport.get_uuid().await;
        self.finish_op("get-uuid", result)
    }

    /// Repository root URL.
    pub async fn get_repos_root(&mut self) -> Result<SvnUrl, SvnError> {
        let _scope = self.begin("get-repos-root")?;
        let result = self.cached_repos_root().await;
        self.finish_op("get-repos-root", result)
    }

    /// Youngest revision in the repository.
    pub async fn get_latest_revnum(&mut self) -> Result<u64, SvnError> {
        let _scope = self.begin("get-latest-revnum")?;
        let result = self.transport.get_latest_revnum().await;
        self.finish_op("get-latest-revnum", result)
    }

    /// Whether the server advertises `capability` (for example
    /// `"commit-revprops"`).
    pub async fn has_capability(&mut self, capability: impl AsRef<str>) -> Result<bool, SvnError> {
        let _scope = self.begin("has-capability")?;
        let result = self.transport.has_capability(capability.as_ref()).await;
        self.finish_op("has-capability", result)
    }

    /// Streams log entries to `callback` and returns how many were delivered.
    ///
    /// Entries arrive from `start_rev` towards `end_rev`. Delivery stops after
    /// `limit` entries (unless it is `0`) or when `callback` breaks. An entry
    /// outside the range, or out of order, fails the call with
    /// [`SvnError::Protocol`].
    pub async fn get_log<F>(&mut self, options: &LogOptions, callback: F) -> Result<u64, SvnError>
    where
        F: FnMut(&LogEntry) -> ControlFlow<()> + Send,
    {
        let _scope = self.begin("log")?;
        let result = self.get_log_inner(options, callback).await;
        self.finish_op("log", result)
    }

    async fn get_log_inner<F>(
        &mut self,
        options: &LogOptions,
        mut callback: F,
    ) -> Result<u64, SvnError>
    where
        F: FnMut(&LogEntry) -> ControlFlow<()> + Send,
    {
        for path in &options.target_paths {
            validate_rel_dir_path(path)?;
        }
        if !options.revprops.is_standard_only() && !self.capability(Capability::LogRevProps).await?
        {
            return Err(not_implemented(
                "server does not support retrieving arbitrary revision properties",
            ));
        }

        let descending = options.is_descending();
        let mut last: Option<u64> = None;
        let mut delivered = 0u64;
        let mut done = false;
        let mut violation: Option<SvnError> = None;
        {
            let mut sink = |mut entry: LogEntry| {
                if done {
                    return ControlFlow::Break(());
                }
                let ordered = last.is_none_or(|prev| {
                    if descending {
                        entry.rev < prev
                    } else {
                        entry.rev > prev
                    }
                });
                if !options.contains(entry.rev) || !ordered {
                    violation = Some(SvnError::Protocol(format!(
                        "log entry r{} is out of order or outside r{}:r{}",
                        entry.rev, options.start_rev, options.end_rev
                    )));
                    done = true;
                    return ControlFlow::Break(());
                }
                last = Some(entry.rev);
                entry.fill_standard_fields();
                delivered += 1;
                let flow = callback(&entry);
                if flow.is_break() || (options.limit != 0 && delivered >= options.limit) {
                    done = true;
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            };
            self.transport.get_log(options, &mut sink).await?;
        }
        match violation {
            Some(err) => Err(err),
            None => Ok(delivered),
        }
    }

    /// Starts an update. The returned [`Reporter`] describes the working
    /// copy; [`Reporter::finish`] then drives `editor` with the changes.
    pub async fn do_update<'s>(
        &'s mut self,
        options: UpdateOptions,
        editor: &'s mut dyn EditorEventHandler,
    ) -> Result<Reporter<'s>, SvnError> {
        let scope = self.begin("update")?;
        match validate_rel_dir_path(&options.target) {
            Ok(target) => {
                let options = UpdateOptions { target, ..options };
                Ok(Reporter::new(
                    self,
                    ReporterTarget::Update(options),
                    editor,
                    scope,
                ))
            }
            Err(err) => self.finish_op("update", Err(err)),
        }
    }

    /// Starts a switch to `options.switch_url`, which must be in the same
    /// repository as the session.
    pub async fn do_switch<'s>(
        &'s mut self,
        options: SwitchOptions,
        editor: &'s mut dyn EditorEventHandler,
    ) -> Result<Reporter<'s>, SvnError> {
        let scope = self.begin("switch")?;
        match self.check_switch(options).await {
            Ok(options) => Ok(Reporter::new(
                self,
                ReporterTarget::Switch(options),
                editor,
                scope,
            )),
            Err(err) => self.finish_op("switch", Err(err)),
        }
    }

    async fn check_switch(&mut self, options: SwitchOptions) -> Result<SwitchOptions, SvnError> {
        let target = validate_rel_dir_path(&options.target)?;
        let switch_url = SvnUrl::parse(&options.switch_url)?;
        let root = self.cached_repos_root().await?;
        if !switch_url.is_within(&root) {
            return Err(SvnError::InvalidUrl(format!(
                "'{switch_url}' is not in repository '{root}'"
            )));
        }
        Ok(SwitchOptions {
            target,
            switch_url: switch_url.url,
            ..options
        })
    }

    /// Drives `editor` with the changes committed in `options.revision`.
    pub async fn replay(
        &mut self,
        options: &ReplayOptions,
        editor: &mut dyn EditorEventHandler,
    ) -> Result<(), SvnError> {
        let scope = self.begin("replay")?;
        let mut checked = CheckedEditor::with_scope(editor, scope.child("edit"))
            .with_text_deltas(options.send_deltas);
        let result = match self.transport.replay(options, &mut checked).await {
            Ok(()) if checked.state() == EditState::Closed => Ok(()),
            Ok(()) => Err(checked.fail(SvnError::Protocol(format!(
                "replay of r{} ended without close-edit",
                options.revision
            )))),
            Err(err) => Err(checked.fail(err)),
        };
        drop(checked);
        drop(scope);
        self.finish_op("replay", result)
    }

    /// Starts a commit.
    ///
    /// `callback` runs exactly once, after the new revision exists, with the
    /// result of [`CommitEditor::close_edit`].
    pub async fn get_commit_editor<'s, F>(
        &'s mut self,
        options: CommitOptions,
        callback: F,
    ) -> Result<CommitEditor<'s>, SvnError>
    where
        F: FnOnce(&CommitInfo) + Send + 's,
    {
        let scope = self.begin("commit")?;
        match self.prepare_commit(options).await {
            Ok(options) => Ok(CommitEditor::new(self, options, Box::new(callback), scope)),
            Err(err) => self.finish_op("commit", Err(err)),
        }
    }

    async fn prepare_commit(&mut self, options: CommitOptions) -> Result<CommitOptions, SvnError> {
        let mut lock_tokens = BTreeMap::new();
        for (path, token) in options.lock_tokens {
            lock_tokens.insert(validate_rel_path(&path)?, token);
        }
        let mut options = CommitOptions {
            lock_tokens,
            ..options
        };
        if options.has_custom_rev_props() && !self.capability(Capability::CommitRevProps).await? {
            return Err(not_implemented(
                "server does not support setting arbitrary revision properties during commit",
            ));
        }
        if self.capability(Capability::EphemeralTxnProps).await? {
            options.rev_props.insert(
                SVN_PROP_TXN_USER_AGENT.to_string(),
                self.config.ra_client.clone().into_bytes(),
            );
        }
        Ok(options)
    }

    /// Lists a directory. Entries carry only the fields selected by `fields`.
    pub async fn get_dir(
        &mut self,
        path: &str,
        rev: Option<u64>,
        fields: DirentFields,
    ) -> Result<DirListing, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let _scope = self.begin("get-dir")?;
        let result = self
            .transport
            .get_dir(&path, rev, fields)
            .await
            .map(|mut listing| {
                for entry in listing.entries.values_mut() {
                    entry.retain_fields(fields);
                }
                listing
            });
        self.finish_op("get-dir", result)
    }

    /// Kind of the node at `path`.
    pub async fn check_path(&mut self, path: &str, rev: Option<u64>) -> Result<NodeKind, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let _scope = self.begin("check-path")?;
        let result = self.transport.check_path(&path, rev).await;
        self.finish_op("check-path", result)
    }

    /// Locks `targets`.
    ///
    /// `callback` runs once per target, in order, with the new lock or the
    /// error for that path. Per-path failures do not fail the call.
    pub async fn lock<F>(
        &mut self,
        options: &LockManyOptions,
        targets: &[LockTarget],
        callback: F,
    ) -> Result<(), SvnError>
    where
        F: FnMut(&str, bool, Option<&LockDesc>, Option<&SvnError>),
    {
        let _scope = self.begin("lock")?;
        let result = self.lock_inner(options, targets, callback).await;
        self.finish_op("lock", result)
    }

    async fn lock_inner<F>(
        &mut self,
        options: &LockManyOptions,
        targets: &[LockTarget],
        callback: F,
    ) -> Result<(), SvnError>
    where
        F: FnMut(&str, bool, Option<&LockDesc>, Option<&SvnError>),
    {
        if targets.is_empty() {
            return Ok(());
        }
        let paths = lock::normalize_targets(targets.iter().map(|t| t.path.as_str()))?;
        let targets: Vec<LockTarget> = targets
            .iter()
            .zip(&paths)
            .map(|(target, path)| LockTarget {
                path: path.clone(),
                ..target.clone()
            })
            .collect();
        let results = self.transport.lock(options, &targets).await?;
        lock::dispatch("lock", true, &paths, results, callback)
    }

    /// Unlocks `targets`. See [`RaSession::lock`] for callback semantics.
    pub async fn unlock<F>(
        &mut self,
        options: &UnlockManyOptions,
        targets: &[UnlockTarget],
        callback: F,
    ) -> Result<(), SvnError>
    where
        F: FnMut(&str, bool, Option<&LockDesc>, Option<&SvnError>),
    {
        let _scope = self.begin("unlock")?;
        let result = self.unlock_inner(options, targets, callback).await;
        self.finish_op("unlock", result)
    }

    async fn unlock_inner<F>(
        &mut self,
        options: &UnlockManyOptions,
        targets: &[UnlockTarget],
        callback: F,
    ) -> Result<(), SvnError>
    where
        F: FnMut(&str, bool, Option<&LockDesc>, Option<&SvnError>),
    {
        if targets.is_empty() {
            return Ok(());
        }
        let paths = lock::normalize_targets(targets.iter().map(|t| t.path.as_str()))?;
        let targets: Vec<UnlockTarget> = targets
            .iter()
            .zip(&paths)
            .map(|(target, path)| UnlockTarget {
                path: path.clone(),
                ..target.clone()
            })
            .collect();
        let results = self.transport.unlock(options, &targets).await?;
        lock::dispatch("unlock", false, &paths, results, callback)
    }

    /// The lock on `path`, if any.
    pub async fn get_lock(&mut self, path: &str) -> Result<Option<LockDesc>, SvnError> {
        let path = validate_rel_path(path)?;
        let _scope = self.begin("get-lock")?;
        let result = self.transport.get_lock(&path).await;
        self.finish_op("get-lock", result)
    }

    /// Every lock at or below `path`.
    pub async fn get_locks(&mut self, path: &str) -> Result<BTreeMap<String, LockDesc>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let _scope = self.begin("get-locks")?;
        let result = self.transport.get_locks(&path).await;
        self.finish_op("get-locks", result)
    }

    /// Where `path@peg` lived at each of `revisions`. Revisions at which the
    /// node did not exist are absent from the result.
    pub async fn get_locations(
        &mut self,
        path: &str,
        peg: u64,
        revisions: &[u64],
    ) -> Result<BTreeMap<u64, String>, SvnError> {
        let path = validate_rel_dir_path(path)?;
        let _scope = self.begin("get-locations")?;
        let result = self
            .transport
            .get_locations(&path, peg, revisions)
            .await
            .and_then(|locations| {
                match locations.keys().find(|rev| !revisions.contains(rev)) {
                    Some(rev) => Err(SvnError::Protocol(format!(
                        "get-locations returned unrequested revision r{rev}"
                    ))),
                    None => Ok(locations),
                }
            });
        self.finish_op("get-locations", result)
    }

    /// Streams every revision of `path` between `start` and `end` to
    /// `handler` and returns how many were delivered.
    ///
    /// Revisions arrive in ascending order, or descending when
    /// `start > end` (which needs the `get-file-revs-reverse` capability).
    pub async fn get_file_revs<F>(
        &mut self,
        path: &str,
        start: u64,
        end: u64,
        handler: F,
    ) -> Result<u64, SvnError>
    where
        F: FnMut(&FileRev) -> Result<(), SvnError> + Send,
    {
        let path = validate_rel_path(path)?;
        let _scope = self.begin("get-file-revs")?;
        let result = self.get_file_revs_inner(&path, start, end, handler).await;
        self.finish_op("get-file-revs", result)
    }

    /// Like [`RaSession::get_file_revs`], reconstructing the full text of
    /// every revision from the delta chain.
    pub async fn get_file_revs_contents<F>(
        &mut self,
        path: &str,
        start: u64,
        end: u64,
        mut handler: F,
    ) -> Result<u64, SvnError>
    where
        F: FnMut(FileRevContents) -> Result<(), SvnError> + Send,
    {
        let mut contents = Vec::new();
        self.get_file_revs(path, start, end, |file_rev| {
            if let Some(windows) = &file_rev.delta {
                let mut applier = DeltaApplier::new(std::mem::take(&mut contents));
                for window in windows {
                    applier.apply_window(window)?;
                }
                applier.finish()?;
                contents = applier.into_target();
            }
            handler(FileRevContents {
                file_rev: file_rev.clone(),
                contents: contents.clone(),
            })
        })
        .await
    }

    async fn get_file_revs_inner<F>(
        &mut self,
        path: &str,
        start: u64,
        end: u64,
        mut handler: F,
    ) -> Result<u64, SvnError>
    where
        F: FnMut(&FileRev) -> Result<(), SvnError> + Send,
    {
        let reverse = start > end;
        if reverse && !self.capability(Capability::GetFileRevsReverse).await? {
            return Err(not_implemented(
                "server does not support reverse file revision order",
            ));
        }
        let (low, high) = if reverse { (end, start) } else { (start, end) };
        let mut last: Option<u64> = None;
        let mut delivered = 0u64;
        {
            let mut sink = |file_rev: FileRev| {
                let ordered = last.is_none_or(|prev| {
                    if reverse {
                        file_rev.rev < prev
                    } else {
                        file_rev.rev > prev
                    }
                });
                if file_rev.rev < low || file_rev.rev > high || !ordered {
                    return Err(SvnError::Protocol(format!(
                        "file revision r{} is out of order or outside r{start}:r{end}",
                        file_rev.rev
                    )));
                }
                last = Some(file_rev.rev);
                delivered += 1;
                handler(&file_rev)
            };
            self.transport
                .get_file_revs(path, start, end, &mut sink)
                .await?;
        }
        if delivered == 0 {
            return Err(SvnError::Protocol(format!(
                "get-file-revs returned no revisions for '{path}'"
            )));
        }
        Ok(delivered)
    }

    /// Every property of revision `rev`.
    pub async fn rev_proplist(&mut self, rev: u64) -> Result<PropertyList, SvnError> {
        let _scope = self.begin("rev-proplist")?;
        let result = self.transport.rev_proplist(rev).await;
        self.finish_op("rev-proplist", result)
    }

    /// Sets (or, with `None`, deletes) a revision property.
    pub async fn change_rev_prop(
        &mut self,
        rev: u64,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), SvnError> {
        let _scope = self.begin("change-rev-prop")?;
        let result = self.transport.change_rev_prop(rev, name, value).await;
        self.finish_op("change-rev-prop", result)
    }
}

impl Drop for RaSession {
    fn drop(&mut self) {
        trace!(url = %self.url, scope = self.scope.id(), "session closed");
    }
}
