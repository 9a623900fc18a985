//! In-memory repository used by the integration tests.

#![allow(clippy::unwrap_used)]
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};

use svn_ra::{
    AuthChain, BoxFuture, CommitInfo, CommitOptions, ConnectRequest, Connector, CredentialKind,
    DirListing, DirentFields, EditRecorder, Editor, EditorEvent, EditorEventHandler, FileRev,
    FileRevSink, LockDesc, LockManyOptions, LockTarget, LogEntry, LogOptions, LogSink, NodeKind,
    ProgressNotifier, PropertyList, RaSession, RaTransport, ReplayOptions, Report,
    SVN_ERR_FS_BAD_LOCK_TOKEN, SVN_ERR_FS_NO_SUCH_LOCK, SVN_ERR_FS_NOT_FOUND,
    SVN_ERR_FS_PATH_ALREADY_LOCKED, ServerError, SessionCallbacks, SessionConfig, SvnError,
    SvnUrl, SwitchOptions, UnlockManyOptions, UnlockTarget, UpdateOptions,
};

pub const ROOT: &str = "svn://example.com/repo";
pub const UUID: &str = "0b2b5c4e-6a2c-4c5e-9f43-2d3f7c0a9e11";

pub fn run_async<T>(f: impl Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

/// Server-side state shared by every transport a connector opens.
#[derive(Debug, Default)]
pub struct Repo {
    pub youngest: u64,
    pub capabilities: BTreeSet<String>,
    pub log: Vec<LogEntry>,
    /// Revisions reported by `get_log` in this exact order, ignoring the range.
    pub log_order: Option<Vec<u64>>,
    pub dirs: BTreeMap<String, DirListing>,
    pub kinds: BTreeMap<String, NodeKind>,
    pub locks: BTreeMap<String, LockDesc>,
    pub file_revs: BTreeMap<String, Vec<FileRev>>,
    pub locations: BTreeMap<String, BTreeMap<u64, String>>,
    pub rev_props: BTreeMap<u64, PropertyList>,
    /// Edit sent for update and switch.
    pub update_edit: Vec<EditorEvent>,
    pub replays: BTreeMap<u64, Vec<EditorEvent>>,
    pub reports: Vec<Report>,
    pub switched_to: Vec<String>,
    pub commits: Vec<(CommitOptions, Vec<EditorEvent>)>,
    pub reparented_to: Vec<String>,
    pub connects: u32,
    pub refuse_connect: bool,
    /// The next transport call never completes.
    pub hang_next: bool,
}

pub type SharedRepo = Arc<Mutex<Repo>>;

pub struct FakeConnector {
    pub repo: SharedRepo,
}

impl Connector for FakeConnector {
    fn connect<'a>(&'a self, request: ConnectRequest<'a>) -> BoxFuture<'a, Box<dyn RaTransport>> {
        let mut repo = self.repo.lock().unwrap();
        if repo.refuse_connect {
            return ready(Err(SvnError::Transport("connection refused".into())));
        }
        let root = SvnUrl::parse(ROOT).unwrap();
        if !request.url.is_within(&root) {
            return ready(Err(SvnError::Transport(format!(
                "no repository at {}",
                request.url
            ))));
        }
        if request
            .auth
            .require("<svn://example.com:3690> repo", CredentialKind::Username)
            .is_err()
            && !request.auth.is_empty()
        {
            return ready(Err(SvnError::AuthFailed("no usable credentials".into())));
        }
        repo.connects += 1;
        request.progress.notify(0, None);
        let transport: Box<dyn RaTransport> = Box::new(FakeTransport {
            repo: Arc::clone(&self.repo),
            url: request.url.clone(),
            progress: request.progress,
        });
        ready(Ok(transport))
    }
}

fn ready<'a, T: Send + 'a>(value: Result<T, SvnError>) -> BoxFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

fn not_found(path: &str) -> SvnError {
    ServerError::new(SVN_ERR_FS_NOT_FOUND, format!("path '{path}' not found")).into()
}

pub struct FakeTransport {
    repo: SharedRepo,
    url: SvnUrl,
    progress: ProgressNotifier,
}

impl FakeTransport {
    /// Runs `f` against the repository unless the call is scripted to hang.
    fn call<'a, T, F>(&mut self, f: F) -> BoxFuture<'a, T>
    where
        T: Send + 'a,
        F: FnOnce(&mut Repo, &SvnUrl) -> Result<T, SvnError>,
    {
        let mut repo = self.repo.lock().unwrap();
        if repo.hang_next {
            repo.hang_next = false;
            return Box::pin(std::future::pending());
        }
        ready(f(&mut repo, &self.url))
    }

    fn rel(url: &SvnUrl, path: &str) -> String {
        let root = SvnUrl::parse(ROOT).unwrap();
        let base = url.relative_to(&root).unwrap_or_default();
        match (base.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => base,
            (false, false) => format!("{base}/{path}"),
        }
    }
}

fn drive(events: &[EditorEvent], editor: &mut dyn EditorEventHandler) -> Result<(), SvnError> {
    for event in events {
        editor.on_event(event.clone())?;
    }
    Ok(())
}

impl RaTransport for FakeTransport {
    fn reparent<'a>(&'a mut self, url: &'a SvnUrl) -> BoxFuture<'a, ()> {
        self.url = url.clone();
        self.call(|repo, url| {
            repo.reparented_to.push(url.url.clone());
            Ok(())
        })
    }

    fn get_uuid(&mut self) -> BoxFuture<'_, String> {
        self.call(|_, _| Ok(UUID.to_string()))
    }

    fn get_repos_root(&mut self) -> BoxFuture<'_, SvnUrl> {
        self.call(|_, _| SvnUrl::parse(ROOT))
    }

    fn get_latest_revnum(&mut self) -> BoxFuture<'_, u64> {
        self.call(|repo, _| Ok(repo.youngest))
    }

    fn get_log<'a>(
        &'a mut self,
        options: &'a LogOptions,
        sink: &'a mut LogSink<'_>,
    ) -> BoxFuture<'a, ()> {
        self.call(|repo, _| {
            let revs: Vec<u64> = match &repo.log_order {
                Some(order) => order.clone(),
                None if options.is_descending() => {
                    (options.end_rev..=options.start_rev).rev().collect()
                }
                None => (options.start_rev..=options.end_rev).collect(),
            };
            for rev in revs {
                let Some(entry) = repo.log.iter().find(|e| e.rev == rev) else {
                    continue;
                };
                if sink(entry.clone()).is_break() {
                    break;
                }
            }
            Ok(())
        })
    }

    fn update<'a>(
        &'a mut self,
        _options: &'a UpdateOptions,
        report: &'a Report,
        editor: &'a mut dyn EditorEventHandler,
    ) -> BoxFuture<'a, ()> {
        self.call(|repo, _| {
            repo.reports.push(report.clone());
            drive(&repo.update_edit, editor)
        })
    }

    fn switch<'a>(
        &'a mut self,
        options: &'a SwitchOptions,
        report: &'a Report,
        editor: &'a mut dyn EditorEventHandler,
    ) -> BoxFuture<'a, ()> {
        self.call(|repo, _| {
            repo.reports.push(report.clone());
            repo.switched_to.push(options.switch_url.clone());
            drive(&repo.update_edit, editor)
        })
    }

    fn replay<'a>(
        &'a mut self,
        options: &'a ReplayOptions,
        editor: &'a mut dyn EditorEventHandler,
    ) -> BoxFuture<'a, ()> {
        self.call(|repo, _| match repo.replays.get(&options.revision) {
            Some(events) => drive(events, editor),
            None => Err(ServerError::new(
                SVN_ERR_FS_NOT_FOUND,
                format!("no such revision {}", options.revision),
            )
            .into()),
        })
    }

    fn commit<'a>(
        &'a mut self,
        options: &'a CommitOptions,
        events: &'a [EditorEvent],
    ) -> BoxFuture<'a, CommitInfo> {
        let progress = self.progress.clone();
        self.call(|repo, _| {
            if events.last() != Some(&EditorEvent::CloseEdit) {
                return Err(SvnError::Protocol("commit edit was not closed".into()));
            }
            repo.youngest += 1;
            repo.commits.push((options.clone(), events.to_vec()));
            progress.notify(events.len() as u64, Some(events.len() as u64));
            Ok(CommitInfo {
                new_rev: repo.youngest,
                date: Some("2024-05-01T12:00:00.000000Z".into()),
                author: Some("alice".into()),
                post_commit_err: None,
            })
        })
    }

    fn get_dir<'a>(
        &'a mut self,
        path: &'a str,
        _rev: Option<u64>,
        _fields: DirentFields,
    ) -> BoxFuture<'a, DirListing> {
        self.call(|repo, url| {
            let path = Self::rel(url, path);
            repo.dirs.get(&path).cloned().ok_or_else(|| not_found(&path))
        })
    }

    fn check_path<'a>(&'a mut self, path: &'a str, _rev: Option<u64>) -> BoxFuture<'a, NodeKind> {
        self.call(|repo, url| {
            let path = Self::rel(url, path);
            Ok(repo.kinds.get(&path).copied().unwrap_or(NodeKind::None))
        })
    }

    fn has_capability<'a>(&'a mut self, capability: &'a str) -> BoxFuture<'a, bool> {
        self.call(|repo, _| Ok(repo.capabilities.contains(capability)))
    }

    fn lock<'a>(
        &'a mut self,
        options: &'a LockManyOptions,
        targets: &'a [LockTarget],
    ) -> BoxFuture<'a, Vec<Result<LockDesc, SvnError>>> {
        self.call(|repo, url| {
            let results: Vec<Result<LockDesc, SvnError>> = targets
                .iter()
                .map(|target| {
                    let path = Self::rel(url, &target.path);
                    if repo.locks.contains_key(&path) && !options.steal_lock {
                        return Err(ServerError::new(
                            SVN_ERR_FS_PATH_ALREADY_LOCKED,
                            format!("path '{path}' is already locked"),
                        )
                        .into());
                    }
                    let lock = LockDesc {
                        path: path.clone(),
                        token: format!("opaquelocktoken:{path}"),
                        owner: "alice".into(),
                        comment: options.comment.clone(),
                        is_dav_comment: false,
                        created: "2024-05-01T12:00:00.000000Z".into(),
                        expires: None,
                    };
                    repo.locks.insert(path, lock.clone());
                    Ok(lock)
                })
                .collect();
            Ok(results)
        })
    }

    fn unlock<'a>(
        &'a mut self,
        options: &'a UnlockManyOptions,
        targets: &'a [UnlockTarget],
    ) -> BoxFuture<'a, Vec<Result<(), SvnError>>> {
        self.call(|repo, url| {
            let results: Vec<Result<(), SvnError>> = targets
                .iter()
                .map(|target| {
                    let path = Self::rel(url, &target.path);
                    let Some(lock) = repo.locks.get(&path) else {
                        return Err(ServerError::new(
                            SVN_ERR_FS_NO_SUCH_LOCK,
                            format!("path '{path}' is not locked"),
                        )
                        .into());
                    };
                    if !options.break_lock && target.token.as_deref() != Some(lock.token.as_str())
                    {
                        return Err(ServerError::new(
                            SVN_ERR_FS_BAD_LOCK_TOKEN,
                            format!("bad lock token for '{path}'"),
                        )
                        .into());
                    }
                    repo.locks.remove(&path);
                    Ok(())
                })
                .collect();
            Ok(results)
        })
    }

    fn get_lock<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Option<LockDesc>> {
        self.call(|repo, url| Ok(repo.locks.get(&Self::rel(url, path)).cloned()))
    }

    fn get_locks<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, BTreeMap<String, LockDesc>> {
        self.call(|repo, url| {
            let base = Self::rel(url, path);
            Ok(repo
                .locks
                .iter()
                .filter(|(p, _)| {
                    base.is_empty() || **p == base || p.starts_with(&format!("{base}/"))
                })
                .map(|(p, lock)| (p.clone(), lock.clone()))
                .collect())
        })
    }

    fn get_locations<'a>(
        &'a mut self,
        path: &'a str,
        _peg: u64,
        revisions: &'a [u64],
    ) -> BoxFuture<'a, BTreeMap<u64, String>> {
        self.call(|repo, url| {
            let path = Self::rel(url, path);
            let history = repo.locations.get(&path).ok_or_else(|| not_found(&path))?;
            Ok(history
                .iter()
                .filter(|(rev, _)| revisions.contains(rev))
                .map(|(rev, p)| (*rev, p.clone()))
                .collect())
        })
    }

    fn get_file_revs<'a>(
        &'a mut self,
        path: &'a str,
        start: u64,
        end: u64,
        sink: &'a mut FileRevSink<'_>,
    ) -> BoxFuture<'a, ()> {
        self.call(|repo, url| {
            let path = Self::rel(url, path);
            let revs = repo.file_revs.get(&path).ok_or_else(|| not_found(&path))?;
            let (low, high) = (start.min(end), start.max(end));
            let mut selected: Vec<&FileRev> = revs
                .iter()
                .filter(|r| r.rev >= low && r.rev <= high)
                .collect();
            if start > end {
                selected.reverse();
            }
            for file_rev in selected {
                sink(file_rev.clone())?;
            }
            Ok(())
        })
    }

    fn rev_proplist(&mut self, rev: u64) -> BoxFuture<'_, PropertyList> {
        self.call(|repo, _| {
            repo.rev_props
                .get(&rev)
                .cloned()
                .ok_or_else(|| not_found(&format!("r{rev}")))
        })
    }

    fn change_rev_prop<'a>(
        &'a mut self,
        rev: u64,
        name: &'a str,
        value: Option<&'a [u8]>,
    ) -> BoxFuture<'a, ()> {
        self.call(|repo, _| {
            let props = repo.rev_props.entry(rev).or_default();
            match value {
                Some(value) => props.insert(name.to_string(), value.to_vec()),
                None => props.remove(name),
            };
            Ok(())
        })
    }
}

/// A repository with ten revisions of log history.
pub fn repo() -> SharedRepo {
    let mut repo = Repo {
        youngest: 10,
        ..Repo::default()
    };
    for rev in 1..=10 {
        let mut entry = LogEntry::new(rev);
        entry
            .rev_props
            .insert("svn:log".into(), format!("change {rev}").into_bytes());
        entry
            .rev_props
            .insert("svn:author".into(), b"alice".to_vec());
        repo.log.push(entry);
    }
    Arc::new(Mutex::new(repo))
}

pub fn connector(repo: &SharedRepo) -> Arc<dyn Connector> {
    Arc::new(FakeConnector {
        repo: Arc::clone(repo),
    })
}

pub fn open(repo: &SharedRepo, url: &str) -> RaSession {
    run_async(RaSession::open(
        connector(repo),
        url,
        SessionCallbacks::new(),
        AuthChain::new(),
        SessionConfig::new().with_ra_client("svn-ra-tests/1.0"),
    ))
    .unwrap()
}

/// An edit that adds `path` (a file directly under the root) with `contents`.
pub fn add_file_edit(target_rev: u64, path: &str, contents: &[u8]) -> Vec<EditorEvent> {
    let mut editor = Editor::new(EditRecorder::new());
    editor.set_target_revision(target_rev).unwrap();
    let root = editor.open_root(Some(target_rev - 1)).unwrap();
    let file = editor.add_file(root, path, None).unwrap();
    let md5 = editor.send_contents(file, None, contents).unwrap();
    editor.close_file(file, Some(md5.as_str())).unwrap();
    editor.close_directory(root).unwrap();
    editor.close_edit().unwrap();
    editor.into_consumer().into_events()
}

/// Collects every event it receives.
#[derive(Debug, Default)]
pub struct Events(pub Vec<EditorEvent>);

impl EditorEventHandler for Events {
    fn on_event(&mut self, event: EditorEvent) -> Result<(), SvnError> {
        self.0.push(event);
        Ok(())
    }
}

pub fn keep_going(_: &LogEntry) -> ControlFlow<()> {
    ControlFlow::Continue(())
}
