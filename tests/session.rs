//! Session behaviour against an in-memory repository.

#![allow(clippy::unwrap_used)]

mod support;

use std::collections::BTreeMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::task::{Context, Waker};

use support::{Events, ROOT, UUID, add_file_edit, keep_going, open, repo, run_async};
use svn_ra::{
    AuthChain, ChangeAction, ChangedPath, CommitOptions, ContentCollector, Depth, DeltaOp,
    DirEntry, DirListing, DirentFields, EditorEvent, ErrorKind, FileRev, LockDesc,
    LockManyOptions, LockTarget, LogOptions, LogRevProps, NodeKind, PropDelta, RaSession,
    ReplayOptions, ReportCommand, ReporterState, SVN_ERR_FS_PATH_ALREADY_LOCKED,
    SVN_ERR_RA_NOT_IMPLEMENTED, SVN_PROP_TXN_USER_AGENT, SessionCallbacks, SessionConfig,
    SimplePrompt, SvnError, SwitchOptions, TextDeltaWindow, UnlockManyOptions, UnlockTarget,
    UpdateOptions,
};

fn collect_log(session: &mut RaSession, options: &LogOptions) -> Vec<u64> {
    let mut revs = Vec::new();
    let delivered = run_async(session.get_log(options, |entry| {
        revs.push(entry.rev);
        ControlFlow::Continue(())
    }))
    .unwrap();
    assert_eq!(delivered, revs.len() as u64);
    revs
}

#[test]
fn log_order_follows_range_direction_and_limit() {
    let repo = repo();
    let mut session = open(&repo, ROOT);

    let desc = collect_log(&mut session, &LogOptions::between(10, 1));
    assert_eq!(desc, (1..=10).rev().collect::<Vec<_>>());

    let asc = collect_log(&mut session, &LogOptions::between(1, 10));
    assert_eq!(asc, (1..=10).collect::<Vec<_>>());

    let limited = collect_log(&mut session, &LogOptions::between(10, 1).with_limit(3));
    assert_eq!(limited, vec![10, 9, 8]);

    let mut messages = Vec::new();
    let delivered = run_async(session.get_log(&LogOptions::between(1, 10), |entry| {
        messages.push(entry.message.clone().unwrap_or_default());
        if entry.rev == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }))
    .unwrap();
    assert_eq!(delivered, 2);
    assert_eq!(messages, vec!["change 1", "change 2"]);
}

#[test]
fn log_rejects_misordered_server_output() {
    let repo = repo();
    repo.lock().unwrap().log_order = Some(vec![3, 5, 4]);
    let mut session = open(&repo, ROOT);

    let mut seen = Vec::new();
    let err = run_async(session.get_log(&LogOptions::between(1, 10), |entry| {
        seen.push(entry.rev);
        ControlFlow::Continue(())
    }))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedData);
    assert_eq!(seen, vec![3, 5]);

    repo.lock().unwrap().log_order = Some(vec![12]);
    let err = run_async(session.get_log(&LogOptions::between(1, 10), keep_going)).unwrap_err();
    assert!(matches!(err, SvnError::Protocol(_)));
    assert_eq!(session.in_flight(), None);
}

#[test]
fn custom_log_revprops_need_capability() {
    let repo = repo();
    let mut session = open(&repo, ROOT);
    let options =
        LogOptions::between(1, 2).with_revprops(LogRevProps::Custom(vec!["svn:sync-lock".into()]));

    let err = run_async(session.get_log(&options, keep_going)).unwrap_err();
    assert_eq!(
        err.server_error().and_then(|e| e.code()),
        Some(SVN_ERR_RA_NOT_IMPLEMENTED)
    );

    let all = LogOptions::between(1, 2).with_revprops(LogRevProps::All);
    let err = run_async(session.get_log(&all, keep_going)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);

    repo.lock()
        .unwrap()
        .capabilities
        .insert("log-revprops".into());
    assert_eq!(run_async(session.get_log(&options, keep_going)).unwrap(), 2);
    assert_eq!(run_async(session.get_log(&all, keep_going)).unwrap(), 2);
}

#[test]
fn standard_log_needs_no_capability() {
    let repo = repo();
    let mut session = open(&repo, ROOT);
    assert!(repo.lock().unwrap().capabilities.is_empty());

    let mut authors = Vec::new();
    let delivered = run_async(session.get_log(&LogOptions::between(10, 1), |entry| {
        authors.push(entry.author.clone());
        ControlFlow::Continue(())
    }))
    .unwrap();
    assert_eq!(delivered, 10);
    assert!(authors.iter().all(|a| a.as_deref() == Some("alice")));
}

#[test]
fn get_dir_returns_only_requested_fields() {
    let repo = repo();
    let full = |name: &str, kind| DirEntry {
        name: name.to_string(),
        kind: Some(kind),
        size: Some(12),
        has_props: Some(true),
        created_rev: Some(7),
        time: Some("2024-05-01T12:00:00.000000Z".into()),
        last_author: Some("alice".into()),
    };
    let mut entries = BTreeMap::new();
    entries.insert("src".to_string(), full("src", NodeKind::Dir));
    entries.insert("README".to_string(), full("README", NodeKind::File));
    repo.lock().unwrap().dirs.insert(
        "trunk".into(),
        DirListing {
            rev: 10,
            entries,
            props: BTreeMap::new(),
        },
    );
    let mut session = open(&repo, ROOT);

    let listing = run_async(session.get_dir("trunk/", None, DirentFields::KIND)).unwrap();
    assert_eq!(listing.entries.len(), 2);
    for entry in listing.entries.values() {
        assert!(entry.kind.is_some());
        assert_eq!(
            entry,
            &DirEntry {
                name: entry.name.clone(),
                kind: entry.kind,
                ..DirEntry::default()
            }
        );
    }

    let listing = run_async(session.get_dir(
        "trunk",
        Some(10),
        DirentFields::SIZE | DirentFields::LAST_AUTHOR,
    ))
    .unwrap();
    let readme = &listing.entries["README"];
    assert_eq!((readme.kind, readme.size), (None, Some(12)));
    assert_eq!(readme.last_author.as_deref(), Some("alice"));

    let err = run_async(session.get_dir("missing", None, DirentFields::ALL)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    let err = run_async(session.get_dir("../etc", None, DirentFields::ALL)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

fn held_lock(path: &str, owner: &str) -> LockDesc {
    LockDesc {
        path: path.to_string(),
        token: format!("opaquelocktoken:{path}"),
        owner: owner.to_string(),
        comment: None,
        is_dav_comment: false,
        created: "2024-04-01T08:00:00.000000Z".into(),
        expires: None,
    }
}

#[test]
fn lock_batch_reports_each_path_and_succeeds_overall() {
    let repo = repo();
    repo.lock()
        .unwrap()
        .locks
        .insert("b.txt".into(), held_lock("b.txt", "bob"));
    let mut session = open(&repo, ROOT);

    let targets = [
        LockTarget::new("a.txt"),
        LockTarget::new("/b.txt"),
        LockTarget::new("c.txt").with_current_rev(10),
    ];
    let mut seen = Vec::new();
    run_async(session.lock(
        &LockManyOptions::new().with_comment("editing"),
        &targets,
        |path, is_lock, lock, err| {
            assert!(is_lock);
            seen.push((
                path.to_string(),
                lock.map(|l| l.owner.clone()),
                err.and_then(|e| e.server_error()).and_then(|e| e.code()),
            ));
        },
    ))
    .unwrap();

    assert_eq!(
        seen,
        vec![
            ("a.txt".to_string(), Some("alice".to_string()), None),
            (
                "b.txt".to_string(),
                None,
                Some(SVN_ERR_FS_PATH_ALREADY_LOCKED)
            ),
            ("c.txt".to_string(), Some("alice".to_string()), None),
        ]
    );

    let lock = run_async(session.get_lock("a.txt")).unwrap().unwrap();
    assert_eq!(lock.comment.as_deref(), Some("editing"));
    assert_eq!(run_async(session.get_locks("")).unwrap().len(), 3);
    assert_eq!(run_async(session.get_lock("d.txt")).unwrap(), None);

    let mut outcomes = Vec::new();
    run_async(session.unlock(
        &UnlockManyOptions::new(),
        &[
            UnlockTarget::new("a.txt").with_token(lock.token.clone()),
            UnlockTarget::new("b.txt").with_token("opaquelocktoken:wrong"),
        ],
        |path, is_lock, lock, err| {
            assert!(!is_lock && lock.is_none());
            outcomes.push((path.to_string(), err.is_some()));
        },
    ))
    .unwrap();
    assert_eq!(
        outcomes,
        vec![("a.txt".to_string(), false), ("b.txt".to_string(), true)]
    );
}

#[test]
fn lock_rejects_duplicate_targets_and_skips_empty_batches() {
    let repo = repo();
    let mut session = open(&repo, ROOT);

    let err = run_async(session.lock(
        &LockManyOptions::new(),
        &[LockTarget::new("a.txt"), LockTarget::new("./a.txt")],
        |_, _, _, _| panic!("no notification expected"),
    ))
    .unwrap_err();
    assert!(matches!(err, SvnError::InvalidPath(_)));

    run_async(session.lock(&LockManyOptions::new(), &[], |_, _, _, _| {
        panic!("no notification expected")
    }))
    .unwrap();
    assert!(repo.lock().unwrap().locks.is_empty());
}

#[test]
fn reporter_rejects_calls_after_finish() {
    let repo = repo();
    repo.lock().unwrap().update_edit = add_file_edit(11, "hello.txt", b"hello world\n");
    let mut session = open(&repo, ROOT);
    let mut collector = ContentCollector::new();

    run_async(async {
        let mut reporter = session
            .do_update(
                UpdateOptions::new("", Depth::Infinity).with_rev(11),
                &mut collector,
            )
            .await
            .unwrap();
        reporter.set_path("", 10, false, None).unwrap();
        reporter.delete_path("old.txt").unwrap();
        reporter.finish().await.unwrap();
        assert_eq!(reporter.state(), ReporterState::Finished);

        let err = reporter.set_path("", 10, false, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolState);
        let err = reporter.finish().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolState);
        assert!(reporter.abort().is_err());
    });

    assert_eq!(collector.contents("hello.txt"), Some(&b"hello world\n"[..]));
    assert_eq!(collector.target_revision(), Some(11));
    assert!(collector.is_closed());

    let repo = repo.lock().unwrap();
    let report = &repo.reports[0];
    assert!(matches!(
        &report.commands[0],
        ReportCommand::SetPath { path, rev: 10, depth: Depth::Infinity, .. } if path.is_empty()
    ));
    assert_eq!(report.commands.last(), Some(&ReportCommand::FinishReport));
}

#[test]
fn reporter_abort_and_drop_free_the_session() {
    let repo = repo();
    let mut session = open(&repo, ROOT);
    let mut events = Events::default();

    run_async(async {
        let mut reporter = session
            .do_update(UpdateOptions::recursive("trunk", true), &mut events)
            .await
            .unwrap();
        reporter.set_path("", 3, true, Some("token")).unwrap();
        reporter.abort().unwrap();
        reporter.abort().unwrap();
        assert_eq!(reporter.state(), ReporterState::Aborted);
        assert!(reporter.set_path("", 3, true, None).is_err());
        assert!(reporter.report().is_terminated());
    });
    assert_eq!(session.in_flight(), None);

    run_async(async {
        let mut reporter = session
            .do_update(UpdateOptions::recursive("", true), &mut events)
            .await
            .unwrap();
        let err = reporter.set_path("../up", 1, false, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(reporter.state(), ReporterState::Aborted);
    });

    run_async(async {
        let mut reporter = session
            .do_update(UpdateOptions::recursive("", true), &mut events)
            .await
            .unwrap();
        reporter.set_path("", 1, false, None).unwrap();
    });
    assert_eq!(session.in_flight(), None);
    assert!(events.0.is_empty());
    assert!(repo.lock().unwrap().reports.is_empty());
    assert_eq!(session.scopes().live(), 1);
}

#[test]
fn unterminated_update_edit_aborts_consumer() {
    let repo = repo();
    let mut edit = add_file_edit(11, "hello.txt", b"hi");
    assert_eq!(edit.pop(), Some(EditorEvent::CloseEdit));
    repo.lock().unwrap().update_edit = edit;
    let mut session = open(&repo, ROOT);
    let mut collector = ContentCollector::new();

    let err = run_async(async {
        let mut reporter = session
            .do_update(UpdateOptions::recursive("", true), &mut collector)
            .await
            .unwrap();
        reporter.set_path("", 10, false, None).unwrap();
        let err = reporter.finish().await.unwrap_err();
        assert_eq!(reporter.state(), ReporterState::Aborted);
        err
    });
    assert_eq!(err.kind(), ErrorKind::MalformedData);
    assert!(collector.is_aborted());
    assert_eq!(session.scopes().live(), 1);
}

#[test]
fn switch_must_stay_in_repository() {
    let repo = repo();
    repo.lock().unwrap().update_edit = add_file_edit(4, "b.txt", b"branch");
    let mut session = open(&repo, "svn://example.com/repo/trunk");
    let mut events = Events::default();

    let err = run_async(session.do_switch(
        SwitchOptions::new("", "svn://example.com/other/branch", Depth::Infinity),
        &mut events,
    ))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(session.in_flight(), None);

    run_async(async {
        let mut reporter = session
            .do_switch(
                SwitchOptions::new("", "svn://example.com/repo/branches/b1/", Depth::Infinity)
                    .with_rev(4),
                &mut events,
            )
            .await
            .unwrap();
        reporter.set_path("", 3, false, None).unwrap();
        reporter.finish().await.unwrap();
    });
    assert_eq!(
        repo.lock().unwrap().switched_to,
        vec!["svn://example.com:3690/repo/branches/b1".to_string()]
    );
    assert_eq!(events.0.last(), Some(&EditorEvent::CloseEdit));
}

#[test]
fn replay_validates_and_forwards_the_edit() {
    let repo = repo();
    repo.lock()
        .unwrap()
        .replays
        .insert(5, add_file_edit(5, "a.txt", b"alpha"));
    let mut session = open(&repo, ROOT);

    let mut collector = ContentCollector::new();
    run_async(session.replay(&ReplayOptions::new(5).with_low_water_mark(1), &mut collector))
        .unwrap();
    assert_eq!(collector.contents("a.txt"), Some(&b"alpha"[..]));

    let mut collector = ContentCollector::new();
    let err = run_async(session.replay(
        &ReplayOptions::new(5).with_send_deltas(false),
        &mut collector,
    ))
    .unwrap_err();
    assert!(matches!(err, SvnError::Protocol(_)));
    assert!(collector.is_aborted());

    let mut events = Events::default();
    let err = run_async(session.replay(&ReplayOptions::new(6), &mut events)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert_eq!(events.0, vec![EditorEvent::AbortEdit]);
    assert_eq!(session.scopes().live(), 1);
}

#[test]
fn commit_callback_runs_exactly_once() {
    let repo = repo();
    repo.lock()
        .unwrap()
        .capabilities
        .insert("ephemeral-txnprops".into());
    let mut session = open(&repo, "svn://example.com/repo/trunk");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);

    let info = run_async(async {
        let mut editor = session
            .get_commit_editor(CommitOptions::new("Add notes"), move |info| {
                sink.lock().unwrap().push(info.clone());
            })
            .await
            .unwrap();
        assert!(editor.options().rev_props.contains_key(SVN_PROP_TXN_USER_AGENT));
        let root = editor.open_root(Some(10)).unwrap();
        let dir = editor.add_directory(root, "docs", None).unwrap();
        editor
            .change_dir_prop(dir, "svn:ignore", Some(&b"*.tmp\n"[..]))
            .unwrap();
        let file = editor.add_file(dir, "docs/notes.txt", None).unwrap();
        let md5 = editor.send_contents(file, None, b"notes\n").unwrap();
        editor.close_file(file, Some(md5.as_str())).unwrap();
        editor.close_directory(dir).unwrap();
        editor.close_directory(root).unwrap();
        editor.close_edit().await.unwrap()
    });

    assert_eq!(info.new_rev, 11);
    assert_eq!(info.author.as_deref(), Some("alice"));
    assert_eq!(*calls.lock().unwrap(), vec![info]);
    assert_eq!(session.in_flight(), None);
    assert_eq!(session.scopes().live(), 1);

    let repo = repo.lock().unwrap();
    let (options, events) = &repo.commits[0];
    assert_eq!(
        options.rev_props.get(SVN_PROP_TXN_USER_AGENT).map(Vec::as_slice),
        Some(&b"svn-ra-tests/1.0"[..])
    );
    assert_eq!(events.last(), Some(&EditorEvent::CloseEdit));
}

#[test]
fn commit_custom_revprops_need_capability() {
    let repo = repo();
    let mut session = open(&repo, ROOT);

    let err = run_async(session.get_commit_editor(
        CommitOptions::new("msg").with_rev_prop("release:name", "v1"),
        |_| panic!("commit must not happen"),
    ))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);
    assert_eq!(session.in_flight(), None);

    repo.lock()
        .unwrap()
        .capabilities
        .insert("commit-revprops".into());
    let opened = run_async(session.get_commit_editor(
        CommitOptions::new("msg").with_rev_prop("release:name", "v1"),
        |_| panic!("commit must not happen"),
    ));
    assert!(opened.is_ok());
}

#[test]
fn abandoned_commit_frees_the_session() {
    let repo = repo();
    let mut session = open(&repo, ROOT);
    let called = Arc::new(Mutex::new(0));

    run_async(async {
        let counter = Arc::clone(&called);
        let mut editor = session
            .get_commit_editor(CommitOptions::new("dropped"), move |_| {
                *counter.lock().unwrap() += 1;
            })
            .await
            .unwrap();
        let root = editor.open_root(Some(10)).unwrap();
        editor.add_file(root, "x", None).unwrap();
    });
    assert_eq!(session.in_flight(), None);

    run_async(async {
        let mut editor = session
            .get_commit_editor(CommitOptions::new("aborted"), |_| {})
            .await
            .unwrap();
        let root = editor.open_root(Some(10)).unwrap();
        let err = editor.close_directory(root).and_then(|_| editor.close_directory(root));
        assert_eq!(err.unwrap_err().kind(), ErrorKind::ProtocolState);
        editor.abort_edit().unwrap();
    });

    let err = run_async(async {
        let mut editor = session
            .get_commit_editor(CommitOptions::new("unclosed"), |_| {})
            .await
            .unwrap();
        let root = editor.open_root(Some(10)).unwrap();
        editor.add_directory(root, "d", None).unwrap();
        editor.close_edit().await.unwrap_err()
    });
    assert_eq!(err.kind(), ErrorKind::ProtocolState);

    assert_eq!(*called.lock().unwrap(), 0);
    assert!(repo.lock().unwrap().commits.is_empty());
    assert_eq!(session.in_flight(), None);
    assert_eq!(session.scopes().live(), 1);
}

#[test]
fn reparent_stays_within_repository_root() {
    let repo = repo();
    let mut session = open(&repo, "svn://example.com/repo/trunk");
    assert_eq!(
        session.to_string(),
        "RemoteAccess(svn://example.com:3690/repo/trunk)"
    );

    run_async(session.reparent("svn://example.com/repo/branches/b1")).unwrap();
    assert_eq!(session.url().path, "/repo/branches/b1");

    for outside in [
        "svn://example.com/other",
        "svn://example.com:3691/repo/trunk",
        "svn://elsewhere.example.com/repo",
    ] {
        let err = run_async(session.reparent(outside)).unwrap_err();
        assert!(matches!(err, SvnError::InvalidUrl(_)), "{outside}: {err}");
    }
    assert_eq!(session.url().path, "/repo/branches/b1");
    assert_eq!(
        run_async(session.get_repos_root()).unwrap().url,
        "svn://example.com:3690/repo"
    );
    assert_eq!(
        repo.lock().unwrap().reparented_to,
        vec!["svn://example.com:3690/repo/branches/b1".to_string()]
    );
}

#[test]
fn dropped_operation_blocks_until_reconnect() {
    let repo = repo();
    let mut session = open(&repo, ROOT);
    repo.lock().unwrap().hang_next = true;

    {
        let mut pending = Box::pin(session.get_uuid());
        let mut cx = Context::from_waker(Waker::noop());
        assert!(pending.as_mut().poll(&mut cx).is_pending());
    }
    assert_eq!(session.in_flight(), Some("get-uuid"));
    assert_eq!(session.scopes().live(), 1);

    let err = run_async(session.get_latest_revnum()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolState);

    run_async(session.reconnect()).unwrap();
    assert_eq!(run_async(session.get_uuid()).unwrap(), UUID);
    assert_eq!(run_async(session.get_latest_revnum()).unwrap(), 10);
    assert_eq!(repo.lock().unwrap().connects, 2);
}

fn file_history() -> Vec<FileRev> {
    let rev = |rev: u64, delta: Option<Vec<TextDeltaWindow>>| FileRev {
        path: "/trunk/a.txt".into(),
        rev,
        rev_props: BTreeMap::new(),
        prop_deltas: Vec::new(),
        merged_revision: false,
        delta,
    };
    let append = TextDeltaWindow {
        sview_offset: 0,
        sview_len: 4,
        tview_len: 8,
        ops: vec![DeltaOp::source(0, 4), DeltaOp::new_data(0, 4)],
        new_data: b"two\n".to_vec(),
    };
    let mut props_only = rev(6, None);
    props_only.prop_deltas.push(PropDelta {
        name: "svn:eol-style".into(),
        value: Some(b"native".to_vec()),
    });
    vec![
        rev(2, Some(vec![TextDeltaWindow::insertion(b"one\n")])),
        rev(4, Some(vec![append])),
        props_only,
    ]
}

#[test]
fn file_revs_reconstruct_each_revision() {
    let repo = repo();
    repo.lock()
        .unwrap()
        .file_revs
        .insert("trunk/a.txt".into(), file_history());
    let mut session = open(&repo, "svn://example.com/repo/trunk");

    let mut texts = Vec::new();
    let delivered = run_async(session.get_file_revs_contents("a.txt", 1, 10, |rev| {
        texts.push((rev.file_rev.rev, rev.contents));
        Ok(())
    }))
    .unwrap();
    assert_eq!(delivered, 3);
    assert_eq!(
        texts,
        vec![
            (2, b"one\n".to_vec()),
            (4, b"one\ntwo\n".to_vec()),
            (6, b"one\ntwo\n".to_vec()),
        ]
    );

    let err = run_async(session.get_file_revs("a.txt", 10, 1, |_| Ok(()))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Repository);

    repo.lock()
        .unwrap()
        .capabilities
        .insert("get-file-revs-reverse".into());
    let mut order = Vec::new();
    run_async(session.get_file_revs("a.txt", 10, 1, |rev| {
        order.push(rev.rev);
        Ok(())
    }))
    .unwrap();
    assert_eq!(order, vec![6, 4, 2]);

    let err = run_async(session.get_file_revs("a.txt", 7, 9, |_| Ok(()))).unwrap_err();
    assert!(matches!(err, SvnError::Protocol(_)));

    let err = run_async(session.get_file_revs("a.txt", 1, 10, |_| {
        Err(SvnError::Transport("consumer gone".into()))
    }))
    .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.in_flight(), None);
}

#[test]
fn repository_queries_pass_through() {
    let repo = repo();
    {
        let mut repo = repo.lock().unwrap();
        repo.kinds.insert("trunk".into(), NodeKind::Dir);
        repo.kinds.insert("trunk/a.txt".into(), NodeKind::File);
        repo.locations.insert(
            "trunk/a.txt".into(),
            BTreeMap::from([
                (3, "/branches/old/a.txt".to_string()),
                (8, "/trunk/a.txt".to_string()),
            ]),
        );
        repo.rev_props.insert(
            7,
            BTreeMap::from([("svn:log".to_string(), b"seven".to_vec())]),
        );
    }
    let mut session = open(&repo, ROOT);

    assert_eq!(run_async(session.get_uuid()).unwrap(), UUID);
    assert_eq!(run_async(session.check_path("trunk", None)).unwrap(), NodeKind::Dir);
    assert_eq!(
        run_async(session.check_path("trunk/a.txt", Some(8))).unwrap(),
        NodeKind::File
    );
    assert_eq!(
        run_async(session.check_path("nope", None)).unwrap(),
        NodeKind::None
    );
    assert!(!run_async(session.has_capability("mergeinfo")).unwrap());

    let locations = run_async(session.get_locations("trunk/a.txt", 8, &[3, 5])).unwrap();
    assert_eq!(locations, BTreeMap::from([(3, "/branches/old/a.txt".to_string())]));

    run_async(session.change_rev_prop(7, "svn:log", Some(&b"fixed message"[..]))).unwrap();
    run_async(session.change_rev_prop(7, "svn:author", Some(&b"bob"[..]))).unwrap();
    run_async(session.change_rev_prop(7, "svn:author", None)).unwrap();
    let props = run_async(session.rev_proplist(7)).unwrap();
    assert_eq!(props.len(), 1);
    assert_eq!(props["svn:log"], b"fixed message".to_vec());
    assert_eq!(session.scopes().live(), 1);
    assert!(session.scopes().opened() > 1);
}

#[test]
fn open_reports_connection_and_auth_failures() {
    let repo = repo();
    repo.lock().unwrap().refuse_connect = true;
    let err = run_async(RaSession::open(
        support::connector(&repo),
        ROOT,
        SessionCallbacks::new(),
        AuthChain::new(),
        SessionConfig::new(),
    ))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    repo.lock().unwrap().refuse_connect = false;
    let auth = AuthChain::new().with_provider(SimplePrompt::new(0, |_, _| None));
    let err = run_async(RaSession::open(
        support::connector(&repo),
        ROOT,
        SessionCallbacks::new(),
        auth,
        SessionConfig::new(),
    ))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);

    let err = run_async(RaSession::open(
        support::connector(&repo),
        "ftp://example.com/repo",
        SessionCallbacks::new(),
        AuthChain::new(),
        SessionConfig::new(),
    ))
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn progress_reaches_the_caller() {
    let repo = repo();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    let mut session = run_async(RaSession::open(
        support::connector(&repo),
        ROOT,
        SessionCallbacks::new().with_progress(move |done, total| {
            sink.lock().unwrap().push((done, total));
        }),
        AuthChain::new(),
        SessionConfig::new(),
    ))
    .unwrap();

    run_async(async {
        let mut editor = session
            .get_commit_editor(CommitOptions::new("touch"), |_| {})
            .await
            .unwrap();
        let root = editor.open_root(Some(10)).unwrap();
        editor.change_dir_prop(root, "note", None).unwrap();
        editor.close_directory(root).unwrap();
        editor.close_edit().await.unwrap();
    });
    assert_eq!(*progress.lock().unwrap(), vec![(0, None), (4, Some(4))]);
}

#[test]
fn log_entries_carry_changed_paths() {
    let repo = repo();
    {
        let mut repo = repo.lock().unwrap();
        let mut paths = BTreeMap::new();
        paths.insert(
            "/branches/b1".to_string(),
            ChangedPath::new(ChangeAction::Add).with_copy_from("/trunk", 4),
        );
        repo.log[4].changed_paths = Some(paths);
    }
    let mut session = open(&repo, ROOT);
    let mut copied = None;
    run_async(session.get_log(
        &LogOptions::between(5, 5).with_changed_paths(),
        |entry| {
            copied = entry
                .changed_paths
                .as_ref()
                .and_then(|paths| paths.get("/branches/b1"))
                .and_then(|change| change.copy_from_rev);
            assert_eq!(entry.author.as_deref(), Some("alice"));
            ControlFlow::Continue(())
        },
    ))
    .unwrap();
    assert_eq!(copied, Some(4));
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn session_futures_are_send() {
    let repo = repo();
    let mut session = open(&repo, ROOT);
    let fut = session.get_latest_revnum();
    assert_send(&fut);
    drop(fut);
    let mut events = Events::default();
    let fut = session.do_update(UpdateOptions::recursive("", true), &mut events);
    assert_send(&fut);
}
