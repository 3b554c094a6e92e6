//! End-to-end flows through a running session.

use futures::future::join_all;
use jam_core::{CommitResponse, CoreError, Diff, DiffOperation, PrimaryIdentifiers};
use jam_engine::{
    query_fn, AtomicTransport, EngineConfig, EngineError, EngineResult, FetchError,
    MockTransport, RequestId, Session, StoreEvent, SyncTransport, ViewOutcome, ViewRequest,
    ViewStatus, WriteIntent,
};
use jam_testkit::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

fn drain_events(rx: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn posts_view_loads_entities() {
    let session = Session::start(EngineConfig::default());
    let mut events = session.store().subscribe();

    let document = Document::from_value(json!({
        "data": [{ "type": "post", "id": "1", "attributes": { "title": "A" } }]
    }))
    .unwrap();
    let posts = query_fn(move |_props| {
        let document = document.clone();
        async move { Ok(Some(document)) }
    });
    let outcome = session
        .load_view(ViewRequest::new("feed").query("posts", posts))
        .await;
    assert!(outcome.is_loaded());

    let db = session.store().db();
    let post = db.get(&Identifier::new("post", "1")).unwrap();
    assert_eq!(post.attribute("title"), Some(&json!("A")));

    let view = session.store().view("feed").unwrap();
    assert_eq!(view.status, ViewStatus::Loaded);
    assert_eq!(
        view.result("posts"),
        Some(&PrimaryIdentifiers::Many(vec![Identifier::new("post", "1")]))
    );
    assert_eq!(view.meta.get("posts"), Some(&Default::default()));

    let events = drain_events(&mut events);
    assert_eq!(
        events.first(),
        Some(&StoreEvent::LoadViewRequest {
            name: "feed".into()
        })
    );
    let done = events
        .iter()
        .position(|e| matches!(e, StoreEvent::LoadJsonDone { .. }))
        .unwrap();
    let success = events
        .iter()
        .position(|e| matches!(e, StoreEvent::LoadViewSuccess { .. }))
        .unwrap();
    assert!(done < success);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn null_query_still_succeeds() {
    let session = Session::start(EngineConfig::default());
    let mut events = session.store().subscribe();

    let empty = query_fn(|_props| async { Ok(None) });
    let outcome = session
        .load_view(ViewRequest::new("feed").query("posts", empty))
        .await;

    let ViewOutcome::Loaded(view) = outcome else {
        panic!("expected loaded view");
    };
    assert_eq!(view.result("posts"), Some(&PrimaryIdentifiers::None));
    assert!(view.meta.is_empty());
    assert!(session.store().db().is_empty());
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, StoreEvent::LoadViewSuccess { .. })));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_view_keeps_previous_results() {
    let session = Session::start(EngineConfig::default());

    let first = query_fn(|_props| async { Ok(Some(collection(vec![post("1", "A")]))) });
    session
        .load_view(ViewRequest::new("feed").query("posts", first))
        .await;
    let before = session.store().view("feed").unwrap();

    let broken = query_fn(|_props| async {
        Err::<Option<Document>, FetchError>("503 Service Unavailable".into())
    });
    let outcome = session
        .load_view(ViewRequest::new("feed").query("posts", broken))
        .await;
    assert!(matches!(outcome, ViewOutcome::Failed(_)));

    let after = session.store().view("feed").unwrap();
    assert!(matches!(after.status, ViewStatus::Failed { .. }));
    assert_eq!(after.results, before.results);
    assert_eq!(after.meta, before.meta);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_document_fails_view_without_merging() {
    let session = Session::start(EngineConfig::default());

    let malformed = query_fn(|_props| async {
        Ok(Some(collection(vec![
            post("1", "A"),
            ResourceObject::new("post", ""),
        ])))
    });
    let outcome = session
        .load_view(ViewRequest::new("feed").query("posts", malformed))
        .await;

    assert!(matches!(outcome, ViewOutcome::Failed(_)));
    assert!(session.store().db().is_empty());

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn two_commits_sync_in_order() {
    let db = seeded_db(&[post("1", "A"), post("2", "B")]);
    let session = Session::with_db(EngineConfig::default(), db);
    let writes = session.serializer();

    writes.start_transaction("first").await.unwrap();
    let mut edited = session.store().db().as_ref().clone();
    edited
        .update(&Identifier::new("post", "1"), attrs(json!({ "title": "A2" })))
        .unwrap();
    let overlay = edited.overlay("first").unwrap().clone();
    writes.save_transaction("first", overlay).await.unwrap();
    writes.commit_transaction("first").await.unwrap();
    writes.commit().await.unwrap();

    writes.start_transaction("second").await.unwrap();
    let mut edited = session.store().db().as_ref().clone();
    edited
        .update(&Identifier::new("post", "2"), attrs(json!({ "title": "B2" })))
        .unwrap();
    let overlay = edited.overlay("second").unwrap().clone();
    writes.save_transaction("second", overlay).await.unwrap();
    writes.commit_transaction("second").await.unwrap();
    writes.commit().await.unwrap();

    let mut events = session.store().subscribe();
    let engine = session.sync_engine(MockTransport::new());
    let result = engine.sync().await.unwrap();
    assert_eq!(result.diffs, 2);

    let sent = engine.transport().received();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].operations.len(), 1);
    assert_eq!(sent[0].operations[0].identifier(), &Identifier::new("post", "1"));
    assert_eq!(sent[1].operations.len(), 1);
    assert_eq!(sent[1].operations[0].identifier(), &Identifier::new("post", "2"));
    assert!(sent[0].sequence < sent[1].sequence);

    let db = session.store().db();
    assert!(db.commit_diff().is_none());
    let synced = db.get_server(&Identifier::new("post", "2")).unwrap();
    assert_eq!(synced.attribute("title"), Some(&json!("B2")));

    let events = drain_events(&mut events);
    assert_eq!(events.first(), Some(&StoreEvent::SyncRequest));
    assert_eq!(events.last(), Some(&StoreEvent::SyncSuccess));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StoreEvent::PostCommitDiffDone { .. }))
            .count(),
        2
    );

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_sync_retries_same_diff() {
    let mut db = seeded_db(&[post("1", "A")]);
    db.update(&Identifier::new("post", "1"), attrs(json!({ "title": "A2" })))
        .unwrap();
    db.commit();
    let session = Session::with_db(EngineConfig::default(), db);

    let engine = session.sync_engine(MockTransport::new());
    engine.transport().fail_next(1);
    let pending = session.store().db().commit_diff().unwrap();

    assert!(engine.sync().await.is_err());
    assert_eq!(session.store().db().commit_diff(), Some(pending.clone()));

    engine.sync().await.unwrap();
    assert_eq!(engine.transport().received(), vec![pending]);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_reload_after_commit_survives_sync() {
    let mut db = seeded_db(&[ResourceObject::new("post", "1")
        .with_attributes(json!({ "title": "A", "body": "x" }))]);
    let id = Identifier::new("post", "1");
    db.update(&id, attrs(json!({ "title": "Z" }))).unwrap();
    db.commit();
    let session = Session::with_db(EngineConfig::default(), db);

    session
        .serializer()
        .load_json(vec![Document::single(
            ResourceObject::new("post", "1").with_attributes(json!({ "body": "y" })),
        )])
        .await
        .unwrap();
    let seen = session.store().db().get(&id).unwrap();
    assert_eq!(seen.attribute("title"), Some(&json!("Z")));
    assert_eq!(seen.attribute("body"), Some(&json!("y")));

    let engine = session.sync_engine(MockTransport::new());
    engine.sync().await.unwrap();

    let sent = engine.transport().received();
    match sent[0].operations.as_slice() {
        [DiffOperation::Update {
            attributes,
            relationships,
            ..
        }] => {
            assert_eq!(attributes, &attrs(json!({ "title": "Z" })));
            assert!(relationships.is_empty());
        }
        other => panic!("expected a single update, got {other:?}"),
    }
    let db = session.store().db();
    let synced = db.get_server(&id).unwrap();
    assert_eq!(synced.attribute("title"), Some(&json!("Z")));
    assert_eq!(synced.attribute("body"), Some(&json!("y")));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn unusable_atomic_results_fail_sync_without_retry() {
    let mut db = Db::new();
    db.create("post", attrs(json!({ "title": "Draft" })));
    db.commit();
    let session = Session::with_db(EngineConfig::default(), db);
    let pending = session.store().db().commit_diff().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let engine = session.sync_engine(AtomicTransport::new(move |_body: Value| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(json!({ "atomic:results": [{ "data": { "type": "post", "id": "" } }] })) }
    }));
    let mut events = session.store().subscribe();

    let err = engine.sync_with_retry().await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, StoreEvent::SyncFailure { .. })));
    assert_eq!(session.store().db().commit_diff(), Some(pending));

    session.shutdown().await.unwrap();
}

/// Acknowledges every diff under the wrong sequence number.
struct MisnumberedTransport;

impl SyncTransport for MisnumberedTransport {
    async fn commit(&self, diff: &Diff) -> EngineResult<CommitResponse> {
        Ok(CommitResponse {
            sequence: diff.sequence.as_u64() + 1,
            ..CommitResponse::acknowledge(diff)
        })
    }
}

#[tokio::test]
async fn misnumbered_response_fails_sync_and_keeps_diff() {
    let mut db = seeded_db(&[post("1", "A")]);
    db.update(&Identifier::new("post", "1"), attrs(json!({ "title": "A2" })))
        .unwrap();
    db.commit();
    let session = Session::with_db(EngineConfig::default(), db);
    let pending = session.store().db().commit_diff().unwrap();
    let mut events = session.store().subscribe();

    let engine = session.sync_engine(MisnumberedTransport);
    let err = engine.sync().await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::Core(CoreError::StaleDiff {
            expected: Some(1),
            actual: 2
        })
    ));
    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|e| matches!(e, StoreEvent::WriteFailed { .. })));
    assert!(matches!(events.last(), Some(StoreEvent::SyncFailure { .. })));
    assert_eq!(session.store().db().commit_diff(), Some(pending));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn created_resources_take_server_ids() {
    let mut db = seeded_db(&[user("7", "Ada")]);
    let draft = db.create("post", attrs(json!({ "title": "Draft" })));
    db.set_relationship(
        &draft,
        "author",
        jam_core::Relationship::ToOne(Some(Identifier::new("user", "7"))),
    )
    .unwrap();
    db.commit();
    let session = Session::with_db(EngineConfig::default(), db);

    let engine = session.sync_engine(MockTransport::new());
    engine.sync().await.unwrap();

    let db = session.store().db();
    assert!(db.get(&draft).is_none());
    let saved = db.get(&Identifier::new("post", "1")).unwrap();
    assert_eq!(saved.attribute("title"), Some(&json!("Draft")));
    assert!(saved.relationship("author").is_some());

    session.shutdown().await.unwrap();
}

fn mixed_intents() -> Vec<WriteIntent> {
    vec![
        WriteIntent::LoadJson {
            documents: vec![collection(vec![post("1", "A"), post("2", "B")])],
        },
        WriteIntent::StartTransaction {
            name: "edit".into(),
        },
        WriteIntent::LoadJson {
            documents: vec![collection(vec![post("1", "A-edit")])],
        },
        WriteIntent::StartTransaction {
            name: "edit".into(),
        },
        WriteIntent::LoadJson {
            documents: vec![Document::single(user("9", "Ada"))],
        },
        WriteIntent::CommitTransaction {
            name: "edit".into(),
        },
        WriteIntent::Commit,
        WriteIntent::LoadJson {
            documents: vec![collection(vec![post("2", "B-server")])],
        },
    ]
}

fn replay<'a>(intents: impl IntoIterator<Item = &'a WriteIntent>) -> (Db, Vec<bool>) {
    let mut db = Db::new();
    let mut outcomes = Vec::new();
    for intent in intents {
        let mut next = db.clone();
        match intent.apply(&mut next) {
            Ok(()) => {
                db = next;
                outcomes.push(true);
            }
            Err(_) => outcomes.push(false),
        }
    }
    (db, outcomes)
}

#[tokio::test]
async fn pipelined_writes_apply_in_dispatch_order() {
    let session = Session::start(EngineConfig::default().with_queue_capacity(4));
    let writes = session.serializer();
    let intents = mixed_intents();

    let mut acks = Vec::new();
    for intent in intents.clone() {
        acks.push(writes.dispatch(intent).await.unwrap());
    }
    let ids: Vec<_> = acks.iter().map(|ack| ack.request()).collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    let outcomes = join_all(acks.into_iter().map(|ack| ack.wait())).await;

    let (expected, expected_outcomes) = replay(&intents);
    let actual_outcomes: Vec<bool> = outcomes.iter().map(Result::is_ok).collect();
    assert_eq!(actual_outcomes, expected_outcomes);
    assert_eq!(session.store().db().as_ref(), &expected);

    session.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_match_arrival_order() {
    let session = Session::start(EngineConfig::default().with_queue_capacity(2));
    let mut events = session.store().subscribe();

    let tasks = mixed_intents().into_iter().map(|intent| {
        let writes = session.serializer().clone();
        tokio::spawn(async move {
            let ack = writes.dispatch(intent.clone()).await.unwrap();
            let request = ack.request();
            let applied = ack.wait().await.is_ok();
            (request, intent, applied)
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let by_request: HashMap<RequestId, (WriteIntent, bool)> = results
        .into_iter()
        .map(|(request, intent, applied)| (request, (intent, applied)))
        .collect();

    let arrival: Vec<RequestId> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            StoreEvent::SnapshotPublished { request, .. } => Some(request),
            StoreEvent::WriteFailed { request, .. } => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(arrival.len(), by_request.len());

    let (expected, expected_outcomes) = replay(arrival.iter().map(|r| &by_request[r].0));
    let actual_outcomes: Vec<bool> = arrival.iter().map(|r| by_request[r].1).collect();
    assert_eq!(actual_outcomes, expected_outcomes);
    assert_eq!(session.store().db().as_ref(), &expected);

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn views_loaded_concurrently_are_all_applied() {
    let session = Session::start(EngineConfig::default());

    let requests = (1..=5).map(|n| {
        let id = n.to_string();
        let fetch = query_fn(move |_props| {
            let id = id.clone();
            async move { Ok(Some(Document::single(post(&id, "T")))) }
        });
        ViewRequest::new(format!("view-{n}")).query("post", fetch)
    });
    let outcomes = join_all(requests.map(|request| session.load_view(request))).await;
    assert!(outcomes.iter().all(ViewOutcome::is_loaded));

    let db = session.store().db();
    assert_eq!(db.entities_of("post").len(), 5);
    assert_eq!(session.store().views().len(), 5);

    session.shutdown().await.unwrap();
}
