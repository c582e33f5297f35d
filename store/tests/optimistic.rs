//! Integration tests for the optimistic snapshot: each mutation path is
//! exercised against a mock service, including every rollback rule.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use pomokan_client::{CredentialStore, Gateway};
use pomokan_store::TodoStore;
use pomokan_types::{ApiError, Credential, Status, Todo, TodoDraft, TodoId};
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn usable_jwt() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&serde_json::json!({ "exp": Utc::now().timestamp() + 3600 })).unwrap(),
    );
    format!("{header}.{payload}.sig")
}

fn store_for(server: &MockServer) -> TodoStore {
    let credentials = CredentialStore::in_memory();
    credentials.replace(Credential::new(usable_jwt(), "refresh"));
    TodoStore::new(Gateway::new(
        Url::parse(&server.uri()).unwrap(),
        credentials,
    ))
}

fn todo_json(id: Uuid, description: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "description": description,
        "due_date": null,
        "status": "to_do",
        "is_important": true,
        "is_urgent": false,
        "is_completed": false,
        "completed_at": null,
        "pomodoro_count": 0
    })
}

async fn mount_list(server: &MockServer, rows: &[serde_json::Value]) {
    Mock::given(method("GET"))
        .and(path("/todos/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows.to_vec()))
        .mount(server)
        .await;
}

fn descriptions(todos: &[Todo]) -> Vec<&str> {
    todos.iter().map(|todo| todo.description.as_str()).collect()
}

#[tokio::test]
async fn fetch_all_replaces_snapshot() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        &[todo_json(Uuid::new_v4(), "a"), todo_json(Uuid::new_v4(), "b")],
    )
    .await;

    let store = store_for(&server);
    assert!(store.snapshot().is_empty());

    store.fetch_all().await.unwrap();
    assert_eq!(descriptions(&store.snapshot()), vec!["a", "b"]);
}

#[tokio::test]
async fn create_appends_server_assigned_entity() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/todos/"))
        .respond_with(ResponseTemplate::new(201).set_body_json(todo_json(id, "fresh")))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let created = store.create(TodoDraft::new("fresh")).await.unwrap();

    assert_eq!(created.id, TodoId::new(id));
    assert_eq!(descriptions(&store.snapshot()), vec!["fresh"]);
}

#[tokio::test]
async fn create_failure_leaves_snapshot_untouched() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/todos/"))
        .respond_with(
            ResponseTemplate::new(422)
                .set_body_json(serde_json::json!({ "detail": "description required" })),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    let err = store.create(TodoDraft::new("")).await.unwrap_err();

    assert!(matches!(err, ApiError::Validation { .. }));
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn update_reconciles_with_canonical_row() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mount_list(&server, &[todo_json(id, "draft wording")]).await;

    // The server normalizes the description; the snapshot must end up with
    // the canonical version, not the optimistic one.
    let mut canonical = todo_json(id, "final wording");
    canonical["status"] = serde_json::json!("in_progress");
    Mock::given(method("PATCH"))
        .and(path(format!("/todos/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(canonical))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    let mut edited = store.snapshot()[0].clone();
    edited.description = "edited wording".to_string();
    edited.status = Status::InProgress;
    store.update(edited).await.unwrap();

    let snapshot = store.snapshot();
    assert_eq!(snapshot[0].description, "final wording");
    assert_eq!(snapshot[0].status, Status::InProgress);
}

#[tokio::test]
async fn update_applies_optimistically_before_confirmation() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mount_list(&server, &[todo_json(id, "before")]).await;

    Mock::given(method("PATCH"))
        .and(path(format!("/todos/{id}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(todo_json(id, "after"))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    let mut edited = store.snapshot()[0].clone();
    edited.description = "after".to_string();

    let mut changes = store.subscribe();
    let pending = store.update(edited);
    tokio::pin!(pending);

    // The optimistic mutation must be observable while the PATCH is still in
    // flight.
    tokio::select! {
        _ = &mut pending => panic!("update confirmed before the snapshot was observed"),
        changed = changes.changed() => {
            changed.unwrap();
            assert_eq!(changes.borrow()[0].description, "after");
        }
    }
    pending.await.unwrap();
}

#[tokio::test]
async fn failed_update_resynchronizes_snapshot() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mount_list(&server, &[todo_json(id, "server truth")]).await;

    Mock::given(method("PATCH"))
        .and(path(format!("/todos/{id}")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    let mut edited = store.snapshot()[0].clone();
    edited.description = "doomed edit".to_string();
    let err = store.update(edited).await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status: 500, .. }));
    // Rollback is a full resync: the snapshot matches the server again.
    assert_eq!(descriptions(&store.snapshot()), vec!["server truth"]);
}

#[tokio::test]
async fn delete_confirms_when_row_already_absent() {
    let server = MockServer::start().await;
    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let rows: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| todo_json(*id, &format!("t{index}")))
        .collect();
    mount_list(&server, &rows).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/todos/{}", ids[1])))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(serde_json::json!({ "detail": "Todo not found" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    // Absent on the server counts as successfully deleted.
    store.delete(TodoId::new(ids[1])).await.unwrap();
    assert_eq!(descriptions(&store.snapshot()), vec!["t0", "t2"]);
}

#[tokio::test]
async fn deleting_twice_succeeds_both_times() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mount_list(&server, &[todo_json(id, "only")]).await;

    let calls = std::sync::atomic::AtomicU32::new(0);
    Mock::given(method("DELETE"))
        .and(path(format!("/todos/{id}")))
        .respond_with(move |_: &wiremock::Request| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                ResponseTemplate::new(204)
            } else {
                ResponseTemplate::new(404)
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    store.delete(TodoId::new(id)).await.unwrap();
    store.delete(TodoId::new(id)).await.unwrap();
    assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn failed_delete_restores_row_at_prior_position() {
    let server = MockServer::start().await;
    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let rows: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| todo_json(*id, &format!("t{index}")))
        .collect();
    mount_list(&server, &rows).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/todos/{}", ids[1])))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    let err = store.delete(TodoId::new(ids[1])).await.unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 500, .. }));
    assert_eq!(descriptions(&store.snapshot()), vec!["t0", "t1", "t2"]);
}

#[tokio::test]
async fn failed_batch_delete_restores_whole_snapshot() {
    let server = MockServer::start().await;
    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let rows: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| todo_json(*id, &format!("t{index}")))
        .collect();
    mount_list(&server, &rows).await;

    Mock::given(method("DELETE"))
        .and(path("/todos/delete-batch"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    let doomed: Vec<TodoId> = [ids[0], ids[2], ids[3]]
        .iter()
        .map(|id| TodoId::new(*id))
        .collect();
    let err = store.delete_many(&doomed).await.unwrap_err();

    assert!(matches!(err, ApiError::Http { status: 500, .. }));
    // All three reappear, not a subset.
    assert_eq!(descriptions(&store.snapshot()), vec!["t0", "t1", "t2", "t3"]);
}

#[tokio::test]
async fn batch_delete_removes_all_requested_rows() {
    let server = MockServer::start().await;
    let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let rows: Vec<_> = ids
        .iter()
        .enumerate()
        .map(|(index, id)| todo_json(*id, &format!("t{index}")))
        .collect();
    mount_list(&server, &rows).await;

    Mock::given(method("DELETE"))
        .and(path("/todos/delete-batch"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();

    store
        .delete_many(&[TodoId::new(ids[0]), TodoId::new(ids[2])])
        .await
        .unwrap();
    assert_eq!(descriptions(&store.snapshot()), vec!["t1"]);
}

#[tokio::test]
async fn increment_pomodoro_reconciles_count() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    mount_list(&server, &[todo_json(id, "deep work")]).await;

    let mut incremented = todo_json(id, "deep work");
    incremented["pomodoro_count"] = serde_json::json!(1);
    Mock::given(method("PUT"))
        .and(path(format!("/todos/{id}/increment-pomodoro")))
        .respond_with(ResponseTemplate::new(200).set_body_json(incremented))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    store.fetch_all().await.unwrap();
    assert_eq!(store.snapshot()[0].pomodoro_count, 0);

    let updated = store.increment_pomodoro(TodoId::new(id)).await.unwrap();
    assert_eq!(updated.pomodoro_count, 1);
    assert_eq!(store.snapshot()[0].pomodoro_count, 1);
}
