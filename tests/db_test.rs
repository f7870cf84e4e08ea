// Tests for the chat store

use chatkeep::db::{ChatRecord, Database, FileEntry, Message, Role, Snapshot};
use chatkeep::store::{ChatStore, SqliteStore, StoreError};
use tempfile::TempDir;

fn create_test_store() -> (SqliteStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("history.db");
    let db = Database::open(db_path).into_option().unwrap();
    (SqliteStore::new(db), temp_dir)
}

fn transcript() -> Vec<Message> {
    vec![
        Message::new(Role::User, "Build a todo app"),
        Message::new(Role::Assistant, "Here is the plan"),
        Message::new(Role::User, "Add dark mode"),
    ]
}

#[tokio::test]
async fn test_database_initialization() {
    let (store, _temp) = create_test_store();
    assert!(store.db().path().contains("history.db"));
    assert_eq!(store.db().schema_version().await.unwrap(), 2);
    assert!(store.db().health_check().await);
}

#[tokio::test]
async fn test_unusable_path_is_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();

    let opened = Database::open(blocker.join("history.db"));
    assert!(opened.into_option().is_none());
}

#[tokio::test]
async fn test_ids_increase_from_one() {
    let (store, _temp) = create_test_store();

    assert_eq!(store.next_id().await.unwrap(), "1");

    let mut url_ids = Vec::new();
    for n in 0..3 {
        url_ids.push(
            store
                .create_from_messages(&format!("chat {}", n), transcript(), None)
                .await
                .unwrap(),
        );
    }

    assert_eq!(url_ids, vec!["1", "2", "3"]);
    assert_eq!(store.next_id().await.unwrap(), "4");
    assert_eq!(store.get("2").await.unwrap().unwrap().description.as_deref(), Some("chat 1"));
}

#[tokio::test]
async fn test_next_id_ignores_non_numeric_ids() {
    let (store, _temp) = create_test_store();
    store.put(&ChatRecord::new("7", transcript())).await.unwrap();
    store.put(&ChatRecord::new("draft", transcript())).await.unwrap();

    assert_eq!(store.next_id().await.unwrap(), "8");
}

#[tokio::test]
async fn test_next_id_at_numeric_limit() {
    let (store, _temp) = create_test_store();
    store
        .put(&ChatRecord::new(u64::MAX.to_string(), transcript()))
        .await
        .unwrap();

    let result = store.next_id().await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));

    let created = store.create_from_messages("overflow", transcript(), None).await;
    assert!(created.is_err());
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_next_url_id_takes_smallest_free_suffix() {
    let (store, _temp) = create_test_store();
    for (id, url_id) in [("1", "todo"), ("2", "todo-2"), ("3", "todo-4")] {
        store
            .put(&ChatRecord::new(id, transcript()).with_url_id(url_id))
            .await
            .unwrap();
    }

    assert_eq!(store.next_url_id("todo").await.unwrap(), "todo-3");
    assert_eq!(store.next_url_id("blog").await.unwrap(), "blog");
}

#[tokio::test]
async fn test_url_id_collision_is_conflict() {
    let (store, _temp) = create_test_store();
    store
        .put(&ChatRecord::new("1", transcript()).with_url_id("todo"))
        .await
        .unwrap();

    let result = store
        .put(&ChatRecord::new("2", transcript()).with_url_id("todo"))
        .await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert!(store.get("2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_timestamp_rejected() {
    let (store, _temp) = create_test_store();

    let mut record = ChatRecord::new("1", transcript());
    record.timestamp = "not-a-date".to_string();
    let result = store.put(&record).await;
    assert!(matches!(result, Err(StoreError::InvalidTimestamp(_))));
    assert!(store.get("1").await.unwrap().is_none());

    // An existing record is left untouched
    let original = ChatRecord::new("1", transcript()).with_description("original");
    store.put(&original).await.unwrap();
    let mut update = original.clone().with_description("changed");
    update.timestamp = "not-a-date".to_string();
    assert!(store.put(&update).await.is_err());
    assert_eq!(store.get("1").await.unwrap().unwrap(), original);
}

#[tokio::test]
async fn test_put_preserves_message_order_and_annotations() {
    let (store, _temp) = create_test_store();
    let messages = vec![
        Message::new(Role::User, "first"),
        Message::new(Role::Assistant, "second")
            .with_annotation(serde_json::json!({"type": "chatSummary", "summary": "short"})),
        Message::new(Role::User, "third"),
    ];
    store.put(&ChatRecord::new("1", messages.clone())).await.unwrap();

    let stored = store.get("1").await.unwrap().unwrap();
    assert_eq!(stored.messages, messages);
}

#[tokio::test]
async fn test_resolve_by_url_id() {
    let (store, _temp) = create_test_store();
    store
        .put(&ChatRecord::new("5", transcript()).with_url_id("todo-app"))
        .await
        .unwrap();

    assert_eq!(store.resolve("todo-app").await.unwrap().unwrap().id, "5");
    assert_eq!(store.resolve("5").await.unwrap().unwrap().id, "5");
    assert!(store.resolve("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_cascades_to_snapshot() {
    let (store, _temp) = create_test_store();
    let url_id = store.create_from_messages("todo", transcript(), None).await.unwrap();
    let chat = store.resolve(&url_id).await.unwrap().unwrap();

    let mut snapshot = Snapshot {
        chat_index: chat.messages[2].id.clone(),
        ..Snapshot::default()
    };
    snapshot
        .files
        .insert("/home/project/index.html".to_string(), FileEntry::text("<html/>"));
    store.put_snapshot(&chat.id, &snapshot).await.unwrap();
    assert_eq!(store.get_snapshot(&chat.id).await.unwrap(), Some(snapshot));

    store.delete_by_id(&chat.id).await.unwrap();
    assert!(store.get(&chat.id).await.unwrap().is_none());
    assert!(store.get_snapshot(&chat.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_without_snapshot() {
    let (store, _temp) = create_test_store();
    store.put(&ChatRecord::new("1", transcript())).await.unwrap();

    store.delete_by_id("1").await.unwrap();
    store.delete_snapshot("1").await.unwrap();
    assert!(store.get("1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_fork_at_message() {
    let (store, _temp) = create_test_store();
    let messages = transcript();
    store
        .put(&ChatRecord::new("1", messages.clone()).with_url_id("1").with_description("Todo"))
        .await
        .unwrap();

    let url_id = store.fork_at("1", &messages[1].id).await.unwrap();
    let fork = store.resolve(&url_id).await.unwrap().unwrap();

    assert_eq!(fork.messages, messages[..2].to_vec());
    assert_eq!(fork.description.as_deref(), Some("Todo (fork)"));
    assert_ne!(fork.id, "1");
}

#[tokio::test]
async fn test_fork_at_unknown_message_changes_nothing() {
    let (store, _temp) = create_test_store();
    store
        .put(&ChatRecord::new("1", transcript()).with_description("Todo"))
        .await
        .unwrap();

    let result = store.fork_at("1", "no-such-message").await;
    assert!(matches!(result, Err(StoreError::MessageNotFound(_))));
    assert_eq!(store.get_all().await.unwrap().len(), 1);

    let missing = store.fork_at("99", "x").await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_duplicate() {
    let (store, _temp) = create_test_store();
    let messages = transcript();
    let url_id = store.create_from_messages("Todo", messages.clone(), None).await.unwrap();

    let copy_url = store.duplicate(&url_id).await.unwrap();
    assert_ne!(copy_url, url_id);

    let copy = store.resolve(&copy_url).await.unwrap().unwrap();
    assert_eq!(copy.messages, messages);
    assert_eq!(copy.description.as_deref(), Some("Todo (copy)"));
}

#[tokio::test]
async fn test_update_description_and_metadata() {
    let (store, _temp) = create_test_store();
    let record = ChatRecord::new("1", transcript()).with_description("Todo");
    store.put(&record).await.unwrap();

    let result = store.update_description("1", "   ").await;
    assert!(matches!(result, Err(StoreError::EmptyDescription)));

    store.update_description("1", "Todo v2").await.unwrap();
    let metadata = chatkeep::db::ChatMetadata {
        git_url: "https://example.com/repo.git".to_string(),
        git_branch: Some("main".to_string()),
        netlify_site_id: None,
    };
    store.update_metadata("1", Some(metadata.clone())).await.unwrap();

    let stored = store.get("1").await.unwrap().unwrap();
    assert_eq!(stored.description.as_deref(), Some("Todo v2"));
    assert_eq!(stored.metadata, Some(metadata));
    assert_eq!(stored.timestamp, record.timestamp);
}

#[tokio::test]
async fn test_get_all_newest_first() {
    let (store, _temp) = create_test_store();
    let mut old = ChatRecord::new("1", transcript());
    old.timestamp = "2024-01-01T00:00:00+00:00".to_string();
    let mut new = ChatRecord::new("2", transcript());
    new.timestamp = "2024-06-01T00:00:00+00:00".to_string();
    store.put(&old).await.unwrap();
    store.put(&new).await.unwrap();

    let ids: Vec<String> = store.get_all().await.unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["2", "1"]);
}
