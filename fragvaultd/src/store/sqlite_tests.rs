use fragvault_core::Policy;

use super::*;

async fn make_store() -> SqliteFragmentStore {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = SqliteFragmentStore::from_pool(pool);
    store.init().await.unwrap();
    store
}

fn users_policy() -> PolicyPair {
    PolicyPair::new(Policy::Users, Policy::User("alice".into()))
}

#[tokio::test]
async fn create_and_fetch_fragment() {
    let store = make_store().await;
    let created = store
        .create_fragment("root/b/c.txt", &users_policy())
        .await
        .unwrap();

    let fetched = store.fragment_by_path("root/b/c.txt").await.unwrap().unwrap();
    assert_eq!(created, fetched);
    assert_eq!(fetched.depth, 3);
    assert!(fetched.is_directory());
    assert_eq!(fetched.policy.edit, Policy::User("alice".into()));
}

#[tokio::test]
async fn create_rejects_existing_path() {
    let store = make_store().await;
    store.create_fragment("root", &users_policy()).await.unwrap();
    let err = store
        .create_fragment("root", &users_policy())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PathConflict(path) if path == "root"));
}

#[tokio::test]
async fn append_version_numbers_sequences_and_moves_pointer() {
    let store = make_store().await;
    let fragment = store.create_fragment("root/a.txt", &users_policy()).await.unwrap();

    let first = store.append_version(fragment.id, Some(b"hello")).await.unwrap();
    let second = store.append_version(fragment.id, None).await.unwrap();
    let third = store.append_version(fragment.id, Some(b"again")).await.unwrap();

    assert_eq!(
        [first.sequence, second.sequence, third.sequence],
        [0, 1, 2]
    );
    let fetched = store.fragment_by_path("root/a.txt").await.unwrap().unwrap();
    assert_eq!(fetched.latest_version, Some(third.clone()));

    let versions = store.versions(fragment.id).await.unwrap();
    assert_eq!(versions, vec![first.clone(), second, third]);

    let digest = first.content_digest.unwrap();
    let content = store.load_content(&digest).await.unwrap();
    assert_eq!(content.as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn identical_content_is_stored_once() {
    let store = make_store().await;
    let a = store.create_fragment("root/a", &users_policy()).await.unwrap();
    let b = store.create_fragment("root/b", &users_policy()).await.unwrap();
    store.append_version(a.id, Some(b"same")).await.unwrap();
    store.append_version(b.id, Some(b"same")).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contents")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn append_to_missing_fragment_fails() {
    let store = make_store().await;
    let err = store.append_version(42, Some(b"x")).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingFragment(42)));
}

#[tokio::test]
async fn duplicate_sequence_is_rejected_by_schema() {
    let store = make_store().await;
    let fragment = store.create_fragment("root/a", &users_policy()).await.unwrap();
    store.append_version(fragment.id, None).await.unwrap();

    let result = sqlx::query(
        "INSERT INTO fragment_versions (fragment_id, sequence, content_digest) VALUES (?1, 0, NULL)",
    )
    .bind(fragment.id)
    .execute(store.pool())
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn prefix_query_returns_only_descendants() {
    let store = make_store().await;
    for path in ["root", "root/a.txt", "root/b", "root/b/c.txt", "rootless/x", "root_/y"] {
        store.create_fragment(path, &users_policy()).await.unwrap();
    }

    let paths: Vec<String> = store
        .query_by_prefix("root")
        .await
        .unwrap()
        .into_iter()
        .map(|fragment| fragment.path)
        .collect();
    assert_eq!(paths, vec!["root/a.txt", "root/b", "root/b/c.txt"]);
}

#[tokio::test]
async fn prefix_query_treats_like_wildcards_literally() {
    let store = make_store().await;
    for path in ["a%/x", "ab/x"] {
        store.create_fragment(path, &users_policy()).await.unwrap();
    }
    let found = store.query_by_prefix("a%").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, "a%/x");
}

#[tokio::test]
async fn path_query_includes_latest_version() {
    let store = make_store().await;
    let a = store.create_fragment("root/a.txt", &users_policy()).await.unwrap();
    store.create_fragment("root/b", &users_policy()).await.unwrap();
    store.append_version(a.id, Some(b"hello")).await.unwrap();

    let found = store
        .query_by_paths(&[
            "root/b".to_string(),
            "root/a.txt".to_string(),
            "root/missing".to_string(),
        ])
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].path, "root/a.txt");
    assert_eq!(found[0].latest_sequence(), Some(0));
    assert!(found[1].is_directory());

    assert!(store.query_by_paths(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn open_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("fragvault.sqlite3");

    let store = SqliteFragmentStore::open(&db_path).await.unwrap();
    store.create_fragment("root", &users_policy()).await.unwrap();
    drop(store);

    let reopened = SqliteFragmentStore::open(&db_path).await.unwrap();
    assert!(reopened.fragment_by_path("root").await.unwrap().is_some());
}
