use crate::db::*;
use crate::types::Status;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_database_creation() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path();

    let db = Database::new(db_path).await.unwrap();

    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"work_items".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_reopen_keeps_rows_and_does_not_remigrate() {
    let temp_file = NamedTempFile::new().unwrap();

    {
        let db = Database::new(temp_file.path()).await.unwrap();
        db.insert_work_item("a.ts", "https://cdn.example.com/a.ts")
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::new(temp_file.path()).await.unwrap();
    let items = db.list_work_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "a.ts");

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1], "migration v1 should be recorded exactly once");

    db.close().await;
}

#[tokio::test]
async fn test_purge_all_drops_rows_and_recreates_table() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    for name in ["a.ts", "b.ts", "c.ts"] {
        db.insert_work_item(name, &format!("https://cdn.example.com/{}", name))
            .await
            .unwrap();
    }

    db.purge_all().await.unwrap();

    assert!(db.list_work_items().await.unwrap().is_empty());
    assert_eq!(db.status_counts().await.unwrap().total(), 0);

    // Table is usable again straight away
    let id = db
        .insert_work_item("d.ts", "https://cdn.example.com/d.ts")
        .await
        .unwrap();
    let item = db.get_work_item(id).await.unwrap().unwrap();
    assert_eq!(item.status, Status::New);

    db.close().await;
}
