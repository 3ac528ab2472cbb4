//! Integration tests for embedded migrations and pool helpers.

use charter_db::pool;
use charter_test_utils::{create_test_db, drop_test_db};

const EXPECTED_TABLES: &[&str] = &["template_sections", "templates"];

#[tokio::test]
async fn migrations_create_all_tables() {
    let (pool, db_name) = create_test_db().await;

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT tablename::text FROM pg_tables \
         WHERE schemaname = 'public' \
         ORDER BY tablename",
    )
    .fetch_all(&pool)
    .await
    .expect("should list tables");

    let user_tables: Vec<&str> = rows
        .iter()
        .map(|(name,)| name.as_str())
        .filter(|t| !t.starts_with("_sqlx"))
        .collect();
    assert_eq!(user_tables, EXPECTED_TABLES);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (pool, db_name) = create_test_db().await;

    // create_test_db already ran them once.
    pool::run_migrations(&pool)
        .await
        .expect("second migration run should succeed");

    let counts = pool::table_counts(&pool).await.expect("should count rows");
    assert_eq!(
        counts,
        vec![
            ("templates".to_owned(), 0),
            ("template_sections".to_owned(), 0),
        ]
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn section_type_is_constrained() {
    let (pool, db_name) = create_test_db().await;

    let result = sqlx::query(
        "INSERT INTO templates (name, license_type_id, created_by, updated_by) \
         VALUES ('t', 1, gen_random_uuid(), gen_random_uuid()) RETURNING id",
    )
    .execute(&pool)
    .await;
    assert!(result.is_ok());

    let bad = sqlx::query(
        "INSERT INTO template_sections \
             (template_id, section_id, title, section_type, created_by, updated_by) \
         SELECT id, gen_random_uuid(), 'x', 'CHAPTER', gen_random_uuid(), gen_random_uuid() \
         FROM templates",
    )
    .execute(&pool)
    .await;
    assert!(bad.is_err(), "unknown section type should be rejected");

    pool.close().await;
    drop_test_db(&db_name).await;
}
