//! Integration tests for `templates` queries.

use sqlx::types::Json;

use charter_db::models::{EntityType, OutlineNode, TemplateType};
use charter_db::queries::templates;
use charter_test_utils::{TEST_ACTOR, TemplateFlags, create_test_db, drop_test_db, seed_template};

#[tokio::test]
async fn outline_round_trips_through_jsonb() {
    let (pool, db_name) = create_test_db().await;
    let t = seed_template(&pool, "Outline", TemplateFlags::EDITABLE).await;
    assert!(t.outline.0.is_empty());

    let mut root = OutlineNode::leaf(uuid::Uuid::new_v4(), 0, "0");
    root.children.push(OutlineNode::leaf(uuid::Uuid::new_v4(), 1, "0_0"));
    root.version = 2;
    let forest = vec![root];

    templates::save_outline(&pool, t.id, &forest, TEST_ACTOR).await.unwrap();
    let stored = templates::get_template(&pool, t.id).await.unwrap().unwrap();
    assert_eq!(stored.outline.0, forest);

    // Field names are part of the persisted contract.
    let (raw,): (serde_json::Value,) = sqlx::query_as("SELECT outline FROM templates WHERE id = $1")
        .bind(t.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(raw[0]["search_key"], "0");
    assert_eq!(raw[0]["children"][0]["level"], 1);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn save_outline_on_missing_template_fails() {
    let (pool, db_name) = create_test_db().await;

    let err = templates::save_outline(&pool, 9_999, &[], TEST_ACTOR)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn default_lookup_picks_lowest_id() {
    let (pool, db_name) = create_test_db().await;

    assert!(templates::find_default_template(&pool).await.unwrap().is_none());
    seed_template(&pool, "Custom", TemplateFlags::EDITABLE).await;
    let first = seed_template(&pool, "Default", TemplateFlags::DEFAULT).await;
    seed_template(&pool, "Second default", TemplateFlags::DEFAULT).await;

    let found = templates::find_default_template(&pool).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);

    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_and_list_templates() {
    let (pool, db_name) = create_test_db().await;
    let mut t = seed_template(&pool, "Before", TemplateFlags::EDITABLE).await;

    t.name = "After".to_owned();
    t.template_type = Some(TemplateType::Excel);
    t.customer_ids = vec!["acme".to_owned()];
    t.outline = Json(vec![OutlineNode::leaf(uuid::Uuid::new_v4(), 0, "0")]);
    let saved = templates::update_template(&pool, &t, TEST_ACTOR).await.unwrap();
    assert_eq!(saved.name, "After");
    assert_eq!(saved.template_type, Some(TemplateType::Excel));
    assert_eq!(saved.customer_ids, vec!["acme".to_owned()]);
    assert_eq!(saved.outline.0.len(), 1);

    let policies = templates::list_templates(&pool, Some(EntityType::Policy)).await.unwrap();
    assert_eq!(policies.len(), 1);
    let assessments = templates::list_templates(&pool, Some(EntityType::Assessment))
        .await
        .unwrap();
    assert!(assessments.is_empty());

    templates::touch_template(&pool, t.id, TEST_ACTOR).await.unwrap();
    assert_eq!(templates::delete_template(&pool, t.id).await.unwrap(), 1);
    assert!(templates::get_template(&pool, t.id).await.unwrap().is_none());

    drop_test_db(&db_name).await;
}
