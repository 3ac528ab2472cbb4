//! In-memory row builders for unit tests.

use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use charter_db::models::{EntityType, Section, SectionType, Template};

pub fn template(is_editable: bool, is_default: bool, is_locked: bool) -> Template {
    Template {
        id: 42,
        name: "Access Control".to_owned(),
        template_type: None,
        entity_type: EntityType::Policy,
        outline: Json(Vec::new()),
        standard_ids: Vec::new(),
        customer_ids: Vec::new(),
        license_type_id: 1,
        is_published: false,
        is_editable,
        is_default,
        is_available: true,
        is_locked,
        llm_enabled: false,
        created_by: Uuid::nil(),
        updated_by: Uuid::nil(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// A section row with a deterministic external id derived from `id`.
pub fn section(id: i32, parent_id: Option<i32>) -> Section {
    Section {
        id,
        template_id: 42,
        section_id: ext(id),
        parent_id,
        title: format!("section {id}"),
        html_content: None,
        description: None,
        section_type: SectionType::Global,
        is_active: true,
        is_looped: false,
        created_by: Uuid::nil(),
        updated_by: Uuid::nil(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// External id used by [`section`] for row `id`.
pub fn ext(id: i32) -> Uuid {
    Uuid::from_u128(0xc0ffee_0000 + id as u128)
}
