//! Database query functions for the `templates` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{EntityType, OutlineNode, Template, TemplateType};

/// Column values for a new template row. The outline starts empty.
#[derive(Debug, Clone)]
pub struct NewTemplateRow<'a> {
    pub name: &'a str,
    pub template_type: Option<TemplateType>,
    pub entity_type: EntityType,
    pub standard_ids: &'a [i32],
    pub customer_ids: &'a [String],
    pub license_type_id: i32,
    pub is_published: bool,
    pub is_editable: bool,
    pub is_default: bool,
    pub is_available: bool,
    pub is_locked: bool,
    pub llm_enabled: bool,
    pub actor: Uuid,
}

/// Insert a template row. Returns the row with server-generated defaults.
pub async fn insert_template<'e, E>(executor: E, row: &NewTemplateRow<'_>) -> Result<Template>
where
    E: PgExecutor<'e>,
{
    let template = sqlx::query_as::<_, Template>(
        "INSERT INTO templates \
            (name, template_type, entity_type, standard_ids, customer_ids, license_type_id, \
             is_published, is_editable, is_default, is_available, is_locked, llm_enabled, \
             created_by, updated_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13) \
         RETURNING *",
    )
    .bind(row.name)
    .bind(row.template_type)
    .bind(row.entity_type)
    .bind(row.standard_ids)
    .bind(row.customer_ids)
    .bind(row.license_type_id)
    .bind(row.is_published)
    .bind(row.is_editable)
    .bind(row.is_default)
    .bind(row.is_available)
    .bind(row.is_locked)
    .bind(row.llm_enabled)
    .bind(row.actor)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert template {:?}", row.name))?;

    Ok(template)
}

/// Fetch a template by id.
pub async fn get_template<'e, E>(executor: E, id: i32) -> Result<Option<Template>>
where
    E: PgExecutor<'e>,
{
    let template = sqlx::query_as::<_, Template>("SELECT * FROM templates WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch template")?;

    Ok(template)
}

/// List available templates, optionally restricted to one entity type.
pub async fn list_templates<'e, E>(
    executor: E,
    entity_type: Option<EntityType>,
) -> Result<Vec<Template>>
where
    E: PgExecutor<'e>,
{
    let templates = sqlx::query_as::<_, Template>(
        "SELECT * FROM templates \
         WHERE is_available AND ($1::text IS NULL OR entity_type = $1) \
         ORDER BY id ASC",
    )
    .bind(entity_type)
    .fetch_all(executor)
    .await
    .context("failed to list templates")?;

    Ok(templates)
}

/// The lowest-id template flagged as default, if any.
pub async fn find_default_template<'e, E>(executor: E) -> Result<Option<Template>>
where
    E: PgExecutor<'e>,
{
    let template = sqlx::query_as::<_, Template>(
        "SELECT * FROM templates WHERE is_default ORDER BY id ASC LIMIT 1",
    )
    .fetch_optional(executor)
    .await
    .context("failed to look up default template")?;

    Ok(template)
}

/// Replace a template's outline snapshot and stamp the audit columns.
pub async fn save_outline<'e, E>(
    executor: E,
    id: i32,
    outline: &[OutlineNode],
    actor: Uuid,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE templates \
         SET outline = $1, updated_by = $2, updated_at = now() \
         WHERE id = $3",
    )
    .bind(Json(outline))
    .bind(actor)
    .bind(id)
    .execute(executor)
    .await
    .context("failed to save template outline")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("template {id} not found");
    }

    Ok(())
}

/// Stamp `updated_at` / `updated_by` without changing anything else.
pub async fn touch_template<'e, E>(executor: E, id: i32, actor: Uuid) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let result =
        sqlx::query("UPDATE templates SET updated_by = $1, updated_at = now() WHERE id = $2")
            .bind(actor)
            .bind(id)
            .execute(executor)
            .await
            .context("failed to touch template")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("template {id} not found");
    }

    Ok(())
}

/// Write back every mutable column of a template, including the outline.
pub async fn update_template<'e, E>(
    executor: E,
    template: &Template,
    actor: Uuid,
) -> Result<Template>
where
    E: PgExecutor<'e>,
{
    let updated = sqlx::query_as::<_, Template>(
        "UPDATE templates \
         SET name = $1, template_type = $2, outline = $3, standard_ids = $4, \
             customer_ids = $5, license_type_id = $6, is_published = $7, \
             llm_enabled = $8, updated_by = $9, updated_at = now() \
         WHERE id = $10 \
         RETURNING *",
    )
    .bind(&template.name)
    .bind(template.template_type)
    .bind(&template.outline)
    .bind(&template.standard_ids)
    .bind(&template.customer_ids)
    .bind(template.license_type_id)
    .bind(template.is_published)
    .bind(template.llm_enabled)
    .bind(actor)
    .bind(template.id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update template {}", template.id))?;

    updated.with_context(|| format!("template {} not found", template.id))
}

/// Delete a template row. Its sections must already be gone.
pub async fn delete_template<'e, E>(executor: E, id: i32) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM templates WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await
        .context("failed to delete template")?;

    Ok(result.rows_affected())
}
