//! Database query functions for the `template_sections` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{Section, SectionType};

/// Column values for a new section row.
#[derive(Debug, Clone)]
pub struct NewSectionRow<'a> {
    pub template_id: i32,
    pub section_id: Uuid,
    pub parent_id: Option<i32>,
    pub title: &'a str,
    pub html_content: Option<&'a str>,
    pub description: Option<&'a str>,
    pub section_type: SectionType,
    pub is_active: bool,
    pub is_looped: bool,
    pub actor: Uuid,
}

/// Insert a section row. Returns the row with its generated `id`.
pub async fn insert_section<'e, E>(executor: E, row: &NewSectionRow<'_>) -> Result<Section>
where
    E: PgExecutor<'e>,
{
    let section = sqlx::query_as::<_, Section>(
        "INSERT INTO template_sections \
            (template_id, section_id, parent_id, title, html_content, description, \
             section_type, is_active, is_looped, created_by, updated_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
         RETURNING *",
    )
    .bind(row.template_id)
    .bind(row.section_id)
    .bind(row.parent_id)
    .bind(row.title)
    .bind(row.html_content)
    .bind(row.description)
    .bind(row.section_type)
    .bind(row.is_active)
    .bind(row.is_looped)
    .bind(row.actor)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert section {:?}", row.title))?;

    Ok(section)
}

/// Fetch a section by its row id.
pub async fn get_section<'e, E>(executor: E, id: i32) -> Result<Option<Section>>
where
    E: PgExecutor<'e>,
{
    let section = sqlx::query_as::<_, Section>("SELECT * FROM template_sections WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch section")?;

    Ok(section)
}

/// Fetch a section by its external id.
pub async fn get_section_by_external_id<'e, E>(
    executor: E,
    section_id: Uuid,
) -> Result<Option<Section>>
where
    E: PgExecutor<'e>,
{
    let section =
        sqlx::query_as::<_, Section>("SELECT * FROM template_sections WHERE section_id = $1")
            .bind(section_id)
            .fetch_optional(executor)
            .await
            .context("failed to fetch section by external id")?;

    Ok(section)
}

/// List every section of a template in insertion order.
pub async fn list_sections_for_template<'e, E>(
    executor: E,
    template_id: i32,
) -> Result<Vec<Section>>
where
    E: PgExecutor<'e>,
{
    let sections = sqlx::query_as::<_, Section>(
        "SELECT * FROM template_sections WHERE template_id = $1 ORDER BY id ASC",
    )
    .bind(template_id)
    .fetch_all(executor)
    .await
    .context("failed to list sections for template")?;

    Ok(sections)
}

/// Fetch the sections of a template whose ids are in `ids`, in id order.
/// Ids that do not exist (or belong to another template) are simply absent.
pub async fn get_sections_by_ids<'e, E>(
    executor: E,
    template_id: i32,
    ids: &[i32],
) -> Result<Vec<Section>>
where
    E: PgExecutor<'e>,
{
    let sections = sqlx::query_as::<_, Section>(
        "SELECT * FROM template_sections \
         WHERE template_id = $1 AND id = ANY($2) \
         ORDER BY id ASC",
    )
    .bind(template_id)
    .bind(ids)
    .fetch_all(executor)
    .await
    .context("failed to fetch sections by id")?;

    Ok(sections)
}

/// Write back the mutable columns of a section and stamp `updated_at`.
pub async fn update_section<'e, E>(executor: E, section: &Section, actor: Uuid) -> Result<Section>
where
    E: PgExecutor<'e>,
{
    let updated = sqlx::query_as::<_, Section>(
        "UPDATE template_sections \
         SET parent_id = $1, title = $2, html_content = $3, description = $4, \
             section_type = $5, is_active = $6, is_looped = $7, \
             updated_by = $8, updated_at = now() \
         WHERE id = $9 \
         RETURNING *",
    )
    .bind(section.parent_id)
    .bind(&section.title)
    .bind(&section.html_content)
    .bind(&section.description)
    .bind(section.section_type)
    .bind(section.is_active)
    .bind(section.is_looped)
    .bind(actor)
    .bind(section.id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to update section {}", section.id))?;

    updated.with_context(|| format!("section {} not found", section.id))
}

/// Delete a set of sections in one statement. Returns the number removed.
pub async fn delete_sections_by_ids<'e, E>(executor: E, ids: &[i32]) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM template_sections WHERE id = ANY($1)")
        .bind(ids)
        .execute(executor)
        .await
        .context("failed to delete sections")?;

    Ok(result.rows_affected())
}

/// Delete every section of a template. Returns the number removed.
pub async fn delete_sections_for_template<'e, E>(executor: E, template_id: i32) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM template_sections WHERE template_id = $1")
        .bind(template_id)
        .execute(executor)
        .await
        .context("failed to delete sections for template")?;

    Ok(result.rows_affected())
}

/// Count the sections of a template.
pub async fn count_sections<'e, E>(executor: E, template_id: i32) -> Result<i64>
where
    E: PgExecutor<'e>,
{
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM template_sections WHERE template_id = $1")
            .bind(template_id)
            .fetch_one(executor)
            .await
            .context("failed to count sections")?;

    Ok(row.0)
}
