//! Template service layer.
//!
//! Every structural operation follows the same shape: open a transaction,
//! ask the policy guard, mutate rows and the outline on the transaction's
//! connection, commit. Returning early with an error drops the transaction,
//! which rolls back everything written so far.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::info;
use uuid::Uuid;

use charter_db::models::{EntityType, OutlineNode, Section, Template, TemplateType};
use charter_db::queries::sections as section_queries;
use charter_db::queries::templates::{self as template_queries, NewTemplateRow};

use crate::clone::clone_sections;
use crate::error::{OrInternal, Result, TemplateError};
use crate::guard::{self, TemplateAction};
use crate::mutate::{self, NewSection, SectionPatch};
use crate::outline::{self, OutlineDrift};
use crate::scaffold::ScaffoldConfig;

/// Longest template name the `templates.name` column accepts.
pub const MAX_NAME_LEN: usize = 255;

/// Fields for a template created from the scaffold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    #[serde(default)]
    pub standard_ids: Vec<i32>,
    #[serde(default)]
    pub customer_ids: Vec<String>,
    pub license_type_id: i32,
    #[serde(default)]
    pub entity_type: EntityType,
}

/// Partial update of a template. `None` fields are left unchanged.
///
/// `outline` replaces the stored snapshot verbatim. `sections` is applied
/// with the same rules as [`update_sections`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub standard_ids: Option<Vec<i32>>,
    #[serde(default)]
    pub customer_ids: Option<Vec<String>>,
    #[serde(default)]
    pub license_type_id: Option<i32>,
    #[serde(default)]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub llm_enabled: Option<bool>,
    #[serde(default)]
    pub template_type: Option<TemplateType>,
    #[serde(default)]
    pub outline: Option<Vec<OutlineNode>>,
    #[serde(default)]
    pub sections: Vec<SectionPatch>,
}

impl TemplatePatch {
    fn apply(&self, template: &mut Template) {
        if let Some(name) = &self.name {
            template.name.clone_from(name);
        }
        if let Some(ids) = &self.standard_ids {
            template.standard_ids.clone_from(ids);
        }
        if let Some(ids) = &self.customer_ids {
            template.customer_ids.clone_from(ids);
        }
        if let Some(license) = self.license_type_id {
            template.license_type_id = license;
        }
        if let Some(published) = self.is_published {
            template.is_published = published;
        }
        if let Some(llm) = self.llm_enabled {
            template.llm_enabled = llm;
        }
        if let Some(kind) = self.template_type {
            template.template_type = Some(kind);
        }
        if let Some(outline) = &self.outline {
            template.outline = Json(outline.clone());
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TemplateError::Invalid("template name must not be empty".to_owned()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(TemplateError::Invalid(format!(
            "template name is longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

async fn reload<'e, E>(executor: E, id: i32) -> Result<Template>
where
    E: sqlx::PgExecutor<'e>,
{
    template_queries::get_template(executor, id)
        .await
        .or_internal("failed to load template")?
        .ok_or_else(|| TemplateError::template_not_found(id))
}

/// Create a template seeded with the scaffold sections.
///
/// The scaffold source's rows (in id order, minus the skipped leading
/// ones) are cloned into the new template and the outline is built from
/// the clones.
pub async fn create_template(
    pool: &PgPool,
    actor: Uuid,
    new: &NewTemplate,
    scaffold: &ScaffoldConfig,
) -> Result<Template> {
    validate_name(&new.name)?;

    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    let source = scaffold.resolve_source(&mut tx).await?;
    let rows = section_queries::list_sections_for_template(&mut *tx, source.id)
        .await
        .or_internal("failed to load scaffold sections")?;
    let picked = scaffold.select(rows);

    let mut template = template_queries::insert_template(
        &mut *tx,
        &NewTemplateRow {
            name: &new.name,
            template_type: Some(TemplateType::Word),
            entity_type: new.entity_type,
            standard_ids: &new.standard_ids,
            customer_ids: &new.customer_ids,
            license_type_id: new.license_type_id,
            is_published: false,
            is_editable: true,
            is_default: false,
            is_available: true,
            is_locked: false,
            llm_enabled: false,
            actor,
        },
    )
    .await
    .or_internal("failed to create template")?;

    let cloned = clone_sections(&mut tx, &picked, template.id, actor).await?;
    let forest = outline::build_outline(&cloned.sections);
    mutate::ensure_depth(outline::depth(&forest))?;
    template.outline = Json(forest);
    template_queries::save_outline(&mut *tx, template.id, &template.outline.0, actor)
        .await
        .or_internal("failed to save outline")?;

    let template = reload(&mut *tx, template.id).await?;
    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(
        template_id = template.id,
        source_template_id = source.id,
        sections = cloned.sections.len(),
        "template created"
    );
    Ok(template)
}

/// Copy a template and all of its sections under a new name.
///
/// The source must be editable or default. The copy is editable, not
/// default, not published, and available.
pub async fn clone_template(
    pool: &PgPool,
    actor: Uuid,
    source_template_id: i32,
    new_name: &str,
) -> Result<Template> {
    validate_name(new_name)?;

    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    let source = guard::authorize(&mut *tx, source_template_id, TemplateAction::Clone).await?;
    let rows = section_queries::list_sections_for_template(&mut *tx, source.id)
        .await
        .or_internal("failed to load sections")?;

    let template = template_queries::insert_template(
        &mut *tx,
        &NewTemplateRow {
            name: new_name,
            template_type: source.template_type,
            entity_type: source.entity_type,
            standard_ids: &source.standard_ids,
            customer_ids: &source.customer_ids,
            license_type_id: source.license_type_id,
            is_published: false,
            is_editable: true,
            is_default: false,
            is_available: true,
            is_locked: false,
            llm_enabled: source.llm_enabled,
            actor,
        },
    )
    .await
    .or_internal("failed to clone template")?;

    let cloned = clone_sections(&mut tx, &rows, template.id, actor).await?;
    let forest = outline::build_outline(&cloned.sections);
    mutate::ensure_depth(outline::depth(&forest))?;
    template_queries::save_outline(&mut *tx, template.id, &forest, actor)
        .await
        .or_internal("failed to save outline")?;

    let template = reload(&mut *tx, template.id).await?;
    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(
        template_id = template.id,
        source_template_id,
        sections = cloned.sections.len(),
        "template cloned"
    );
    Ok(template)
}

/// Insert one section and append it to the outline.
pub async fn create_section(
    pool: &PgPool,
    actor: Uuid,
    template_id: i32,
    new: NewSection,
) -> Result<Section> {
    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    let mut template =
        guard::authorize(&mut *tx, template_id, TemplateAction::EditStructure).await?;
    let section = mutate::insert_section(&mut tx, &mut template, &new, actor).await?;

    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(
        template_id,
        section_id = %section.section_id,
        parent_id = ?section.parent_id,
        "section created"
    );
    Ok(section)
}

/// Apply a batch of section patches. All or nothing.
///
/// Parent changes are written to the rows only. Use [`rebuild_outline`] to
/// bring the outline's nesting up to date.
pub async fn update_sections(
    pool: &PgPool,
    actor: Uuid,
    template_id: i32,
    patches: Vec<SectionPatch>,
) -> Result<Vec<Section>> {
    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    guard::authorize(&mut *tx, template_id, TemplateAction::EditStructure).await?;
    let updated = mutate::apply_section_patches(&mut tx, template_id, &patches, actor).await?;

    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(template_id, sections = updated.len(), "sections updated");
    Ok(updated)
}

/// Delete a section, all of its descendants, and its outline node.
/// Returns the template with the pruned outline.
pub async fn delete_section(pool: &PgPool, actor: Uuid, section_id: Uuid) -> Result<Template> {
    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    let target = section_queries::get_section_by_external_id(&mut *tx, section_id)
        .await
        .or_internal("failed to load section")?
        .ok_or_else(|| TemplateError::NotFound(format!("section {section_id}")))?;

    let mut template =
        guard::authorize(&mut *tx, target.template_id, TemplateAction::DeleteSection).await?;
    let deletion = mutate::delete_subtree(&mut tx, &mut template, &target, actor).await?;

    let template = reload(&mut *tx, template.id).await?;
    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(
        template_id = template.id,
        section_id = %section_id,
        removed = deletion.removed_ids.len(),
        pruned = deletion.pruned_nodes,
        "section deleted"
    );
    Ok(template)
}

pub async fn get_template(pool: &PgPool, id: i32) -> Result<Template> {
    reload(pool, id).await
}

/// Available templates, optionally of one entity type, in id order.
pub async fn list_templates(
    pool: &PgPool,
    entity_type: Option<EntityType>,
) -> Result<Vec<Template>> {
    template_queries::list_templates(pool, entity_type)
        .await
        .or_internal("failed to list templates")
}

/// Rows of a template in insertion order.
pub async fn list_sections(pool: &PgPool, template_id: i32) -> Result<Vec<Section>> {
    reload(pool, template_id).await?;
    section_queries::list_sections_for_template(pool, template_id)
        .await
        .or_internal("failed to list sections")
}

/// Update template fields and, optionally, a batch of sections in one
/// transaction.
pub async fn patch_template(
    pool: &PgPool,
    actor: Uuid,
    id: i32,
    patch: TemplatePatch,
) -> Result<Template> {
    if let Some(name) = &patch.name {
        validate_name(name)?;
    }
    if let Some(forest) = &patch.outline {
        mutate::ensure_depth(outline::depth(forest))?;
    }

    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    let mut template = guard::authorize(&mut *tx, id, TemplateAction::EditStructure).await?;
    patch.apply(&mut template);
    template_queries::update_template(&mut *tx, &template, actor)
        .await
        .or_internal("failed to update template")?;

    if !patch.sections.is_empty() {
        mutate::apply_section_patches(&mut tx, id, &patch.sections, actor).await?;
    }

    let template = reload(&mut *tx, id).await?;
    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(template_id = id, sections = patch.sections.len(), "template patched");
    Ok(template)
}

/// Delete a template together with all of its sections.
pub async fn delete_template(pool: &PgPool, id: i32) -> Result<()> {
    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    guard::authorize(&mut *tx, id, TemplateAction::DeleteTemplate).await?;
    let sections = section_queries::delete_sections_for_template(&mut *tx, id)
        .await
        .or_internal("failed to delete template")?;
    template_queries::delete_template(&mut *tx, id)
        .await
        .or_internal("failed to delete template")?;

    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(template_id = id, sections, "template deleted");
    Ok(())
}

/// Replace the stored outline with one derived from the rows.
pub async fn rebuild_outline(pool: &PgPool, actor: Uuid, id: i32) -> Result<Template> {
    let mut tx = pool.begin().await.or_internal("failed to begin transaction")?;

    let mut template = guard::authorize(&mut *tx, id, TemplateAction::EditStructure).await?;
    mutate::rebuild(&mut tx, &mut template, actor).await?;

    let template = reload(&mut *tx, id).await?;
    tx.commit().await.or_internal("failed to commit transaction")?;

    info!(template_id = id, "outline rebuilt");
    Ok(template)
}

/// Compare the stored outline with the rows without writing anything.
pub async fn check_outline(pool: &PgPool, id: i32) -> Result<OutlineDrift> {
    let template = reload(pool, id).await?;
    let rows = section_queries::list_sections_for_template(pool, id)
        .await
        .or_internal("failed to load sections")?;
    Ok(outline::diff_outline(&template.outline.0, &rows))
}
