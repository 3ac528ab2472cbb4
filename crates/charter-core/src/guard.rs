//! Template policy guard.
//!
//! Every mutating entry point asks [`authorize`] before it touches rows or
//! the outline. The decision itself lives in [`check`], a pure function over
//! the template's flags:
//!
//! ```text
//! action          refused when
//! edit-structure  locked | !editable
//! delete-section  locked | !editable | default
//! delete-template locked | !editable | default
//! clone           !editable && !default
//! ```

use sqlx::PgExecutor;

use charter_db::models::Template;
use charter_db::queries::templates as template_queries;

use crate::error::{OrInternal, Result, TemplateError};

/// What the caller intends to do with a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateAction {
    /// Insert, patch, or re-derive sections and the outline.
    EditStructure,
    /// Remove a section subtree.
    DeleteSection,
    /// Remove the template and all of its sections.
    DeleteTemplate,
    /// Use the template as the source of a clone.
    Clone,
}

/// Decide whether `action` is allowed on `template`.
pub fn check(template: &Template, action: TemplateAction) -> Result<()> {
    let id = template.id;

    if action == TemplateAction::Clone {
        if !template.is_editable && !template.is_default {
            return Err(TemplateError::Forbidden(format!(
                "template {id} cannot be cloned"
            )));
        }
        return Ok(());
    }

    if template.is_locked {
        return Err(TemplateError::Forbidden(format!("template {id} is locked")));
    }

    if template.is_default {
        match action {
            TemplateAction::DeleteSection => {
                return Err(TemplateError::Forbidden(format!(
                    "sections of default template {id} cannot be deleted"
                )));
            }
            TemplateAction::DeleteTemplate => {
                return Err(TemplateError::Forbidden(format!(
                    "default template {id} cannot be deleted"
                )));
            }
            TemplateAction::EditStructure | TemplateAction::Clone => {}
        }
    }

    if !template.is_editable {
        return Err(TemplateError::Forbidden(format!(
            "template {id} is not editable"
        )));
    }

    Ok(())
}

/// Load a template and run [`check`] against it.
///
/// Returns `NotFound` when the template does not exist.
pub async fn authorize<'e, E>(
    executor: E,
    template_id: i32,
    action: TemplateAction,
) -> Result<Template>
where
    E: PgExecutor<'e>,
{
    let template = template_queries::get_template(executor, template_id)
        .await
        .or_internal("failed to load template")?
        .ok_or_else(|| TemplateError::template_not_found(template_id))?;

    check(&template, action)?;
    Ok(template)
}
