//! Structural edits that keep section rows and the outline in step.
//!
//! Each function runs on a caller-owned connection (normally a transaction)
//! and assumes the policy guard has already been consulted. The caller
//! commits; any error here leaves the transaction to roll back on drop.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::types::Json;
use tracing::warn;
use uuid::Uuid;

use charter_db::models::{Section, SectionType, Template};
use charter_db::queries::sections::{self as section_queries, NewSectionRow};
use charter_db::queries::templates as template_queries;

use crate::error::{OrInternal, Result, TemplateError};
use crate::outline::{self, MAX_OUTLINE_DEPTH};
use crate::tree;

/// Longest title the `template_sections.title` column accepts.
pub const MAX_TITLE_LEN: usize = 200;

fn default_true() -> bool {
    true
}

/// A section to insert into a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSection {
    pub title: String,
    /// Row id of the parent section. `None` inserts a root.
    #[serde(default)]
    pub parent_id: Option<i32>,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub section_type: SectionType,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_looped: bool,
}

impl NewSection {
    /// An active root section with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            parent_id: None,
            html_content: None,
            description: None,
            section_type: SectionType::default(),
            is_active: true,
            is_looped: false,
        }
    }

    pub fn under(mut self, parent_id: i32) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// New position for a patched section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentChange {
    Root,
    Under(i32),
}

impl ParentChange {
    fn parent_id(self) -> Option<i32> {
        match self {
            Self::Root => None,
            Self::Under(id) => Some(id),
        }
    }
}

/// Partial update of one section. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPatch {
    pub id: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub html_content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_looped: Option<bool>,
    #[serde(default)]
    pub section_type: Option<SectionType>,
    #[serde(default)]
    pub parent: Option<ParentChange>,
}

impl SectionPatch {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Copy the set fields onto `section`.
    pub fn apply(&self, section: &mut Section) {
        if let Some(title) = &self.title {
            section.title.clone_from(title);
        }
        if let Some(html) = &self.html_content {
            section.html_content = Some(html.clone());
        }
        if let Some(description) = &self.description {
            section.description = Some(description.clone());
        }
        if let Some(is_active) = self.is_active {
            section.is_active = is_active;
        }
        if let Some(is_looped) = self.is_looped {
            section.is_looped = is_looped;
        }
        if let Some(section_type) = self.section_type {
            section.section_type = section_type;
        }
        if let Some(parent) = self.parent {
            section.parent_id = parent.parent_id();
        }
    }
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(TemplateError::Invalid("section title must not be empty".to_owned()));
    }
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(TemplateError::Invalid(format!(
            "section title is {len} characters, at most {MAX_TITLE_LEN} allowed"
        )));
    }
    Ok(())
}

/// Refuse a tree that would nest deeper than [`MAX_OUTLINE_DEPTH`].
pub fn ensure_depth(depth: usize) -> Result<()> {
    if depth > MAX_OUTLINE_DEPTH {
        return Err(TemplateError::Invalid(format!(
            "sections would nest {depth} levels deep, at most {MAX_OUTLINE_DEPTH} allowed"
        )));
    }
    Ok(())
}

/// Insert one section and append its node to the outline.
///
/// The parent, when given, must belong to the same template. The row is
/// written first so the node can carry its external id. If the parent has
/// no node in the stored outline the outline is left as is.
pub async fn insert_section(
    conn: &mut PgConnection,
    template: &mut Template,
    new: &NewSection,
    actor: Uuid,
) -> Result<Section> {
    validate_title(&new.title)?;

    let parent = match new.parent_id {
        Some(parent_id) => {
            let parent = section_queries::get_section(&mut *conn, parent_id)
                .await
                .or_internal("failed to load parent section")?
                .filter(|p| p.template_id == template.id)
                .ok_or_else(|| TemplateError::NotFound(format!("parent section {parent_id}")))?;
            Some(parent)
        }
        None => None,
    };

    if let Some(parent) = &parent {
        let rows = section_queries::list_sections_for_template(&mut *conn, template.id)
            .await
            .or_internal("failed to load sections")?;
        let parent_of: HashMap<i32, Option<i32>> =
            rows.iter().map(|s| (s.id, s.parent_id)).collect();
        let row_depth = tree::depth(&parent_of, parent.id) + 1;
        let node_depth = outline::find_node(&template.outline.0, parent.section_id)
            .map_or(0, |node| node.level as usize + 2);
        ensure_depth(row_depth.max(node_depth))?;
    }

    let section = section_queries::insert_section(
        &mut *conn,
        &NewSectionRow {
            template_id: template.id,
            section_id: Uuid::new_v4(),
            parent_id: parent.as_ref().map(|p| p.id),
            title: &new.title,
            html_content: new.html_content.as_deref(),
            description: new.description.as_deref(),
            section_type: new.section_type,
            is_active: new.is_active,
            is_looped: new.is_looped,
            actor,
        },
    )
    .await
    .or_internal("failed to insert section")?;

    let forest = &mut template.outline.0;
    match &parent {
        Some(parent) => {
            if outline::append_child(forest, parent.section_id, section.section_id).is_none() {
                warn!(
                    template_id = template.id,
                    parent = %parent.section_id,
                    "parent missing from outline, leaving outline unchanged"
                );
            }
        }
        None => {
            outline::append_root(forest, section.section_id);
        }
    }

    template_queries::save_outline(&mut *conn, template.id, forest, actor)
        .await
        .or_internal("failed to save outline")?;

    Ok(section)
}

/// Apply a batch of patches to one template's rows.
///
/// Every patch id and every new parent must belong to the template, and no
/// reparenting may close a cycle; otherwise nothing is written. Only rows
/// change: the outline keeps its old nesting until it is rebuilt.
pub async fn apply_section_patches(
    conn: &mut PgConnection,
    template_id: i32,
    patches: &[SectionPatch],
    actor: Uuid,
) -> Result<Vec<Section>> {
    let rows = section_queries::list_sections_for_template(&mut *conn, template_id)
        .await
        .or_internal("failed to load sections")?;
    let mut by_id: HashMap<i32, Section> = rows.into_iter().map(|s| (s.id, s)).collect();

    let mut order: Vec<i32> = Vec::with_capacity(patches.len());
    let mut seen: HashSet<i32> = HashSet::with_capacity(patches.len());

    for patch in patches {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        if let Some(ParentChange::Under(parent_id)) = patch.parent {
            if parent_id == patch.id {
                return Err(TemplateError::Invalid(format!(
                    "section {parent_id} cannot be its own parent"
                )));
            }
            if !by_id.contains_key(&parent_id) {
                return Err(TemplateError::NotFound(format!("parent section {parent_id}")));
            }
        }
        let section = by_id
            .get_mut(&patch.id)
            .ok_or_else(|| TemplateError::section_not_found(patch.id))?;
        patch.apply(section);

        if seen.insert(patch.id) {
            order.push(patch.id);
        }
    }

    let parent_of: HashMap<i32, Option<i32>> =
        by_id.values().map(|s| (s.id, s.parent_id)).collect();
    for id in &order {
        if tree::creates_cycle(&parent_of, *id) {
            return Err(TemplateError::Invalid(format!(
                "moving section {id} would create a cycle"
            )));
        }
    }

    // Rows must stay shallow enough for a later rebuild to be stored.
    if patches.iter().any(|p| p.parent.is_some()) {
        ensure_depth(tree::max_depth(&parent_of))?;
    }

    let mut updated = Vec::with_capacity(order.len());
    for id in order {
        let Some(section) = by_id.get(&id) else {
            continue;
        };
        let saved = section_queries::update_section(&mut *conn, section, actor)
            .await
            .or_internal("failed to update sections")?;
        updated.push(saved);
    }

    template_queries::touch_template(&mut *conn, template_id, actor)
        .await
        .or_internal("failed to update sections")?;

    Ok(updated)
}

/// What [`delete_subtree`] removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeDeletion {
    /// Row ids deleted: the target first, then its descendants.
    pub removed_ids: Vec<i32>,
    /// Outline nodes pruned.
    pub pruned_nodes: usize,
}

/// Delete `target` and every descendant row, then prune and re-key the
/// outline.
pub async fn delete_subtree(
    conn: &mut PgConnection,
    template: &mut Template,
    target: &Section,
    actor: Uuid,
) -> Result<SubtreeDeletion> {
    let rows = section_queries::list_sections_for_template(&mut *conn, template.id)
        .await
        .or_internal("failed to load sections")?;

    let descendants =
        tree::collect_descendants(rows.iter().map(|s| (s.id, s.parent_id)), target.id);
    let mut removed_ids = Vec::with_capacity(descendants.len() + 1);
    removed_ids.push(target.id);
    removed_ids.extend(descendants);

    section_queries::delete_sections_by_ids(&mut *conn, &removed_ids)
        .await
        .or_internal("failed to delete sections")?;

    // Descendants normally sit under the target's node; pruning them by id
    // as well covers rows that were reparented without an outline rebuild.
    let removed: HashSet<i32> = removed_ids.iter().copied().collect();
    let forest = &mut template.outline.0;
    let mut pruned_nodes = outline::prune(forest, target.section_id);
    if pruned_nodes == 0 {
        warn!(
            template_id = template.id,
            section_id = %target.section_id,
            "deleted section had no outline node"
        );
    }
    for row in rows.iter().filter(|s| s.id != target.id && removed.contains(&s.id)) {
        pruned_nodes += outline::prune(forest, row.section_id);
    }
    outline::reindex(forest);

    template_queries::save_outline(&mut *conn, template.id, forest, actor)
        .await
        .or_internal("failed to save outline")?;

    Ok(SubtreeDeletion {
        removed_ids,
        pruned_nodes,
    })
}

/// Replace the stored outline with one built from the template's rows.
pub async fn rebuild(conn: &mut PgConnection, template: &mut Template, actor: Uuid) -> Result<()> {
    let rows = section_queries::list_sections_for_template(&mut *conn, template.id)
        .await
        .or_internal("failed to load sections")?;
    let forest = outline::build_outline(&rows);
    ensure_depth(outline::depth(&forest))?;
    template.outline = Json(forest);

    template_queries::save_outline(&mut *conn, template.id, &template.outline.0, actor)
        .await
        .or_internal("failed to save outline")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::section;

    #[test]
    fn title_limits() {
        assert!(validate_title("Scope").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
        let err = validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).unwrap_err();
        assert!(matches!(err, TemplateError::Invalid(_)));
    }

    #[test]
    fn depth_limit() {
        assert!(ensure_depth(0).is_ok());
        assert!(ensure_depth(MAX_OUTLINE_DEPTH).is_ok());
        let err = ensure_depth(MAX_OUTLINE_DEPTH + 1).unwrap_err();
        assert!(matches!(err, TemplateError::Invalid(_)));
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut s = section(4, Some(2));
        let patch = SectionPatch {
            title: Some("Renamed".to_owned()),
            is_looped: Some(true),
            ..SectionPatch::new(4)
        };
        patch.apply(&mut s);

        assert_eq!(s.title, "Renamed");
        assert!(s.is_looped);
        assert!(s.is_active);
        assert_eq!(s.parent_id, Some(2));
    }

    #[test]
    fn parent_change_to_root_clears_parent() {
        let mut s = section(4, Some(2));
        SectionPatch {
            parent: Some(ParentChange::Root),
            ..SectionPatch::new(4)
        }
        .apply(&mut s);
        assert_eq!(s.parent_id, None);

        SectionPatch {
            parent: Some(ParentChange::Under(9)),
            ..SectionPatch::new(4)
        }
        .apply(&mut s);
        assert_eq!(s.parent_id, Some(9));
    }

    #[test]
    fn patch_json_shape() {
        let patch: SectionPatch =
            serde_json::from_str(r#"{"id": 3, "title": "Scope", "parent": {"under": 1}}"#).unwrap();
        assert_eq!(patch.parent, Some(ParentChange::Under(1)));
        assert_eq!(patch.is_active, None);

        let root: SectionPatch = serde_json::from_str(r#"{"id": 3, "parent": "root"}"#).unwrap();
        assert_eq!(root.parent, Some(ParentChange::Root));
    }

    #[test]
    fn new_section_defaults() {
        let new: NewSection = serde_json::from_str(r#"{"title": "Purpose"}"#).unwrap();
        assert_eq!(new, NewSection::titled("Purpose"));
        assert!(new.is_active);
        assert_eq!(NewSection::titled("x").under(5).parent_id, Some(5));
    }
}
