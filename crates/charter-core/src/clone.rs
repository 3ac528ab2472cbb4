//! Deep copy of section rows into another template.

use std::collections::HashMap;

use sqlx::PgConnection;
use tracing::warn;
use uuid::Uuid;

use charter_db::models::Section;
use charter_db::queries::sections::{self as section_queries, NewSectionRow};

use crate::error::{OrInternal, Result};

/// Result of [`clone_sections`].
#[derive(Debug, Clone)]
pub struct ClonedSections {
    /// Inserted rows, in source order.
    pub sections: Vec<Section>,
    /// Source row id to cloned row id.
    pub id_map: HashMap<i32, i32>,
}

/// Source-id to clone-id bookkeeping while a batch is copied.
#[derive(Debug, Default)]
struct IdRemap {
    map: HashMap<i32, i32>,
}

impl IdRemap {
    /// The new parent for a source row, or `None` when the row is a root or
    /// its parent has not been cloned (the clone is then promoted to root).
    fn parent_for(&self, source: &Section) -> Option<i32> {
        let old_parent = source.parent_id?;
        let new_parent = self.map.get(&old_parent).copied();
        if new_parent.is_none() {
            warn!(
                section = source.id,
                parent = old_parent,
                "parent not cloned before child, promoting clone to root"
            );
        }
        new_parent
    }

    fn record(&mut self, old_id: i32, new_id: i32) {
        self.map.insert(old_id, new_id);
    }
}

/// Copy `sources` into `target_template_id`, giving every clone a fresh
/// external id.
///
/// `sources` must be in topological order (parents before children); the
/// usual `ORDER BY id` listing satisfies that. Runs on the caller's
/// connection so a failure part-way leaves the caller's transaction to roll
/// back.
pub async fn clone_sections(
    conn: &mut PgConnection,
    sources: &[Section],
    target_template_id: i32,
    actor: Uuid,
) -> Result<ClonedSections> {
    let mut remap = IdRemap::default();
    let mut sections = Vec::with_capacity(sources.len());

    for source in sources {
        let parent_id = remap.parent_for(source);
        let row = NewSectionRow {
            template_id: target_template_id,
            section_id: Uuid::new_v4(),
            parent_id,
            title: &source.title,
            html_content: source.html_content.as_deref(),
            description: source.description.as_deref(),
            section_type: source.section_type,
            is_active: source.is_active,
            is_looped: source.is_looped,
            actor,
        };

        let cloned = section_queries::insert_section(&mut *conn, &row)
            .await
            .or_internal("failed to clone sections")?;

        remap.record(source.id, cloned.id);
        sections.push(cloned);
    }

    Ok(ClonedSections {
        sections,
        id_map: remap.map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::section;

    #[test]
    fn root_has_no_parent() {
        let remap = IdRemap::default();
        assert_eq!(remap.parent_for(&section(1, None)), None);
    }

    #[test]
    fn child_resolves_through_map() {
        let mut remap = IdRemap::default();
        remap.record(1, 101);
        assert_eq!(remap.parent_for(&section(2, Some(1))), Some(101));
    }

    #[test]
    fn uncloned_parent_promotes_to_root() {
        let mut remap = IdRemap::default();
        remap.record(1, 101);
        assert_eq!(remap.parent_for(&section(3, Some(2))), None);
    }
}
