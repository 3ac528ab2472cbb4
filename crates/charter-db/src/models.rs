use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of content a section holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionType {
    #[default]
    Global,
    ControlFamily,
    Control,
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Global => "GLOBAL",
            Self::ControlFamily => "CONTROL_FAMILY",
            Self::Control => "CONTROL",
        };
        f.write_str(s)
    }
}

impl FromStr for SectionType {
    type Err = SectionTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GLOBAL" => Ok(Self::Global),
            "CONTROL_FAMILY" => Ok(Self::ControlFamily),
            "CONTROL" => Ok(Self::Control),
            other => Err(SectionTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`SectionType`] string.
#[derive(Debug, Clone)]
pub struct SectionTypeParseError(pub String);

impl fmt::Display for SectionTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid section type: {:?}", self.0)
    }
}

impl std::error::Error for SectionTypeParseError {}

// ---------------------------------------------------------------------------

/// What a template produces: an assessment or a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Assessment,
    Policy,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Assessment => "assessment",
            Self::Policy => "policy",
        };
        f.write_str(s)
    }
}

impl FromStr for EntityType {
    type Err = EntityTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assessment" => Ok(Self::Assessment),
            "policy" => Ok(Self::Policy),
            other => Err(EntityTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`EntityType`] string.
#[derive(Debug, Clone)]
pub struct EntityTypeParseError(pub String);

impl fmt::Display for EntityTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid entity type: {:?}", self.0)
    }
}

impl std::error::Error for EntityTypeParseError {}

// ---------------------------------------------------------------------------

/// Document format a template renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Excel,
    Word,
    Csv,
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excel => "excel",
            Self::Word => "word",
            Self::Csv => "csv",
        };
        f.write_str(s)
    }
}

impl FromStr for TemplateType {
    type Err = TemplateTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "excel" => Ok(Self::Excel),
            "word" => Ok(Self::Word),
            "csv" => Ok(Self::Csv),
            other => Err(TemplateTypeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TemplateType`] string.
#[derive(Debug, Clone)]
pub struct TemplateTypeParseError(pub String);

impl fmt::Display for TemplateTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid template type: {:?}", self.0)
    }
}

impl std::error::Error for TemplateTypeParseError {}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// One node of a template's outline snapshot.
///
/// Stored nested inside `templates.outline`. `section_id` is the external id
/// of the [`Section`] row the node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub section_id: Uuid,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
    pub level: u32,
    pub search_key: String,
    #[serde(default)]
    pub version: u32,
}

impl OutlineNode {
    /// A node with no children and version 0.
    pub fn leaf(section_id: Uuid, level: u32, search_key: impl Into<String>) -> Self {
        Self {
            section_id,
            children: Vec::new(),
            level,
            search_key: search_key.into(),
            version: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A document template together with its outline snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Template {
    pub id: i32,
    pub name: String,
    pub template_type: Option<TemplateType>,
    pub entity_type: EntityType,
    pub outline: Json<Vec<OutlineNode>>,
    pub standard_ids: Vec<i32>,
    pub customer_ids: Vec<String>,
    pub license_type_id: i32,
    pub is_published: bool,
    pub is_editable: bool,
    pub is_default: bool,
    pub is_available: bool,
    pub is_locked: bool,
    pub llm_enabled: bool,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A content section of a template, stored as a flat row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Section {
    pub id: i32,
    pub template_id: i32,
    /// Stable external id referenced from the outline.
    pub section_id: Uuid,
    pub parent_id: Option<i32>,
    pub title: String,
    pub html_content: Option<String>,
    pub description: Option<String>,
    pub section_type: SectionType,
    pub is_active: bool,
    pub is_looped: bool,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_type_display_roundtrip() {
        let variants = [
            SectionType::Global,
            SectionType::ControlFamily,
            SectionType::Control,
        ];
        for v in &variants {
            let s = v.to_string();
            let parsed: SectionType = s.parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn section_type_invalid() {
        let result = "global".parse::<SectionType>();
        assert!(result.is_err());
    }

    #[test]
    fn entity_type_display_roundtrip() {
        for v in &[EntityType::Assessment, EntityType::Policy] {
            let parsed: EntityType = v.to_string().parse().expect("should parse");
            assert_eq!(*v, parsed);
        }
    }

    #[test]
    fn template_type_invalid() {
        let result = "pdf".parse::<TemplateType>();
        assert!(result.is_err());
    }

    #[test]
    fn outline_node_json_shape() {
        let id = Uuid::new_v4();
        let node = OutlineNode::leaf(id, 0, "0");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["section_id"], serde_json::json!(id.to_string()));
        assert_eq!(value["children"], serde_json::json!([]));
        assert_eq!(value["level"], 0);
        assert_eq!(value["search_key"], "0");
        assert_eq!(value["version"], 0);
    }

    #[test]
    fn outline_node_tolerates_missing_children_and_version() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"section_id":"{id}","level":2,"search_key":"0_1_0"}}"#);
        let node: OutlineNode = serde_json::from_str(&raw).unwrap();
        assert!(node.children.is_empty());
        assert_eq!(node.version, 0);
        assert_eq!(node.level, 2);
    }
}
