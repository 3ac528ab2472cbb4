//! Which sections seed a freshly created template.

use sqlx::PgConnection;

use charter_db::models::{Section, Template};
use charter_db::queries::templates as template_queries;

use crate::error::{OrInternal, Result, TemplateError};

/// Env var naming the scaffold source template.
pub const TEMPLATE_ID_ENV: &str = "CHARTER_SCAFFOLD_TEMPLATE_ID";

/// Env var overriding how many leading sections are skipped.
pub const SKIP_ENV: &str = "CHARTER_SCAFFOLD_SKIP";

/// Default number of leading source sections left out of a new template.
pub const DEFAULT_SKIP_LEADING: usize = 2;

/// Errors reading scaffold settings from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldConfigError {
    #[error("{var} must be an integer, got {value:?}")]
    NotAnInteger { var: &'static str, value: String },
}

/// Where new templates take their initial sections from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldConfig {
    /// Source template. `None` means the lowest-id default template.
    pub template_id: Option<i32>,
    /// Leading source sections (in id order) that are not copied.
    pub skip_leading: usize,
}

impl Default for ScaffoldConfig {
    fn default() -> Self {
        Self {
            template_id: None,
            skip_leading: DEFAULT_SKIP_LEADING,
        }
    }
}

impl ScaffoldConfig {
    /// Read from [`TEMPLATE_ID_ENV`] and [`SKIP_ENV`], defaulting each unset
    /// variable.
    pub fn from_env() -> Result<Self, ScaffoldConfigError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(TEMPLATE_ID_ENV) {
            config.template_id = Some(parse_var(TEMPLATE_ID_ENV, value)?);
        }
        if let Ok(value) = std::env::var(SKIP_ENV) {
            config.skip_leading = parse_var(SKIP_ENV, value)?;
        }
        Ok(config)
    }

    /// Drop the leading sections. Rows whose parent was skipped get
    /// promoted to roots when cloned.
    pub fn select(&self, sections: Vec<Section>) -> Vec<Section> {
        sections.into_iter().skip(self.skip_leading).collect()
    }

    /// Load the source template.
    pub async fn resolve_source(&self, conn: &mut PgConnection) -> Result<Template> {
        match self.template_id {
            Some(id) => template_queries::get_template(&mut *conn, id)
                .await
                .or_internal("failed to load scaffold template")?
                .ok_or_else(|| TemplateError::NotFound(format!("scaffold template {id}"))),
            None => template_queries::find_default_template(&mut *conn)
                .await
                .or_internal("failed to load scaffold template")?
                .ok_or_else(|| TemplateError::NotFound("default template".to_owned())),
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    var: &'static str,
    value: String,
) -> Result<T, ScaffoldConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ScaffoldConfigError::NotAnInteger { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::section;

    #[test]
    fn default_skips_two() {
        let config = ScaffoldConfig::default();
        assert_eq!(config.template_id, None);
        assert_eq!(config.skip_leading, 2);
    }

    #[test]
    fn select_skips_leading_rows() {
        let rows: Vec<Section> = (1..=5).map(|id| section(id, None)).collect();
        let picked: Vec<i32> = ScaffoldConfig::default()
            .select(rows)
            .iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(picked, vec![3, 4, 5]);
    }

    #[test]
    fn select_with_fewer_rows_than_skip_is_empty() {
        let rows = vec![section(1, None)];
        assert!(ScaffoldConfig::default().select(rows).is_empty());
    }

    #[test]
    fn parse_var_rejects_garbage() {
        let err = parse_var::<usize>(SKIP_ENV, "two".to_owned()).unwrap_err();
        assert!(err.to_string().contains(SKIP_ENV));
        assert_eq!(parse_var::<i32>(TEMPLATE_ID_ENV, " 5 ".to_owned()).unwrap(), 5);
    }
}
