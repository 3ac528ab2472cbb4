//! Typed errors returned by every template and section operation.

/// Errors surfaced to the request layer.
///
/// `NotFound` and `Forbidden` carry a human-readable subject. `Internal`
/// wraps persistence failures: its `Display` is the stable `context` string
/// and the underlying cause is only reachable through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("{context}")]
    Internal {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl TemplateError {
    pub fn template_not_found(id: i32) -> Self {
        Self::NotFound(format!("template {id}"))
    }

    pub fn section_not_found(id: i32) -> Self {
        Self::NotFound(format!("section {id}"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}

pub type Result<T, E = TemplateError> = std::result::Result<T, E>;

/// Wrap any persistence error as [`TemplateError::Internal`], logging the
/// full cause chain once at the point of conversion.
pub trait OrInternal<T> {
    fn or_internal(self, context: &'static str) -> Result<T>;
}

impl<T, E> OrInternal<T> for std::result::Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn or_internal(self, context: &'static str) -> Result<T> {
        self.map_err(|err| {
            let source = err.into();
            tracing::error!(error = ?source, "{context}");
            TemplateError::Internal { context, source }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn internal_display_hides_cause() {
        let failed: std::result::Result<(), anyhow::Error> =
            Err(anyhow::anyhow!("duplicate key value violates unique constraint"));
        let err = failed.or_internal("failed to clone template").unwrap_err();

        assert_eq!(err.to_string(), "failed to clone template");
        let source = err.source().expect("cause should be kept");
        assert!(source.to_string().contains("duplicate key"));
    }

    #[test]
    fn not_found_messages() {
        assert_eq!(
            TemplateError::template_not_found(7).to_string(),
            "template 7 not found"
        );
        assert!(TemplateError::section_not_found(3).is_not_found());
        assert!(TemplateError::Forbidden("locked".into()).is_forbidden());
    }
}
