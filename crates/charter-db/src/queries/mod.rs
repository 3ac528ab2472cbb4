pub mod sections;
pub mod templates;
