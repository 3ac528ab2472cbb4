//! Template section tree and outline synchronization.

pub mod clone;
pub mod error;
pub mod guard;
pub mod mutate;
pub mod outline;
pub mod scaffold;
pub mod template;
pub mod tree;

#[cfg(test)]
mod testing;

pub use error::{Result, TemplateError};
