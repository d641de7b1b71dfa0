//! Integration test modules

pub mod lifecycle;
pub mod properties;
pub mod relay_selection;
