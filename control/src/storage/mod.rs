//! On-disk project layout and settings

pub mod layout;
pub mod settings;
