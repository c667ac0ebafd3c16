pub mod registry;
pub mod source;
