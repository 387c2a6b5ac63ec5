pub mod registry;
pub mod store;
pub mod types;
