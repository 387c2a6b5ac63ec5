pub mod backend;
pub mod status_event;
