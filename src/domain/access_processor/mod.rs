pub mod access_processor;
pub mod actor;
pub mod handler;
pub mod messages;
