pub mod application;
pub mod config;
pub mod dispatcher;
pub mod runtime;
pub mod task_handle;
