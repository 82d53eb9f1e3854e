pub mod codec;
pub mod job;
pub mod job_listener;
pub mod job_manager;
