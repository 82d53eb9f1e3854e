pub mod profile;
pub mod resource_scheduler;
pub mod scheduling_policy;
pub mod score;
pub mod task_scheduler;
