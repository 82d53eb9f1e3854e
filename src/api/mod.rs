pub mod application_dto;
pub mod config_dto;
