use std::path::Path;

use crate::api::application_dto::ApplicationDto;
use crate::api::config_dto::RuntimeConfigDto;
use crate::domain::runtime::application::Application;
use crate::domain::runtime::config::RuntimeConfig;
use crate::error::Result;
use crate::loader::parser::parse_json_file;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Reads and resolves a runtime configuration file.
pub fn load_config(file_path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let dto: RuntimeConfigDto = parse_json_file(file_path.as_ref())?;
    log::info!("Configuration '{}' parsed successfully.", file_path.as_ref().display());
    RuntimeConfig::try_from(dto)
}

/// Reads and resolves an application description.
pub fn load_application(file_path: impl AsRef<Path>) -> Result<Application> {
    let dto: ApplicationDto = parse_json_file(file_path.as_ref())?;
    let application = Application::try_from(dto)?;
    log::info!("Application '{}' loaded with {} task(s).", application.name, application.tasks.len());
    Ok(application)
}
