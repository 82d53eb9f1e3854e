use std::str::FromStr;
use std::time::Duration;

use crate::api::application_dto::{ApplicationDto, ImplementationDto, InputDataDto, ParameterDto, SimulatedJobDto, TaskDto};
use crate::domain::data::data_location::DataLocation;
use crate::domain::simulator::simulated_adaptor::{SimulatedAdaptor, SimulatedBehaviour};
use crate::domain::task::implementation::{Constraints, Implementation, ImplementationKind};
use crate::domain::task::parameter::{DataType, Direction, Parameter};
use crate::domain::task::task::{OnFailure, TaskDescription};
use crate::domain::utils::id::{DataName, WorkerName};
use crate::error::{ConversionError, Error};

/// A value the main program provides before submitting tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputData {
    pub name: DataName,
    pub data_type: DataType,
    pub location: DataLocation,
}

/// A resolved application description.
#[derive(Debug, Clone)]
pub struct Application {
    pub name: String,
    pub inputs: Vec<InputData>,
    pub tasks: Vec<TaskDescription>,
    pub main_accesses: Vec<DataName>,
    pub behaviours: Vec<(String, SimulatedBehaviour)>,
}

impl Application {
    /// Teaches the simulated workers how this application's signatures behave.
    pub fn configure(&self, mut adaptor: SimulatedAdaptor) -> SimulatedAdaptor {
        for (signature, behaviour) in &self.behaviours {
            adaptor = adaptor.with_behaviour(signature.clone(), behaviour.clone());
        }
        adaptor
    }
}

impl TryFrom<ApplicationDto> for Application {
    type Error = Error;

    fn try_from(dto: ApplicationDto) -> Result<Self, Self::Error> {
        let inputs = dto.inputs.iter().map(convert_input).collect::<Result<Vec<_>, _>>()?;
        let tasks = dto.tasks.into_iter().map(TaskDescription::try_from).collect::<Result<Vec<_>, _>>()?;
        let behaviours = dto.simulation.iter().map(convert_behaviour).collect();

        Ok(Application {
            name: dto.name,
            inputs,
            tasks,
            main_accesses: dto.main_accesses.into_iter().map(DataName::new).collect(),
            behaviours,
        })
    }
}

impl TryFrom<TaskDto> for TaskDescription {
    type Error = Error;

    fn try_from(dto: TaskDto) -> Result<Self, Self::Error> {
        let implementations = if dto.implementations.is_empty() {
            vec![Implementation::method(0, dto.signature.clone(), Constraints::default())]
        } else {
            dto.implementations.iter().enumerate().map(|(id, i)| convert_implementation(id as u32, &dto.signature, i)).collect()
        };

        let mut description = TaskDescription::new(dto.signature.clone(), implementations).with_priority(dto.priority);
        for parameter in &dto.parameters {
            description = description.with_parameter(convert_parameter(parameter)?);
        }
        if let Some(on_failure) = &dto.on_failure {
            description = description.with_on_failure(OnFailure::from_str(on_failure)?);
        }
        if let Some(group) = dto.group {
            description = description.with_group(group);
        }
        if let Some(ms) = dto.timeout_ms {
            description = description.with_timeout(Duration::from_millis(ms));
        }
        if let Some(retry_budget) = dto.retry_budget {
            description = description.with_retry_budget(retry_budget);
        }
        description.validate()?;
        Ok(description)
    }
}

fn convert_input(dto: &InputDataDto) -> Result<InputData, Error> {
    let data_type = DataType::from_str(&dto.data_type)?;
    let path = || dto.path.clone().unwrap_or_else(|| format!("/inputs/{}", dto.name));
    let location = match (&dto.host, &dto.disk, &dto.object_id) {
        (Some(host), None, None) => DataLocation::worker(WorkerName::new(host.clone()), path()),
        (None, Some(disk), None) => DataLocation::Shared { disk: disk.clone(), path: path() },
        (None, None, Some(object_id)) => DataLocation::Persistent { object_id: object_id.clone() },
        _ => {
            return Err(ConversionError::InvalidValue {
                field: format!("inputs.{}", dto.name),
                reason: "exactly one of host, disk or objectId must be set".to_string(),
            }
            .into());
        }
    };
    Ok(InputData { name: DataName::new(dto.name.clone()), data_type, location })
}

fn convert_implementation(id: u32, task_signature: &str, dto: &ImplementationDto) -> Implementation {
    let signature = dto.signature.clone().unwrap_or_else(|| task_signature.to_string());
    let constraints = Constraints {
        cores: dto.cores.unwrap_or(1),
        memory_mb: dto.memory_mb,
        architecture: dto.architecture.clone(),
        disks: dto.disks.iter().cloned().collect(),
        tags: dto.tags.iter().cloned().collect(),
    };
    match &dto.binary {
        Some(path) => Implementation { id, signature, kind: ImplementationKind::Binary { path: path.clone() }, constraints },
        None => Implementation::method(id, signature, constraints),
    }
}

fn convert_parameter(dto: &ParameterDto) -> Result<Parameter, Error> {
    let direction = Direction::from_str(&dto.direction)?;
    let data_type = DataType::from_str(&dto.data_type)?;
    Ok(Parameter {
        direction,
        data_type,
        data: dto.name.clone().map(DataName::new),
        value: dto.value.clone(),
        access: None,
    })
}

fn convert_behaviour(dto: &SimulatedJobDto) -> (String, SimulatedBehaviour) {
    let mut behaviour = SimulatedBehaviour {
        fail_attempts: dto.fail_attempts,
        always_fail: dto.always_fail,
        hang: dto.hang,
        ..Default::default()
    };
    if let Some(ms) = dto.duration_ms {
        behaviour.duration = Duration::from_millis(ms);
    }
    (dto.signature.clone(), behaviour)
}
