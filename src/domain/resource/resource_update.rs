use crate::domain::resource::resource_description::ResourceDescription;

/// Elastic change of a worker's capabilities announced by the resource provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUpdate {
    Increase(ResourceDescription),
    Reduce(ResourceDescription),
}
