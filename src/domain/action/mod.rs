pub mod action_graph;
pub mod allocatable_action;
pub mod orchestrator;
