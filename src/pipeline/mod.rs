pub mod orchestrator;
pub mod query;
