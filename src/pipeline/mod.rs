pub mod dates;
pub mod enrich;
pub mod extract;
pub mod orchestrator;
pub mod posters;

pub use orchestrator::{Pipeline, RunSummary};
