#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod actions;
pub mod agent;
pub mod cli;
pub mod config;
pub mod env;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod providers;

pub use agent::{Agent, DecisionEngine, Task, TaskOutcome};
pub use config::Config;
pub use env::{Observation, ObservationSource, SessionFactory, TaskStatus};
pub use error::AgentError;
