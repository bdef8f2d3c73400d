mod compile;
mod config;
pub mod optim;

pub use compile::{fetal_envelope_model, CompileError, CompiledModel, TRAINING_LOSS};
pub use config::TrainingConfig;
