//! Language-model access: the generation service and the prompts built on it.

pub mod generate;
pub mod reformulate;
pub mod title;

pub use generate::{Generator, GeneratorFactory, LlmClient};
pub use reformulate::Reformulator;
