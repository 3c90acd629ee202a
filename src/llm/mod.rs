pub mod client;
pub mod media;
#[cfg(test)]
pub mod mock;
pub mod openai;

pub use client::{CompletionClient, CompletionError, CompletionOptions, CompletionRequest};
pub use openai::OpenAiClient;
