//! Generative-model backends used for the consensus call.

use std::future::Future;
use std::pin::Pin;

use crate::CoreError;

pub mod gemini;
#[cfg(test)]
pub mod mock;

pub use gemini::GeminiModel;

/// A generative backend that turns a prompt into text expected to contain
/// JSON. Implementations surface transport and API failures as
/// [`CoreError`]; retry policy lives with the caller.
pub trait ConsensusModel: Send + Sync {
    /// Short identifier recorded in output metadata.
    fn name(&self) -> &str;

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, CoreError>> + Send + 'a>>;
}
