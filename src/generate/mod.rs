mod llm;
mod prompt;

pub use llm::{create_generator, Generator, OllamaGenerator};
pub use prompt::{ContextPassage, ContextPayload, NO_CONTEXT_NOTICE};
