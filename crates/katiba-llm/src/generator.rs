//! The text-generation capability.

use katiba_core::error::Result;
use katiba_core::prompt::{LlmResponse, Prompt};

/// A language model that completes a rendered prompt.
pub trait Generator: Send + Sync {
    /// Generate a response for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`katiba_core::KatibaError::Generation`] when the model call
    /// fails and [`katiba_core::KatibaError::Timeout`] when it exceeds its
    /// deadline.
    fn generate(&self, prompt: &Prompt) -> Result<LlmResponse>;
}

impl<T: Generator + ?Sized> Generator for Box<T> {
    fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
        (**self).generate(prompt)
    }
}

/// Run `prompt` through any generator.
///
/// # Errors
///
/// Propagates the generator's error unchanged.
pub fn generate(llm: &dyn Generator, prompt: &Prompt) -> Result<LlmResponse> {
    llm.generate(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use katiba_core::Query;

    struct Echo;

    impl Generator for Echo {
        fn generate(&self, prompt: &Prompt) -> Result<LlmResponse> {
            Ok(LlmResponse::new(prompt.to_string()))
        }
    }

    #[test]
    fn generate_delegates_to_the_model() {
        let prompt = Prompt::new("Q: {query}", Query::new("who?"), Vec::new());
        let boxed: Box<dyn Generator> = Box::new(Echo);
        assert_eq!(generate(&boxed, &prompt).expect("generate").text, "Q: who?");
    }
}
