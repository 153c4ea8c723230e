use localrag_core::traits::Generator;
use localrag_core::Result;

/// Returns the prompt unchanged. Lets `ask` run without a model server and
/// shows exactly what would have been sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoGenerator;

impl Generator for EchoGenerator {
    fn model(&self) -> &str { "echo" }

    fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }
}
