//! Generation and remote embedding over the Ollama HTTP API, plus an echo
//! generator for offline runs.

pub mod echo;
mod http;
pub mod ollama;

use localrag_core::config::{GeneratorKind, GeneratorSettings};
use localrag_core::traits::Generator;
use localrag_core::Result;

pub use echo::EchoGenerator;
pub use ollama::{OllamaEmbedder, OllamaGenerator};

pub fn generator_from_settings(settings: &GeneratorSettings) -> Result<Box<dyn Generator>> {
    match settings.kind {
        GeneratorKind::Ollama => Ok(Box::new(OllamaGenerator::from_settings(settings)?)),
        GeneratorKind::Echo => Ok(Box::new(EchoGenerator)),
    }
}
