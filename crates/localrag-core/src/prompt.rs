//! Two-slot prompt template.

use crate::error::{Error, Result};

pub const CONTEXT_SLOT: &str = "{context}";
pub const QUESTION_SLOT: &str = "{question}";
pub const CONTEXT_SEPARATOR: &str = "\n\n";

pub const DEFAULT_TEMPLATE: &str = "Answer the question based only on the following context:\n\
{context}\n\
\n\
Question: {question}\n";

/// A validated template containing both `{context}` and `{question}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptBuilder {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        validate_template(&template)?;
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the template. Slot markers occurring inside `context_texts` or
    /// `question` are left as they are.
    pub fn build<S: AsRef<str>>(&self, context_texts: &[S], question: &str) -> String {
        let context = context_texts
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        self.template
            .split(CONTEXT_SLOT)
            .map(|part| part.replace(QUESTION_SLOT, question))
            .collect::<Vec<_>>()
            .join(&context)
    }
}

pub fn validate_template(template: &str) -> Result<()> {
    if !template.contains(CONTEXT_SLOT) {
        return Err(Error::MissingSlot("context"));
    }
    if !template.contains(QUESTION_SLOT) {
        return Err(Error::MissingSlot("question"));
    }
    Ok(())
}
