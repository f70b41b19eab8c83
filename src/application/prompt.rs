use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, SearchResult};

const GROUNDED_TEMPLATE: &str = "You are a helpful bot. If you cannot answer based on the context provided, \
respond with a generic answer. Answer the question as truthfully as possible using the context below:
{context}

Question: {question}
";

const UNGROUNDED_TEMPLATE: &str = "You are a helpful bot. Answer the question as truthfully as possible.

Question: {question}
";

/// Instruction templates for both query modes.
///
/// `{context}` expands to the retrieved chunk contents in rank order, one
/// per line; `{question}` expands to the raw question. Unknown
/// placeholders are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplate {
    pub grounded: String,
    pub ungrounded: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            grounded: GROUNDED_TEMPLATE.to_string(),
            ungrounded: UNGROUNDED_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.grounded.contains("{context}") || !self.grounded.contains("{question}") {
            return Err(DomainError::configuration(
                "grounded prompt must contain {context} and {question}",
            ));
        }
        if !self.ungrounded.contains("{question}") {
            return Err(DomainError::configuration(
                "ungrounded prompt must contain {question}",
            ));
        }
        if self.ungrounded.contains("{context}") {
            return Err(DomainError::configuration(
                "ungrounded prompt must not contain {context}",
            ));
        }
        Ok(())
    }

    pub fn render_grounded(&self, question: &str, documents: &[SearchResult]) -> String {
        let context = documents
            .iter()
            .map(|r| r.chunk.content.trim())
            .collect::<Vec<_>>()
            .join("\n");
        fill(&self.grounded, &[("context", &context), ("question", question)])
    }

    pub fn render_ungrounded(&self, question: &str) -> String {
        fill(&self.ungrounded, &[("question", question)])
    }
}

/// Single-pass placeholder substitution, so values are never re-expanded.
fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            vars.iter()
                .find(|(name, _)| *name == &after[..close])
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
