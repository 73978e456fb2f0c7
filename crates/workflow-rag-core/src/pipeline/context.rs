//! Execution context threaded through a pipeline run, and the pure node
//! transitions that need no collaborators.

use super::step::{OutputConfig, UserQueryConfig};

/// Placeholder answer when the model returns no text.
pub const EMPTY_MODEL_OUTPUT: &str = "(No output returned by model.)";

/// State carried from one node to the next.
///
/// A fresh context is created per run and every node returns the context
/// the next node sees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    /// Text fed to the next node: the framed query, then the model answer.
    pub working_text: String,
    /// Newline-joined texts of the last retrieval.
    pub retrieved_context: String,
    /// Set by an output node; wins over `working_text` as the response.
    pub final_output: Option<String>,
    /// Collections rebuilt after a dimension mismatch during this run.
    pub rebuilt_collections: Vec<String>,
}

impl ExecutionContext {
    pub fn new(query: &str) -> Self {
        Self {
            working_text: query.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn apply_user_query(self, config: &UserQueryConfig) -> Self {
        let working_text = format!("{}\n\n{}", config.description, self.working_text)
            .trim()
            .to_string();
        Self {
            working_text,
            ..self
        }
    }

    pub fn apply_output(self, config: &OutputConfig) -> Self {
        let final_output = Some(format!("{}:\n{}", config.display_name, self.working_text));
        Self {
            final_output,
            ..self
        }
    }

    pub fn with_retrieved(self, retrieved_context: String) -> Self {
        Self {
            retrieved_context,
            ..self
        }
    }

    pub fn with_answer(self, text: String) -> Self {
        let working_text = if text.is_empty() {
            EMPTY_MODEL_OUTPUT.to_string()
        } else {
            text
        };
        Self {
            working_text,
            ..self
        }
    }

    pub fn record_rebuild(mut self, collection: &str) -> Self {
        if !self.rebuilt_collections.iter().any(|c| c == collection) {
            self.rebuilt_collections.push(collection.to_string());
        }
        self
    }

    /// Prompt sent by an llmEngine node.
    pub fn prompt(&self, custom_prompt: &str) -> String {
        format!(
            "{}\n\nContext:\n{}\n\nUser Query:\n{}",
            custom_prompt, self.retrieved_context, self.working_text
        )
    }

    /// The run's answer: the output node's text, else the working text.
    pub fn response_text(&self) -> &str {
        self.final_output.as_deref().unwrap_or(&self.working_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_query_frames_and_trims() {
        let ctx = ExecutionContext::new("  what is 2+2?  ").apply_user_query(&UserQueryConfig {
            description: "You are a calculator.".to_string(),
        });
        assert_eq!(ctx.working_text, "You are a calculator.\n\nwhat is 2+2?");

        let bare = ExecutionContext::new("q").apply_user_query(&UserQueryConfig::default());
        assert_eq!(bare.working_text, "q");
    }

    #[test]
    fn test_output_keeps_working_text() {
        let ctx = ExecutionContext::new("4").apply_output(&OutputConfig::default());
        assert_eq!(ctx.final_output.as_deref(), Some("Output:\n4"));
        assert_eq!(ctx.working_text, "4");
        assert_eq!(ctx.response_text(), "Output:\n4");
    }

    #[test]
    fn test_prompt_layout() {
        let ctx = ExecutionContext::new("q").with_retrieved("c1\nc2".to_string());
        assert_eq!(ctx.prompt("P"), "P\n\nContext:\nc1\nc2\n\nUser Query:\nq");
    }

    #[test]
    fn test_empty_answer_is_replaced() {
        let ctx = ExecutionContext::new("q").with_answer(String::new());
        assert_eq!(ctx.working_text, EMPTY_MODEL_OUTPUT);
    }

    #[test]
    fn test_rebuilds_are_recorded_once() {
        let ctx = ExecutionContext::new("q")
            .record_rebuild("kb")
            .record_rebuild("kb");
        assert_eq!(ctx.rebuilt_collections, vec!["kb".to_string()]);
    }
}
