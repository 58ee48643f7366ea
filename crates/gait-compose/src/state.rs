//! Composition state: the one mutable aggregate behind the tool screen.
//!
//! The live value sits in the session's watch channel; everything handed
//! out (`snapshot`, receivers) is a read-only copy. Each field has exactly
//! one owning pipeline, and all writes go through the methods below.

use crate::{Endpoint, GenerationResult, ModelChoice};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionState {
    pub selected_endpoint: Option<Endpoint>,
    pub selected_model: ModelChoice,
    pub natural_language_text: Option<String>,
    /// Generated (and possibly hand-edited) query; starts empty
    pub generated_query_text: String,
    pub result_text: Option<String>,
    pub is_generating: bool,
    pub is_executing: bool,
    /// Hard failure of the latest generation; the query text is left as is
    pub generation_error: Option<String>,
}

impl CompositionState {
    pub fn new(model: ModelChoice) -> Self {
        Self {
            selected_model: model,
            ..Self::default()
        }
    }

    /// True iff there is query text to execute. Derived on every read.
    pub fn can_execute(&self) -> bool {
        !self.generated_query_text.is_empty()
    }

    /// Trimmed natural-language text, if any is left after trimming.
    pub fn request_text(&self) -> Option<&str> {
        self.natural_language_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Append `" " + text` to the natural-language text.
    pub(crate) fn append_to_request(&mut self, text: &str) {
        let current = self.natural_language_text.get_or_insert_with(String::new);
        current.push(' ');
        current.push_str(text);
    }

    pub(crate) fn begin_generation(&mut self) {
        self.is_generating = true;
        self.generation_error = None;
    }

    /// Apply a generation answer; returns the text written, if any.
    pub(crate) fn finish_generation(&mut self, result: &GenerationResult) -> Option<String> {
        self.is_generating = false;
        let text = result.display_text()?;
        self.generated_query_text = text.to_string();
        Some(self.generated_query_text.clone())
    }

    pub(crate) fn fail_generation(&mut self, message: String) {
        self.is_generating = false;
        self.generation_error = Some(message);
    }

    pub(crate) fn begin_execution(&mut self) {
        self.is_executing = true;
    }

    pub(crate) fn finish_execution(&mut self, text: String) {
        self.is_executing = false;
        self.result_text = Some(text);
    }
}
