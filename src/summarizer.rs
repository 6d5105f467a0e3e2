use std::sync::Arc;
use crate::error::Result;
use crate::llm::{ChatModel, Message};

pub const SUMMARY_INSTRUCTION: &str = "Summarize the following content.";

/// Condenses scraped page text with one extra model call.
#[derive(Clone)]
pub struct Summarizer {
    model: Arc<dyn ChatModel>,
}

impl Summarizer {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn summarize(&self, text: &str) -> Result<String> {
        self.model
            .complete(vec![
                Message::system(SUMMARY_INSTRUCTION),
                Message::user(format!("Here is the data:\n\n{text}")),
            ])
            .await
    }
}
