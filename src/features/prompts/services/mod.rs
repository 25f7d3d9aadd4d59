mod prompt_service;

pub use prompt_service::{ActiveContent, PromptService};
