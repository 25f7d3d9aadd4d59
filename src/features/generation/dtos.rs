use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::features::generation::client::ChatMessage;
use crate::shared::validation::DEFINITION_KEY_REGEX;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ProcessTextDto {
    /// Machine key of the definition driving this operation
    #[validate(length(min = 1, max = 100), regex(path = *DEFINITION_KEY_REGEX, message = "key may contain only lowercase letters and underscores"))]
    pub definition_key: String,

    #[validate(length(min = 1, max = 50_000))]
    pub text: String,

    pub model: Option<String>,

    #[validate(range(min = 1, max = 64_000))]
    pub max_tokens: Option<u32>,

    #[validate(range(min = 0.0, max = 1.0))]
    pub temperature: Option<f32>,

    /// Prior conversation turns; truncated to the configured depth
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Generated text plus token counts. Prompt content never appears here.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProcessTextResponseDto {
    pub definition_key: String,
    pub text: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
}
