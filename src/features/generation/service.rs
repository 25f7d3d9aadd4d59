use std::sync::Arc;
use std::time::Instant;

use crate::core::config::GenerationConfig;
use crate::core::error::{AppError, Result};
use crate::features::auth::model::Actor;
use crate::features::generation::client::{GenerationRequest, TextGenerator};
use crate::features::generation::dtos::{ProcessTextDto, ProcessTextResponseDto};
use crate::features::generation::client::ChatMessage;
use crate::features::prompts::PromptService;
use crate::features::rate_limits::{RateLimitClass, RateLimitService};

/// Orchestrates a text-processing call: visibility check, generation rate
/// class, vault open of the active content, the outbound call, and the usage
/// sample on the definition. The decrypted content is transmitted only in
/// the request's system field and is never logged or echoed.
pub struct GenerationService {
    prompts: Arc<PromptService>,
    generator: Arc<dyn TextGenerator>,
    rate_limits: Arc<RateLimitService>,
    config: GenerationConfig,
}

impl GenerationService {
    pub fn new(
        prompts: Arc<PromptService>,
        generator: Arc<dyn TextGenerator>,
        rate_limits: Arc<RateLimitService>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            prompts,
            generator,
            rate_limits,
            config,
        }
    }

    pub async fn process(
        &self,
        actor: &Actor,
        ip: &str,
        dto: ProcessTextDto,
    ) -> Result<ProcessTextResponseDto> {
        self.rate_limits
            .check(RateLimitClass::Generation, &actor.id, ip)
            .await?;

        let definition = self.prompts.get_definition_by_key(&dto.definition_key).await?;
        if !definition.can_actor_use(actor) {
            return Err(AppError::Forbidden(
                "This operation is not available for your account".to_string(),
            ));
        }

        let active = self.prompts.active_content_of(&definition)?;
        let mut system = active.content;
        if let Some(instruction) = active.system_instruction {
            system.push_str("\n\n");
            system.push_str(&instruction);
        }

        // Bound the history the external call sees.
        let skip = dto
            .history
            .len()
            .saturating_sub(self.config.max_history_messages);
        let mut messages: Vec<ChatMessage> = dto.history.into_iter().skip(skip).collect();
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: dto.text,
        });

        let request = GenerationRequest {
            model: dto.model.unwrap_or_else(|| self.config.default_model.clone()),
            max_tokens: dto.max_tokens.unwrap_or(self.config.default_max_tokens),
            temperature: dto
                .temperature
                .unwrap_or(self.config.default_temperature),
            system,
            messages,
        };

        let started = Instant::now();
        let outcome = self.generator.generate(request).await;
        let elapsed_ms = started.elapsed().as_millis() as f64;

        match outcome {
            Ok(output) => {
                let tokens = (output.input_tokens + output.output_tokens) as f64;
                if let Err(e) = self
                    .prompts
                    .record_usage(definition.id, elapsed_ms, tokens, true)
                    .await
                {
                    tracing::error!("Failed to record usage stats: {}", e);
                }

                Ok(ProcessTextResponseDto {
                    definition_key: definition.key,
                    text: output.text,
                    model: output.model,
                    input_tokens: output.input_tokens,
                    output_tokens: output.output_tokens,
                })
            }
            Err(e) => {
                if let Err(stats_err) = self
                    .prompts
                    .record_usage(definition.id, elapsed_ms, 0.0, false)
                    .await
                {
                    tracing::error!("Failed to record usage stats: {}", stats_err);
                }
                Err(e)
            }
        }
    }
}
