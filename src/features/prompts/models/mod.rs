mod prompt;

pub use prompt::{
    PopularityWeights, PromptCategory, PromptDefinition, PromptScope, PromptType, PromptVersion,
    UsageStats,
};
