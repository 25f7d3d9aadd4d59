use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::auth::model::{Actor, Role};

/// Closed set of text-processing operations a definition can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    Punctuation,
    Nikud,
    Sources,
    Grammar,
    Edit,
    Format,
    Truncate,
    Analyze,
    Translate,
    Custom,
    System,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptType::Punctuation => "punctuation",
            PromptType::Nikud => "nikud",
            PromptType::Sources => "sources",
            PromptType::Grammar => "grammar",
            PromptType::Edit => "edit",
            PromptType::Format => "format",
            PromptType::Truncate => "truncate",
            PromptType::Analyze => "analyze",
            PromptType::Translate => "translate",
            PromptType::Custom => "custom",
            PromptType::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "punctuation" => PromptType::Punctuation,
            "nikud" => PromptType::Nikud,
            "sources" => PromptType::Sources,
            "grammar" => PromptType::Grammar,
            "edit" => PromptType::Edit,
            "format" => PromptType::Format,
            "truncate" => PromptType::Truncate,
            "analyze" => PromptType::Analyze,
            "translate" => PromptType::Translate,
            "custom" => PromptType::Custom,
            "system" => PromptType::System,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PromptCategory {
    Torah,
    Halacha,
    Philosophy,
    History,
    General,
    System,
}

impl PromptCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptCategory::Torah => "torah",
            PromptCategory::Halacha => "halacha",
            PromptCategory::Philosophy => "philosophy",
            PromptCategory::History => "history",
            PromptCategory::General => "general",
            PromptCategory::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "torah" => PromptCategory::Torah,
            "halacha" => PromptCategory::Halacha,
            "philosophy" => PromptCategory::Philosophy,
            "history" => PromptCategory::History,
            "general" => PromptCategory::General,
            "system" => PromptCategory::System,
            _ => return None,
        })
    }
}

/// Which product surface a definition serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PromptScope {
    Editor,
    Research,
    Both,
}

impl PromptScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptScope::Editor => "editor",
            PromptScope::Research => "research",
            PromptScope::Both => "both",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "editor" => PromptScope::Editor,
            "research" => PromptScope::Research,
            "both" => PromptScope::Both,
            _ => return None,
        })
    }
}

/// One content version of a definition. Ordinals are 1-based, strictly
/// increasing and immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVersion {
    pub id: Uuid,
    pub ordinal: i32,
    /// Plaintext or a serialized vault envelope, per `is_encrypted`. Opaque
    /// to the version store.
    pub content: String,
    pub is_encrypted: bool,
    pub system_instruction: Option<String>,
    pub author: String,
    pub changelog: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregated usage statistics with a derived popularity score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UsageStats {
    pub total: i64,
    /// Percentage 0..=100.
    pub success_rate: f64,
    pub avg_response_ms: f64,
    pub avg_tokens: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub popularity_score: f64,
}

impl UsageStats {
    /// Fold one usage sample into the running averages.
    pub fn fold(&mut self, response_ms: f64, tokens: f64, success: bool) {
        let previous = self.total;
        self.total += 1;
        self.last_used = Some(Utc::now());

        let total = self.total as f64;
        self.avg_response_ms = (self.avg_response_ms * previous as f64 + response_ms) / total;
        self.avg_tokens = (self.avg_tokens * previous as f64 + tokens) / total;

        let success_count =
            (self.success_rate / 100.0 * previous as f64).round() + if success { 1.0 } else { 0.0 };
        self.success_rate = (success_count / total * 100.0).round();
    }

    pub fn weighted_popularity(&self, weights: &PopularityWeights) -> f64 {
        self.total as f64 * weights.usage
            + self.success_rate * weights.success
            + (100.0 - self.avg_response_ms / 1000.0) * weights.latency
    }
}

/// Weights for the popularity score: usage volume, success rate and inverse
/// latency.
#[derive(Debug, Clone, Copy)]
pub struct PopularityWeights {
    pub usage: f64,
    pub success: f64,
    pub latency: f64,
}

impl Default for PopularityWeights {
    fn default() -> Self {
        Self {
            usage: 0.4,
            success: 0.3,
            latency: 0.3,
        }
    }
}

/// A named, versioned unit of sensitive content together with its embedded
/// version list. Mutation semantics live here so the invariants hold no
/// matter which store persists the aggregate.
#[derive(Debug, Clone)]
pub struct PromptDefinition {
    pub id: Uuid,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub prompt_type: PromptType,
    pub category: PromptCategory,
    pub scope: PromptScope,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_active: bool,
    /// Role and tier names this definition is restricted to; empty means the
    /// public flag decides.
    pub restricted_to: Vec<String>,
    pub current_version: i32,
    pub usage: UsageStats,
    pub created_by: String,
    pub last_modified_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub delete_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub versions: Vec<PromptVersion>,
}

impl PromptDefinition {
    /// Next ordinal: one past the highest existing ordinal.
    pub fn next_ordinal(&self) -> i32 {
        self.versions.iter().map(|v| v.ordinal).max().unwrap_or(0) + 1
    }

    pub fn version(&self, ordinal: i32) -> Option<&PromptVersion> {
        self.versions.iter().find(|v| v.ordinal == ordinal)
    }

    pub fn active_version(&self) -> Option<&PromptVersion> {
        self.versions.iter().find(|v| v.is_active)
    }

    /// Append a new inactive version and return its ordinal.
    pub fn add_version(
        &mut self,
        content: String,
        is_encrypted: bool,
        system_instruction: Option<String>,
        author: &str,
        changelog: Option<String>,
    ) -> i32 {
        let ordinal = self.next_ordinal();
        self.versions.push(PromptVersion {
            id: Uuid::new_v4(),
            ordinal,
            content,
            is_encrypted,
            system_instruction,
            author: author.to_string(),
            changelog,
            is_active: false,
            created_at: Utc::now(),
        });
        ordinal
    }

    /// Clear all activation flags, set exactly one, and move the
    /// current-version pointer. The three sub-mutations apply together or
    /// not at all.
    pub fn activate_version(&mut self, ordinal: i32, activated_by: &str) -> Result<()> {
        if self.version(ordinal).is_none() {
            return Err(AppError::NotFound(format!(
                "Version {} not found for definition {}",
                ordinal, self.key
            )));
        }

        for version in &mut self.versions {
            version.is_active = version.ordinal == ordinal;
        }
        self.current_version = ordinal;
        self.last_modified_by = Some(activated_by.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Fold one usage sample into the running averages and refresh the
    /// popularity score.
    pub fn record_usage(
        &mut self,
        response_ms: f64,
        tokens: f64,
        success: bool,
        weights: &PopularityWeights,
    ) {
        self.usage.fold(response_ms, tokens, success);
        self.recompute_popularity(weights);
    }

    pub fn recompute_popularity(&mut self, weights: &PopularityWeights) {
        self.usage.popularity_score = self.usage.weighted_popularity(weights);
    }

    /// Visibility check against the role/tier restriction list. Owners always
    /// pass; an empty restriction list falls back to the public flag.
    pub fn can_actor_use(&self, actor: &Actor) -> bool {
        if !self.is_active || self.deleted_at.is_some() {
            return false;
        }
        if actor.role == Role::Owner {
            return true;
        }
        if !self.restricted_to.is_empty() {
            return self
                .restricted_to
                .iter()
                .any(|r| r == actor.role.as_str() || r == actor.tier.as_str());
        }
        self.is_public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::model::Tier;
    use crate::shared::test_helpers::{actor_with_role, standard_actor};

    fn definition_with_version(key: &str, content: &str) -> PromptDefinition {
        let mut definition = PromptDefinition {
            id: Uuid::new_v4(),
            key: key.to_string(),
            name: key.to_string(),
            description: None,
            prompt_type: PromptType::Punctuation,
            category: PromptCategory::Torah,
            scope: PromptScope::Both,
            tags: vec![],
            is_public: false,
            is_active: true,
            restricted_to: vec![],
            current_version: 1,
            usage: UsageStats::default(),
            created_by: "owner-1".to_string(),
            last_modified_by: None,
            deleted_at: None,
            delete_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            versions: vec![],
        };
        definition.add_version(content.to_string(), false, None, "owner-1", None);
        definition
            .activate_version(1, "owner-1")
            .expect("version 1 exists");
        definition
    }

    #[test]
    fn initial_version_is_active() {
        let definition = definition_with_version("punctuation", "X");

        let active = definition.active_version().expect("an active version");
        assert_eq!(active.ordinal, 1);
        assert_eq!(active.content, "X");
        assert_eq!(definition.current_version, 1);
    }

    #[test]
    fn adding_a_version_does_not_change_the_active_one() {
        let mut definition = definition_with_version("punctuation", "X");

        let ordinal = definition.add_version("Y".to_string(), false, None, "owner-1", None);
        assert_eq!(ordinal, 2);

        let active = definition.active_version().unwrap();
        assert_eq!(active.content, "X");
        assert_eq!(definition.current_version, 1);
        assert!(!definition.version(2).unwrap().is_active);
    }

    #[test]
    fn activation_moves_the_single_active_flag() {
        let mut definition = definition_with_version("punctuation", "X");
        definition.add_version("Y".to_string(), false, None, "owner-1", None);

        definition.activate_version(2, "moderator-1").unwrap();

        let active = definition.active_version().unwrap();
        assert_eq!(active.ordinal, 2);
        assert_eq!(active.content, "Y");
        assert_eq!(definition.current_version, 2);
        assert!(!definition.version(1).unwrap().is_active);
        assert_eq!(definition.last_modified_by.as_deref(), Some("moderator-1"));
    }

    #[test]
    fn at_most_one_version_is_active_across_repeated_activations() {
        let mut definition = definition_with_version("punctuation", "X");
        for content in ["Y", "Z", "W"] {
            definition.add_version(content.to_string(), false, None, "owner-1", None);
        }

        for ordinal in [3, 1, 4, 2] {
            definition.activate_version(ordinal, "owner-1").unwrap();
            let active_count = definition.versions.iter().filter(|v| v.is_active).count();
            assert_eq!(active_count, 1);
            assert_eq!(definition.current_version, ordinal);
        }
    }

    #[test]
    fn activating_a_missing_version_changes_nothing() {
        let mut definition = definition_with_version("punctuation", "X");

        let err = definition.activate_version(9, "owner-1").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(definition.current_version, 1);
        assert!(definition.version(1).unwrap().is_active);
    }

    #[test]
    fn ordinals_are_contiguous_from_one() {
        let mut definition = definition_with_version("punctuation", "X");
        for i in 2..=5 {
            let ordinal = definition.add_version(format!("v{}", i), false, None, "owner-1", None);
            assert_eq!(ordinal, i);
        }
        let mut ordinals: Vec<i32> = definition.versions.iter().map(|v| v.ordinal).collect();
        ordinals.sort_unstable();
        assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn usage_stats_track_running_averages() {
        let mut definition = definition_with_version("punctuation", "X");
        let weights = PopularityWeights::default();

        definition.record_usage(1000.0, 200.0, true, &weights);
        definition.record_usage(3000.0, 400.0, false, &weights);

        assert_eq!(definition.usage.total, 2);
        assert!((definition.usage.avg_response_ms - 2000.0).abs() < f64::EPSILON);
        assert!((definition.usage.avg_tokens - 300.0).abs() < f64::EPSILON);
        assert!((definition.usage.success_rate - 50.0).abs() < f64::EPSILON);
        assert!(definition.usage.last_used.is_some());
    }

    #[test]
    fn popularity_is_a_weighted_blend() {
        let mut definition = definition_with_version("punctuation", "X");
        definition.usage.total = 10;
        definition.usage.success_rate = 90.0;
        definition.usage.avg_response_ms = 2000.0;

        definition.recompute_popularity(&PopularityWeights::default());

        // 10 * 0.4 + 90 * 0.3 + (100 - 2) * 0.3
        assert!((definition.usage.popularity_score - 60.4).abs() < 1e-9);
    }

    #[test]
    fn visibility_respects_restriction_list_and_public_flag() {
        let mut definition = definition_with_version("punctuation", "X");

        // Not public, no restrictions: standard actors are out, owners pass.
        assert!(!definition.can_actor_use(&standard_actor()));
        assert!(definition.can_actor_use(&actor_with_role("owner-1", Role::Owner)));

        definition.is_public = true;
        assert!(definition.can_actor_use(&standard_actor()));

        // A restriction list overrides the public flag.
        definition.restricted_to = vec!["premium".to_string()];
        let mut premium = standard_actor();
        premium.tier = Tier::Premium;
        assert!(definition.can_actor_use(&premium));
        let mut free = standard_actor();
        free.tier = Tier::Free;
        assert!(!definition.can_actor_use(&free));

        // Soft-deleted definitions are invisible to everyone but the check.
        definition.deleted_at = Some(Utc::now());
        assert!(!definition.can_actor_use(&premium));
    }
}
