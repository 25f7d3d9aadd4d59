use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::prompts::dtos::{AddVersionDto, CreateDefinitionDto, DefinitionQueryParams};
use crate::features::prompts::models::{
    PopularityWeights, PromptCategory, PromptDefinition, PromptScope, PromptType, PromptVersion,
    UsageStats,
};
use crate::modules::vault::{Envelope, PromptVault};
use crate::shared::constants::SYSTEM_ACTOR;

/// Decrypted active content handed to the generation path. The content
/// travels only into the text-generation request and is never logged.
#[derive(Debug, Clone)]
pub struct ActiveContent {
    pub definition_id: Uuid,
    pub key: String,
    pub ordinal: i32,
    pub content: String,
    pub system_instruction: Option<String>,
}

/// Convert database errors to specific responses: unique-constraint
/// violations on create are duplicate-key conflicts, activation races
/// surface on the single-active partial index.
fn handle_db_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.code() == Some(Cow::Borrowed("23505")) {
            if let Some(constraint) = db_err.constraint() {
                if constraint.contains("one_active") {
                    return AppError::Conflict(
                        "A concurrent activation for this definition won the race".to_string(),
                    );
                }
            }
            return AppError::DuplicateKey(
                "A definition with this key or name already exists".to_string(),
            );
        }
        if db_err.code() == Some(Cow::Borrowed("23503")) {
            return AppError::BadRequest("Referenced record does not exist".to_string());
        }
    }
    AppError::Database(e)
}

#[derive(Debug, FromRow)]
struct DefinitionRow {
    id: Uuid,
    key: String,
    name: String,
    description: Option<String>,
    prompt_type: String,
    category: String,
    scope: String,
    tags: serde_json::Value,
    is_public: bool,
    is_active: bool,
    restricted_to: serde_json::Value,
    current_version: i32,
    usage_total: i64,
    usage_success_rate: f64,
    usage_avg_response_ms: f64,
    usage_avg_tokens: f64,
    usage_last_used: Option<DateTime<Utc>>,
    popularity_score: f64,
    created_by: String,
    last_modified_by: Option<String>,
    deleted_at: Option<DateTime<Utc>>,
    delete_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct VersionRow {
    id: Uuid,
    ordinal: i32,
    content: String,
    is_encrypted: bool,
    system_instruction: Option<String>,
    author: String,
    changelog: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

const DEFINITION_COLUMNS: &str = "id, key, name, description, prompt_type, category, scope, \
     tags, is_public, is_active, restricted_to, current_version, usage_total, \
     usage_success_rate, usage_avg_response_ms, usage_avg_tokens, usage_last_used, \
     popularity_score, created_by, last_modified_by, deleted_at, delete_reason, \
     created_at, updated_at";

const VERSION_COLUMNS: &str = "id, ordinal, content, is_encrypted, system_instruction, author, \
     changelog, is_active, created_at";

impl VersionRow {
    fn into_model(self) -> PromptVersion {
        PromptVersion {
            id: self.id,
            ordinal: self.ordinal,
            content: self.content,
            is_encrypted: self.is_encrypted,
            system_instruction: self.system_instruction,
            author: self.author,
            changelog: self.changelog,
            is_active: self.is_active,
            created_at: self.created_at,
        }
    }
}

impl DefinitionRow {
    fn into_model(self, versions: Vec<PromptVersion>) -> Result<PromptDefinition> {
        let prompt_type = PromptType::parse(&self.prompt_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown prompt type: {}", self.prompt_type))
        })?;
        let category = PromptCategory::parse(&self.category)
            .ok_or_else(|| AppError::Internal(format!("Unknown category: {}", self.category)))?;
        let scope = PromptScope::parse(&self.scope)
            .ok_or_else(|| AppError::Internal(format!("Unknown scope: {}", self.scope)))?;
        let tags: Vec<String> = serde_json::from_value(self.tags).unwrap_or_default();
        let restricted_to: Vec<String> =
            serde_json::from_value(self.restricted_to).unwrap_or_default();

        Ok(PromptDefinition {
            id: self.id,
            key: self.key,
            name: self.name,
            description: self.description,
            prompt_type,
            category,
            scope,
            tags,
            is_public: self.is_public,
            is_active: self.is_active,
            restricted_to,
            current_version: self.current_version,
            usage: UsageStats {
                total: self.usage_total,
                success_rate: self.usage_success_rate,
                avg_response_ms: self.usage_avg_response_ms,
                avg_tokens: self.usage_avg_tokens,
                last_used: self.usage_last_used,
                popularity_score: self.popularity_score,
            },
            created_by: self.created_by,
            last_modified_by: self.last_modified_by,
            deleted_at: self.deleted_at,
            delete_reason: self.delete_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
            versions,
        })
    }
}

/// Version store over Postgres. Content is stored opaquely; the vault pass
/// happens here at the boundary, sealed for the reserved system actor.
/// Activation runs in a transaction with the definition row locked so the
/// single-active invariant is never transiently violated for any reader.
pub struct PromptService {
    pool: PgPool,
    vault: Arc<PromptVault>,
    weights: PopularityWeights,
}

impl PromptService {
    pub fn new(pool: PgPool, vault: Arc<PromptVault>) -> Self {
        Self {
            pool,
            vault,
            weights: PopularityWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: PopularityWeights) -> Self {
        self.weights = weights;
        self
    }

    fn seal_content(&self, content: &str, store_plaintext: bool) -> Result<(String, bool)> {
        if store_plaintext {
            return Ok((content.to_string(), false));
        }
        let envelope = self.vault.seal(content, SYSTEM_ACTOR)?;
        let serialized = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(format!("Failed to serialize envelope: {}", e)))?;
        Ok((serialized, true))
    }

    fn open_content(&self, version: &PromptVersion) -> Result<String> {
        if !version.is_encrypted {
            return Ok(version.content.clone());
        }
        let envelope: Envelope =
            serde_json::from_str(&version.content).map_err(|_| AppError::IntegrityFailure)?;
        Ok(self.vault.open(&envelope, SYSTEM_ACTOR)?)
    }

    /// Create a definition with its initial version, which becomes active
    /// immediately.
    pub async fn create_definition(
        &self,
        dto: CreateDefinitionDto,
        author: &str,
    ) -> Result<PromptDefinition> {
        let (content, is_encrypted) = self.seal_content(&dto.content, dto.store_plaintext)?;

        let tags = serde_json::to_value(&dto.tags).unwrap_or_default();
        let restricted_to = serde_json::to_value(&dto.restricted_to).unwrap_or_default();

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        let definition_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO prompt_definitions (
                key, name, description, prompt_type, category, scope, tags,
                is_public, restricted_to, current_version, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 1, $10)
            RETURNING id
            "#,
        )
        .bind(&dto.key)
        .bind(&dto.name)
        .bind(&dto.description)
        .bind(dto.prompt_type.as_str())
        .bind(dto.category.as_str())
        .bind(dto.scope.as_str())
        .bind(&tags)
        .bind(dto.is_public)
        .bind(&restricted_to)
        .bind(author)
        .fetch_one(&mut *tx)
        .await
        .map_err(handle_db_error)?;

        sqlx::query(
            r#"
            INSERT INTO prompt_versions (
                definition_id, ordinal, content, is_encrypted,
                system_instruction, author, changelog, is_active
            )
            VALUES ($1, 1, $2, $3, $4, $5, $6, TRUE)
            "#,
        )
        .bind(definition_id)
        .bind(&content)
        .bind(is_encrypted)
        .bind(&dto.system_instruction)
        .bind(author)
        .bind(&dto.changelog)
        .execute(&mut *tx)
        .await
        .map_err(handle_db_error)?;

        tx.commit().await.map_err(AppError::Database)?;

        self.get_definition(definition_id).await
    }

    async fn load_versions(&self, definition_id: Uuid) -> Result<Vec<PromptVersion>> {
        let rows: Vec<VersionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM prompt_versions WHERE definition_id = $1 ORDER BY ordinal",
            VERSION_COLUMNS
        ))
        .bind(definition_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows.into_iter().map(VersionRow::into_model).collect())
    }

    /// Load a definition aggregate by id, tombstoned ones included.
    pub async fn get_definition(&self, id: Uuid) -> Result<PromptDefinition> {
        let row: DefinitionRow = sqlx::query_as(&format!(
            "SELECT {} FROM prompt_definitions WHERE id = $1",
            DEFINITION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Definition {} not found", id)))?;

        let versions = self.load_versions(id).await?;
        row.into_model(versions)
    }

    /// Load a live (non-deleted, active) definition by machine key.
    pub async fn get_definition_by_key(&self, key: &str) -> Result<PromptDefinition> {
        let row: DefinitionRow = sqlx::query_as(&format!(
            "SELECT {} FROM prompt_definitions \
             WHERE key = $1 AND deleted_at IS NULL AND is_active",
            DEFINITION_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Definition '{}' not found", key)))?;

        let id = row.id;
        let versions = self.load_versions(id).await?;
        row.into_model(versions)
    }

    /// List definitions with pagination and filters.
    pub async fn list(
        &self,
        params: &DefinitionQueryParams,
    ) -> Result<(Vec<PromptDefinition>, i64)> {
        let mut count_builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM prompt_definitions WHERE 1=1");
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM prompt_definitions WHERE 1=1",
            DEFINITION_COLUMNS
        ));

        for qb in [&mut count_builder, &mut builder] {
            if !params.include_deleted {
                qb.push(" AND deleted_at IS NULL");
            }
            if let Some(is_active) = params.is_active {
                qb.push(" AND is_active = ").push_bind(is_active);
            }
            if let Some(prompt_type) = params.prompt_type {
                qb.push(" AND prompt_type = ").push_bind(prompt_type.as_str());
            }
            if let Some(search) = &params.search {
                let pattern = format!("%{}%", search);
                qb.push(" AND (key ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR description ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)?;

        builder
            .push(format!(" ORDER BY created_at {} OFFSET ", params.sort.as_sql()))
            .push_bind(params.offset())
            .push(" LIMIT ")
            .push_bind(params.limit());

        let rows: Vec<DefinitionRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            let versions = self.load_versions(id).await?;
            definitions.push(row.into_model(versions)?);
        }

        Ok((definitions, total))
    }

    /// Append a new inactive version; the active version is untouched.
    /// Returns the assigned ordinal.
    pub async fn add_version(
        &self,
        definition_id: Uuid,
        dto: AddVersionDto,
        author: &str,
    ) -> Result<i32> {
        let (content, is_encrypted) = self.seal_content(&dto.content, dto.store_plaintext)?;

        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        self.lock_definition(&mut tx, definition_id).await?;

        let ordinal: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(ordinal), 0) + 1 FROM prompt_versions WHERE definition_id = $1",
        )
        .bind(definition_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO prompt_versions (
                definition_id, ordinal, content, is_encrypted,
                system_instruction, author, changelog, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
            "#,
        )
        .bind(definition_id)
        .bind(ordinal)
        .bind(&content)
        .bind(is_encrypted)
        .bind(&dto.system_instruction)
        .bind(author)
        .bind(&dto.changelog)
        .execute(&mut *tx)
        .await
        .map_err(handle_db_error)?;

        sqlx::query(
            "UPDATE prompt_definitions SET last_modified_by = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(definition_id)
        .bind(author)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(ordinal)
    }

    /// Atomically clear all activation flags, set exactly one, and move the
    /// current-version pointer. Concurrent activations for the same
    /// definition serialize on the definition row lock.
    pub async fn activate_version(
        &self,
        definition_id: Uuid,
        ordinal: i32,
        activated_by: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        self.lock_definition(&mut tx, definition_id).await?;

        sqlx::query(
            "UPDATE prompt_versions SET is_active = FALSE WHERE definition_id = $1 AND is_active",
        )
        .bind(definition_id)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        let activated = sqlx::query(
            "UPDATE prompt_versions SET is_active = TRUE WHERE definition_id = $1 AND ordinal = $2",
        )
        .bind(definition_id)
        .bind(ordinal)
        .execute(&mut *tx)
        .await
        .map_err(handle_db_error)?;

        if activated.rows_affected() == 0 {
            // Transaction rolls back on drop; the previous flags survive.
            return Err(AppError::NotFound(format!(
                "Version {} not found for definition {}",
                ordinal, definition_id
            )));
        }

        sqlx::query(
            "UPDATE prompt_definitions \
             SET current_version = $2, last_modified_by = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(definition_id)
        .bind(ordinal)
        .bind(activated_by)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    /// Decrypted content of the active version.
    pub async fn get_active_content(&self, definition_id: Uuid) -> Result<ActiveContent> {
        let definition = self.get_definition(definition_id).await?;
        self.active_content_of(&definition)
    }

    pub fn active_content_of(&self, definition: &PromptDefinition) -> Result<ActiveContent> {
        if definition.deleted_at.is_some() {
            return Err(AppError::NotFound(format!(
                "Definition {} not found",
                definition.id
            )));
        }
        let version = definition.active_version().ok_or_else(|| {
            AppError::NotFound(format!(
                "Definition {} has no active version",
                definition.key
            ))
        })?;

        let content = self.open_content(version)?;
        Ok(ActiveContent {
            definition_id: definition.id,
            key: definition.key.clone(),
            ordinal: version.ordinal,
            content,
            system_instruction: version.system_instruction.clone(),
        })
    }

    /// All versions with decrypted content, for the role-restricted editing
    /// path only.
    pub async fn list_for_editing(
        &self,
        definition_id: Uuid,
    ) -> Result<Vec<(PromptVersion, String)>> {
        let definition = self.get_definition(definition_id).await?;

        let mut versions = Vec::with_capacity(definition.versions.len());
        for version in definition.versions {
            let content = self.open_content(&version)?;
            versions.push((version, content));
        }
        Ok(versions)
    }

    /// Soft delete: tombstone with mandatory reason; content rows are
    /// retained, nothing is silently hard-deleted. Returns the metadata as it
    /// was before deletion, for the audit snapshot.
    pub async fn delete_definition(
        &self,
        definition_id: Uuid,
        reason: &str,
        deleted_by: &str,
    ) -> Result<PromptDefinition> {
        let before = self.get_definition(definition_id).await?;
        if before.deleted_at.is_some() {
            return Err(AppError::NotFound(format!(
                "Definition {} not found",
                definition_id
            )));
        }

        let result = sqlx::query(
            "UPDATE prompt_definitions \
             SET is_active = FALSE, deleted_at = NOW(), delete_reason = $2, \
                 last_modified_by = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(definition_id)
        .bind(reason)
        .bind(deleted_by)
        .execute(&self.pool)
        .await
        .map_err(AppError::Database)?;

        // A concurrent delete may have tombstoned the row first.
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Definition {} not found",
                definition_id
            )));
        }

        Ok(before)
    }

    /// Fold one usage sample into the definition's aggregated stats and
    /// recompute the popularity score.
    pub async fn record_usage(
        &self,
        definition_id: Uuid,
        response_ms: f64,
        tokens: f64,
        success: bool,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        #[derive(FromRow)]
        struct UsageRow {
            usage_total: i64,
            usage_success_rate: f64,
            usage_avg_response_ms: f64,
            usage_avg_tokens: f64,
            usage_last_used: Option<DateTime<Utc>>,
            popularity_score: f64,
        }

        let row: UsageRow = sqlx::query_as(
            "SELECT usage_total, usage_success_rate, usage_avg_response_ms, \
                    usage_avg_tokens, usage_last_used, popularity_score \
             FROM prompt_definitions WHERE id = $1 FOR UPDATE",
        )
        .bind(definition_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::NotFound(format!("Definition {} not found", definition_id)))?;

        let mut usage = UsageStats {
            total: row.usage_total,
            success_rate: row.usage_success_rate,
            avg_response_ms: row.usage_avg_response_ms,
            avg_tokens: row.usage_avg_tokens,
            last_used: row.usage_last_used,
            popularity_score: row.popularity_score,
        };
        usage.fold(response_ms, tokens, success);
        usage.popularity_score = usage.weighted_popularity(&self.weights);

        sqlx::query(
            "UPDATE prompt_definitions \
             SET usage_total = $2, usage_success_rate = $3, usage_avg_response_ms = $4, \
                 usage_avg_tokens = $5, usage_last_used = $6, popularity_score = $7 \
             WHERE id = $1",
        )
        .bind(definition_id)
        .bind(usage.total)
        .bind(usage.success_rate)
        .bind(usage.avg_response_ms)
        .bind(usage.avg_tokens)
        .bind(usage.last_used)
        .bind(usage.popularity_score)
        .execute(&mut *tx)
        .await
        .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    async fn lock_definition(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        definition_id: Uuid,
    ) -> Result<()> {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM prompt_definitions \
             WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(definition_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(AppError::Database)?;

        found
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Definition {} not found", definition_id)))
    }
}
