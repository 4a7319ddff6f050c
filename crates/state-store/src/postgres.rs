use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    ActorId, ConflictDetection, DataRecord, Payload, RecordId, Result, StateStoreError, Version,
    registry::StateRegistry,
};

/// PostgreSQL-backed state registry.
///
/// Every domain shares the `records` table and is isolated by its
/// `domain` column. Version-checked writes are single conditional
/// `UPDATE` statements, so the check and the mutation are atomic.
#[derive(Clone)]
pub struct PostgresStateRegistry {
    pool: PgPool,
    domain: String,
}

impl PostgresStateRegistry {
    /// Creates a registry for one domain partition.
    pub fn new(pool: PgPool, domain: impl Into<String>) -> Self {
        Self {
            pool,
            domain: domain.into(),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the domain partition this registry writes to.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<DataRecord> {
        let id = RecordId::new(row.try_get::<String, _>("id")?);
        let payload = match row.try_get::<serde_json::Value, _>("payload")? {
            serde_json::Value::Object(map) => map,
            _ => return Err(StateStoreError::InvalidPayload(id)),
        };

        Ok(DataRecord {
            id,
            payload,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
            updated_by: ActorId::new(row.try_get::<String, _>("updated_by")?),
        })
    }

    async fn current_version(&self, id: &RecordId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM records WHERE domain = $1 AND id = $2")
                .bind(&self.domain)
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map(Version::new))
    }
}

#[async_trait]
impl StateRegistry for PostgresStateRegistry {
    async fn get(&self, id: &RecordId) -> Result<DataRecord> {
        let row = sqlx::query(
            r#"
            SELECT id, payload, version, updated_at, updated_by
            FROM records
            WHERE domain = $1 AND id = $2
            "#,
        )
        .bind(&self.domain)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(StateStoreError::NotFound(id.clone())),
        }
    }

    async fn create(&self, record: DataRecord) -> Result<DataRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO records (domain, id, payload, version, updated_at, updated_by)
            VALUES ($1, $2, $3, 1, $4, $5)
            ON CONFLICT (domain, id) DO NOTHING
            RETURNING id, payload, version, updated_at, updated_by
            "#,
        )
        .bind(&self.domain)
        .bind(record.id.as_str())
        .bind(serde_json::Value::Object(record.payload))
        .bind(record.updated_at)
        .bind(record.updated_by.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_record(row),
            None => Err(StateStoreError::AlreadyExists(record.id)),
        }
    }

    async fn attempt_update(
        &self,
        id: &RecordId,
        changes: Payload,
        expected_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection> {
        let fields: Vec<String> = changes.keys().cloned().collect();

        let new_version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE records
            SET payload = payload || $3, version = version + 1, updated_at = now(), updated_by = $4
            WHERE domain = $1 AND id = $2 AND version = $5
            RETURNING version
            "#,
        )
        .bind(&self.domain)
        .bind(id.as_str())
        .bind(serde_json::Value::Object(changes))
        .bind(actor.as_str())
        .bind(expected_version.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = new_version {
            return Ok(ConflictDetection::applied(
                Version::new(version),
                expected_version,
            ));
        }

        match self.current_version(id).await? {
            Some(current) => {
                tracing::debug!(
                    record_id = %id,
                    %current,
                    expected = %expected_version,
                    "version conflict detected"
                );
                Ok(ConflictDetection::conflict(
                    current,
                    expected_version,
                    &fields,
                ))
            }
            None => Err(StateStoreError::NotFound(id.clone())),
        }
    }

    async fn apply_resolution(
        &self,
        id: &RecordId,
        resolved: Payload,
        base_version: Version,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<ConflictDetection> {
        if new_version < base_version {
            return Err(StateStoreError::VersionRegression {
                record_id: id.clone(),
                current: base_version,
                requested: new_version,
            });
        }

        let fields: Vec<String> = resolved.keys().cloned().collect();

        if new_version == base_version {
            return match self.current_version(id).await? {
                Some(current) if current == base_version => {
                    Ok(ConflictDetection::applied(current, base_version))
                }
                Some(current) => Ok(ConflictDetection::conflict(current, base_version, &fields)),
                None => Err(StateStoreError::NotFound(id.clone())),
            };
        }

        let written: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE records
            SET payload = $3, version = $4, updated_at = now(), updated_by = $5
            WHERE domain = $1 AND id = $2 AND version = $6
            RETURNING version
            "#,
        )
        .bind(&self.domain)
        .bind(id.as_str())
        .bind(serde_json::Value::Object(resolved))
        .bind(new_version.as_i64())
        .bind(actor.as_str())
        .bind(base_version.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = written {
            return Ok(ConflictDetection::applied(Version::new(version), base_version));
        }

        match self.current_version(id).await? {
            Some(current) => Ok(ConflictDetection::conflict(current, base_version, &fields)),
            None => Err(StateStoreError::NotFound(id.clone())),
        }
    }

    async fn force_apply(
        &self,
        id: &RecordId,
        resolved: Payload,
        new_version: Version,
        actor: &ActorId,
    ) -> Result<DataRecord> {
        let row = sqlx::query(
            r#"
            UPDATE records
            SET payload = $3, version = $4, updated_at = now(), updated_by = $5
            WHERE domain = $1 AND id = $2 AND version <= $4
            RETURNING id, payload, version, updated_at, updated_by
            "#,
        )
        .bind(&self.domain)
        .bind(id.as_str())
        .bind(serde_json::Value::Object(resolved))
        .bind(new_version.as_i64())
        .bind(actor.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_record(row);
        }

        match self.current_version(id).await? {
            Some(current) => Err(StateStoreError::VersionRegression {
                record_id: id.clone(),
                current,
                requested: new_version,
            }),
            None => Err(StateStoreError::NotFound(id.clone())),
        }
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM records WHERE domain = $1 AND id = $2")
            .bind(&self.domain)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE domain = $1")
            .bind(&self.domain)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}
