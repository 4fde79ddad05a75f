use super::{StoreBackend, StoreError};
use crate::config::StoreConfig;
use crate::models::{AppAllowlistEntry, CreateGroup, Group, GroupMembership, UpdateGroup};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use uuid::Uuid;

const GROUP_COLUMNS: &str = "id, name, tenant_id, description, group_type, created_at, updated_at";
const MEMBER_COLUMNS: &str = "group_id, user_id, tenant_id, role, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    tenant_id: String,
    description: String,
    group_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = StoreError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        Ok(Group {
            group_type: row.group_type.parse().map_err(StoreError::Backend)?,
            id: row.id,
            name: row.name,
            tenant_id: row.tenant_id,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    group_id: String,
    user_id: String,
    tenant_id: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MemberRow> for GroupMembership {
    fn from(row: MemberRow) -> Self {
        GroupMembership {
            group_id: row.group_id,
            user_id: row.user_id,
            tenant_id: row.tenant_id,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AllowlistRow {
    group_id: String,
    app_client_id: String,
}

impl From<AllowlistRow> for AppAllowlistEntry {
    fn from(row: AllowlistRow) -> Self {
        AppAllowlistEntry::new(row.group_id, row.app_client_id)
    }
}

/// Map a driver error onto the store outcomes callers can act on
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::DuplicateKey,
        sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
            StoreError::ForeignKeyViolation
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

fn into_groups(rows: Vec<GroupRow>) -> Result<Vec<Group>, StoreError> {
    rows.into_iter().map(Group::try_from).collect()
}

/// Postgres backed store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Open a connection pool
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        info!(
            "Connecting to PostgreSQL (max_connections={}, min_connections={})",
            config.max_connections, config.min_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");
        Ok(Self { pool })
    }

    /// Apply the embedded schema migrations
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for PostgresStore {
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {} FROM groups ORDER BY name",
            GROUP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        into_groups(rows)
    }

    async fn create_group(&self, input: &CreateGroup) -> Result<Group, StoreError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            INSERT INTO groups (id, name, tenant_id, description, group_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            GROUP_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(&input.name)
        .bind(&input.tenant_id)
        .bind(&input.description)
        .bind(input.group_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Group::try_from(row)
    }

    async fn get_group(&self, group_id: &str) -> Result<Group, StoreError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            "SELECT {} FROM groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or(StoreError::NotFound)?;
        Group::try_from(row)
    }

    async fn update_group(
        &self,
        group_id: &str,
        input: &UpdateGroup,
    ) -> Result<Group, StoreError> {
        let row = sqlx::query_as::<_, GroupRow>(&format!(
            r#"
            UPDATE groups
            SET description = COALESCE($2, description), updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            GROUP_COLUMNS
        ))
        .bind(group_id)
        .bind(input.description.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or(StoreError::NotFound)?;
        Group::try_from(row)
    }

    async fn delete_group(&self, group_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn add_members(
        &self,
        group_id: &str,
        user_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError> {
        // The tenant lookup yields '' for an unknown group so the foreign key
        // constraint, not a NULL check, rejects the insert.
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, tenant_id, role)
            SELECT $1, u, COALESCE((SELECT tenant_id FROM groups WHERE id = $1), ''), $3
            FROM UNNEST($2::text[]) AS t(u)
            "#,
        )
        .bind(group_id)
        .bind(user_ids.to_vec())
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn list_members(&self, group_id: &str) -> Result<Vec<GroupMembership>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM group_members WHERE group_id = $1 ORDER BY user_id",
            MEMBER_COLUMNS
        ))
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(GroupMembership::from).collect())
    }

    async fn remove_members(&self, group_id: &str, user_ids: &[String]) -> Result<u64, StoreError> {
        let result =
            sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = ANY($2)")
                .bind(group_id)
                .bind(user_ids.to_vec())
                .execute(&self.pool)
                .await
                .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT g.id, g.name, g.tenant_id, g.description, g.group_type, g.created_at, g.updated_at
            FROM groups g
            JOIN group_members m ON m.group_id = g.id
            WHERE m.user_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        into_groups(rows)
    }

    async fn memberships_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let rows = sqlx::query_as::<_, MemberRow>(&format!(
            "SELECT {} FROM group_members WHERE user_id = $1 ORDER BY group_id",
            MEMBER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(GroupMembership::from).collect())
    }

    async fn delete_user_memberships_except(
        &self,
        user_id: &str,
        keep: &[String],
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM group_members WHERE user_id = $1 AND NOT (group_id = ANY($2))",
        )
        .bind(user_id)
        .bind(keep.to_vec())
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn upsert_user_memberships(
        &self,
        user_id: &str,
        group_ids: &[String],
        role: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, tenant_id, role)
            SELECT g, $2, COALESCE((SELECT tenant_id FROM groups WHERE id = g), ''), $3
            FROM UNNEST($1::text[]) AS t(g)
            ON CONFLICT (group_id, user_id) DO UPDATE SET updated_at = now()
            "#,
        )
        .bind(group_ids.to_vec())
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn insert_allowlist_entries(
        &self,
        entries: &[AppAllowlistEntry],
    ) -> Result<(), StoreError> {
        let (group_ids, app_ids): (Vec<String>, Vec<String>) = entries
            .iter()
            .map(|e| (e.group_id.clone(), e.app_client_id.clone()))
            .unzip();

        sqlx::query(
            r#"
            INSERT INTO app_allowlist (group_id, app_client_id)
            SELECT * FROM UNNEST($1::text[], $2::text[])
            "#,
        )
        .bind(group_ids)
        .bind(app_ids)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn delete_allowlist_entry(&self, entry: &AppAllowlistEntry) -> Result<(), StoreError> {
        let result =
            sqlx::query("DELETE FROM app_allowlist WHERE group_id = $1 AND app_client_id = $2")
                .bind(&entry.group_id)
                .bind(&entry.app_client_id)
                .execute(&self.pool)
                .await
                .map_err(classify)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_allowlist_for_group(
        &self,
        group_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AllowlistRow>(
            "DELETE FROM app_allowlist WHERE group_id = $1 RETURNING group_id, app_client_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(AppAllowlistEntry::from).collect())
    }

    async fn delete_allowlist_for_app(
        &self,
        app_client_id: &str,
    ) -> Result<Vec<AppAllowlistEntry>, StoreError> {
        let rows = sqlx::query_as::<_, AllowlistRow>(
            "DELETE FROM app_allowlist WHERE app_client_id = $1 RETURNING group_id, app_client_id",
        )
        .bind(app_client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(AppAllowlistEntry::from).collect())
    }

    async fn allowed_apps(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT app_client_id FROM app_allowlist WHERE group_id = $1 ORDER BY app_client_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn allowed_groups(&self, app_client_id: &str) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar::<_, String>(
            "SELECT group_id FROM app_allowlist WHERE app_client_id = $1 ORDER BY group_id",
        )
        .bind(app_client_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn health_check(&self) -> Result<(), String> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Health check failed: {}", e))?;
        Ok(())
    }
}
