//! Dining table service
//!
//! Tables are occupied when a sale opens on them and released when the
//! sale reaches a terminal state; the sale service drives both through
//! the `occupy`/`release` helpers inside its own transaction.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use shared::{DiningTable, TableStatus};

use crate::error::{AppError, AppResult};

/// Service for dining tables
#[derive(Clone)]
pub struct TableService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct TableRow {
    id: Uuid,
    number: i32,
    capacity: i32,
    location: Option<String>,
    status: String,
    occupied_since: Option<DateTime<Utc>>,
    customer: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TableRow> for DiningTable {
    type Error = AppError;

    fn try_from(row: TableRow) -> Result<Self, Self::Error> {
        let status = TableStatus::parse(&row.status).ok_or_else(|| {
            AppError::Consistency(format!("unknown table status '{}'", row.status))
        })?;
        Ok(DiningTable {
            id: row.id,
            number: row.number,
            capacity: row.capacity,
            location: row.location,
            status,
            occupied_since: row.occupied_since,
            customer: row.customer,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Input for creating a table
#[derive(Debug, Deserialize)]
pub struct CreateTableInput {
    pub number: i32,
    pub capacity: Option<i32>,
    pub location: Option<String>,
}

/// Input for occupying a table manually
#[derive(Debug, Default, Deserialize)]
pub struct OccupyTableInput {
    pub customer: Option<String>,
}

const TABLE_COLUMNS: &str =
    "id, number, capacity, location, status, occupied_since, customer, is_active, \
     created_at, updated_at";

impl TableService {
    /// Create a new TableService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Mark a table occupied. Runs inside the caller's transaction.
    pub(crate) async fn occupy(
        conn: &mut PgConnection,
        table_id: Uuid,
        customer: Option<&str>,
    ) -> AppResult<()> {
        let status: String =
            sqlx::query_scalar("SELECT status FROM dining_tables WHERE id = $1 FOR UPDATE")
                .bind(table_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| AppError::NotFound("Table".to_string()))?;

        if status == TableStatus::Occupied.as_str() {
            return Err(AppError::Conflict {
                resource: "table".to_string(),
                message: "Table is already occupied".to_string(),
                message_fr: "La table est déjà occupée".to_string(),
            });
        }

        sqlx::query(
            "UPDATE dining_tables \
             SET status = 'occupied', occupied_since = NOW(), customer = $1, updated_at = NOW() \
             WHERE id = $2",
        )
        .bind(customer)
        .bind(table_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Release a table. Runs inside the caller's transaction.
    pub(crate) async fn release(conn: &mut PgConnection, table_id: Uuid) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE dining_tables \
             SET status = 'available', occupied_since = NULL, customer = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(table_id)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::NotFound("Table".to_string()));
        }

        Ok(())
    }

    /// Create a table
    pub async fn create_table(&self, input: CreateTableInput) -> AppResult<DiningTable> {
        if input.number <= 0 {
            return Err(AppError::Validation {
                field: "number".to_string(),
                message: "Table number must be positive".to_string(),
                message_fr: "Le numéro de table doit être positif".to_string(),
            });
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM dining_tables WHERE number = $1)")
                .bind(input.number)
                .fetch_one(&self.db)
                .await?;
        if exists {
            return Err(AppError::DuplicateEntry("table number".to_string()));
        }

        let row = sqlx::query_as::<_, TableRow>(&format!(
            "INSERT INTO dining_tables (number, capacity, location) \
             VALUES ($1, $2, $3) RETURNING {TABLE_COLUMNS}"
        ))
        .bind(input.number)
        .bind(input.capacity.unwrap_or(4))
        .bind(&input.location)
        .fetch_one(&self.db)
        .await?;

        row.try_into()
    }

    /// Get a table by ID
    pub async fn get_table(&self, table_id: Uuid) -> AppResult<DiningTable> {
        sqlx::query_as::<_, TableRow>(&format!(
            "SELECT {TABLE_COLUMNS} FROM dining_tables WHERE id = $1"
        ))
        .bind(table_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Table".to_string()))?
        .try_into()
    }

    /// List tables, optionally only those in a given status
    pub async fn list_tables(&self, status: Option<TableStatus>) -> AppResult<Vec<DiningTable>> {
        let rows = sqlx::query_as::<_, TableRow>(&format!(
            "SELECT {TABLE_COLUMNS} FROM dining_tables \
             WHERE is_active = TRUE AND ($1::text IS NULL OR status = $1) \
             ORDER BY number ASC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Occupy a table manually (walk-in without a sale yet)
    pub async fn occupy_table(
        &self,
        table_id: Uuid,
        input: OccupyTableInput,
    ) -> AppResult<DiningTable> {
        let mut tx = self.db.begin().await?;
        Self::occupy(&mut tx, table_id, input.customer.as_deref()).await?;
        tx.commit().await?;
        self.get_table(table_id).await
    }

    /// Release a table manually
    pub async fn release_table(&self, table_id: Uuid) -> AppResult<DiningTable> {
        let mut tx = self.db.begin().await?;
        Self::release(&mut tx, table_id).await?;
        tx.commit().await?;
        self.get_table(table_id).await
    }
}
