//! Stock alert notification collaborator
//!
//! Fire-and-forget: alerts are written after the business transaction
//! commits, failures are logged and swallowed so a broken alert sink
//! can never abort a payment or a sale.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::Unit;

use crate::error::{AppError, AppResult};

/// Service for stock alerts
#[derive(Clone)]
pub struct NotificationService {
    db: PgPool,
}

/// Alert severity
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    LowStock,
    OutOfStock,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::LowStock => "low_stock",
            AlertLevel::OutOfStock => "out_of_stock",
        }
    }
}

/// What kind of entity an alert refers to
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertEntity {
    Product,
    Ingredient,
}

impl AlertEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertEntity::Product => "product",
            AlertEntity::Ingredient => "ingredient",
        }
    }
}

/// An alert produced by the deduction engine, not yet persisted
#[derive(Debug, Clone)]
pub struct StockAlertDraft {
    pub entity_type: AlertEntity,
    pub entity_id: Uuid,
    pub name: String,
    pub alert_type: AlertLevel,
    pub quantity: Decimal,
    pub unit: Option<Unit>,
}

impl StockAlertDraft {
    fn messages(&self) -> (String, String) {
        let unit = self.unit.map(|u| format!(" {}", u)).unwrap_or_default();
        match self.alert_type {
            AlertLevel::LowStock => (
                format!("Low stock for {}: {}{} remaining", self.name, self.quantity, unit),
                format!(
                    "Stock faible pour {} : {}{} restant",
                    self.name, self.quantity, unit
                ),
            ),
            AlertLevel::OutOfStock => (
                format!("{} is out of stock", self.name),
                format!("{} est en rupture de stock", self.name),
            ),
        }
    }
}

/// A persisted stock alert
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockAlert {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub entity_name: String,
    pub alert_type: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub message: String,
    pub message_fr: String,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

const ALERT_COLUMNS: &str = "id, entity_type, entity_id, entity_name, alert_type, quantity, \
                             unit, message, message_fr, acknowledged, created_at";

impl NotificationService {
    /// Create a new NotificationService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Persist stock alerts. Failures are logged and swallowed; an open
    /// alert for the same entity and level is not duplicated.
    pub async fn record_stock_alerts(&self, alerts: &[StockAlertDraft]) {
        for draft in alerts {
            let (message, message_fr) = draft.messages();

            tracing::warn!(
                entity_id = %draft.entity_id,
                name = %draft.name,
                level = draft.alert_type.as_str(),
                quantity = %draft.quantity,
                "stock alert"
            );

            let result = sqlx::query(
                "INSERT INTO stock_alerts \
                 (entity_type, entity_id, entity_name, alert_type, quantity, unit, message, message_fr) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (entity_type, entity_id, alert_type) WHERE acknowledged = FALSE \
                 DO NOTHING",
            )
            .bind(draft.entity_type.as_str())
            .bind(draft.entity_id)
            .bind(&draft.name)
            .bind(draft.alert_type.as_str())
            .bind(draft.quantity)
            .bind(draft.unit.map(|u| u.as_str()))
            .bind(&message)
            .bind(&message_fr)
            .execute(&self.db)
            .await;

            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to record stock alert");
            }
        }
    }

    /// List unacknowledged alerts, most recent first
    pub async fn list_active_alerts(&self) -> AppResult<Vec<StockAlert>> {
        let alerts = sqlx::query_as::<_, StockAlert>(&format!(
            "SELECT {ALERT_COLUMNS} FROM stock_alerts \
             WHERE acknowledged = FALSE ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(alerts)
    }

    /// Acknowledge an alert
    pub async fn acknowledge_alert(&self, alert_id: Uuid) -> AppResult<StockAlert> {
        sqlx::query_as::<_, StockAlert>(&format!(
            "UPDATE stock_alerts SET acknowledged = TRUE \
             WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        ))
        .bind(alert_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Alert".to_string()))
    }
}
