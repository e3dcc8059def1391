//! Dining table models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Table occupancy status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Occupied,
    Reserved,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Available => "available",
            TableStatus::Occupied => "occupied",
            TableStatus::Reserved => "reserved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(TableStatus::Available),
            "occupied" => Some(TableStatus::Occupied),
            "reserved" => Some(TableStatus::Reserved),
            _ => None,
        }
    }
}

/// A dining table
///
/// Occupied when a sale opens on it, released when that sale reaches a
/// terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiningTable {
    pub id: Uuid,
    pub number: i32,
    pub capacity: i32,
    pub location: Option<String>,
    pub status: TableStatus,
    pub occupied_since: Option<DateTime<Utc>>,
    pub customer: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
