use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Submission state for stow and relocate movements. Stored as the Spanish
/// `estado` column value the backend vocabulary uses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MovementState {
    Pending,
    Synced,
}

impl MovementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementState::Pending => "pendiente",
            MovementState::Synced => "sincronizada",
        }
    }

    pub fn parse_state(s: &str) -> Option<Self> {
        match s {
            "pendiente" => Some(MovementState::Pending),
            "sincronizada" => Some(MovementState::Synced),
            _ => None,
        }
    }
}

/// One picked line of an order.
///
/// Identity is the natural key `(order_id, article, scan_index)`; location,
/// lot and quantity are corrections the operator may apply in place.
/// `id` is `None` until the store assigns a row id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickedItem {
    pub id: Option<i64>,
    pub order_id: i64,
    pub article: String,
    /// Disambiguates independent scans of the same article within one order.
    pub scan_index: i32,
    pub location: String,
    pub lot: String,
    pub quantity: f64,
    pub depot: String,
    pub operator: String,
    pub created_at: DateTime<Utc>,
    pub synced: bool,
}

/// Cached summary of a remote order, refreshed from `/PP090/Lanzadas`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub depot: String,
    pub created_at: DateTime<Utc>,
    pub status: String,
    /// Serialized snapshot of the expected pick locations, kept opaque here.
    pub locations_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StowMovement {
    pub id: Option<i64>,
    pub lot: String,
    pub location: String,
    pub depot: String,
    pub created_at: DateTime<Utc>,
    pub state: MovementState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelocateMovement {
    pub id: Option<i64>,
    pub lot: String,
    pub origin: String,
    pub destination: String,
    pub depot: String,
    pub created_at: DateTime<Utc>,
    pub state: MovementState,
}
