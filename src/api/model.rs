//! Wire models for the inventory backend. Field names on the wire are the
//! backend's Spanish vocabulary; Rust field names stay English.

use crate::model::{PickedItem, RelocateMovement, StowMovement};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LoginResp {
    pub token: String,
}

/// A tenant, as listed by `/Empresa/Get`.
#[derive(Debug, Clone, Deserialize)]
pub struct Empresa {
    pub id: String,
    pub nombre: String,
}

/// One line of a pick submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickLine {
    #[serde(rename = "ubicacion")]
    pub location: String,
    #[serde(rename = "cantidad")]
    pub quantity: f64,
    #[serde(rename = "articulo")]
    pub article: String,
    #[serde(rename = "deposito")]
    pub depot: String,
    #[serde(rename = "partida")]
    pub lot: String,
    #[serde(rename = "usuario")]
    pub user: String,
}

impl From<&PickedItem> for PickLine {
    fn from(rec: &PickedItem) -> Self {
        Self {
            location: rec.location.clone(),
            quantity: rec.quantity,
            article: rec.article.clone(),
            depot: rec.depot.clone(),
            lot: rec.lot.clone(),
            user: rec.operator.clone(),
        }
    }
}

/// Body of `POST /UB082/RecolectarPedido`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickOrderReq {
    #[serde(rename = "pedido")]
    pub order_id: i64,
    #[serde(rename = "deposito")]
    pub depot: String,
    #[serde(rename = "items")]
    pub items: Vec<PickLine>,
}

impl PickOrderReq {
    pub fn from_records(order_id: i64, depot: &str, records: &[PickedItem]) -> Self {
        Self {
            order_id,
            depot: depot.to_string(),
            items: records.iter().map(PickLine::from).collect(),
        }
    }
}

/// One line of a stow submission (`POST /UB090/EstibarPartidas`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StowLine {
    #[serde(rename = "partida")]
    pub lot: String,
    #[serde(rename = "ubicacion")]
    pub location: String,
    #[serde(rename = "deposito")]
    pub depot: String,
}

impl From<&StowMovement> for StowLine {
    fn from(rec: &StowMovement) -> Self {
        Self {
            lot: rec.lot.clone(),
            location: rec.location.clone(),
            depot: rec.depot.clone(),
        }
    }
}

/// One line of a relocate submission (`POST /UB091/ReubicarPartidas`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelocateLine {
    #[serde(rename = "partida")]
    pub lot: String,
    #[serde(rename = "ubicacion_origen")]
    pub origin: String,
    #[serde(rename = "ubicacion_destino")]
    pub destination: String,
    #[serde(rename = "deposito")]
    pub depot: String,
}

impl From<&RelocateMovement> for RelocateLine {
    fn from(rec: &RelocateMovement) -> Self {
        Self {
            lot: rec.lot.clone(),
            origin: rec.origin.clone(),
            destination: rec.destination.clone(),
            depot: rec.depot.clone(),
        }
    }
}

/// Open order summary from `/PP090/Lanzadas`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteOrder {
    pub id: i64,
    pub deposito: String,
    pub fecha_creacion: chrono::DateTime<chrono::Utc>,
    pub estado: String,
    /// Expected pick locations, kept as an opaque snapshot.
    #[serde(default)]
    pub ubicaciones: serde_json::Value,
}

/// Location suggestion returned by the `Ubicaciones*` endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationHint {
    pub ubicacion: String,
    #[serde(default)]
    pub partida: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn pick_order_req_uses_backend_field_names() {
        let rec = PickedItem {
            id: Some(1),
            order_id: 7,
            article: "A1".into(),
            scan_index: 0,
            location: "P-01-03".into(),
            lot: "L55".into(),
            quantity: 2.5,
            depot: "DEP1".into(),
            operator: "maria".into(),
            created_at: Utc::now(),
            synced: false,
        };
        let req = PickOrderReq::from_records(7, "DEP1", &[rec]);
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["pedido"], 7);
        assert_eq!(body["deposito"], "DEP1");
        assert_eq!(body["items"][0]["ubicacion"], "P-01-03");
        assert_eq!(body["items"][0]["cantidad"], 2.5);
        assert_eq!(body["items"][0]["articulo"], "A1");
        assert_eq!(body["items"][0]["partida"], "L55");
        assert_eq!(body["items"][0]["usuario"], "maria");
    }

    #[test]
    fn relocate_line_carries_both_locations() {
        let rec = RelocateMovement {
            id: None,
            lot: "L1".into(),
            origin: "A-01".into(),
            destination: "B-02".into(),
            depot: "DEP1".into(),
            created_at: Utc::now(),
            state: crate::model::MovementState::Pending,
        };
        let body = serde_json::to_value(RelocateLine::from(&rec)).unwrap();
        assert_eq!(body["ubicacion_origen"], "A-01");
        assert_eq!(body["ubicacion_destino"], "B-02");
    }
}
