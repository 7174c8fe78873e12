//! Entity store: durable, schema-versioned storage of movement records.
//!
//! [`MovementStore`] keeps the upsert algorithm in `repo.rs` independent of
//! the storage engine; [`SqliteStore`] is the production implementation over
//! a sqlx sqlite pool. Schema versioning is the sequential migration set in
//! `./migrations` — upgrades add tables and columns, never drop data.

use crate::model::{MovementState, Order, PickedItem, RelocateMovement, StowMovement};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and create the parent
/// directory. In-memory URLs and non-sqlite schemes pass through unchanged.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

/// Apply pending schema migrations. Failure here means the storage medium is
/// unusable and must propagate — callers do not swallow it.
pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Storage interface for the four record kinds.
///
/// All write methods return store-level facts (row id, rows affected) and
/// raw errors; absorbing failures is the repository's job, not ours.
#[async_trait]
pub trait MovementStore: Send + Sync {
    // orders
    async fn upsert_order(&self, order: &Order) -> Result<()>;
    async fn get_order(&self, id: i64) -> Result<Option<Order>>;
    async fn list_orders(&self) -> Result<Vec<Order>>;
    async fn delete_order(&self, id: i64) -> Result<u64>;

    // picked items
    async fn insert_picked(&self, rec: &PickedItem) -> Result<i64>;
    async fn update_picked(&self, rec: &PickedItem) -> Result<u64>;
    /// Natural-key lookup: `(order id, article, scan index)`. Location, lot
    /// and quantity are deliberately ignored so a corrected scan finds the
    /// row it corrects.
    async fn find_picked_by_key(
        &self,
        order_id: i64,
        article: &str,
        scan_index: i32,
    ) -> Result<Option<PickedItem>>;
    async fn list_picked(&self, order_id: i64) -> Result<Vec<PickedItem>>;
    /// Pending rows for one order, scan-index ascending (audit order).
    async fn list_pending_picked(&self, order_id: i64) -> Result<Vec<PickedItem>>;
    async fn mark_picked_synced(&self, id: i64) -> Result<u64>;
    async fn delete_picked_for_order(&self, order_id: i64) -> Result<u64>;

    // stow movements
    async fn insert_stow(&self, rec: &StowMovement) -> Result<i64>;
    async fn update_stow(&self, rec: &StowMovement) -> Result<u64>;
    /// Pending stows newest-first: the operator resumes recent work.
    async fn list_pending_stows(&self) -> Result<Vec<StowMovement>>;
    async fn mark_stow_synced(&self, id: i64) -> Result<u64>;
    async fn delete_stow(&self, id: i64) -> Result<u64>;

    // relocate movements
    async fn insert_relocate(&self, rec: &RelocateMovement) -> Result<i64>;
    async fn update_relocate(&self, rec: &RelocateMovement) -> Result<u64>;
    async fn list_pending_relocates(&self) -> Result<Vec<RelocateMovement>>;
    async fn mark_relocate_synced(&self, id: i64) -> Result<u64>;
    async fn delete_relocate(&self, id: i64) -> Result<u64>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        depot: row.try_get("deposito")?,
        created_at: row.try_get("fecha_creacion")?,
        status: row.try_get("estado")?,
        locations_json: row.try_get("ubicaciones")?,
    })
}

fn picked_from_row(row: &SqliteRow) -> Result<PickedItem> {
    Ok(PickedItem {
        id: Some(row.try_get("id")?),
        order_id: row.try_get("pedido_id")?,
        article: row.try_get("articulo")?,
        scan_index: row.try_get("indice_scaneo")?,
        location: row.try_get("ubicacion")?,
        lot: row.try_get("partida")?,
        quantity: row.try_get("cantidad")?,
        depot: row.try_get("deposito")?,
        operator: row.try_get("usuario")?,
        created_at: row.try_get("fecha_creacion")?,
        synced: row.try_get("sincronizado")?,
    })
}

fn stow_from_row(row: &SqliteRow) -> Result<StowMovement> {
    let state: String = row.try_get("estado")?;
    Ok(StowMovement {
        id: Some(row.try_get("id")?),
        lot: row.try_get("partida")?,
        location: row.try_get("ubicacion")?,
        depot: row.try_get("deposito")?,
        created_at: row.try_get("fecha_creacion")?,
        state: MovementState::parse_state(&state)
            .with_context(|| format!("unknown estado '{state}' in estibaciones"))?,
    })
}

fn relocate_from_row(row: &SqliteRow) -> Result<RelocateMovement> {
    let state: String = row.try_get("estado")?;
    Ok(RelocateMovement {
        id: Some(row.try_get("id")?),
        lot: row.try_get("partida")?,
        origin: row.try_get("ubicacion_origen")?,
        destination: row.try_get("ubicacion_destino")?,
        depot: row.try_get("deposito")?,
        created_at: row.try_get("fecha_creacion")?,
        state: MovementState::parse_state(&state)
            .with_context(|| format!("unknown estado '{state}' in reubicaciones"))?,
    })
}

#[async_trait]
impl MovementStore for SqliteStore {
    async fn upsert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO pedidos (id, deposito, fecha_creacion, estado, ubicaciones) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                 deposito = excluded.deposito, \
                 fecha_creacion = excluded.fecha_creacion, \
                 estado = excluded.estado, \
                 ubicaciones = excluded.ubicaciones",
        )
        .bind(order.id)
        .bind(&order.depot)
        .bind(order.created_at)
        .bind(&order.status)
        .bind(&order.locations_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, id: i64) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM pedidos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query("SELECT * FROM pedidos ORDER BY datetime(fecha_creacion) DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn delete_order(&self, id: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM pedidos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn insert_picked(&self, rec: &PickedItem) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO recolecciones \
                 (pedido_id, articulo, indice_scaneo, ubicacion, partida, cantidad, \
                  deposito, usuario, fecha_creacion, sincronizado) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(rec.order_id)
        .bind(&rec.article)
        .bind(rec.scan_index)
        .bind(&rec.location)
        .bind(&rec.lot)
        .bind(rec.quantity)
        .bind(&rec.depot)
        .bind(&rec.operator)
        .bind(rec.created_at)
        .bind(rec.synced)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn update_picked(&self, rec: &PickedItem) -> Result<u64> {
        let id = rec.id.context("picked item has no row id")?;
        let res = sqlx::query(
            "UPDATE recolecciones SET \
                 ubicacion = ?, partida = ?, cantidad = ?, deposito = ?, \
                 usuario = ?, sincronizado = ? \
             WHERE id = ?",
        )
        .bind(&rec.location)
        .bind(&rec.lot)
        .bind(rec.quantity)
        .bind(&rec.depot)
        .bind(&rec.operator)
        .bind(rec.synced)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn find_picked_by_key(
        &self,
        order_id: i64,
        article: &str,
        scan_index: i32,
    ) -> Result<Option<PickedItem>> {
        let row = sqlx::query(
            "SELECT * FROM recolecciones \
             WHERE pedido_id = ? AND articulo = ? AND indice_scaneo = ?",
        )
        .bind(order_id)
        .bind(article)
        .bind(scan_index)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(picked_from_row).transpose()
    }

    async fn list_picked(&self, order_id: i64) -> Result<Vec<PickedItem>> {
        let rows = sqlx::query(
            "SELECT * FROM recolecciones WHERE pedido_id = ? ORDER BY indice_scaneo ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(picked_from_row).collect()
    }

    async fn list_pending_picked(&self, order_id: i64) -> Result<Vec<PickedItem>> {
        let rows = sqlx::query(
            "SELECT * FROM recolecciones \
             WHERE pedido_id = ? AND sincronizado = 0 \
             ORDER BY indice_scaneo ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(picked_from_row).collect()
    }

    async fn mark_picked_synced(&self, id: i64) -> Result<u64> {
        let res = sqlx::query("UPDATE recolecciones SET sincronizado = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_picked_for_order(&self, order_id: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM recolecciones WHERE pedido_id = ?")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn insert_stow(&self, rec: &StowMovement) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO estibaciones (partida, ubicacion, deposito, fecha_creacion, estado) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&rec.lot)
        .bind(&rec.location)
        .bind(&rec.depot)
        .bind(rec.created_at)
        .bind(rec.state.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn update_stow(&self, rec: &StowMovement) -> Result<u64> {
        let id = rec.id.context("stow movement has no row id")?;
        let res = sqlx::query(
            "UPDATE estibaciones SET partida = ?, ubicacion = ?, deposito = ?, estado = ? \
             WHERE id = ?",
        )
        .bind(&rec.lot)
        .bind(&rec.location)
        .bind(&rec.depot)
        .bind(rec.state.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn list_pending_stows(&self) -> Result<Vec<StowMovement>> {
        let rows = sqlx::query(
            "SELECT * FROM estibaciones WHERE estado = 'pendiente' \
             ORDER BY datetime(fecha_creacion) DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(stow_from_row).collect()
    }

    async fn mark_stow_synced(&self, id: i64) -> Result<u64> {
        let res = sqlx::query("UPDATE estibaciones SET estado = 'sincronizada' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_stow(&self, id: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM estibaciones WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn insert_relocate(&self, rec: &RelocateMovement) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO reubicaciones \
                 (partida, ubicacion_origen, ubicacion_destino, deposito, fecha_creacion, estado) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&rec.lot)
        .bind(&rec.origin)
        .bind(&rec.destination)
        .bind(&rec.depot)
        .bind(rec.created_at)
        .bind(rec.state.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    async fn update_relocate(&self, rec: &RelocateMovement) -> Result<u64> {
        let id = rec.id.context("relocate movement has no row id")?;
        let res = sqlx::query(
            "UPDATE reubicaciones SET partida = ?, ubicacion_origen = ?, \
                 ubicacion_destino = ?, deposito = ?, estado = ? \
             WHERE id = ?",
        )
        .bind(&rec.lot)
        .bind(&rec.origin)
        .bind(&rec.destination)
        .bind(&rec.depot)
        .bind(rec.state.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn list_pending_relocates(&self) -> Result<Vec<RelocateMovement>> {
        let rows = sqlx::query(
            "SELECT * FROM reubicaciones WHERE estado = 'pendiente' \
             ORDER BY datetime(fecha_creacion) DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(relocate_from_row).collect()
    }

    async fn mark_relocate_synced(&self, id: i64) -> Result<u64> {
        let res = sqlx::query("UPDATE reubicaciones SET estado = 'sincronizada' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    async fn delete_relocate(&self, id: i64) -> Result<u64> {
        let res = sqlx::query("DELETE FROM reubicaciones WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
