//! Movement repository: async, failure-absorbing façade over the entity
//! store.
//!
//! Storage faults never unwind into UI code. Every method catches the store
//! error, logs a diagnostic and returns a sentinel: `-1` for ids, `false`
//! for booleans, an empty list for queries.

use super::store::MovementStore;
use crate::model::{Order, PickedItem, RelocateMovement, StowMovement};
use anyhow::{Context, Result};
use tracing::{instrument, warn};

pub struct MovementRepo<S: MovementStore> {
    store: S,
}

impl<S: MovementStore> MovementRepo<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Idempotent upsert keyed on `(order id, article, scan index)`.
    ///
    /// A re-scan of the same key overwrites the existing row's mutable
    /// fields instead of inserting a duplicate: N corrections leave 1 row.
    /// Returns the row id, or `-1` on a storage fault.
    #[instrument(skip_all)]
    pub async fn save_picked(&self, rec: PickedItem) -> i64 {
        match self.try_save_picked(rec).await {
            Ok(id) => id,
            Err(err) => {
                warn!(?err, "failed to save picked item");
                -1
            }
        }
    }

    async fn try_save_picked(&self, mut rec: PickedItem) -> Result<i64> {
        let existing = self
            .store
            .find_picked_by_key(rec.order_id, &rec.article, rec.scan_index)
            .await?;
        match existing {
            Some(found) => {
                let id = found.id.context("stored picked item missing row id")?;
                rec.id = Some(id);
                self.store.update_picked(&rec).await?;
                Ok(id)
            }
            None => self.store.insert_picked(&rec).await,
        }
    }

    /// Insert a new stow movement, or update it in place when it already has
    /// a row id (the operator correcting a pending record).
    #[instrument(skip_all)]
    pub async fn save_stow(&self, rec: StowMovement) -> i64 {
        let res = match rec.id {
            Some(id) => self.store.update_stow(&rec).await.map(|_| id),
            None => self.store.insert_stow(&rec).await,
        };
        match res {
            Ok(id) => id,
            Err(err) => {
                warn!(?err, "failed to save stow movement");
                -1
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn save_relocate(&self, rec: RelocateMovement) -> i64 {
        let res = match rec.id {
            Some(id) => self.store.update_relocate(&rec).await.map(|_| id),
            None => self.store.insert_relocate(&rec).await,
        };
        match res {
            Ok(id) => id,
            Err(err) => {
                warn!(?err, "failed to save relocate movement");
                -1
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn cache_order(&self, order: Order) -> bool {
        match self.store.upsert_order(&order).await {
            Ok(()) => true,
            Err(err) => {
                warn!(?err, order_id = order.id, "failed to cache order");
                false
            }
        }
    }

    pub async fn order(&self, id: i64) -> Option<Order> {
        match self.store.get_order(id).await {
            Ok(order) => order,
            Err(err) => {
                warn!(?err, order_id = id, "failed to load order");
                None
            }
        }
    }

    pub async fn orders(&self) -> Vec<Order> {
        match self.store.list_orders().await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(?err, "failed to list orders");
                Vec::new()
            }
        }
    }

    pub async fn picked(&self, order_id: i64) -> Vec<PickedItem> {
        match self.store.list_picked(order_id).await {
            Ok(items) => items,
            Err(err) => {
                warn!(?err, order_id, "failed to list picked items");
                Vec::new()
            }
        }
    }

    /// Not-yet-synced picked rows for one order, in scan order.
    pub async fn pending_picked(&self, order_id: i64) -> Vec<PickedItem> {
        match self.store.list_pending_picked(order_id).await {
            Ok(items) => items,
            Err(err) => {
                warn!(?err, order_id, "failed to list pending picked items");
                Vec::new()
            }
        }
    }

    /// Pending stows, newest first.
    pub async fn pending_stows(&self) -> Vec<StowMovement> {
        match self.store.list_pending_stows().await {
            Ok(items) => items,
            Err(err) => {
                warn!(?err, "failed to list pending stows");
                Vec::new()
            }
        }
    }

    pub async fn pending_relocates(&self) -> Vec<RelocateMovement> {
        match self.store.list_pending_relocates().await {
            Ok(items) => items,
            Err(err) => {
                warn!(?err, "failed to list pending relocates");
                Vec::new()
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn mark_picked_synced(&self, id: i64) -> bool {
        match self.store.mark_picked_synced(id).await {
            Ok(n) => n > 0,
            Err(err) => {
                warn!(?err, id, "failed to mark picked item synced");
                false
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn mark_stow_synced(&self, id: i64) -> bool {
        match self.store.mark_stow_synced(id).await {
            Ok(n) => n > 0,
            Err(err) => {
                warn!(?err, id, "failed to mark stow synced");
                false
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn mark_relocate_synced(&self, id: i64) -> bool {
        match self.store.mark_relocate_synced(id).await {
            Ok(n) => n > 0,
            Err(err) => {
                warn!(?err, id, "failed to mark relocate synced");
                false
            }
        }
    }

    /// Remove an order and its picked rows.
    ///
    /// Not transactional: if deleting the order fails after the picked rows
    /// were removed, the call reports `false` even though the first delete
    /// persisted. Known limitation, never a silent success.
    #[instrument(skip_all)]
    pub async fn delete_order_cascade(&self, order_id: i64) -> bool {
        if let Err(err) = self.store.delete_picked_for_order(order_id).await {
            warn!(?err, order_id, "failed to delete picked items for order");
            return false;
        }
        match self.store.delete_order(order_id).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    ?err,
                    order_id, "order delete failed after picked items were removed"
                );
                false
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn delete_stow(&self, id: i64) -> bool {
        match self.store.delete_stow(id).await {
            Ok(n) => n > 0,
            Err(err) => {
                warn!(?err, id, "failed to delete stow");
                false
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn delete_relocate(&self, id: i64) -> bool {
        match self.store.delete_relocate(id).await {
            Ok(n) => n > 0,
            Err(err) => {
                warn!(?err, id, "failed to delete relocate");
                false
            }
        }
    }
}
