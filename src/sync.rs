//! Sync driver: submits pending movements and marks them synced.
//!
//! Auth and transport faults bubble to the caller's loop and leave records
//! pending; a server-side rejection is logged with the server's payload and
//! also leaves the batch pending. A cancelled attempt (the future dropped
//! mid-submit) is handled the same way — the next pass re-reads pending
//! state rather than assuming the request never reached the server.

use crate::api::model::{PickOrderReq, RelocateLine, StowLine};
use crate::api::{ApiError, BackendService};
use crate::db::{MovementRepo, MovementStore};
use anyhow::Result;
use tracing::{info, instrument, warn};

/// Run one submission pass. Returns `Ok(true)` if anything was submitted.
#[instrument(skip_all)]
pub async fn process_pending<S: MovementStore>(
    repo: &MovementRepo<S>,
    backend: &dyn BackendService,
) -> Result<bool> {
    let mut submitted = false;
    submitted |= submit_picked(repo, backend).await?;
    submitted |= submit_stows(repo, backend).await?;
    submitted |= submit_relocates(repo, backend).await?;
    Ok(submitted)
}

/// One pick batch per order, rows in scan order.
async fn submit_picked<S: MovementStore>(
    repo: &MovementRepo<S>,
    backend: &dyn BackendService,
) -> Result<bool> {
    let mut submitted = false;
    for order in repo.orders().await {
        let pending = repo.pending_picked(order.id).await;
        if pending.is_empty() {
            continue;
        }
        let req = PickOrderReq::from_records(order.id, &order.depot, &pending);
        match backend.recolectar(&req).await {
            Ok(()) => {
                for rec in &pending {
                    if let Some(id) = rec.id {
                        repo.mark_picked_synced(id).await;
                    }
                }
                info!(order_id = order.id, lines = pending.len(), "pick batch synced");
                submitted = true;
            }
            Err(ApiError::ServerRejected { status, body }) => {
                warn!(order_id = order.id, %status, %body, "pick batch rejected; kept pending");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(submitted)
}

async fn submit_stows<S: MovementStore>(
    repo: &MovementRepo<S>,
    backend: &dyn BackendService,
) -> Result<bool> {
    let pending = repo.pending_stows().await;
    if pending.is_empty() {
        return Ok(false);
    }
    let lines: Vec<StowLine> = pending.iter().map(StowLine::from).collect();
    match backend.estibar(&lines).await {
        Ok(()) => {
            for rec in &pending {
                if let Some(id) = rec.id {
                    repo.mark_stow_synced(id).await;
                }
            }
            info!(lines = pending.len(), "stow batch synced");
            Ok(true)
        }
        Err(ApiError::ServerRejected { status, body }) => {
            warn!(%status, %body, "stow batch rejected; kept pending");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

async fn submit_relocates<S: MovementStore>(
    repo: &MovementRepo<S>,
    backend: &dyn BackendService,
) -> Result<bool> {
    let pending = repo.pending_relocates().await;
    if pending.is_empty() {
        return Ok(false);
    }
    let lines: Vec<RelocateLine> = pending.iter().map(RelocateLine::from).collect();
    match backend.reubicar(&lines).await {
        Ok(()) => {
            for rec in &pending {
                if let Some(id) = rec.id {
                    repo.mark_relocate_synced(id).await;
                }
            }
            info!(lines = pending.len(), "relocate batch synced");
            Ok(true)
        }
        Err(ApiError::ServerRejected { status, body }) => {
            warn!(%status, %body, "relocate batch rejected; kept pending");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

/// Refresh the local order cache from the backend's open-order list.
#[instrument(skip_all)]
pub async fn refresh_orders<S: MovementStore>(
    repo: &MovementRepo<S>,
    backend: &dyn BackendService,
) -> Result<usize> {
    let remote = backend.lanzadas().await?;
    let mut cached = 0;
    for order in remote {
        let ok = repo
            .cache_order(crate::model::Order {
                id: order.id,
                depot: order.deposito,
                created_at: order.fecha_creacion,
                status: order.estado,
                locations_json: order.ubicaciones.to_string(),
            })
            .await;
        if ok {
            cached += 1;
        }
    }
    Ok(cached)
}
