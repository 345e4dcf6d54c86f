// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session connection driver: dials the provider, pumps transport
//! events into the dispatcher, and reconnects with exponential backoff on
//! transient closures. Fatal closures purge credentials and end the
//! session. Every row update happens before the matching event publish.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::events::{EventHub, GatewayEvent};
use crate::inbound::Dispatcher;
use crate::model::SessionStatus;
use crate::pacing;
use crate::session::{Registry, SessionHandle};
use crate::storage::Storage;
use crate::upstream::{qr, CloseReason, TransportEvent, TransportFactory};

/// Reconnection policy knobs, resolved from config at manager build time.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base: std::time::Duration,
    pub cap: std::time::Duration,
    pub max_quick_attempts: u32,
    pub long_cooloff: std::time::Duration,
    pub connect_timeout: std::time::Duration,
    pub qr_ttl: chrono::Duration,
}

pub(crate) struct DriverCtx {
    pub handle: Arc<SessionHandle>,
    pub factory: Arc<dyn TransportFactory>,
    pub storage: Arc<Storage>,
    pub hub: Arc<EventHub>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Registry,
    pub auth_dir: PathBuf,
    pub policy: ReconnectPolicy,
    pub shutdown: CancellationToken,
}

pub(crate) fn spawn_driver(ctx: DriverCtx) {
    tokio::spawn(async move {
        drive(ctx).await;
    });
}

async fn drive(ctx: DriverCtx) {
    let session_id = ctx.handle.session_id.clone();
    let mut attempt: u32 = 0;

    loop {
        if ctx.handle.cancel.is_cancelled()
            || ctx.handle.manual_disconnect_requested()
            || ctx.shutdown.is_cancelled()
        {
            break;
        }

        attempt = attempt.saturating_add(1);
        if attempt > 1 {
            set_status(&ctx, SessionStatus::Connecting);
        }

        let connect = tokio::time::timeout(
            ctx.policy.connect_timeout,
            ctx.factory.connect(&session_id, &ctx.auth_dir),
        );
        let outcome = tokio::select! {
            _ = ctx.handle.cancel.cancelled() => break,
            res = connect => res,
        };

        match outcome {
            Err(_) => {
                tracing::warn!(session_id, attempt, "transport connect timed out");
            }
            Ok(Err(e)) => {
                tracing::warn!(session_id, attempt, err = %e, "transport connect failed");
            }
            Ok(Ok(link)) => {
                ctx.handle.set_transport(Some(Arc::clone(&link.transport))).await;
                let reason = run_connection(&ctx, link.events, &mut attempt).await;
                ctx.handle.mark_disconnected();
                ctx.handle.set_transport(None).await;

                match reason {
                    None => break, // cancelled mid-connection
                    Some(reason) if reason.is_fatal() => {
                        fail_session(&ctx, &reason).await;
                        return;
                    }
                    Some(reason) => {
                        set_status(&ctx, SessionStatus::Disconnected);
                        ctx.hub.publish_session(
                            ctx.handle.user_id,
                            &session_id,
                            GatewayEvent::SessionDisconnected {
                                session: session_id.clone(),
                                reason: reason.user_message(),
                            },
                        );
                        tracing::info!(session_id, reason = %reason, "session disconnected, will reconnect");
                    }
                }
            }
        }

        if ctx.handle.manual_disconnect_requested() {
            break;
        }

        // Quick attempts back off exponentially; once exhausted, one long
        // cool-off resets the counter.
        let delay = if attempt >= ctx.policy.max_quick_attempts {
            tracing::warn!(
                session_id,
                attempts = attempt,
                "reconnect attempts exhausted, entering cool-off"
            );
            attempt = 0;
            ctx.policy.long_cooloff
        } else {
            pacing::backoff_delay(ctx.policy.base, ctx.policy.cap, attempt)
        };

        tokio::select! {
            _ = ctx.handle.cancel.cancelled() => break,
            _ = ctx.shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump transport events until the socket closes. Returns the close
/// reason, or `None` when the driver itself was cancelled.
async fn run_connection(
    ctx: &DriverCtx,
    mut events: tokio::sync::mpsc::Receiver<TransportEvent>,
    attempt: &mut u32,
) -> Option<CloseReason> {
    let session_id = ctx.handle.session_id.clone();
    loop {
        let event = tokio::select! {
            _ = ctx.handle.cancel.cancelled() => {
                if let Some(transport) = ctx.handle.transport().await {
                    transport.close().await;
                }
                return None;
            }
            ev = events.recv() => ev,
        };

        match event {
            None => return Some(CloseReason::ConnectionClosed),
            Some(TransportEvent::Qr { payload }) => {
                // A live QR means the link is healthy again.
                *attempt = 0;
                if !ctx.handle.is_connected() {
                    set_status(ctx, SessionStatus::QrPending);
                }
                if let Err(e) = qr::publish_qr(
                    &ctx.storage,
                    &ctx.hub,
                    ctx.handle.user_id,
                    &session_id,
                    &payload,
                    ctx.policy.qr_ttl,
                ) {
                    tracing::warn!(session_id, err = %e, "qr handling failed");
                }
            }
            Some(TransportEvent::PairingSuccess { phone }) => {
                *attempt = 0;
                ctx.handle.mark_connected(phone.clone()).await;
                // Row first: phone + status, QR is consumed.
                if let Err(e) = ctx.storage.set_session_phone(&session_id, &phone) {
                    tracing::error!(session_id, err = %e, "persist phone failed");
                }
                if let Err(e) = ctx.storage.clear_session_qr(&session_id) {
                    tracing::warn!(session_id, err = %e, "clear qr failed");
                }
                if let Err(e) =
                    ctx.storage.set_session_status(&session_id, SessionStatus::Connected, Utc::now())
                {
                    tracing::error!(session_id, err = %e, "persist connected status failed");
                }
                ctx.hub.publish_session(
                    ctx.handle.user_id,
                    &session_id,
                    GatewayEvent::SessionConnected { session: session_id.clone(), phone },
                );
                tracing::info!(session_id, "session paired and connected");
            }
            Some(TransportEvent::MessageUpsert { kind, message }) => {
                if let Err(e) = ctx.dispatcher.dispatch(&ctx.handle, kind, message).await {
                    tracing::warn!(session_id, err = %e, "inbound dispatch failed");
                }
            }
            Some(TransportEvent::MessageStatus { message_id, status }) => {
                match ctx.storage.advance_message_status(&message_id, status, Utc::now()) {
                    Ok(true) => {
                        ctx.hub.publish_session(
                            ctx.handle.user_id,
                            &session_id,
                            GatewayEvent::MessageStatus {
                                session: session_id.clone(),
                                message_id,
                                status,
                            },
                        );
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(session_id, err = %e, "status advance failed");
                    }
                }
            }
            Some(TransportEvent::Closed { reason }) => return Some(reason),
        }
    }
}

/// Fatal closure: purge credentials, clear QR, mark the row failed, then
/// publish and drop the registry entry.
async fn fail_session(ctx: &DriverCtx, reason: &CloseReason) {
    let session_id = &ctx.handle.session_id;
    if ctx.auth_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&ctx.auth_dir) {
            tracing::error!(session_id, err = %e, "credential purge failed");
        }
    }
    if let Err(e) = ctx.storage.clear_session_qr(session_id) {
        tracing::warn!(session_id, err = %e, "clear qr failed");
    }
    if let Err(e) = ctx.storage.set_session_status(session_id, SessionStatus::Failed, Utc::now()) {
        tracing::error!(session_id, err = %e, "persist failed status failed");
    }
    ctx.hub.publish_session(
        ctx.handle.user_id,
        session_id,
        GatewayEvent::SessionConnectionFailed {
            session: session_id.clone(),
            reason: reason.user_message(),
        },
    );
    ctx.registry.write().await.remove(session_id);
    tracing::warn!(session_id, reason = %reason, "session failed fatally");
}

fn set_status(ctx: &DriverCtx, status: SessionStatus) {
    let session_id = &ctx.handle.session_id;
    if let Err(e) = ctx.storage.set_session_status(session_id, status, Utc::now()) {
        tracing::error!(session_id, err = %e, "persist status failed");
    }
    ctx.hub.publish_session(
        ctx.handle.user_id,
        session_id,
        GatewayEvent::SessionStatus { session: session_id.clone(), status },
    );
}
