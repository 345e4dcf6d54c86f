// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chatgate: multi-tenant messaging gateway fronting an external
//! chat-network protocol. Session lifecycle with QR pairing and resilient
//! reconnection, an idempotent inbound pipeline with auto-reply, a
//! rate-limited broadcast engine, and a self-throttled directory scraper.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
pub mod inbound;
pub mod model;
pub mod pacing;
pub mod ratelimit;
pub mod reply;
pub mod scraper;
pub mod session;
pub mod state;
pub mod storage;
pub mod testkit;
pub mod transport;
pub mod upstream;
pub mod webhook;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::reply::ai::HttpAiResponder;
use crate::reply::shipping::HttpShippingProvider;
use crate::state::AppState;
use crate::storage::Storage;
use crate::transport::build_router;
use crate::upstream::sidecar::SidecarFactory;

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let storage = Arc::new(Storage::open(&config.db_path)?);
    let shutdown = CancellationToken::new();

    let factory = Arc::new(SidecarFactory::new(
        config.provider_url.clone(),
        config.transport_timeout(),
    ));
    let shipping = Arc::new(HttpShippingProvider::new(
        config.shipping_base_url.clone(),
        config.shipping_api_key.clone(),
    ));
    let ai = Arc::new(HttpAiResponder::new(config.ai_base_url.clone(), config.ai_api_key.clone()));

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::build(config, storage, factory, shipping, ai, shutdown.clone());

    let restored = state.manager.restore_persisted().await?;
    if restored > 0 {
        tracing::info!(restored, "resumed persisted sessions");
    }

    tracing::info!("chatgate listening on {addr}");
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;
    Ok(())
}
