// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared gateway state and component wiring.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broadcast::BroadcastEngine;
use crate::config::GatewayConfig;
use crate::events::EventHub;
use crate::inbound::Dispatcher;
use crate::ratelimit::{RateLimitOptions, RateLimiter};
use crate::reply::{ai::AiResponder, shipping::ShippingProvider, ReplyEngine};
use crate::scraper::Scraper;
use crate::session::SessionManager;
use crate::storage::Storage;
use crate::upstream::TransportFactory;
use crate::webhook::WebhookForwarder;

pub struct AppState {
    pub config: GatewayConfig,
    pub storage: Arc<Storage>,
    pub hub: Arc<EventHub>,
    pub limiter: Arc<RateLimiter>,
    pub manager: Arc<SessionManager>,
    pub broadcasts: Arc<BroadcastEngine>,
    pub scraper: Arc<Scraper>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every component leaves-first. The collaborator seams
    /// (transport factory, shipping, AI) are injected so tests can script
    /// them.
    pub fn build(
        config: GatewayConfig,
        storage: Arc<Storage>,
        factory: Arc<dyn TransportFactory>,
        shipping: Arc<dyn ShippingProvider>,
        ai: Arc<dyn AiResponder>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let hub = Arc::new(EventHub::new());
        let limiter = Arc::new(RateLimiter::new(
            Arc::clone(&storage),
            RateLimitOptions::from_config(&config),
        ));
        let reply = Arc::new(ReplyEngine::new(
            Arc::clone(&storage),
            Arc::clone(&hub),
            Arc::clone(&limiter),
            shipping,
            ai,
        ));
        let webhooks = Arc::new(WebhookForwarder::new());
        let dispatcher = Arc::new(Dispatcher::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&hub),
            reply,
            webhooks,
        ));
        let manager = Arc::new(SessionManager::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&hub),
            dispatcher,
            factory,
            shutdown.clone(),
        ));
        let broadcasts = Arc::new(BroadcastEngine::new(
            &config,
            Arc::clone(&storage),
            Arc::clone(&hub),
            Arc::clone(&limiter),
            Arc::clone(&manager),
            shutdown.clone(),
        ));
        let scraper = Arc::new(Scraper::new(
            Arc::clone(&storage),
            Arc::clone(&manager),
            config.scraper_limits(),
        ));

        Arc::new(Self { config, storage, hub, limiter, manager, broadcasts, scraper, shutdown })
    }
}
