// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: owns the registry of live transports and the pairing,
//! disconnect and send primitives. Each live session is driven by one
//! background task (see `upstream::lifecycle`); nothing outside this module
//! mutates the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::events::EventHub;
use crate::inbound::Dispatcher;
use crate::model::SessionStatus;
use crate::storage::Storage;
use crate::upstream::lifecycle::{self, ReconnectPolicy};
use crate::upstream::{ChatTransport, SendReceipt, TransportFactory};

/// Live state for one session. The transport slot is populated while a
/// socket exists and cleared on every close.
pub struct SessionHandle {
    pub session_id: String,
    pub user_id: i64,
    /// Internal numeric row id.
    pub db_id: i64,
    transport: RwLock<Option<Arc<dyn ChatTransport>>>,
    connected: AtomicBool,
    phone: RwLock<Option<String>>,
    manual_disconnect: AtomicBool,
    pub cancel: CancellationToken,
}

impl SessionHandle {
    fn new(session_id: String, user_id: i64, db_id: i64) -> Self {
        Self {
            session_id,
            user_id,
            db_id,
            transport: RwLock::new(None),
            connected: AtomicBool::new(false),
            phone: RwLock::new(None),
            manual_disconnect: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// True only after pairing confirmed the authenticated identity.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn manual_disconnect_requested(&self) -> bool {
        self.manual_disconnect.load(Ordering::Acquire)
    }

    pub async fn transport(&self) -> Option<Arc<dyn ChatTransport>> {
        self.transport.read().await.clone()
    }

    pub async fn phone(&self) -> Option<String> {
        self.phone.read().await.clone()
    }

    pub(crate) async fn set_transport(&self, transport: Option<Arc<dyn ChatTransport>>) {
        *self.transport.write().await = transport;
    }

    pub(crate) async fn mark_connected(&self, phone: String) {
        *self.phone.write().await = Some(phone);
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

pub(crate) type Registry = Arc<RwLock<HashMap<String, Arc<SessionHandle>>>>;

pub struct SessionManager {
    registry: Registry,
    factory: Arc<dyn TransportFactory>,
    storage: Arc<Storage>,
    hub: Arc<EventHub>,
    dispatcher: Arc<Dispatcher>,
    policy: ReconnectPolicy,
    storage_root: PathBuf,
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(
        config: &GatewayConfig,
        storage: Arc<Storage>,
        hub: Arc<EventHub>,
        dispatcher: Arc<Dispatcher>,
        factory: Arc<dyn TransportFactory>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            factory,
            storage,
            hub,
            dispatcher,
            policy: ReconnectPolicy {
                base: config.backoff_base(),
                cap: config.backoff_cap(),
                max_quick_attempts: config.max_reconnect_attempts,
                long_cooloff: config.reconnect_cooloff(),
                connect_timeout: config.transport_timeout(),
                qr_ttl: chrono::Duration::seconds(config.qr_ttl_secs as i64),
            },
            storage_root: PathBuf::from(&config.session_storage_path),
            shutdown,
        }
    }

    /// On-disk credential directory for a session.
    pub fn auth_dir(&self, session_id: &str) -> PathBuf {
        self.storage_root.join(session_id)
    }

    /// Start (or no-op if already live) the driver task for a session.
    ///
    /// Idempotent: an existing live session returns without side effects.
    /// Pairing completes asynchronously; a pending QR is not an error.
    pub async fn create(&self, session_id: &str, user_id: i64) -> Result<(), GatewayError> {
        {
            let registry = self.registry.read().await;
            if registry.contains_key(session_id) {
                return Ok(());
            }
        }

        let row = self
            .storage
            .session_by_external(session_id)?
            .ok_or_else(|| GatewayError::not_found(format!("session {session_id} not found")))?;

        let mut registry = self.registry.write().await;
        // Double-check after acquiring the write lock.
        if registry.contains_key(session_id) {
            return Ok(());
        }
        let handle = Arc::new(SessionHandle::new(session_id.to_owned(), user_id, row.id));
        registry.insert(session_id.to_owned(), Arc::clone(&handle));
        drop(registry);

        lifecycle::spawn_driver(lifecycle::DriverCtx {
            handle,
            factory: Arc::clone(&self.factory),
            storage: Arc::clone(&self.storage),
            hub: Arc::clone(&self.hub),
            dispatcher: Arc::clone(&self.dispatcher),
            registry: Arc::clone(&self.registry),
            auth_dir: self.auth_dir(session_id),
            policy: self.policy.clone(),
            shutdown: self.shutdown.clone(),
        });

        tracing::info!(session_id, user_id, "session driver started");
        Ok(())
    }

    /// Re-start drivers for sessions that were live before a restart.
    pub async fn restore_persisted(&self) -> Result<usize, GatewayError> {
        let rows = {
            let conn = self.storage.conn();
            // Manually disconnected sessions stay down until asked.
            let mut stmt = conn.prepare(
                "SELECT session_id, user_id FROM whatsapp_sessions
                 WHERE deleted_at IS NULL AND is_active = 1
                   AND status IN ('connected', 'connecting')",
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        let mut started = 0;
        for (session_id, user_id) in rows {
            if self.create(&session_id, user_id).await.is_ok() {
                started += 1;
            }
        }
        Ok(started)
    }

    /// Handle to the live session, if any.
    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.registry.read().await.get(session_id).map(Arc::clone)
    }

    /// True while a driver task owns the session.
    pub async fn is_active(&self, session_id: &str) -> bool {
        self.registry.read().await.contains_key(session_id)
    }

    /// True only after authentication completed.
    pub async fn is_connected(&self, session_id: &str) -> bool {
        match self.get(session_id).await {
            Some(handle) => handle.is_connected(),
            None => false,
        }
    }

    /// Graceful close. The manual flag stops the driver from reconnecting;
    /// on-disk credentials are retained so the session can resume.
    pub async fn disconnect(&self, session_id: &str) -> Result<(), GatewayError> {
        let handle = self
            .get(session_id)
            .await
            .ok_or_else(|| GatewayError::not_found(format!("session {session_id} is not active")))?;

        handle.manual_disconnect.store(true, Ordering::Release);
        handle.cancel.cancel();
        if let Some(transport) = handle.transport().await {
            transport.close().await;
        }
        handle.mark_disconnected();
        self.registry.write().await.remove(session_id);

        // Row before event, so poll-after-event observers see the new state.
        self.storage.set_session_status(session_id, SessionStatus::Disconnected, Utc::now())?;
        self.hub.publish_session(
            handle.user_id,
            session_id,
            crate::events::GatewayEvent::SessionDisconnected {
                session: session_id.to_owned(),
                reason: "manual disconnect".to_owned(),
            },
        );
        tracing::info!(session_id, "session disconnected");
        Ok(())
    }

    /// As `disconnect`, plus unlink the device, destroy on-disk
    /// credentials and drop any cached QR.
    pub async fn logout(&self, session_id: &str) -> Result<(), GatewayError> {
        if let Some(handle) = self.get(session_id).await {
            handle.manual_disconnect.store(true, Ordering::Release);
            handle.cancel.cancel();
            if let Some(transport) = handle.transport().await {
                if let Err(e) = transport.logout().await {
                    tracing::warn!(session_id, err = %e, "provider logout failed");
                }
                transport.close().await;
            }
            handle.mark_disconnected();
            self.registry.write().await.remove(session_id);
        }

        self.purge_credentials(session_id)?;
        self.storage.clear_session_qr(session_id)?;
        self.storage.set_session_status(session_id, SessionStatus::Disconnected, Utc::now())?;

        if let Some(row) = self.storage.session_by_external(session_id)? {
            self.hub.publish_session(
                row.user_id,
                session_id,
                crate::events::GatewayEvent::SessionDisconnected {
                    session: session_id.to_owned(),
                    reason: "logged out".to_owned(),
                },
            );
        }
        tracing::info!(session_id, "session logged out");
        Ok(())
    }

    /// Remove the credential directory. Refused while the session is live.
    pub fn purge_credentials(&self, session_id: &str) -> Result<(), GatewayError> {
        let dir = self.auth_dir(session_id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| GatewayError::internal(format!("purge credentials: {e}")))?;
        }
        Ok(())
    }

    /// Send a text through the session's transport. Callers must pass the
    /// rate limiter first; transport errors are surfaced unchanged.
    pub async fn send_text(
        &self,
        session_id: &str,
        to: &str,
        body: &str,
    ) -> Result<SendReceipt, GatewayError> {
        let transport = self.connected_transport(session_id).await?;
        transport
            .send_text(to, body)
            .await
            .map_err(|e| GatewayError::transient_transport(e.to_string()))
    }

    pub async fn send_image(
        &self,
        session_id: &str,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, GatewayError> {
        let transport = self.connected_transport(session_id).await?;
        transport
            .send_image(to, url, caption)
            .await
            .map_err(|e| GatewayError::transient_transport(e.to_string()))
    }

    pub async fn send_document(
        &self,
        session_id: &str,
        to: &str,
        url: &str,
        filename: &str,
        mimetype: &str,
    ) -> Result<SendReceipt, GatewayError> {
        let transport = self.connected_transport(session_id).await?;
        transport
            .send_document(to, url, filename, mimetype)
            .await
            .map_err(|e| GatewayError::transient_transport(e.to_string()))
    }

    async fn connected_transport(
        &self,
        session_id: &str,
    ) -> Result<Arc<dyn ChatTransport>, GatewayError> {
        let handle = self
            .get(session_id)
            .await
            .ok_or_else(|| GatewayError::precondition(format!("session {session_id} is not active")))?;
        if !handle.is_connected() {
            return Err(GatewayError::precondition(format!("session {session_id} is not connected")));
        }
        handle
            .transport()
            .await
            .ok_or_else(|| GatewayError::precondition(format!("session {session_id} has no transport")))
    }
}
