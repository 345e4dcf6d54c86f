// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test support: a scriptable in-process chat network, fake collaborators
//! and a fast test configuration. Used by the unit suites and the
//! integration tests under `tests/`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use crate::config::{GatewayConfig, ScrapeProfile};
use crate::error::GatewayError;
use crate::reply::ai::{AiRequest, AiResponder};
use crate::reply::shipping::{ShippingProvider, ShippingQuery, ShippingQuote, ShippingService};
use crate::state::AppState;
use crate::storage::Storage;
use crate::upstream::{
    ChatTransport, DirectoryEntry, GroupInfo, MessageKey, ParticipantInfo, Presence, SendReceipt,
    TransportError, TransportEvent, TransportFactory, TransportLink,
};

/// Gateway config with pacing knobs shrunk for tests.
pub fn test_config(storage_root: &std::path::Path) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port: 0,
        db_path: ":memory:".into(),
        session_storage_path: storage_root.to_string_lossy().into_owned(),
        cors_origins: None,
        messages_per_minute: 10,
        messages_per_hour: 100,
        messages_per_day: 1000,
        min_delay_ms: 1,
        max_delay_ms: 2,
        cooldown_after_messages: 50,
        cooldown_duration_ms: 300_000,
        broadcast_batch_size: 10,
        broadcast_batch_delay_ms: 100,
        backoff_base_ms: 10,
        backoff_cap_ms: 100,
        max_reconnect_attempts: 3,
        reconnect_cooloff_ms: 200,
        transport_timeout_secs: 5,
        qr_ttl_secs: 60,
        freshness_notify_secs: 300,
        freshness_append_secs: 1800,
        scrape_profile: ScrapeProfile::Aggressive,
        provider_url: "http://127.0.0.1:1".into(),
        ai_api_key: None,
        ai_base_url: "http://127.0.0.1:1".into(),
        shipping_api_key: None,
        shipping_base_url: "http://127.0.0.1:1".into(),
    }
}

// -- Mock chat network --------------------------------------------------------

/// One message accepted by a mock transport.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub kind: &'static str,
    pub body: String,
}

/// Scriptable provider: each `connect` yields a fresh transport whose
/// event stream the test drives via [`MockNetwork::emit`].
pub struct MockNetwork {
    senders: Mutex<HashMap<String, mpsc::Sender<TransportEvent>>>,
    transports: Mutex<HashMap<String, Arc<MockTransport>>>,
    connects: AtomicU32,
    refuse_connects: AtomicBool,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(HashMap::new()),
            transports: Mutex::new(HashMap::new()),
            connects: AtomicU32::new(0),
            refuse_connects: AtomicBool::new(false),
        })
    }

    /// Push a transport event into the session's live driver. Returns
    /// false when no link is open.
    pub async fn emit(&self, session_id: &str, event: TransportEvent) -> bool {
        let sender = {
            let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
            senders.get(session_id).cloned()
        };
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// The transport from the most recent connect for a session.
    pub fn transport(&self, session_id: &str) -> Option<Arc<MockTransport>> {
        let transports = self.transports.lock().unwrap_or_else(|e| e.into_inner());
        transports.get(session_id).cloned()
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Make subsequent connects fail (to exercise reconnect backoff).
    pub fn set_refuse_connects(&self, refuse: bool) {
        self.refuse_connects.store(refuse, Ordering::Relaxed);
    }
}

#[async_trait]
impl TransportFactory for MockNetwork {
    async fn connect(
        &self,
        session_id: &str,
        _auth_dir: &std::path::Path,
    ) -> Result<TransportLink, TransportError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        if self.refuse_connects.load(Ordering::Relaxed) {
            return Err(TransportError::new("mock connect refused"));
        }
        let (tx, rx) = mpsc::channel(64);
        let transport = Arc::new(MockTransport::default());
        {
            let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
            senders.insert(session_id.to_owned(), tx);
        }
        {
            let mut transports = self.transports.lock().unwrap_or_else(|e| e.into_inner());
            transports.insert(session_id.to_owned(), Arc::clone(&transport));
        }
        Ok(TransportLink { transport, events: rx })
    }
}

/// In-memory transport recording everything the gateway asks of it.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<SentMessage>>,
    pub presences: Mutex<Vec<(String, Presence)>>,
    pub read_marks: Mutex<Vec<MessageKey>>,
    pub logged_out: AtomicBool,
    pub fail_sends: AtomicBool,
    pub directory: Mutex<Vec<DirectoryEntry>>,
    pub chat_list: Mutex<Vec<DirectoryEntry>>,
    pub group_list: Mutex<Vec<GroupInfo>>,
    pub participants: Mutex<HashMap<String, Vec<ParticipantInfo>>>,
    pub lid_map: Mutex<HashMap<String, String>>,
    send_counter: AtomicU32,
}

impl MockTransport {
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn presence_log(&self) -> Vec<(String, Presence)> {
        self.presences.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn receipt(&self) -> SendReceipt {
        let n = self.send_counter.fetch_add(1, Ordering::Relaxed);
        SendReceipt { message_id: format!("mock-{n}"), timestamp: Utc::now() }
    }

    fn record(&self, to: &str, kind: &'static str, body: String) -> Result<SendReceipt, TransportError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(TransportError::new("mock send failure"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage { to: to.to_owned(), kind, body });
        Ok(self.receipt())
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, TransportError> {
        self.record(to, "text", body.to_owned())
    }

    async fn send_image(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<SendReceipt, TransportError> {
        self.record(to, "image", format!("{url}|{}", caption.unwrap_or_default()))
    }

    async fn send_document(
        &self,
        to: &str,
        url: &str,
        filename: &str,
        _mimetype: &str,
    ) -> Result<SendReceipt, TransportError> {
        self.record(to, "document", format!("{url}|{filename}"))
    }

    async fn send_presence(&self, to: &str, presence: Presence) -> Result<(), TransportError> {
        self.presences
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to.to_owned(), presence));
        Ok(())
    }

    async fn mark_read(&self, key: &MessageKey) -> Result<(), TransportError> {
        self.read_marks.lock().unwrap_or_else(|e| e.into_inner()).push(key.clone());
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<DirectoryEntry>, TransportError> {
        Ok(self.directory.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn chats(&self) -> Result<Vec<DirectoryEntry>, TransportError> {
        Ok(self.chat_list.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn groups(&self) -> Result<Vec<GroupInfo>, TransportError> {
        Ok(self.group_list.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn group_participants(
        &self,
        group_jid: &str,
    ) -> Result<Vec<ParticipantInfo>, TransportError> {
        let participants = self.participants.lock().unwrap_or_else(|e| e.into_inner());
        Ok(participants.get(group_jid).cloned().unwrap_or_default())
    }

    async fn resolve_lids(
        &self,
        lids: &[String],
    ) -> Result<HashMap<String, String>, TransportError> {
        let map = self.lid_map.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lids.iter().filter_map(|l| map.get(l).map(|p| (l.clone(), p.clone()))).collect())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logged_out.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) {}
}

// -- Fake collaborators -------------------------------------------------------

/// Shipping provider returning a fixed quote, or an error when unset.
pub struct FakeShipping {
    pub quote: Option<ShippingQuote>,
}

impl FakeShipping {
    pub fn with_quote() -> Arc<Self> {
        Arc::new(Self {
            quote: Some(ShippingQuote {
                services: vec![ShippingService {
                    service: "REG".into(),
                    description: "Reguler".into(),
                    cost: 18000,
                    etd: "2-3".into(),
                }],
            }),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { quote: None })
    }
}

#[async_trait]
impl ShippingProvider for FakeShipping {
    async fn cost(&self, _query: &ShippingQuery) -> Result<ShippingQuote, GatewayError> {
        self.quote
            .clone()
            .ok_or_else(|| GatewayError::dependency("fake shipping configured to fail"))
    }
}

/// AI responder returning a fixed reply, or an error when unset.
pub struct FakeAi {
    pub reply: Option<String>,
    pub requests: Mutex<Vec<AiRequest>>,
}

impl FakeAi {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: Some(reply.to_owned()), requests: Mutex::new(Vec::new()) })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { reply: None, requests: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl AiResponder for FakeAi {
    async fn complete(&self, request: AiRequest) -> Result<String, GatewayError> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request);
        self.reply.clone().ok_or_else(|| GatewayError::dependency("fake AI configured to fail"))
    }
}

// -- Wired state --------------------------------------------------------------

/// Everything a test needs: the wired state plus the scripting handles.
pub struct TestHarness {
    pub state: Arc<AppState>,
    pub network: Arc<MockNetwork>,
    pub ai: Arc<FakeAi>,
    pub shipping: Arc<FakeShipping>,
    /// Credential root handed to the session manager. The mock network
    /// never writes it; tests that exercise credential purge create it.
    pub storage_root: std::path::PathBuf,
}

/// Build an `AppState` over in-memory storage and the mock network.
pub fn harness() -> TestHarness {
    harness_with(FakeAi::replying("(fake ai reply)"), FakeShipping::with_quote())
}

pub fn harness_with(ai: Arc<FakeAi>, shipping: Arc<FakeShipping>) -> TestHarness {
    harness_tuned(ai, shipping, |_| {})
}

/// As [`harness_with`], with a hook to adjust the config first.
pub fn harness_tuned(
    ai: Arc<FakeAi>,
    shipping: Arc<FakeShipping>,
    tweak: impl FnOnce(&mut GatewayConfig),
) -> TestHarness {
    let storage_root =
        std::env::temp_dir().join(format!("chatgate-test-{}", uuid::Uuid::new_v4()));
    let mut config = test_config(&storage_root);
    tweak(&mut config);
    let storage = match Storage::open_in_memory() {
        Ok(s) => Arc::new(s),
        Err(e) => unreachable!("in-memory storage failed: {e}"),
    };
    let network = MockNetwork::new();
    let shutdown = tokio_util::sync::CancellationToken::new();
    let state = AppState::build(
        config,
        storage,
        Arc::clone(&network) as Arc<dyn TransportFactory>,
        Arc::clone(&shipping) as Arc<dyn ShippingProvider>,
        Arc::clone(&ai) as Arc<dyn AiResponder>,
        shutdown,
    );
    TestHarness { state, network, ai, shipping, storage_root }
}
