#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use overlay_client::{OverlayStore, StoreError, UploadFile, UploadRelay};
use overlay_core::overlay::{Geometry, Overlay, OverlayBody, OverlayKind};
use overlay_core::types::OverlayId;
use overlay_sync::{SyncConfig, SyncEngine, SyncEvent};
use tokio::sync::{broadcast, watch, Semaphore};

/// Store methods, for scripting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    List,
    Create,
    Update,
    Delete,
}

/// A request the mock store received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Create(OverlayBody),
    Update(OverlayId, OverlayBody),
    Delete(OverlayId),
}

#[derive(Default)]
struct MockState {
    docs: Vec<Overlay>,
    calls: Vec<Call>,
    ids: VecDeque<String>,
    minted: usize,
    failures: HashMap<Method, usize>,
    canonical: Option<fn(&mut Overlay)>,
}

/// In-memory [`OverlayStore`] that records calls and can fail or hold
/// responses on demand.
pub struct MockStore {
    state: Mutex<MockState>,
    call_count: watch::Sender<usize>,
    held: AtomicBool,
    gate: Semaphore,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Self::with_overlays(Vec::new())
    }

    /// A store whose `list` returns `docs`.
    pub fn with_overlays(docs: Vec<Overlay>) -> Arc<Self> {
        let (call_count, _) = watch::channel(0);
        Arc::new(Self {
            state: Mutex::new(MockState {
                docs,
                ..Default::default()
            }),
            call_count,
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        })
    }

    /// Ids handed out by `create`, in order. Falls back to `id-<n>`.
    pub fn assign_ids(&self, ids: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.ids.extend(ids.iter().map(|id| id.to_string()));
    }

    /// Make the next call to `method` fail with a 503.
    pub fn fail_next(&self, method: Method) {
        *self.state.lock().unwrap().failures.entry(method).or_default() += 1;
    }

    /// Post-process every saved document before it is returned.
    pub fn set_canonical(&self, rewrite: fn(&mut Overlay)) {
        self.state.lock().unwrap().canonical = Some(rewrite);
    }

    /// Record requests but hold every response until released.
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let `n` held responses through, oldest first.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Stop holding and let every waiting response through.
    pub fn release_all(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(1 << 20);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Wait until at least `n` calls have been received.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }

    async fn respond<T>(
        &self,
        call: Call,
        method: Method,
        ok: impl FnOnce(&mut MockState) -> T,
    ) -> Result<T, StoreError> {
        let fail = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            let count = state.calls.len();
            self.call_count.send_replace(count);
            match state.failures.get_mut(&method) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };

        if self.held.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }

        if fail {
            return Err(StoreError::Api {
                status: 503,
                body: "service unavailable".into(),
            });
        }
        Ok(ok(&mut self.state.lock().unwrap()))
    }
}

fn saved(state: &MockState, body: &OverlayBody, id: OverlayId) -> Overlay {
    let mut overlay = body.clone().into_overlay(id);
    if let Some(rewrite) = state.canonical {
        rewrite(&mut overlay);
    }
    overlay
}

#[async_trait]
impl OverlayStore for MockStore {
    async fn list(&self) -> Result<Vec<Overlay>, StoreError> {
        self.respond(Call::List, Method::List, |state| state.docs.clone())
            .await
    }

    async fn create(&self, body: &OverlayBody) -> Result<Overlay, StoreError> {
        self.respond(Call::Create(body.clone()), Method::Create, |state| {
            state.minted += 1;
            let id = state
                .ids
                .pop_front()
                .unwrap_or_else(|| format!("id-{}", state.minted));
            saved(state, body, OverlayId::new(id))
        })
        .await
    }

    async fn update(&self, id: &OverlayId, body: &OverlayBody) -> Result<Overlay, StoreError> {
        self.respond(
            Call::Update(id.clone(), body.clone()),
            Method::Update,
            |state| saved(state, body, id.clone()),
        )
        .await
    }

    async fn delete(&self, id: &OverlayId) -> Result<(), StoreError> {
        self.respond(Call::Delete(id.clone()), Method::Delete, |_| ())
            .await
    }
}

/// [`UploadRelay`] that answers with a fixed URL or a fixed failure.
pub struct MockUploads {
    url: Option<String>,
    pub received: Mutex<Vec<String>>,
}

impl MockUploads {
    pub fn returning(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: Some(url.to_string()),
            received: Mutex::default(),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            url: None,
            received: Mutex::default(),
        })
    }
}

#[async_trait]
impl UploadRelay for MockUploads {
    async fn upload(&self, file: UploadFile) -> Result<String, StoreError> {
        self.received.lock().unwrap().push(file.file_name);
        self.url.clone().ok_or(StoreError::Api {
            status: 500,
            body: "disk full".into(),
        })
    }
}

/// A stored text overlay.
pub fn text_overlay(id: &str, geometry: Geometry) -> Overlay {
    Overlay {
        id: Some(OverlayId::new(id)),
        kind: OverlayKind::Text,
        content: "Hello".into(),
        geometry,
        pending: false,
    }
}

/// An engine over `store` with default settings.
pub fn engine(store: &Arc<MockStore>) -> SyncEngine {
    SyncEngine::new(store.clone(), SyncConfig::default())
}

/// An engine already loaded with `docs`.
pub async fn loaded_engine(docs: Vec<Overlay>) -> (Arc<MockStore>, SyncEngine) {
    let store = MockStore::with_overlays(docs);
    let engine = engine(&store);
    engine.load().await.unwrap();
    (store, engine)
}

/// Events received so far, without waiting.
pub fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
