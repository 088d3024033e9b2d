//! Local overlay collection with one operation queue per overlay.
//!
//! Every overlay gets a [`TempToken`] handle when it enters the
//! collection, whether it was loaded or created locally. Operations on
//! one overlay run strictly one at a time: at most one is in flight, the
//! rest wait in FIFO order. The visible state is always rebuilt as the
//! last store-acknowledged document with every outstanding patch applied
//! on top, so a response for an earlier request never hides a later
//! optimistic edit.

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
use overlay_core::overlay::{ContentPatch, GeometryPatch, Overlay, OverlayBody};
use overlay_core::types::{OverlayId, OverlayKey, TempToken};
use tokio::sync::oneshot;

use crate::error::SyncError;

pub(crate) type Reply = oneshot::Sender<Result<(), SyncError>>;

/// What an operation does to its overlay.
#[derive(Debug)]
pub(crate) enum Mutation {
    Create,
    Geometry(GeometryPatch),
    Content(ContentPatch),
    Remove,
}

impl Mutation {
    fn apply(&self, overlay: &mut Overlay) {
        match self {
            Mutation::Geometry(patch) => overlay.apply_geometry(patch),
            Mutation::Content(patch) => overlay.apply_content(patch),
            Mutation::Create | Mutation::Remove => {}
        }
    }
}

/// One queued or in-flight operation.
#[derive(Debug)]
pub(crate) struct PendingOp {
    pub seq: u64,
    pub mutation: Mutation,
    reply: Option<Reply>,
}

impl PendingOp {
    pub fn new(seq: u64, mutation: Mutation, reply: Reply) -> Self {
        Self {
            seq,
            mutation,
            reply: Some(reply),
        }
    }

    /// Deliver the terminal outcome to whoever holds the ticket.
    pub fn resolve(mut self, result: Result<(), SyncError>) {
        if let Some(reply) = self.reply.take() {
            // The ticket may have been dropped; nobody is waiting then.
            let _ = reply.send(result);
        }
    }
}

/// A remote call ready to be sent.
#[derive(Debug, Clone)]
pub(crate) enum Request {
    Create(OverlayBody),
    Update(OverlayId, OverlayBody),
    Delete(OverlayId),
}

/// One overlay and its operation queue.
#[derive(Debug)]
pub(crate) struct Entry {
    /// Last document acknowledged by the store, or the local draft while
    /// the create is outstanding.
    base: Overlay,
    /// What callers see: `base` plus every outstanding patch.
    view: Overlay,
    /// Deleted locally; hidden while the delete is outstanding.
    removed: bool,
    in_flight: Option<PendingOp>,
    queue: VecDeque<PendingOp>,
}

impl Entry {
    /// A store document with nothing outstanding.
    pub fn confirmed(overlay: Overlay) -> Self {
        let mut entry = Self {
            view: overlay.clone(),
            base: overlay,
            removed: false,
            in_flight: None,
            queue: VecDeque::new(),
        };
        entry.rebuild();
        entry
    }

    /// A local draft whose create request is already in flight.
    pub fn creating(draft: Overlay, op: PendingOp) -> Self {
        let mut entry = Self {
            view: draft.clone(),
            base: draft,
            removed: false,
            in_flight: Some(op),
            queue: VecDeque::new(),
        };
        entry.rebuild();
        entry
    }

    pub fn id(&self) -> Option<&OverlayId> {
        self.base.id.as_ref()
    }

    pub fn view(&self) -> &Overlay {
        &self.view
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Number of operations not yet settled.
    pub fn outstanding(&self) -> usize {
        usize::from(self.in_flight.is_some()) + self.queue.len()
    }

    pub fn enqueue(&mut self, op: PendingOp) {
        self.queue.push_back(op);
        self.rebuild();
    }

    /// Hide the overlay and queue its delete. Operations that have not
    /// been sent yet are returned so the caller can resolve them.
    pub fn mark_removed(&mut self, op: PendingOp) -> Vec<PendingOp> {
        self.removed = true;
        let dropped = self.queue.drain(..).collect();
        self.queue.push_back(op);
        self.rebuild();
        dropped
    }

    /// Make the overlay visible again at its last acknowledged state.
    pub fn restore(&mut self) {
        self.removed = false;
        self.rebuild();
    }

    pub fn drain_queue(&mut self) -> Vec<PendingOp> {
        self.queue.drain(..).collect()
    }

    /// Take the in-flight operation if it is the one identified by `seq`.
    pub fn take_in_flight(&mut self, seq: u64) -> Option<PendingOp> {
        match &self.in_flight {
            Some(op) if op.seq == seq => self.in_flight.take(),
            _ => None,
        }
    }

    /// Adopt the store's canonical document.
    pub fn acknowledge(&mut self, overlay: Overlay) {
        self.base = overlay;
        self.rebuild();
    }

    /// Move the next queued operation in flight and build its request.
    ///
    /// Returns `None` while another operation is in flight, when the
    /// queue is empty, or while the overlay still has no store id.
    pub fn start_next(&mut self) -> Option<(u64, Request)> {
        if self.in_flight.is_some() {
            return None;
        }
        let id = self.base.id.clone()?;
        let op = self.queue.pop_front()?;

        let request = match &op.mutation {
            Mutation::Remove => Request::Delete(id),
            mutation => {
                let mut next = self.base.clone();
                mutation.apply(&mut next);
                Request::Update(id, next.body())
            }
        };
        let seq = op.seq;
        self.in_flight = Some(op);
        self.rebuild();
        Some((seq, request))
    }

    pub fn rebuild(&mut self) {
        let mut view = self.base.clone();
        for op in self.in_flight.iter().chain(self.queue.iter()) {
            op.mutation.apply(&mut view);
        }
        view.pending = self.base.id.is_none() || self.outstanding() > 0;
        self.view = view;
    }
}

/// The local overlay collection, in insertion order.
#[derive(Debug, Default)]
pub(crate) struct Collection {
    entries: IndexMap<TempToken, Entry>,
    by_id: HashMap<OverlayId, TempToken>,
    next_seq: u64,
}

impl Collection {
    pub fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
    }

    pub fn insert(&mut self, token: TempToken, entry: Entry) {
        if let Some(id) = entry.id() {
            self.by_id.insert(id.clone(), token);
        }
        self.entries.insert(token, entry);
    }

    /// Empty the collection, handing back the entries that still have
    /// operations queued or in flight.
    pub fn take_busy(&mut self) -> Vec<(TempToken, Entry)> {
        self.by_id.clear();
        self.entries
            .drain(..)
            .filter(|(_, entry)| entry.outstanding() > 0)
            .collect()
    }

    /// Record the store id of a confirmed overlay. Another entry already
    /// holding the id (a copy fetched while the create was in flight) is
    /// dropped.
    pub fn bind_id(&mut self, token: TempToken, id: OverlayId) {
        if let Some(other) = self.by_id.insert(id, token) {
            if other != token {
                self.entries.shift_remove(&other);
            }
        }
    }

    pub fn contains_id(&self, id: &OverlayId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Drop an overlay for good, keeping the order of the others.
    pub fn remove(&mut self, token: TempToken) -> Option<Entry> {
        let entry = self.entries.shift_remove(&token)?;
        if let Some(id) = entry.id() {
            self.by_id.remove(id);
        }
        Some(entry)
    }

    pub fn get(&self, token: TempToken) -> Option<&Entry> {
        self.entries.get(&token)
    }

    pub fn get_mut(&mut self, token: TempToken) -> Option<&mut Entry> {
        self.entries.get_mut(&token)
    }

    /// Resolve a caller key to a visible overlay.
    pub fn resolve(&self, key: &OverlayKey) -> Option<TempToken> {
        let token = match key {
            OverlayKey::Local(token) => *token,
            OverlayKey::Persisted(id) => *self.by_id.get(id)?,
        };
        let entry = self.entries.get(&token)?;
        (!entry.is_removed()).then_some(token)
    }

    /// The key callers should use for an overlay: its store id once
    /// persisted, its local token before.
    pub fn key_of(&self, token: TempToken) -> OverlayKey {
        match self.entries.get(&token).and_then(Entry::id) {
            Some(id) => OverlayKey::Persisted(id.clone()),
            None => OverlayKey::Local(token),
        }
    }

    /// Visible overlays with their handles and caller keys.
    pub fn visible(&self) -> impl Iterator<Item = (TempToken, OverlayKey, &Overlay)> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_removed())
            .map(|(token, entry)| (*token, self.key_of(*token), entry.view()))
    }

    /// Operations queued or in flight across every overlay.
    pub fn outstanding(&self) -> usize {
        self.entries.values().map(Entry::outstanding).sum()
    }
}

#[cfg(test)]
mod tests {
    use overlay_core::overlay::{Geometry, OverlayKind};

    use super::*;

    fn stored(id: &str, geometry: Geometry) -> Overlay {
        Overlay {
            id: Some(OverlayId::new(id)),
            kind: OverlayKind::Text,
            content: "Hello".into(),
            geometry,
            pending: false,
        }
    }

    fn op(seq: u64, mutation: Mutation) -> (PendingOp, oneshot::Receiver<Result<(), SyncError>>) {
        let (tx, rx) = oneshot::channel();
        (PendingOp::new(seq, mutation, tx), rx)
    }

    fn move_to(x: i32, y: i32) -> Mutation {
        Mutation::Geometry(GeometryPatch {
            geometry: Geometry::new(x, y, 200, 50),
        })
    }

    #[test]
    fn view_applies_outstanding_patches_in_order() {
        let mut entry = Entry::confirmed(stored("a", Geometry::new(0, 0, 200, 50)));
        entry.enqueue(op(1, move_to(10, 10)).0);
        entry.enqueue(op(2, move_to(20, 20)).0);

        assert_eq!(entry.view().geometry, Geometry::new(20, 20, 200, 50));
        assert!(entry.view().pending);
    }

    #[test]
    fn only_one_request_in_flight_per_overlay() {
        let mut entry = Entry::confirmed(stored("a", Geometry::new(0, 0, 200, 50)));
        entry.enqueue(op(1, move_to(10, 10)).0);
        entry.enqueue(op(2, move_to(20, 20)).0);

        let (seq, request) = entry.start_next().unwrap();
        assert_eq!(seq, 1);
        match request {
            Request::Update(id, body) => {
                assert_eq!(id.as_str(), "a");
                assert_eq!(body.geometry, Geometry::new(10, 10, 200, 50));
            }
            other => panic!("unexpected request {other:?}"),
        }
        assert!(entry.start_next().is_none());
    }

    #[test]
    fn failed_patch_falls_back_to_base_plus_remaining() {
        let mut entry = Entry::confirmed(stored("a", Geometry::new(0, 0, 200, 50)));
        entry.enqueue(op(1, move_to(10, 10)).0);
        entry.start_next().unwrap();

        let failed = entry.take_in_flight(1).unwrap();
        failed.resolve(Ok(()));
        entry.rebuild();

        assert_eq!(entry.view().geometry, Geometry::new(0, 0, 200, 50));
        assert!(!entry.view().pending);
    }

    #[test]
    fn acknowledged_document_is_canonical() {
        let mut entry = Entry::confirmed(stored("a", Geometry::new(0, 0, 200, 50)));
        entry.enqueue(op(1, move_to(10, 10)).0);
        entry.start_next().unwrap();
        entry.take_in_flight(1).unwrap();

        entry.acknowledge(stored("a", Geometry::new(11, 11, 200, 50)));

        assert_eq!(entry.view().geometry, Geometry::new(11, 11, 200, 50));
    }

    #[test]
    fn take_in_flight_ignores_stale_sequence() {
        let mut entry = Entry::confirmed(stored("a", Geometry::new(0, 0, 200, 50)));
        entry.enqueue(op(5, move_to(10, 10)).0);
        entry.start_next().unwrap();

        assert!(entry.take_in_flight(4).is_none());
        assert!(entry.take_in_flight(5).is_some());
    }

    #[test]
    fn removal_drops_unsent_operations() {
        let mut entry = Entry::confirmed(stored("a", Geometry::new(0, 0, 200, 50)));
        entry.enqueue(op(1, move_to(10, 10)).0);
        entry.start_next().unwrap();
        entry.enqueue(op(2, move_to(20, 20)).0);

        let dropped = entry.mark_removed(op(3, Mutation::Remove).0);

        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].seq, 2);
        assert!(entry.is_removed());
        assert_eq!(entry.outstanding(), 2);
    }

    #[test]
    fn draft_waits_for_store_id_before_sending_updates() {
        let draft = Overlay {
            id: None,
            ..stored("ignored", Geometry::new(0, 0, 200, 50))
        };
        let mut entry = Entry::creating(draft, op(1, Mutation::Create).0);
        entry.enqueue(op(2, move_to(30, 30)).0);
        entry.take_in_flight(1).unwrap();

        assert!(entry.start_next().is_none(), "no id yet");

        entry.acknowledge(stored("abc", Geometry::new(0, 0, 200, 50)));
        let (seq, _) = entry.start_next().unwrap();
        assert_eq!(seq, 2);
    }

    #[test]
    fn take_busy_keeps_only_entries_with_outstanding_work() {
        let mut collection = Collection::default();
        let idle = TempToken::generate();
        let busy = TempToken::generate();
        collection.insert(idle, Entry::confirmed(stored("a", Geometry::new(0, 0, 1, 1))));
        let mut entry = Entry::confirmed(stored("b", Geometry::new(0, 0, 1, 1)));
        entry.enqueue(op(1, move_to(10, 10)).0);
        collection.insert(busy, entry);

        let kept = collection.take_busy();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0, busy);
        assert_eq!(collection.visible().count(), 0);
        assert!(!collection.contains_id(&OverlayId::new("b")));
    }

    #[test]
    fn binding_an_id_drops_a_fetched_copy() {
        let mut collection = Collection::default();
        let fetched = TempToken::generate();
        collection.insert(fetched, Entry::confirmed(stored("abc", Geometry::new(0, 0, 1, 1))));
        let draft = TempToken::generate();
        let unsaved = Overlay {
            id: None,
            ..stored("abc", Geometry::new(5, 5, 1, 1))
        };
        collection.insert(draft, Entry::creating(unsaved, op(1, Mutation::Create).0));

        collection.bind_id(draft, OverlayId::new("abc"));

        assert!(collection.get(fetched).is_none());
        assert_eq!(collection.resolve(&OverlayKey::from("abc")), Some(draft));
    }

    #[test]
    fn collection_resolves_local_and_persisted_keys() {
        let mut collection = Collection::default();
        let token = TempToken::generate();
        collection.insert(token, Entry::confirmed(stored("abc", Geometry::new(0, 0, 1, 1))));

        assert_eq!(collection.resolve(&OverlayKey::Local(token)), Some(token));
        assert_eq!(collection.resolve(&OverlayKey::from("abc")), Some(token));
        assert_eq!(collection.resolve(&OverlayKey::from("zzz")), None);
        assert_eq!(collection.key_of(token), OverlayKey::from("abc"));
    }
}
