//! # Blob Lifecycle
//!
//! Rendered diagrams are materialised as blobs and referenced from markdown
//! by URL. Every blob has exactly one owner at a time:
//!
//! - [`PendingBlobs`] owns the blobs a render attempt allocated; dropping it
//!   without committing revokes them
//! - [`CommittedBlobs`] owns the blobs of the last committed render; a commit
//!   revokes the previous set before adopting the new one

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use uuid::Uuid;

/// URL of a materialised blob, e.g. `blob:mindmark/6f1c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHandle(String);

impl BlobHandle {
    pub const PREFIX: &'static str = "blob:mindmark/";

    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Recognises a URL produced by [`BlobHandle::generate`].
    pub fn parse(url: &str) -> Option<Self> {
        url.strip_prefix(Self::PREFIX)
            .and_then(|id| Uuid::parse_str(id).ok())
            .map(|_| Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where blob bytes live while the visualization references them.
pub trait BlobStore: Send + Sync {
    fn create(&self, mime: &str, data: Vec<u8>) -> BlobHandle;
    fn revoke(&self, handle: &BlobHandle);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub mime: String,
    pub data: Vec<u8>,
}

impl StoredBlob {
    /// The bytes as a self-contained `data:` URL.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.data))
    }
}

/// In-process blob store that records every revocation.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    live: Mutex<HashMap<BlobHandle, StoredBlob>>,
    revoked: Mutex<Vec<BlobHandle>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, handle: &BlobHandle) -> Option<StoredBlob> {
        lock(&self.live).get(handle).cloned()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Every revoke call so far, in order, including repeats.
    pub fn revocations(&self) -> Vec<BlobHandle> {
        lock(&self.revoked).clone()
    }
}

impl BlobStore for MemoryBlobStore {
    fn create(&self, mime: &str, data: Vec<u8>) -> BlobHandle {
        let handle = BlobHandle::generate();
        let blob = StoredBlob {
            mime: mime.to_string(),
            data,
        };
        lock(&self.live).insert(handle.clone(), blob);
        handle
    }

    fn revoke(&self, handle: &BlobHandle) {
        lock(&self.live).remove(handle);
        lock(&self.revoked).push(handle.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Blobs allocated by one render attempt that has not committed yet.
pub struct PendingBlobs {
    store: Arc<dyn BlobStore>,
    handles: Vec<BlobHandle>,
}

impl PendingBlobs {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            handles: Vec::new(),
        }
    }

    pub fn create(&mut self, mime: &str, data: Vec<u8>) -> BlobHandle {
        let handle = self.store.create(mime, data);
        self.handles.push(handle.clone());
        handle
    }

    /// Takes ownership of another attempt's blobs.
    pub fn absorb(&mut self, mut other: PendingBlobs) {
        self.handles.append(&mut other.handles);
    }

    pub fn handles(&self) -> &[BlobHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Revokes everything now instead of at drop.
    pub fn release(mut self) {
        self.revoke_all();
    }

    fn take_handles(&mut self) -> Vec<BlobHandle> {
        std::mem::take(&mut self.handles)
    }

    fn revoke_all(&mut self) {
        for handle in self.take_handles() {
            self.store.revoke(&handle);
        }
    }
}

impl fmt::Debug for PendingBlobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBlobs")
            .field("handles", &self.handles)
            .finish()
    }
}

impl Drop for PendingBlobs {
    fn drop(&mut self) {
        self.revoke_all();
    }
}

/// The blob set referenced by the currently displayed render.
pub struct CommittedBlobs {
    store: Arc<dyn BlobStore>,
    handles: Vec<BlobHandle>,
}

impl CommittedBlobs {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            handles: Vec::new(),
        }
    }

    /// Revokes the previous set and adopts `pending`'s blobs.
    pub fn commit(&mut self, mut pending: PendingBlobs) {
        self.clear();
        self.handles = pending.take_handles();
    }

    pub fn clear(&mut self) {
        for handle in self.handles.drain(..) {
            self.store.revoke(&handle);
        }
    }

    pub fn handles(&self) -> &[BlobHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl fmt::Debug for CommittedBlobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittedBlobs")
            .field("handles", &self.handles)
            .finish()
    }
}

/// Blob URLs referenced from `src` attributes in `text`, in order.
pub fn collect_blob_urls(text: &str) -> Vec<String> {
    static SRC: OnceLock<Regex> = OnceLock::new();
    let re = SRC.get_or_init(|| {
        Regex::new(r#"src=(?:"(blob:[^"]+)"|'(blob:[^']+)')"#).expect("Invalid blob src regex")
    });
    re.captures_iter(text)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> Arc<MemoryBlobStore> {
        Arc::new(MemoryBlobStore::new())
    }

    #[test]
    fn handles_carry_the_prefix() {
        let handle = BlobHandle::generate();
        assert!(handle.as_str().starts_with(BlobHandle::PREFIX));
        assert_ne!(handle, BlobHandle::generate());
    }

    #[test]
    fn parses_only_generated_urls() {
        let handle = BlobHandle::generate();
        assert_eq!(BlobHandle::parse(handle.as_str()), Some(handle));
        assert_eq!(BlobHandle::parse("blob:mindmark/not-a-uuid"), None);
        assert_eq!(BlobHandle::parse("https://example.com/x.svg"), None);
    }

    #[test]
    fn stored_blob_data_url() {
        let blob = StoredBlob {
            mime: "image/png".to_string(),
            data: vec![1, 2, 3],
        };
        assert_eq!(blob.data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn dropping_pending_revokes_once() {
        let store = store();
        let handle = {
            let mut pending = PendingBlobs::new(store.clone());
            pending.create("image/svg+xml", b"<svg/>".to_vec())
        };
        assert_eq!(store.revocations(), vec![handle]);
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn commit_transfers_ownership_and_revokes_previous() {
        let store = store();
        let mut committed = CommittedBlobs::new(store.clone());

        let mut first = PendingBlobs::new(store.clone());
        let a = first.create("image/png", vec![1]);
        committed.commit(first);
        assert!(store.revocations().is_empty());
        assert_eq!(committed.handles(), &[a.clone()]);

        let mut second = PendingBlobs::new(store.clone());
        let b = second.create("image/png", vec![2]);
        committed.commit(second);
        assert_eq!(store.revocations(), vec![a]);
        assert_eq!(store.get(&b).map(|blob| blob.data), Some(vec![2]));

        committed.clear();
        assert_eq!(store.revocations().len(), 2);
        assert!(committed.is_empty());
    }

    #[test]
    fn absorb_moves_handles_without_revoking() {
        let store = store();
        let mut outer = PendingBlobs::new(store.clone());
        let mut inner = PendingBlobs::new(store.clone());
        inner.create("image/png", vec![1]);
        outer.absorb(inner);
        assert!(store.revocations().is_empty());
        assert_eq!(outer.len(), 1);
        outer.release();
        assert_eq!(store.revocations().len(), 1);
    }

    #[test]
    fn collects_blob_urls_from_src_attributes() {
        let text = r#"<img src="blob:mindmark/a"> <img src='blob:mindmark/b'> <img src="data:x">"#;
        assert_eq!(
            collect_blob_urls(text),
            vec!["blob:mindmark/a".to_string(), "blob:mindmark/b".to_string()]
        );
    }
}
