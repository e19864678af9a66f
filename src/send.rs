// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Send path: copies caller data into a provider-owned descriptor with a
//! lifetime that outlives the in-flight send.
//!
//! `msquic`'s `QUIC_BUFFER` is a C struct (pointer + length) that the
//! caller must keep alive until `QUIC_STREAM_EVENT_SEND_COMPLETE` hands the
//! context back. `quinn::SendStream::write_all` takes a plain `&[u8]`, so
//! there is no FFI-shaped header to pack — but the same ownership problem
//! exists (the caller's buffer may not outlive the write), and this module
//! solves it the same way: one heap allocation holding a copy of the
//! payload, owned by the send path until the write completes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum payload size accepted by [`SendDescriptor::new`], matching the
/// `count > 2^32 - 1` rejection in spec.md's send path.
pub const MAX_SEND_LEN: u64 = u32::MAX as u64 - 1;

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

fn exceeds_max_send_len(len: usize) -> bool {
    len as u64 > MAX_SEND_LEN
}

/// Heap-owned copy of a caller's payload, submitted to the provider and
/// freed (dropped) once the write completes.
///
/// The `id` stands in for the raw pointer `msquic` would pass back as the
/// per-submission context: it lets a [`SendCompletionSink`] correlate a
/// `SEND_COMPLETE` notification with the descriptor that produced it,
/// without this crate ever needing to hand out a real pointer.
pub struct SendDescriptor {
    id: u64,
    payload: Vec<u8>,
}

impl SendDescriptor {
    /// Copy `buf` into a new descriptor.
    ///
    /// Returns `None` if `buf` exceeds [`MAX_SEND_LEN`]; callers translate
    /// that into the `-1` return value spec.md's `send` describes.
    #[must_use]
    pub fn new(buf: &[u8]) -> Option<Self> {
        if exceeds_max_send_len(buf.len()) {
            return None;
        }
        Some(Self {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            payload: buf.to_vec(),
        })
    }

    /// Opaque id used to correlate this descriptor with its eventual
    /// [`SendCompletionSink::on_send_complete`] call.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Borrow the copied payload, to be handed to the provider's write call.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of bytes in the copied payload.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// `true` if the copied payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Result of a completed send, reported to a [`SendCompletionSink`].
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// The provider finished writing the descriptor's payload.
    Sent,
    /// The write failed; the descriptor is still freed exactly once.
    Failed(String),
}

/// Observes descriptor completions.
///
/// Exists so tests (and callers who care) can verify testable property 3 —
/// "for every successful `send(n)` call, exactly one `SEND_COMPLETE` is
/// eventually observed... and the descriptor is freed exactly once" —
/// without relying on `unsafe` pointer bookkeeping the way the C original
/// does with `free(Event->SEND_COMPLETE.ClientContext)`.
pub trait SendCompletionSink: Send + Sync {
    /// Called exactly once per submitted descriptor, after the provider
    /// write completes (successfully or not) and immediately before the
    /// descriptor is dropped.
    fn on_send_complete(&self, descriptor_id: u64, outcome: &SendOutcome);
}

/// A [`SendCompletionSink`] that does nothing, for callers that don't need
/// completion notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSendCompletionSink;

impl SendCompletionSink for NoopSendCompletionSink {
    fn on_send_complete(&self, _descriptor_id: u64, _outcome: &SendOutcome) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        completions: Mutex<Vec<(u64, bool)>>,
    }

    impl SendCompletionSink for RecordingSink {
        fn on_send_complete(&self, descriptor_id: u64, outcome: &SendOutcome) {
            self.completions
                .lock()
                .unwrap()
                .push((descriptor_id, matches!(outcome, SendOutcome::Sent)));
        }
    }

    #[test]
    fn descriptor_copies_the_payload() {
        let d = SendDescriptor::new(b"HELLO").unwrap();
        assert_eq!(d.payload(), b"HELLO");
        assert_eq!(d.len(), 5);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        // Exercise the exact check `SendDescriptor::new` performs without
        // allocating a multi-gigabyte buffer to trigger it.
        assert!(exceeds_max_send_len(MAX_SEND_LEN as usize + 1));
        assert!(!exceeds_max_send_len(MAX_SEND_LEN as usize));
    }

    #[test]
    fn distinct_descriptors_get_distinct_ids() {
        let a = SendDescriptor::new(b"one").unwrap();
        let b = SendDescriptor::new(b"two").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn each_descriptor_completes_exactly_once() {
        // Property 3, restricted to the bookkeeping this module owns: the
        // sink sees one notification per descriptor id, not duplicated, not
        // dropped.
        let sink = RecordingSink::default();
        let descriptors: Vec<_> = (0..5)
            .map(|_| SendDescriptor::new(&[7u8; 100]).unwrap())
            .collect();

        for d in &descriptors {
            sink.on_send_complete(d.id(), &SendOutcome::Sent);
        }

        let completions = sink.completions.lock().unwrap();
        assert_eq!(completions.len(), descriptors.len());
        let mut ids: Vec<u64> = completions.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), descriptors.len());
    }
}
