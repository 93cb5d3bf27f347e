//! # Byte Reassembly Buffer
//!
//! Turns arbitrarily sized chunks from a byte stream back into exact-length
//! slices. The receive path enqueues whatever the socket delivered; the
//! framer dequeues exactly the number of bytes the next header or content
//! section needs.
//!
//! Intended usage is single-producer (network receive) / single-consumer
//! (framer). Enqueue never blocks and is safe to call while the consumer
//! dequeues; correctness depends only on the atomicity of the individual
//! operations, never on a length check performed by a different thread than
//! the one dequeuing.
//!
//! ## Lossy dequeue failure
//!
//! [`ReassemblyBuffer::try_dequeue_exact`] pulls bytes out as it assembles
//! the requested length. If the buffer runs dry mid-read the bytes already
//! pulled are **not** restored; the buffer has genuinely shrunk. Callers
//! must treat [`Dequeue::Short`] as fatal for the in-flight read (typically:
//! abort the connection); retrying would silently resume from the wrong byte
//! offset. The framer avoids this path entirely by checking `total_len()`
//! before dequeuing.

use std::collections::VecDeque;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};

/// Outcome of an exact-length dequeue.
#[derive(Debug)]
#[must_use = "a Short result is fatal for the in-flight read and must be handled"]
pub enum Dequeue {
    /// Exactly the requested number of bytes, in enqueue order.
    Complete(Bytes),
    /// The buffer ran dry. Carries whatever was assembled; those bytes are
    /// gone from the buffer.
    Short(Bytes),
}

impl Dequeue {
    /// True for a complete dequeue.
    pub fn is_complete(&self) -> bool {
        matches!(self, Dequeue::Complete(_))
    }

    /// The assembled bytes, complete or not.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Dequeue::Complete(bytes) | Dequeue::Short(bytes) => bytes,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Remainder of a previously split chunk, served before the queue.
    leftover: Bytes,
    /// Chunks in arrival order.
    pending: VecDeque<Bytes>,
    /// Invariant: `total_len == leftover.len() + Σ pending chunk lengths`,
    /// restored after every mutation.
    total_len: usize,
}

impl Inner {
    #[cfg(debug_assertions)]
    fn check_invariant(&self) {
        let actual = self.leftover.len() + self.pending.iter().map(Bytes::len).sum::<usize>();
        debug_assert_eq!(self.total_len, actual);
    }

    #[cfg(not(debug_assertions))]
    fn check_invariant(&self) {}
}

/// Concurrent-safe buffer reassembling exact-length reads from stream chunks.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    inner: Mutex<Inner>,
}

impl ReassemblyBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the pending queue. Never blocks beyond the internal
    /// lock; empty chunks are ignored.
    pub fn enqueue(&self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("reassembly lock poisoned");
        inner.total_len += chunk.len();
        inner.pending.push_back(chunk);
        inner.check_invariant();
    }

    /// Snapshot of the buffered byte count. Advisory: callers use it to
    /// decide whether a dequeue can succeed, not as a synchronization
    /// primitive.
    pub fn total_len(&self) -> usize {
        self.inner.lock().expect("reassembly lock poisoned").total_len
    }

    /// Assemble exactly `count` bytes, splitting chunks as needed.
    ///
    /// Pulls from the leftover of a previous split first, then whole chunks
    /// from the queue; a chunk supplying more than needed is split and its
    /// remainder stashed as the new leftover. A `count` of zero completes
    /// with an empty buffer.
    ///
    /// Returns [`Dequeue::Short`] if the queue is exhausted first; see the
    /// module docs for why that result is lossy and fatal.
    pub fn try_dequeue_exact(&self, count: usize) -> Dequeue {
        let mut inner = self.inner.lock().expect("reassembly lock poisoned");

        // Fast path: leftover alone covers the request with one split.
        if inner.leftover.len() >= count {
            let out = inner.leftover.split_to(count);
            inner.total_len -= count;
            inner.check_invariant();
            return Dequeue::Complete(out);
        }

        let mut assembled = BytesMut::with_capacity(count);
        assembled.extend_from_slice(&inner.leftover);
        inner.total_len -= inner.leftover.len();
        inner.leftover = Bytes::new();

        while assembled.len() < count {
            let Some(mut chunk) = inner.pending.pop_front() else {
                inner.check_invariant();
                return Dequeue::Short(assembled.freeze());
            };
            let needed = count - assembled.len();
            if chunk.len() > needed {
                assembled.extend_from_slice(&chunk.split_to(needed));
                inner.leftover = chunk;
                inner.total_len -= needed;
            } else {
                inner.total_len -= chunk.len();
                assembled.extend_from_slice(&chunk);
            }
        }

        inner.check_invariant();
        Dequeue::Complete(assembled.freeze())
    }
}
