// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Reference-counted ownership of message bodies, reused across writers.
//!
//! A [`Payload`] is cheap to clone (an `Arc` bump) and, once every clone is
//! dropped, its backing buffer is returned to the pool's free list instead of
//! being deallocated.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload pool exhausted: {requested} bytes requested, {limit} byte budget in use")]
    OutOfMemory { requested: usize, limit: usize },
}

struct Shared {
    free_list: Mutex<Vec<Vec<u8>>>,
    max_total_bytes: Option<usize>,
    bytes_in_use: AtomicU64,
    total_allocations: AtomicU64,
    total_releases: AtomicU64,
}

/// Owns a set of reusable byte buffers shared by every Track in a pipe.
///
/// Thread-safe: `get_payload`/`release_payload` may be called concurrently
/// from any number of Track worker tasks.
#[derive(Clone)]
pub struct PayloadPool {
    shared: Arc<Shared>,
}

impl PayloadPool {
    /// Create a pool with an optional ceiling on bytes simultaneously checked out.
    pub fn new(max_total_bytes: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                free_list: Mutex::new(Vec::new()),
                max_total_bytes,
                bytes_in_use: AtomicU64::new(0),
                total_allocations: AtomicU64::new(0),
                total_releases: AtomicU64::new(0),
            }),
        }
    }

    /// Check out a fresh buffer of at least `size` bytes, reusing a freed
    /// buffer if one is large enough.
    pub fn get_payload(&self, size: usize) -> Result<Payload, PayloadError> {
        if let Some(limit) = self.shared.max_total_bytes {
            let in_use = self.shared.bytes_in_use.load(Ordering::Acquire) as usize;
            if in_use + size > limit {
                return Err(PayloadError::OutOfMemory {
                    requested: size,
                    limit,
                });
            }
        }

        let mut bytes = {
            let mut free_list = self.shared.free_list.lock();
            match free_list.iter().position(|b| b.capacity() >= size) {
                Some(idx) => free_list.swap_remove(idx),
                None => Vec::with_capacity(size),
            }
        };
        bytes.clear();
        bytes.resize(size, 0);

        self.shared
            .bytes_in_use
            .fetch_add(size as u64, Ordering::AcqRel);
        self.shared.total_allocations.fetch_add(1, Ordering::Relaxed);

        Ok(Payload {
            inner: Arc::new(PayloadInner {
                bytes: Mutex::new(Some(bytes)),
                len: size,
                pool: Arc::downgrade(&self.shared),
            }),
        })
    }

    /// Produce an additional reference to the same bytes without copying.
    /// O(1): this is an `Arc` clone.
    pub fn get_payload_ref(&self, src: &Payload) -> Payload {
        Payload {
            inner: Arc::clone(&src.inner),
        }
    }

    /// Explicitly release a reference. Equivalent to dropping `payload`, kept
    /// as a named operation to mirror the pool's documented contract.
    pub fn release_payload(&self, payload: Payload) {
        drop(payload);
    }

    /// Number of buffers currently idle in the free list.
    pub fn free_count(&self) -> usize {
        self.shared.free_list.lock().len()
    }

    /// `total get_payload calls - total buffers fully released`: always equal
    /// to the number of live `Payload` handles outstanding (refcount law).
    pub fn outstanding(&self) -> i64 {
        self.shared.total_allocations.load(Ordering::Relaxed) as i64
            - self.shared.total_releases.load(Ordering::Relaxed) as i64
    }
}

struct PayloadInner {
    bytes: Mutex<Option<Vec<u8>>>,
    len: usize,
    pool: Weak<Shared>,
}

impl Drop for PayloadInner {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.bytes_in_use
                .fetch_sub(self.len as u64, Ordering::AcqRel);
            pool.total_releases.fetch_add(1, Ordering::Relaxed);
            if let Some(bytes) = self.bytes.lock().take() {
                pool.free_list.lock().push(bytes);
            }
        }
    }
}

/// A refcounted, immutable-once-populated message body.
///
/// Bytes are immutable once the `Payload` is constructed and handed to a
/// writer; writers must not mutate them.
#[derive(Clone)]
pub struct Payload {
    inner: Arc<PayloadInner>,
}

impl Payload {
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Current number of live handles to this payload's bytes.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Borrow the bytes. Returns `None` only if the buffer was already taken
    /// back by the pool, which cannot happen while any `Payload` is alive.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.inner.bytes.lock();
        f(guard.as_deref().unwrap_or(&[]))
    }

    pub fn copy_from_slice(&self, src: &[u8]) {
        let mut guard = self.inner.bytes.lock();
        if let Some(bytes) = guard.as_mut() {
            let n = bytes.len().min(src.len());
            bytes[..n].copy_from_slice(&src[..n]);
        }
    }
}
