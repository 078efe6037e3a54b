// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Port of tiny-transport's `ipc::detail::QueueBase` + `ipc::detail::Head`:
// binds a channel name to a shared Segment (ctor-lock + descriptor ring) and
// a named Waiter, and tracks the process-local cursor/connection state a
// single reader or writer thread uses to walk the ring.
//
// The Segment's ctor-lock/constructed pair implement double-checked lazy
// init: the first opener of a freshly-created region zeroes the Content
// counters and publishes `constructed=true` with a release store; every
// later opener (in this process or another) spins on an acquire load of
// the same flag before touching the ring.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::description::Description;
use crate::ring::{ConnMode, Ring, RingLayout};
use crate::shm::{ShmHandle, ShmOpenMode};
use crate::spin_lock::adaptive_yield_pub;
use crate::waiter::Waiter;

const CTOR_LOCK_OFFSET: usize = 0;
const CONSTRUCTED_OFFSET: usize = 4;
const SEGMENT_HEADER_SIZE: usize = 64; // pad up to the ring's own alignment

/// Total byte size of a channel's shared Segment region.
pub const SEGMENT_SIZE: usize = SEGMENT_HEADER_SIZE + RingLayout::SIZE;

/// Prefix prepended to a user-supplied channel name to form the
/// shared-memory region name for the descriptor ring.
pub const CHANNEL_PREFIX: &str = "tiny_ipc_queue";

/// Binds a (prefix, name) pair to a Segment and its Waiter, tracking the
/// per-consumer cursor and connection id for one participant.
///
/// A `Message` is meant for single-threaded use: one sender thread or one
/// reader thread per instance, matching the blocking `read` loop described
/// for the facade built on top of it.
pub struct Message {
    region_name: String,
    handle: ShmHandle,
    waiter: Waiter,
    cursor: AtomicU32,
    connected_id: AtomicU32,
    active: AtomicBool,
}

unsafe impl Send for Message {}
unsafe impl Sync for Message {}

impl Message {
    /// Open (creating if necessary) the Segment and Waiter for `name`.
    pub fn open(name: &str) -> io::Result<Self> {
        let region_name = format!("{CHANNEL_PREFIX}_{name}");
        let handle = ShmHandle::acquire(&region_name, SEGMENT_SIZE, ShmOpenMode::CreateOrOpen)?;
        ensure_constructed(&handle);
        let waiter = Waiter::open(&region_name)?;
        Ok(Self {
            region_name,
            handle,
            waiter,
            cursor: AtomicU32::new(0),
            connected_id: AtomicU32::new(0),
            active: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.region_name
    }

    fn ring(&self) -> Ring {
        unsafe { Ring::from_raw(self.handle.get().add(SEGMENT_HEADER_SIZE)) }
    }

    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    pub fn connected_id(&self) -> u32 {
        self.connected_id.load(Ordering::Acquire)
    }

    /// Register this participant on the ring, seeding its cursor at the
    /// shared read position observed at connect time.
    pub fn connect(&self, mode: ConnMode) -> bool {
        let ring = self.ring();
        if self.connected_id.load(Ordering::Acquire) == 0 {
            self.connected_id.store(ring.connect(mode), Ordering::Release);
        }
        self.cursor.store(ring.rd(), Ordering::Release);
        self.active.store(true, Ordering::Release);
        true
    }

    /// Unregister this participant and wake any thread blocked in
    /// `wait_for`. Idempotent: a second call is a harmless no-op because
    /// `connected_id` is already zero.
    pub fn disconnect(&self, mode: ConnMode) -> bool {
        let _ = self.waiter.quit_waiting();
        let id = self.connected_id.swap(0, Ordering::AcqRel);
        self.active.store(false, Ordering::Release);
        if id == 0 {
            return false;
        }
        self.ring().disconnect(mode, id);
        true
    }

    pub fn empty(&self) -> bool {
        self.cursor.load(Ordering::Acquire) == self.ring().wr()
    }

    /// Push a Description onto the ring. Requires an active sender connection.
    pub fn push(&self, desc: Description) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        self.ring().push(|slot| *slot = desc)
    }

    /// Pop the next Description this participant hasn't yet seen, invoking
    /// `on_item` with it.
    ///
    /// The shared read cursor only advances when this participant was the
    /// slowest reader at the time of the pop (its private cursor equalled
    /// the shared cursor) — this is what keeps broadcast mode's independent
    /// per-consumer cursors from over-advancing the producer's fullness
    /// check past a message a slower sibling hasn't read yet.
    pub fn pop(&self, on_item: impl FnOnce(&Description)) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let ring = self.ring();
        let mut cursor = self.cursor.load(Ordering::Acquire);
        let was_tail = cursor == ring.rd();
        let popped = ring.pop(&mut cursor, |desc| {
            on_item(desc);
            was_tail
        });
        self.cursor.store(cursor, Ordering::Release);
        popped
    }

    /// Claim the next unclaimed Description, invoking `on_item` with it.
    ///
    /// Unlike `pop`, there is no private per-instance cursor: every connected
    /// participant races over the ring's single shared read cursor, so a
    /// given Description is handed to exactly one caller. Used for unicast
    /// delivery, where several Receiver-mode handles may be connected to the
    /// same channel but a message must reach only one of them.
    pub fn pop_claim(&self, on_item: impl FnOnce(&Description)) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        match self.ring().pop_claim() {
            Some(desc) => {
                on_item(&desc);
                true
            }
            None => false,
        }
    }

    /// Block until `pred` returns `false` or a concurrent `disconnect` calls
    /// `quit_waiting`. `pred` is expected to drain as much of the ring as it
    /// can and report whether it is still hungry for more.
    pub fn wait_for(&self, pred: impl Fn() -> bool, timeout_ms: Option<u64>) -> io::Result<bool> {
        self.waiter.wait_if(pred, timeout_ms)
    }

    /// Current subscriber count, used by a sender as the readers-counter
    /// seed for a freshly-allocated payload.
    pub fn recv_count(&self) -> u32 {
        self.ring().recv_count_now()
    }
}

fn ensure_constructed(handle: &ShmHandle) {
    let constructed = unsafe { &*(handle.get().add(CONSTRUCTED_OFFSET) as *const AtomicU32) };
    if constructed.load(Ordering::Acquire) != 0 {
        return;
    }
    let ctor_lock = unsafe { &*(handle.get().add(CTOR_LOCK_OFFSET) as *const AtomicU32) };
    let mut backoff = 0u32;
    while ctor_lock.swap(1, Ordering::Acquire) != 0 {
        adaptive_yield_pub(&mut backoff);
    }
    if constructed.load(Ordering::Relaxed) == 0 {
        unsafe {
            std::ptr::write_bytes(
                handle.get().add(SEGMENT_HEADER_SIZE),
                0,
                RingLayout::SIZE,
            );
        }
        constructed.store(1, Ordering::Release);
    }
    ctor_lock.store(0, Ordering::Release);
}
