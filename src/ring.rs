// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Port of tiny-transport's `ipc::detail::Content`: the bounded SPMC
// descriptor ring embedded in a channel's shared segment. Lock-free on both
// the producer and the consumer side — only the 8 low bits of the 32-bit
// `r`/`w` counters index `slots`, so the full counters detect wraparound
// without an ABA tag. `r`/`w` each sit on their own 64-byte-aligned cache
// line (`Aligned64`) to keep the producer's writes to `w` from bouncing the
// cache line a consumer is spinning on while polling `r`.
//
// This module only knows about raw bytes and offsets: the ring lives inside
// a shared-memory segment placement-constructed by `crate::message`, so
// there is no Rust value of type `Ring` to hand across the process boundary
// — only a base pointer into memory someone else owns.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::description::Description;

/// Number of slots in the ring. Only the low 8 bits of `r`/`w` select a
/// slot; the full 32-bit counters exist purely for wraparound detection.
pub const SLOT_CAPACITY: usize = 256;

const DESCRIPTION_SIZE: usize = std::mem::size_of::<Description>();

/// A value padded/aligned to a 64-byte cache line.
#[repr(C, align(64))]
struct Aligned64<T>(T);

/// Byte offsets within the Content portion of a channel segment.
///
/// Exposed so `crate::message` can compute `Segment::SIZE` without
/// duplicating the layout.
pub struct RingLayout;

impl RingLayout {
    pub const R_OFFSET: usize = 0;
    pub const W_OFFSET: usize = 64;
    pub const CONNECTIONS_OFFSET: usize = 128;
    pub const RECV_COUNT_OFFSET: usize = 132;
    pub const SENDERS_OFFSET: usize = 136;
    pub const NEXT_CC_ID_OFFSET: usize = 140;
    pub const SLOTS_OFFSET: usize = 192;
    pub const SIZE: usize = Self::SLOTS_OFFSET + SLOT_CAPACITY * DESCRIPTION_SIZE;
}

/// Connection mode, mirroring the C++ `SENDER`/`RECEIVER` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnMode {
    Sender = 1,
    Receiver = 2,
}

/// A borrowed view over the Content region of a shared segment.
///
/// Does not own the memory it points into; `crate::message::Segment` owns
/// the placement-constructed bytes and hands out `Ring` views over them.
pub struct Ring {
    base: *mut u8,
}

unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    /// Wrap a pointer to the start of a Content region. `base` must remain
    /// valid, properly sized (`RingLayout::SIZE` bytes), and zero-initialised
    /// (or already-initialised by another mapping of the same segment) for
    /// the lifetime of the returned `Ring`.
    ///
    /// # Safety
    /// Caller guarantees `base` points at `RingLayout::SIZE` live bytes.
    pub unsafe fn from_raw(base: *mut u8) -> Self {
        Self { base }
    }

    unsafe fn atomic_at(&self, offset: usize) -> &AtomicU32 {
        &*(self.base.add(offset) as *const AtomicU32)
    }

    fn r(&self) -> &AtomicU32 {
        unsafe { self.atomic_at(RingLayout::R_OFFSET) }
    }

    fn w(&self) -> &AtomicU32 {
        unsafe { self.atomic_at(RingLayout::W_OFFSET) }
    }

    fn connections(&self) -> &AtomicU32 {
        unsafe { self.atomic_at(RingLayout::CONNECTIONS_OFFSET) }
    }

    fn recv_count(&self) -> &AtomicU32 {
        unsafe { self.atomic_at(RingLayout::RECV_COUNT_OFFSET) }
    }

    fn senders(&self) -> &AtomicU32 {
        unsafe { self.atomic_at(RingLayout::SENDERS_OFFSET) }
    }

    fn next_cc_id(&self) -> &AtomicU32 {
        unsafe { self.atomic_at(RingLayout::NEXT_CC_ID_OFFSET) }
    }

    /// Pointer to slot `idx` (already masked to the low 8 bits by the caller).
    fn slot_ptr(&self, idx: u8) -> *mut Description {
        unsafe {
            self.base
                .add(RingLayout::SLOTS_OFFSET + idx as usize * DESCRIPTION_SIZE)
                as *mut Description
        }
    }

    /// Current number of subscribed receivers (used as `subscriber_count`
    /// when a producer publishes a payload).
    pub fn recv_count_now(&self) -> u32 {
        self.recv_count().load(Ordering::Acquire)
    }

    /// The shared read cursor, observed by a newly-connecting consumer to
    /// seed its private cursor.
    pub fn rd(&self) -> u32 {
        self.r().load(Ordering::Acquire)
    }

    /// The shared write cursor.
    pub fn wr(&self) -> u32 {
        self.w().load(Ordering::Acquire)
    }

    /// Register a connection, returning a process-unique connection id used
    /// to disconnect idempotently.
    pub fn connect(&self, mode: ConnMode) -> u32 {
        self.connections().fetch_add(1, Ordering::AcqRel);
        if mode == ConnMode::Receiver {
            self.recv_count().fetch_add(1, Ordering::AcqRel);
        } else {
            self.senders().fetch_add(1, Ordering::AcqRel);
        }
        self.next_cc_id().fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Unregister a connection. `cc_id == 0` means "already disconnected";
    /// the call is then a no-op, giving idempotent disconnect semantics.
    pub fn disconnect(&self, mode: ConnMode, cc_id: u32) {
        if cc_id == 0 {
            return;
        }
        self.connections().fetch_sub(1, Ordering::AcqRel);
        if mode == ConnMode::Receiver {
            self.recv_count().fetch_sub(1, Ordering::AcqRel);
        } else {
            self.senders().fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Push a Description built by `init`. Returns `false` if the ring is
    /// full (256 outstanding slots relative to the shared read cursor).
    pub fn push(&self, init: impl FnOnce(&mut Description)) -> bool {
        let cur_wt = self.w().load(Ordering::Relaxed) as u8;
        let cur_rd = self.r().load(Ordering::Acquire) as u8;
        if cur_wt == cur_rd.wrapping_sub(1) {
            return false; // full
        }
        let slot = self.slot_ptr(cur_wt);
        unsafe { init(&mut *slot) };
        self.w().fetch_add(1, Ordering::Release);
        true
    }

    /// Pop the Description at `cursor` (a private, per-consumer index) if
    /// `cursor` has not yet caught up with the shared write cursor.
    ///
    /// `commit` receives the popped Description and decides whether to
    /// advance the shared read cursor (unicast mode advances it on every
    /// successful pop; broadcast mode only advances it once the slowest
    /// consumer has moved past a slot, which the caller arranges by basing
    /// the decision on whether this was the lagging reader).
    pub fn pop(&self, cursor: &mut u32, commit: impl FnOnce(&Description) -> bool) -> bool {
        if (*cursor as u8) == (self.w().load(Ordering::Acquire) as u8) {
            return false; // empty for this consumer
        }
        let slot = self.slot_ptr(*cursor as u8);
        let desc = unsafe { *slot };
        *cursor = cursor.wrapping_add(1);
        if commit(&desc) {
            self.r().fetch_add(1, Ordering::Release);
        }
        true
    }

    /// Claim the Description at the shared read cursor, exclusively.
    ///
    /// Unlike `pop`, there is no private cursor: every caller races over the
    /// same `r`, and a CAS decides the winner. Used for unicast delivery,
    /// where at most one of several connected receivers may consume a given
    /// slot. Returns `None` once `r` has caught up with `w`.
    pub fn pop_claim(&self) -> Option<Description> {
        loop {
            let cur_rd = self.r().load(Ordering::Acquire);
            if (cur_rd as u8) == (self.w().load(Ordering::Acquire) as u8) {
                return None; // empty
            }
            let slot = self.slot_ptr(cur_rd as u8);
            let desc = unsafe { *slot };
            if self
                .r()
                .compare_exchange(
                    cur_rd,
                    cur_rd.wrapping_add(1),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return Some(desc);
            }
            // Lost the race to another unicast consumer; retry from the slot
            // it left behind.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_ring() -> (Vec<u8>, Ring) {
        let mut buf = vec![0u8; RingLayout::SIZE];
        let ring = unsafe { Ring::from_raw(buf.as_mut_ptr()) };
        (buf, ring)
    }

    #[test]
    fn fifo_single_producer_single_consumer() {
        let (_buf, ring) = fresh_ring();
        ring.connect(ConnMode::Sender);
        ring.connect(ConnMode::Receiver);

        for i in 0..5u64 {
            let ok = ring.push(|slot| *slot = Description::new(1, i, 8));
            assert!(ok);
        }

        let mut cursor = 0u32;
        for i in 0..5u64 {
            let mut seen = None;
            let ok = ring.pop(&mut cursor, |desc| {
                seen = Some(desc.offset);
                true
            });
            assert!(ok);
            assert_eq!(seen, Some(i));
        }
    }

    #[test]
    fn full_ring_rejects_257th_push() {
        let (_buf, ring) = fresh_ring();
        let mut pushed = 0;
        for i in 0..300u64 {
            if ring.push(|slot| *slot = Description::new(1, i, 8)) {
                pushed += 1;
            } else {
                break;
            }
        }
        assert_eq!(pushed, SLOT_CAPACITY - 1);
    }

    #[test]
    fn disconnect_is_idempotent_on_zero_id() {
        let (_buf, ring) = fresh_ring();
        ring.disconnect(ConnMode::Receiver, 0);
        assert_eq!(ring.recv_count_now(), 0);
    }

    #[test]
    fn broadcast_cursors_are_independent() {
        let (_buf, ring) = fresh_ring();
        assert!(ring.push(|slot| *slot = Description::new(1, 0, 8)));
        assert!(ring.push(|slot| *slot = Description::new(1, 1, 8)));

        let mut c1 = 0u32;
        let mut c2 = 0u32;
        assert!(ring.pop(&mut c1, |_| false));
        assert!(ring.pop(&mut c1, |_| false));
        assert!(ring.pop(&mut c2, |_| false));
        assert_eq!(c1, 2);
        assert_eq!(c2, 1);
    }

    #[test]
    fn pop_claim_delivers_each_slot_to_exactly_one_caller() {
        let (_buf, ring) = fresh_ring();
        for i in 0..5u64 {
            assert!(ring.push(|slot| *slot = Description::new(1, i, 8)));
        }

        let mut seen = Vec::new();
        while let Some(desc) = ring.pop_claim() {
            seen.push(desc.offset);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(ring.pop_claim(), None);
    }
}
