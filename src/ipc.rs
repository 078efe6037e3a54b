// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Port of tiny-transport's `ipc::Wr<Transmission>` / `ipc::Chan`: the public
// facade composing Handle + Arena + Ring + Message into a named,
// unicast-or-broadcast channel. Transmission policy (wake-one vs wake-all)
// is a compile-time type parameter rather than a runtime branch, mirroring
// the C++ template — `Unicast` and `Broadcast` are zero-sized marker types
// implementing the `Policy` trait.

use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::arena::{Receiver as ArenaReceiver, Sender as ArenaSender};
use crate::description::Description;
use crate::error::ErrorCode;
use crate::message::Message;
use crate::ring::ConnMode;
use crate::waiter::Waiter;

/// Connection role, matching the public `SENDER=1` / `RECEIVER=2` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Sender = 1,
    Receiver = 2,
}

impl From<Mode> for ConnMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Sender => ConnMode::Sender,
            Mode::Receiver => ConnMode::Receiver,
        }
    }
}

/// Transmission policy: how many waiters a successful `write` wakes, and how
/// a connected receiver consumes the ring.
///
/// Both policies push onto the same ring. Unicast must additionally ensure a
/// published Description reaches exactly one of possibly several connected
/// receivers, so it claims slots off the ring's single shared read cursor
/// (`Message::pop_claim`) rather than the per-receiver private cursor
/// broadcast uses (`Message::pop`) — with a private cursor, every connected
/// receiver would eventually drain and deliver the same message.
pub trait Policy {
    fn wake(waiter: &Waiter) -> io::Result<()>;
    fn pop(message: &Message, on_item: impl FnOnce(&Description)) -> bool;
}

/// Wake exactly one blocked reader per `write`.
pub struct Unicast;

impl Policy for Unicast {
    fn wake(waiter: &Waiter) -> io::Result<()> {
        waiter.notify()
    }

    fn pop(message: &Message, on_item: impl FnOnce(&Description)) -> bool {
        message.pop_claim(on_item)
    }
}

/// Wake every blocked reader per `write`.
pub struct Broadcast;

impl Policy for Broadcast {
    fn wake(waiter: &Waiter) -> io::Result<()> {
        waiter.broadcast()
    }

    fn pop(message: &Message, on_item: impl FnOnce(&Description)) -> bool {
        message.pop(on_item)
    }
}

/// User-supplied lifecycle and delivery hooks for an `Ipc` channel.
///
/// All methods default to no-ops so a caller only overrides what it cares
/// about, matching the "record of optional function values" shape the
/// specification allows as an alternative to a full interface.
pub trait Callbacks {
    fn connected(&self, _err: Option<ErrorCode>) {}
    fn connection_lost(&self, _err: Option<ErrorCode>) {}
    fn delivery_complete(&self, _err: Option<ErrorCode>) {}
    fn message_arrived(&self, _buf: &[u8], _err: Option<ErrorCode>) {}
}

enum Cache {
    Sender(ArenaSender),
    Receiver(ArenaReceiver),
}

/// A named shared-memory channel: `Policy` selects unicast or broadcast
/// wakeup; `mode` selects whether this handle is the channel's one
/// producer or one of its consumers.
pub struct Ipc<P: Policy> {
    message: Message,
    cache: Mutex<Cache>,
    mode: AtomicU8,
    connected: AtomicBool,
    callback: Mutex<Option<Box<dyn Callbacks + Send + Sync>>>,
    _policy: PhantomData<P>,
}

fn mode_to_tag(mode: Mode) -> u8 {
    mode as u8
}

fn tag_to_mode(tag: u8) -> Mode {
    if tag == Mode::Sender as u8 {
        Mode::Sender
    } else {
        Mode::Receiver
    }
}

impl<P: Policy> Ipc<P> {
    /// Create a channel handle and attempt to connect immediately. If
    /// `callbacks` is supplied it is installed before connecting so
    /// `connected(err)` observes the outcome.
    pub fn new(
        name: &str,
        mode: Mode,
        callbacks: Option<Box<dyn Callbacks + Send + Sync>>,
    ) -> io::Result<Self> {
        let message = Message::open(name)?;
        let cache = Mutex::new(match mode {
            Mode::Sender => Cache::Sender(ArenaSender::new()?),
            Mode::Receiver => Cache::Receiver(ArenaReceiver::new()),
        });
        let this = Self {
            message,
            cache,
            mode: AtomicU8::new(mode_to_tag(mode)),
            connected: AtomicBool::new(false),
            callback: Mutex::new(callbacks),
            _policy: PhantomData,
        };
        this.connect(mode);
        Ok(this)
    }

    pub fn name(&self) -> &str {
        self.message.name()
    }

    pub fn valid(&self) -> bool {
        true
    }

    pub fn mode(&self) -> Mode {
        tag_to_mode(self.mode.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Install a callback sink. A channel only ever accepts the first
    /// installation; later calls are no-ops so a handed-off `Ipc` can't have
    /// its sink silently swapped out from under a caller relying on it.
    pub fn set_callback(&self, cb: Box<dyn Callbacks + Send + Sync>) {
        let mut slot = self.callback.lock().unwrap();
        if slot.is_none() {
            *slot = Some(cb);
        }
    }

    fn fire_connected(&self, err: Option<ErrorCode>) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb.connected(err);
        }
    }

    fn fire_lost(&self, err: Option<ErrorCode>) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb.connection_lost(err);
        }
    }

    fn fire_delivered(&self, err: Option<ErrorCode>) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb.delivery_complete(err);
        }
    }

    fn fire_arrived(&self, buf: &[u8], err: Option<ErrorCode>) {
        if let Some(cb) = self.callback.lock().unwrap().as_ref() {
            cb.message_arrived(buf, err);
        }
    }

    /// (Re-)connect in `mode`. If already connected in the same mode this is
    /// a cheap no-op success; switching mode disconnects the old role first
    /// and re-registers in the new one.
    pub fn connect(&self, mode: Mode) -> bool {
        if self.connected.load(Ordering::Acquire) && self.mode() == mode {
            return true;
        }
        if self.connected.load(Ordering::Acquire) {
            self.message.disconnect(self.mode().into());
        }
        self.mode.store(mode_to_tag(mode), Ordering::Release);
        let ok = self.message.connect(mode.into());
        self.connected.store(ok, Ordering::Release);
        self.fire_connected(if ok { None } else { Some(ErrorCode::NoConn) });
        ok
    }

    /// Write a payload. Requires sender mode, a live message channel,
    /// non-empty data, and at least one receiver currently connected.
    pub fn write(&self, data: &[u8]) -> bool {
        if self.mode() != Mode::Sender || !self.connected.load(Ordering::Acquire) || data.is_empty() {
            self.fire_delivered(Some(ErrorCode::Inval));
            return false;
        }
        let subscriber_count = self.message.recv_count();
        if subscriber_count == 0 {
            self.fire_delivered(Some(ErrorCode::NoConn));
            return false;
        }

        let cache = self.cache.lock().unwrap();
        let sender = match &*cache {
            Cache::Sender(s) => s,
            Cache::Receiver(_) => {
                self.fire_delivered(Some(ErrorCode::Inval));
                return false;
            }
        };

        let desc = sender.write(data, subscriber_count);
        if desc.is_empty() {
            self.fire_delivered(Some(ErrorCode::NoMem));
            return false;
        }

        if !self.message.push(desc) {
            // The ring had no room; the specification calls out that the
            // original implementation stranded this allocation until the
            // reclaim timeout. We free it immediately instead.
            sender.rollback(&desc);
            self.fire_delivered(Some(ErrorCode::NoMem));
            return false;
        }

        match P::wake(self.message.waiter()) {
            Ok(()) => {
                self.fire_delivered(None);
                true
            }
            Err(e) => {
                self.fire_delivered(Some(ErrorCode::from_io_error(&e)));
                false
            }
        }
    }

    /// Convenience overload writing a UTF-8 string's bytes.
    pub fn write_str(&self, s: &str) -> bool {
        self.write(s.as_bytes())
    }

    /// Convenience overload writing an owned buffer's bytes.
    pub fn write_buf(&self, buf: &crate::IpcBuffer) -> bool {
        self.write(buf.data())
    }

    /// Block, draining the ring and invoking `message_arrived` for each
    /// Description, until a concurrent `disconnect()` unblocks the wait.
    pub fn read(&self, timeout_ms: Option<u64>) {
        if self.mode() != Mode::Receiver {
            return;
        }
        let cache = self.cache.lock().unwrap();
        let receiver = match &*cache {
            Cache::Receiver(r) => r,
            Cache::Sender(_) => return,
        };

        // `wait_if`'s predicate convention is "true = keep waiting": it
        // drains everything currently available, then reports whether this
        // reader should park again. Returning `connected` means we only
        // stop waiting once `disconnect()` flips it (or `quit_waiting`
        // short-circuits the wait outright).
        while self.connected.load(Ordering::Acquire) {
            let result = self.message.wait_for(
                || {
                    while P::pop(&self.message, |desc| self.deliver(receiver, desc)) {}
                    self.connected.load(Ordering::Acquire)
                },
                timeout_ms,
            );
            if result.is_err() {
                break;
            }
        }
    }

    fn deliver(&self, receiver: &ArenaReceiver, desc: &Description) {
        let result = receiver.read(desc, |bytes| self.fire_arrived(bytes, None));
        if let Err(e) = result {
            self.fire_arrived(&[], Some(ErrorCode::from_io_error(&e)));
        }
    }

    /// Disconnect and unblock any thread parked in `read`.
    pub fn disconnect(&self) -> bool {
        if !self.connected.load(Ordering::Acquire) {
            return false;
        }
        self.connected.store(false, Ordering::Release);
        self.message.disconnect(self.mode().into());
        self.fire_lost(None);
        true
    }
}
