// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Pure Rust implementation of a shared-memory IPC bus: named shared memory
// with process-local refcounting, a cross-process waiter, a producer-owned
// zero-copy payload arena, a bounded SPMC descriptor ring, and the `Ipc`
// facade that composes them into a unicast-or-broadcast channel.
//
// Binary-compatible primitives (shared memory, named mutex/condvar) follow
// the C++ libipc/tiny-transport conventions — same memory layout, same
// naming scheme, same POSIX/Win32 syscalls.

pub mod shm_name;

mod platform;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

mod spin_lock;
pub use spin_lock::SpinLock;

mod mutex;
pub use mutex::IpcMutex;

mod condition;
pub use condition::IpcCondition;

mod semaphore;
pub use semaphore::IpcSemaphore;

mod waiter;
pub use waiter::Waiter;

mod buffer;
pub use buffer::IpcBuffer;

pub mod error;
pub use error::ErrorCode;

pub mod description;
pub use description::Description;

pub mod arena;
pub use arena::{Receiver as ArenaReceiver, Sender as ArenaSender};

pub mod ring;

pub mod message;
pub use message::Message;

pub mod ipc;
pub use ipc::{Broadcast, Callbacks, Ipc, Mode, Policy, Unicast};

pub mod transport;
