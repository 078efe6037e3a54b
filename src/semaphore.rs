// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named, inter-process counting semaphore. POSIX gets a real `sem_t` via
// `sem_open`; Windows gets a named kernel semaphore. Used internally to
// emulate a process-shared condition variable on Windows
// (`crate::condition::WindowsCondition`), and exposed directly as a public
// primitive alongside `IpcMutex` / `IpcCondition` / `SpinLock`.

use std::io;

use crate::platform::PlatformSemaphore;

/// A named, inter-process counting semaphore.
pub struct IpcSemaphore {
    inner: PlatformSemaphore,
}

impl IpcSemaphore {
    /// Open (or create) a named semaphore with `initial_count` permits.
    pub fn open(name: &str, initial_count: u32) -> io::Result<Self> {
        let inner = PlatformSemaphore::open(name, initial_count)?;
        Ok(Self { inner })
    }

    /// Wait for one permit. `None` blocks indefinitely; `Some(ms)` returns
    /// `Ok(false)` on timeout.
    pub fn wait(&self, timeout_ms: Option<u64>) -> io::Result<bool> {
        self.inner.wait(timeout_ms)
    }

    /// Release `count` permits.
    pub fn post(&self, count: u32) -> io::Result<()> {
        self.inner.post(count)
    }

    /// Remove the named semaphore's backing storage. On POSIX this unlinks
    /// it so a subsequent `open` starts fresh; on Windows it is a no-op.
    pub fn clear_storage(name: &str) {
        PlatformSemaphore::clear_storage(name);
    }
}
