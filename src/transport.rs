// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The network transport hierarchy (locators, UDP/TCP resources, the event
// loop bindings) lives outside this crate's scope — it is a sibling system
// that talks to sockets, not shared memory. This module models it only at
// the interface level its original counterpart (`transport::TransportInterface`
// / `transport::TransportFactory`) exposes, so a future transport crate has
// a stable seam to implement against without this crate depending on any
// particular socket backend.

use crate::error::ErrorCode;

/// Coarse transport kind, mirroring the protocol families the original
/// locator/factory hierarchy dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Udpv4,
    Udpv6,
    Tcp,
    SharedMem,
}

/// A destination/source address, opaque outside of its `kind`.
///
/// The original locator type carries a protocol-specific address plus port;
/// this crate only needs enough of it to route to the right transport, not
/// to interpret the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub kind: TransportKind,
    pub address: Vec<u8>,
    pub port: u16,
}

impl Locator {
    pub fn new(kind: TransportKind, address: Vec<u8>, port: u16) -> Self {
        Self {
            kind,
            address,
            port,
        }
    }
}

/// The seam a concrete network transport implements against.
///
/// Note on `open_output_channel` / `open_input_channel`: the original
/// implementation returned `false` after a successful open for some
/// transports, which the specification calls out as a bug in the source —
/// implementations of this trait must return `true` on success.
pub trait TransportInterface {
    fn is_locator_supported(&self, locator: &Locator) -> bool;
    fn open_output_channel(&mut self, locator: &Locator) -> Result<(), ErrorCode>;
    fn open_input_channel(&mut self, locator: &Locator) -> Result<(), ErrorCode>;
    fn close_output_channel(&mut self, locator: &Locator) -> bool;
}

/// Registry of transports, dispatching a `Locator` to whichever registered
/// transport claims to support it.
#[derive(Default)]
pub struct TransportFactory {
    transports: Vec<Box<dyn TransportInterface>>,
}

impl TransportFactory {
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    pub fn register_transport(&mut self, transport: Box<dyn TransportInterface>) {
        self.transports.push(transport);
    }

    pub fn build_send_resources(&mut self, locator: &Locator) -> bool {
        self.transports
            .iter_mut()
            .filter(|t| t.is_locator_supported(locator))
            .any(|t| t.open_output_channel(locator).is_ok())
    }
}
