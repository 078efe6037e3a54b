// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Closed error enum for the IPC facade. Mirrors `ipc::ErrorCode` from the
// original `tiny-transport` design: public operations never panic or throw,
// they return `bool` plus (if a callback sink is installed) report one of
// these codes.

use std::io;

/// Stable, closed error classification surfaced through `Callbacks`.
///
/// Numeric values are part of the wire-level contract described by the
/// specification (0..9) and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCode {
    #[error("success")]
    Success = 0,
    #[error("channel not initialised")]
    NoInit = 1,
    #[error("out of memory")]
    NoMem = 2,
    #[error("invalid argument")]
    Inval = 3,
    #[error("not connected")]
    NoConn = 4,
    #[error("connection refused")]
    ConnRefused = 5,
    #[error("not found")]
    NotFound = 6,
    #[error("connection lost")]
    ConnLost = 7,
    #[error("not supported")]
    NotSupported = 8,
    #[error("unknown error")]
    Unknown = 9,
}

impl ErrorCode {
    /// Classify an `io::Error` surfaced by a shared-memory or waiter syscall.
    ///
    /// OS errors map to `Unknown` unless they fall into a recognisable
    /// precondition/resource bucket (see Error Handling Design, §7).
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ErrorCode::NotFound,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorCode::Inval,
            io::ErrorKind::OutOfMemory => ErrorCode::NoMem,
            io::ErrorKind::ConnectionRefused => ErrorCode::ConnRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                ErrorCode::ConnLost
            }
            io::ErrorKind::Unsupported => ErrorCode::NotSupported,
            _ => ErrorCode::Unknown,
        }
    }
}
