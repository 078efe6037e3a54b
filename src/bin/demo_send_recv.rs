// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Minimal two-thread demo: one sender, one broadcast receiver, exchanged
// over a named channel in this single process. Run with `RUST_LOG=debug`
// to see connect/disconnect and delivery logging.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tiny_ipc::{Broadcast, Callbacks, ErrorCode, Ipc, Mode};

struct LoggingCallbacks {
    label: &'static str,
}

impl Callbacks for LoggingCallbacks {
    fn connected(&self, err: Option<ErrorCode>) {
        log::info!("[{}] connected: {:?}", self.label, err);
    }

    fn connection_lost(&self, err: Option<ErrorCode>) {
        log::info!("[{}] connection lost: {:?}", self.label, err);
    }

    fn delivery_complete(&self, err: Option<ErrorCode>) {
        if let Some(err) = err {
            log::warn!("[{}] delivery failed: {err}", self.label);
        }
    }

    fn message_arrived(&self, buf: &[u8], err: Option<ErrorCode>) {
        match err {
            None => log::info!(
                "[{}] message arrived: {:?}",
                self.label,
                String::from_utf8_lossy(buf)
            ),
            Some(err) => log::warn!("[{}] read failed: {err}", self.label),
        }
    }
}

fn main() {
    env_logger::init();

    let channel_name = "demo_send_recv";

    let receiver = Arc::new(
        Ipc::<Broadcast>::new(
            channel_name,
            Mode::Receiver,
            Some(Box::new(LoggingCallbacks { label: "receiver" })),
        )
        .expect("open receiver"),
    );

    let reader = {
        let receiver = Arc::clone(&receiver);
        thread::spawn(move || {
            receiver.read(Some(200));
        })
    };

    // Give the receiver time to register on the ring before the sender
    // checks `recv_count`.
    thread::sleep(Duration::from_millis(50));

    let sender = Ipc::<Broadcast>::new(
        channel_name,
        Mode::Sender,
        Some(Box::new(LoggingCallbacks { label: "sender" })),
    )
    .expect("open sender");

    for msg in ["hello", "world"] {
        if !sender.write_str(msg) {
            log::error!("write({msg:?}) failed");
        }
        thread::sleep(Duration::from_millis(20));
    }

    thread::sleep(Duration::from_millis(100));
    sender.disconnect();
    receiver.disconnect();

    reader.join().expect("reader thread panicked");
}
