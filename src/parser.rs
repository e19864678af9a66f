// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The MQTT packet parser entry point, treated as an opaque external
//! collaborator per spec.md §1 ("MQTT packet parsing and serialization...
//! out of scope").
//!
//! This crate never parses a control packet; it only hands the parser a
//! [`ReceiveReader`] over whatever bytes the transport delivered for one
//! `RECEIVE` turn and, when that call returns, reads back how much the
//! parser consumed.

use crate::receive::ReceiveReader;

/// Callback installed by the MQTT client core to consume incoming bytes.
///
/// Implementations must not retain the `&mut ReceiveReader` past the call
/// — its buffers are only valid for this one turn (see spec.md §3,
/// "Receive reader"). A parser that needs to hold onto partially-parsed
/// data across turns must copy it out.
pub trait PacketSink: Send + Sync {
    /// Invoked synchronously from the stream controller's receive task with
    /// the bytes delivered for one `RECEIVE` turn.
    ///
    /// The sink should call [`ReceiveReader::read`] until either it has a
    /// complete control packet or the reader runs dry; it does not need to
    /// drain the reader. Whatever is left unread when this returns is
    /// treated as unconsumed and redelivered on the next turn.
    fn on_receive(&self, reader: &mut ReceiveReader);
}

/// A [`PacketSink`] that discards everything delivered to it.
///
/// Useful for tests of the transport layer that don't care about MQTT
/// framing at all.
#[derive(Debug, Default)]
pub struct DiscardingSink;

impl PacketSink for DiscardingSink {
    fn on_receive(&self, reader: &mut ReceiveReader) {
        let mut scratch = vec![0u8; reader.remaining() as usize];
        reader.read(&mut scratch);
    }
}
