// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![warn(missing_docs)]

//! Client-side transport shim carrying MQTT packet traffic over QUIC
//! streams.
//!
//! This crate owns exactly the layer between an MQTT client core and the
//! network: process-wide QUIC lifecycle ([`init`], [`configure`],
//! [`cleanup`]), a per-client [`connection::Connection`] and its single
//! bidirectional stream, the blocking bridge between the QUIC provider's
//! async events and this crate's synchronous call surface, the
//! scatter/gather [`receive::ReceiveReader`], and the [`send`] path.
//!
//! MQTT packet parsing and serialization, publish/subscribe semantics, and
//! session/reconnect policy are not this crate's concern — callers plug in
//! a [`parser::PacketSink`] and drive [`connection::Connection`] directly.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mqtt_quic_transport::config::ClientSettingsBuilder;
//! use mqtt_quic_transport::connection::Connection;
//! use mqtt_quic_transport::parser::DiscardingSink;
//!
//! mqtt_quic_transport::init()?;
//! mqtt_quic_transport::configure(ClientSettingsBuilder::default().build().unwrap())?;
//!
//! let connection = Connection::new(Arc::new(DiscardingSink));
//! connection.try_connect("broker.example.net", 8883, None)?;
//! connection.send(b"\x10\x00");
//! connection.try_close().ok();
//!
//! mqtt_quic_transport::cleanup();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#[macro_use]
extern crate derive_builder;

pub mod config;
pub mod connection;
pub mod error;
pub mod parser;
pub mod profile;
pub mod receive;
mod registry;
pub mod send;
mod stream;

mod runtime;

pub use config::{ClientSettings, ClientSettingsBuilder, CredentialPolicy};
pub use connection::{Connection, ConnectionObserver, ConnectionState, NoopConnectionObserver};
pub use error::{
    CloseError, CloseErrorKind, ConfigureError, ConfigureErrorKind, ConnectError, ConnectErrorKind,
    InitError, InitErrorKind, StreamSetupFailed,
};
pub use parser::{DiscardingSink, PacketSink};
pub use profile::ExecutionProfile;
pub use receive::ReceiveReader;
pub use runtime::{cleanup, configure, init};
pub use send::{NoopSendCompletionSink, SendCompletionSink, SendDescriptor, SendOutcome};
