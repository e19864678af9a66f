// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error taxonomy surfaced to the MQTT client core.
//!
//! Every public error is a thin wrapper around a `Kind` enum, following the
//! same `struct XError { kind: XErrorKind }` shape used throughout this
//! codebase: the outer type is what callers match `?` against, `kind()` is
//! what they inspect to decide how to react.

use std::fmt;

use thiserror::Error;

/// Error returned by [`crate::init`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{kind}")]
pub struct InitError {
    kind: InitErrorKind,
}

impl InitError {
    pub(crate) fn new(kind: InitErrorKind) -> Self {
        Self { kind }
    }

    /// Return the corresponding [`InitErrorKind`] for this error.
    #[must_use]
    pub fn kind(&self) -> InitErrorKind {
        self.kind
    }
}

/// An enumeration of categories of [`InitError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitErrorKind {
    /// The QUIC provider could not be acquired.
    ProviderUnavailable,
}

impl fmt::Display for InitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitErrorKind::ProviderUnavailable => write!(f, "QUIC provider is unavailable"),
        }
    }
}

/// Error returned by [`crate::configure`].
#[derive(Debug, Error, Clone)]
#[error("{kind}")]
pub struct ConfigureError {
    kind: ConfigureErrorKind,
}

impl ConfigureError {
    pub(crate) fn new(kind: ConfigureErrorKind) -> Self {
        Self { kind }
    }

    /// Return the corresponding [`ConfigureErrorKind`] for this error.
    #[must_use]
    pub fn kind(&self) -> &ConfigureErrorKind {
        &self.kind
    }
}

/// An enumeration of categories of [`ConfigureError`].
#[derive(Debug, Clone)]
pub enum ConfigureErrorKind {
    /// `init` was never called, or failed, before `configure` was attempted.
    ProviderUnavailable,
    /// The execution-profile registration could not be created.
    RegistrationFailed(String),
    /// The ALPN/idle-timeout configuration could not be opened.
    ConfigurationFailed(String),
    /// Client-side TLS credentials could not be loaded.
    CredentialFailed(String),
}

impl fmt::Display for ConfigureErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigureErrorKind::ProviderUnavailable => {
                write!(f, "QUIC provider is unavailable")
            }
            ConfigureErrorKind::RegistrationFailed(reason) => {
                write!(f, "registration failed: {reason}")
            }
            ConfigureErrorKind::ConfigurationFailed(reason) => {
                write!(f, "configuration failed: {reason}")
            }
            ConfigureErrorKind::CredentialFailed(reason) => {
                write!(f, "credential load failed: {reason}")
            }
        }
    }
}

/// Error returned by [`crate::connection::Connection::try_connect`].
#[derive(Debug, Error, Clone)]
#[error("{kind}")]
pub struct ConnectError {
    kind: ConnectErrorKind,
}

impl ConnectError {
    pub(crate) fn new(kind: ConnectErrorKind) -> Self {
        Self { kind }
    }

    /// Return the corresponding [`ConnectErrorKind`] for this error.
    #[must_use]
    pub fn kind(&self) -> &ConnectErrorKind {
        &self.kind
    }
}

/// An enumeration of categories of [`ConnectError`].
#[derive(Debug, Clone)]
pub enum ConnectErrorKind {
    /// The connection reached the terminal `failed` state.
    HandshakeFailed(String),
    /// The QUIC provider rejected the operation before a handshake could begin.
    ProviderError(String),
    /// A required argument was missing or invalid (e.g. empty host, no client).
    InvalidArgument(String),
    /// The wait loop observed a state it does not classify.
    Unknown,
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectErrorKind::HandshakeFailed(reason) => {
                write!(f, "handshake failed: {reason}")
            }
            ConnectErrorKind::ProviderError(reason) => write!(f, "provider error: {reason}"),
            ConnectErrorKind::InvalidArgument(reason) => {
                write!(f, "invalid argument: {reason}")
            }
            ConnectErrorKind::Unknown => write!(f, "observed an unclassified connection state"),
        }
    }
}

/// Error returned by [`crate::connection::Connection::try_close`].
#[derive(Debug, Error, Clone)]
#[error("{kind}")]
pub struct CloseError {
    kind: CloseErrorKind,
}

impl CloseError {
    pub(crate) fn new(kind: CloseErrorKind) -> Self {
        Self { kind }
    }

    /// Return the corresponding [`CloseErrorKind`] for this error.
    #[must_use]
    pub fn kind(&self) -> &CloseErrorKind {
        &self.kind
    }
}

/// An enumeration of categories of [`CloseError`].
#[derive(Debug, Clone)]
pub enum CloseErrorKind {
    /// The QUIC provider rejected the shutdown request.
    ProviderError(String),
}

impl fmt::Display for CloseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseErrorKind::ProviderError(reason) => write!(f, "provider error: {reason}"),
        }
    }
}

/// Observed asynchronously after a successful [`crate::connection::Connection::try_connect`]
/// when the connection reached `connected` but the single bidirectional stream could not be
/// opened or started.
///
/// This does not unwind `try_connect` — by the time stream setup runs, `try_connect` has
/// already returned `Ok`. Callers that need to know about this degraded state should watch
/// for it via a [`crate::connection::ConnectionObserver`].
#[derive(Debug, Error, Clone)]
#[error("stream setup failed: {reason}")]
pub struct StreamSetupFailed {
    pub(crate) reason: String,
}
