// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Process-wide QUIC library lifecycle (C1 provider binding + C2 global
//! runtime from spec.md §4.1).
//!
//! `msquic` callers go through `MsQuicOpen2` once per process to get a
//! function-table handle, then `QuicRegistrationOpen`/`QuicConfigurationOpen`
//! to stand up a registration and a configuration. This module reproduces
//! that three-handle shape with `quinn`/Tokio equivalents: a Tokio
//! [`tokio::runtime::Runtime`] plays the role of the registration (it is
//! what "execution profile" actually governs), and a [`quinn::Endpoint`]
//! bound with a [`quinn::ClientConfig`] plays the role of the
//! function-table handle + configuration combined, since `quinn` has no
//! separate concept of an unconfigured client endpoint.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::{Mutex, OnceLock};

use quinn::ClientConfig as QuinnClientConfig;
use quinn::Endpoint;

use crate::config::{ClientSettings, CredentialPolicy};
use crate::error::{ConfigureError, ConfigureErrorKind, InitError, InitErrorKind};
use crate::profile::ExecutionProfile;

/// The process-wide state `init`/`configure`/`cleanup` manage.
///
/// Guarded by a single mutex rather than split across several `OnceLock`s
/// so that `configure`'s "close previously-opened handles in reverse order
/// on failure" requirement (spec.md §4.1) has one obvious place to do the
/// unwinding: nothing is published into `GLOBAL` until every step in
/// `configure` has succeeded.
pub(crate) struct GlobalRuntime {
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) endpoint: Endpoint,
    pub(crate) execution_profile: ExecutionProfile,
    client_config: QuinnClientConfig,
}

impl GlobalRuntime {
    /// Return the endpoint `try_connect` should dial out from.
    ///
    /// `msquic` sets the local-address parameter on the per-connection
    /// handle before starting it (spec.md §4.2 step 3); `quinn` has no
    /// per-connection equivalent since the local address is a property of
    /// the `Endpoint` a connection is opened from. This reproduces the same
    /// observable behavior by binding a fresh client endpoint to the
    /// requested address, sharing this runtime's client configuration.
    /// Parameter-set failure is a warning, not fatal, exactly as spec.md
    /// requires: this falls back to the default endpoint rather than
    /// failing the connect attempt.
    pub(crate) fn endpoint_for(&self, bind_addr: Option<SocketAddr>) -> Endpoint {
        let Some(addr) = bind_addr else {
            return self.endpoint.clone();
        };
        match Endpoint::client(addr) {
            Ok(mut endpoint) => {
                endpoint.set_default_client_config(self.client_config.clone());
                endpoint
            }
            Err(e) => {
                log::warn!(
                    "failed to bind local address {addr} for this connection: {e}; \
                     using the default local address instead"
                );
                self.endpoint.clone()
            }
        }
    }
}

enum State {
    Uninitialized,
    /// `init()` succeeded but `configure()` has not run (or was torn down).
    Initialized,
    Configured(GlobalRuntime),
}

fn state() -> &'static Mutex<State> {
    static STATE: OnceLock<Mutex<State>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(State::Uninitialized))
}

/// Acquire the QUIC provider.
///
/// Idempotent: calling this again while already initialized returns `Ok`
/// without reacquiring anything, matching spec.md §4.1.
///
/// # Errors
/// Returns [`InitError`] if the provider is unavailable. In practice this
/// crate's binding to `quinn` cannot fail this way (there is no separate
/// library-load step), but the error path is kept so callers written
/// against a future non-`quinn` binding don't need to change.
pub fn init() -> Result<(), InitError> {
    let mut guard = state().lock().unwrap();
    match &*guard {
        State::Uninitialized => {
            // rustls 0.23 requires a process-wide default crypto provider;
            // installing twice is harmless, but only the first init() call
            // needs to.
            let _ = rustls::crypto::ring::default_provider().install_default();
            *guard = State::Initialized;
            log::info!("QUIC provider acquired");
            Ok(())
        }
        State::Initialized | State::Configured(_) => {
            log::debug!("init() called while already initialized; no-op");
            Ok(())
        }
    }
}

/// Release the QUIC provider and any registration/configuration built on
/// top of it. Safe to call when `init` was never called successfully.
pub fn cleanup() {
    let mut guard = state().lock().unwrap();
    if let State::Configured(global) = &*guard {
        log::info!("tearing down QUIC registration and configuration");
        global.endpoint.close(0u32.into(), b"");
    }
    *guard = State::Uninitialized;
}

/// Create the registration (execution-profile-shaped Tokio runtime) and the
/// configuration (ALPN `"mqtt"`, disabled idle timeout, credentials per
/// `settings.credential_policy`).
///
/// On any step failure, handles opened by earlier steps in this call are
/// closed in reverse order, and process state is left exactly as it was
/// before this call (still `Initialized`, not `Configured`).
///
/// # Errors
/// Returns [`ConfigureError`] for a provider not yet initialized, a
/// registration (runtime) that could not be built, a configuration
/// (ALPN/idle-timeout) that could not be opened, or credentials that could
/// not be loaded.
pub fn configure(settings: ClientSettings) -> Result<(), ConfigureError> {
    let mut guard = state().lock().unwrap();
    if matches!(*guard, State::Uninitialized) {
        return Err(ConfigureError::new(ConfigureErrorKind::ProviderUnavailable));
    }

    // Step 1: registration (the Tokio runtime backing every connection).
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.execution_profile.worker_threads().get())
        .thread_name(settings.execution_profile.thread_name_prefix())
        .enable_all()
        .build()
        .map_err(|e| ConfigureError::new(ConfigureErrorKind::RegistrationFailed(e.to_string())))?;

    // Step 2: configuration (ALPN "mqtt", idle timeout disabled) + step 3:
    // credentials. Both folded into quinn's ClientConfig construction; if
    // either fails, `runtime` (the only handle opened so far) is simply
    // dropped, which is "closing in reverse order" for a single handle.
    let client_config = match build_client_config(&settings.credential_policy) {
        Ok(cfg) => cfg,
        Err(err) => {
            drop(runtime);
            return Err(err);
        }
    };

    // Endpoint bind (the function-table handle equivalent). If this fails,
    // unwind both previously-built handles.
    let bind_addr = SocketAddr::new(Ipv6Addr::UNSPECIFIED.into(), 0);
    let mut endpoint = match Endpoint::client(bind_addr) {
        Ok(ep) => ep,
        Err(e) => {
            drop(client_config);
            drop(runtime);
            return Err(ConfigureError::new(ConfigureErrorKind::ConfigurationFailed(
                e.to_string(),
            )));
        }
    };
    endpoint.set_default_client_config(client_config.clone());

    log::info!(
        "QUIC client configured (profile={:?}, credential_policy={:?})",
        settings.execution_profile,
        settings.credential_policy
    );

    *guard = State::Configured(GlobalRuntime {
        runtime,
        endpoint,
        execution_profile: settings.execution_profile,
        client_config,
    });
    Ok(())
}

fn build_client_config(
    policy: &CredentialPolicy,
) -> Result<QuinnClientConfig, ConfigureError> {
    let crypto = match policy {
        CredentialPolicy::NoCertificateValidation => {
            log::warn!(
                "QUIC client configured with no server-certificate validation; \
                 do not use this credential policy in production"
            );
            rustls::ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(std::sync::Arc::new(
                    AcceptAnyServerCert::default(),
                ))
                .with_no_client_auth()
        }
        CredentialPolicy::Custom {
            ca_file,
            cert_file,
            key_file,
        } => return build_custom_client_config(ca_file, cert_file.as_deref(), key_file.as_deref()),
    };
    finish_client_config(crypto)
}

fn build_custom_client_config(
    ca_file: &std::path::Path,
    cert_file: Option<&std::path::Path>,
    key_file: Option<&std::path::Path>,
) -> Result<QuinnClientConfig, ConfigureError> {
    let mut roots = rustls::RootCertStore::empty();
    let ca_bytes = std::fs::read(ca_file).map_err(|e| {
        ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
            "reading {}: {e}",
            ca_file.display()
        )))
    })?;
    for cert in rustls_pemfile::certs(&mut ca_bytes.as_slice()) {
        let cert = cert.map_err(|e| {
            ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
                "parsing CA file {}: {e}",
                ca_file.display()
            )))
        })?;
        roots.add(cert).map_err(|e| {
            ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
                "adding CA to trust store: {e}"
            )))
        })?;
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);

    let crypto = match (cert_file, key_file) {
        (Some(cert_file), Some(key_file)) => {
            let cert_bytes = std::fs::read(cert_file).map_err(|e| {
                ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
                    "reading {}: {e}",
                    cert_file.display()
                )))
            })?;
            let certs: Vec<_> = rustls_pemfile::certs(&mut cert_bytes.as_slice())
                .collect::<Result<_, _>>()
                .map_err(|e| {
                    ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
                        "parsing client cert: {e}"
                    )))
                })?;
            let key_bytes = std::fs::read(key_file).map_err(|e| {
                ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
                    "reading {}: {e}",
                    key_file.display()
                )))
            })?;
            let key = rustls_pemfile::private_key(&mut key_bytes.as_slice())
                .map_err(|e| {
                    ConfigureError::new(ConfigureErrorKind::CredentialFailed(format!(
                        "parsing client key: {e}"
                    )))
                })?
                .ok_or_else(|| {
                    ConfigureError::new(ConfigureErrorKind::CredentialFailed(
                        "no private key found in key file".to_string(),
                    ))
                })?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ConfigureError::new(ConfigureErrorKind::CredentialFailed(e.to_string())))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(ConfigureError::new(ConfigureErrorKind::CredentialFailed(
                "cert_file and key_file must both be provided or both omitted".to_string(),
            )))
        }
    };

    finish_client_config(crypto)
}

fn finish_client_config(mut crypto: rustls::ClientConfig) -> Result<QuinnClientConfig, ConfigureError> {
    // ALPN "mqtt": 4 bytes, no null terminator, exactly as spec.md §6 requires.
    crypto.alpn_protocols = vec![b"mqtt".to_vec()];

    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto).map_err(|e| {
        ConfigureError::new(ConfigureErrorKind::ConfigurationFailed(e.to_string()))
    })?;
    let mut client_config = QuinnClientConfig::new(std::sync::Arc::new(quic_crypto));

    // idle_timeout = 0 ("disabled"): the MQTT layer governs liveness via
    // keep-alive, not the transport.
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(None);
    client_config.transport_config(std::sync::Arc::new(transport));

    Ok(client_config)
}

/// Certificate verifier that accepts any server certificate.
///
/// This is [`CredentialPolicy::NoCertificateValidation`], spelled out: the
/// shipped default, suitable for benchmark use against a known host, never
/// for production.
#[derive(Debug, Default)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Run `f` with a reference to the configured global runtime.
///
/// Returns `None` if `configure` has not (yet, or any longer) succeeded.
pub(crate) fn with_global<R>(f: impl FnOnce(&GlobalRuntime) -> R) -> Option<R> {
    let guard = state().lock().unwrap();
    match &*guard {
        State::Configured(global) => Some(f(global)),
        State::Uninitialized | State::Initialized => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    // This module's state lives in a process-wide static, so these tests
    // must not interleave with each other (cargo otherwise runs tests in
    // this file on separate threads concurrently by default).
    #[test]
    #[serial]
    fn second_init_is_a_no_op_success() {
        cleanup();
        assert!(init().is_ok());
        assert!(init().is_ok());
        cleanup();
    }

    #[test]
    #[serial]
    fn configure_before_init_is_rejected() {
        cleanup();
        let settings = ClientSettings {
            execution_profile: ExecutionProfile::LowLatency,
            credential_policy: CredentialPolicy::NoCertificateValidation,
        };
        let err = configure(settings).unwrap_err();
        assert!(matches!(err.kind(), ConfigureErrorKind::ProviderUnavailable));
    }

    #[test]
    #[serial]
    fn configure_then_cleanup_then_with_global_sees_nothing() {
        cleanup();
        init().unwrap();
        let settings = ClientSettings {
            execution_profile: ExecutionProfile::Scavenger,
            credential_policy: CredentialPolicy::NoCertificateValidation,
        };
        configure(settings).unwrap();
        assert!(with_global(|_| ()).is_some());
        cleanup();
        assert!(with_global(|_| ()).is_none());
    }
}
