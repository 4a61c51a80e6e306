//! TLS setup shared by the GitHub and AWS HTTP clients.

/// Installs the ring crypto provider as the process default.
///
/// rustls 0.23 refuses to pick a provider on its own when more than one is
/// compiled in, and both octocrab and reqwest build their connectors through
/// it. Installing twice is harmless; the second call is ignored.
pub(crate) fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
