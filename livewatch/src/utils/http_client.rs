use std::sync::OnceLock;
use std::time::Duration;

use tracing::{debug, warn};

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client used for scraping public camera directories.
///
/// `accept_invalid_certs` disables certificate verification.
pub fn build_scrape_client(
    user_agent: &str,
    timeout: Duration,
    accept_invalid_certs: bool,
) -> reqwest::Client {
    install_rustls_provider();

    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .unwrap_or_else(|error| {
            warn!(error = %error, "Failed to build scrape client, falling back to reqwest defaults");
            reqwest::Client::new()
        })
}
