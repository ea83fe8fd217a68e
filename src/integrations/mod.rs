//! Third-party collaborators: transactional email (Resend) and image
//! tooling (remove.bg, enhancement stub).
//!
//! Both are optional. Without an API key the mailer logs and skips, and the
//! background remover is simply absent from [`crate::api::AppState`].

pub mod email;
pub mod images;

use std::time::Duration;

/// Shared outbound HTTP client with conservative timeouts.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(20))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
