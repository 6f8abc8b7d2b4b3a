use reqwest::Client as HttpClient;
use serde::Serialize;

use crate::error::{Error, Result};

/// Transactional mail via the gateway's HTTP API.
pub struct Mailer {
    http: HttpClient,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl Mailer {
    pub fn new(endpoint: String, api_key: String, from: String) -> Self {
        Self {
            http: HttpClient::new(),
            endpoint,
            api_key,
            from,
        }
    }

    /// Deliver one email. Gateway failures surface as dependency errors;
    /// callers decide how they affect the enclosing operation.
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&OutgoingEmail {
                from: &self.from,
                to,
                subject,
                html,
            })
            .send()
            .await
            .map_err(|err| {
                warn!("Mail gateway unreachable: {err}");
                Error::Dependency("Failed to send email".to_string())
            })?;
        if !response.status().is_success() {
            warn!("Mail gateway returned {}", response.status());
            return Err(Error::Dependency("Failed to send email".to_string()));
        }
        Ok(())
    }

    /// Email the password-reset link.
    pub async fn send_reset_link(&self, to: &str, name: &str, reset_url: &str) -> Result<()> {
        let html = format!(
            "<p>Hi {name},</p>\
             <p>We received a request to reset your password. The link below is \
             valid for one hour and works once.</p>\
             <p><a href=\"{reset_url}\">Reset your password</a></p>\
             <p>If you did not request this, you can ignore this email.</p>"
        );
        self.send(to, "Reset Password", &html).await
    }

    /// Confirm a completed password reset.
    pub async fn send_reset_confirmation(&self, to: &str) -> Result<()> {
        self.send(
            to,
            "Password Reset Successful",
            "<p>Your password has been reset successfully.</p>",
        )
        .await
    }
}
