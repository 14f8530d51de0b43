use crate::error::EmailError;
use crate::validators::is_valid_email;
use serde::Serialize;

#[derive(Clone)]
pub struct EmailClient {
    http_client: reqwest::Client,
    base_url: String,
    sender: Sender,
}

/// A validated from-address
#[derive(Clone)]
pub struct Sender(String);

impl Sender {
    pub fn parse(s: String) -> Result<Self, EmailError> {
        let email = is_valid_email(&s)
            .map_err(|e| EmailError::InvalidRecipient(format!("sender address: {}", e)))?;
        Ok(Self(email))
    }

    pub fn inner(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
pub struct SendEmailRequest {
    from: String,
    to: String,
    #[serde(rename = "Subject")]
    subject: String,
    #[serde(rename = "Html")]
    html: String,
}

impl EmailClient {
    pub fn new(base_url: String, sender: Sender, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
            sender,
        }
    }

    pub async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        html_content: &str,
    ) -> Result<(), EmailError> {
        let url = format!("{}/email", self.base_url);
        let request = SendEmailRequest {
            from: self.sender.inner().to_string(),
            to: recipient.to_string(),
            subject: subject.to_string(),
            html: html_content.to_string(),
        };

        self.http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send email: {}", e);
                EmailError::SendFailed(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Email service returned error: {}", e);
                EmailError::SendFailed(e.to_string())
            })?;

        Ok(())
    }
}

/// Message body for the password reset email
///
/// The reset URL carries the plaintext token; the copy promises the 1-hour
/// window enforced by the token store.
pub fn password_reset_email(reset_url: &str) -> String {
    format!(
        r#"
        <h1>Password Reset</h1>
        <p>You requested to reset your password. Click the link below to create a new password:</p>
        <p><a href="{}">Reset Password</a></p>
        <p>If you didn't request this password reset, you can safely ignore this email.
        The link will expire in 1 hour.</p>
        "#,
        reset_url
    )
}
