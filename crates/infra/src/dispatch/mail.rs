//! Status mail delivery.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument};

use frameshot_requests::Request;

use super::DispatchError;

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Sends the "your conversion finished" mail.
#[async_trait]
pub trait StatusMailer: Send + Sync {
    async fn notify_request_status(&self, request: &Request, status_text: &str) -> Result<(), DispatchError>;
}

/// SendGrid dynamic-template mailer.
///
/// The template receives `request_id` and `status_text`.
#[derive(Debug, Clone)]
pub struct SendGridMailer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    template_id: String,
    from_email: String,
    from_name: String,
}

impl SendGridMailer {
    pub fn new(api_key: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: SENDGRID_SEND_URL.to_string(),
            api_key: api_key.into(),
            template_id: template_id.into(),
            from_email: "no_reply@frameshot.com.br".to_string(),
            from_name: "Frameshot Notification".to_string(),
        }
    }

    pub fn with_sender(mut self, email: impl Into<String>, name: impl Into<String>) -> Self {
        self.from_email = email.into();
        self.from_name = name.into();
        self
    }

    /// Override the API endpoint (sandbox or local stub).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn payload<'a>(&'a self, request: &'a Request, status_text: &'a str) -> MailPayload<'a> {
        MailPayload {
            from: Address {
                email: &self.from_email,
                name: &self.from_name,
            },
            template_id: &self.template_id,
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &request.user_email,
                    name: "User",
                }],
                dynamic_template_data: TemplateData {
                    request_id: request.id.to_string(),
                    status_text,
                },
            }],
        }
    }
}

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    from: Address<'a>,
    template_id: &'a str,
    personalizations: Vec<Personalization<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
    dynamic_template_data: TemplateData<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateData<'a> {
    request_id: String,
    status_text: &'a str,
}

#[async_trait]
impl StatusMailer for SendGridMailer {
    #[instrument(skip(self, request), fields(request_id = %request.id), err)]
    async fn notify_request_status(&self, request: &Request, status_text: &str) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(request, status_text))
            .send()
            .await
            .map_err(|e| DispatchError::Mail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Mail(format!("sendgrid responded {status}: {body}")));
        }

        info!(status_text, "status mail sent");
        Ok(())
    }
}
