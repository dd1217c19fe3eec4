use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::not_configured;
use crate::config::SmtpConfig;
use crate::models::NotificationMethod;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, PriceAlert};
use crate::utils::error::AppError;

fn email_error(err: impl std::fmt::Display) -> AppError {
    AppError::Plugin {
        plugin_type: "email".to_string(),
        message: err.to_string(),
    }
}

/// SMTP delivery; the channel's contact info is the recipient address.
pub struct EmailNotifier {
    config: Option<SmtpConfig>,
}

impl EmailNotifier {
    pub fn new(config: Option<SmtpConfig>) -> Self {
        Self { config }
    }

    fn build_message(config: &SmtpConfig, to: &str, alert: &PriceAlert) -> Result<Message, AppError> {
        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_address)
            .parse()
            .map_err(email_error)?;
        let to: Mailbox = to.parse().map_err(email_error)?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(alert.subject_line())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(alert.plain_text()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(alert.html_body()),
                    ),
            )
            .map_err(email_error)
    }

    fn transport(config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, AppError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(email_error)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn method(&self) -> NotificationMethod {
        NotificationMethod::Email
    }

    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    async fn notify(&self, contact: &str, alert: &PriceAlert) -> Result<NotificationResult, AppError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| not_configured("email", "SMTP server"))?;

        let message = Self::build_message(config, contact, alert)?;
        let mailer = Self::transport(config)?;

        match mailer.send(message).await {
            Ok(response) => Ok(NotificationResult::delivered(
                response.first_line().map(str::to_string),
            )),
            Err(e) => Ok(NotificationResult::rejected(e.to_string())),
        }
    }
}
