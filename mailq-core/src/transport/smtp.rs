use lettre::message::header::ContentType;
use lettre::message::{Attachment as MimeAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{MailTransport, TransportError};
use crate::config::{SmtpConfig, SmtpTls};
use crate::entities::{EmailBody, Job};

/// SMTP relay transport.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

#[derive(Debug, thiserror::Error)]
pub enum SmtpSetupError {
    #[error("invalid from mailbox: {0}")]
    From(#[from] lettre::address::AddressError),
    #[error("smtp relay error: {0}")]
    Relay(#[from] lettre::transport::smtp::Error),
}

enum Content {
    Single(SinglePart),
    Multi(MultiPart),
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpSetupError> {
        let from: Mailbox = config.from.parse()?;
        let mut builder = match config.tls {
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
            SmtpTls::None => {
                tracing::warn!(host = %config.host, "Using SMTP without TLS");
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        };
        if let Some(port) = config.port {
            builder = builder.port(port);
        }
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }
        let mailer = builder.timeout(Some(config.timeout)).build();
        Ok(Self { mailer, from })
    }

    /// Open a connection to the relay and say hello.
    pub async fn test_connection(&self) -> Result<bool, TransportError> {
        self.mailer.test_connection().await.map_err(classify)
    }

    fn build_message(&self, job: &Job) -> Result<Message, TransportError> {
        let invalid = |e: String| TransportError::Permanent(e);
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(job.subject.clone());
        for (addresses, kind) in [(&job.to, "to"), (&job.cc, "cc"), (&job.bcc, "bcc")] {
            for address in addresses {
                let mailbox: Mailbox = address
                    .parse()
                    .map_err(|e| invalid(format!("{kind} address {address}: {e}")))?;
                builder = match kind {
                    "to" => builder.to(mailbox),
                    "cc" => builder.cc(mailbox),
                    _ => builder.bcc(mailbox),
                };
            }
        }

        let content = body_content(&job.body)
            .ok_or_else(|| invalid("message has neither text nor html".to_owned()))?;
        let message = if job.attachments.is_empty() {
            match content {
                Content::Single(part) => builder.singlepart(part),
                Content::Multi(parts) => builder.multipart(parts),
            }
        } else {
            let mut mixed = match content {
                Content::Single(part) => MultiPart::mixed().singlepart(part),
                Content::Multi(parts) => MultiPart::mixed().multipart(parts),
            };
            for attachment in &job.attachments {
                let content_type = ContentType::parse(&attachment.content_type)
                    .map_err(|e| invalid(format!("attachment {}: {e}", attachment.filename)))?;
                mixed = mixed.singlepart(
                    MimeAttachment::new(attachment.filename.clone())
                        .body(attachment.content.to_vec(), content_type),
                );
            }
            builder.multipart(mixed)
        };
        message.map_err(|e| invalid(e.to_string()))
    }
}

fn body_content(body: &EmailBody) -> Option<Content> {
    match (&body.text, &body.html) {
        (Some(text), Some(html)) => Some(Content::Multi(MultiPart::alternative_plain_html(
            text.clone(),
            html.clone(),
        ))),
        (Some(text), None) => Some(Content::Single(SinglePart::plain(text.clone()))),
        (None, Some(html)) => Some(Content::Single(SinglePart::html(html.clone()))),
        (None, None) => None,
    }
}

fn classify(error: lettre::transport::smtp::Error) -> TransportError {
    if error.is_permanent() {
        TransportError::Permanent(error.to_string())
    } else {
        TransportError::Transient(error.to_string())
    }
}

#[async_trait::async_trait]
impl MailTransport for SmtpTransport {
    #[tracing::instrument(skip_all, fields(job = %job.id, attempt = job.attempts))]
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        let message = self.build_message(job)?;
        let response = self.mailer.send(message).await.map_err(classify)?;
        tracing::debug!(code = %response.code(), "Relay accepted message");
        Ok(())
    }
}
