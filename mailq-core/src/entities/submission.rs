//! Validation of `SendEmailRequest` into a [`JobSpec`].
//!
//! Every problem is collected so the caller can report all rejected fields
//! in one response.

use std::str::FromStr;

use bytes::Bytes;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use mailq_sdk::objects::{AttachmentPayload, FieldError, Recipients, SendEmailRequest};

use super::job::{Attachment, EmailBody, JobSpec};

const DEFAULT_ATTACHMENT_TYPE: &str = "application/octet-stream";
const MAX_RECIPIENTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid submission: {} field(s) rejected", fields.len())]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

#[derive(Default)]
struct Collector {
    fields: Vec<FieldError>,
}

impl Collector {
    fn reject(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn addresses(&mut self, field: &str, recipients: Option<Recipients>) -> Vec<String> {
        let addresses = recipients.map(Recipients::into_vec).unwrap_or_default();
        for (i, address) in addresses.iter().enumerate() {
            if Mailbox::from_str(address).is_err() {
                self.reject(format!("{field}[{i}]"), "invalid email address");
            }
        }
        addresses
    }

    fn attachment(&mut self, index: usize, payload: AttachmentPayload) -> Option<Attachment> {
        let field = format!("attachments[{index}]");
        if payload.filename.trim().is_empty() {
            self.reject(format!("{field}.filename"), "must not be empty");
        }
        let content_type = payload
            .content_type
            .unwrap_or_else(|| DEFAULT_ATTACHMENT_TYPE.to_owned());
        if ContentType::parse(&content_type).is_err() {
            self.reject(format!("{field}.contentType"), "invalid content type");
        }
        let content = match fast32::base64::RFC4648.decode_str(&payload.content) {
            Ok(bytes) => Bytes::from(bytes),
            Err(_) => {
                self.reject(format!("{field}.content"), "must be base64");
                return None;
            }
        };
        Some(Attachment {
            filename: payload.filename,
            content_type,
            content,
        })
    }
}

impl TryFrom<SendEmailRequest> for JobSpec {
    type Error = ValidationError;

    fn try_from(request: SendEmailRequest) -> Result<Self, ValidationError> {
        let mut c = Collector::default();

        let to = c.addresses("to", Some(request.to));
        if to.is_empty() {
            c.reject("to", "at least one recipient is required");
        }
        let cc = c.addresses("cc", request.cc);
        let bcc = c.addresses("bcc", request.bcc);
        if to.len() + cc.len() + bcc.len() > MAX_RECIPIENTS {
            c.reject("to", format!("at most {MAX_RECIPIENTS} recipients in total"));
        }

        if request.subject.trim().is_empty() {
            c.reject("subject", "must not be empty");
        }

        let body = EmailBody {
            text: request.text.filter(|s| !s.is_empty()),
            html: request.html.filter(|s| !s.is_empty()),
        };
        if body.text.is_none() && body.html.is_none() {
            c.reject("text", "either text or html is required");
        }

        let attachments: Vec<Attachment> = request
            .attachments
            .into_iter()
            .enumerate()
            .filter_map(|(i, payload)| c.attachment(i, payload))
            .collect();

        if !c.fields.is_empty() {
            return Err(ValidationError { fields: c.fields });
        }

        Ok(JobSpec {
            to,
            cc,
            bcc,
            subject: request.subject,
            body,
            attachments,
            scheduled_for: request.scheduled_for,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> SendEmailRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let spec = JobSpec::try_from(request(
            r#"{"to":["a@example.com"],"cc":"c@example.com","subject":"Hello","html":"<b>hi</b>",
                "attachments":[{"filename":"a.txt","content":"aGVsbG8=","contentType":"text/plain"}]}"#,
        ))
        .unwrap();
        assert_eq!(spec.to, vec!["a@example.com"]);
        assert_eq!(spec.cc, vec!["c@example.com"]);
        assert_eq!(spec.body.html.as_deref(), Some("<b>hi</b>"));
        assert_eq!(spec.attachments[0].content.as_ref(), b"hello");
    }

    #[test]
    fn test_collects_every_rejected_field() {
        let err = JobSpec::try_from(request(
            r#"{"to":["not-an-address"],"subject":"  ",
                "attachments":[{"filename":"","content":"%%%"}]}"#,
        ))
        .unwrap_err();
        let fields: Vec<&str> = err.fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "to[0]",
                "subject",
                "text",
                "attachments[0].filename",
                "attachments[0].content"
            ]
        );
    }

    #[test]
    fn test_empty_recipient_list_is_rejected() {
        let err = JobSpec::try_from(request(r#"{"to":[],"subject":"s","text":"t"}"#)).unwrap_err();
        assert_eq!(err.fields[0].field, "to");
    }
}
