pub mod errors;

use std::fs;
use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use crate::config::MailParameters;
use crate::errors::PipelineError;
use crate::manager_mail::errors::MailError;
use crate::orchestrator::ReportSink;

pub struct Mail {
    transport: SmtpTransport,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl Mail {
    /// Returns a new instance of the Mail struct
    ///
    /// # Arguments
    ///
    /// * 'params' - the mail section of the configuration
    pub fn new(params: &MailParameters) -> Result<Mail, MailError> {
        let transport = SmtpTransport::relay(&params.smtp_endpoint)?
            .credentials(Credentials::new(
                params.smtp_user.clone(),
                params.smtp_password.clone(),
            ))
            .build();

        let from = params.from.parse::<Mailbox>()?;
        let mut recipients: Vec<Mailbox> = Vec::with_capacity(params.recipients.len());
        for recipient in &params.recipients {
            recipients.push(recipient.parse::<Mailbox>()?);
        }
        if recipients.is_empty() {
            return Err(MailError::Address("no recipients configured".to_string()));
        }

        Ok(Mail { transport, from, recipients })
    }

    /// Sends a mail with the report file attached to all recipients
    ///
    /// # Arguments
    ///
    /// * 'subject' - the subject of the mail
    /// * 'body' - the plain text body of the mail
    /// * 'attachment' - path to the csv report to attach
    pub fn send_report(&self, subject: &str, body: &str, attachment: &Path) -> Result<(), MailError> {
        let content = fs::read(attachment)?;
        let file_name = attachment
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("report.csv")
            .to_string();
        let content_type = ContentType::parse("text/csv")
            .map_err(|e| MailError::Attachment(e.to_string()))?;

        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        let message = builder.multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(Attachment::new(file_name).body(content, content_type)),
        )?;

        self.transport.send(&message)?;
        info!("report mailed to {} recipients", self.recipients.len());

        Ok(())
    }
}

impl ReportSink for Mail {
    fn deliver(&self, subject: &str, body: &str, attachment: &Path) -> Result<(), PipelineError> {
        Ok(self.send_report(subject, body, attachment)?)
    }
}
