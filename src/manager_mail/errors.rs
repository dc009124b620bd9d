use std::fmt::{Display, Formatter};

pub enum MailError {
    Address(String),
    Message(String),
    Transport(String),
    Attachment(String),
}

impl Display for MailError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Address(e) => write!(f, "MailError::Address: {}", e),
            MailError::Message(e) => write!(f, "MailError::Message: {}", e),
            MailError::Transport(e) => write!(f, "MailError::Transport: {}", e),
            MailError::Attachment(e) => write!(f, "MailError::Attachment: {}", e),
        }
    }
}
impl From<lettre::address::AddressError> for MailError {
    fn from(e: lettre::address::AddressError) -> Self { MailError::Address(e.to_string()) }
}
impl From<lettre::error::Error> for MailError {
    fn from(e: lettre::error::Error) -> Self { MailError::Message(e.to_string()) }
}
impl From<lettre::transport::smtp::Error> for MailError {
    fn from(e: lettre::transport::smtp::Error) -> Self { MailError::Transport(e.to_string()) }
}
impl From<std::io::Error> for MailError {
    fn from(e: std::io::Error) -> Self { MailError::Attachment(e.to_string()) }
}
