pub mod mail;

pub use self::mail::{Attachment, MailContent, MailContentType, ValidationError};
