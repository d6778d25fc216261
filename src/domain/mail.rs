use std::path::PathBuf;

use derive_more::Display;
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MailContentType {
    #[display(fmt = "text")]
    Text,
    #[display(fmt = "html")]
    Html,
    #[display(fmt = "template")]
    Template,
}

/// A file sent along with the mail.
///
/// An attachment without a file payload is skipped when the mail is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file: Option<PathBuf>,
    pub file_name: String,
}

impl Attachment {
    pub fn new(file: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            file_name: file_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailContent {
    pub subject: String,
    pub to: Vec<String>,
    #[serde(rename = "mailContentType")]
    pub content_type: MailContentType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub template: String,
    #[serde(default, rename = "templateContent")]
    pub template_variables: Map<String, Value>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("email content is missing")]
    EmptyContent,
    #[error("email subject cannot be empty")]
    EmptySubject,
    #[error("email receiving address cannot be empty")]
    EmptyRecipients,
    #[error("email content cannot be empty")]
    EmptyBody,
}

impl MailContent {
    pub fn new(
        subject: impl Into<String>,
        to: Vec<String>,
        content_type: MailContentType,
    ) -> Self {
        Self {
            subject: subject.into(),
            to,
            content_type,
            content: String::new(),
            html_content: String::new(),
            template: String::new(),
            template_variables: Map::new(),
            attachments: Vec::new(),
        }
    }

    pub fn text(subject: impl Into<String>, to: Vec<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(subject, to, MailContentType::Text)
        }
    }

    pub fn html(
        subject: impl Into<String>,
        to: Vec<String>,
        html_content: impl Into<String>,
    ) -> Self {
        Self {
            html_content: html_content.into(),
            ..Self::new(subject, to, MailContentType::Html)
        }
    }

    pub fn template(
        subject: impl Into<String>,
        to: Vec<String>,
        template: impl Into<String>,
        template_variables: Map<String, Value>,
    ) -> Self {
        Self {
            template: template.into(),
            template_variables,
            ..Self::new(subject, to, MailContentType::Template)
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject.is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        if self.to.is_empty() {
            return Err(ValidationError::EmptyRecipients);
        }

        let body = match self.content_type {
            MailContentType::Text => &self.content,
            MailContentType::Html => &self.html_content,
            MailContentType::Template => &self.template,
        };
        if body.is_empty() && self.attachments.is_empty() {
            return Err(ValidationError::EmptyBody);
        }

        Ok(())
    }
}
