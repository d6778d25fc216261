use std::{sync::Arc, time::Duration};

use reqwest::{
    header::HeaderMap,
    multipart::{Form, Part},
    Client, RequestBuilder, StatusCode,
};
use secrecy::Secret;
use serde_json::{Map, Value};
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::{
    config::MailSettings,
    domain::{MailContent, MailContentType, ValidationError},
    sign::{self, SignError},
    template::{MailTemplates, TemplateRenderer, DEFAULT_TEMPLATE, HTML_KEY, TEXT_KEY},
};

/// Every attachment is declared as PNG, whatever the file actually contains.
const ATTACHMENT_MIME: &str = "image/png";

/// Where mails are posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailEndpoints {
    /// One endpoint for every mail. Attachments are not sent.
    Single { url: String },
    /// JSON mails go to `text_url`, mails with attachments are posted as multipart to `file_url`.
    Split { text_url: String, file_url: String },
}

/// What happened to a mail that passed validation and was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The mail service answered, possibly with an error status.
    Sent { email_no: Uuid, status: StatusCode },
    /// The request never got an answer. Already logged.
    Failed { email_no: Uuid },
}

impl Delivery {
    pub fn email_no(&self) -> Uuid {
        match self {
            Self::Sent { email_no, .. } | Self::Failed { email_no } => *email_no,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MailError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dispatch(#[from] anyhow::Error),
}

/// Transport failures after the request was signed. These are logged, never returned.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("failed to send mail request")]
    Request(#[source] reqwest::Error),
    #[error("failed to read mail service response")]
    Response(#[source] reqwest::Error),
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct TextMailRequest<'a> {
    email_no: Uuid,
    to_address: &'a [String],
    subject: &'a str,
    content: &'a str,
    is_html: bool,
}

#[derive(Clone)]
pub struct MailClient {
    http_client: Client,
    endpoints: MailEndpoints,
    app_key: String,
    app_secret: Secret<String>,
    templates: Arc<dyn TemplateRenderer>,
}

/// Connect timeout bounds the handshake, `timeout` the whole exchange including reads and writes.
pub fn build_http_client(
    connect_timeout: Duration,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        .build()
}

impl MailClient {
    pub fn new(
        http_client: Client,
        endpoints: MailEndpoints,
        app_key: String,
        app_secret: Secret<String>,
        templates: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            http_client,
            endpoints,
            app_key,
            app_secret,
            templates,
        }
    }

    pub fn from_settings(settings: &MailSettings) -> Result<Self, reqwest::Error> {
        let templates = match &settings.template_dir {
            Some(dir) => MailTemplates::from_dir(dir),
            None => MailTemplates::new(),
        };

        Ok(Self::new(
            build_http_client(settings.connect_timeout(), settings.timeout())?,
            settings.endpoints(),
            settings.app_key.clone(),
            settings.app_secret.clone(),
            Arc::new(templates),
        ))
    }

    /// Validate, render, sign and post a mail.
    ///
    /// Validation, rendering and signing errors are returned. Once the signed request
    /// is issued the call succeeds: transport failures are logged and reported as
    /// [`Delivery::Failed`]. Events are recorded under `logger` when one is given.
    pub async fn send_mail(
        &self,
        content: Option<&MailContent>,
        logger: Option<&Span>,
    ) -> Result<Delivery, MailError> {
        let subject = content.map(|c| c.subject.as_str());
        let recipients = content.map_or(0, |c| c.to.len());
        let span = match logger {
            Some(parent) => {
                tracing::info_span!(parent: parent, "send_mail", ?subject, recipients)
            }
            None => tracing::info_span!("send_mail", ?subject, recipients),
        };

        async {
            let result = self.dispatch(content).await;
            if let Err(error) = &result {
                tracing::error!(%error, "failed to send mail");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, content: Option<&MailContent>) -> Result<Delivery, MailError> {
        let content = content.ok_or(ValidationError::EmptyContent)?;
        content.validate()?;

        let body = self.render(content)?;

        match &self.endpoints {
            MailEndpoints::Split { file_url, .. } if !content.attachments.is_empty() => {
                Ok(self.send_file_mail(file_url, content, &body).await?)
            }
            MailEndpoints::Split { text_url: url, .. } | MailEndpoints::Single { url } => {
                if !content.attachments.is_empty() {
                    tracing::warn!(
                        attachments = content.attachments.len(),
                        "single endpoint configured, attachments are dropped"
                    );
                }
                Ok(self.send_text_mail(url, content, &body).await?)
            }
        }
    }

    fn render(&self, content: &MailContent) -> anyhow::Result<String> {
        let mut variables = Map::new();
        let template = match content.content_type {
            MailContentType::Text => {
                variables.insert(TEXT_KEY.to_owned(), Value::String(content.content.clone()));
                DEFAULT_TEMPLATE
            }
            MailContentType::Html => {
                variables.insert(
                    HTML_KEY.to_owned(),
                    Value::String(content.html_content.clone()),
                );
                DEFAULT_TEMPLATE
            }
            MailContentType::Template => {
                variables.clone_from(&content.template_variables);
                if content.template.is_empty() {
                    DEFAULT_TEMPLATE
                } else {
                    content.template.as_str()
                }
            }
        };

        tracing::debug!(template, content_type = %content.content_type, "rendering mail body");
        Ok(self.templates.render(template, &variables)?)
    }

    fn sign(&self, url: &str) -> Result<HeaderMap, SignError> {
        sign::create_sign_header(&self.app_key, &self.app_secret, url, "POST", None)?
            .to_header_map()
    }

    async fn send_text_mail(
        &self,
        url: &str,
        content: &MailContent,
        body: &str,
    ) -> anyhow::Result<Delivery> {
        let headers = self.sign(url)?;
        let email_no = Uuid::new_v4();

        let request = self
            .http_client
            .post(url)
            .headers(headers)
            .json(&TextMailRequest {
                email_no,
                to_address: &content.to,
                subject: &content.subject,
                content: body,
                is_html: true,
            });

        Ok(self.deliver(email_no, request).await)
    }

    async fn send_file_mail(
        &self,
        url: &str,
        content: &MailContent,
        body: &str,
    ) -> anyhow::Result<Delivery> {
        let headers = self.sign(url)?;
        let email_no = Uuid::new_v4();

        let mut form = Form::new()
            .text("emailNo", email_no.to_string())
            .text("subject", content.subject.clone())
            .text("content", body.to_owned())
            .text("isHtml", "true");
        for address in &content.to {
            form = form.text("toAddress", address.clone());
        }

        for attachment in &content.attachments {
            let Some(path) = &attachment.file else {
                tracing::error!(
                    file_name = %attachment.file_name,
                    "attachment has no file, skipping"
                );
                continue;
            };

            let bytes = tokio::fs::read(path).await.map_err(|e| {
                anyhow::anyhow!("failed to read attachment {}: {}", path.display(), e)
            })?;
            let part = Part::bytes(bytes)
                .file_name(attachment.file_name.clone())
                .mime_str(ATTACHMENT_MIME)?;
            form = form.part("fileList", part);
        }

        let request = self.http_client.post(url).headers(headers).multipart(form);

        Ok(self.deliver(email_no, request).await)
    }

    async fn deliver(&self, email_no: Uuid, request: RequestBuilder) -> Delivery {
        match execute(request).await {
            Ok((status, body)) => {
                if status.is_success() {
                    tracing::info!(%email_no, %status, %body, "email send result");
                } else {
                    tracing::warn!(%email_no, %status, %body, "mail service rejected the mail");
                }
                Delivery::Sent { email_no, status }
            }
            Err(error) => {
                tracing::error!(%email_no, error = ?error, "failed to deliver mail");
                Delivery::Failed { email_no }
            }
        }
    }
}

async fn execute(request: RequestBuilder) -> Result<(StatusCode, String), DeliveryError> {
    let response = request.send().await.map_err(DeliveryError::Request)?;
    let status = response.status();
    let body = response.text().await.map_err(DeliveryError::Response)?;

    Ok((status, body))
}
