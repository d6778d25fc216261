use std::path::PathBuf;

use askama::Template;
use minijinja::Environment;
use serde_json::{Map, Value};

/// Name of the built-in template used for plain text and HTML mails.
pub const DEFAULT_TEMPLATE: &str = "email/default";

pub const TEXT_KEY: &str = "text";
pub const HTML_KEY: &str = "html";

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Default(#[from] askama::Error),
    #[error(transparent)]
    Runtime(#[from] minijinja::Error),
}

/// Renders a named template with a set of variables into the mail body.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, variables: &Map<String, Value>)
        -> Result<String, TemplateError>;
}

#[derive(Template)]
#[template(path = "email/default.html")]
struct DefaultMail<'a> {
    text: Option<&'a str>,
    html: Option<&'a str>,
}

/// The built-in default template plus any templates found under a template directory.
pub struct MailTemplates {
    environment: Environment<'static>,
}

impl MailTemplates {
    pub fn new() -> Self {
        Self {
            environment: Environment::new(),
        }
    }

    /// Templates other than [`DEFAULT_TEMPLATE`] are read from `dir` on first use.
    ///
    /// Names are resolved below `dir` only: absolute names and `..` segments are not found.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let mut environment = Environment::new();
        environment.set_loader(minijinja::path_loader(dir.into()));

        Self { environment }
    }

    pub fn add_template(
        &mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<(), TemplateError> {
        self.environment
            .add_template_owned(name.into(), source.into())?;
        Ok(())
    }
}

impl Default for MailTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for MailTemplates {
    fn render(
        &self,
        name: &str,
        variables: &Map<String, Value>,
    ) -> Result<String, TemplateError> {
        if name == DEFAULT_TEMPLATE {
            let rendered = DefaultMail {
                text: variables.get(TEXT_KEY).and_then(Value::as_str),
                html: variables.get(HTML_KEY).and_then(Value::as_str),
            }
            .render()?;
            return Ok(rendered);
        }

        let template = self
            .environment
            .get_template(name)
            .inspect_err(|error| tracing::error!(?error, name, "failed to get template"))?;

        Ok(template.render(variables)?)
    }
}
