use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use secrecy::Secret;

use crate::email::MailEndpoints;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub log_level: String,
    pub mail: MailSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct MailSettings {
    pub app_key: String,
    pub app_secret: Secret<String>,
    /// Endpoint for mails without attachments. Also accepted as `url` when it is the only endpoint.
    #[serde(alias = "url")]
    pub text_url: String,
    pub file_url: Option<String>,
    pub template_dir: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl MailSettings {
    pub fn endpoints(&self) -> MailEndpoints {
        match &self.file_url {
            Some(file_url) => MailEndpoints::Split {
                text_url: self.text_url.clone(),
                file_url: file_url.clone(),
            },
            None => MailEndpoints::Single {
                url: self.text_url.clone(),
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The possible runtime environment for our application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

/// Read `configuration/` under the working directory, for the environment named by
/// `APP_ENVIRONMENT` (`local` when unset).
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path =
        std::env::current_dir().map_err(|e| config::ConfigError::Foreign(Box::new(e)))?;

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    load_configuration(&base_path.join("configuration"), environment)
}

/// Layer `base.yaml`, `<environment>.yaml` and `APP_`-prefixed environment variables,
/// e.g. `APP_MAIL__APP_SECRET`.
pub fn load_configuration(
    configuration_directory: &Path,
    environment: Environment,
) -> Result<Settings, config::ConfigError> {
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(
            config::File::from(configuration_directory.join(environment_filename)).required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
