use std::io::Read;

use anyhow::Context;
use mailsign::{
    config::get_configuration, domain::MailContent, email::MailClient, telemetry::get_subscriber,
};
use tracing_subscriber::util::SubscriberInitExt;

/// Send one mail described by a JSON document, read from the path given as
/// first argument or from stdin.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration().context("Failed to read configuration.")?;

    get_subscriber(&config.log_level, std::io::stderr).init();

    let raw = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read mail from {}", path))?,
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("Could not read mail from stdin")?;
            raw
        }
    };
    let mail: MailContent = serde_json::from_str(&raw).context("Invalid mail document")?;

    let client =
        MailClient::from_settings(&config.mail).context("Could not build the HTTP client")?;

    let delivery = client.send_mail(Some(&mail), None).await?;
    tracing::info!(?delivery, "mail dispatched");

    Ok(())
}
