use std::{sync::Arc, time::Duration};

use chrono::{NaiveDateTime, TimeZone, Utc};
use mailsign::{
    email::{build_http_client, MailClient, MailEndpoints},
    sign,
    telemetry::get_subscriber,
    template::MailTemplates,
};
use once_cell::sync::Lazy;
use secrecy::Secret;
use tracing_subscriber::util::SubscriberInitExt;
use wiremock::{MockServer, Request};

pub const APP_KEY: &str = "test-app-key";
pub const APP_SECRET: &str = "test-app-secret";
pub const TEXT_PATH: &str = "/api/mail/text";
pub const FILE_PATH: &str = "/api/mail/file";

static TRACING: Lazy<()> = Lazy::new(|| {
    let env_filter = "mailsign=trace";

    if std::env::var("TEST_LOG").is_ok() {
        get_subscriber(env_filter, std::io::stdout).init();
    } else {
        get_subscriber(env_filter, std::io::sink).init();
    };
});

pub struct TestApp {
    pub mail_server: MockServer,
    pub client: MailClient,
}

impl TestApp {
    pub fn text_url(&self) -> String {
        format!("{}{}", self.mail_server.uri(), TEXT_PATH)
    }

    pub fn file_url(&self) -> String {
        format!("{}{}", self.mail_server.uri(), FILE_PATH)
    }

    pub async fn received_requests(&self) -> Vec<Request> {
        self.mail_server
            .received_requests()
            .await
            .expect("Request recording should be enabled.")
    }
}

pub async fn spawn_app() -> TestApp {
    let mail_server = MockServer::start().await;
    let endpoints = MailEndpoints::Split {
        text_url: format!("{}{}", mail_server.uri(), TEXT_PATH),
        file_url: format!("{}{}", mail_server.uri(), FILE_PATH),
    };

    TestApp {
        client: mail_client(endpoints, Duration::from_secs(60)),
        mail_server,
    }
}

pub fn mail_client(endpoints: MailEndpoints, timeout: Duration) -> MailClient {
    Lazy::force(&TRACING);

    MailClient::new(
        build_http_client(Duration::from_secs(30), timeout)
            .expect("The HTTP client should be built."),
        endpoints,
        APP_KEY.to_owned(),
        Secret::new(APP_SECRET.to_owned()),
        Arc::new(MailTemplates::new()),
    )
}

pub fn recipients() -> Vec<String> {
    vec!["ursula@example.com".to_owned(), "le.guin@example.com".to_owned()]
}

pub fn header<'a>(request: &'a Request, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .unwrap_or_else(|| panic!("The {} header should be present.", name))
        .to_str()
        .expect("The header should be ASCII.")
}

/// Recompute the signature the server would expect for `request`, using its own `Date` header.
pub fn expected_signature(request: &Request, url: &str) -> String {
    let date = NaiveDateTime::parse_from_str(header(request, "date"), "%a,%d %b %Y %H:%M:%S GMT")
        .expect("The Date header should use the signing format.");

    sign::create_sign_header_at(
        APP_KEY,
        &Secret::new(APP_SECRET.to_owned()),
        url,
        "POST",
        None,
        Utc.from_utc_datetime(&date),
    )
    .expect("The endpoint should be signable.")
    .signature
}
