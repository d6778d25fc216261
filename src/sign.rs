//! HMAC-SHA256 request signing.
//!
//! The signing string is a newline-terminated list of the request method, path,
//! canonical query, access key and date, followed by the canonical extra headers
//! when any are signed. The server rebuilds the same string byte for byte, so
//! every ordering rule below is part of the wire contract.

use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use url::Url;

// Create alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

pub const HEADER_ACCESS_KEY: &str = "X-HMAC-ACCESS-KEY";
pub const HEADER_SIGNATURE: &str = "X-HMAC-SIGNATURE";
pub const HEADER_DATE: &str = "Date";
pub const HEADER_ALGORITHM: &str = "X-HMAC-ALGORITHM";
pub const HEADER_SIGNED_HEADERS: &str = "X-HMAC-SIGNED-HEADERS";
pub const ALGORITHM: &str = "hmac-sha256";

/// `Mon,12 Mar 2021 01:42:18 GMT`. No space after the comma.
const DATE_FORMAT: &str = "%a,%d %b %Y %H:%M:%S GMT";
const PLACEHOLDER_ORIGIN: &str = "http://127.0.0.1";

/// Additional headers folded into the signature, in insertion order.
///
/// A `None` value is signed and sent as the empty string.
pub type ExtraHeaders = IndexMap<String, Option<String>>;

#[derive(thiserror::Error, Debug)]
pub enum SignError {
    #[error("malformed request uri `{uri}`: {source}")]
    UrlFormat {
        uri: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid signing key: {0}")]
    InvalidKey(#[from] hmac::digest::InvalidLength),
    #[error("signing algorithm {0} is unavailable")]
    CryptoUnavailable(&'static str),
    #[error("header `{0}` cannot be sent over HTTP")]
    InvalidHeader(String),
}

/// Headers produced by [`create_sign_header`], ready to be attached to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub access_key: String,
    pub signature: String,
    pub date: String,
    /// `;`-joined names of the extra headers, in the order the caller supplied them.
    pub signed_headers: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl SignedHeaders {
    pub fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    /// All headers as `(name, value)` pairs, fixed headers first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let fixed: [(&str, &str); 4] = [
            (HEADER_ACCESS_KEY, self.access_key.as_str()),
            (HEADER_SIGNATURE, self.signature.as_str()),
            (HEADER_DATE, self.date.as_str()),
            (HEADER_ALGORITHM, ALGORITHM),
        ];

        fixed
            .into_iter()
            .chain(
                self.signed_headers
                    .as_deref()
                    .map(|names| (HEADER_SIGNED_HEADERS, names)),
            )
            .chain(
                self.extra
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            )
    }

    /// Case-insensitive lookup, the way HTTP treats header names.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, SignError> {
        let mut headers = HeaderMap::new();
        for (name, value) in self.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SignError::InvalidHeader(name.to_owned()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| SignError::InvalidHeader(name.to_owned()))?;
            headers.insert(header_name, header_value);
        }

        Ok(headers)
    }
}

/// Sign a request to `uri` at the current instant.
pub fn create_sign_header(
    access_key: &str,
    secret: &Secret<String>,
    uri: &str,
    method: &str,
    extra_headers: Option<&ExtraHeaders>,
) -> Result<SignedHeaders, SignError> {
    create_sign_header_at(access_key, secret, uri, method, extra_headers, Utc::now())
}

/// Sign a request to `uri` as if it were issued at `now`.
pub fn create_sign_header_at(
    access_key: &str,
    secret: &Secret<String>,
    uri: &str,
    method: &str,
    extra_headers: Option<&ExtraHeaders>,
    now: DateTime<Utc>,
) -> Result<SignedHeaders, SignError> {
    let date = format_date(now);
    let (path, query) = split_uri(uri)?;

    let signing_string = signing_string(
        method,
        &path,
        query.as_deref(),
        access_key,
        &date,
        extra_headers,
    );
    let signature = sign(secret, &signing_string)?;

    let extra_headers = extra_headers.filter(|headers| !headers.is_empty());

    Ok(SignedHeaders {
        access_key: access_key.to_owned(),
        signature,
        date,
        signed_headers: extra_headers.map(|headers| {
            headers
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(";")
        }),
        extra: extra_headers
            .map(|headers| {
                headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub fn format_date(now: DateTime<Utc>) -> String {
    now.format(DATE_FORMAT).to_string()
}

/// Build the exact byte sequence that gets signed.
pub fn signing_string(
    method: &str,
    path: &str,
    query: Option<&str>,
    access_key: &str,
    date: &str,
    extra_headers: Option<&ExtraHeaders>,
) -> String {
    let mut signing_string = format!(
        "{}\n{}\n{}\n{}\n{}\n",
        method.to_uppercase(),
        path,
        canonical_query(query),
        access_key,
        date
    );

    let headers = canonical_headers(extra_headers);
    if !headers.is_empty() {
        signing_string.push_str(&headers);
        signing_string.push('\n');
    }

    signing_string
}

/// Sort query parameters by key and re-join them.
///
/// Pairs split on the first `=`; a repeated key keeps its last value and an
/// empty value is written as the bare key.
pub fn canonical_query(query: Option<&str>) -> String {
    let params: BTreeMap<&str, &str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|item| !item.is_empty())
        .map(|item| item.split_once('=').unwrap_or((item, "")))
        .collect();

    params
        .into_iter()
        .map(|(key, value)| {
            // TODO: confirm with the mail service; a verifier that writes `key=` here rejects us.
            if value.is_empty() {
                key.to_owned()
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// `name:value` lines sorted by header name.
pub fn canonical_headers(extra_headers: Option<&ExtraHeaders>) -> String {
    let Some(headers) = extra_headers else {
        return String::new();
    };

    let mut sorted: Vec<_> = headers.iter().collect();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));

    sorted
        .into_iter()
        .map(|(name, value)| format!("{}:{}", name, value.as_deref().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sign(secret: &Secret<String>, message: &str) -> Result<String, SignError> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())?;
    mac.update(message.as_bytes());

    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Returns the path and query of `uri` exactly as written, resolving bare paths
/// against a placeholder origin. The fragment is dropped and a bare origin has an
/// empty path.
fn split_uri(uri: &str) -> Result<(String, Option<String>), SignError> {
    let absolute = if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_owned()
    } else if uri.starts_with('/') {
        format!("{}{}", PLACEHOLDER_ORIGIN, uri)
    } else {
        format!("{}/{}", PLACEHOLDER_ORIGIN, uri)
    };

    Url::parse(&absolute).map_err(|source| SignError::UrlFormat {
        uri: uri.to_owned(),
        source,
    })?;

    let rest = absolute
        .split_once("://")
        .map_or(absolute.as_str(), |(_, rest)| rest);
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let path = rest.find('/').map_or("", |i| &rest[i..]);

    Ok((path.to_owned(), query.map(ToOwned::to_owned)))
}
