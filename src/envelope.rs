//! The HTTP envelope shared by the identity and geotrigger services
//!
//! Both services speak JSON over POST and report failures inside a 200
//! response through an error envelope. The [`post`] primitive handles the
//! status check, envelope detection, and the single transparent
//! refresh-and-retry that the invalid-token code triggers; callers supply
//! the headers and a refresh hook that knows how to obtain a new token.

use std::future::Future;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::Error;

/// The error code the geotrigger service uses to report an invalid or
/// expired access token.
pub(crate) const INVALID_TOKEN_CODE: i64 = 498;

pub(crate) const CLIENT_NAME: &str = "geotrigger-rs";
pub(crate) const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ServerError,
}

#[derive(Debug, Default, Deserialize)]
struct ServerError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Looks for a server error envelope in a 200 response body.
///
/// Detection keys on a non-empty `error.message` only; the code may be
/// absent. Bodies that do not parse as an envelope at all (a top-level
/// array, for one) are valid responses, not errors.
fn error_check(body: &[u8]) -> Option<ServerError> {
    let envelope: ErrorEnvelope = serde_json::from_slice(body).ok()?;
    (!envelope.error.message.is_empty()).then_some(envelope.error)
}

/// Headers for an identity-service POST.
pub(crate) fn identity_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers
}

/// Headers for a geotrigger-service POST carrying `access_token`.
pub(crate) fn service_headers(access_token: &str, path: &str) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("X-GT-Client-Name", HeaderValue::from_static(CLIENT_NAME));
    headers.insert(
        "X-GT-Client-Version",
        HeaderValue::from_static(CLIENT_VERSION),
    );
    headers.insert(AUTHORIZATION, bearer(access_token, path)?);
    Ok(headers)
}

fn bearer(token: &str, path: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|source| Error::Encode {
        route: path.to_owned(),
        source: Box::new(source),
    })
}

/// Joins a base URL and a route, inserting the slash when the route lacks
/// one.
pub(crate) fn join_route(base: &Url, route: &str) -> Result<Url, Error> {
    let mut target = base.as_str().trim_end_matches('/').to_owned();
    if !route.starts_with('/') {
        target.push('/');
    }
    target.push_str(route);

    Url::parse(&target).map_err(|source| Error::Encode {
        route: route.to_owned(),
        source: Box::new(source),
    })
}

/// POSTs `body` to `url` and unmarshals the response into `T`.
///
/// A 200 carrying an error envelope with the invalid-token code invokes
/// `refresh` and re-issues the request exactly once with the returned
/// bearer token; an envelope on the retry, invalid-token or otherwise, is
/// surfaced as [`Error::Service`]. The identity-service caller passes a
/// hook that fails outright, which turns an invalid-token report from that
/// service into a hard error.
pub(crate) async fn post<T, F, Fut>(
    http: &reqwest::Client,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    refresh: F,
) -> Result<T, Error>
where
    T: DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, Error>>,
{
    let path = url.path().to_owned();
    let first = send(http, url.clone(), headers.clone(), body.clone(), &path).await?;

    let contents = match error_check(&first) {
        None => first,
        Some(error) if error.code == INVALID_TOKEN_CODE => {
            tracing::debug!(%path, "invalid token reported; refreshing and retrying once");
            let token = refresh().await?;

            let mut headers = headers;
            headers.insert(AUTHORIZATION, bearer(&token, &path)?);
            let second = send(http, url, headers, body, &path).await?;

            match error_check(&second) {
                None => second,
                Some(error) => {
                    return Err(Error::Service {
                        path,
                        code: error.code,
                        message: error.message,
                    })
                }
            }
        }
        Some(error) => {
            return Err(Error::Service {
                path,
                code: error.code,
                message: error.message,
            })
        }
    };

    parse_response(&contents)
}

async fn send(
    http: &reqwest::Client,
    url: Url,
    headers: HeaderMap,
    body: Vec<u8>,
    path: &str,
) -> Result<Vec<u8>, Error> {
    let response = http
        .post(url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|source| Error::Transport {
            path: path.to_owned(),
            source,
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Status {
            status: status.as_u16(),
            path: path.to_owned(),
        });
    }

    let contents = response.bytes().await.map_err(|source| Error::Transport {
        path: path.to_owned(),
        source,
    })?;

    Ok(contents.to_vec())
}

fn parse_response<T: DeserializeOwned>(contents: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(contents).map_err(|source| Error::Parse {
        body: String::from_utf8_lossy(contents).into_owned(),
        source,
    })
}
