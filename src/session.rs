//! Session variants and the request path they share
//!
//! A session pairs immutable credentials with the coordinator that owns
//! their tokens. The two variants differ only in how they obtain and
//! refresh credentials from the identity service; everything about
//! presenting tokens to the geotrigger service is shared here.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::coordinator::{Purpose, TokenCoordinator};
use crate::envelope;
use crate::error::Error;

pub(crate) mod application;
pub(crate) mod device;

pub(crate) const TOKEN_ROUTE: &str = "/sharing/oauth2/token";
pub(crate) const REGISTER_ROUTE: &str = "/sharing/oauth2/registerDevice";

const GEOTRIGGER_BASE_URL: &str = "https://geotrigger.arcgis.com";
const IDENTITY_BASE_URL: &str = "https://www.arcgis.com";

/// The pair of base URLs a session talks to.
#[derive(Clone, Debug)]
pub(crate) struct Environment {
    pub(crate) geotrigger_url: Url,
    pub(crate) identity_url: Url,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            geotrigger_url: Url::parse(GEOTRIGGER_BASE_URL).expect("valid default URL"),
            identity_url: Url::parse(IDENTITY_BASE_URL).expect("valid default URL"),
        }
    }
}

/// The capability set shared by application and device sessions.
#[async_trait]
pub(crate) trait Session: fmt::Debug + Send + Sync {
    fn coordinator(&self) -> &TokenCoordinator;

    fn environment(&self) -> &Environment;

    fn http(&self) -> &reqwest::Client;

    /// Exchanges credentials for a fresh access token and stores it.
    ///
    /// `refresh_token` is whatever the coordinator handed down with the
    /// refresh authorisation; application sessions receive the empty
    /// string and rerun the credentials grant instead.
    async fn refresh(&self, refresh_token: &str) -> Result<(), Error>;

    fn info(&self) -> HashMap<String, String>;
}

/// Issues a route-qualified request against the geotrigger service.
pub(crate) async fn request<T, P>(
    session: &dyn Session,
    route: &str,
    params: &P,
) -> Result<T, Error>
where
    T: DeserializeOwned,
    P: Serialize + ?Sized,
{
    let body = serde_json::to_vec(params).map_err(|source| Error::Encode {
        route: route.to_owned(),
        source: Box::new(source),
    })?;

    let token = acquire_access(session).await.map_err(|source| Error::Refresh {
        route: route.to_owned(),
        source: Box::new(source),
    })?;

    let url = envelope::join_route(&session.environment().geotrigger_url, route)?;
    let path = url.path().to_owned();
    let headers = envelope::service_headers(&token, &path)?;

    envelope::post(session.http(), url, headers, body, || refresh_hook(session)).await
}

/// Obtains a bearer token for a request that is about to cross the wire.
///
/// When the coordinator signals expiry instead of handing over the access
/// token, the caller refreshes immediately and uses the result.
async fn acquire_access(session: &dyn Session) -> Result<String, Error> {
    let response = session.coordinator().request(Purpose::AccessNeeded).await?;
    if response.is_access_token {
        Ok(response.token)
    } else {
        refresh_with(session, response.token).await
    }
}

/// The refresh hook handed to [`envelope::post`] for service requests.
///
/// Invoked when the service reports an invalid token. Another worker may
/// already have refreshed, in which case the coordinator answers with the
/// fresh access token and no second refresh happens.
async fn refresh_hook(session: &dyn Session) -> Result<String, Error> {
    let response = session.coordinator().request(Purpose::RefreshNeeded).await?;
    if response.is_access_token {
        Ok(response.token)
    } else {
        refresh_with(session, response.token).await
    }
}

/// Performs a granted refresh and reports the outcome to the coordinator.
///
/// Exactly one completion event is posted per authorisation; the token
/// store is updated by the session's `refresh` before `RefreshComplete`
/// goes out.
async fn refresh_with(session: &dyn Session, refresh_token: String) -> Result<String, Error> {
    match session.refresh(&refresh_token).await {
        Ok(()) => {
            let access_token = session.coordinator().access_token();
            session.coordinator().submit(Purpose::RefreshComplete);
            Ok(access_token)
        }
        Err(error) => {
            session.coordinator().submit(Purpose::RefreshFailed);
            Err(error)
        }
    }
}

/// POSTs a form payload to the identity service.
///
/// The refresh hook is a sentinel: the identity service never legitimately
/// reports the invalid-token code, so one from it is a hard failure.
#[tracing::instrument(skip(http, environment, form))]
pub(crate) async fn identity_post<T, P>(
    http: &reqwest::Client,
    environment: &Environment,
    route: &str,
    form: &P,
) -> Result<T, Error>
where
    T: DeserializeOwned,
    P: Serialize + ?Sized,
{
    let body = serde_urlencoded::to_string(form)
        .map_err(|source| Error::Encode {
            route: route.to_owned(),
            source: Box::new(source),
        })?
        .into_bytes();

    let url = envelope::join_route(&environment.identity_url, route)?;

    envelope::post(http, url, envelope::identity_headers(), body, || async {
        Err(Error::IdentityTokenExpired)
    })
    .await
}
