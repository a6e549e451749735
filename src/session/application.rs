//! The application-identity session

use std::collections::HashMap;

use aliri_clock::DurationSecs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinator::TokenCoordinator;
use crate::error::Error;
use crate::session::{self, Environment, Session, TOKEN_ROUTE};
use crate::tokens::{AccessToken, ClientId, ClientSecret, RefreshToken};

/// A session authenticated by an application's client credentials.
///
/// Applications have no refresh token: refreshing repeats the credentials
/// grant.
#[derive(Debug)]
pub(crate) struct ApplicationSession {
    http: reqwest::Client,
    environment: Environment,
    client_id: ClientId,
    client_secret: ClientSecret,
    coordinator: TokenCoordinator,
}

#[derive(Debug, Deserialize)]
struct ApplicationTokenResponse {
    access_token: AccessToken,
    expires_in: DurationSecs,
}

#[derive(Debug, Serialize)]
struct ClientCredentialsForm<'a> {
    client_id: &'a ClientId,
    client_secret: &'a ClientSecret,
    grant_type: &'static str,
    f: &'static str,
}

impl ApplicationSession {
    /// Obtains first credentials from the identity service and starts the
    /// session's coordinator.
    pub(crate) async fn connect(
        environment: Environment,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::new();
        let granted = request_credentials(&http, &environment, &client_id, &client_secret).await?;

        tracing::debug!(client_id = %client_id, "application credentials granted");

        let coordinator = TokenCoordinator::spawn(
            granted.access_token,
            RefreshToken::new(""),
            granted.expires_in,
        );

        Ok(Self {
            http,
            environment,
            client_id,
            client_secret,
            coordinator,
        })
    }
}

async fn request_credentials(
    http: &reqwest::Client,
    environment: &Environment,
    client_id: &ClientId,
    client_secret: &ClientSecret,
) -> Result<ApplicationTokenResponse, Error> {
    let form = ClientCredentialsForm {
        client_id,
        client_secret,
        grant_type: "client_credentials",
        f: "json",
    };

    session::identity_post(http, environment, TOKEN_ROUTE, &form).await
}

#[async_trait]
impl Session for ApplicationSession {
    fn coordinator(&self) -> &TokenCoordinator {
        &self.coordinator
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<(), Error> {
        let granted = request_credentials(
            &self.http,
            &self.environment,
            &self.client_id,
            &self.client_secret,
        )
        .await?;

        self.coordinator.set_token_lifetime(granted.expires_in);
        self.coordinator.set_access_token(granted.access_token);

        Ok(())
    }

    fn info(&self) -> HashMap<String, String> {
        HashMap::from([
            ("access_token".to_owned(), self.coordinator.access_token()),
            ("client_id".to_owned(), self.client_id.as_str().to_owned()),
            (
                "client_secret".to_owned(),
                self.client_secret.as_str().to_owned(),
            ),
        ])
    }
}
