//! The device-identity session

use std::collections::HashMap;

use aliri_clock::DurationSecs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::coordinator::TokenCoordinator;
use crate::error::Error;
use crate::session::{self, Environment, Session, REGISTER_ROUTE, TOKEN_ROUTE};
use crate::tokens::{AccessToken, ClientId, DeviceId, RefreshToken};

/// A session authenticated as a registered device.
#[derive(Debug)]
pub(crate) struct DeviceSession {
    http: reqwest::Client,
    environment: Environment,
    client_id: ClientId,
    device_id: DeviceId,
    coordinator: TokenCoordinator,
}

#[derive(Debug, Deserialize)]
struct DeviceRegisterResponse {
    device: RegisteredDevice,
    #[serde(rename = "deviceToken")]
    device_token: DeviceToken,
}

#[derive(Debug, Deserialize)]
struct RegisteredDevice {
    #[serde(rename = "deviceId")]
    device_id: DeviceId,
}

#[derive(Debug, Deserialize)]
struct DeviceToken {
    access_token: AccessToken,
    refresh_token: RefreshToken,
    expires_in: DurationSecs,
}

#[derive(Debug, Deserialize)]
struct DeviceRefreshResponse {
    access_token: AccessToken,
    expires_in: DurationSecs,
}

#[derive(Debug, Serialize)]
struct RegisterForm<'a> {
    client_id: &'a ClientId,
    f: &'static str,
}

#[derive(Debug, Serialize)]
struct RefreshForm<'a> {
    client_id: &'a ClientId,
    f: &'static str,
    grant_type: &'static str,
    refresh_token: &'a str,
}

impl DeviceSession {
    /// Registers a new device with the identity service and starts the
    /// session's coordinator.
    pub(crate) async fn register(
        environment: Environment,
        client_id: ClientId,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::new();
        let form = RegisterForm {
            client_id: &client_id,
            f: "json",
        };

        let registered: DeviceRegisterResponse =
            session::identity_post(&http, &environment, REGISTER_ROUTE, &form).await?;

        tracing::debug!(
            device_id = %registered.device.device_id,
            "device registered"
        );

        let coordinator = TokenCoordinator::spawn(
            registered.device_token.access_token,
            registered.device_token.refresh_token,
            registered.device_token.expires_in,
        );

        Ok(Self {
            http,
            environment,
            client_id,
            device_id: registered.device.device_id,
            coordinator,
        })
    }

    /// Inflates a session from tokens obtained elsewhere, bypassing
    /// registration.
    ///
    /// `expires_in` is a lifetime in seconds relative to now.
    pub(crate) fn from_existing(
        environment: Environment,
        client_id: ClientId,
        device_id: DeviceId,
        access_token: AccessToken,
        expires_in: DurationSecs,
        refresh_token: RefreshToken,
    ) -> Self {
        let coordinator = TokenCoordinator::spawn(access_token, refresh_token, expires_in);

        Self {
            http: reqwest::Client::new(),
            environment,
            client_id,
            device_id,
            coordinator,
        }
    }
}

#[async_trait]
impl Session for DeviceSession {
    fn coordinator(&self) -> &TokenCoordinator {
        &self.coordinator
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn refresh(&self, refresh_token: &str) -> Result<(), Error> {
        let form = RefreshForm {
            client_id: &self.client_id,
            f: "json",
            grant_type: "refresh_token",
            refresh_token,
        };

        let refreshed: DeviceRefreshResponse =
            session::identity_post(&self.http, &self.environment, TOKEN_ROUTE, &form).await?;

        self.coordinator.set_access_token(refreshed.access_token);
        self.coordinator.set_token_lifetime(refreshed.expires_in);

        Ok(())
    }

    fn info(&self) -> HashMap<String, String> {
        HashMap::from([
            ("access_token".to_owned(), self.coordinator.access_token()),
            ("refresh_token".to_owned(), self.coordinator.refresh_token()),
            ("device_id".to_owned(), self.device_id.as_str().to_owned()),
            ("client_id".to_owned(), self.client_id.as_str().to_owned()),
        ])
    }
}
