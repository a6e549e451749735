//! The public client facade

use std::collections::HashMap;
use std::sync::Arc;

use aliri_clock::DurationSecs;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::session::application::ApplicationSession;
use crate::session::device::DeviceSession;
use crate::session::{self, Environment, Session};
use crate::tokens::{AccessToken, ClientId, ClientSecret, DeviceId, RefreshToken};

/// A client for the Geotrigger Service.
///
/// A client wraps one session, either an application identity or a device
/// identity, and manages its credentials for the lifetime of the session:
/// requests transparently carry a bearer token, and expired or rejected
/// tokens are refreshed and retried without the caller's involvement.
///
/// Cloning is cheap and every clone shares the same session, so one client
/// can serve any number of concurrent tasks.
#[derive(Clone, Debug)]
pub struct Client {
    session: Arc<dyn Session>,
}

impl Client {
    /// Starts configuring a client against non-production endpoints.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Registers a new application session from its client credentials.
    ///
    /// # Errors
    ///
    /// Fails when the identity service rejects the credentials or cannot
    /// be reached.
    pub async fn new_application(
        client_id: impl Into<ClientId>,
        client_secret: impl Into<ClientSecret>,
    ) -> Result<Self, Error> {
        Self::builder().application(client_id, client_secret).await
    }

    /// Registers a new device session for the given client ID.
    ///
    /// # Errors
    ///
    /// Fails when the identity service rejects the registration or cannot
    /// be reached.
    pub async fn new_device(client_id: impl Into<ClientId>) -> Result<Self, Error> {
        Self::builder().device(client_id).await
    }

    /// Inflates a device session from credentials obtained elsewhere,
    /// bypassing registration.
    ///
    /// Provided primarily as a way of debugging an active mobile install.
    /// `expires_in` is the remaining token lifetime in seconds. Must be
    /// called from within a Tokio runtime.
    pub fn existing_device(
        client_id: impl Into<ClientId>,
        device_id: impl Into<DeviceId>,
        access_token: impl Into<AccessToken>,
        expires_in: u64,
        refresh_token: impl Into<RefreshToken>,
    ) -> Self {
        Self::builder().existing_device(
            client_id,
            device_id,
            access_token,
            expires_in,
            refresh_token,
        )
    }

    /// POSTs `params` to a route of the geotrigger service.
    ///
    /// `T` can be a struct modelling the expected response, or
    /// [`serde_json::Value`] for responses best navigated with the
    /// [`json`][crate::json] helpers. A leading slash on `route` is
    /// optional.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-200 statuses, server-reported
    /// errors, and responses that do not deserialize into `T`. An
    /// invalid-token report is not an error unless it repeats after the
    /// transparent refresh-and-retry.
    pub async fn request<T, P>(&self, route: &str, params: &P) -> Result<T, Error>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        session::request(self.session.as_ref(), route, params).await
    }

    /// Snapshot of the current session's credentials.
    ///
    /// Application sessions carry the keys `access_token`, `client_id`,
    /// and `client_secret`; device sessions carry `access_token`,
    /// `refresh_token`, `device_id`, and `client_id`.
    pub fn info(&self) -> HashMap<String, String> {
        self.session.info()
    }
}

/// Configures the endpoints a [`Client`] talks to before constructing it.
///
/// The defaults are the production endpoints; overriding them is useful
/// for on-premises deployments and tests.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    environment: Environment,
}

impl ClientBuilder {
    /// Overrides the geotrigger service base URL.
    pub fn geotrigger_url(mut self, url: Url) -> Self {
        self.environment.geotrigger_url = url;
        self
    }

    /// Overrides the identity service base URL.
    pub fn identity_url(mut self, url: Url) -> Self {
        self.environment.identity_url = url;
        self
    }

    /// Registers a new application session from its client credentials.
    ///
    /// # Errors
    ///
    /// Fails when the identity service rejects the credentials or cannot
    /// be reached.
    pub async fn application(
        self,
        client_id: impl Into<ClientId>,
        client_secret: impl Into<ClientSecret>,
    ) -> Result<Client, Error> {
        let session =
            ApplicationSession::connect(self.environment, client_id.into(), client_secret.into())
                .await?;

        Ok(Client {
            session: Arc::new(session),
        })
    }

    /// Registers a new device session for the given client ID.
    ///
    /// # Errors
    ///
    /// Fails when the identity service rejects the registration or cannot
    /// be reached.
    pub async fn device(self, client_id: impl Into<ClientId>) -> Result<Client, Error> {
        let session = DeviceSession::register(self.environment, client_id.into()).await?;

        Ok(Client {
            session: Arc::new(session),
        })
    }

    /// Inflates a device session from credentials obtained elsewhere.
    ///
    /// See [`Client::existing_device`].
    pub fn existing_device(
        self,
        client_id: impl Into<ClientId>,
        device_id: impl Into<DeviceId>,
        access_token: impl Into<AccessToken>,
        expires_in: u64,
        refresh_token: impl Into<RefreshToken>,
    ) -> Client {
        let session = DeviceSession::from_existing(
            self.environment,
            client_id.into(),
            device_id.into(),
            access_token.into(),
            DurationSecs(expires_in),
            refresh_token.into(),
        );

        Client {
            session: Arc::new(session),
        }
    }
}
