//! Client library for the ArcGIS Geotrigger Service
//!
//! The Geotrigger Service is a cloud based system of geofencing and push
//! notifications. This library hides its OAuth2-style credential handling
//! entirely: build a [`Client`] as an application or a device, then issue
//! route-qualified JSON requests. The client attaches a bearer access
//! token to every request, and when the service reports the token invalid
//! or finds it expired, it refreshes credentials and retries. No matter
//! how many requests are in flight, at most one refresh runs at a time,
//! and requests that arrive while one is running are never starved.
//!
//! Every session owns a coordinator task that serialises token use and
//! refresh across concurrent requests. Requests that arrive while a
//! refresh is in flight are parked and resumed with the new access token;
//! if a refresh fails, exactly one caller sees the error and the next
//! waiter in line retries.
//!
//! # Application identity
//!
//! Applications authenticate with the client credentials grant:
//!
//! ```no_run
//! use geotrigger::Client;
//!
//! # async fn example() -> Result<(), geotrigger::Error> {
//! let client = Client::new_application("client-id", "client-secret").await?;
//!
//! let triggers: serde_json::Value = client
//!     .request("/trigger/list", &serde_json::json!({"tags": ["demo"]}))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Device identity
//!
//! Devices register themselves once and thereafter refresh with their
//! refresh token. A device can also be inflated from tokens obtained
//! elsewhere, such as a mobile install being debugged:
//!
//! ```no_run
//! use geotrigger::Client;
//!
//! # async fn example() -> Result<(), geotrigger::Error> {
//! let client = Client::new_device("client-id").await?;
//! println!("registered as {}", client.info()["device_id"]);
//!
//! let existing = Client::existing_device(
//!     "client-id",
//!     "device-id",
//!     "access-token",
//!     1800,
//!     "refresh-token",
//! );
//! # Ok(())
//! # }
//! ```
//!
//! Responses deserialize into any [`serde::Deserialize`] type; for
//! free-form responses, request a [`serde_json::Value`] and walk it with
//! the [`json`] helpers.

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]

mod client;
mod coordinator;
mod envelope;
mod error;
pub mod json;
mod session;
mod tokens;

pub use client::{Client, ClientBuilder};
pub use error::Error;
pub use reqwest::Url;
pub use tokens::{AccessToken, ClientId, ClientSecret, DeviceId, RefreshToken};
