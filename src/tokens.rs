use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! credential_str {
    ($(#[$meta:meta])* $name:ident) => {
        credential_str!(@base $(#[$meta])* $name);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"")?;
                f.write_str(&self.0)?;
                f.write_str("\"")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
    ($(#[$meta:meta])* $name:ident, hidden as $hidden:literal) => {
        credential_str!(@base $(#[$meta])* $name);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $hidden, "***"))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $hidden, "***"))
            }
        }
    };
    (@base $(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Constructs a new value from any string-like input.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrows the underlying string.
            ///
            /// Unlike [`Display`][fmt::Display], this reveals the raw value.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwraps the underlying string.
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

credential_str! {
    /// An application's OAuth2 client ID
    ClientId
}

credential_str! {
    /// An application's OAuth2 client secret
    ClientSecret, hidden as "CLIENT SECRET"
}

credential_str! {
    /// The identifier assigned to a device at registration
    DeviceId
}

credential_str! {
    /// A short-lived bearer credential presented to the geotrigger service
    AccessToken, hidden as "ACCESS TOKEN"
}

credential_str! {
    /// A longer-lived credential exchanged for a new access token
    ///
    /// Application sessions have no refresh token; the client credentials
    /// grant takes its place.
    RefreshToken, hidden as "REFRESH TOKEN"
}
