use thiserror::Error;

/// An error produced while talking to the geotrigger or identity services
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Request parameters could not be encoded into a request body
    #[error("error encoding request body for route {route}: {source}")]
    Encode {
        /// The route the request was destined for
        route: String,
        /// The underlying encoding failure
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The request could not be sent or its response could not be read
    #[error("error while posting to {path}: {source}")]
    Transport {
        /// The path of the request that failed
        path: String,
        /// The underlying transport failure
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status other than 200
    #[error("Received status code {status} from {path}")]
    Status {
        /// The HTTP status code received
        status: u16,
        /// The path of the request that failed
        path: String,
    },

    /// The server answered 200 with an error envelope in the body
    #[error("Error from {path}, code: {code}. Message: {message}")]
    Service {
        /// The path of the request that failed
        path: String,
        /// The error code reported by the server, zero when absent
        code: i64,
        /// The error message reported by the server
        message: String,
    },

    /// A 200 response body could not be unmarshalled into the caller's type
    #[error("error parsing response: {body}: {source}")]
    Parse {
        /// The raw response body
        body: String,
        /// The underlying deserialization failure
        #[source]
        source: serde_json::Error,
    },

    /// The identity service reported an expired token, which it never
    /// legitimately does
    #[error("expired token response from the identity service")]
    IdentityTokenExpired,

    /// A token refresh performed on behalf of a request failed
    #[error("error refreshing token before hitting route {route}: {source}")]
    Refresh {
        /// The route the request was destined for
        route: String,
        /// The failure reported by the refresh attempt
        #[source]
        source: Box<Error>,
    },

    /// The session's token coordinator has shut down
    #[error("token coordinator is no longer running")]
    CoordinatorClosed,

    /// A JSON object did not contain the requested key
    #[error("no value found for key: {key}")]
    MissingKey {
        /// The key that was looked up
        key: String,
    },

    /// A JSON array index was out of range
    #[error("index {index} is out of range for array of length {len}")]
    IndexOutOfRange {
        /// The index that was looked up
        index: usize,
        /// The length of the array
        len: usize,
    },

    /// A JSON value could not be converted into the requested type
    #[error("value at {context} does not match the requested type: {source}")]
    TypeMismatch {
        /// Where in the JSON tree the value was found
        context: String,
        /// The underlying conversion failure
        #[source]
        source: serde_json::Error,
    },
}
