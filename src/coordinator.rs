//! The token-lifecycle coordinator
//!
//! Each session owns exactly one coordinator: a background task that
//! serialises every use of the session's access token and every refresh of
//! it. Callers never lock the token state; they send a [`TokenRequest`]
//! down the coordinator's channel and await the reply. The coordinator
//! guarantees that at most one refresh is in flight per session, parks
//! requests that arrive while one is, and resumes them all once the refresh
//! resolves.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;
use crate::tokens::{AccessToken, RefreshToken};

/// Seconds subtracted from a token's lifetime when computing its expiry.
///
/// A token is treated as expired this long before the server would actually
/// reject it, so a request started just under the wire still carries a
/// token the service will accept.
pub(crate) const EXPIRY_MARGIN: DurationSecs = DurationSecs(60);

/// Why a caller is approaching the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Purpose {
    /// The caller wants to present the access token to the service.
    AccessNeeded,
    /// The caller was told its token is invalid and wants to refresh.
    RefreshNeeded,
    /// The caller holding the refresh authorisation succeeded.
    RefreshComplete,
    /// The caller holding the refresh authorisation failed.
    RefreshFailed,
}

/// A request travelling on the coordinator's inbound channel.
///
/// The reply slot is absent for the two completion purposes.
#[derive(Debug)]
struct TokenRequest {
    purpose: Purpose,
    reply: Option<oneshot::Sender<TokenResponse>>,
}

/// The coordinator's answer to an [`AccessNeeded`][Purpose::AccessNeeded]
/// or [`RefreshNeeded`][Purpose::RefreshNeeded] request.
#[derive(Debug)]
pub(crate) struct TokenResponse {
    /// The token being handed over.
    pub(crate) token: String,
    /// When `true`, present `token` as the bearer token. When `false`, the
    /// caller has been authorised to refresh using `token` as the refresh
    /// token (an empty string means the credentials grant).
    pub(crate) is_access_token: bool,
}

#[derive(Debug)]
struct Tokens {
    access_token: AccessToken,
    refresh_token: RefreshToken,
    expires_at: UnixTime,
}

#[derive(Debug)]
struct TokenStore {
    tokens: RwLock<Tokens>,
}

impl TokenStore {
    fn access_token(&self) -> String {
        self.read().access_token.as_str().to_owned()
    }

    fn refresh_token(&self) -> String {
        self.read().refresh_token.as_str().to_owned()
    }

    fn expires_at(&self) -> UnixTime {
        self.read().expires_at
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tokens> {
        self.tokens.read().expect("token store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tokens> {
        self.tokens.write().expect("token store lock poisoned")
    }
}

/// Handle to a session's coordinator task.
///
/// Cloning the handle is cheap; every clone talks to the same task. The
/// task ends once all handles have been dropped.
#[derive(Clone, Debug)]
pub(crate) struct TokenCoordinator {
    requests: mpsc::UnboundedSender<TokenRequest>,
    store: Arc<TokenStore>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl TokenCoordinator {
    /// Spawns a coordinator task seeded with the given tokens.
    ///
    /// `lifetime` is the `expires_in` reported alongside the access token;
    /// the expiry instant is computed against the system clock.
    pub(crate) fn spawn(
        access_token: AccessToken,
        refresh_token: RefreshToken,
        lifetime: DurationSecs,
    ) -> Self {
        Self::spawn_with_clock(access_token, refresh_token, lifetime, System)
    }

    /// Spawns a coordinator task measuring expiry against the given clock.
    pub(crate) fn spawn_with_clock<C>(
        access_token: AccessToken,
        refresh_token: RefreshToken,
        lifetime: DurationSecs,
        clock: C,
    ) -> Self
    where
        C: Clock + Send + Sync + 'static,
    {
        let clock: Arc<dyn Clock + Send + Sync> = Arc::new(clock);
        let store = Arc::new(TokenStore {
            tokens: RwLock::new(Tokens {
                access_token,
                refresh_token,
                expires_at: expiry_after(clock.now(), lifetime),
            }),
        });

        let (requests, inbound) = mpsc::unbounded_channel();
        tokio::spawn(run(inbound, Arc::clone(&store), Arc::clone(&clock)));

        Self {
            requests,
            store,
            clock,
        }
    }

    /// Sends a need-request and awaits the coordinator's reply.
    pub(crate) async fn request(&self, purpose: Purpose) -> Result<TokenResponse, Error> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(TokenRequest {
                purpose,
                reply: Some(reply),
            })
            .map_err(|_| Error::CoordinatorClosed)?;

        response.await.map_err(|_| Error::CoordinatorClosed)
    }

    /// Sends a completion event without waiting for anything back.
    pub(crate) fn submit(&self, purpose: Purpose) {
        if self
            .requests
            .send(TokenRequest {
                purpose,
                reply: None,
            })
            .is_err()
        {
            tracing::debug!(?purpose, "coordinator has shut down; dropping completion event");
        }
    }

    /// Snapshot of the current access token.
    pub(crate) fn access_token(&self) -> String {
        self.store.access_token()
    }

    /// Snapshot of the current refresh token.
    pub(crate) fn refresh_token(&self) -> String {
        self.store.refresh_token()
    }

    /// Replaces the access token.
    ///
    /// Only the task currently holding a refresh authorisation may call
    /// this, and only before it submits
    /// [`RefreshComplete`][Purpose::RefreshComplete].
    pub(crate) fn set_access_token(&self, token: AccessToken) {
        self.store.write().access_token = token;
    }

    /// Restarts the expiry window from a freshly reported lifetime.
    ///
    /// Subject to the same calling rules as
    /// [`set_access_token`][Self::set_access_token].
    pub(crate) fn set_token_lifetime(&self, lifetime: DurationSecs) {
        self.store.write().expires_at = expiry_after(self.clock.now(), lifetime);
    }
}

fn expiry_after(now: UnixTime, lifetime: DurationSecs) -> UnixTime {
    UnixTime((now + lifetime).0.saturating_sub(EXPIRY_MARGIN.0))
}

/// The coordinator event loop.
///
/// `refresh_in_progress` and the waiter queue are locals here: only this
/// task observes or mutates them. Completion events are matched ahead of
/// everything else so a refresh outcome is never parked behind the queue.
async fn run(
    mut inbound: mpsc::UnboundedReceiver<TokenRequest>,
    store: Arc<TokenStore>,
    clock: Arc<dyn Clock + Send + Sync>,
) {
    let mut waiters: VecDeque<TokenRequest> = VecDeque::new();
    let mut refresh_in_progress = false;

    while let Some(request) = inbound.recv().await {
        match request.purpose {
            Purpose::RefreshFailed => match waiters.pop_front() {
                Some(next) if next.purpose == Purpose::RefreshNeeded => {
                    tracing::debug!("refresh failed; promoting the next waiter to refresh");
                    answer(next, store.refresh_token(), false);
                }
                Some(next) => {
                    refresh_in_progress = false;
                    answer(next, store.access_token(), true);
                }
                None => {
                    tracing::warn!("refresh failed with no waiters queued");
                    refresh_in_progress = false;
                }
            },
            Purpose::RefreshComplete => {
                if !refresh_in_progress {
                    tracing::warn!("refresh completed while none was believed to be in flight");
                }
                refresh_in_progress = false;

                let access_token = store.access_token();
                for waiter in waiters.drain(..) {
                    answer(waiter, access_token.clone(), true);
                }
            }
            _ if refresh_in_progress => waiters.push_back(request),
            Purpose::RefreshNeeded => {
                refresh_in_progress = true;
                answer(request, store.refresh_token(), false);
            }
            Purpose::AccessNeeded => {
                if clock.now() >= store.expires_at() {
                    tracing::debug!("access token expired; granting a refresh instead");
                    refresh_in_progress = true;
                    answer(request, store.refresh_token(), false);
                } else {
                    answer(request, store.access_token(), true);
                }
            }
        }
    }

    tracing::debug!("all coordinator handles dropped; shutting down");
}

fn answer(request: TokenRequest, token: String, is_access_token: bool) {
    let Some(reply) = request.reply else { return };
    if reply
        .send(TokenResponse {
            token,
            is_access_token,
        })
        .is_err()
    {
        tracing::debug!("token requester dropped its reply channel");
    }
}
