// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session manager: ground truth about who is signed in.
//!
//! One `SessionManager` exists per process, constructed once at startup and
//! shared by reference. It validates the credential against the portal,
//! holds the resulting [`SessionUser`], and arms the expiry coordinator
//! whenever a session becomes (or stays) authenticated.
//!
//! No method here returns an error. Every remote failure is absorbed into a
//! state transition plus diagnostics; callers read the flags, which are
//! eventually consistent.

use std::sync::{Arc, Mutex, RwLock};

use rand::RngCore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::auth::{AuthApi, AuthError};
use crate::expiry::{CoordinatorState, ExpiryCoordinator};
use crate::notice::{EndReason, SessionNotice};
use crate::types::SessionUser;

/// Point-in-time view of the session state.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// The authenticated user, if any.
    pub user: Option<SessionUser>,
    /// Whether a validation round-trip is currently in flight.
    pub is_loading: bool,
    /// Whether `user` holds a validated session.
    pub is_authenticated: bool,
}

/// Shared session state, owned jointly by the manager and the expiry
/// coordinator.
pub(crate) struct SessionCore {
    auth: Arc<dyn AuthApi>,
    state: RwLock<SessionSnapshot>,
    notices: UnboundedSender<SessionNotice>,
    /// Correlation ID tying this process's audit lines together.
    watch_id: String,
}

impl SessionCore {
    pub(crate) fn auth(&self) -> &dyn AuthApi {
        self.auth.as_ref()
    }

    pub(crate) fn notify(&self, notice: SessionNotice) {
        // The receiver side may be gone (UI shut down first); that's fine.
        let _ = self.notices.send(notice);
    }

    fn set_loading(&self, loading: bool) {
        if let Ok(mut state) = self.state.write() {
            state.is_loading = loading;
        }
    }

    fn set_session(&self, user: SessionUser) {
        if let Ok(mut state) = self.state.write() {
            state.user = Some(user);
            state.is_authenticated = true;
        }
    }

    fn clear_session(&self) {
        if let Ok(mut state) = self.state.write() {
            state.user = None;
            state.is_authenticated = false;
        }
    }

    /// Remote logout (best-effort), then unconditional local teardown.
    pub(crate) async fn logout(&self, reason: EndReason) {
        if let Err(err) = self.auth.logout().await {
            tracing::warn!("LOGOUT_REMOTE_FAILED | watch={} err={}", self.watch_id, err);
        }
        // Local state clears regardless of the remote outcome: the user's
        // intent to leave is always honored locally.
        self.clear_session();
        tracing::info!(
            "SESSION_ENDED | watch={} reason={} timestamp={}",
            self.watch_id,
            reason,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        self.notify(SessionNotice::SessionEnded { reason });
    }
}

/// The session fetcher.
///
/// See the module docs; this is the only type the embedding application
/// needs to hold.
pub struct SessionManager {
    core: Arc<SessionCore>,
    coordinator: ExpiryCoordinator,
    notices: Mutex<Option<UnboundedReceiver<SessionNotice>>>,
}

impl SessionManager {
    pub fn new(auth: Arc<dyn AuthApi>) -> Self {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let watch_id = generate_watch_id();

        tracing::info!(
            "SESSION_WATCH_CREATED | watch={} timestamp={}",
            watch_id,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        let core = Arc::new(SessionCore {
            auth,
            state: RwLock::new(SessionSnapshot::default()),
            notices: notice_tx,
            watch_id,
        });
        let coordinator = ExpiryCoordinator::new(Arc::clone(&core));

        Self {
            core,
            coordinator,
            notices: Mutex::new(Some(notice_rx)),
        }
    }

    /// Take the notice receiver. Yields `Some` exactly once.
    pub fn take_notices(&self) -> Option<UnboundedReceiver<SessionNotice>> {
        self.notices.lock().ok()?.take()
    }

    /// Validate the current credential and update the session state.
    ///
    /// On success the expiry coordinator is armed. On any failure — expected
    /// or not — the state transitions to unauthenticated and any pending
    /// timer is cancelled.
    pub async fn fetch_session(&self) {
        self.core.set_loading(true);

        match self.core.auth.validate_session().await {
            Ok(response) if response.success => match response.session_user() {
                Some(user) => {
                    tracing::info!(
                        "SESSION_VALIDATED | watch={} user={} role={}",
                        self.core.watch_id,
                        user.user_id,
                        user.role
                    );
                    self.core.set_session(user);
                    self.coordinator.start_expiry_timer();
                }
                None => {
                    // success without an identity is not a session
                    tracing::warn!(
                        "SESSION_VALIDATE_INCOMPLETE | watch={} message={}",
                        self.core.watch_id,
                        response.message
                    );
                    self.core.clear_session();
                    self.coordinator.clear_expiry_timer();
                }
            },
            Ok(response) => {
                // well-formed "not signed in" answer
                tracing::debug!(
                    "SESSION_UNAUTHENTICATED | watch={} message={}",
                    self.core.watch_id,
                    response.message
                );
                self.core.clear_session();
                self.coordinator.clear_expiry_timer();
            }
            Err(AuthError::Unauthenticated) => {
                // no credential present; the expected signed-out state
                tracing::debug!(
                    "SESSION_UNAUTHENTICATED | watch={} reason=no_credential",
                    self.core.watch_id
                );
                self.core.clear_session();
                self.coordinator.clear_expiry_timer();
            }
            Err(err) => {
                // anything else is unexpected, but the outcome is the same:
                // fail closed
                tracing::warn!(
                    "SESSION_VALIDATE_FAILED | watch={} err={}",
                    self.core.watch_id,
                    err
                );
                self.core.clear_session();
                self.coordinator.clear_expiry_timer();
            }
        }

        self.core.set_loading(false);
    }

    /// Re-validate on demand, e.g. after a role-gated view appears.
    pub async fn refetch_session(&self) {
        self.fetch_session().await;
    }

    /// Explicit sign-out. Cancels the expiry machinery, calls the portal
    /// (best-effort) and clears local state unconditionally.
    pub async fn logout(&self) {
        self.coordinator.clear_expiry_timer();
        self.core.logout(EndReason::Logout).await;
    }

    /// Host shutdown cleanup: cancel the timer and dismiss any prompt.
    ///
    /// No remote calls and no state transition — the credential cookie
    /// simply outlives the process. Idempotent.
    pub fn shutdown(&self) {
        self.coordinator.clear_expiry_timer();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match self.core.state.read() {
            Ok(state) => state.clone(),
            Err(_) => SessionSnapshot::default(),
        }
    }

    pub fn user(&self) -> Option<SessionUser> {
        self.snapshot().user
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated
    }

    /// State of the expiry coordinator (for status displays and tests).
    pub fn expiry_state(&self) -> CoordinatorState {
        self.coordinator.state()
    }
}

/// Generate a watch correlation ID: timestamp plus 64 random bits.
fn generate_watch_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let random_hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "watch_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        random_hex
    )
}
