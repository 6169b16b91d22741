// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session lifecycle tests for tokenwatch
//!
//! These tests drive the session manager and the expiry coordinator end to
//! end against a scripted auth backend. They run under a paused tokio clock
//! (`start_paused = true`), so the 29-minute warning lead and the 10-second
//! prompt window elapse deterministically and instantly.
//!
//! # Test Categories
//!
//! - Mount-time validation (signed in / signed out / backend failure)
//! - Warning prompt resolution (extend / end / timeout)
//! - The extend-vs-auto-dismiss race
//! - Teardown idempotency and host shutdown cleanup

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::sleep;

use tokenwatch::{
    AuthApi, AuthError, CoordinatorState, EndReason, SessionManager, SessionNotice,
    TokenResponse, UserRole, WarningPrompt, CREDENTIAL_LIFETIME_SECS, EXPIRY_WARNING_DELAY_SECS,
    WARNING_WINDOW_SECS,
};

// =============================================================================
// Scripted auth backend
// =============================================================================

struct MockAuth {
    validate: Mutex<Result<TokenResponse, AuthError>>,
    refresh: Mutex<Result<TokenResponse, AuthError>>,
    refresh_delay: Duration,
    logout_fails: bool,
    validate_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MockAuth {
    fn token(user_id: u64, role: &str) -> TokenResponse {
        TokenResponse {
            success: true,
            message: "ok".to_string(),
            user_id: Some(user_id),
            email: Some("someone@example.com".to_string()),
            name: Some("Someone".to_string()),
            role: Some(role.to_string()),
            expires_in: Some(CREDENTIAL_LIFETIME_SECS),
            ..Default::default()
        }
    }

    fn signed_in(user_id: u64, role: &str) -> Self {
        Self {
            validate: Mutex::new(Ok(Self::token(user_id, role))),
            refresh: Mutex::new(Ok(Self::token(user_id, role))),
            refresh_delay: Duration::ZERO,
            logout_fails: false,
            validate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    fn signed_out() -> Self {
        Self {
            validate: Mutex::new(Err(AuthError::Unauthenticated)),
            ..Self::signed_in(0, "user")
        }
    }

    fn with_validate(self, result: Result<TokenResponse, AuthError>) -> Self {
        *self.validate.lock().unwrap() = result;
        self
    }

    fn with_refresh_error(self, error: AuthError) -> Self {
        *self.refresh.lock().unwrap() = Err(error);
        self
    }

    fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    fn with_logout_failure(mut self) -> Self {
        self.logout_fails = true;
        self
    }

    fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn logout_count(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthApi for MockAuth {
    async fn login(&self, _email: &str, _password: &str) -> Result<TokenResponse, AuthError> {
        Err(AuthError::Api("login not scripted".to_string()))
    }

    async fn validate_session(&self) -> Result<TokenResponse, AuthError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.validate.lock().unwrap().clone()
    }

    async fn refresh_credential(&self) -> Result<TokenResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            sleep(self.refresh_delay).await;
        }
        self.refresh.lock().unwrap().clone()
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.logout_fails {
            Err(AuthError::Network("connection reset".to_string()))
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn mounted(auth: MockAuth) -> (Arc<MockAuth>, SessionManager, UnboundedReceiver<SessionNotice>) {
    let auth = Arc::new(auth);
    let manager = SessionManager::new(Arc::clone(&auth) as Arc<dyn AuthApi>);
    let notices = manager.take_notices().expect("first take should succeed");
    (auth, manager, notices)
}

async fn next_notice(notices: &mut UnboundedReceiver<SessionNotice>) -> SessionNotice {
    notices.recv().await.expect("notice channel closed")
}

fn expect_warning(notice: SessionNotice) -> WarningPrompt {
    match notice {
        SessionNotice::ExpiryWarning(prompt) => prompt,
        other => panic!("expected an expiry warning, got {:?}", other),
    }
}

// =============================================================================
// Mount-time validation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_mount_with_valid_credential_arms_timer() {
    let (auth, manager, _notices) = mounted(MockAuth::signed_in(42, "ADMIN"));

    manager.fetch_session().await;

    assert!(manager.is_authenticated());
    assert!(!manager.is_loading());
    let user = manager.user().expect("should have a user");
    assert_eq!(user.user_id, "42");
    assert_eq!(user.role, UserRole::Admin, "role should be normalized");
    assert_eq!(manager.expiry_state(), CoordinatorState::Armed);
    assert_eq!(auth.logout_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_mount_without_credential_stays_idle() {
    let (auth, manager, _notices) = mounted(MockAuth::signed_out());

    manager.fetch_session().await;

    assert!(!manager.is_authenticated());
    assert!(manager.user().is_none());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
    assert_eq!(auth.logout_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_validation_failure_fails_closed() {
    let (_auth, manager, _notices) = mounted(
        MockAuth::signed_in(1, "user")
            .with_validate(Err(AuthError::Network("dns failure".to_string()))),
    );

    manager.fetch_session().await;

    assert!(!manager.is_authenticated());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_success_without_identity_is_unauthenticated() {
    // success=true but no userId/role: fail closed
    let (_auth, manager, _notices) = mounted(MockAuth::signed_in(1, "user").with_validate(Ok(
        TokenResponse {
            success: true,
            ..Default::default()
        },
    )));

    manager.fetch_session().await;

    assert!(!manager.is_authenticated());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_refetch_after_session_loss_cancels_timer() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(7, "company"));

    manager.fetch_session().await;
    assert_eq!(manager.expiry_state(), CoordinatorState::Armed);

    // The credential disappears server-side; a refetch must disarm.
    *auth.validate.lock().unwrap() = Err(AuthError::Unauthenticated);
    manager.refetch_session().await;

    assert!(!manager.is_authenticated());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);

    // And no warning ever fires from the cancelled timer.
    sleep(Duration::from_secs(EXPIRY_WARNING_DELAY_SECS + 120)).await;
    assert!(notices.try_recv().is_err());
}

// =============================================================================
// Warning prompt resolution
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_warning_opens_at_lead_time() {
    let (_auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);

    assert_eq!(manager.expiry_state(), CoordinatorState::Warning);
    assert!(!prompt.is_resolved());
    assert!(prompt.remaining() <= Duration::from_secs(WARNING_WINDOW_SECS));
}

#[tokio::test(start_paused = true)]
async fn test_extend_within_window_rearms() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);
    assert!(prompt.extend(), "extend should win the resolution");

    match next_notice(&mut notices).await {
        SessionNotice::SessionExtended { remaining } => {
            assert_eq!(remaining, Duration::from_secs(CREDENTIAL_LIFETIME_SECS));
        }
        other => panic!("expected SessionExtended, got {:?}", other),
    }

    assert_eq!(manager.expiry_state(), CoordinatorState::Armed);
    assert!(prompt.is_resolved());
    assert_eq!(auth.refresh_count(), 1);
    assert_eq!(auth.logout_count(), 0, "no sign-out on a successful extend");
}

#[tokio::test(start_paused = true)]
async fn test_no_action_times_out_and_logs_out_once() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    let _prompt = expect_warning(next_notice(&mut notices).await);

    // Nobody answers; the window elapses on its own.
    match next_notice(&mut notices).await {
        SessionNotice::SessionEnded { reason } => assert_eq!(reason, EndReason::TimedOut),
        other => panic!("expected SessionEnded, got {:?}", other),
    }

    assert_eq!(auth.logout_count(), 1);
    assert!(!manager.is_authenticated());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_end_choice_signs_out() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);
    assert!(prompt.end());

    match next_notice(&mut notices).await {
        SessionNotice::SessionEnded { reason } => assert_eq!(reason, EndReason::UserChoice),
        other => panic!("expected SessionEnded, got {:?}", other),
    }

    assert_eq!(auth.logout_count(), 1);
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_extend_failure_forces_logout() {
    let (auth, manager, mut notices) = mounted(
        MockAuth::signed_in(42, "admin")
            .with_refresh_error(AuthError::Api("refresh rejected".to_string())),
    );
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);
    assert!(prompt.extend());

    assert!(matches!(
        next_notice(&mut notices).await,
        SessionNotice::ExtendFailed
    ));
    match next_notice(&mut notices).await {
        SessionNotice::SessionEnded { reason } => assert_eq!(reason, EndReason::ExtendFailed),
        other => panic!("expected SessionEnded, got {:?}", other),
    }

    assert_eq!(auth.refresh_count(), 1, "a failed refresh is never retried");
    assert_eq!(auth.logout_count(), 1);
    assert!(!manager.is_authenticated());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}

// =============================================================================
// The extend-vs-auto-dismiss race
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_late_extend_beats_auto_dismiss() {
    // The user answers at second 9.9; the refresh call takes half a second,
    // so it resolves after the 10-second mark. The stale auto-dismiss must
    // not kill the freshly extended session.
    let (auth, manager, mut notices) = mounted(
        MockAuth::signed_in(42, "admin").with_refresh_delay(Duration::from_millis(500)),
    );
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);
    sleep(Duration::from_millis(9_900)).await;
    assert!(prompt.extend(), "9.9s is still inside the window");

    assert!(matches!(
        next_notice(&mut notices).await,
        SessionNotice::SessionExtended { .. }
    ));
    assert_eq!(auth.logout_count(), 0, "auto-dismiss must be suppressed");
    assert_eq!(manager.expiry_state(), CoordinatorState::Armed);

    // Nothing else is queued: no duplicate end, no second warning yet.
    assert!(notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_prompt_accepts_exactly_one_resolution() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);
    assert!(prompt.extend());
    assert!(!prompt.end(), "second resolution loses");
    assert!(!prompt.extend(), "and so does a repeat of the first");

    assert!(matches!(
        next_notice(&mut notices).await,
        SessionNotice::SessionExtended { .. }
    ));
    assert_eq!(auth.logout_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rearm_supersedes_previous_timer() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));

    // Arm twice in quick succession via two validations.
    manager.fetch_session().await;
    manager.refetch_session().await;
    assert_eq!(manager.expiry_state(), CoordinatorState::Armed);

    // Exactly one warning arrives.
    let prompt = expect_warning(next_notice(&mut notices).await);
    assert!(prompt.end());
    assert!(matches!(
        next_notice(&mut notices).await,
        SessionNotice::SessionEnded { .. }
    ));

    // Wait long past a second hypothetical firing: nothing else shows up.
    sleep(Duration::from_secs(EXPIRY_WARNING_DELAY_SECS + 120)).await;
    assert!(notices.try_recv().is_err(), "superseded timer must not fire");
    assert_eq!(auth.logout_count(), 1);
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_remote_failure_clears_local_state() {
    let (auth, manager, mut notices) =
        mounted(MockAuth::signed_in(42, "admin").with_logout_failure());
    manager.fetch_session().await;
    assert!(manager.is_authenticated());

    manager.logout().await;

    assert_eq!(auth.logout_count(), 1);
    assert!(!manager.is_authenticated(), "local state clears regardless");
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
    match next_notice(&mut notices).await {
        SessionNotice::SessionEnded { reason } => assert_eq!(reason, EndReason::Logout),
        other => panic!("expected SessionEnded, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_teardown_is_idempotent() {
    let (_auth, manager, _notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    manager.logout().await;
    manager.logout().await;
    manager.shutdown();
    manager.shutdown();

    assert!(!manager.is_authenticated());
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_pending_timer() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    manager.shutdown();
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);

    sleep(Duration::from_secs(EXPIRY_WARNING_DELAY_SECS + 120)).await;
    assert!(notices.try_recv().is_err(), "no warning after shutdown");
    assert_eq!(auth.logout_count(), 0, "shutdown is cleanup, not sign-out");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_refresh_prevents_rearm() {
    // Teardown lands while the extend's refresh call is still in flight;
    // the completed refresh must not resurrect the session.
    let (auth, manager, mut notices) = mounted(
        MockAuth::signed_in(42, "admin").with_refresh_delay(Duration::from_millis(500)),
    );
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);
    assert!(prompt.extend());

    // Let the coordinator pick up the answer and start the refresh call,
    // then tear down underneath it.
    sleep(Duration::from_millis(100)).await;
    manager.shutdown();

    // Give the in-flight refresh ample time to resolve.
    sleep(Duration::from_secs(2)).await;

    assert_eq!(auth.refresh_count(), 1);
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
    assert!(notices.try_recv().is_err(), "no extended notice after teardown");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_warning_dismisses_prompt() {
    let (auth, manager, mut notices) = mounted(MockAuth::signed_in(42, "admin"));
    manager.fetch_session().await;

    let prompt = expect_warning(next_notice(&mut notices).await);

    manager.shutdown();

    assert!(prompt.is_resolved(), "prompt is dismissed by shutdown");
    assert!(!prompt.extend(), "a dismissed prompt rejects resolutions");

    // The window elapsing afterwards must not end anything.
    sleep(Duration::from_secs(WARNING_WINDOW_SECS + 5)).await;
    assert!(notices.try_recv().is_err());
    assert_eq!(auth.logout_count(), 0);
    assert_eq!(manager.expiry_state(), CoordinatorState::Idle);
}
