// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Expiry coordinator: the credential keep-alive state machine.
//!
//! The portal issues a 30-minute credential. One minute before it runs out,
//! the coordinator opens a warning prompt with a 10-second window and exactly
//! two resolutions: extend the session or end it. If nobody answers, the
//! session ends on its own.
//!
//! ## States
//!
//! ```text
//!   Idle ──(arm)──→ Armed ──(timer fires)──→ Warning
//!     ↑                ↑                        │
//!     │                └──────(extend ok)───────┤
//!     └───────(end / timeout / extend failed)───┘
//! ```
//!
//! ## Race handling
//!
//! A user can resolve the prompt in the last moment before the window
//! closes. The prompt therefore carries a single-use resolver: whichever of
//! "user clicked" and "window elapsed" lands first consumes it, and the
//! loser becomes a no-op. There is no flag to check and nothing to
//! double-fire.
//!
//! The timer handle and the prompt handle live in one mutex-guarded slot so
//! superseding and cancelling are atomic with respect to each other. At most
//! one timer and one prompt exist per session at any time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::notice::{EndReason, SessionNotice};
use crate::session::SessionCore;

/// Known lifetime of a portal credential: 30 minutes (1800 seconds).
pub const CREDENTIAL_LIFETIME_SECS: u64 = 30 * 60;

/// When the warning fires: one minute before nominal expiry.
pub const EXPIRY_WARNING_DELAY_SECS: u64 = CREDENTIAL_LIFETIME_SECS - 60;

/// How long the warning prompt stays open before the session ends on its own.
pub const WARNING_WINDOW_SECS: u64 = 10;

/// Coordinator state, exposed for status displays and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorState {
    /// No session, nothing scheduled.
    #[default]
    Idle,
    /// A warning timer is scheduled.
    Armed,
    /// The warning prompt is open; the timer has been consumed.
    Warning,
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// The two answers a user can give to the warning prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptChoice {
    Extend,
    End,
}

/// How a warning prompt was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResolution {
    /// The user asked to extend the session.
    Extended,
    /// The user asked to end the session.
    Ended,
    /// The visibility window elapsed with no answer.
    TimedOut,
}

impl PromptResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extended => "extended",
            Self::Ended => "ended",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Handle to an open expiry warning.
///
/// Cloneable; all clones share one single-use resolver. The first call to
/// [`extend`](Self::extend) or [`end`](Self::end) wins, every later call
/// returns `false` and does nothing — including calls racing the window
/// timeout.
#[derive(Debug, Clone)]
pub struct WarningPrompt {
    resolver: Arc<Mutex<Option<oneshot::Sender<PromptChoice>>>>,
    deadline: Instant,
}

impl WarningPrompt {
    fn new(window: Duration) -> (Self, oneshot::Receiver<PromptChoice>) {
        let (tx, rx) = oneshot::channel();
        let prompt = Self {
            resolver: Arc::new(Mutex::new(Some(tx))),
            deadline: Instant::now() + window,
        };
        (prompt, rx)
    }

    /// Ask to extend the session. Returns `true` if this call won the
    /// resolution.
    pub fn extend(&self) -> bool {
        self.resolve(PromptChoice::Extend)
    }

    /// Ask to end the session now. Returns `true` if this call won the
    /// resolution.
    pub fn end(&self) -> bool {
        self.resolve(PromptChoice::End)
    }

    /// Whether the prompt has already been resolved or dismissed.
    pub fn is_resolved(&self) -> bool {
        match self.resolver.lock() {
            Ok(slot) => slot.is_none(),
            Err(_) => true,
        }
    }

    /// Time left before the prompt auto-closes.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn resolve(&self, choice: PromptChoice) -> bool {
        let Ok(mut slot) = self.resolver.lock() else {
            return false;
        };
        match slot.take() {
            // send fails when the coordinator side is already gone; either
            // way the prompt is consumed now
            Some(tx) => tx.send(choice).is_ok(),
            None => false,
        }
    }

    /// Consume the resolver without an answer (supersede / teardown).
    fn dismiss(&self) {
        if let Ok(mut slot) = self.resolver.lock() {
            slot.take();
        }
    }
}

/// Owns the single expiry timer and the single warning prompt for one
/// session.
///
/// Constructed once by the session manager; the public surface is just
/// [`start_expiry_timer`](Self::start_expiry_timer),
/// [`clear_expiry_timer`](Self::clear_expiry_timer) and
/// [`state`](Self::state).
pub struct ExpiryCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    core: Arc<SessionCore>,
    slot: Mutex<TimerSlot>,
}

#[derive(Default)]
struct TimerSlot {
    timer: Option<JoinHandle<()>>,
    prompt: Option<WarningPrompt>,
    state: CoordinatorState,
}

impl ExpiryCoordinator {
    pub(crate) fn new(core: Arc<SessionCore>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                core,
                slot: Mutex::new(TimerSlot::default()),
            }),
        }
    }

    /// Arm the warning timer for a freshly validated or freshly refreshed
    /// credential. Supersedes any previous timer or prompt; two calls in a
    /// row leave exactly one scheduled wake-up.
    pub fn start_expiry_timer(&self) {
        Arc::clone(&self.inner).arm();
    }

    /// Cancel the timer and dismiss any open prompt. Idempotent; safe to
    /// call in any state.
    pub fn clear_expiry_timer(&self) {
        self.inner.clear_slot();
    }

    /// Current coordinator state.
    pub fn state(&self) -> CoordinatorState {
        match self.inner.slot.lock() {
            Ok(slot) => slot.state,
            Err(_) => CoordinatorState::Idle,
        }
    }
}

impl CoordinatorInner {
    fn arm(self: Arc<Self>) {
        {
            let Ok(mut slot) = self.slot.lock() else { return };
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
            if let Some(prompt) = slot.prompt.take() {
                prompt.dismiss();
            }
            let inner = Arc::clone(&self);
            slot.timer = Some(tokio::spawn(async move {
                time::sleep(Duration::from_secs(EXPIRY_WARNING_DELAY_SECS)).await;
                inner.fire().await;
            }));
            slot.state = CoordinatorState::Armed;
        }
        tracing::info!(
            "EXPIRY_TIMER_ARMED | warn_in={}s window={}s",
            EXPIRY_WARNING_DELAY_SECS,
            WARNING_WINDOW_SECS
        );
    }

    /// Runs inside the timer task when the warning delay elapses.
    async fn fire(self: Arc<Self>) {
        let (prompt, resolution_rx) = {
            let Ok(mut slot) = self.slot.lock() else { return };
            // The wake-up consumed the timer. Drop the handle here so a
            // concurrent end() cannot abort the task that is running the
            // teardown it asked for.
            slot.timer = None;
            if let Some(stale) = slot.prompt.take() {
                stale.dismiss();
            }
            let (prompt, rx) = WarningPrompt::new(Duration::from_secs(WARNING_WINDOW_SECS));
            slot.prompt = Some(prompt.clone());
            slot.state = CoordinatorState::Warning;
            (prompt, rx)
        };

        tracing::info!("EXPIRY_WARNING_OPENED | window={}s", WARNING_WINDOW_SECS);
        self.core.notify(SessionNotice::ExpiryWarning(prompt));

        let resolution = match time::timeout(
            Duration::from_secs(WARNING_WINDOW_SECS),
            resolution_rx,
        )
        .await
        {
            Ok(Ok(PromptChoice::Extend)) => PromptResolution::Extended,
            Ok(Ok(PromptChoice::End)) => PromptResolution::Ended,
            // Dismissed by a supersede or teardown; whoever dismissed it
            // owns the state transition.
            Ok(Err(_)) => return,
            Err(_) => PromptResolution::TimedOut,
        };

        tracing::info!("PROMPT_RESOLVED | resolution={}", resolution.as_str());

        match resolution {
            PromptResolution::Extended => self.extend().await,
            PromptResolution::Ended => self.end(EndReason::UserChoice).await,
            PromptResolution::TimedOut => self.end(EndReason::TimedOut).await,
        }
    }

    /// The extend path: refresh the credential and re-arm.
    async fn extend(self: Arc<Self>) {
        {
            let Ok(mut slot) = self.slot.lock() else { return };
            // A teardown may have won the race between the user's answer
            // and this path; it owns the state then.
            if slot.state != CoordinatorState::Warning {
                return;
            }
            // The prompt is consumed. Between here and a successful re-arm
            // there is deliberately no timer: a warning cannot fire while
            // the refresh is in flight.
            slot.prompt.take();
        }

        match self.core.auth().refresh_credential().await {
            Ok(_) => {
                {
                    let Ok(slot) = self.slot.lock() else { return };
                    // Torn down while the refresh was in flight; do not
                    // resurrect the session.
                    if slot.state != CoordinatorState::Warning {
                        return;
                    }
                }
                Arc::clone(&self).arm();
                tracing::info!("SESSION_EXTENDED | remaining={}s", CREDENTIAL_LIFETIME_SECS);
                self.core.notify(SessionNotice::SessionExtended {
                    remaining: Duration::from_secs(CREDENTIAL_LIFETIME_SECS),
                });
            }
            Err(err) => {
                // A failed refresh means the credential is most likely
                // already unrecoverable. No retry; end the session now.
                tracing::warn!("SESSION_EXTEND_FAILED | err={}", err);
                self.core.notify(SessionNotice::ExtendFailed);
                self.end(EndReason::ExtendFailed).await;
            }
        }
    }

    /// Tear down: cancel everything, then hand control to the session
    /// logout.
    async fn end(&self, reason: EndReason) {
        let was_live = self.clear_slot();
        if !was_live {
            return;
        }
        self.core.logout(reason).await;
    }

    /// Cancel the timer, dismiss the prompt, return to `Idle`. Returns
    /// whether anything was live. Idempotent.
    fn clear_slot(&self) -> bool {
        let Ok(mut slot) = self.slot.lock() else {
            return false;
        };
        let was_live = slot.state != CoordinatorState::Idle;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        if let Some(prompt) = slot.prompt.take() {
            prompt.dismiss();
        }
        slot.state = CoordinatorState::Idle;
        was_live
    }
}
