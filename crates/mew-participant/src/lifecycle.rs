// SPDX-License-Identifier: MIT OR Apache-2.0
//! Client-side lifecycle state machine: honors `participant/pause`,
//! `participant/resume`, `participant/clear`, `participant/restart`,
//! `participant/shutdown`, `participant/compact`, and
//! `participant/request-status`.

use async_trait::async_trait;
use mew_envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

/// Lifecycle state of the participant, mirrored from the gateway registry's
/// status vocabulary but owned client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Normal operation.
    Active,
    /// Not consuming new chat/reasoning work; outbound emissions queue.
    Paused,
    /// Performing a best-effort context reduction.
    Compacting,
    /// Tearing down.
    ShuttingDown,
}

/// Outcome of a `participant/compact` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactStatus {
    /// A reduction was performed.
    Compacted,
    /// No reduction was possible or necessary.
    Skipped,
}

/// The `participant/compact-done` reply payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactResult {
    /// Whether a reduction occurred.
    pub status: CompactStatus,
    /// Tokens freed, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freed_tokens: Option<u64>,
    /// Messages freed, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freed_messages: Option<u64>,
}

/// Advisory usage counters reported on `participant/request-status`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ContextCounters {
    /// Messages processed since the last `participant/clear`.
    pub messages: u64,
    /// Tokens consumed since the last `participant/clear`.
    pub tokens: u64,
}

/// Callbacks the embedding agent/tool/test-driver registers to implement
/// the substance of each lifecycle command. Defaults are no-ops so a
/// minimal participant need not implement every hook.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    /// Called when `participant/clear` is honored; should reset any
    /// internal context the embedder tracks.
    async fn on_clear(&self) {}

    /// Called when `participant/restart` is honored; should close active
    /// streams and reset reasoning state.
    async fn on_restart(&self) {}

    /// Called when `participant/compact` is honored; returns the freed
    /// amounts, if the embedder tracks them.
    async fn on_compact(&self) -> CompactResult {
        CompactResult {
            status: CompactStatus::Skipped,
            freed_tokens: None,
            freed_messages: None,
        }
    }
}

struct NoopHooks;

#[async_trait]
impl LifecycleHooks for NoopHooks {}

/// Drives the participant-side lifecycle state machine. Auto-resume after
/// a `timeout_seconds` pause is implemented as a cancellable timer task.
pub struct LifecycleController {
    status: Mutex<ParticipantStatus>,
    counters: Mutex<ContextCounters>,
    hooks: Arc<dyn LifecycleHooks>,
    resume_cancel: Mutex<Option<Arc<AutoResumeToken>>>,
    auto_resume_sink: Mutex<Option<mpsc::Sender<Envelope>>>,
}

struct AutoResumeToken {
    cancelled: AtomicBool,
    notify: Notify,
}

impl AutoResumeToken {
    fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl LifecycleController {
    /// Construct a controller with no hooks registered (every command is a
    /// pure status transition).
    #[must_use]
    pub fn new() -> Self {
        Self::with_hooks(Arc::new(NoopHooks))
    }

    /// Construct a controller backed by the given hooks.
    #[must_use]
    pub fn with_hooks(hooks: Arc<dyn LifecycleHooks>) -> Self {
        Self {
            status: Mutex::new(ParticipantStatus::Active),
            counters: Mutex::new(ContextCounters::default()),
            hooks,
            resume_cancel: Mutex::new(None),
            auto_resume_sink: Mutex::new(None),
        }
    }

    /// Register the outbound sink used to emit `participant/resume` and a
    /// `participant/status{active}` envelope when a paused timer fires
    /// without an intervening explicit `participant/resume` command (§4.6,
    /// §8 boundary: `participant/pause{timeout_seconds: T}` produces a
    /// `participant/resume` status within `[T, T + 2s]`).
    pub fn set_auto_resume_sink(&self, sink: mpsc::Sender<Envelope>) {
        *self.auto_resume_sink.lock().expect("sink lock poisoned") = Some(sink);
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> ParticipantStatus {
        *self.status.lock().expect("status lock poisoned")
    }

    /// Current advisory usage counters.
    #[must_use]
    pub fn counters(&self) -> ContextCounters {
        *self.counters.lock().expect("counters lock poisoned")
    }

    /// Record message/token usage (called by the embedder as it does work).
    pub fn record_usage(&self, messages: u64, tokens: u64) {
        let mut c = self.counters.lock().expect("counters lock poisoned");
        c.messages += messages;
        c.tokens += tokens;
    }

    /// Honor `participant/pause`. If `timeout_seconds` is given, spawns a
    /// timer that auto-resumes unless cancelled by an explicit
    /// `participant/resume` first.
    pub fn pause(self: &Arc<Self>, timeout_seconds: Option<u64>) {
        *self.status.lock().expect("status lock poisoned") = ParticipantStatus::Paused;
        let token = Arc::new(AutoResumeToken::new());
        *self.resume_cancel.lock().expect("resume lock poisoned") = Some(token.clone());

        if let Some(secs) = timeout_seconds {
            let controller = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(secs)) => {
                        if !token.is_cancelled() {
                            controller.resume();
                            controller.emit_auto_resume().await;
                        }
                    }
                    () = token.notify.notified() => {}
                }
            });
        }
    }

    /// Emit `participant/resume` followed by a `participant/status{active}`
    /// envelope through the registered sink, for a pause timer that fired
    /// without an intervening explicit `participant/resume` command.
    async fn emit_auto_resume(&self) {
        let sink = self
            .auto_resume_sink
            .lock()
            .expect("sink lock poisoned")
            .clone();
        let Some(sink) = sink else { return };
        let counters = self.counters();
        let resume = Envelope::new("participant/resume", serde_json::json!({}));
        if sink.send(resume).await.is_err() {
            return;
        }
        let status = Envelope::new(
            "participant/status",
            serde_json::json!({
                "status": self.status(),
                "context_counters": {
                    "messages": counters.messages,
                    "tokens": counters.tokens,
                },
            }),
        );
        let _ = sink.send(status).await;
    }

    /// Honor `participant/resume`, cancelling any pending auto-resume timer.
    pub fn resume(&self) {
        if let Some(token) = self.resume_cancel.lock().expect("resume lock poisoned").take() {
            token.cancel();
        }
        *self.status.lock().expect("status lock poisoned") = ParticipantStatus::Active;
    }

    /// Honor `participant/clear`.
    pub async fn clear(&self) {
        *self.counters.lock().expect("counters lock poisoned") = ContextCounters::default();
        self.hooks.on_clear().await;
    }

    /// Honor `participant/restart`.
    pub async fn restart(&self) {
        self.hooks.on_restart().await;
        *self.counters.lock().expect("counters lock poisoned") = ContextCounters::default();
        *self.status.lock().expect("status lock poisoned") = ParticipantStatus::Active;
    }

    /// Honor `participant/shutdown`.
    pub fn shutdown(&self) {
        *self.status.lock().expect("status lock poisoned") = ParticipantStatus::ShuttingDown;
    }

    /// Honor `participant/compact`.
    pub async fn compact(&self) -> CompactResult {
        *self.status.lock().expect("status lock poisoned") = ParticipantStatus::Compacting;
        let result = self.hooks.on_compact().await;
        *self.status.lock().expect("status lock poisoned") = ParticipantStatus::Active;
        result
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active() {
        let controller = LifecycleController::new();
        assert_eq!(controller.status(), ParticipantStatus::Active);
    }

    #[test]
    fn pause_then_resume() {
        let controller = Arc::new(LifecycleController::new());
        controller.pause(None);
        assert_eq!(controller.status(), ParticipantStatus::Paused);
        controller.resume();
        assert_eq!(controller.status(), ParticipantStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_with_timeout_auto_resumes() {
        let controller = Arc::new(LifecycleController::new());
        controller.pause(Some(5));
        assert_eq!(controller.status(), ParticipantStatus::Paused);
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(controller.status(), ParticipantStatus::Active);
    }

    #[tokio::test]
    async fn explicit_resume_cancels_auto_resume_timer() {
        let controller = Arc::new(LifecycleController::new());
        controller.pause(Some(3600));
        controller.resume();
        assert_eq!(controller.status(), ParticipantStatus::Active);
    }

    #[tokio::test]
    async fn clear_resets_counters_and_calls_hook() {
        let controller = LifecycleController::new();
        controller.record_usage(5, 500);
        controller.clear().await;
        assert_eq!(controller.counters().messages, 0);
    }

    #[tokio::test]
    async fn compact_transitions_through_compacting_back_to_active() {
        let controller = LifecycleController::new();
        let result = controller.compact().await;
        assert!(matches!(result.status, CompactStatus::Skipped));
        assert_eq!(controller.status(), ParticipantStatus::Active);
    }
}
