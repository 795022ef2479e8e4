//! Call session registry
//!
//! One `CallSession` per active call, keyed by the provider's call id. The
//! session owns the relay queue, the in-flight turn handle, the activity
//! watch and the status event channel for its call.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trifivend_core::{CallEvent, Message};

use crate::orchestrator::TurnOutcome;
use crate::relay::AudioRelayQueue;
use crate::watch::ContinuationWatch;
use crate::PipelineError;

/// The orchestration task currently running for a call
struct ActiveTurn {
    turn: u32,
    cancel: CancellationToken,
    handle: JoinHandle<TurnOutcome>,
}

/// Per-call state
pub struct CallSession {
    call_id: String,
    script_id: Option<String>,
    system_prompt: Option<String>,
    turn_count: AtomicU32,
    relay: Arc<AudioRelayQueue>,
    /// Serializes turn replacement: cancel, await, install
    active: tokio::sync::Mutex<Option<ActiveTurn>>,
    activity: Mutex<Arc<ContinuationWatch>>,
    events: broadcast::Sender<CallEvent>,
    /// Completed exchanges, oldest first
    history: Mutex<Vec<Message>>,
    /// Parent of every turn token; cancelled when the call ends
    cancel: CancellationToken,
    closed: AtomicBool,
    created_at: Instant,
    last_activity: Mutex<Instant>,
}

impl CallSession {
    pub fn new(
        call_id: impl Into<String>,
        script_id: Option<String>,
        system_prompt: Option<String>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        let now = Instant::now();
        Self {
            call_id: call_id.into(),
            script_id,
            system_prompt,
            turn_count: AtomicU32::new(0),
            relay: Arc::new(AudioRelayQueue::new()),
            active: tokio::sync::Mutex::new(None),
            activity: Mutex::new(Arc::new(ContinuationWatch::new())),
            events,
            history: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
            created_at: now,
            last_activity: Mutex::new(now),
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn script_id(&self) -> Option<&str> {
        self.script_id.as_deref()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Number of caller utterances processed so far
    pub fn turn_count(&self) -> u32 {
        self.turn_count.load(Ordering::SeqCst)
    }

    pub fn relay(&self) -> &Arc<AudioRelayQueue> {
        &self.relay
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    /// Publish a status event; having no subscribers is fine
    pub fn emit(&self, event: CallEvent) {
        tracing::debug!(call_id = %self.call_id, event = event.name(), "Call event");
        let _ = self.events.send(event);
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<CallEvent> {
        self.events.clone()
    }

    pub fn history(&self) -> Vec<Message> {
        self.history.lock().clone()
    }

    pub(crate) fn push_history(&self, messages: impl IntoIterator<Item = Message>) {
        self.history.lock().extend(messages);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Fire the current activity watch (a caller utterance arrived)
    pub fn notify_activity(&self) {
        self.touch();
        self.activity.lock().set();
    }

    /// Install a fresh activity watch for a continuation window
    pub(crate) fn arm_activity_watch(&self) -> Arc<ContinuationWatch> {
        let watch = Arc::new(ContinuationWatch::new());
        *self.activity.lock() = watch.clone();
        watch
    }

    /// Replace the active turn
    ///
    /// Cancels the previous task and waits for it to finish, closes its turn
    /// on the relay queue, bumps the turn counter and installs the task built
    /// by `spawn`. Holding the turn lock throughout keeps two utterances from
    /// racing to become active.
    pub(crate) async fn replace_turn<F>(&self, spawn: F) -> Result<u32, PipelineError>
    where
        F: FnOnce(u32, CancellationToken) -> JoinHandle<TurnOutcome>,
    {
        let mut active = self.active.lock().await;
        if self.is_closed() {
            return Err(PipelineError::CallEnded(self.call_id.clone()));
        }

        if let Some(previous) = active.take() {
            let outcome = self.cancel_turn(previous).await;
            tracing::debug!(call_id = %self.call_id, ?outcome, "Previous turn finished");
        }

        self.relay.begin_turn();
        let turn = self.turn_count.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.cancel.child_token();
        let handle = spawn(turn, cancel.clone());
        *active = Some(ActiveTurn {
            turn,
            cancel,
            handle,
        });

        Ok(turn)
    }

    async fn cancel_turn(&self, previous: ActiveTurn) -> TurnOutcome {
        previous.cancel.cancel();
        match previous.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    call_id = %self.call_id,
                    turn = previous.turn,
                    error = %e,
                    "Turn task did not finish cleanly"
                );
                TurnOutcome::Failed(e.to_string())
            }
        }
    }

    /// Wait for the active turn (including any continuation) to finish
    pub async fn join_active_turn(&self) -> Option<TurnOutcome> {
        let mut active = self.active.lock().await;
        let current = active.take()?;
        match current.handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => Some(TurnOutcome::Failed(e.to_string())),
        }
    }

    /// Tear the call down
    ///
    /// Cancels the active turn, waits for it, and pushes `EndOfCall` so a
    /// polling consumer never blocks forever. Returns false if already closed.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.cancel_turn(previous).await;
        }
        drop(active);

        self.relay.end_call();
        self.emit(CallEvent::CallEnded);
        true
    }

    pub fn summary(&self) -> CallSummary {
        CallSummary {
            call_id: self.call_id.clone(),
            turn_count: self.turn_count(),
            script_id: self.script_id.clone(),
            age_secs: self.age().as_secs(),
            idle_secs: self.idle_for().as_secs(),
        }
    }
}

/// Snapshot of a session for listings
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub turn_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_id: Option<String>,
    pub age_secs: u64,
    pub idle_secs: u64,
}

/// Process-wide map of call id to session
pub struct CallSessionRegistry {
    sessions: DashMap<String, Arc<CallSession>>,
    /// Sessions held against `max_calls`
    live: AtomicUsize,
    max_calls: usize,
    event_capacity: usize,
}

impl CallSessionRegistry {
    pub fn new(max_calls: usize, event_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            live: AtomicUsize::new(0),
            max_calls,
            event_capacity,
        }
    }

    /// Get the session for a call, creating it on first use
    pub fn get_or_create(&self, call_id: &str) -> Result<Arc<CallSession>, PipelineError> {
        self.get_or_create_with(call_id, None, None)
            .map(|(session, _)| session)
    }

    /// Get the session for a call, creating it with the given configuration
    ///
    /// Creation is idempotent: concurrent callers for the same id all get the
    /// first-created session, and configuration passed by later callers is
    /// ignored. The flag is true only for the caller that created it.
    pub fn get_or_create_with(
        &self,
        call_id: &str,
        script_id: Option<String>,
        system_prompt: Option<String>,
    ) -> Result<(Arc<CallSession>, bool), PipelineError> {
        // the capacity check and the insert happen under the entry's shard lock
        let session = match self.sessions.entry(call_id.to_string()) {
            Entry::Occupied(entry) => return Ok((entry.get().clone(), false)),
            Entry::Vacant(entry) => {
                if self.live.fetch_add(1, Ordering::SeqCst) >= self.max_calls {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    return Err(PipelineError::CapacityExceeded(self.max_calls));
                }
                tracing::info!(call_id = %call_id, "Created call session");
                let session = Arc::new(CallSession::new(
                    call_id,
                    script_id,
                    system_prompt,
                    self.event_capacity,
                ));
                entry.insert(session.clone());
                session
            }
        };

        metrics::gauge!("trifivend_active_calls").set(self.live.load(Ordering::SeqCst) as f64);
        Ok((session, true))
    }

    pub fn get(&self, call_id: &str) -> Option<Arc<CallSession>> {
        self.sessions.get(call_id).map(|s| s.value().clone())
    }

    /// Remove and tear down a session
    pub async fn remove(&self, call_id: &str) -> Option<Arc<CallSession>> {
        let (_, session) = self.sessions.remove(call_id)?;
        self.live.fetch_sub(1, Ordering::SeqCst);
        session.close().await;
        metrics::gauge!("trifivend_active_calls").set(self.live.load(Ordering::SeqCst) as f64);
        tracing::info!(call_id = %call_id, turns = session.turn_count(), "Removed call session");
        Some(session)
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn list(&self) -> Vec<CallSummary> {
        self.sessions.iter().map(|s| s.value().summary()).collect()
    }

    /// Remove sessions idle for longer than `idle_timeout`
    pub async fn cleanup_expired(&self, idle_timeout: Duration) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.value().idle_for() > idle_timeout)
            .map(|s| s.key().clone())
            .collect();

        let mut removed = 0;
        for call_id in expired {
            if self.remove(&call_id).await.is_some() {
                tracing::info!(call_id = %call_id, "Expired idle call session");
                removed += 1;
            }
        }
        removed
    }

    /// Tear down every session
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        for call_id in ids {
            self.remove(&call_id).await;
        }
    }

    /// Start a background task that periodically removes idle sessions
    ///
    /// Returns a shutdown sender that stops the task.
    pub fn start_cleanup_task(
        self: &Arc<Self>,
        interval: Duration,
        idle_timeout: Duration,
    ) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let removed = registry.cleanup_expired(idle_timeout).await;
                        if removed > 0 {
                            tracing::info!(
                                removed,
                                remaining = registry.count(),
                                "Call session cleanup"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Call session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayItem;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let registry = Arc::new(CallSessionRegistry::new(100, 16));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("call-X").unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(registry.count(), 1);
        for session in &sessions {
            assert!(Arc::ptr_eq(session, &sessions[0]));
        }
    }

    #[tokio::test]
    async fn test_first_configuration_wins() {
        let registry = CallSessionRegistry::new(100, 16);
        let (first, created) = registry
            .get_or_create_with("CA1", Some("solar".into()), Some("Be brief.".into()))
            .unwrap();
        assert!(created);
        let (second, created) = registry.get_or_create_with("CA1", Some("other".into()), None).unwrap();
        assert!(!created);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.script_id(), Some("solar"));
        assert_eq!(second.system_prompt(), Some("Be brief."));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let registry = CallSessionRegistry::new(1, 16);
        registry.get_or_create("CA1").unwrap();
        assert!(matches!(
            registry.get_or_create("CA2"),
            Err(PipelineError::CapacityExceeded(1))
        ));
        // existing calls are still reachable at capacity
        assert!(registry.get_or_create("CA1").is_ok());

        registry.remove("CA1").await;
        assert!(registry.get_or_create("CA2").is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_capacity_holds_under_concurrent_creation() {
        let registry = Arc::new(CallSessionRegistry::new(5, 16));

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(&format!("CA{}", i)).is_ok() })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 5);
        assert_eq!(registry.count(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_creator_reported() {
        let registry = Arc::new(CallSessionRegistry::new(100, 16));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create_with("call-X", None, None).unwrap().1 })
            })
            .collect();

        let mut creators = 0;
        for handle in handles {
            if handle.await.unwrap() {
                creators += 1;
            }
        }
        assert_eq!(creators, 1);
    }

    #[tokio::test]
    async fn test_remove_pushes_end_of_call() {
        let registry = CallSessionRegistry::new(100, 16);
        let session = registry.get_or_create("CA1").unwrap();
        let mut events = session.subscribe();

        assert!(registry.remove("CA1").await.is_some());
        assert!(registry.get("CA1").is_none());
        assert!(session.is_closed());
        assert_eq!(session.relay().pop().await, RelayItem::EndOfCall);
        assert_eq!(events.recv().await.unwrap(), CallEvent::CallEnded);

        assert!(registry.remove("CA1").await.is_none());
        assert!(!session.close().await);
    }

    #[tokio::test]
    async fn test_replace_turn_rejected_after_close() {
        let session = CallSession::new("CA1", None, None, 16);
        session.close().await;

        let result = session
            .replace_turn(|_, _| tokio::spawn(async { TurnOutcome::Empty }))
            .await;
        assert!(matches!(result, Err(PipelineError::CallEnded(_))));
        assert_eq!(session.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_replace_turn_cancels_previous() {
        let session = CallSession::new("CA1", None, None, 16);

        let turn = session
            .replace_turn(|_, cancel| {
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    TurnOutcome::Cancelled
                })
            })
            .await
            .unwrap();
        assert_eq!(turn, 1);

        let turn = session
            .replace_turn(|_, _| tokio::spawn(async { TurnOutcome::Empty }))
            .await
            .unwrap();
        assert_eq!(turn, 2);
        assert_eq!(session.join_active_turn().await, Some(TurnOutcome::Empty));
        assert_eq!(session.join_active_turn().await, None);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let registry = CallSessionRegistry::new(100, 16);
        registry.get_or_create("stale").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        registry.get_or_create("fresh").unwrap();

        let removed = registry.cleanup_expired(Duration::from_millis(20)).await;
        assert_eq!(removed, 1);
        assert!(registry.get("stale").is_none());
        assert!(registry.get("fresh").is_some());
    }

    #[tokio::test]
    async fn test_activity_watch_rearm() {
        let session = CallSession::new("CA1", None, None, 16);
        let watch = session.arm_activity_watch();
        assert!(!watch.is_set());

        session.notify_activity();
        assert!(watch.is_set());

        let fresh = session.arm_activity_watch();
        assert!(!fresh.is_set());
    }
}
