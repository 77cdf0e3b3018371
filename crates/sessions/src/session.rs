use crate::turn;
use parking_lot::Mutex;
use ra_domain::{history_role, AgentEvent, EventKind, TurnRequest, TurnStatus};
use ra_domain::{Error, Result};
use ra_providers::ProviderAdapter;
use ra_tools::tool_definitions;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

enum WorkItem {
    Turn(TurnRequest),
    Stop,
}

struct EventBuffer {
    events: VecDeque<AgentEvent>,
    last_event_id: u64,
    max_events: usize,
}

/// Current state of one session, as returned by status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub provider: String,
    pub model_id: String,
    pub busy: bool,
    pub pending_count: usize,
    pub history_size: usize,
    pub last_event_id: u64,
    pub last_turn_id: u64,
}

/// A page of events returned by a (possibly long-polling) events query.
#[derive(Debug, Clone, Serialize)]
pub struct EventsPage {
    pub session_id: String,
    pub events: Vec<AgentEvent>,
    pub last_event_id: u64,
    pub oldest_event_id: u64,
    pub dropped_events: u64,
}

/// Result of a cancel request: there is no hard cancellation of an
/// in-flight model call, only draining the pending-turn queue.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CancelResult {
    pub running: bool,
    pub dropped_pending: usize,
    pub hard_cancel_supported: bool,
}

struct SessionInner {
    session_id: String,
    provider_name: String,
    model_id: String,
    adapter: Arc<dyn ProviderAdapter>,
    tools: Vec<ra_domain::ToolDefinition>,
    workspace_root: PathBuf,
    history: Mutex<Vec<Value>>,
    queue: Mutex<VecDeque<WorkItem>>,
    queue_notify: Notify,
    events: Mutex<EventBuffer>,
    events_notify: Notify,
    busy: AtomicBool,
    turn_counter: AtomicU64,
}

impl SessionInner {
    fn append_event(&self, kind: EventKind, turn_id: Option<u64>) {
        let mut buf = self.events.lock();
        buf.last_event_id += 1;
        let event = AgentEvent::new(buf.last_event_id, self.session_id.clone(), turn_id, kind);
        buf.events.push_back(event);
        while buf.events.len() > buf.max_events {
            buf.events.pop_front();
        }
        drop(buf);
        self.events_notify.notify_waiters();
    }

    fn submit_turn(&self, user_input: &str) -> Result<u64> {
        let text = user_input.trim();
        if text.is_empty() {
            return Err(Error::Other("输入不能为空。".into()));
        }
        let turn_id = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let request = TurnRequest::new(turn_id, text.to_string());
        let queue_size = {
            let mut q = self.queue.lock();
            q.push_back(WorkItem::Turn(request));
            q.len()
        };
        self.queue_notify.notify_one();
        self.append_event(EventKind::TurnEnqueued { queue_size }, Some(turn_id));
        Ok(turn_id)
    }

    fn drop_pending_turns(&self) -> usize {
        let mut q = self.queue.lock();
        let mut dropped = 0;
        let mut reinsert_stop = false;
        while let Some(item) = q.pop_front() {
            match item {
                WorkItem::Turn(_) => dropped += 1,
                WorkItem::Stop => {
                    reinsert_stop = true;
                    break;
                }
            }
        }
        if reinsert_stop {
            q.push_front(WorkItem::Stop);
        }
        dropped
    }

    fn clear(&self) -> (bool, String) {
        let dropped_pending = self.drop_pending_turns();
        if self.busy.load(Ordering::SeqCst) {
            return (false, "当前有请求正在执行，暂不允许清空。".to_string());
        }
        self.history.lock().clear();
        self.append_event(EventKind::SessionCleared { dropped_pending }, None);
        (true, "会话已清空。".to_string())
    }

    fn cancel(&self) -> CancelResult {
        let dropped_pending = self.drop_pending_turns();
        let running = self.busy.load(Ordering::SeqCst);
        self.append_event(
            EventKind::CancelRequested {
                running,
                dropped_pending,
                hard_cancel_supported: false,
            },
            None,
        );
        CancelResult {
            running,
            dropped_pending,
            hard_cancel_supported: false,
        }
    }

    fn status(&self) -> SessionStatus {
        let history_size = self.history.lock().len();
        let pending_count = self.queue.lock().len();
        let buf = self.events.lock();
        SessionStatus {
            session_id: self.session_id.clone(),
            provider: self.provider_name.clone(),
            model_id: self.model_id.clone(),
            busy: self.busy.load(Ordering::SeqCst),
            pending_count,
            history_size,
            last_event_id: buf.last_event_id,
            last_turn_id: self.turn_counter.load(Ordering::SeqCst),
        }
    }

    async fn get_events(&self, after: u64, wait_ms: u64, limit: usize) -> EventsPage {
        let wait = Duration::from_millis(wait_ms);
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.events.lock().last_event_id > after || wait_ms == 0 {
                break;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            let _ = tokio::time::timeout(deadline - now, self.events_notify.notified()).await;
        }

        let buf = self.events.lock();
        let mut events: Vec<AgentEvent> = buf
            .events
            .iter()
            .filter(|e| e.event_id > after)
            .cloned()
            .collect();
        if limit > 0 {
            events.truncate(limit);
        }
        let oldest_event_id = buf.events.front().map(|e| e.event_id).unwrap_or(buf.last_event_id + 1);
        let dropped_events = (oldest_event_id as i64 - after as i64 - 1).max(0) as u64;
        EventsPage {
            session_id: self.session_id.clone(),
            events,
            last_event_id: buf.last_event_id,
            oldest_event_id,
            dropped_events,
        }
    }

    fn rollback_last_user_message(&self) {
        let mut history = self.history.lock();
        if history.last().map(history_role) == Some("user") {
            history.pop();
        }
    }

    async fn execute_turn(self: &Arc<Self>, request: TurnRequest) {
        self.busy.store(true, Ordering::SeqCst);
        let turn_id = request.turn_id;
        self.append_event(
            EventKind::TurnStarted { input: request.user_input.clone() },
            Some(turn_id),
        );
        self.append_event(EventKind::User { text: request.user_input.clone() }, Some(turn_id));

        let mut history_owned = std::mem::take(&mut *self.history.lock());
        let emitter_target = Arc::clone(self);
        let outcome = turn::run_turn(
            self.adapter.as_ref(),
            &self.tools,
            &self.workspace_root,
            &mut history_owned,
            &request.user_input,
            move |kind| emitter_target.append_event(kind, Some(turn_id)),
        )
        .await;
        *self.history.lock() = history_owned;

        let status = match outcome {
            Ok(answer) => {
                self.append_event(EventKind::Answer { text: answer }, Some(turn_id));
                TurnStatus::Completed
            }
            Err(e) => {
                self.rollback_last_user_message();
                self.append_event(
                    EventKind::Error { message: format!("{}: {e}", e.kind()) },
                    Some(turn_id),
                );
                TurnStatus::Failed
            }
        };

        self.busy.store(false, Ordering::SeqCst);
        self.append_event(EventKind::TurnFinished { status }, Some(turn_id));
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let item = loop {
                if let Some(item) = self.queue.lock().pop_front() {
                    break item;
                }
                let _ = tokio::time::timeout(Duration::from_millis(200), self.queue_notify.notified()).await;
            };
            match item {
                WorkItem::Stop => break,
                WorkItem::Turn(request) => self.execute_turn(request).await,
            }
        }
    }
}

/// A single conversation's serial worker: one queue, one history, one
/// monotonic event stream, executed by a single background task so that
/// tool calls against the shared repository never interleave within a
/// session.
pub struct AgentSession {
    inner: Arc<SessionInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AgentSession {
    pub(crate) fn new(
        session_id: String,
        provider_name: String,
        model_id: String,
        adapter: Arc<dyn ProviderAdapter>,
        workspace_root: PathBuf,
        max_events: usize,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            session_id,
            provider_name,
            model_id,
            adapter,
            tools: tool_definitions(),
            workspace_root,
            history: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            events: Mutex::new(EventBuffer {
                events: VecDeque::new(),
                last_event_id: 0,
                max_events,
            }),
            events_notify: Notify::new(),
            busy: AtomicBool::new(false),
            turn_counter: AtomicU64::new(0),
        });
        Self {
            inner,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker task and emit the opening `session_created` event.
    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.worker_loop().await });
        *self.worker.lock() = Some(handle);
        self.inner.append_event(
            EventKind::SessionCreated {
                provider: self.inner.provider_name.clone(),
                model_id: self.inner.model_id.clone(),
            },
            None,
        );
        tracing::info!(session_id = %self.inner.session_id, provider = %self.inner.provider_name, "session started");
    }

    /// Signal the worker to stop after its current turn and wait briefly
    /// for it to exit.
    pub async fn stop(&self) {
        {
            let mut q = self.inner.queue.lock();
            q.push_back(WorkItem::Stop);
        }
        self.inner.queue_notify.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(Duration::from_secs(3), handle).await.is_err() {
                tracing::warn!(session_id = %self.inner.session_id, "worker did not exit within timeout");
            }
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn submit_turn(&self, user_input: &str) -> Result<u64> {
        self.inner.submit_turn(user_input)
    }

    pub fn clear(&self) -> (bool, String) {
        self.inner.clear()
    }

    pub fn cancel(&self) -> CancelResult {
        self.inner.cancel()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status()
    }

    pub async fn get_events(&self, after: u64, wait_ms: u64, limit: usize) -> EventsPage {
        self.inner.get_events(after, wait_ms, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ra_domain::FunctionCallRecord;
    use ra_providers::{InvokeOutcome, RetryNotice};
    use serde_json::json;

    struct EchoAdapter;

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        fn append_user_message(&self, history: &mut Vec<Value>, user_input: &str) {
            history.push(json!({"role": "user", "content": user_input}));
        }

        async fn invoke(
            &self,
            _history: &[Value],
            _tools: &[ra_domain::ToolDefinition],
            _on_retry: &mut dyn FnMut(RetryNotice),
        ) -> Result<InvokeOutcome> {
            Ok(InvokeOutcome {
                text: "hello".to_string(),
                function_calls: vec![],
                assistant_payload: json!({"role": "assistant", "content": "hello"}),
            })
        }

        fn append_tool_results(&self, _history: &mut Vec<Value>, _results: &[(FunctionCallRecord, String)]) {}

        fn append_assistant_text(&self, history: &mut Vec<Value>, text: &str) {
            history.push(json!({"role": "assistant", "content": text}));
        }

        fn model_id(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn submit_turn_then_worker_answers_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let session = AgentSession::new(
            "s1".into(),
            "echo".into(),
            "echo".into(),
            Arc::new(EchoAdapter),
            dir.path().to_path_buf(),
            100,
        );
        session.start();
        session.submit_turn("hi").unwrap();

        let mut page = session.get_events(0, 2000, 0).await;
        // Long-poll once more if the worker hasn't finished the turn yet.
        for _ in 0..20 {
            if page.events.iter().any(|e| matches!(e.kind, EventKind::TurnFinished { .. })) {
                break;
            }
            page = session.get_events(page.last_event_id, 200, 0).await;
        }

        let kinds: Vec<&str> = page
            .events
            .iter()
            .map(|e| match &e.kind {
                EventKind::SessionCreated { .. } => "session_created",
                EventKind::TurnEnqueued { .. } => "turn_enqueued",
                EventKind::TurnStarted { .. } => "turn_started",
                EventKind::User { .. } => "user",
                EventKind::Answer { .. } => "answer",
                EventKind::TurnFinished { .. } => "turn_finished",
                _ => "other",
            })
            .collect();
        assert!(kinds.contains(&"answer"));
        assert!(kinds.contains(&"turn_finished"));
        session.stop().await;
    }

    #[test]
    fn clear_reports_busy_session_cannot_clear() {
        let dir = tempfile::tempdir().unwrap();
        let session = AgentSession::new(
            "s2".into(),
            "echo".into(),
            "echo".into(),
            Arc::new(EchoAdapter),
            dir.path().to_path_buf(),
            100,
        );
        session.inner.busy.store(true, Ordering::SeqCst);
        let (ok, message) = session.clear();
        assert!(!ok);
        assert!(message.contains("正在执行"));
    }
}
