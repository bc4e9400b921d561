//! Mock implementations for testing
//!
//! These mocks enable integration testing without a real engine. Gates let
//! a test hold a load or a generation open and release it on demand.

use super::{ChatRuntime, SessionEvent};
use crate::engine::{
    ChatTurn, CompletionResult, EngineError, EngineLoader, InferenceEngine, Progress,
    DEFAULT_MODEL_ID,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

/// Progress reported before a load's gate opens
pub const PROGRESS_BEFORE_GATE: &str = "Fetching param cache";
/// Progress reported after it opens
pub const PROGRESS_AFTER_GATE: &str = "Loading model from cache (100%)";

// ============================================================================
// Mock Engine
// ============================================================================

/// Engine that returns queued results and records every request
#[allow(dead_code)]
pub struct MockEngine {
    responses: Mutex<VecDeque<Result<CompletionResult, EngineError>>>,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    /// (model id, turns) for each call
    pub requests: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

#[allow(dead_code)]
impl MockEngine {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            gates: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, text: &str) {
        self.queue_response(CompletionResult::text(text));
    }

    pub fn queue_response(&self, response: CompletionResult) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: EngineError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// The next call blocks until the returned sender fires
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn recorded_requests(&self) -> Vec<(String, Vec<ChatTurn>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceEngine for MockEngine {
    async fn generate(
        &self,
        model_id: &str,
        turns: &[ChatTurn],
    ) -> Result<CompletionResult, EngineError> {
        self.requests
            .lock()
            .unwrap()
            .push((model_id.to_string(), turns.to_vec()));
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::unknown("No mock response queued")))
    }
}

// ============================================================================
// Mock Engine Loader
// ============================================================================

/// Loader that hands out one shared [`MockEngine`]
#[allow(dead_code)]
pub struct MockEngineLoader {
    engine: Arc<MockEngine>,
    failures: Mutex<VecDeque<EngineError>>,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    /// Model id of every load attempt, in start order
    pub loads: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockEngineLoader {
    pub fn new(engine: Arc<MockEngine>) -> Self {
        Self {
            engine,
            failures: Mutex::new(VecDeque::new()),
            gates: Mutex::new(VecDeque::new()),
            loads: Mutex::new(Vec::new()),
        }
    }

    /// The next load to start fails with `error`
    pub fn queue_failure(&self, error: EngineError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// The next load to start blocks until the returned sender fires
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }

    pub fn loaded_models(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngineLoader for MockEngineLoader {
    async fn load(
        &self,
        model_id: &str,
        progress: Progress<'_>,
    ) -> Result<Arc<dyn InferenceEngine>, EngineError> {
        // Outcome and gate belong to the load that starts, not the one that finishes
        self.loads.lock().unwrap().push(model_id.to_string());
        let failure = self.failures.lock().unwrap().pop_front();
        let gate = self.gates.lock().unwrap().pop_front();

        progress(PROGRESS_BEFORE_GATE);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        progress(PROGRESS_AFTER_GATE);

        match failure {
            Some(error) => Err(error),
            None => Ok(self.engine.clone() as Arc<dyn InferenceEngine>),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` until it holds; panics after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 2s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Everything currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Status texts currently buffered on `rx`
pub fn drain_statuses(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<String> {
    drain_events(rx)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Status { text } => Some(text),
            _ => None,
        })
        .collect()
}

/// A runtime on mocks, with a subscription opened before anything happens
pub struct TestChat {
    pub runtime: Arc<ChatRuntime>,
    pub loader: Arc<MockEngineLoader>,
    pub engine: Arc<MockEngine>,
    pub events: broadcast::Receiver<SessionEvent>,
}

#[allow(dead_code)]
impl TestChat {
    pub fn new() -> Self {
        let engine = Arc::new(MockEngine::new());
        let loader = Arc::new(MockEngineLoader::new(engine.clone()));
        let runtime = Arc::new(ChatRuntime::new(loader.clone(), DEFAULT_MODEL_ID));
        let events = runtime.subscribe();
        Self {
            runtime,
            loader,
            engine,
            events,
        }
    }

    /// Default model loaded, event buffer empty
    pub async fn ready() -> Self {
        let mut chat = Self::new();
        assert!(chat.runtime.models.ensure_loaded().await.is_ready());
        chat.drain();
        chat
    }

    pub fn drain(&mut self) -> Vec<SessionEvent> {
        drain_events(&mut self.events)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{CharacterDraft, ProfileError};
    use crate::conversation::{ConversationKey, ConversationTurn};
    use crate::engine::{all_models, ChatRole};
    use crate::lifecycle::ModelState;
    use crate::pipeline::{
        SendOutcome, SendRejection, EMPTY_REPLY_PLACEHOLDER, GENERATION_ERROR_REPLY,
        GENERATION_ERROR_STATUS, THINKING_STATUS,
    };
    use crate::prompt::{NO_CHARACTER_CLAUSE, NO_PERSONA_CLAUSE};
    use crate::runtime::RuntimeError;

    fn draft(name: &str, greeting: Option<&str>) -> CharacterDraft {
        CharacterDraft {
            name: name.to_string(),
            description: format!("{name} description"),
            notes: String::new(),
            greeting: greeting.map(str::to_string),
            avatar: None,
        }
    }

    fn history_lens(events: &[SessionEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::History { turns, .. } => Some(turns.len()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_mock_engine_returns_queue_then_errors() {
        let engine = MockEngine::new();
        engine.queue_reply("Hello");

        let first = engine.generate("m", &[]).await.unwrap();
        assert_eq!(first.first_text(), Some("Hello"));
        assert!(engine.generate("m", &[]).await.is_err());
        assert_eq!(engine.request_count(), 2);
    }

    #[tokio::test]
    async fn test_send_appends_user_then_assistant() {
        let mut chat = TestChat::ready().await;
        chat.engine.queue_reply("Hello!");

        let outcome = chat.runtime.send("  hi  ").await;
        assert_eq!(
            outcome,
            SendOutcome::Replied {
                key: ConversationKey::global(),
                reply: "Hello!".to_string()
            }
        );

        let (key, turns) = chat.runtime.history();
        assert_eq!(key, ConversationKey::global());
        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("Hello!")
            ]
        );

        let requests = chat.engine.recorded_requests();
        assert_eq!(requests.len(), 1);
        let (model_id, sent) = &requests[0];
        assert_eq!(model_id, DEFAULT_MODEL_ID);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].role, ChatRole::System);
        assert!(sent[0].content.contains(NO_CHARACTER_CLAUSE));
        assert!(sent[0].content.contains(NO_PERSONA_CLAUSE));
        assert_eq!(sent[1], ChatTurn::from(&ConversationTurn::user("hi")));

        let events = chat.drain();
        assert_eq!(
            events,
            vec![
                SessionEvent::History {
                    key: ConversationKey::global(),
                    turns: vec![ConversationTurn::user("hi")],
                },
                SessionEvent::Typing { active: true },
                SessionEvent::Status {
                    text: THINKING_STATUS.to_string()
                },
                SessionEvent::History {
                    key: ConversationKey::global(),
                    turns: turns.clone(),
                },
                SessionEvent::Status {
                    text: format!("Model: {DEFAULT_MODEL_ID}")
                },
                SessionEvent::Typing { active: false },
            ]
        );
        assert!(!chat.runtime.is_generating());
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let mut chat = TestChat::ready().await;

        for raw in ["", "   ", "\n\t "] {
            assert_eq!(
                chat.runtime.send(raw).await,
                SendOutcome::Rejected(SendRejection::InvalidInput)
            );
        }
        assert!(chat.runtime.history().1.is_empty());
        assert_eq!(chat.engine.request_count(), 0);
        assert!(chat.drain().is_empty());
    }

    #[tokio::test]
    async fn test_send_before_ready_starts_load_without_mutating() {
        let chat = TestChat::new();

        assert_eq!(
            chat.runtime.send("hi").await,
            SendOutcome::Rejected(SendRejection::EngineNotReady)
        );
        assert!(chat.runtime.history().1.is_empty());
        assert_eq!(chat.engine.request_count(), 0);

        wait_until(|| chat.runtime.is_ready()).await;
        assert_eq!(chat.loader.load_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_error_appends_fixed_reply() {
        let mut chat = TestChat::ready().await;
        chat.engine.queue_error(EngineError::network("connection reset"));

        let outcome = chat.runtime.send("hi").await;
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                key: ConversationKey::global()
            }
        );
        assert_eq!(
            chat.runtime.history().1,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant(GENERATION_ERROR_REPLY)
            ]
        );
        assert!(!chat.runtime.is_generating());

        // The engine stays loaded; no reload is attempted
        assert!(chat.runtime.is_ready());
        assert_eq!(chat.runtime.model_state(), ModelState::Ready);
        assert_eq!(chat.loader.load_count(), 1);

        let statuses = drain_statuses(&mut chat.events);
        assert_eq!(statuses.last(), Some(&GENERATION_ERROR_STATUS.to_string()));
    }

    #[tokio::test]
    async fn test_missing_content_uses_placeholder() {
        let chat = TestChat::ready().await;
        chat.engine.queue_response(CompletionResult::default());

        let outcome = chat.runtime.send("hi").await;
        assert_eq!(
            outcome,
            SendOutcome::Replied {
                key: ConversationKey::global(),
                reply: EMPTY_REPLY_PLACEHOLDER.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_second_send_while_generating_is_rejected() {
        let chat = TestChat::ready().await;
        chat.engine.queue_reply("first");
        let gate = chat.engine.hold_next();

        let runtime = chat.runtime.clone();
        let first = tokio::spawn(async move { runtime.send("one").await });
        wait_until(|| chat.engine.request_count() == 1).await;
        assert!(chat.runtime.is_generating());

        assert_eq!(
            chat.runtime.send("two").await,
            SendOutcome::Rejected(SendRejection::AlreadyGenerating)
        );

        gate.send(()).unwrap();
        assert!(matches!(first.await.unwrap(), SendOutcome::Replied { .. }));
        assert_eq!(
            chat.runtime.history().1,
            vec![
                ConversationTurn::user("one"),
                ConversationTurn::assistant("first")
            ]
        );
        assert_eq!(chat.engine.request_count(), 1);
    }

    #[tokio::test]
    async fn test_reply_lands_in_conversation_captured_at_send() {
        let chat = TestChat::ready().await;
        let aria = chat.runtime.create_character(draft("Aria", None)).unwrap();
        chat.runtime.select_character(Some(aria.id)).unwrap();

        chat.engine.queue_reply("Well met");
        let gate = chat.engine.hold_next();
        let runtime = chat.runtime.clone();
        let pending = tokio::spawn(async move { runtime.send("hello").await });
        wait_until(|| chat.engine.request_count() == 1).await;

        // Switch away mid-generation
        chat.runtime.select_character(None).unwrap();
        gate.send(()).unwrap();

        let aria_key = ConversationKey::for_character(Some(&aria));
        assert_eq!(
            pending.await.unwrap(),
            SendOutcome::Replied {
                key: aria_key.clone(),
                reply: "Well met".to_string()
            }
        );
        assert!(chat.runtime.history().1.is_empty());

        chat.runtime.select_character(Some(aria.id)).unwrap();
        assert_eq!(
            chat.runtime.history(),
            (
                aria_key,
                vec![
                    ConversationTurn::user("hello"),
                    ConversationTurn::assistant("Well met")
                ]
            )
        );
    }

    #[tokio::test]
    async fn test_character_conversations_are_isolated() {
        let chat = TestChat::ready().await;
        let a = chat.runtime.create_character(draft("Aria", None)).unwrap();
        let b = chat.runtime.create_character(draft("Bram", None)).unwrap();

        chat.runtime.select_character(Some(a.id)).unwrap();
        chat.engine.queue_reply("from aria");
        chat.runtime.send("to aria").await;

        chat.runtime.select_character(Some(b.id)).unwrap();
        chat.engine.queue_reply("from bram");
        chat.runtime.send("to bram").await;

        assert_eq!(
            chat.runtime.history().1,
            vec![
                ConversationTurn::user("to bram"),
                ConversationTurn::assistant("from bram")
            ]
        );

        let requests = chat.engine.recorded_requests();
        let (_, bram_request) = &requests[1];
        assert_eq!(bram_request.len(), 2);
        assert!(bram_request[0].content.contains("\"Bram\""));
        assert!(!bram_request[0].content.contains("Aria"));

        chat.runtime.select_character(Some(a.id)).unwrap();
        assert_eq!(chat.runtime.history().1.len(), 2);
    }

    #[tokio::test]
    async fn test_greeting_opens_empty_conversation_once() {
        let mut chat = TestChat::ready().await;
        let bard = chat
            .runtime
            .create_character(draft("Aria", Some("Greetings, traveler.")))
            .unwrap();
        let quiet = chat.runtime.create_character(draft("Mute", None)).unwrap();

        chat.runtime.select_character(Some(bard.id)).unwrap();
        chat.runtime.select_character(Some(bard.id)).unwrap();
        assert_eq!(
            chat.runtime.history().1,
            vec![ConversationTurn::assistant("Greetings, traveler.")]
        );
        assert_eq!(history_lens(&chat.drain()), vec![1, 1]);

        chat.runtime.select_character(Some(quiet.id)).unwrap();
        assert!(chat.runtime.history().1.is_empty());
    }

    #[tokio::test]
    async fn test_selecting_unknown_character_fails() {
        let chat = TestChat::new();
        let id = uuid::Uuid::new_v4();
        assert!(matches!(
            chat.runtime.select_character(Some(id)),
            Err(RuntimeError::UnknownCharacter(missing)) if missing == id
        ));
        assert!(chat.runtime.active_character().is_none());
    }

    #[tokio::test]
    async fn test_persona_reaches_instructions() {
        let chat = TestChat::ready().await;
        chat.runtime
            .save_persona("Sam", "A curious student", None)
            .unwrap();
        chat.engine.queue_reply("ok");
        chat.runtime.send("hi").await;

        let (_, sent) = &chat.engine.recorded_requests()[0];
        assert!(sent[0].content.contains("Name: Sam"));
        assert!(sent[0].content.contains("Description: A curious student"));
        assert!(!sent[0].content.contains(NO_PERSONA_CLAUSE));

        // A blank name clears it
        assert_eq!(chat.runtime.save_persona("  ", "", None).unwrap(), None);
        assert_eq!(chat.runtime.persona(), None);
    }

    #[tokio::test]
    async fn test_created_characters_credit_profile() {
        let chat = TestChat::new();
        let first = chat.runtime.create_character(draft("Aria", None)).unwrap();
        assert_eq!(first.author, "You");

        chat.runtime.save_profile("alex", "").unwrap();
        let second = chat.runtime.create_character(draft("Bram", None)).unwrap();
        assert_eq!(second.author, "alex");
        assert_eq!(chat.runtime.bots_made(), 2);
        assert_eq!(chat.runtime.profile().greeting(), "Hello, alex");

        let err = chat.runtime.create_character(draft("  ", None)).unwrap_err();
        assert!(matches!(err, RuntimeError::Profile(ProfileError::Required { .. })));
        assert_eq!(chat.runtime.bots_made(), 2);
    }

    #[tokio::test]
    async fn test_reply_from_replaced_engine_is_discarded() {
        let chat = TestChat::ready().await;
        chat.engine.queue_reply("too late");
        let gate = chat.engine.hold_next();

        let runtime = chat.runtime.clone();
        let pending = tokio::spawn(async move { runtime.send("hi").await });
        wait_until(|| chat.engine.request_count() == 1).await;

        assert!(chat.runtime.reload_model(true).await.unwrap().is_ready());
        gate.send(()).unwrap();

        assert!(matches!(
            pending.await.unwrap(),
            SendOutcome::Superseded { .. }
        ));
        assert_eq!(
            chat.runtime.history().1,
            vec![ConversationTurn::user("hi")]
        );
        assert!(!chat.runtime.is_generating());
    }

    #[tokio::test]
    async fn test_reply_lands_after_caller_gives_up() {
        let mut chat = TestChat::ready().await;
        chat.engine.queue_reply("late reply");
        let gate = chat.engine.hold_next();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), chat.runtime.send("hi")).await;
        assert!(timed_out.is_err());
        assert!(chat.runtime.is_generating());

        gate.send(()).unwrap();
        wait_until(|| !chat.runtime.is_generating()).await;
        assert_eq!(
            chat.runtime.history().1,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("late reply")
            ]
        );

        let statuses = drain_statuses(&mut chat.events);
        assert_eq!(
            statuses.last().map(String::as_str),
            Some(format!("Model: {DEFAULT_MODEL_ID}").as_str())
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_selects_greet_once() {
        let chat = TestChat::ready().await;
        let bard = chat
            .runtime
            .create_character(draft("Aria", Some("Greetings, traveler.")))
            .unwrap();

        let selects: Vec<_> = (0..8)
            .map(|_| {
                let runtime = chat.runtime.clone();
                tokio::spawn(async move { runtime.select_character(Some(bard.id)) })
            })
            .collect();
        for select in selects {
            select.await.unwrap().unwrap();
        }

        assert_eq!(
            chat.runtime.history().1,
            vec![ConversationTurn::assistant("Greetings, traveler.")]
        );
    }

    #[tokio::test]
    async fn test_model_selection_and_switching() {
        let chat = TestChat::ready().await;
        let other = all_models()[1].id;

        assert!(matches!(
            chat.runtime.switch_model("gpt-9"),
            Err(RuntimeError::UnknownModel(_))
        ));

        // Selecting alone does not load
        chat.runtime.select_model(other).unwrap();
        assert_eq!(chat.loader.load_count(), 1);
        assert!(!chat.runtime.is_ready());
        assert_eq!(chat.runtime.selected_model(), other);

        let state = chat.runtime.switch_model(other).unwrap().await.unwrap();
        assert_eq!(state.model_id(), Some(other));
        assert!(chat.runtime.is_ready());
        assert_eq!(chat.runtime.active_model_id(), other);
        assert_eq!(chat.loader.load_count(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_session() {
        let chat = TestChat::ready().await;
        let aria = chat
            .runtime
            .create_character(draft("Aria", Some("Hi")))
            .unwrap();
        chat.runtime.select_character(Some(aria.id)).unwrap();

        let snapshot = chat.runtime.snapshot();
        assert_eq!(snapshot.key, ConversationKey::for_character(Some(&aria)));
        assert_eq!(snapshot.turns.len(), 1);
        assert_eq!(snapshot.bots_made, 1);
        assert!(snapshot.model_state.is_ready());
        assert!(!snapshot.generating);
    }

    #[test]
    fn test_session_event_wire_shape() {
        let typing = serde_json::to_value(SessionEvent::Typing { active: true }).unwrap();
        assert_eq!(typing, serde_json::json!({"type": "typing", "active": true}));

        let state = serde_json::to_value(SessionEvent::ModelState {
            state: ModelState::Ready {
                model_id: "m".to_string(),
                epoch: 3,
            },
        })
        .unwrap();
        assert_eq!(
            state,
            serde_json::json!({
                "type": "model_state",
                "state": {"type": "ready", "model_id": "m", "epoch": 3}
            })
        );
    }
}
