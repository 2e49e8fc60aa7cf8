use futures::StreamExt;
use log::{ debug, error, info };
use std::sync::Arc;
use tokio::sync::{ watch, Mutex };
use tokio::task::JoinHandle;

use super::{ ConversationError, ConversationState, ViewModel, FAILURE_NOTICE };
use crate::backend::ChatBackend;
use crate::llm::extractor::PlaceExtractor;
use crate::models::chat::{ ChatRequest, Message, MessageId, MessageStatus, Place, Role };
use crate::session::SessionIdentity;
use crate::stream::{ IngestState, IngestUpdate, StreamingIngest };
use super::store::MessageStore;

#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    /// Prior turns rendered into the request `context`; 0 sends none.
    pub context_turns: usize,
}

struct Shared {
    conversation: ConversationState,
    ingest_task: Option<JoinHandle<()>>,
}

struct Inner {
    shared: Mutex<Shared>,
    backend: Arc<dyn ChatBackend>,
    extractor: PlaceExtractor,
    session: SessionIdentity,
    options: ControllerOptions,
    updates: watch::Sender<ViewModel>,
}

/// Owns the conversation and is the only writer of its state. Every change is
/// published as a whole `ViewModel` snapshot to subscribers.
#[derive(Clone)]
pub struct ConversationController {
    inner: Arc<Inner>,
}

impl ConversationController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        extractor: PlaceExtractor,
        session: SessionIdentity,
        options: ControllerOptions
    ) -> Self {
        let (updates, _) = watch::channel(ViewModel::default());
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared {
                    conversation: ConversationState::new(),
                    ingest_task: None,
                }),
                backend,
                extractor,
                session,
                options,
                updates,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        self.inner.session.as_str()
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewModel> {
        self.inner.updates.subscribe()
    }

    pub async fn view_model(&self) -> ViewModel {
        self.inner.shared.lock().await.conversation.view_model()
    }

    /// Starts a new turn and returns the id of its assistant placeholder.
    /// Any turn still streaming is superseded: its text stays as last applied
    /// and its stream can no longer touch the conversation.
    pub async fn submit(&self, question: &str) -> Result<MessageId, ConversationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ConversationError::EmptyQuestion);
        }

        let mut shared = self.inner.shared.lock().await;
        if let Some(task) = shared.ingest_task.take() {
            task.abort();
        }

        let state = &mut shared.conversation;
        let superseded: Vec<MessageId> = state.store
            .messages()
            .iter()
            .filter(|m| m.role == Role::Assistant && m.status.is_in_flight())
            .map(|m| m.id)
            .collect();
        for id in superseded {
            info!("Superseding in-flight turn {}", id);
            state.store.update_by_id(id, |m| {
                m.status = MessageStatus::Complete;
            });
        }

        state.turn += 1;
        let turn = state.turn;
        state.selection.reset();

        let context = format_context(&state.store, self.inner.options.context_turns);
        let placeholder = Message::assistant_placeholder();
        let assistant_id = placeholder.id;
        state.store.append(Message::user(question))?;
        state.store.append(placeholder)?;
        state.is_loading = true;
        state.ingest = Some(IngestState::Connecting);
        self.inner.publish(state);

        let request = ChatRequest {
            session_id: self.inner.session.as_str().to_string(),
            chat_input: question.to_string(),
            context,
        };
        info!("Turn {} started (assistant message {})", turn, assistant_id);

        let inner = Arc::clone(&self.inner);
        shared.ingest_task = Some(
            tokio::spawn(async move {
                inner.run_turn(turn, assistant_id, request).await;
            })
        );

        Ok(assistant_id)
    }

    pub async fn select_message(&self, id: MessageId) {
        let mut shared = self.inner.shared.lock().await;
        let state = &mut shared.conversation;
        state.selection.select_message(&state.store, id);
        self.inner.publish(state);
    }

    pub async fn select_place(&self, ordinal: u32) {
        let mut shared = self.inner.shared.lock().await;
        shared.conversation.selection.select_place(ordinal);
        self.inner.publish(&shared.conversation);
    }

    pub async fn deselect_place(&self) {
        let mut shared = self.inner.shared.lock().await;
        shared.conversation.selection.deselect_place();
        self.inner.publish(&shared.conversation);
    }

    pub async fn clear_conversation(&self) {
        let mut shared = self.inner.shared.lock().await;
        if let Some(task) = shared.ingest_task.take() {
            task.abort();
        }
        shared.conversation.clear();
        info!("Conversation cleared");
        self.inner.publish(&shared.conversation);
    }
}

impl Inner {
    fn publish(&self, state: &ConversationState) {
        self.updates.send_replace(state.view_model());
    }

    /// Runs `f` only while `turn` is still the current turn.
    async fn with_turn<F>(&self, turn: u64, f: F) -> bool where F: FnOnce(&mut ConversationState) {
        let mut shared = self.shared.lock().await;
        let state = &mut shared.conversation;
        if state.turn != turn {
            debug!("Turn {} superseded; dropping update", turn);
            return false;
        }
        f(state);
        self.publish(state);
        true
    }

    async fn run_turn(self: Arc<Self>, turn: u64, assistant_id: MessageId, request: ChatRequest) {
        let mut ingest = StreamingIngest::new();
        ingest.start();

        let mut stream = match self.backend.open_stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Turn {} failed to open chat stream: {}", turn, e);
                self.fail_turn(turn, assistant_id).await;
                return;
            }
        };

        ingest.opened();
        let receiving = self.with_turn(turn, |state| {
            state.ingest = Some(IngestState::Receiving);
            state.store.update_by_id(assistant_id, |m| {
                m.status = MessageStatus::Streaming;
            });
        }).await;
        if !receiving {
            return;
        }

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    if let Some(update) = ingest.ingest(&bytes) {
                        if !self.apply_update(turn, assistant_id, update).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    error!("Turn {} chat stream broke: {}", turn, e);
                    ingest.fail();
                    self.fail_turn(turn, assistant_id).await;
                    return;
                }
            }
        }

        let (tail, final_text) = ingest.finish();
        if let Some(update) = tail {
            if !self.apply_update(turn, assistant_id, update).await {
                return;
            }
        }

        let completed = self.with_turn(turn, |state| {
            state.store.update_by_id(assistant_id, |m| {
                m.text = final_text.clone();
                m.status = MessageStatus::Complete;
            });
            state.is_loading = false;
            state.ingest = Some(IngestState::Completed);
        }).await;
        if !completed {
            return;
        }
        info!(
            "Turn {} completed: {} token(s), {} dropped frame(s)",
            turn,
            ingest.token_count(),
            ingest.dropped_frames()
        );

        // Extraction outlives this task so a later submit cannot cancel it.
        let inner = Arc::clone(&self);
        tokio::spawn(async move {
            let places = inner.extractor.extract(&final_text).await;
            inner.attach_places(turn, assistant_id, places).await;
        });
    }

    async fn apply_update(&self, turn: u64, assistant_id: MessageId, update: IngestUpdate) -> bool {
        if update.first_token {
            debug!("Turn {} received first token", turn);
        }
        self.with_turn(turn, |state| {
            state.store.update_by_id(assistant_id, |m| {
                m.text = update.text;
                m.status = MessageStatus::Streaming;
            });
            state.is_loading = false;
        }).await
    }

    async fn fail_turn(&self, turn: u64, assistant_id: MessageId) {
        self.with_turn(turn, |state| {
            state.store.update_by_id(assistant_id, |m| {
                m.text = FAILURE_NOTICE.to_string();
                m.status = MessageStatus::Failed;
                m.places.clear();
            });
            state.is_loading = false;
            state.ingest = Some(IngestState::Failed);
        }).await;
    }

    async fn attach_places(&self, turn: u64, assistant_id: MessageId, places: Vec<Place>) {
        let mut shared = self.shared.lock().await;
        let state = &mut shared.conversation;
        let has_places = !places.is_empty();
        let attached = state.store.update_by_id(assistant_id, |m| {
            m.places = places;
        });
        if !attached {
            debug!("Message {} vanished before extraction finished", assistant_id);
            return;
        }
        if state.turn == turn {
            state.selection.set_active_turn(has_places.then_some(assistant_id));
        }
        self.publish(state);
    }
}

/// Renders the last `turns` finished turns for the webhook `context` field.
/// A turn counts only when its answer completed with text; a failed or
/// unanswered question is left out together with its answer.
fn format_context(store: &MessageStore, turns: usize) -> Option<String> {
    if turns == 0 {
        return None;
    }

    let mut finished: Vec<(&Message, &Message)> = Vec::new();
    let mut question: Option<&Message> = None;
    for msg in store.messages() {
        match msg.role {
            Role::User => {
                question = Some(msg);
            }
            Role::Assistant => {
                let answered = msg.status == MessageStatus::Complete && !msg.text.is_empty();
                if let (Some(q), true) = (question.take(), answered) {
                    finished.push((q, msg));
                }
            }
        }
    }
    if finished.is_empty() {
        return None;
    }

    let start = finished.len().saturating_sub(turns);
    let mut result = String::from("Previous conversation:\n");
    for (question, answer) in &finished[start..] {
        result.push_str(&format!("User: {}\n", question.text));
        result.push_str(&format!("Assistant: {}\n", answer.text));
    }
    Some(result)
}
