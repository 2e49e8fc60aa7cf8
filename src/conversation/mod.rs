pub mod controller;
pub mod selection;
pub mod store;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::models::chat::{ Message, MessageId, Place };
use crate::stream::IngestState;
use self::selection::{ FocusTransition, SelectionCoordinator };
use self::store::MessageStore;

pub use self::controller::ConversationController;

/// Replaces the assistant bubble when a turn fails.
pub const FAILURE_NOTICE: &str = "Sorry, I couldn't reach Fiora right now. Please try again.";

pub const QUICK_SUGGESTIONS: [&str; 3] = [
    "What are the top 5 drop-off locations?",
    "Where are college kids frequenting on weekdays?",
    "How far are riders normally traveling to get to De Nada?",
];

pub const LOADING_MESSAGES: [&str; 5] = [
    "Checking where everyone's riding…",
    "Analyzing millions of Fetii trips…",
    "Fetii AI is thinking…",
    "Tracking the pulse of the city…",
    "Finding where the crowd's heading…",
];

pub const LOADING_ROTATION_INTERVAL: Duration = Duration::from_millis(3000);

/// Loading line to show `elapsed` into a pending turn, starting from `seed`.
pub fn loading_message(seed: usize, elapsed: Duration) -> &'static str {
    let step = (elapsed.as_millis() / LOADING_ROTATION_INTERVAL.as_millis()) as usize;
    LOADING_MESSAGES[(seed + step) % LOADING_MESSAGES.len()]
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("message id {0} already exists in the conversation")]
    DuplicateId(MessageId),
}

/// Everything the engine knows about the one active conversation.
#[derive(Debug, Default)]
pub struct ConversationState {
    pub(crate) store: MessageStore,
    pub(crate) selection: SelectionCoordinator,
    pub(crate) is_loading: bool,
    /// Bumped on every submit and clear; ingest tasks carrying an older
    /// value may no longer mutate state.
    pub(crate) turn: u64,
    pub(crate) ingest: Option<IngestState>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn selection(&self) -> &SelectionCoordinator {
        &self.selection
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn ingest_state(&self) -> IngestState {
        self.ingest.unwrap_or(IngestState::Idle)
    }

    /// Empties history and selection in one step and invalidates any
    /// in-flight turn.
    pub fn clear(&mut self) {
        self.store.clear();
        self.selection.reset();
        self.is_loading = false;
        self.turn += 1;
        self.ingest = None;
    }

    pub fn view_model(&self) -> ViewModel {
        let active = self.selection.active_message(&self.store);
        let visible_cards: Vec<Place> = match active {
            Some(message) if !self.is_loading => message.places.clone(),
            _ => Vec::new(),
        };
        let visible_map_places: Vec<Place> = visible_cards
            .iter()
            .filter(|p| p.is_mappable())
            .cloned()
            .collect();
        let focus = self.selection.focus(&visible_cards);

        ViewModel {
            messages: self.store.messages().to_vec(),
            is_loading: self.is_loading,
            ingest_state: self.ingest_state(),
            active_message_id: active.map(|m| m.id),
            selected_place_ordinal: self.selection.selected_place_ordinal(),
            show_card_section: !visible_cards.is_empty(),
            visible_cards,
            visible_map_places,
            focus,
        }
    }
}

/// Read-only snapshot handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub ingest_state: IngestState,
    pub active_message_id: Option<MessageId>,
    pub selected_place_ordinal: Option<u32>,
    pub visible_cards: Vec<Place>,
    pub visible_map_places: Vec<Place>,
    pub show_card_section: bool,
    pub focus: Option<FocusTransition>,
}

impl Default for ViewModel {
    fn default() -> Self {
        ConversationState::new().view_model()
    }
}
