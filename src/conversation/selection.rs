use std::time::Duration;

use serde::Serialize;

use crate::models::chat::{ Coordinates, Message, MessageId, Place };
use super::store::MessageStore;

/// Shared by the map recenter and the card scroll for one focus change.
pub const FOCUS_ANIMATION: Duration = Duration::from_millis(800);
/// Marker popup opens this far into the focus animation.
pub const POPUP_DELAY: Duration = Duration::from_millis(700);

/// The single place currently focused on both the map and the card list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FocusTransition {
    pub ordinal: u32,
    pub coordinates: Option<Coordinates>,
    pub duration_ms: u64,
    pub popup_delay_ms: u64,
}

impl FocusTransition {
    fn for_place(place: &Place) -> Self {
        Self {
            ordinal: place.ordinal,
            coordinates: place.coordinates,
            duration_ms: FOCUS_ANIMATION.as_millis() as u64,
            popup_delay_ms: POPUP_DELAY.as_millis() as u64,
        }
    }
}

/// Tracks which turn's places are shown and which one of them is focused.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SelectionCoordinator {
    selected_message_id: Option<MessageId>,
    selected_place_ordinal: Option<u32>,
}

impl SelectionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_message_id(&self) -> Option<MessageId> {
        self.selected_message_id
    }

    pub fn selected_place_ordinal(&self) -> Option<u32> {
        self.selected_place_ordinal
    }

    /// Selects `id` only if that message has places; otherwise clears the
    /// message selection so the view falls back to the latest answer with
    /// places. Place focus is always dropped.
    pub fn select_message(&mut self, store: &MessageStore, id: MessageId) {
        self.selected_message_id = store
            .find_by_id(id)
            .filter(|m| m.has_places())
            .map(|m| m.id);
        self.selected_place_ordinal = None;
    }

    /// Used when a turn finishes extraction; does not touch place focus.
    pub fn set_active_turn(&mut self, id: Option<MessageId>) {
        self.selected_message_id = id;
    }

    pub fn select_place(&mut self, ordinal: u32) {
        self.selected_place_ordinal = Some(ordinal);
    }

    pub fn deselect_place(&mut self) {
        self.selected_place_ordinal = None;
    }

    pub fn reset(&mut self) {
        self.selected_message_id = None;
        self.selected_place_ordinal = None;
    }

    /// The explicitly selected message if it still exists and has places,
    /// else the newest answer with places.
    pub fn active_message<'a>(&self, store: &'a MessageStore) -> Option<&'a Message> {
        self.selected_message_id
            .and_then(|id| store.find_by_id(id))
            .filter(|m| m.has_places())
            .or_else(|| store.find_latest_with_places())
    }

    /// Focus resolved against the cards currently shown; a stale ordinal
    /// yields no focus.
    pub fn focus(&self, visible_cards: &[Place]) -> Option<FocusTransition> {
        let ordinal = self.selected_place_ordinal?;
        visible_cards
            .iter()
            .find(|p| p.ordinal == ordinal)
            .map(FocusTransition::for_place)
    }
}
