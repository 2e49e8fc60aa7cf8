use async_trait::async_trait;
use fiora_engine::backend::{ BackendError, ByteStream, ChatBackend };
use fiora_engine::conversation::controller::ControllerOptions;
use fiora_engine::conversation::{ ConversationController, ConversationError, ViewModel, FAILURE_NOTICE };
use fiora_engine::llm::analysis::{ AnalysisError, TextAnalyzer };
use fiora_engine::llm::extractor::PlaceExtractor;
use fiora_engine::models::analysis::{ AnalysisResult, MapEntry, VisualizationType };
use fiora_engine::models::chat::{ ChatRequest, Message, MessageId, MessageStatus };
use fiora_engine::session::SessionIdentity;
use fiora_engine::stream::format::format_answer;
use fiora_engine::stream::IngestState;
use std::collections::VecDeque;
use std::sync::{ Arc, Mutex };
use std::time::Duration;
use tokio::sync::{ mpsc, watch, Notify };
use tokio_stream::wrappers::ReceiverStream;

type Chunk = Result<Vec<u8>, BackendError>;

enum Script {
    Status(u16),
    Stream(mpsc::Receiver<Chunk>),
}

#[derive(Default)]
struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    /// Queues a streamed response and returns the sender feeding its body.
    fn stream(&self) -> mpsc::Sender<Chunk> {
        let (tx, rx) = mpsc::channel(32);
        self.scripts.lock().unwrap().push_back(Script::Stream(rx));
        tx
    }

    fn status(&self, code: u16) {
        self.scripts.lock().unwrap().push_back(Script::Status(code));
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front().expect("unexpected chat request");
        match script {
            Script::Status(code) => Err(BackendError::Status(code)),
            Script::Stream(rx) => Ok(Box::pin(ReceiverStream::new(rx))),
        }
    }
}

#[derive(Default)]
struct ScriptedAnalyzer {
    results: Mutex<VecDeque<Result<AnalysisResult, ()>>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedAnalyzer {
    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn push(&self, result: Result<AnalysisResult, ()>) {
        self.results.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl TextAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _text: &str) -> Result<AnalysisResult, AnalysisError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(())) => Err(AnalysisError::NoJson),
            None => Ok(AnalysisResult::empty("nothing scripted")),
        }
    }
}

fn entry(name: &str, coords: Option<(f64, f64)>) -> MapEntry {
    MapEntry {
        name: Some(name.to_string()),
        address: Some(format!("{}, Austin, TX", name)),
        formatted_address: None,
        lat: coords.map(|c| c.0),
        lng: coords.map(|c| c.1),
        visits: Some(serde_json::json!(100)),
        category: Some("Nightlife".to_string()),
    }
}

fn map_of(entries: Vec<MapEntry>) -> AnalysisResult {
    AnalysisResult {
        visualization_type: VisualizationType::Map,
        map_data: entries,
        reasoning: None,
    }
}

fn controller(backend: &Arc<ScriptedBackend>, analyzer: &Arc<ScriptedAnalyzer>) -> ConversationController {
    ConversationController::new(
        backend.clone(),
        PlaceExtractor::new(analyzer.clone()),
        SessionIdentity::generate(),
        ControllerOptions::default()
    )
}

async fn wait_until<F>(rx: &mut watch::Receiver<ViewModel>, pred: F) -> ViewModel
    where F: FnMut(&ViewModel) -> bool
{
    tokio::time
        ::timeout(Duration::from_secs(5), rx.wait_for(pred)).await
        .expect("timed out waiting for view model")
        .expect("controller dropped")
        .clone()
}

fn message(vm: &ViewModel, id: MessageId) -> &Message {
    vm.messages
        .iter()
        .find(|m| m.id == id)
        .expect("message missing from view model")
}

async fn send(tx: &mpsc::Sender<Chunk>, line: &str) {
    tx.send(Ok(line.as_bytes().to_vec())).await.expect("ingest stopped reading");
}

/// Runs one turn to completion with the given body lines.
async fn answered_turn(
    ctrl: &ConversationController,
    backend: &ScriptedBackend,
    rx: &mut watch::Receiver<ViewModel>,
    question: &str,
    body: &str
) -> MessageId {
    let tx = backend.stream();
    let id = ctrl.submit(question).await.unwrap();
    send(&tx, body).await;
    drop(tx);
    wait_until(rx, |vm| {
        vm.messages.iter().any(|m| m.id == id && m.status == MessageStatus::Complete)
    }).await;
    id
}

#[tokio::test]
async fn sse_frames_accumulate_and_loading_ends_at_first_token() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let tx = backend.stream();
    let id = ctrl.submit("  top 5 spots ").await.unwrap();

    let vm = ctrl.view_model().await;
    assert!(vm.is_loading);
    assert_eq!(vm.messages.len(), 2);
    assert_eq!(vm.messages[0].text, "top 5 spots");
    assert_eq!(message(&vm, id).status, MessageStatus::Pending);

    send(&tx, "data: Hello\n").await;
    let vm = wait_until(&mut rx, |vm| !vm.is_loading).await;
    assert_eq!(message(&vm, id).text, "Hello");
    assert_eq!(message(&vm, id).status, MessageStatus::Streaming);

    send(&tx, "data: World\n").await;
    let vm = wait_until(&mut rx, |vm| {
        vm.messages.iter().any(|m| m.id == id && m.text == "HelloWorld")
    }).await;
    assert!(!vm.is_loading);

    drop(tx);
    let vm = wait_until(&mut rx, |vm| vm.ingest_state == IngestState::Completed).await;
    assert_eq!(message(&vm, id).text, format_answer("HelloWorld"));
    assert_eq!(message(&vm, id).status, MessageStatus::Complete);

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].chat_input, "top 5 spots");
    assert_eq!(requests[0].session_id, ctrl.session_id());
    assert_eq!(requests[0].context, None);
}

#[tokio::test]
async fn chunking_does_not_change_the_final_text() {
    let body = "data: 1. Wiggle Room\n{\"content\": \" (234 trips)\"}\n{broken\n{\"delta\": \" 2. Aquarium\"}\ntail";
    let mut finals = Vec::new();

    for size in [1, 3, 7, body.len()] {
        let backend = Arc::new(ScriptedBackend::default());
        let analyzer = Arc::new(ScriptedAnalyzer::default());
        let ctrl = controller(&backend, &analyzer);
        let mut rx = ctrl.subscribe();

        let tx = backend.stream();
        let id = ctrl.submit("where?").await.unwrap();
        for chunk in body.as_bytes().chunks(size) {
            tx.send(Ok(chunk.to_vec())).await.unwrap();
        }
        drop(tx);

        let vm = wait_until(&mut rx, |vm| vm.ingest_state == IngestState::Completed).await;
        finals.push(message(&vm, id).text.clone());
    }

    let expected = format_answer("1. Wiggle Room (234 trips) 2. Aquariumtail");
    assert!(finals.iter().all(|t| *t == expected), "{:?}", finals);
}

#[tokio::test]
async fn extracted_places_split_between_cards_and_map() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    analyzer.push(
        Ok(
            map_of(
                vec![
                    entry("Wiggle Room", Some((30.2669, -97.7428))),
                    entry("Shakespeare's", None),
                    entry("Aquarium", Some((30.2671, -97.7391)))
                ]
            )
        )
    );
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let id = answered_turn(&ctrl, &backend, &mut rx, "top 3 bars", "data: Wiggle Room, Shakespeare's, Aquarium\n").await;
    let vm = wait_until(&mut rx, |vm| vm.show_card_section).await;

    assert_eq!(vm.active_message_id, Some(id));
    assert_eq!(vm.visible_cards.len(), 3);
    assert_eq!(vm.visible_map_places.len(), 2);
    assert_eq!(
        vm.visible_cards
            .iter()
            .map(|p| p.ordinal)
            .collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(vm.visible_cards[1].name, "Shakespeare's");
    assert!(vm.visible_map_places.iter().all(|p| p.name != "Shakespeare's"));
    assert_eq!(message(&vm, id).places.len(), 3);
}

#[tokio::test]
async fn non_success_status_fails_the_turn() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    backend.status(502);
    let id = ctrl.submit("top 5 spots").await.unwrap();
    let vm = wait_until(&mut rx, |vm| vm.ingest_state == IngestState::Failed).await;

    let msg = message(&vm, id);
    assert_eq!(msg.text, FAILURE_NOTICE);
    assert_eq!(msg.status, MessageStatus::Failed);
    assert!(msg.places.is_empty());
    assert!(!vm.is_loading);
    assert!(!vm.show_card_section);
}

#[tokio::test]
async fn transport_error_mid_stream_replaces_partial_text() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let tx = backend.stream();
    let id = ctrl.submit("top 5 spots").await.unwrap();
    send(&tx, "data: Partial answ\n").await;
    wait_until(&mut rx, |vm| !vm.is_loading).await;

    tx.send(Err(BackendError::Stream("connection reset".into()))).await.unwrap();
    let vm = wait_until(&mut rx, |vm| vm.ingest_state == IngestState::Failed).await;
    assert_eq!(message(&vm, id).text, FAILURE_NOTICE);

    // The conversation stays usable.
    let next = answered_turn(&ctrl, &backend, &mut rx, "try again", "data: Recovered\n").await;
    let vm = ctrl.view_model().await;
    assert_eq!(message(&vm, next).text, "Recovered");
}

#[tokio::test]
async fn loading_stays_off_while_extraction_is_pending() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::gated(gate.clone()));
    analyzer.push(Ok(map_of(vec![entry("Wiggle Room", Some((30.2669, -97.7428)))])));
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let id = answered_turn(&ctrl, &backend, &mut rx, "where", "data: Wiggle Room\n").await;
    let vm = ctrl.view_model().await;
    assert!(!vm.is_loading);
    assert!(vm.visible_cards.is_empty());
    assert_eq!(vm.active_message_id, None);

    gate.notify_one();
    let vm = wait_until(&mut rx, |vm| vm.show_card_section).await;
    assert!(!vm.is_loading);
    assert_eq!(vm.active_message_id, Some(id));
}

#[tokio::test]
async fn extraction_failure_keeps_the_answer() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    analyzer.push(Err(()));
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let id = answered_turn(&ctrl, &backend, &mut rx, "where", "data: Somewhere nice\n").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let vm = ctrl.view_model().await;
    let msg = message(&vm, id);
    assert_eq!(msg.text, "Somewhere nice");
    assert_eq!(msg.status, MessageStatus::Complete);
    assert!(msg.places.is_empty());
    assert_eq!(vm.active_message_id, None);
}

#[tokio::test]
async fn new_submit_isolates_the_superseded_turn() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let old_tx = backend.stream();
    let old_id = ctrl.submit("first question").await.unwrap();
    send(&old_tx, "data: first\n").await;
    wait_until(&mut rx, |vm| vm.messages.iter().any(|m| m.id == old_id && m.text == "first")).await;

    let new_tx = backend.stream();
    let new_id = ctrl.submit("second question").await.unwrap();
    assert!(ctrl.view_model().await.is_loading);

    // The old stream may already be closed; either way nothing it carries may land.
    let _ = old_tx.send(Ok(b"data: late\n".to_vec())).await;
    send(&new_tx, "data: second\n").await;
    let vm = wait_until(&mut rx, |vm| {
        vm.messages.iter().any(|m| m.id == new_id && m.text == "second")
    }).await;

    assert_eq!(message(&vm, old_id).text, "first");
    assert_eq!(message(&vm, old_id).status, MessageStatus::Complete);
    let in_flight = vm.messages
        .iter()
        .filter(|m| m.status.is_in_flight())
        .count();
    assert_eq!(in_flight, 1);
    assert_eq!(vm.messages.len(), 4);
}

#[tokio::test]
async fn clicking_an_answer_without_places_falls_back_to_latest_with_places() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    analyzer.push(Ok(map_of(vec![entry("Wiggle Room", Some((30.2669, -97.7428)))])));
    analyzer.push(Ok(AnalysisResult::empty("no locations")));
    analyzer.push(Ok(map_of(vec![entry("Aquarium", None), entry("Rainey St", None)])));
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let first = answered_turn(&ctrl, &backend, &mut rx, "q1", "data: Wiggle Room\n").await;
    wait_until(&mut rx, |vm| vm.active_message_id == Some(first)).await;

    let empty = answered_turn(&ctrl, &backend, &mut rx, "q2", "data: 2.8 miles\n").await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let vm = ctrl.view_model().await;
    assert_eq!(vm.active_message_id, Some(first));

    let third = answered_turn(&ctrl, &backend, &mut rx, "q3", "data: Aquarium and Rainey\n").await;
    wait_until(&mut rx, |vm| vm.active_message_id == Some(third)).await;

    ctrl.select_message(first).await;
    assert_eq!(ctrl.view_model().await.active_message_id, Some(first));

    ctrl.select_message(empty).await;
    let vm = ctrl.view_model().await;
    assert_eq!(vm.active_message_id, Some(third));
    assert_eq!(vm.visible_cards.len(), 2);
    assert!(vm.visible_map_places.is_empty());
}

#[tokio::test]
async fn place_focus_follows_selection_rules() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    analyzer.push(
        Ok(
            map_of(
                vec![entry("Wiggle Room", Some((30.2669, -97.7428))), entry("Aquarium", Some((30.2671, -97.7391)))]
            )
        )
    );
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let id = answered_turn(&ctrl, &backend, &mut rx, "q1", "data: two bars\n").await;
    wait_until(&mut rx, |vm| vm.show_card_section).await;

    ctrl.select_place(2).await;
    let vm = ctrl.view_model().await;
    let focus = vm.focus.expect("place 2 is focused");
    assert_eq!(focus.ordinal, 2);
    assert_eq!(focus.coordinates, vm.visible_cards[1].coordinates);
    assert_eq!(vm.active_message_id, Some(id));

    ctrl.deselect_place().await;
    let vm = ctrl.view_model().await;
    assert_eq!(vm.focus, None);
    assert_eq!(vm.active_message_id, Some(id));

    ctrl.select_place(1).await;
    ctrl.select_message(id).await;
    assert_eq!(ctrl.view_model().await.selected_place_ordinal, None);

    ctrl.select_place(1).await;
    let _tx = backend.stream();
    ctrl.submit("q2").await.unwrap();
    let vm = ctrl.view_model().await;
    assert_eq!(vm.selected_place_ordinal, None);
    assert!(vm.is_loading);
    assert!(vm.visible_cards.is_empty());
}

#[tokio::test]
async fn clear_mid_stream_leaves_nothing_behind() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    let tx = backend.stream();
    ctrl.submit("q1").await.unwrap();
    send(&tx, "data: streaming\n").await;
    wait_until(&mut rx, |vm| !vm.is_loading).await;

    ctrl.clear_conversation().await;
    let _ = tx.send(Ok(b"data: ghost\n".to_vec())).await;
    drop(tx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let vm = ctrl.view_model().await;
    assert!(vm.messages.is_empty());
    assert!(!vm.is_loading);
    assert_eq!(vm.active_message_id, None);
    assert_eq!(vm.selected_place_ordinal, None);
    assert_eq!(vm.ingest_state, IngestState::Idle);
}

#[tokio::test]
async fn clear_during_extraction_does_not_resurrect_history() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::gated(gate.clone()));
    analyzer.push(Ok(map_of(vec![entry("Wiggle Room", Some((30.2669, -97.7428)))])));
    let ctrl = controller(&backend, &analyzer);
    let mut rx = ctrl.subscribe();

    answered_turn(&ctrl, &backend, &mut rx, "q1", "data: Wiggle Room\n").await;
    ctrl.clear_conversation().await;
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let vm = ctrl.view_model().await;
    assert!(vm.messages.is_empty());
    assert!(!vm.show_card_section);
}

#[tokio::test]
async fn blank_questions_are_rejected() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = controller(&backend, &analyzer);

    assert_eq!(ctrl.submit("   \n").await, Err(ConversationError::EmptyQuestion));
    assert!(ctrl.view_model().await.messages.is_empty());
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn context_turns_are_sent_with_the_question() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = ConversationController::new(
        backend.clone(),
        PlaceExtractor::new(analyzer.clone()),
        SessionIdentity::generate(),
        ControllerOptions { context_turns: 1 }
    );
    let mut rx = ctrl.subscribe();

    answered_turn(&ctrl, &backend, &mut rx, "q1", "data: a1\n").await;
    answered_turn(&ctrl, &backend, &mut rx, "q2", "data: a2\n").await;

    let requests = backend.requests();
    assert_eq!(requests[0].context, None);
    assert_eq!(requests[1].context.as_deref(), Some("Previous conversation:\nUser: q1\nAssistant: a1\n"));
}

#[tokio::test]
async fn failed_turns_are_not_sent_as_context() {
    let backend = Arc::new(ScriptedBackend::default());
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let ctrl = ConversationController::new(
        backend.clone(),
        PlaceExtractor::new(analyzer.clone()),
        SessionIdentity::generate(),
        ControllerOptions { context_turns: 1 }
    );
    let mut rx = ctrl.subscribe();

    answered_turn(&ctrl, &backend, &mut rx, "q1", "data: a1\n").await;

    backend.status(503);
    ctrl.submit("q2").await.unwrap();
    wait_until(&mut rx, |vm| vm.ingest_state == IngestState::Failed).await;

    answered_turn(&ctrl, &backend, &mut rx, "q3", "data: a3\n").await;

    let requests = backend.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].context.as_deref(), Some("Previous conversation:\nUser: q1\nAssistant: a1\n"));
}
