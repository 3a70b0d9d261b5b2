//! End-to-end protocol scenarios
//!
//! Each test mounts a widget, runs its loop on a task and plays the parent
//! page through the [`ParentWindow`] half of the channel.
//! Tests cover:
//! - Ping/pong on a reply port
//! - Login and logout confirmation, including replays
//! - Untrusted origins
//! - Single-turn admission under a burst of `postText`
//! - Backend failures
//! - Live chat and utterance history transitions

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use widget_core::orchestrator::GENERIC_ERROR_TEXT;
use widget_core::{
    BackendError, CredentialStore, DialogBackend, EntryKind, LiveChatStatus, ParentWindow,
    Session, SessionError, SessionMachine, TemplateKind, TurnReply, TurnRequest, UserAction,
    Widget, WidgetConfig, WidgetError, WidgetHandle, WidgetMessage,
};

const PARENT: &str = "https://www.example.com";

// =============================================================================
// Backends
// =============================================================================

/// Counts calls and holds every turn until a permit is released
struct GatedCounters {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Semaphore,
}

impl GatedCounters {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }
}

struct GatedBackend(Arc<GatedCounters>);

#[async_trait]
impl DialogBackend for GatedBackend {
    fn name(&self) -> &str {
        "Gated"
    }

    async fn send_turn(&self, request: TurnRequest) -> Result<TurnReply, BackendError> {
        let counters = &self.0;
        counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let permit = counters
            .gate
            .acquire()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;
        permit.forget();

        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(TurnReply {
            reply_text: format!("answer to {}", request.text),
            ..Default::default()
        })
    }
}

struct FailingBackend;

#[async_trait]
impl DialogBackend for FailingBackend {
    fn name(&self) -> &str {
        "Failing"
    }

    async fn send_turn(&self, _request: TurnRequest) -> Result<TurnReply, BackendError> {
        Err(BackendError::Network("connection refused".to_string()))
    }
}

struct TemplateBackend;

#[async_trait]
impl DialogBackend for TemplateBackend {
    fn name(&self) -> &str {
        "Template"
    }

    async fn send_turn(&self, _request: TurnRequest) -> Result<TurnReply, BackendError> {
        let template = json!({
            "templateType": "QuickReply",
            "data": { "content": {
                "title": "Pick one",
                "elements": [{ "title": "Yes" }, { "title": "No" }]
            } }
        });
        Ok(TurnReply {
            reply_text: template.to_string(),
            ..Default::default()
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

fn config() -> WidgetConfig {
    let mut config = WidgetConfig::default();
    config.channel.allowed_origins = vec![PARENT.to_string()];
    config.enable_live_chat = true;
    config
}

struct Mounted<B: DialogBackend + 'static> {
    parent: ParentWindow,
    handle: WidgetHandle,
    credentials: Arc<CredentialStore>,
    task: JoinHandle<Widget<B>>,
}

fn mount<B: DialogBackend + 'static>(backend: B) -> Mounted<B> {
    let credentials = Arc::new(CredentialStore::default());
    let (mut widget, parent, handle) =
        Widget::with_credentials(&config(), backend, Arc::clone(&credentials));
    let task = tokio::spawn(async move {
        widget.run().await;
        widget
    });
    Mounted {
        parent,
        handle,
        credentials,
        task,
    }
}

impl<B: DialogBackend + 'static> Mounted<B> {
    async fn ask(&self, data: Value) -> Value {
        let rx = self.parent.post_with_port(PARENT, data).await.unwrap();
        rx.await.unwrap()
    }

    fn state(&self) -> watch::Receiver<Session> {
        self.handle.state()
    }

    async fn wait_idle(&self) {
        let mut state = self.state();
        state.wait_for(|s| !s.is_processing()).await.unwrap();
    }

    async fn unmount(self) -> Widget<B> {
        self.handle.unmount().await.unwrap();
        self.task.await.unwrap()
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_ping_with_port_gets_exactly_one_pong() {
    let mut mounted = mount(FailingBackend);

    let reply = mounted.ask(json!({ "event": "ping" })).await;
    assert_eq!(reply, json!({ "event": "pong" }));

    // Barrier: a second exchange proves the first produced nothing else.
    mounted.ask(json!({ "event": "ping" })).await;
    assert!(mounted.parent.try_recv().is_none());
}

#[tokio::test]
async fn test_ping_from_component_posts_outbound_pong() {
    let mut mounted = mount(FailingBackend);

    mounted
        .parent
        .component_event(json!({ "event": "ping" }))
        .await
        .unwrap();
    let post = mounted.parent.recv().await.unwrap();
    assert_eq!(post.message, WidgetMessage::Pong);
}

#[tokio::test]
async fn test_confirm_login_sets_token() {
    let mounted = mount(FailingBackend);

    let reply = mounted
        .ask(json!({ "event": "confirmLogin", "data": { "token": "abc" } }))
        .await;
    assert_eq!(reply, json!({ "event": "resolve", "type": "confirmLogin" }));

    assert!(mounted.state().borrow().is_logged_in);
    assert_eq!(mounted.credentials.snapshot().tokens.id_token, "abc");
}

#[tokio::test]
async fn test_double_logout_is_idempotent() {
    let mounted = mount(FailingBackend);
    mounted
        .ask(json!({ "event": "confirmLogin", "data": { "token": "abc" } }))
        .await;

    mounted.ask(json!({ "event": "confirmLogout" })).await;
    let after_first = mounted.state().borrow().clone();
    mounted.ask(json!({ "event": "confirmLogout" })).await;

    assert!(!mounted.state().borrow().is_logged_in);
    assert_eq!(*mounted.state().borrow(), after_first);
    assert!(mounted.credentials.is_cleared());
}

#[tokio::test]
async fn test_untrusted_origin_dropped_without_reply() {
    let mounted = mount(FailingBackend);
    let before = mounted.state().borrow().clone();

    let rx = mounted
        .parent
        .post_with_port(
            "https://evil.example.com",
            json!({ "event": "confirmLogin", "data": { "token": "stolen" } }),
        )
        .await
        .unwrap();
    assert!(rx.await.is_err(), "no reply may be posted to an untrusted sender");

    // Barrier: later trusted traffic is still served, in order.
    mounted.ask(json!({ "event": "ping" })).await;
    assert_eq!(*mounted.state().borrow(), before);
    assert!(mounted.credentials.is_cleared());
}

#[tokio::test]
async fn test_post_text_burst_admits_one_turn() {
    let counters = Arc::new(GatedCounters::new());
    let mounted = mount(GatedBackend(Arc::clone(&counters)));

    let mut replies = Vec::new();
    for i in 0..5 {
        replies.push(
            mounted
                .ask(json!({ "event": "postText", "data": { "message": format!("msg {i}") } }))
                .await,
        );
    }

    assert_eq!(replies[0], json!({ "event": "resolve", "type": "postText" }));
    for reply in &replies[1..] {
        assert_eq!(reply["event"], "reject");
        assert_eq!(reply["error"], SessionError::AlreadyProcessing.to_string());
    }
    assert_eq!(mounted.state().borrow().utterance_history, vec!["msg 0"]);

    counters.gate.add_permits(1);
    mounted.wait_idle().await;

    let reply = mounted
        .ask(json!({ "event": "postText", "data": { "message": "again" } }))
        .await;
    assert_eq!(reply["event"], "resolve");
    counters.gate.add_permits(1);
    mounted.wait_idle().await;

    assert_eq!(counters.calls.load(Ordering::SeqCst), 2);
    assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);

    let widget = mounted.unmount().await;
    let texts: Vec<_> = widget
        .transcript()
        .entries()
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(texts, vec!["msg 0", "answer to msg 0", "again", "answer to again"]);
}

#[tokio::test]
async fn test_network_error_returns_to_idle() {
    let mounted = mount(FailingBackend);
    let attributes_before = mounted.state().borrow().session_attributes.clone();

    let reply = mounted
        .ask(json!({ "event": "postText", "data": { "message": "hello" } }))
        .await;
    assert_eq!(reply["event"], "resolve");
    mounted.wait_idle().await;

    assert_eq!(mounted.state().borrow().session_attributes, attributes_before);
    let widget = mounted.unmount().await;
    let last = widget.transcript().last().unwrap();
    assert_eq!(last.kind, EntryKind::Error);
    assert_eq!(last.text, GENERIC_ERROR_TEXT);
}

#[tokio::test]
async fn test_interactive_reply_parsed() {
    let mounted = mount(TemplateBackend);
    mounted
        .ask(json!({ "event": "postText", "message": "options?" }))
        .await;
    mounted.wait_idle().await;

    let widget = mounted.unmount().await;
    let entry = widget.transcript().last().unwrap();
    assert_eq!(entry.kind, EntryKind::Bot);
    let interactive = entry.interactive.as_ref().unwrap();
    assert_eq!(interactive.template_kind(), TemplateKind::QuickReply);
    assert_eq!(interactive.choices().len(), 2);
}

#[tokio::test]
async fn test_unmount_clears_credentials_and_stops() {
    let mounted = mount(FailingBackend);
    mounted
        .ask(json!({ "event": "confirmLogin", "data": { "token": "abc" } }))
        .await;
    let credentials = Arc::clone(&mounted.credentials);
    let handle = mounted.handle.clone();

    let state = mounted.state();
    let widget = mounted.unmount().await;
    assert!(!widget.is_mounted());
    assert!(credentials.is_cleared());
    assert!(!widget.session().session().is_logged_in);
    assert!(!state.borrow().is_logged_in);
    drop(widget);
    assert!(matches!(
        handle.act(UserAction::ToggleSfx).await,
        Err(WidgetError::Unmounted)
    ));
}

#[tokio::test]
async fn test_live_chat_double_enter() {
    let (mut widget, mut parent, _handle) = Widget::new(&config(), FailingBackend);

    widget.perform(UserAction::RequestLiveChat).unwrap();
    let second = widget.perform(UserAction::RequestLiveChat);
    assert!(matches!(
        second,
        Err(WidgetError::Session(SessionError::InvalidTransition { .. }))
    ));
    assert_eq!(
        widget.session().session().live_chat_status,
        LiveChatStatus::Connecting
    );

    assert_eq!(parent.recv().await.unwrap().message, WidgetMessage::RequestLiveChat);
    assert!(parent.try_recv().is_none());
}

#[test]
fn test_push_pop_utterance_round_trip() {
    let mut machine = SessionMachine::new();
    machine.push_utterance("first");
    let before = machine.session().utterance_history.clone();

    machine.push_utterance("hi");
    assert_eq!(machine.pop_utterance().as_deref(), Some("hi"));
    assert_eq!(machine.session().utterance_history, before);

    machine.pop_utterance();
    assert_eq!(machine.pop_utterance(), None);
}
