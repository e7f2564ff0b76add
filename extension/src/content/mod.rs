//! Page-side controller: selection tracking, the rewrite popup and text replacement.

pub mod popup;
pub mod selection;
pub mod splicer;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::background::Background;
use crate::config::ExtensionSettings;
use crate::messages::{ExtensionMessage, GENERIC_FAILURE_MESSAGE};
use crate::page::Document;
use crate::state::{RewriteTicket, SessionState};
use crate::tone::Tone;
use crate::usage::UsageTracker;

pub use popup::{OutputState, PopupController, PopupPanel, PopupPosition, ToneButton};
pub use selection::{Affordance, SelectionDetector, SelectionSnapshot};
pub use splicer::SpliceError;

const ESCAPE_KEY: &str = "Escape";

/// One instance per page. Owns the detector, the popup and the session
/// state, and talks to the background context for rewrites.
pub struct ContentScript {
    detector: SelectionDetector,
    popup: PopupController,
    sessions: SessionState,
    background: Arc<Background>,
    tracker: Arc<UsageTracker>,
}

impl ContentScript {
    pub fn new(
        background: Arc<Background>,
        tracker: Arc<UsageTracker>,
        settings: &ExtensionSettings,
    ) -> Self {
        Self {
            detector: SelectionDetector::new(settings.popup_z_index),
            popup: PopupController::new(settings.popup_z_index),
            sessions: SessionState::new(),
            background,
            tracker,
        }
    }

    pub fn detector(&self) -> &SelectionDetector {
        &self.detector
    }

    pub fn popup(&self) -> &PopupController {
        &self.popup
    }

    pub fn session_snapshot(&self) -> Option<&SelectionSnapshot> {
        self.sessions.current().map(|session| &session.snapshot)
    }

    pub fn handle_selection_change(&mut self, doc: &Document) -> bool {
        self.detector.handle_selection_change(doc)
    }

    /// Click on the floating affordance.
    pub async fn activate_affordance(&mut self, doc: &Document) -> bool {
        let Some(text) = self.detector.snapshot().map(|snapshot| snapshot.text.clone()) else {
            return false;
        };
        self.open_popup(doc, &text).await
    }

    /// Handles messages delivered to this tab; returns whether a popup opened.
    pub async fn handle_message(&mut self, doc: &Document, message: ExtensionMessage) -> bool {
        match message {
            ExtensionMessage::OpenRewritePopup { text } => self.open_popup(doc, &text).await,
            ExtensionMessage::RequestRewrite { .. } => false,
        }
    }

    /// Opens the popup for the last qualifying selection, showing `text` as
    /// the original. Nothing opens without a stored selection.
    pub async fn open_popup(&mut self, doc: &Document, text: &str) -> bool {
        let Some(mut snapshot) = self.detector.snapshot().cloned() else {
            debug!("open requested without a qualifying selection");
            return false;
        };
        snapshot.text = text.to_string();
        let anchor = snapshot.rect;

        self.detector.hide_affordance();
        let generation = self.sessions.start(snapshot);
        let usage = self.usage_label().await;
        self.popup.open(text, anchor, doc.viewport(), usage);
        info!(generation, "rewrite popup opened");
        true
    }

    /// Tone button press. Returns the ticket for the request to run, or
    /// `None` when the popup is closed or a request is already in flight.
    pub fn press_tone(&mut self, tone: Tone) -> Option<RewriteTicket> {
        let ticket = self.sessions.ticket(tone)?;
        if !self.popup.begin_loading(tone) {
            return None;
        }
        debug!(%tone, generation = ticket.generation, "rewrite requested");
        Some(ticket)
    }

    /// Sends the ticket's request to the background context. Returns `None`
    /// when the popup closes first; the pending request is dropped then.
    pub async fn request_rewrite(&self, ticket: &RewriteTicket) -> Option<Result<String, String>> {
        let message = ExtensionMessage::RequestRewrite {
            text: ticket.text.clone(),
            mode: ticket.tone,
        };

        tokio::select! {
            response = self.background.handle_message(message) => Some(match response {
                Some(response) => response.into_outcome(),
                None => Err(GENERIC_FAILURE_MESSAGE.to_string()),
            }),
            _ = ticket.cancel.cancelled() => {
                debug!(generation = ticket.generation, "rewrite request abandoned");
                None
            }
        }
    }

    /// Applies an outcome to the popup. Outcomes for a closed or reopened
    /// popup are dropped and `false` is returned.
    pub async fn finish_rewrite(
        &mut self,
        ticket: &RewriteTicket,
        outcome: Result<String, String>,
    ) -> bool {
        if !self.sessions.is_current(ticket) {
            debug!(generation = ticket.generation, "discarding stale rewrite outcome");
            return false;
        }

        match outcome {
            Ok(text) => {
                self.popup.show_success(text);
                let usage = self.usage_label().await;
                self.popup.set_usage_label(usage);
            }
            Err(message) => self.popup.show_error(message),
        }
        true
    }

    /// Press, request and finish in one step.
    pub async fn rewrite_with_tone(&mut self, tone: Tone) -> bool {
        let Some(ticket) = self.press_tone(tone) else {
            return false;
        };
        let Some(outcome) = self.request_rewrite(&ticket).await else {
            return false;
        };
        self.finish_rewrite(&ticket, outcome).await
    }

    /// Accept button. Splices the last successful rewrite into the page and
    /// closes the popup. On a splice failure the popup stays open showing it.
    pub fn accept(&mut self, doc: &mut Document) -> Result<bool, SpliceError> {
        let Some(text) = self.popup.accepted_text().map(str::to_string) else {
            return Ok(false);
        };
        let Some(session) = self.sessions.current() else {
            return Ok(false);
        };

        if let Err(err) = splicer::replace_selection(doc, &session.snapshot, &text) {
            warn!("failed to apply rewrite to the page: {err}");
            self.popup.show_error(err.to_string());
            return Err(err);
        }

        self.close();
        Ok(true)
    }

    /// Cancel and close buttons.
    pub fn cancel(&mut self) {
        self.close();
    }

    /// Document key handler; Escape closes the popup only while it is shown.
    pub fn handle_key(&mut self, key: &str) -> bool {
        if key == ESCAPE_KEY && self.popup.is_visible() {
            self.close();
            return true;
        }
        false
    }

    fn close(&mut self) {
        self.popup.close();
        self.detector.clear();
        if let Some(session) = self.sessions.end() {
            debug!(generation = session.generation, "rewrite popup closed");
        }
    }

    async fn usage_label(&self) -> String {
        let limit = self.tracker.limit();
        match self.tracker.usage().await {
            Ok(usage) => popup::usage_label(usage.used, limit),
            Err(err) => {
                warn!("failed to read usage for popup: {err}");
                popup::usage_label(0, limit)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::network::RewriteClient;
    use crate::page::{NodeId, Rect};
    use crate::storage::{LocalStore, StorageEntries};
    use crate::usage::{MonthKey, REWRITES_USED_KEY, USAGE_MONTH_KEY};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROFESSIONAL_REWRITE: &str =
        "Dear colleague, hello world Please let me know if you need any further assistance.";

    fn tracker() -> Arc<UsageTracker> {
        let month = MonthKey::new(2026, 10).expect("valid month");
        Arc::new(UsageTracker::with_month_source(
            Arc::new(LocalStore::in_memory()),
            15,
            Arc::new(move || month),
        ))
    }

    fn content_script(endpoint: &str, tracker: Arc<UsageTracker>) -> ContentScript {
        let client = RewriteClient::new(endpoint, Arc::clone(&tracker)).expect("client");
        ContentScript::new(
            Arc::new(Background::new(client)),
            tracker,
            &ExtensionSettings::default(),
        )
    }

    fn textarea_page() -> (Document, NodeId) {
        let mut doc = Document::new();
        let textarea = doc.append_element(doc.body(), "textarea");
        doc.set_field_value(textarea, "Quick note: hello world");
        doc.set_rect(textarea, Rect::new(40.0, 60.0, 400.0, 120.0));
        doc.select_in_field(textarea, 12, 23);
        (doc, textarea)
    }

    async fn professional_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rewrite"))
            .and(body_json(json!({"text": "hello world", "mode": "professional"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "rewrittenText": PROFESSIONAL_REWRITE })),
            )
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn textarea_rewrite_is_accepted_into_field() {
        let server = professional_server().await;
        let tracker = tracker();
        let mut script = content_script(&format!("{}/rewrite", server.uri()), Arc::clone(&tracker));
        let (mut doc, textarea) = textarea_page();

        assert!(script.handle_selection_change(&doc));
        assert!(script.activate_affordance(&doc).await);
        assert!(!script.detector().is_affordance_visible());

        let panel = script.popup().panel().expect("panel");
        assert!(panel.is_visible());
        assert_eq!(panel.original_text(), "hello world");
        assert_eq!(panel.usage_label(), "Usage: 0/15");

        assert!(script.rewrite_with_tone(Tone::Professional).await);
        let panel = script.popup().panel().expect("panel");
        assert_eq!(
            panel.output(),
            &OutputState::Success(PROFESSIONAL_REWRITE.to_string())
        );
        assert!(panel.accept_enabled());
        assert!(panel.tones_enabled());
        assert_eq!(panel.usage_label(), "Usage: 1/15");

        assert_eq!(script.accept(&mut doc), Ok(true));
        assert_eq!(
            doc.field(textarea).expect("field").value,
            format!("Quick note: {PROFESSIONAL_REWRITE}")
        );
        let events: Vec<_> = doc.events().iter().map(|event| event.kind.name()).collect();
        assert_eq!(events, vec!["input", "change"]);
        assert!(!script.popup().is_visible());
        assert!(script.session_snapshot().is_none());
    }

    #[tokio::test]
    async fn exhausted_quota_shows_error_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(LocalStore::in_memory());
        let mut items = StorageEntries::new();
        items.insert(USAGE_MONTH_KEY.to_string(), json!("2026-10"));
        items.insert(REWRITES_USED_KEY.to_string(), json!(15));
        store.set(items).await.expect("seed");
        let month = MonthKey::new(2026, 10).expect("valid month");
        let tracker = Arc::new(UsageTracker::with_month_source(store, 15, Arc::new(move || month)));

        let mut script = content_script(&format!("{}/rewrite", server.uri()), tracker);
        let (doc, _) = textarea_page();
        script.handle_selection_change(&doc);
        assert!(script.activate_affordance(&doc).await);

        assert!(script.rewrite_with_tone(Tone::Clarity).await);
        let panel = script.popup().panel().expect("panel");
        assert_eq!(
            panel.output(),
            &OutputState::Error("Monthly rewrite limit reached (15/15)".to_string())
        );
        assert!(!panel.accept_enabled());
        assert!(panel.tones_enabled());
    }

    #[tokio::test]
    async fn second_tone_press_is_refused_while_loading() {
        let mut script = content_script("http://127.0.0.1:1/rewrite", tracker());
        let (doc, _) = textarea_page();
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;

        let ticket = script.press_tone(Tone::Clarity).expect("first press");
        assert!(script.press_tone(Tone::Friendly).is_none());

        assert!(script.finish_rewrite(&ticket, Err("offline".to_string())).await);
        assert!(script.press_tone(Tone::Friendly).is_some());
    }

    #[tokio::test]
    async fn late_outcome_after_cancel_is_discarded() {
        let mut script = content_script("http://127.0.0.1:1/rewrite", tracker());
        let (mut doc, textarea) = textarea_page();
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;

        let ticket = script.press_tone(Tone::Clarity).expect("press");
        script.cancel();
        assert!(ticket.cancel.is_cancelled());

        assert!(!script.finish_rewrite(&ticket, Ok("late".to_string())).await);
        assert!(!script.popup().is_visible());
        assert_eq!(script.accept(&mut doc), Ok(false));
        assert_eq!(
            doc.field(textarea).expect("field").value,
            "Quick note: hello world"
        );
    }

    #[tokio::test]
    async fn closing_popup_abandons_pending_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rewrite"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "rewrittenText": "too late" }))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let tracker = tracker();
        let mut script = content_script(&format!("{}/rewrite", server.uri()), Arc::clone(&tracker));
        let (doc, _) = textarea_page();
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;
        let ticket = script.press_tone(Tone::Friendly).expect("press");

        let close = ticket.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            close.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), script.request_rewrite(&ticket))
            .await
            .expect("request should stop once the popup closes");
        assert!(outcome.is_none());
        assert_eq!(tracker.usage().await.expect("usage").used, 0);
    }

    #[tokio::test]
    async fn outcome_for_previous_open_does_not_leak_into_new_popup() {
        let mut script = content_script("http://127.0.0.1:1/rewrite", tracker());
        let (mut doc, textarea) = textarea_page();
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;
        let stale = script.press_tone(Tone::Clarity).expect("press");
        script.cancel();

        doc.select_in_field(textarea, 0, 10);
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;

        assert!(!script.finish_rewrite(&stale, Ok("stale".to_string())).await);
        let panel = script.popup().panel().expect("panel");
        assert_eq!(panel.output(), &OutputState::Prompt);
        assert_eq!(panel.original_text(), "Quick note");
    }

    #[tokio::test]
    async fn escape_closes_only_visible_popup() {
        let mut script = content_script("http://127.0.0.1:1/rewrite", tracker());
        assert!(!script.handle_key("Escape"));

        let (doc, _) = textarea_page();
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;
        assert!(!script.handle_key("Enter"));
        assert!(script.popup().is_visible());

        assert!(script.handle_key("Escape"));
        assert!(!script.popup().is_visible());
        assert!(script.session_snapshot().is_none());
        assert!(!script.handle_key("Escape"));
    }

    #[tokio::test]
    async fn context_menu_message_opens_with_its_text() {
        let mut script = content_script("http://127.0.0.1:1/rewrite", tracker());
        let (doc, _) = textarea_page();

        let message = ExtensionMessage::OpenRewritePopup {
            text: "hello world".to_string(),
        };
        assert!(!script.handle_message(&doc, message.clone()).await);

        script.handle_selection_change(&doc);
        assert!(script.handle_message(&doc, message).await);
        assert_eq!(
            script.session_snapshot().map(|snapshot| snapshot.text.as_str()),
            Some("hello world")
        );
    }

    #[tokio::test]
    async fn popup_session_survives_selection_collapse() {
        let server = professional_server().await;
        let mut script = content_script(&format!("{}/rewrite", server.uri()), tracker());
        let (mut doc, textarea) = textarea_page();
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;

        // Clicking into the popup collapses the page selection.
        doc.select_in_field(textarea, 3, 3);
        assert!(!script.handle_selection_change(&doc));
        assert!(script.detector().snapshot().is_none());

        assert!(script.rewrite_with_tone(Tone::Professional).await);
        assert_eq!(script.accept(&mut doc), Ok(true));
        assert_eq!(
            doc.field(textarea).expect("field").value,
            format!("Quick note: {PROFESSIONAL_REWRITE}")
        );
    }

    #[tokio::test]
    async fn accept_into_removed_editor_keeps_popup_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rewrite"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rewrittenText": "[Clear] draft (This has been clarified for better understanding.)"
            })))
            .mount(&server)
            .await;

        let mut script = content_script(&format!("{}/rewrite", server.uri()), tracker());
        let mut doc = Document::new();
        let editor = doc.append_element(doc.body(), "div");
        doc.set_attribute(editor, "contenteditable", "true");
        let text = doc.append_text(editor, "draft text");
        doc.select_text(text, 0, text, 5);
        script.handle_selection_change(&doc);
        script.activate_affordance(&doc).await;
        assert!(script.rewrite_with_tone(Tone::Clarity).await);

        doc.remove(editor);
        assert_eq!(script.accept(&mut doc), Err(SpliceError::Detached));

        let panel = script.popup().panel().expect("panel");
        assert!(panel.is_visible());
        assert!(!panel.accept_enabled());
        assert!(matches!(panel.output(), OutputState::Error(_)));

        script.cancel();
        assert!(!script.popup().is_visible());
    }
}
