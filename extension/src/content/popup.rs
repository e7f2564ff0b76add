use tracing::debug;

use crate::page::{Rect, Viewport};
use crate::tone::Tone;

pub const POPUP_WIDTH: f64 = 420.0;
/// Approximate rendered height used for overflow decisions.
pub const POPUP_HEIGHT: f64 = 500.0;
pub const POPUP_MARGIN: f64 = 16.0;
pub const PROMPT_MESSAGE: &str = "Select a tone to rewrite";
pub const LOADING_MESSAGE: &str = "Rewriting...";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputState {
    Prompt,
    Loading,
    Success(String),
    Error(String),
}

impl OutputState {
    pub fn message(&self) -> &str {
        match self {
            OutputState::Prompt => PROMPT_MESSAGE,
            OutputState::Loading => LOADING_MESSAGE,
            OutputState::Success(text) | OutputState::Error(text) => text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneButton {
    pub tone: Tone,
    pub label: &'static str,
    pub icon: &'static str,
    pub enabled: bool,
}

impl ToneButton {
    fn new(tone: Tone) -> Self {
        Self {
            tone,
            label: tone.label(),
            icon: tone.icon(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopupPosition {
    pub top: f64,
    pub left: f64,
}

#[derive(Debug, Clone)]
pub struct PopupPanel {
    visible: bool,
    original_text: String,
    output: OutputState,
    tone_buttons: [ToneButton; 3],
    accept_enabled: bool,
    usage_label: String,
    position: PopupPosition,
    z_index: i64,
}

impl PopupPanel {
    fn new(z_index: i64) -> Self {
        Self {
            visible: false,
            original_text: String::new(),
            output: OutputState::Prompt,
            tone_buttons: Tone::ALL.map(ToneButton::new),
            accept_enabled: false,
            usage_label: String::new(),
            position: PopupPosition {
                top: POPUP_MARGIN,
                left: POPUP_MARGIN,
            },
            z_index,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn original_text(&self) -> &str {
        &self.original_text
    }

    pub fn output(&self) -> &OutputState {
        &self.output
    }

    pub fn tone_buttons(&self) -> &[ToneButton] {
        &self.tone_buttons
    }

    /// Whether every tone button accepts a press.
    pub fn tones_enabled(&self) -> bool {
        self.tone_buttons.iter().all(|button| button.enabled)
    }

    fn set_tones_enabled(&mut self, enabled: bool) {
        for button in &mut self.tone_buttons {
            button.enabled = enabled;
        }
    }

    pub fn accept_enabled(&self) -> bool {
        self.accept_enabled
    }

    pub fn usage_label(&self) -> &str {
        &self.usage_label
    }

    pub fn position(&self) -> PopupPosition {
        self.position
    }

    pub fn z_index(&self) -> i64 {
        self.z_index
    }
}

pub fn usage_label(used: u32, limit: u32) -> String {
    format!("Usage: {used}/{limit}")
}

/// Places the panel below the anchor, flipping above it when it would run
/// past the bottom of the viewport and clamping it to the margins.
pub fn position_popup(anchor: Rect, viewport: Viewport) -> PopupPosition {
    let mut top = anchor.bottom + viewport.scroll_y + POPUP_MARGIN;
    let mut left = anchor.left + viewport.scroll_x;

    if left + POPUP_WIDTH > viewport.inner_width {
        left = viewport.inner_width - POPUP_WIDTH - POPUP_MARGIN;
    }
    if left < POPUP_MARGIN {
        left = POPUP_MARGIN;
    }

    if top + POPUP_HEIGHT > viewport.inner_height + viewport.scroll_y {
        top = anchor.top + viewport.scroll_y - POPUP_HEIGHT - POPUP_MARGIN;
    }
    if top < POPUP_MARGIN {
        top = POPUP_MARGIN;
    }

    PopupPosition { top, left }
}

/// The rewrite panel. One panel is created on first open and reused.
pub struct PopupController {
    panel: Option<PopupPanel>,
    z_index: i64,
}

impl PopupController {
    pub fn new(z_index: i64) -> Self {
        Self {
            panel: None,
            z_index,
        }
    }

    pub fn panel(&self) -> Option<&PopupPanel> {
        self.panel.as_ref()
    }

    pub fn is_visible(&self) -> bool {
        self.panel.as_ref().is_some_and(PopupPanel::is_visible)
    }

    pub fn open(&mut self, text: &str, anchor: Rect, viewport: Viewport, usage: String) {
        let panel = self.panel_mut();
        panel.original_text = text.to_string();
        panel.output = OutputState::Prompt;
        panel.accept_enabled = false;
        panel.set_tones_enabled(true);
        panel.usage_label = usage;
        panel.position = position_popup(anchor, viewport);
        panel.visible = true;
        debug!(top = panel.position.top, left = panel.position.left, "popup opened");
    }

    /// Switches to the loading state for a press of `tone`; refused while
    /// hidden or while that button is disabled by a request in flight.
    pub fn begin_loading(&mut self, tone: Tone) -> bool {
        let Some(panel) = self.panel.as_mut() else {
            return false;
        };
        let pressable = panel
            .tone_buttons
            .iter()
            .any(|button| button.tone == tone && button.enabled);
        if !panel.visible || !pressable {
            return false;
        }

        panel.output = OutputState::Loading;
        panel.set_tones_enabled(false);
        panel.accept_enabled = false;
        true
    }

    pub fn show_success(&mut self, text: String) {
        if let Some(panel) = self.panel.as_mut() {
            panel.output = OutputState::Success(text);
            panel.accept_enabled = true;
            panel.set_tones_enabled(true);
        }
    }

    pub fn show_error(&mut self, message: String) {
        if let Some(panel) = self.panel.as_mut() {
            panel.output = OutputState::Error(message);
            panel.accept_enabled = false;
            panel.set_tones_enabled(true);
        }
    }

    pub fn set_usage_label(&mut self, label: String) {
        if let Some(panel) = self.panel.as_mut() {
            panel.usage_label = label;
        }
    }

    /// Rewritten text that accept would apply, if accept is enabled.
    pub fn accepted_text(&self) -> Option<&str> {
        let panel = self.panel.as_ref()?;
        match &panel.output {
            OutputState::Success(text) if panel.visible && panel.accept_enabled => {
                Some(text.as_str())
            }
            _ => None,
        }
    }

    pub fn close(&mut self) {
        if let Some(panel) = self.panel.as_mut() {
            panel.visible = false;
            panel.accept_enabled = false;
        }
    }

    fn panel_mut(&mut self) -> &mut PopupPanel {
        let z_index = self.z_index;
        self.panel.get_or_insert_with(|| PopupPanel::new(z_index))
    }
}
