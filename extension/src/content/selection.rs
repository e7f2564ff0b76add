use tracing::debug;

use crate::page::{Document, NodeId, Range, Rect, Viewport};

/// Distance below the selection's bottom edge.
pub const AFFORDANCE_OFFSET_Y: f64 = 5.0;
/// Half the affordance width, so it centers on the selection's right edge.
pub const AFFORDANCE_OFFSET_X: f64 = 14.0;

/// Everything needed to show and later replace one qualifying selection.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub text: String,
    pub element: NodeId,
    pub range: Range,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affordance {
    pub visible: bool,
    pub top: f64,
    pub left: f64,
    pub z_index: i64,
}

pub struct SelectionDetector {
    snapshot: Option<SelectionSnapshot>,
    affordance: Option<Affordance>,
    z_index: i64,
}

impl SelectionDetector {
    pub fn new(popup_z_index: i64) -> Self {
        Self {
            snapshot: None,
            affordance: None,
            z_index: popup_z_index.saturating_sub(1),
        }
    }

    pub fn snapshot(&self) -> Option<&SelectionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn affordance(&self) -> Option<&Affordance> {
        self.affordance.as_ref()
    }

    pub fn is_affordance_visible(&self) -> bool {
        self.affordance.is_some_and(|affordance| affordance.visible)
    }

    /// Re-evaluates the document selection and returns whether the
    /// affordance is now shown.
    pub fn handle_selection_change(&mut self, doc: &Document) -> bool {
        let Some(range) = doc.selection().copied() else {
            self.reset();
            return false;
        };

        if range.is_collapsed() {
            self.reset();
            return false;
        }

        let text = match doc.range_text(&range) {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                debug!("ignoring unresolvable selection: {err}");
                self.reset();
                return false;
            }
        };
        if text.is_empty() {
            self.reset();
            return false;
        }

        let Some(element) = anchor_element(doc, range.start.node) else {
            self.reset();
            return false;
        };

        if !is_editable_element(doc, element) {
            debug!(?element, "selection anchored outside an editable surface");
            self.reset();
            return false;
        }

        let rect = range.bounding_rect(doc);
        let (top, left) = affordance_position(rect, doc.viewport());
        self.affordance = Some(Affordance {
            visible: true,
            top,
            left,
            z_index: self.z_index,
        });
        self.snapshot = Some(SelectionSnapshot {
            text,
            element,
            range,
            rect,
        });
        true
    }

    pub fn hide_affordance(&mut self) {
        if let Some(affordance) = self.affordance.as_mut() {
            affordance.visible = false;
        }
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
    }

    fn reset(&mut self) {
        self.hide_affordance();
        self.clear();
    }
}

/// Element that owns a selection anchored at `node`.
pub fn anchor_element(doc: &Document, node: NodeId) -> Option<NodeId> {
    doc.element_for(node)
}

pub fn is_editable_element(doc: &Document, element: NodeId) -> bool {
    match doc.tag_name(element) {
        Some("textarea") => return true,
        Some("input") => {
            let input_type = doc
                .attribute(element, "type")
                .map(|value| value.trim().to_ascii_lowercase());
            if matches!(input_type.as_deref(), None | Some("") | Some("text") | Some("email")) {
                return true;
            }
        }
        _ => {}
    }

    doc.is_content_editable(element) || is_inside_content_editable(doc, element)
}

pub fn is_inside_content_editable(doc: &Document, element: NodeId) -> bool {
    let mut current = doc.parent_element(element);
    while let Some(id) = current {
        if doc.is_content_editable(id) {
            return true;
        }
        current = doc.parent_element(id);
    }
    false
}

/// Page coordinates of the affordance for a selection box in viewport coordinates.
pub fn affordance_position(rect: Rect, viewport: Viewport) -> (f64, f64) {
    (
        rect.bottom + viewport.scroll_y + AFFORDANCE_OFFSET_Y,
        rect.right + viewport.scroll_x - AFFORDANCE_OFFSET_X,
    )
}
