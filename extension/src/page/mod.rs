//! In-memory page document the content script observes and edits.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a node only
//! unlinks it from its parent, so stale ids stay resolvable and can be tested
//! with [`Document::is_connected`].

mod range;

use std::collections::BTreeMap;

pub use range::{Boundary, Range, RangeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Layout box in viewport (client) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub inner_width: f64,
    pub inner_height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            inner_width: 1280.0,
            inner_height: 800.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// Value and selection offsets of a native `<input>` or `<textarea>`.
///
/// Offsets count characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextField {
    pub value: String,
    pub selection_start: usize,
    pub selection_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Input,
    Change,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::Input => "input",
            EventKind::Change => "change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub target: NodeId,
    pub kind: EventKind,
    pub bubbles: bool,
}

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    attributes: BTreeMap<String, String>,
    field: Option<TextField>,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    rect: Rect,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
    selection: Option<Range>,
    viewport: Viewport,
    events: Vec<DispatchedEvent>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let body = Node {
            data: NodeData::Element(Element {
                tag: "body".to_string(),
                attributes: BTreeMap::new(),
                field: None,
            }),
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
        };

        Self {
            nodes: vec![body],
            body: NodeId(0),
            selection: None,
            viewport: Viewport::default(),
            events: Vec::new(),
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Appends a new element; `input` and `textarea` elements get an empty field.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let tag = tag.to_ascii_lowercase();
        let field = matches!(tag.as_str(), "input" | "textarea").then(TextField::default);
        let id = self.push_node(NodeData::Element(Element {
            tag,
            attributes: BTreeMap::new(),
            field,
        }));
        self.append_child(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    /// Creates a text node that is not yet attached anywhere.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    pub fn set_attribute(&mut self, element: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element(data)) = self.data_mut(element) {
            data.attributes
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        match self.data(element)? {
            NodeData::Element(data) => data
                .attributes
                .get(&name.to_ascii_lowercase())
                .map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Element(data) => Some(data.tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.data(node), Some(NodeData::Element(_)))
    }

    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.data(node), Some(NodeData::Text(_)))
    }

    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.data(node)? {
            NodeData::Text(text) => Some(text.as_str()),
            NodeData::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if let Some(NodeData::Text(current)) = self.data_mut(node) {
            *current = text.to_string();
        }
    }

    /// Concatenated text of `node` and its descendants in document order.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut content = String::new();
        self.collect_text(node, &mut content);
        content
    }

    pub fn field(&self, element: NodeId) -> Option<&TextField> {
        match self.data(element)? {
            NodeData::Element(data) => data.field.as_ref(),
            NodeData::Text(_) => None,
        }
    }

    pub fn field_mut(&mut self, element: NodeId) -> Option<&mut TextField> {
        match self.data_mut(element)? {
            NodeData::Element(data) => data.field.as_mut(),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_field_value(&mut self, element: NodeId, value: &str) {
        if let Some(field) = self.field_mut(element) {
            field.value = value.to_string();
            let len = value.chars().count();
            field.selection_start = len;
            field.selection_end = len;
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0)?.parent
    }

    /// Nearest element at or above `node`.
    pub fn element_for(&self, node: NodeId) -> Option<NodeId> {
        if self.is_element(node) {
            Some(node)
        } else {
            self.parent_element(node)
        }
    }

    pub fn parent_element(&self, node: NodeId) -> Option<NodeId> {
        self.parent(node).filter(|parent| self.is_element(*parent))
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node.0)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn index_in_parent(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.children(parent).iter().position(|child| *child == node)
    }

    /// Whether `node` is reachable from the body through parent links.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Resolves `contenteditable` the way browsers do: the nearest element
    /// carrying the attribute decides, `"false"` switches editing off.
    pub fn is_content_editable(&self, node: NodeId) -> bool {
        let mut current = self.element_for(node);
        while let Some(id) = current {
            match self.attribute(id, "contenteditable") {
                Some(value) => {
                    return matches!(
                        value.trim().to_ascii_lowercase().as_str(),
                        "" | "true" | "plaintext-only"
                    );
                }
                None => current = self.parent_element(id),
            }
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child);
    }

    /// Inserts `child` at `index` among `parent`'s children, detaching it first.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.remove(child);
        if let Some(node) = self.nodes.get_mut(parent.0) {
            let index = index.min(node.children.len());
            node.children.insert(index, child);
        }
        if let Some(node) = self.nodes.get_mut(child.0) {
            node.parent = Some(parent);
        }
    }

    /// Unlinks `node` from its parent; the subtree stays intact but disconnected.
    pub fn remove(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent.0) {
            parent_node.children.retain(|child| *child != node);
        }
        if let Some(node) = self.nodes.get_mut(node.0) {
            node.parent = None;
        }
    }

    pub fn rect(&self, node: NodeId) -> Rect {
        self.nodes
            .get(node.0)
            .map(|node| node.rect)
            .unwrap_or_default()
    }

    pub fn set_rect(&mut self, node: NodeId, rect: Rect) {
        if let Some(node) = self.nodes.get_mut(node.0) {
            node.rect = rect;
        }
    }

    pub fn selection(&self) -> Option<&Range> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, range: Range) {
        self.selection = Some(range);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Selects characters `[start, end)` of a native text field.
    pub fn select_in_field(&mut self, element: NodeId, start: usize, end: usize) {
        if let Some(field) = self.field_mut(element) {
            let len = field.value.chars().count();
            field.selection_start = start.min(len);
            field.selection_end = end.min(len).max(field.selection_start);
            let (start, end) = (field.selection_start, field.selection_end);
            self.selection = Some(Range::new(
                Boundary::new(element, start),
                Boundary::new(element, end),
            ));
        }
    }

    /// Selects from `start_offset` in `start` to `end_offset` in `end`.
    pub fn select_text(
        &mut self,
        start: NodeId,
        start_offset: usize,
        end: NodeId,
        end_offset: usize,
    ) {
        self.selection = Some(Range::new(
            Boundary::new(start, start_offset),
            Boundary::new(end, end_offset),
        ));
    }

    pub fn dispatch_event(&mut self, target: NodeId, kind: EventKind) {
        self.events.push(DispatchedEvent {
            target,
            kind,
            bubbles: true,
        });
    }

    pub fn events(&self) -> &[DispatchedEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DispatchedEvent> {
        std::mem::take(&mut self.events)
    }

    /// Connected nodes under the body in pre-order.
    pub(crate) fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.body];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
        });
        id
    }

    fn data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node.0).map(|node| &node.data)
    }

    fn data_mut(&mut self, node: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(node.0).map(|node| &mut node.data)
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match self.data(node) {
            Some(NodeData::Text(text)) => out.push_str(text),
            Some(NodeData::Element(_)) => {
                for child in self.children(node) {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of character `char_index`, clamped to the end of `text`.
pub(crate) fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(index, _)| index)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_editable_is_inherited_until_disabled() {
        let mut doc = Document::new();
        let editor = doc.append_element(doc.body(), "div");
        doc.set_attribute(editor, "contenteditable", "true");
        let paragraph = doc.append_element(editor, "p");
        let locked = doc.append_element(editor, "span");
        doc.set_attribute(locked, "contenteditable", "false");
        let text = doc.append_text(paragraph, "draft");

        assert!(doc.is_content_editable(editor));
        assert!(doc.is_content_editable(paragraph));
        assert!(doc.is_content_editable(text));
        assert!(!doc.is_content_editable(locked));
        assert!(!doc.is_content_editable(doc.body()));
    }

    #[test]
    fn empty_attribute_enables_editing() {
        let mut doc = Document::new();
        let editor = doc.append_element(doc.body(), "div");
        doc.set_attribute(editor, "contentEditable", "");
        assert!(doc.is_content_editable(editor));
    }

    #[test]
    fn removed_subtree_is_disconnected() {
        let mut doc = Document::new();
        let section = doc.append_element(doc.body(), "section");
        let text = doc.append_text(section, "gone soon");
        assert!(doc.is_connected(text));

        doc.remove(section);
        assert!(!doc.is_connected(text));
        assert_eq!(doc.parent(text), Some(section));
    }

    #[test]
    fn field_selection_is_clamped_to_value() {
        let mut doc = Document::new();
        let input = doc.append_element(doc.body(), "INPUT");
        doc.set_field_value(input, "short");
        doc.select_in_field(input, 2, 40);

        let field = doc.field(input).expect("field");
        assert_eq!((field.selection_start, field.selection_end), (2, 5));
        assert_eq!(doc.tag_name(input), Some("input"));
    }

    #[test]
    fn byte_index_handles_multibyte_text() {
        assert_eq!(byte_index("héllo", 2), 3);
        assert_eq!(byte_index("héllo", 99), "héllo".len());
        assert_eq!(char_len("😊 ok"), 4);
    }
}
