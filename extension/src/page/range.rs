use thiserror::Error;

use super::{Document, NodeId, Rect, byte_index, char_len};

/// A point inside the document.
///
/// The offset is a character index for text nodes and native text fields and
/// a child index for other elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: Boundary,
    pub end: Boundary,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range boundary is no longer attached to the document")]
    Detached,
    #[error("range offset {offset} exceeds node length {len}")]
    OffsetOutOfBounds { offset: usize, len: usize },
    #[error("range end precedes its start")]
    Reversed,
    #[error("range spans containers that cannot be edited as text")]
    Unsupported,
}

impl Range {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Boundary) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    pub fn common_ancestor(&self, doc: &Document) -> NodeId {
        let mut current = Some(self.start.node);
        while let Some(id) = current {
            if id == self.end.node || doc.is_ancestor_of(id, self.end.node) {
                return id;
            }
            current = doc.parent(id);
        }
        doc.body()
    }

    pub fn bounding_rect(&self, doc: &Document) -> Rect {
        let start = doc.rect(self.start.node);
        if self.start.node == self.end.node {
            start
        } else {
            start.union(doc.rect(self.end.node))
        }
    }
}

impl Document {
    pub fn validate_range(&self, range: &Range) -> Result<(), RangeError> {
        for boundary in [range.start, range.end] {
            if !self.is_connected(boundary.node) {
                return Err(RangeError::Detached);
            }
            let len = self.node_len(boundary.node);
            if boundary.offset > len {
                return Err(RangeError::OffsetOutOfBounds {
                    offset: boundary.offset,
                    len,
                });
            }
        }

        if self.point_key(range.start)? > self.point_key(range.end)? {
            return Err(RangeError::Reversed);
        }
        Ok(())
    }

    /// Text of every text node the range covers, cut at text boundaries.
    pub fn range_text(&self, range: &Range) -> Result<String, RangeError> {
        self.validate_range(range)?;
        let Range { start, end } = *range;

        if start.node == end.node {
            if let Some(field) = self.field(start.node) {
                return Ok(char_slice(&field.value, start.offset, end.offset).to_string());
            }
        }

        let start_key = self.point_key(start)?;
        let end_key = self.point_key(end)?;
        let mut selected = String::new();
        for node in self.preorder() {
            let Some(text) = self.text(node) else {
                continue;
            };
            let len = char_len(text);

            let from = if start.node == node {
                start.offset
            } else if start_key <= self.point_key(Boundary::new(node, 0))? {
                0
            } else {
                continue;
            };
            let to = if end.node == node {
                end.offset
            } else if end_key >= self.point_key(Boundary::new(node, len))? {
                len
            } else {
                continue;
            };

            if from < to {
                selected.push_str(char_slice(text, from, to));
            }
        }
        Ok(selected)
    }

    /// Removes the range's contents and returns the collapsed insertion point.
    ///
    /// Boundary text nodes are cut, nodes lying wholly inside the range are
    /// removed and partially covered elements stay. A range starting in a text
    /// node collapses to that point; nothing is modified when validation fails.
    pub fn delete_range_contents(&mut self, range: &Range) -> Result<Boundary, RangeError> {
        self.validate_range(range)?;
        let Range { start, end } = *range;

        if self.field(start.node).is_some() || self.field(end.node).is_some() {
            return Err(RangeError::Unsupported);
        }

        if start.node == end.node {
            if let Some(text) = self.text(start.node) {
                let remaining = format!(
                    "{}{}",
                    char_slice(text, 0, start.offset),
                    char_slice(text, end.offset, char_len(text))
                );
                self.set_text(start.node, &remaining);
                return Ok(start);
            }
        }

        let start_key = self.point_key(start)?;
        let end_key = self.point_key(end)?;
        let collapsed = self.collapse_point(start, end)?;
        let contained = self.contained_nodes(&start_key, &end_key)?;

        if start.node != end.node {
            if let Some(text) = self.text(start.node).map(str::to_string) {
                self.set_text(start.node, char_slice(&text, 0, start.offset));
            }
            if let Some(text) = self.text(end.node).map(str::to_string) {
                self.set_text(end.node, char_slice(&text, end.offset, char_len(&text)));
            }
        }
        for node in contained {
            self.remove(node);
        }

        Ok(collapsed)
    }

    /// Inserts `text` as a new text node at `at`, splitting a text node when needed.
    pub fn insert_text_at(&mut self, at: Boundary, text: &str) -> Result<NodeId, RangeError> {
        if !self.is_connected(at.node) {
            return Err(RangeError::Detached);
        }
        let len = self.node_len(at.node);
        if at.offset > len {
            return Err(RangeError::OffsetOutOfBounds {
                offset: at.offset,
                len,
            });
        }

        if let Some(current) = self.text(at.node).map(str::to_string) {
            let parent = self.parent(at.node).ok_or(RangeError::Detached)?;
            let index = self.index_in_parent(at.node).ok_or(RangeError::Detached)?;
            let (head, tail) = current.split_at(byte_index(&current, at.offset));
            let inserted = self.create_text(text);

            if tail.is_empty() {
                self.insert_child(parent, index + 1, inserted);
            } else if head.is_empty() {
                self.insert_child(parent, index, inserted);
            } else {
                self.set_text(at.node, head);
                let tail_node = self.create_text(tail);
                self.insert_child(parent, index + 1, tail_node);
                self.insert_child(parent, index + 1, inserted);
            }
            return Ok(inserted);
        }

        if self.field(at.node).is_some() {
            return Err(RangeError::Unsupported);
        }

        let inserted = self.create_text(text);
        self.insert_child(at.node, at.offset, inserted);
        Ok(inserted)
    }

    fn node_len(&self, node: NodeId) -> usize {
        if let Some(text) = self.text(node) {
            return char_len(text);
        }
        if let Some(field) = self.field(node) {
            return char_len(&field.value);
        }
        self.children(node).len()
    }

    /// Sort key placing boundary points in document order.
    ///
    /// Each ancestor step contributes `2 * index + 1`; an element offset
    /// contributes `2 * offset`, so the point before child `i` sorts ahead
    /// of everything inside it. Text and field offsets are appended as is.
    fn point_key(&self, point: Boundary) -> Result<Vec<usize>, RangeError> {
        let mut key = Vec::new();
        let mut node = point.node;
        while let Some(parent) = self.parent(node) {
            let index = self.index_in_parent(node).ok_or(RangeError::Detached)?;
            key.push(2 * index + 1);
            node = parent;
        }
        if node != self.body() {
            return Err(RangeError::Detached);
        }
        key.reverse();

        if self.is_text(point.node) || self.field(point.node).is_some() {
            key.push(point.offset);
        } else {
            key.push(2 * point.offset);
        }
        Ok(key)
    }

    /// Outermost nodes lying wholly between the two points.
    fn contained_nodes(
        &self,
        start_key: &[usize],
        end_key: &[usize],
    ) -> Result<Vec<NodeId>, RangeError> {
        let mut contained: Vec<NodeId> = Vec::new();
        for node in self.preorder() {
            let Some(parent) = self.parent(node) else {
                continue;
            };
            if contained
                .last()
                .is_some_and(|outer| self.is_ancestor_of(*outer, node))
            {
                continue;
            }

            let index = self.index_in_parent(node).ok_or(RangeError::Detached)?;
            let before = self.point_key(Boundary::new(parent, index))?;
            let after = self.point_key(Boundary::new(parent, index + 1))?;
            if start_key <= before.as_slice() && after.as_slice() <= end_key {
                contained.push(node);
            }
        }
        Ok(contained)
    }

    fn collapse_point(&self, start: Boundary, end: Boundary) -> Result<Boundary, RangeError> {
        if self.is_text(start.node)
            || start.node == end.node
            || self.is_ancestor_of(start.node, end.node)
        {
            return Ok(start);
        }

        let mut reference = start.node;
        loop {
            let parent = self.parent(reference).ok_or(RangeError::Detached)?;
            if parent == end.node || self.is_ancestor_of(parent, end.node) {
                let index = self.index_in_parent(reference).ok_or(RangeError::Detached)?;
                return Ok(Boundary::new(parent, index + 1));
            }
            reference = parent;
        }
    }
}

fn char_slice(text: &str, start: usize, end: usize) -> &str {
    let start = byte_index(text, start);
    let end = byte_index(text, end).max(start);
    &text[start..end]
}
