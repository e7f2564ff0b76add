use thiserror::Error;
use tracing::info;

use crate::content::SelectionSnapshot;
use crate::content::selection::is_inside_content_editable;
use crate::page::{Boundary, Document, EventKind, NodeId, Range, RangeError, byte_index, char_len};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpliceError {
    #[error("The original text is no longer on the page")]
    Detached,
    #[error("The original selection ({start}..{end}) no longer fits the field ({len} characters)")]
    StaleOffsets { start: usize, end: usize, len: usize },
    #[error("The original selection is not inside an editable field")]
    NotEditable,
    #[error("The original selection could not be replaced: {0}")]
    Range(RangeError),
}

impl From<RangeError> for SpliceError {
    fn from(err: RangeError) -> Self {
        match err {
            RangeError::Detached => SpliceError::Detached,
            other => SpliceError::Range(other),
        }
    }
}

/// Replaces the snapshot's span with `rewritten` and notifies the page as if
/// the user had typed it. The page is left untouched on error.
pub fn replace_selection(
    doc: &mut Document,
    snapshot: &SelectionSnapshot,
    rewritten: &str,
) -> Result<(), SpliceError> {
    if !doc.is_connected(snapshot.element) {
        return Err(SpliceError::Detached);
    }

    if doc.field(snapshot.element).is_some() {
        return replace_in_field(doc, snapshot, rewritten);
    }

    if doc.is_content_editable(snapshot.element)
        || is_inside_content_editable(doc, snapshot.element)
    {
        return replace_in_content_editable(doc, &snapshot.range, rewritten);
    }

    Err(SpliceError::NotEditable)
}

fn replace_in_field(
    doc: &mut Document,
    snapshot: &SelectionSnapshot,
    rewritten: &str,
) -> Result<(), SpliceError> {
    let element = snapshot.element;
    let range = snapshot.range;
    let Some(field) = doc.field_mut(element) else {
        return Err(SpliceError::NotEditable);
    };

    // The snapshot offsets win; the live field selection is lost once focus moves.
    let (start, end) = if range.start.node == element && range.end.node == element {
        (
            range.start.offset.min(range.end.offset),
            range.start.offset.max(range.end.offset),
        )
    } else {
        (field.selection_start, field.selection_end)
    };

    let len = char_len(&field.value);
    if end > len || start > end {
        return Err(SpliceError::StaleOffsets { start, end, len });
    }

    let start_byte = byte_index(&field.value, start);
    let end_byte = byte_index(&field.value, end);
    let mut value = String::with_capacity(field.value.len() + rewritten.len());
    value.push_str(&field.value[..start_byte]);
    value.push_str(rewritten);
    value.push_str(&field.value[end_byte..]);
    field.value = value;

    let caret = start + char_len(rewritten);
    field.selection_start = caret;
    field.selection_end = caret;

    doc.set_selection(Range::collapsed(Boundary::new(element, caret)));
    notify_changed(doc, element);
    info!(replaced = end - start, inserted = char_len(rewritten), "replaced text field selection");
    Ok(())
}

fn replace_in_content_editable(
    doc: &mut Document,
    range: &Range,
    rewritten: &str,
) -> Result<(), SpliceError> {
    let at = doc.delete_range_contents(range)?;
    let inserted = doc.insert_text_at(at, rewritten)?;

    let parent = doc.parent(inserted).ok_or(SpliceError::Detached)?;
    let index = doc.index_in_parent(inserted).ok_or(SpliceError::Detached)?;
    let caret = Range::collapsed(Boundary::new(parent, index + 1));
    doc.set_selection(caret);

    let container = caret.common_ancestor(doc);
    let target = doc.element_for(container).unwrap_or_else(|| doc.body());
    notify_changed(doc, target);
    info!(inserted = char_len(rewritten), "replaced content-editable selection");
    Ok(())
}

fn notify_changed(doc: &mut Document, target: NodeId) {
    doc.dispatch_event(target, EventKind::Input);
    doc.dispatch_event(target, EventKind::Change);
}
