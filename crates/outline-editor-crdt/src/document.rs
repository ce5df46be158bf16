//! Outline documents whose text leaves are Loro sequences.

use std::sync::Arc;

use outline_editor_core::{
    Node, Path, TextBuffer, TextContent, apply_all, parse_document, parse_operations,
};

use crate::CrdtError;
use crate::buffer::LoroTextBuffer;

/// A document snapshot with CRDT text leaves.
pub type Snapshot = Node<LoroTextBuffer>;

/// Promote every text leaf to its sequence representation.
///
/// Replicas must be cloned from a fully promoted snapshot for their leaves
/// to share history; a leaf promoted separately on each side starts an
/// unrelated sequence.
pub fn promote_all(node: &mut Snapshot) {
    match node {
        Node::Text(text) => {
            text.content.promote();
        }
        Node::Element(element) => {
            for child in &mut element.children {
                promote_all(Arc::make_mut(child));
            }
        }
    }
}

/// Parse a stored document and promote all of its leaves.
pub fn parse_snapshot(stored: &str) -> Result<Snapshot, CrdtError> {
    let mut snapshot: Snapshot = parse_document(stored)?;
    promote_all(&mut snapshot);
    Ok(snapshot)
}

/// Replay a stored operation log against a stored document.
pub fn replay(stored: &str, log: &str) -> Result<Snapshot, CrdtError> {
    let snapshot = parse_snapshot(stored)?;
    let ops = parse_operations::<LoroTextBuffer>(log)?;
    tracing::debug!(count = ops.len(), "replaying operation log");
    Ok(apply_all(&snapshot, &ops)?)
}

/// Pull text changes from `remote` into `local`, leaf by leaf.
///
/// Both replicas must have the same structure; only sequence content is
/// exchanged. Returns the number of leaves that received changes.
pub fn merge_text(local: &mut Snapshot, remote: &Snapshot) -> Result<usize, CrdtError> {
    let mut merged = 0;
    merge_node(local, remote, Path::root(), &mut merged)?;
    if merged > 0 {
        tracing::debug!(leaves = merged, "merged remote text");
    }
    Ok(merged)
}

fn merge_node(
    local: &mut Snapshot,
    remote: &Snapshot,
    path: Path,
    merged: &mut usize,
) -> Result<(), CrdtError> {
    match (local, remote) {
        (Node::Text(local), Node::Text(remote)) => match (&mut local.content, &remote.content) {
            (TextContent::Sequence(ours), TextContent::Sequence(theirs)) => {
                if ours.merge_from(theirs)? {
                    *merged += 1;
                }
            }
            (ours, theirs) if ours.to_text() == theirs.to_text() => {}
            _ => return Err(CrdtError::StructureDiverged { path }),
        },
        (Node::Element(local), Node::Element(remote)) => {
            if local.kind != remote.kind || local.children.len() != remote.children.len() {
                return Err(CrdtError::StructureDiverged { path });
            }
            for (index, (ours, theirs)) in local
                .children
                .iter_mut()
                .zip(remote.children.iter())
                .enumerate()
            {
                if Arc::ptr_eq(ours, theirs) {
                    continue;
                }
                merge_node(Arc::make_mut(ours), theirs, path.child(index), merged)?;
            }
        }
        _ => return Err(CrdtError::StructureDiverged { path }),
    }
    Ok(())
}

/// Flatten a snapshot leaf's text, mostly for diagnostics.
pub fn leaf_text(snapshot: &Snapshot, path: &Path) -> Result<String, CrdtError> {
    Ok(outline_editor_core::leaf(snapshot, path)?.content.to_text())
}

#[cfg(test)]
mod tests {
    use outline_editor_core::{Operation, apply, serialize_document};

    use super::*;

    const STORED: &str = r#"[{"type":"paragraph","children":[{"text":"ac"}]}]"#;

    fn insert(offset: usize, text: &str) -> Operation<LoroTextBuffer> {
        Operation::InsertText {
            path: Path::from([0, 0]),
            offset,
            text: text.into(),
        }
    }

    #[test]
    fn test_concurrent_text_inserts_converge() {
        let base = parse_snapshot(STORED).unwrap();
        let mut a = apply(&base, &insert(1, "b")).unwrap();
        let mut b = apply(&base, &insert(2, "d")).unwrap();

        merge_text(&mut a, &b).unwrap();
        merge_text(&mut b, &a).unwrap();

        assert_eq!(leaf_text(&a, &Path::from([0, 0])).unwrap(), "abcd");
        assert_eq!(serialize_document(&a).unwrap(), serialize_document(&b).unwrap());
        // The base snapshot never observes either replica's edits.
        assert_eq!(serialize_document(&base).unwrap(), STORED);
    }

    #[test]
    fn test_sequential_application_alone_does_not_converge() {
        let base = parse_snapshot(STORED).unwrap();
        let replayed = apply_all(&base, &[insert(1, "b"), insert(2, "d")]).unwrap();
        assert_eq!(leaf_text(&replayed, &Path::from([0, 0])).unwrap(), "abdc");
    }

    #[test]
    fn test_diverged_structure_is_rejected() {
        let base = parse_snapshot(STORED).unwrap();
        let mut a = base.clone();
        let b = apply(
            &base,
            &Operation::InsertNode {
                path: Path::from([1]),
                node: Node::paragraph("more"),
            },
        )
        .unwrap();
        assert!(matches!(
            merge_text(&mut a, &b),
            Err(CrdtError::StructureDiverged { path }) if path.is_root()
        ));
    }

    #[test]
    fn test_replay() {
        let log = r#"[
            {"type":"insert_text","path":[0,0],"offset":2,"text":"!"},
            {"type":"split_node","path":[0,0],"position":1},
            {"type":"split_node","path":[0],"position":1}
        ]"#;
        let snapshot = replay(STORED, log).unwrap();
        insta::assert_snapshot!(
            serialize_document(&snapshot).unwrap(),
            @r#"[{"type":"paragraph","children":[{"text":"a"}]},{"type":"paragraph","children":[{"text":"c!"}]}]"#
        );
    }
}
