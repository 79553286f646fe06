//! BFS linearizer: flattens a [`crate::nested::NestedTree`] into a flat array of [`Element`]
//! records with relative forward child pointers (`SVOSaver::toShaderElements` in the original
//! source).

use std::collections::VecDeque;

use crate::nested::{NestedTree, NodeId};
use crate::voxel::Rgba8;

/// One linearized SVO record. `child_pointer` is the forward distance, in elements, from this
/// element's own index to its first child — `0` for empty nodes and terminal solid leaves,
/// which carry no children.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Element {
    pub child_mask: u8,
    pub child_pointer: u32,
    pub rgba: Rgba8,
}

/// Walks `tree` breadth-first, draining a queue of pending nodes fully before popping exactly
/// one pending parent to fix up its `child_pointer` and enqueue its children. This two-queue
/// dance (rather than one FIFO) is what guarantees a parent's children land contiguously, all at
/// indices greater than the parent's own.
pub fn linearize(tree: &NestedTree) -> Vec<Element> {
    let mut output = Vec::new();
    let mut node_queue: VecDeque<NodeId> = VecDeque::new();
    let mut parent_queue: VecDeque<(NodeId, usize)> = VecDeque::new();

    node_queue.push_back(tree.root());

    while !node_queue.is_empty() || !parent_queue.is_empty() {
        while let Some(id) = node_queue.pop_front() {
            let node = tree.node(id);
            let out_idx = output.len();

            if node.is_empty {
                output.push(Element { child_mask: 0, child_pointer: 0, rgba: Rgba8::EMPTY });
                continue;
            }

            let mask = child_mask(node.children);
            if mask == 0 {
                output.push(Element { child_mask: 0xFF, child_pointer: 0, rgba: node.rgba });
            } else {
                output.push(Element { child_mask: mask, child_pointer: 0, rgba: node.rgba });
                parent_queue.push_back((id, out_idx));
            }
        }

        if let Some((id, parent_idx)) = parent_queue.pop_front() {
            let current_len = output.len();
            output[parent_idx].child_pointer = (current_len - parent_idx) as u32;
            for child in tree.node(id).children.iter().flatten() {
                node_queue.push_back(*child);
            }
        }
    }

    output
}

fn child_mask(children: [Option<NodeId>; 8]) -> u8 {
    let mut mask = 0u8;
    for (i, c) in children.iter().enumerate() {
        if c.is_some() {
            mask |= 1 << i;
        }
    }
    mask
}
