//! Arena-indexed nested SVO builder and its optimization/merge passes (`SVO`/`NestedElement` in
//! the original source).
//!
//! Unlike [`crate::streaming`], this builds an explicit tree held entirely in memory, addressed
//! by arena index rather than pointer — the same redesign the teacher applies to its own
//! pointer-tree in `storage/octree.rs`. That makes this path suitable for workloads that need to
//! optimize or merge subtrees before saving, at the cost of `O(V*D)` memory for `V` voxels.

use crate::error::BuildError;
use crate::voxel::{Rgba8, Voxel};

pub type NodeId = usize;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NestedNode {
    pub children: [Option<NodeId>; 8],
    pub rgba: Rgba8,
    pub is_empty: bool,
}

impl NestedNode {
    const EMPTY: NestedNode = NestedNode { children: [None; 8], rgba: Rgba8::EMPTY, is_empty: true };

    fn is_terminal(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }
}

/// An in-memory octree, `depth` levels deep, addressed by index into `nodes` rather than by
/// pointer. `nodes[root]` is always node 0.
#[derive(Debug)]
pub struct NestedTree {
    nodes: Vec<NestedNode>,
    root: NodeId,
    depth: u32,
}

impl NestedTree {
    pub fn new(depth: u32) -> Self {
        Self { nodes: vec![NestedNode::EMPTY], root: 0, depth }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &NestedNode {
        &self.nodes[id]
    }

    fn push_node(&mut self) -> NodeId {
        self.nodes.push(NestedNode::EMPTY);
        self.nodes.len() - 1
    }

    /// Descends `depth` levels from the root, splitting the cube in half along each axis at
    /// every step, blending the voxel's color into every node on the path. A second voxel
    /// landing on an already-assigned leaf is a warning, not an error — the first wins.
    pub fn insert(&mut self, x: u32, y: u32, z: u32, rgba: Rgba8) -> Result<(), BuildError> {
        Voxel::new(x, y, z, rgba).validate(self.depth)?;

        let (mut x, mut y, mut z) = (x, y, z);
        let mut cur = self.root;
        let mut size = 1u32 << self.depth;

        loop {
            if size == 1 {
                let node = &mut self.nodes[cur];
                if !node.is_empty {
                    log::warn!("duplicate voxel at ({x}, {y}, {z}), keeping the first");
                    return Ok(());
                }
                node.rgba = rgba;
                node.is_empty = false;
                return Ok(());
            }

            {
                let node = &mut self.nodes[cur];
                node.rgba = node.rgba.blend_pairwise(rgba);
                node.is_empty = false;
            }

            size /= 2;
            let idx = (((z >= size) as u8) << 2 | ((y >= size) as u8) << 1 | (x >= size) as u8) as usize;
            if x >= size {
                x -= size;
            }
            if y >= size {
                y -= size;
            }
            if z >= size {
                z -= size;
            }

            cur = match self.nodes[cur].children[idx] {
                Some(child) => child,
                None => {
                    let child = self.push_node();
                    self.nodes[cur].children[idx] = Some(child);
                    child
                }
            };
        }
    }

    /// Post-order: collapses any node whose all 8 child slots are populated, terminal,
    /// non-empty, and share one RGBA into a solid leaf.
    ///
    /// The `children.iter().all(is_some)` check is load-bearing and deliberately strict: a node
    /// that ended up with fewer than 8 populated slots (e.g. a voxel set landed directly on an
    /// interior node's own color without filling every octant) never collapses even if every
    /// existing child already agrees, matching the original's behavior.
    pub fn optimize_solid(&mut self) {
        self.optimize_solid_at(self.root);
    }

    fn optimize_solid_at(&mut self, id: NodeId) {
        let children = self.nodes[id].children;
        for child in children.iter().flatten() {
            self.optimize_solid_at(*child);
        }
        if !children.iter().all(Option::is_some) {
            return;
        }
        let mut uniform = None;
        for child in children.iter().flatten() {
            let node = &self.nodes[*child];
            if node.is_empty || !node.is_terminal() {
                return;
            }
            match uniform {
                None => uniform = Some(node.rgba),
                Some(rgba) if rgba == node.rgba => {}
                Some(_) => return,
            }
        }
        if let Some(rgba) = uniform {
            let node = &mut self.nodes[id];
            node.rgba = rgba;
            node.is_empty = false;
            node.children = [None; 8];
        }
    }

    /// Post-order: drops any child slot pointing at an already-empty terminal node, then marks
    /// self empty if nothing is left. [`build`] only calls this when
    /// [`crate::config::BuildConfig::optimize_empty`] is set — callers building a tree some other
    /// way must call it themselves.
    pub fn optimize_empty(&mut self) {
        self.optimize_empty_at(self.root);
    }

    fn optimize_empty_at(&mut self, id: NodeId) {
        let children = self.nodes[id].children;
        for child in children.iter().flatten() {
            self.optimize_empty_at(*child);
        }
        let mut trimmed = children;
        for slot in trimmed.iter_mut() {
            if let Some(child) = *slot {
                let node = &self.nodes[child];
                if node.is_empty && node.is_terminal() {
                    *slot = None;
                }
            }
        }
        self.nodes[id].children = trimmed;
        if trimmed.iter().all(Option::is_none) {
            let node = &mut self.nodes[id];
            node.is_empty = true;
            node.rgba = Rgba8::EMPTY;
        }
    }

    /// Structurally merges `other` into `self`: colors pairwise-blend, grafting `other`'s
    /// subtrees wherever `self` has no existing child. Re-runs solid collapse afterward.
    pub fn merge(&mut self, other: &NestedTree) -> Result<(), BuildError> {
        if self.depth != other.depth {
            return Err(BuildError::InvariantViolation(format!(
                "cannot merge trees of depth {} and {}",
                self.depth, other.depth
            )));
        }
        self.merge_at(self.root, other, other.root);
        self.optimize_solid();
        Ok(())
    }

    fn merge_at(&mut self, a: NodeId, other: &NestedTree, b: NodeId) {
        let b_node = *other.node(b);
        if b_node.is_empty {
            return;
        }
        {
            let a_node = &mut self.nodes[a];
            a_node.rgba = a_node.rgba.blend_pairwise(b_node.rgba);
            a_node.is_empty = false;
        }
        for (i, b_child) in b_node.children.iter().enumerate() {
            let Some(b_child) = b_child else { continue };
            let a_child = match self.nodes[a].children[i] {
                Some(id) => id,
                None => {
                    let id = self.push_node();
                    self.nodes[a].children[i] = Some(id);
                    id
                }
            };
            self.merge_at(a_child, other, *b_child);
        }
    }
}

/// Builds a nested tree from an unordered voxel list. Runs [`NestedTree::optimize_empty`]
/// afterward when `config.optimize_empty` is set; callers still run [`NestedTree::optimize_solid`]
/// themselves if they want it.
pub fn build(voxels: &[Voxel], config: &crate::config::BuildConfig) -> Result<NestedTree, BuildError> {
    let mut tree = NestedTree::new(config.depth);
    for v in voxels {
        tree.insert(v.x, v.y, v.z, v.rgba)?;
    }
    if config.optimize_empty {
        tree.optimize_empty();
    }
    Ok(tree)
}
