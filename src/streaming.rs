//! Streaming, single-pass SVO construction (`ofcSVO` in the original source).
//!
//! Voxels are consumed in Morton order while walking every position of the `2^D`-per-axis cube.
//! Only `O(D)` node queues are ever held in memory — one pending-children list per depth, plus a
//! per-depth run counter for consecutive empty positions — so the tree never materializes beyond
//! what's needed to fold the next group of 8 siblings. Children are written out before their
//! parent's offset is known, which is why the temp file this writes to is read back-to-front by
//! [`crate::reverse::fixup`] afterwards.

use std::io::Write;

use crate::bitio::BitWriter;
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::morton;
use crate::node::{write_indirection, write_node, Node, MAX_CHILD_OFFSET};
use crate::reverse;
use crate::voxel::{Rgba8, Voxel};

struct StreamingBuilder {
    depth: usize,
    queues: Vec<Vec<Node>>,
    empty_run: Vec<u64>,
    out_pointer: u64,
    voxels: Vec<(u64, Rgba8)>,
    next_voxel: usize,
    /// (backward write position, target's original write-order pointer), for records later
    /// rewritten by the reverse fixup pass once the total record count is known.
    indirections: Vec<(u64, u64)>,
    total_records: u64,
}

impl StreamingBuilder {
    fn new(depth: u32, voxels: Vec<(u64, Rgba8)>) -> Self {
        let d = depth as usize;
        Self {
            depth: d,
            queues: vec![Vec::new(); d + 1],
            empty_run: vec![0; d + 1],
            out_pointer: 1,
            voxels,
            next_voxel: 0,
            indirections: Vec::new(),
            total_records: 0,
        }
    }

    fn add_voxel_to_queue(&mut self, pos: u64) {
        let d = self.depth;
        if self.next_voxel < self.voxels.len() && self.voxels[self.next_voxel].0 == pos {
            for _ in 0..self.empty_run[d] {
                self.queues[d].push(Node::EMPTY);
            }
            self.empty_run[d] = 0;
            self.queues[d].push(Node::solid_leaf(self.voxels[self.next_voxel].1));
            self.next_voxel += 1;
            // Coalesces silently: unlike the nested path, repeated Morton positions here are
            // not worth a warning — just advance past them and keep the first.
            while self.next_voxel < self.voxels.len() && self.voxels[self.next_voxel].0 == pos {
                self.next_voxel += 1;
            }
        } else {
            self.empty_run[d] += 1;
        }
    }

    fn process_full_queues<W: Write>(&mut self, bw: &mut BitWriter<W>) -> std::io::Result<()> {
        let mut d = self.depth;
        while d > 0 && self.queues[d].len() as u64 + self.empty_run[d] >= 8 {
            if self.empty_run[d] >= 8 {
                self.empty_run[d] -= 8;
                self.empty_run[d - 1] += 1;
            } else {
                for _ in 0..self.empty_run[d] {
                    self.queues[d].push(Node::EMPTY);
                }
                self.empty_run[d] = 0;
                let parent = self.fold_group(d, bw)?;
                for _ in 0..self.empty_run[d - 1] {
                    self.queues[d - 1].push(Node::EMPTY);
                }
                self.empty_run[d - 1] = 0;
                self.queues[d - 1].push(parent);
            }
            d -= 1;
        }
        Ok(())
    }

    /// Drains exactly 8 pending children at depth `d`, folds them into one parent node, and
    /// writes the children to the backward stream (unless the group collapsed to empty or
    /// solid).
    fn fold_group<W: Write>(&mut self, d: usize, bw: &mut BitWriter<W>) -> std::io::Result<Node> {
        let children: Vec<Node> = self.queues[d].drain(..).collect();
        debug_assert_eq!(children.len(), 8);

        let rgba = Rgba8::average(children.iter());
        let mut parent = Node { rgba, ..Node::EMPTY };

        if rgba.is_empty() {
            // stays Node::EMPTY-shaped
        } else if all_solid_and_equal(&children) {
            parent.child_mask = 0xFF;
        } else {
            self.write_children(&children, bw)?;
            parent.child_pointer = self.out_pointer - 1;
            parent.child_mask = child_mask(&children);
        }
        Ok(parent)
    }

    /// Writes a group of (up to 8) children to the backward stream, highest index first,
    /// emitting an indirection record ahead of any child whose own first-grandchild offset
    /// would overflow the fixed 23-bit field.
    fn write_children<W: Write>(&mut self, children: &[Node], bw: &mut BitWriter<W>) -> std::io::Result<()> {
        let mut children = children.to_vec();

        for i in (0..8).rev() {
            if !children[i].is_empty() && children[i].child_pointer > 0 {
                let offset = self.out_pointer - children[i].child_pointer;
                if offset > MAX_CHILD_OFFSET {
                    let w = self.out_pointer - 1;
                    self.indirections.push((w, children[i].child_pointer));
                    write_indirection(bw, children[i].child_pointer)?;
                    children[i].child_pointer = self.out_pointer;
                    children[i].refer_bit = true;
                    self.out_pointer += 1;
                }
            }
        }

        for i in (0..8).rev() {
            if !children[i].is_empty() {
                if children[i].child_pointer > 0 {
                    children[i].child_offset = (self.out_pointer - children[i].child_pointer) as u32;
                }
                write_node(bw, &children[i])?;
                self.out_pointer += 1;
            }
        }
        Ok(())
    }

    /// Writes the single remaining root node (or an all-empty record if the whole cube turned
    /// out empty). Unlike every other node, the root's own position is never tracked through
    /// `out_pointer` — it is always the very last record in the backward stream.
    fn finish_inner<W: Write>(&mut self, bw: &mut BitWriter<W>) -> Result<(), BuildError> {
        self.total_records = self.out_pointer;
        if self.empty_run[0] > 0 {
            write_node(bw, &Node::EMPTY)?;
        } else {
            let mut root = self
                .queues[0]
                .pop()
                .ok_or_else(|| BuildError::InvariantViolation("streaming build produced no root".into()))?;
            if root.child_pointer > 0 {
                root.child_offset = 1;
            }
            write_node(bw, &root)?;
        }
        Ok(())
    }
}

fn child_mask(children: &[Node]) -> u8 {
    let mut mask = 0u8;
    for (i, c) in children.iter().enumerate() {
        if !c.is_empty() {
            mask |= 1 << i;
        }
    }
    mask
}

fn all_solid_and_equal(children: &[Node]) -> bool {
    let first = children[0];
    if first.child_mask != 0xFF {
        return false;
    }
    children.iter().all(|c| c.child_mask == 0xFF && c.rgba == first.rgba)
}

/// Builds a sparse voxel octree from `voxels` and writes the finished, forward-ordered binary
/// file to `out`.
///
/// Internally this walks every position of the `2^depth`-per-axis cube in Morton order (spec
/// §4.4), streaming children to a temporary backward-order file before the reverse fixup pass
/// (§4.5) turns it into the forward file callers actually want. The temp file is always removed,
/// whether the build succeeds or fails.
pub fn build_streaming_svo<W: Write>(voxels: Vec<Voxel>, config: &BuildConfig, out: &mut W) -> Result<(), BuildError> {
    let depth = config.depth;
    if depth > morton::COORD_BITS {
        return Err(BuildError::InputRange(format!(
            "depth {depth} exceeds the maximum supported depth {}",
            morton::COORD_BITS
        )));
    }
    for v in &voxels {
        v.validate(depth)?;
    }

    log::info!("reordering {} voxels into morton order", voxels.len());
    let mut morton_voxels: Vec<(u64, Rgba8)> =
        voxels.into_iter().map(|v| (morton::encode(v.x, v.y, v.z), v.rgba)).collect();
    morton_voxels.sort_by_key(|(code, _)| *code);
    log::debug!("voxel reorder complete");

    let tmp_dir = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
    let mut tmp = tempfile::Builder::new().prefix("svoforge-backward-").tempfile_in(&tmp_dir)?;

    let mut builder = StreamingBuilder::new(depth, morton_voxels);
    let total_positions = 1u64 << (3 * depth);
    {
        let mut bw = BitWriter::new(&mut tmp);
        for pos in 0..total_positions {
            builder.add_voxel_to_queue(pos);
            builder.process_full_queues(&mut bw)?;
        }
        builder.finish_inner(&mut bw)?;
        bw.flush()?;
    }
    let total_records = builder.total_records;

    log::info!("streaming build wrote {total_records} records, {} indirections; reversing", builder.indirections.len());
    reverse::fixup(tmp.path(), &builder.indirections, total_records, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(voxels: Vec<Voxel>, depth: u32) -> Vec<u8> {
        let config = BuildConfig::with_depth(depth);
        let mut out = Vec::new();
        build_streaming_svo(voxels, &config, &mut out).unwrap();
        out
    }

    #[test]
    fn empty_cube_produces_single_all_zero_record() {
        let out = build(Vec::new(), 2);
        assert_eq!(out, vec![0u8; 8]);
    }

    #[test]
    fn single_voxel_produces_root_then_leaf() {
        let rgba = Rgba8::new(0xFF, 0x80, 0x40, 0xFF);
        let out = build(vec![Voxel::new(0, 0, 0, rgba)], 1);

        // record 0: root, mask=0b00000001, refer=0, offset=1, rgba matches the single leaf.
        let mut expected = vec![0b0000_0001, 0, 0, 0b0000_0001, 0xFF, 0x80, 0x40, 0xFF];
        // record 1: the leaf itself, mask=0xFF, offset=0.
        expected.extend_from_slice(&[0xFF, 0, 0, 0, 0xFF, 0x80, 0x40, 0xFF]);
        assert_eq!(out, expected);
    }

    #[test]
    fn eight_identical_children_collapse_to_solid_root() {
        let rgba = Rgba8::new(0x10, 0x20, 0x30, 0x40);
        let voxels: Vec<Voxel> = (0u32..8)
            .map(|i| {
                let (x, y, z) = morton::decode(i as u64);
                Voxel::new(x, y, z, rgba)
            })
            .collect();
        let out = build(voxels, 1);
        assert_eq!(out, vec![0xFF, 0, 0, 0, 0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn duplicate_morton_position_keeps_first_and_continues() {
        let first = Rgba8::new(1, 1, 1, 1);
        let dup = Rgba8::new(9, 9, 9, 9);
        let voxels = vec![Voxel::new(0, 0, 0, first), Voxel::new(0, 0, 0, dup)];
        // depth 1 so the cube has 8 positions; this should not panic or stall past the
        // duplicate, and the resulting root must reflect the first voxel's color only.
        let out = build(voxels, 1);
        assert_eq!(&out[4..8], &[1, 1, 1, 1]);
    }

    #[test]
    fn indirection_rewritten_to_absolute_forward_index() {
        // Drive the builder's internals directly rather than constructing an astronomically
        // large tree just to force a >2^23 child offset.
        let mut builder = StreamingBuilder::new(1, Vec::new());
        builder.out_pointer = 1 << 24; // force overflow of MAX_CHILD_OFFSET below
        let mut children = vec![Node::EMPTY; 8];
        children[0] = Node { child_mask: 1, refer_bit: false, child_offset: 0, child_pointer: 5, rgba: Rgba8::new(1, 2, 3, 4) };

        let mut tmp_buf = Vec::new();
        {
            let mut bw = BitWriter::new(&mut tmp_buf);
            builder.write_children(&children, &mut bw).unwrap();
        }

        assert_eq!(builder.indirections.len(), 1);
        let (w, target_p) = builder.indirections[0];
        assert_eq!(target_p, 5);
        assert_eq!(w, (1u64 << 24) - 1);
    }
}
