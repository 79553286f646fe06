use std::io::{self, Write};

use crate::bitio::BitWriter;
use crate::voxel::Rgba8;

/// Bit width of the fixed child-offset field in the streaming wire format (spec §3 invariant 3).
pub const CHILD_OFFSET_BITS: u32 = 23;
pub const MAX_CHILD_OFFSET: u64 = (1 << CHILD_OFFSET_BITS) - 1;

/// Canonical in-memory representation of an octree node as produced by the streaming builder.
///
/// `child_pointer` is never serialized directly — it is the node's own absolute record index
/// once written, used by its *parent* to compute the relative `child_offset` that does get
/// serialized. A node with `child_mask == 0` is empty; `child_mask == 0xFF` with no children
/// materialized is a solid leaf.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub child_mask: u8,
    pub refer_bit: bool,
    /// Relative offset to the first child, as written to disk. 23 bits.
    pub child_offset: u32,
    /// Absolute record index this node was written at (0 if not yet written / has no children).
    pub child_pointer: u64,
    pub rgba: Rgba8,
}

impl Node {
    pub const EMPTY: Node = Node {
        child_mask: 0,
        refer_bit: false,
        child_offset: 0,
        child_pointer: 0,
        rgba: Rgba8::EMPTY,
    };

    pub fn solid_leaf(rgba: Rgba8) -> Node {
        Node { child_mask: 0xFF, refer_bit: false, child_offset: 0, child_pointer: 0, rgba }
    }

    pub fn is_empty(&self) -> bool {
        self.child_mask == 0
    }
}

/// Writes the fixed 64-bit node record, MSB-first: `childMask(8) | referBit(1) | childOffset(23)
/// | R(8) | G(8) | B(8) | A(8)`.
pub fn write_node<W: Write>(bw: &mut BitWriter<W>, node: &Node) -> io::Result<()> {
    bw.write_bits(u64::from(node.child_mask), 8)?;
    bw.write_bits(node.refer_bit as u64, 1)?;
    bw.write_bits(u64::from(node.child_offset), CHILD_OFFSET_BITS as u8)?;
    bw.write_bits(u64::from(node.rgba.r), 8)?;
    bw.write_bits(u64::from(node.rgba.g), 8)?;
    bw.write_bits(u64::from(node.rgba.b), 8)?;
    bw.write_bits(u64::from(node.rgba.a), 8)?;
    Ok(())
}

/// Writes a 64-bit indirection record: an absolute record index in the low 63 bits. The
/// `refer_bit`-equivalent high bit is always 0 here — callers distinguish indirection records
/// structurally (they are written immediately before the child whose `referBit` is set) rather
/// than via a bit in the record itself, matching `NodeWrite::writeRefer` in the original source.
pub fn write_indirection<W: Write>(bw: &mut BitWriter<W>, absolute_index: u64) -> io::Result<()> {
    bw.write_bits(absolute_index, 64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_node_packs_fields_msb_first() {
        let node = Node {
            child_mask: 0b0000_0001,
            refer_bit: true,
            child_offset: 3,
            child_pointer: 0,
            rgba: Rgba8::new(0xFF, 0x80, 0x40, 0xFF),
        };

        let mut out = Vec::new();
        {
            let mut bw = BitWriter::new(&mut out);
            write_node(&mut bw, &node).unwrap();
            bw.flush().unwrap();
        }

        // mask(8)=0b00000001 refer(1)=1 offset(23)=0...011 R G B A
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0b0000_0001);
        // next bit is refer=1, followed by top bits of the 23-bit offset (all zero until the
        // last two bits, which hold the value 3 == 0b11).
        assert_eq!(out[7], 0xFF); // A channel, byte-aligned at the end
    }

    #[test]
    fn empty_node_round_trips_to_all_zero_record() {
        let mut out = Vec::new();
        {
            let mut bw = BitWriter::new(&mut out);
            write_node(&mut bw, &Node::EMPTY).unwrap();
            bw.flush().unwrap();
        }
        assert_eq!(out, vec![0u8; 8]);
    }

    #[test]
    fn solid_leaf_has_full_mask_and_no_offset() {
        let node = Node::solid_leaf(Rgba8::new(0x10, 0x20, 0x30, 0x40));
        let mut out = Vec::new();
        {
            let mut bw = BitWriter::new(&mut out);
            write_node(&mut bw, &node).unwrap();
            bw.flush().unwrap();
        }
        assert_eq!(out, vec![0xFF, 0x00, 0x00, 0x00, 0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn indirection_record_is_64_bit_absolute_index() {
        let mut out = Vec::new();
        {
            let mut bw = BitWriter::new(&mut out);
            write_indirection(&mut bw, 0x0102_0304_0506_0708).unwrap();
        }
        assert_eq!(out, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }
}
