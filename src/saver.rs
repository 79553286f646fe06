//! Bit-packed savers for linearized SVOs (`SVOSaver::save`/`saveOpt` in the original source).
//!
//! Two independent layouts are supported: [`save`] is a flat, fixed-width encoding where every
//! element costs exactly 64 bits; [`save_opt`] trades a small header for a packed encoding whose
//! pointer width grows only as needed and whose colors are deduplicated into a side table.

use std::io::Write;

use rustc_hash::FxHashMap;

use crate::bitio::BitWriter;
use crate::error::BuildError;
use crate::linearize::Element;
use crate::voxel::Rgba8;

/// Minimum bits needed to hold `v` as an unsigned integer; `0` still costs one bit. Used both
/// for the genuinely-minimal pointer width growth below and, less correctly but deliberately
/// so, for the color table width in [`save_opt`] — see the comment there.
fn bit_width(v: u64) -> u32 {
    if v == 0 {
        1
    } else {
        64 - v.leading_zeros()
    }
}

/// Flat fixed-width layout: each element is exactly 64 bits, `childMask(8) | childPointer(24) |
/// RGBA(32)`, MSB-first. `childPointer` here is a 24-bit field, distinct from the streaming
/// format's 23-bit one — the two encodings are not meant to be interchangeable.
pub fn save<W: Write>(elements: &[Element], out: &mut W) -> Result<(), BuildError> {
    let mut bw = BitWriter::new(out);
    for el in elements {
        bw.write_bits(u64::from(el.child_mask), 8)?;
        bw.write_bits(u64::from(el.child_pointer), 24)?;
        bw.write_bits(u64::from(el.rgba.to_u32()), 32)?;
    }
    bw.flush()?;
    Ok(())
}

/// Adaptively bit-packed layout with a deduplicated color table.
///
/// Section A: the element indices at which the child-pointer width must grow by one bit,
/// each a big-endian `u32`, terminated by a `0x00000000` sentinel. Section B: big-endian
/// `colorBits`, then `colorCount`, then `colorCount` packed 32-bit colors in first-seen order.
/// Section C: each element's `childMask` (8 bits), `childPointer` (current width), and color
/// table index (`colorBits` wide), with the width bumped by one bit every time a Section-A
/// index is reached — *before* that element is written.
pub fn save_opt<W: Write>(elements: &[Element], out: &mut W) -> Result<(), BuildError> {
    let mut bits = 1u32;
    let mut size_updates: Vec<u32> = Vec::new();
    for (i, el) in elements.iter().enumerate() {
        let needed = bit_width(u64::from(el.child_pointer));
        while bits < needed {
            size_updates.push(i as u32);
            bits += 1;
        }
    }

    let mut colors: Vec<Rgba8> = Vec::new();
    let mut seen: FxHashMap<Rgba8, u32> = FxHashMap::default();
    let mut color_ids: Vec<u32> = Vec::with_capacity(elements.len());
    for el in elements {
        let id = *seen.entry(el.rgba).or_insert_with(|| {
            colors.push(el.rgba);
            (colors.len() - 1) as u32
        });
        color_ids.push(id);
    }
    if colors.len() > (1usize << 31) {
        return Err(BuildError::ColorTableTooLarge(colors.len()));
    }
    // Deliberately `bit_width(colorCount)` rather than `bit_width(colorCount - 1)`: this is one
    // bit wider than necessary whenever `colorCount` is an exact power of two. Preserved from
    // the original saver — readers already rely on the width recorded in the header.
    let color_bits = bit_width(colors.len() as u64);

    let mut bw = BitWriter::new(out);

    for update in &size_updates {
        bw.write_u32_be(*update)?;
    }
    bw.write_u32_be(0)?;

    bw.write_u32_be(color_bits)?;
    bw.write_u32_be(colors.len() as u32)?;
    for c in &colors {
        bw.write_bits(u64::from(c.to_u32()), 32)?;
    }

    let mut bits = 1u32;
    let mut next_update = size_updates.iter().peekable();
    for (i, el) in elements.iter().enumerate() {
        while next_update.peek() == Some(&&(i as u32)) {
            bits += 1;
            next_update.next();
        }
        bw.write_bits(u64::from(el.child_mask), 8)?;
        bw.write_bits(u64::from(el.child_pointer), bits as u8)?;
        bw.write_bits(u64::from(color_ids[i]), color_bits as u8)?;
    }
    bw.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(mask: u8, ptr: u32, rgba: Rgba8) -> Element {
        Element { child_mask: mask, child_pointer: ptr, rgba }
    }

    #[test]
    fn save_fixed_layout_packs_64_bits_per_element() {
        let rgba = Rgba8::new(1, 2, 3, 4);
        let elements = vec![el(0b0000_0011, 5, rgba)];
        let mut out = Vec::new();
        save(&elements, &mut out).unwrap();

        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0b0000_0011);
        // 24-bit pointer field (5) followed by the 32-bit color, byte-aligned.
        assert_eq!(&out[1..4], &[0, 0, 5]);
        assert_eq!(&out[4..8], &[1, 2, 3, 4]);
    }

    #[test]
    fn save_opt_dedups_three_colors_across_many_nodes() {
        let colors = [Rgba8::new(1, 0, 0, 1), Rgba8::new(0, 1, 0, 1), Rgba8::new(0, 0, 1, 1)];
        let elements: Vec<Element> = (0..1000).map(|i| el(0, 0, colors[i % 3])).collect();

        let mut out = Vec::new();
        save_opt(&elements, &mut out).unwrap();

        // Section A is just the terminator (no pointer ever needs more than 1 bit here).
        assert_eq!(&out[0..4], &[0, 0, 0, 0]);
        // Section B: colorBits=2 (3 colors -> needs 2 bits), colorCount=3.
        assert_eq!(&out[4..8], &[0, 0, 0, 2]);
        assert_eq!(&out[8..12], &[0, 0, 0, 3]);
    }

    #[test]
    fn save_opt_grows_pointer_width_exactly_when_needed() {
        // element 0 has a small pointer (fits in 1 bit); element 1 needs 3 bits (value 4).
        let rgba = Rgba8::new(0, 0, 0, 0);
        let elements = vec![el(0xFF, 0, rgba), el(0xFF, 4, rgba)];
        let mut out = Vec::new();
        save_opt(&elements, &mut out).unwrap();

        // Section A: two size-updates at index 1 (1 -> 2 bits, 2 -> 3 bits), then terminator.
        assert_eq!(&out[0..4], &[0, 0, 0, 1]);
        assert_eq!(&out[4..8], &[0, 0, 0, 1]);
        assert_eq!(&out[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn single_color_table_entry_round_trips() {
        let elements = vec![el(0, 0, Rgba8::new(1, 1, 1, 1))];
        let mut out = Vec::new();
        save_opt(&elements, &mut out).unwrap();
        assert_eq!(&out[4..8], &[0, 0, 0, 1]); // colorBits: bit_width(1) == 1
        assert_eq!(&out[8..12], &[0, 0, 0, 1]); // colorCount == 1
    }
}
