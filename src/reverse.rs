use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::BuildError;

/// Reads the streaming builder's backward-order temp file one 8-byte record at a time, from the
/// last record to the first, and writes each record straight to `out` — turning "children first,
/// root last" into "root first, children after" without ever holding the whole tree in memory.
///
/// This mirrors `SVOMaker::reverseNodeFile` in the original source, with one addition: records
/// flagged in `indirections` (backward record index -> the target's original write-order
/// pointer) are rewritten in place. An indirection record is created mid-stream, before the
/// total record count is known, so it cannot yet hold the target's final absolute position in
/// the forward file; this pass is the first point at which that count (`total_records`) is
/// known, so it patches the payload here instead of asking the streaming builder to guess it.
pub fn fixup<W: Write>(
    tmp_path: &Path,
    indirections: &[(u64, u64)],
    total_records: u64,
    out: &mut W,
) -> Result<(), BuildError> {
    let mut file = File::open(tmp_path)?;
    let len = file.metadata()?.len();
    if len % 8 != 0 {
        return Err(BuildError::InvariantViolation(format!(
            "backward temp file length {len} is not a multiple of the 8-byte record size"
        )));
    }
    let n_records = len / 8;
    if n_records != total_records {
        return Err(BuildError::InvariantViolation(format!(
            "backward temp file holds {n_records} records, expected {total_records}"
        )));
    }

    let lookup: HashMap<u64, u64> = indirections.iter().copied().collect();

    let mut buf = [0u8; 8];
    for w in (0..n_records).rev() {
        file.seek(SeekFrom::Start(w * 8))?;
        file.read_exact(&mut buf)?;
        if let Some(&target_p) = lookup.get(&w) {
            let absolute_forward_index = total_records - target_p;
            buf = absolute_forward_index.to_be_bytes();
        }
        out.write_all(&buf)?;
    }
    Ok(())
}
