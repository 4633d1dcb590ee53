//! Deterministic keyspace partitioning.
//!
//! For every candidate length `L` the keyspace `[0, 36^L)` is split into
//! `part_count` contiguous ranges. The first `36^L % part_count` parts get
//! one extra element, so the ranges never overlap and always cover the
//! whole keyspace. A part's full workload is the union of its range at
//! every length `1..=max_length`.

use std::ops::Range;

use crate::protocol::TaskAssignment;

/// Candidate alphabet. The index of a symbol is its digit value.
pub const ALPHABET: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Number of symbols in [`ALPHABET`].
pub const ALPHABET_SIZE: u64 = ALPHABET.len() as u64;

/// Longest supported candidate. `Σ 36^L` for `L <= 12` still fits a `u64`.
pub const MAX_CANDIDATE_LENGTH: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    #[error("part count must be at least 1")]
    NoParts,

    #[error("part number {part_number} is out of range for {part_count} parts")]
    PartOutOfRange { part_number: u32, part_count: u32 },

    #[error("candidate length {0} is outside 1..={MAX_CANDIDATE_LENGTH}")]
    LengthOutOfRange(u32),
}

/// Number of candidates of exactly `length` symbols.
pub fn keyspace_size(length: u32) -> Result<u64, PartitionError> {
    if length == 0 || length > MAX_CANDIDATE_LENGTH {
        return Err(PartitionError::LengthOutOfRange(length));
    }
    Ok(ALPHABET_SIZE.pow(length))
}

/// The offset range owned by `part_number` at a single candidate length.
pub fn part_range(
    part_number: u32,
    part_count: u32,
    length: u32,
) -> Result<Range<u64>, PartitionError> {
    check_part(part_number, part_count)?;
    let total = keyspace_size(length)?;

    let parts = u64::from(part_count);
    let part = u64::from(part_number);
    let per_part = total / parts;
    let remainder = total % parts;

    let range = if part < remainder {
        let start = part * (per_part + 1);
        start..start + per_part + 1
    } else {
        let start = remainder * (per_part + 1) + (part - remainder) * per_part;
        start..start + per_part
    };
    Ok(range)
}

/// Every `(length, range)` pair a part has to scan, shortest length first.
pub fn part_ranges(
    part_number: u32,
    part_count: u32,
    max_length: u32,
) -> Result<Vec<(u32, Range<u64>)>, PartitionError> {
    if max_length == 0 || max_length > MAX_CANDIDATE_LENGTH {
        return Err(PartitionError::LengthOutOfRange(max_length));
    }
    (1..=max_length)
        .map(|length| part_range(part_number, part_count, length).map(|r| (length, r)))
        .collect()
}

/// Total number of candidates a part scans across all lengths.
pub fn part_workload(
    part_number: u32,
    part_count: u32,
    max_length: u32,
) -> Result<u64, PartitionError> {
    Ok(part_ranges(part_number, part_count, max_length)?
        .into_iter()
        .map(|(_, range)| range.end - range.start)
        .sum())
}

/// Decode a keyspace offset into a candidate of exactly `length` symbols.
///
/// Digits are emitted least-significant first: offset 1 at length 2 is
/// `"ba"`, not `"ab"`.
pub fn num_to_word(num: u64, length: u32) -> String {
    let mut word = String::with_capacity(length as usize);
    decode_into(num, length, &mut word);
    word
}

/// Allocation-free variant of [`num_to_word`] for hot loops. Clears `buf`.
pub fn decode_into(mut num: u64, length: u32, buf: &mut String) {
    buf.clear();
    for _ in 0..length {
        let digit = (num % ALPHABET_SIZE) as usize;
        num /= ALPHABET_SIZE;
        buf.push(ALPHABET[digit] as char);
    }
}

/// Build one assignment per part for a request.
pub fn plan_assignments(
    request_id: &str,
    hash: &str,
    max_length: u32,
    part_count: u32,
) -> Result<Vec<TaskAssignment>, PartitionError> {
    if part_count == 0 {
        return Err(PartitionError::NoParts);
    }
    keyspace_size(max_length)?;
    Ok((0..part_count)
        .map(|part_number| TaskAssignment {
            request_id: request_id.to_string(),
            hash: hash.to_string(),
            max_length,
            part_number,
            part_count,
        })
        .collect())
}

fn check_part(part_number: u32, part_count: u32) -> Result<(), PartitionError> {
    if part_count == 0 {
        return Err(PartitionError::NoParts);
    }
    if part_number >= part_count {
        return Err(PartitionError::PartOutOfRange {
            part_number,
            part_count,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
