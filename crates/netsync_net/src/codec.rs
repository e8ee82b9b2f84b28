//! Fixed-layout binary codec for object state records.
//!
//! A record is the owner tag followed by position, velocity and acceleration,
//! all little-endian:
//!
//! ```text
//! offset  size  field
//!      0     2  owner            u16
//!      2    12  position x,y,z   f32 × 3
//!     14    12  velocity x,y,z   f32 × 3
//!     26    12  acceleration     f32 × 3
//! ```
//!
//! There is no length prefix and no versioning; both ends agree on the layout
//! at compile time. Snapshots are a run of `(slot u16, record)` entries whose
//! count follows from the payload length.

use netsync_math::Vec3;
use netsync_state::{ObjectState, ObjectTable, OwnerId};

use crate::error::CodecError;

/// Encoded size of one [`ObjectState`].
pub const RECORD_SIZE: usize = 2 + 9 * 4;

/// Encoded size of one [`SnapshotEntry`].
pub const SNAPSHOT_ENTRY_SIZE: usize = 2 + RECORD_SIZE;

/// One object of a snapshot: the table slot it belongs to and its state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotEntry {
    /// Slot index in the sender's table.
    pub slot: OwnerId,
    /// The object's state.
    pub state: ObjectState,
}

/// Split `N` bytes off the front of `input`.
pub(crate) fn take<const N: usize>(input: &mut &[u8]) -> Result<[u8; N], CodecError> {
    if input.len() < N {
        return Err(CodecError::Truncated {
            needed: N,
            remaining: input.len(),
        });
    }
    let (head, rest) = input.split_at(N);
    *input = rest;
    let mut buf = [0u8; N];
    buf.copy_from_slice(head);
    Ok(buf)
}

pub(crate) fn read_u16(input: &mut &[u8]) -> Result<u16, CodecError> {
    take::<2>(input).map(u16::from_le_bytes)
}

pub(crate) fn read_u32(input: &mut &[u8]) -> Result<u32, CodecError> {
    take::<4>(input).map(u32::from_le_bytes)
}

pub(crate) fn read_u64(input: &mut &[u8]) -> Result<u64, CodecError> {
    take::<8>(input).map(u64::from_le_bytes)
}

fn read_f32(input: &mut &[u8]) -> Result<f32, CodecError> {
    take::<4>(input).map(f32::from_le_bytes)
}

fn read_vec3(input: &mut &[u8]) -> Result<Vec3, CodecError> {
    Ok(Vec3::new(
        read_f32(input)?,
        read_f32(input)?,
        read_f32(input)?,
    ))
}

fn write_vec3(v: Vec3, out: &mut Vec<u8>) {
    out.extend_from_slice(&v.x.to_le_bytes());
    out.extend_from_slice(&v.y.to_le_bytes());
    out.extend_from_slice(&v.z.to_le_bytes());
}

/// Append the wire form of `state` to `out`.
pub fn encode_state(state: &ObjectState, out: &mut Vec<u8>) {
    out.extend_from_slice(&state.owner.to_le_bytes());
    write_vec3(state.position, out);
    write_vec3(state.velocity, out);
    write_vec3(state.acceleration, out);
}

/// Read one record from the front of `input`, advancing it.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if fewer than [`RECORD_SIZE`] bytes remain.
/// `input` is left untouched in that case.
pub fn decode_state(input: &mut &[u8]) -> Result<ObjectState, CodecError> {
    if input.len() < RECORD_SIZE {
        return Err(CodecError::Truncated {
            needed: RECORD_SIZE,
            remaining: input.len(),
        });
    }
    Ok(ObjectState {
        owner: read_u16(input)?,
        position: read_vec3(input)?,
        velocity: read_vec3(input)?,
        acceleration: read_vec3(input)?,
    })
}

/// Append a snapshot of `table` to `out`, skipping the slot of `excluded` and
/// any slot it owns.
///
/// Used to avoid echoing a client's own object back to it. Returns the number
/// of entries written.
pub fn encode_snapshot(table: &ObjectTable, excluded: OwnerId, out: &mut Vec<u8>) -> usize {
    let mut written = 0;
    for (slot, state) in table.iter() {
        if slot == excluded || state.owner == excluded {
            continue;
        }
        out.extend_from_slice(&slot.to_le_bytes());
        encode_state(state, out);
        written += 1;
    }
    written
}

/// Collect the snapshot entries [`encode_snapshot`] would write.
#[must_use]
pub fn snapshot_entries(table: &ObjectTable, excluded: OwnerId) -> Vec<SnapshotEntry> {
    table
        .iter()
        .filter(|(slot, state)| *slot != excluded && state.owner != excluded)
        .map(|(slot, state)| SnapshotEntry {
            slot,
            state: *state,
        })
        .collect()
}

/// Append pre-collected snapshot entries to `out`.
pub fn encode_entries(entries: &[SnapshotEntry], out: &mut Vec<u8>) {
    out.reserve(entries.len() * SNAPSHOT_ENTRY_SIZE);
    for entry in entries {
        out.extend_from_slice(&entry.slot.to_le_bytes());
        encode_state(&entry.state, out);
    }
}

/// Decode a whole snapshot payload.
///
/// The payload must be an exact multiple of [`SNAPSHOT_ENTRY_SIZE`]; a partial
/// trailing entry fails the entire snapshot so that nothing from a damaged
/// message is applied.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] on a partial trailing entry.
pub fn decode_snapshot(mut input: &[u8]) -> Result<Vec<SnapshotEntry>, CodecError> {
    let partial = input.len() % SNAPSHOT_ENTRY_SIZE;
    if partial != 0 {
        return Err(CodecError::Truncated {
            needed: SNAPSHOT_ENTRY_SIZE,
            remaining: partial,
        });
    }
    let mut entries = Vec::with_capacity(input.len() / SNAPSHOT_ENTRY_SIZE);
    while !input.is_empty() {
        let slot = read_u16(&mut input)?;
        let state = decode_state(&mut input)?;
        entries.push(SnapshotEntry { slot, state });
    }
    Ok(entries)
}
