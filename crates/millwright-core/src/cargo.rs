//! Packed byte encoding of one conveyor segment.
//!
//! A [`CargoPathBuffer`] is a flat `Vec<u8>` of `10 * capacity` bytes. Every
//! cargo record occupies ten contiguous bytes around its *head* index `h`:
//!
//! ```text
//! h-4 h-3 h-2 h-1  h    h+1   h+2   h+3   h+4   h+5
//! 246 247 248 249 250  byte0 byte1 byte2 byte3  255
//! ```
//!
//! The four record bytes are each biased by +1, so no byte inside a record is
//! ever 0. An aligned probe reading `0` is on an empty stretch and may skip
//! [`EMPTY_STRIDE`] bytes: a ten-byte run of nonzero bytes cannot hide in a
//! five-byte gap. A probe reading `246..=250` is `250 - marker` bytes before
//! the record head. Any other byte at an aligned probe means the buffer is
//! corrupted, which is fatal.
//!
//! This layout is the persistence format of the host and must stay bit-exact.

use crate::id::ItemId;
use serde::{Deserialize, Serialize};

/// Bytes per cargo position.
pub const SLOT_STRIDE: usize = 10;
/// Fast-forward distance over empty bytes.
pub const EMPTY_STRIDE: usize = 5;
/// Marker byte at a record head.
pub const HEAD_MARKER: u8 = 250;
/// Lowest lead-in marker; a lead byte `m` sits `250 - m` bytes before the head.
pub const LEAD_MARKER_MIN: u8 = 246;
/// Last byte of every record.
pub const TAIL_MARKER: u8 = 255;

/// Offset of the head byte from the first byte of its record.
const HEAD_FROM_START: usize = 4;
const LEAD_PATTERN: [u8; 5] = [246, 247, 248, 249, 250];

// ---------------------------------------------------------------------------
// Cargo record
// ---------------------------------------------------------------------------

/// One stack of items travelling on a belt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cargo {
    pub item: ItemId,
    pub stack: u8,
    pub inc: u8,
}

impl Cargo {
    pub const MAX_STACK: u8 = 254;
    pub const MAX_INC: u8 = 254;

    pub fn new(item: ItemId, stack: u8, inc: u8) -> Self {
        Self { item, stack, inc }
    }

    /// Whether all fields fit the four-byte encoding.
    pub fn is_encodable(&self) -> bool {
        self.item <= ItemId::MAX && self.stack <= Self::MAX_STACK && self.inc <= Self::MAX_INC
    }

    /// Encode into the +1-biased four-byte record form.
    #[inline]
    pub fn encode(&self) -> [u8; 4] {
        debug_assert!(self.is_encodable(), "cargo out of encodable range: {self:?}");
        [
            (self.item.0 & 0x7F) as u8 + 1,
            (self.item.0 >> 7) as u8 + 1,
            self.stack + 1,
            self.inc + 1,
        ]
    }

    /// Decode a four-byte record. Returns `None` if any byte is 0 (absent).
    #[inline]
    pub fn decode(bytes: [u8; 4]) -> Option<Cargo> {
        if bytes.contains(&0) {
            return None;
        }
        Some(Cargo {
            item: ItemId((bytes[0] - 1) as u16 | (((bytes[1] - 1) as u16) << 7)),
            stack: bytes[2] - 1,
            inc: bytes[3] - 1,
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by checked buffer construction and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CargoPathError {
    #[error("corrupted cargo buffer: byte {byte} at offset {offset}")]
    Corrupted { offset: usize, byte: u8 },
    #[error("buffer length {0} is not a positive multiple of 10")]
    BadLength(usize),
    #[error("cargo out of encodable range: {0:?}")]
    OutOfRange(Cargo),
}

#[cold]
#[inline(never)]
#[track_caller]
fn corrupted(offset: usize, byte: u8) -> ! {
    panic!("{}", CargoPathError::Corrupted { offset, byte })
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

/// A record resolved from a logical buffer index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CargoLocation {
    pub cargo: Cargo,
    /// Index of the first of the four record bytes (`head + 1`).
    pub cargo_index: usize,
    /// Distance from the probed index to the record head. `0..=4` when the
    /// probe hit a marker, negative when it hit the record body.
    pub offset: isize,
}

impl CargoLocation {
    /// The record head index.
    pub fn head(&self) -> usize {
        self.cargo_index - 1
    }
}

// ---------------------------------------------------------------------------
// CargoPathBuffer
// ---------------------------------------------------------------------------

/// The state of one conveyor segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoPathBuffer {
    buffer: Vec<u8>,
    /// Bytes a record advances per tick.
    speed: u8,
    /// Whether the segment feeds back into its own head.
    closed: bool,
}

impl CargoPathBuffer {
    /// An empty segment holding up to `capacity` cargo records.
    pub fn new(capacity: u32, speed: u8, closed: bool) -> Self {
        Self {
            buffer: vec![0; capacity.max(1) as usize * SLOT_STRIDE],
            speed,
            closed,
        }
    }

    /// Adopt a persisted buffer, validating every record.
    pub fn from_bytes(bytes: Vec<u8>, speed: u8, closed: bool) -> Result<Self, CargoPathError> {
        if bytes.is_empty() || bytes.len() % SLOT_STRIDE != 0 {
            return Err(CargoPathError::BadLength(bytes.len()));
        }
        let path = Self {
            buffer: bytes,
            speed,
            closed,
        };
        path.validate()?;
        Ok(path)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Buffer length in bytes (the path length).
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of cargo positions.
    pub fn capacity(&self) -> u32 {
        (self.buffer.len() / SLOT_STRIDE) as u32
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Highest head index a record can occupy (its tail marker is the last byte).
    #[inline]
    pub fn last_head(&self) -> usize {
        self.buffer.len() - 6
    }

    /// True when no record is present.
    pub fn is_empty(&self) -> bool {
        self.cargos().next().is_none()
    }

    // -----------------------------------------------------------------------
    // Low-level record access
    // -----------------------------------------------------------------------

    /// True when the ten bytes starting at `start` hold no record byte.
    ///
    /// Checking the two end bytes suffices: a record is ten contiguous
    /// nonzero bytes and cannot fit strictly between them.
    #[inline]
    fn window_vacant(&self, start: usize) -> bool {
        start + SLOT_STRIDE <= self.buffer.len()
            && self.buffer[start] == 0
            && self.buffer[start + SLOT_STRIDE - 1] == 0
    }

    #[inline]
    fn has_lead_at(&self, start: usize) -> bool {
        start + LEAD_PATTERN.len() <= self.buffer.len()
            && self.buffer[start..start + LEAD_PATTERN.len()] == LEAD_PATTERN
    }

    #[inline]
    fn write_record(&mut self, head: usize, cargo: Cargo) {
        let start = head - HEAD_FROM_START;
        self.buffer[start..=head].copy_from_slice(&LEAD_PATTERN);
        self.buffer[head + 1..head + 5].copy_from_slice(&cargo.encode());
        self.buffer[head + 5] = TAIL_MARKER;
    }

    #[inline]
    fn clear_record(&mut self, head: usize) {
        let start = head - HEAD_FROM_START;
        self.buffer[start..start + SLOT_STRIDE].fill(0);
    }

    #[inline]
    #[track_caller]
    fn read_record(&self, head: usize) -> Cargo {
        let bytes = [
            self.buffer[head + 1],
            self.buffer[head + 2],
            self.buffer[head + 3],
            self.buffer[head + 4],
        ];
        match Cargo::decode(bytes) {
            Some(cargo) => cargo,
            None => corrupted(head + 1, 0),
        }
    }

    /// Resolve an aligned probe at `i` into the head of the record it starts.
    /// Returns `None` on an empty byte and panics on anything but a marker.
    #[inline]
    #[track_caller]
    fn head_at_aligned(&self, i: usize) -> Option<usize> {
        match self.buffer[i] {
            0 => None,
            b @ LEAD_MARKER_MIN..=HEAD_MARKER => Some(i + (HEAD_MARKER - b) as usize),
            b => corrupted(i, b),
        }
    }

    /// Find the record covering `i` by its lead pattern, scanning back at
    /// most one record length. The pattern `246 247 248 249 250` cannot occur
    /// inside record data (only four data bytes sit between 250 and 255), so
    /// the match is exact.
    fn covering_head(&self, i: usize) -> Option<usize> {
        let lowest = i.saturating_sub(SLOT_STRIDE - 1);
        (lowest..=i)
            .rev()
            .find(|&start| self.has_lead_at(start))
            .map(|start| start + HEAD_FROM_START)
    }

    /// Resolve any index to the head of the record covering it.
    #[track_caller]
    fn resolve(&self, i: usize) -> Option<usize> {
        let b = self.buffer[i];
        if b == 0 {
            return None;
        }
        if (LEAD_MARKER_MIN..=HEAD_MARKER).contains(&b) {
            let back = (b - LEAD_MARKER_MIN) as usize;
            if i >= back && self.has_lead_at(i - back) {
                return Some(i + (HEAD_MARKER - b) as usize);
            }
        }
        match self.covering_head(i) {
            Some(head) => Some(head),
            None => corrupted(i, b),
        }
    }

    /// Head of the first record starting at or after `i`, scanning forward
    /// up to `end`. `i` must be aligned.
    #[inline]
    #[track_caller]
    fn next_head(&self, mut i: usize, end: usize) -> Option<usize> {
        while i < end {
            match self.head_at_aligned(i) {
                None => i += EMPTY_STRIDE,
                Some(head) => return Some(head),
            }
        }
        None
    }

    // -----------------------------------------------------------------------
    // Insertion
    // -----------------------------------------------------------------------

    /// Probe the head window. Returns the insertion offset (always 0) when
    /// the head is vacant.
    pub fn test_blank_at_head(&self) -> Option<usize> {
        if self.window_vacant(0) { Some(0) } else { None }
    }

    /// Place a record at the head. Fails without mutation when occupied.
    pub fn insert_at_head(&mut self, cargo: Cargo) -> bool {
        self.try_insert_at(HEAD_FROM_START, cargo)
    }

    /// Whether a record could be placed with its head at `head`.
    #[inline]
    pub fn can_insert_at(&self, head: usize) -> bool {
        head >= HEAD_FROM_START && self.window_vacant(head - HEAD_FROM_START)
    }

    /// Place a record with its head at `head` if the ten bytes around it are
    /// vacant and in bounds.
    pub fn try_insert_at(&mut self, head: usize, cargo: Cargo) -> bool {
        if !self.can_insert_at(head) {
            return false;
        }
        self.write_record(head, cargo);
        true
    }

    // -----------------------------------------------------------------------
    // Queries and removal
    // -----------------------------------------------------------------------

    /// Resolve logical index `i` to the record covering it.
    #[track_caller]
    pub fn get_cargo_at_index(&self, i: usize) -> Option<CargoLocation> {
        if i >= self.buffer.len() {
            return None;
        }
        let head = self.resolve(i)?;
        Some(CargoLocation {
            cargo: self.read_record(head),
            cargo_index: head + 1,
            offset: head as isize - i as isize,
        })
    }

    /// Zero the record covering `i`, returning it.
    #[track_caller]
    pub fn remove_cargo_at_index(&mut self, i: usize) -> Option<Cargo> {
        if i >= self.buffer.len() {
            return None;
        }
        let head = self.resolve(i)?;
        let cargo = self.read_record(head);
        self.clear_record(head);
        Some(cargo)
    }

    /// Rewrite the four record bytes of the record covering `i`.
    #[track_caller]
    pub fn set_cargo_at_index(&mut self, i: usize, cargo: Cargo) -> bool {
        if i >= self.buffer.len() {
            return false;
        }
        match self.resolve(i) {
            Some(head) => {
                self.buffer[head + 1..head + 5].copy_from_slice(&cargo.encode());
                true
            }
            None => false,
        }
    }

    /// The record that has arrived at the tail, if any.
    pub fn peek_at_end(&self) -> Option<Cargo> {
        let start = self.buffer.len() - SLOT_STRIDE;
        if self.buffer[self.buffer.len() - 1] == TAIL_MARKER && self.has_lead_at(start) {
            Some(self.read_record(start + HEAD_FROM_START))
        } else {
            None
        }
    }

    /// Remove and return the record that has arrived at the tail.
    pub fn try_pick_at_end(&mut self) -> Option<Cargo> {
        let cargo = self.peek_at_end()?;
        self.clear_record(self.last_head());
        Some(cargo)
    }

    /// Remove the first record whose head lies in
    /// `[range_start, range_start + range_len)` and whose item matches
    /// `filter` (`ItemId::NONE` accepts any item).
    #[track_caller]
    pub fn try_pick_item(
        &mut self,
        range_start: usize,
        range_len: usize,
        filter: ItemId,
    ) -> Option<(Cargo, usize)> {
        self.try_pick_matching(range_start, range_len, |cargo| {
            filter.is_none() || cargo.item == filter
        })
    }

    /// Like [`try_pick_item`](Self::try_pick_item) with an arbitrary predicate.
    #[track_caller]
    pub fn try_pick_matching(
        &mut self,
        range_start: usize,
        range_len: usize,
        mut accept: impl FnMut(&Cargo) -> bool,
    ) -> Option<(Cargo, usize)> {
        let head = self.find_head_in(range_start, range_len, |c| accept(c))?;
        let cargo = self.read_record(head);
        self.clear_record(head);
        Some((cargo, head))
    }

    /// Head of the first record in range satisfying `accept`, read-only.
    #[track_caller]
    pub fn find_head_in(
        &self,
        range_start: usize,
        range_len: usize,
        mut accept: impl FnMut(&Cargo) -> bool,
    ) -> Option<usize> {
        let end = (range_start + range_len).min(self.buffer.len());
        if range_start >= end {
            return None;
        }

        // Align: the range may start inside a record.
        let mut i = range_start;
        if let Some(head) = self.resolve(i) {
            if head >= range_start && head < end && accept(&self.read_record(head)) {
                return Some(head);
            }
            i = head + 6;
        }

        while let Some(head) = self.next_head(i, end) {
            if head >= end {
                return None;
            }
            if accept(&self.read_record(head)) {
                return Some(head);
            }
            i = head + 6;
        }
        None
    }

    // -----------------------------------------------------------------------
    // Iteration
    // -----------------------------------------------------------------------

    /// Iterate `(head, cargo)` from the head end toward the tail.
    pub fn cargos(&self) -> Cargos<'_> {
        Cargos { path: self, i: 0 }
    }

    /// Total items across all records.
    pub fn item_count(&self) -> u32 {
        self.cargos().map(|(_, c)| c.stack as u32).sum()
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        self.cargos().count()
    }

    /// Sum of stacks for records whose head lies in `[start, start + len)`.
    pub fn count_in_range(&self, start: usize, len: usize) -> u32 {
        let mut total = 0;
        let end = (start + len).min(self.buffer.len());
        let mut i = start;
        if i < end && let Some(head) = self.resolve(i) {
            if head >= start && head < end {
                total += self.read_record(head).stack as u32;
            }
            i = head + 6;
        }
        while let Some(head) = self.next_head(i, end) {
            if head >= end {
                break;
            }
            total += self.read_record(head).stack as u32;
            i = head + 6;
        }
        total
    }

    // -----------------------------------------------------------------------
    // Movement
    // -----------------------------------------------------------------------

    /// Move every record up to `speed` bytes toward the tail. Records are
    /// processed tail-first and stop behind the record ahead of them; the
    /// record at the tail stays until picked or handed off.
    pub fn advance(&mut self) {
        let speed = self.speed as usize;
        if speed == 0 {
            return;
        }
        let mut limit = self.last_head();
        let mut i = self.buffer.len() as isize - 1;

        while i >= 0 {
            let at = i as usize;
            if self.buffer[at] == 0 {
                i -= EMPTY_STRIDE as isize;
                continue;
            }
            let head = match self.covering_head(at) {
                Some(head) => head,
                None => corrupted(at, self.buffer[at]),
            };
            let target = (head + speed).min(limit).max(head);
            if target != head {
                let start = head - HEAD_FROM_START;
                let mut record = [0u8; SLOT_STRIDE];
                record.copy_from_slice(&self.buffer[start..start + SLOT_STRIDE]);
                self.buffer[start..start + SLOT_STRIDE].fill(0);
                let to = target - HEAD_FROM_START;
                self.buffer[to..to + SLOT_STRIDE].copy_from_slice(&record);
            }
            limit = target.saturating_sub(SLOT_STRIDE);
            i = head as isize - 5;
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check every record for a complete lead, decodable data and a tail
    /// marker, walking the buffer the way the hot paths do.
    pub fn validate(&self) -> Result<(), CargoPathError> {
        let len = self.buffer.len();
        let mut i = 0;
        while i < len {
            let b = self.buffer[i];
            if b == 0 {
                i += EMPTY_STRIDE;
                continue;
            }
            if !(LEAD_MARKER_MIN..=HEAD_MARKER).contains(&b) {
                return Err(CargoPathError::Corrupted { offset: i, byte: b });
            }
            let head = i + (HEAD_MARKER - b) as usize;
            if head < HEAD_FROM_START || head + 5 >= len || !self.has_lead_at(head - HEAD_FROM_START) {
                return Err(CargoPathError::Corrupted { offset: i, byte: b });
            }
            let data = [
                self.buffer[head + 1],
                self.buffer[head + 2],
                self.buffer[head + 3],
                self.buffer[head + 4],
            ];
            let Some(cargo) = Cargo::decode(data) else {
                return Err(CargoPathError::Corrupted { offset: head + 1, byte: 0 });
            };
            if !cargo.is_encodable() {
                return Err(CargoPathError::OutOfRange(cargo));
            }
            if self.buffer[head + 5] != TAIL_MARKER {
                return Err(CargoPathError::Corrupted {
                    offset: head + 5,
                    byte: self.buffer[head + 5],
                });
            }
            i = head + 6;
        }
        Ok(())
    }
}

/// Aligned forward iterator over records.
pub struct Cargos<'a> {
    path: &'a CargoPathBuffer,
    i: usize,
}

impl Iterator for Cargos<'_> {
    type Item = (usize, Cargo);

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.path.next_head(self.i, self.path.buffer.len())?;
        self.i = head + 6;
        Some((head, self.path.read_record(head)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cargo(item: u16, stack: u8) -> Cargo {
        Cargo::new(ItemId(item), stack, 0)
    }

    #[test]
    fn encode_matches_wire_layout() {
        let c = Cargo::new(ItemId(1101), 3, 7);
        let bytes = c.encode();
        assert_eq!(bytes, [(1101 & 0x7F) as u8 + 1, (1101 >> 7) as u8 + 1, 4, 8]);
        assert_eq!(Cargo::decode(bytes), Some(c));
    }

    #[test]
    fn decode_rejects_zero_bytes() {
        assert_eq!(Cargo::decode([0, 1, 1, 1]), None);
        assert_eq!(Cargo::decode([1, 1, 1, 0]), None);
    }

    #[test]
    fn encode_extremes() {
        let c = Cargo::new(ItemId::MAX, Cargo::MAX_STACK, Cargo::MAX_INC);
        assert_eq!(c.encode(), [128, 128, 255, 255]);
        assert_eq!(Cargo::decode(c.encode()), Some(c));
    }

    #[test]
    fn insert_at_head_writes_exact_bytes() {
        let mut path = CargoPathBuffer::new(3, 1, false);
        assert!(path.insert_at_head(cargo(5, 2)));
        let bytes = path.as_bytes();
        assert_eq!(&bytes[0..5], &[246, 247, 248, 249, 250]);
        assert_eq!(&bytes[5..9], &[6, 1, 3, 1]);
        assert_eq!(bytes[9], 255);
        assert!(bytes[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn head_blocked_until_item_moves_away() {
        let mut path = CargoPathBuffer::new(10, 1, false);
        assert_eq!(path.test_blank_at_head(), Some(0));
        assert!(path.insert_at_head(cargo(5, 2)));
        assert_eq!(path.test_blank_at_head(), None);
        assert!(!path.insert_at_head(cargo(6, 1)));

        for _ in 0..9 {
            path.advance();
            assert_eq!(path.test_blank_at_head(), None);
        }
        path.advance();
        assert_eq!(path.test_blank_at_head(), Some(0));
        assert_eq!(path.cargos().next(), Some((14, cargo(5, 2))));
    }

    #[test]
    fn get_cargo_resolves_lead_markers() {
        let mut path = CargoPathBuffer::new(4, 1, false);
        assert!(path.try_insert_at(14, cargo(9, 1)));
        for probe in 10..=14 {
            let loc = path.get_cargo_at_index(probe).unwrap();
            assert_eq!(loc.cargo, cargo(9, 1));
            assert_eq!(loc.cargo_index, 15);
            assert_eq!(loc.offset, 14 - probe as isize);
        }
        assert_eq!(path.get_cargo_at_index(9), None);
        assert_eq!(path.get_cargo_at_index(20), None);
    }

    #[test]
    fn get_cargo_resolves_body_bytes() {
        // Stack 249 encodes as 250 in the body; the lead pattern still wins.
        let mut path = CargoPathBuffer::new(4, 1, false);
        let c = Cargo::new(ItemId(3), 249, 245);
        assert!(path.try_insert_at(4, c));
        for probe in 5..=9 {
            let loc = path.get_cargo_at_index(probe).unwrap();
            assert_eq!(loc.cargo, c);
            assert_eq!(loc.head(), 4);
            assert!(loc.offset < 0);
        }
    }

    #[test]
    fn remove_and_set_cargo() {
        let mut path = CargoPathBuffer::new(4, 1, false);
        assert!(path.try_insert_at(24, cargo(2, 1)));
        assert!(path.set_cargo_at_index(22, Cargo::new(ItemId(2), 1, 4)));
        assert_eq!(path.get_cargo_at_index(24).unwrap().cargo.inc, 4);
        assert_eq!(path.remove_cargo_at_index(27), Some(Cargo::new(ItemId(2), 1, 4)));
        assert!(path.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(path.remove_cargo_at_index(27), None);
    }

    #[test]
    fn pick_at_end_only_takes_arrived_record() {
        let mut path = CargoPathBuffer::new(3, 10, false);
        assert!(path.insert_at_head(cargo(1, 1)));
        assert_eq!(path.try_pick_at_end(), None);
        path.advance();
        path.advance();
        assert_eq!(path.peek_at_end(), Some(cargo(1, 1)));
        assert_eq!(path.try_pick_at_end(), Some(cargo(1, 1)));
        assert!(path.is_empty());
    }

    #[test]
    fn pick_item_honors_filter_and_range() {
        let mut path = CargoPathBuffer::new(6, 1, false);
        assert!(path.try_insert_at(4, cargo(1, 1)));
        assert!(path.try_insert_at(20, cargo(2, 1)));
        assert!(path.try_insert_at(40, cargo(1, 3)));

        assert_eq!(path.try_pick_item(0, 30, ItemId(3)), None);
        assert_eq!(path.try_pick_item(10, 40, ItemId(1)), Some((cargo(1, 3), 40)));
        assert_eq!(path.try_pick_item(7, 15, ItemId::NONE), Some((cargo(2, 1), 20)));
        assert_eq!(path.record_count(), 1);
    }

    #[test]
    fn pick_range_starting_inside_record_skips_it() {
        let mut path = CargoPathBuffer::new(4, 1, false);
        assert!(path.try_insert_at(4, cargo(1, 1)));
        assert!(path.try_insert_at(16, cargo(2, 1)));
        assert_eq!(path.try_pick_item(6, 20, ItemId::NONE), Some((cargo(2, 1), 16)));
    }

    #[test]
    fn advance_stops_behind_leading_record() {
        let mut path = CargoPathBuffer::new(4, 5, false);
        assert!(path.try_insert_at(34, cargo(1, 1)));
        assert!(path.try_insert_at(20, cargo(2, 1)));
        path.advance();
        let heads: Vec<usize> = path.cargos().map(|(h, _)| h).collect();
        assert_eq!(heads, vec![24, 34]);
        path.validate().unwrap();
    }

    #[test]
    fn advance_packs_a_full_belt_without_overlap() {
        let mut path = CargoPathBuffer::new(5, 3, false);
        for _ in 0..40 {
            path.insert_at_head(cargo(7, 1));
            path.advance();
            path.validate().unwrap();
        }
        assert_eq!(path.record_count(), 5);
        assert_eq!(path.test_blank_at_head(), None);
    }

    #[test]
    fn count_in_range_sums_stacks() {
        let mut path = CargoPathBuffer::new(5, 1, false);
        assert!(path.try_insert_at(4, cargo(1, 2)));
        assert!(path.try_insert_at(24, cargo(1, 3)));
        assert_eq!(path.count_in_range(0, 50), 5);
        assert_eq!(path.count_in_range(10, 20), 3);
        assert_eq!(path.count_in_range(5, 5), 0);
    }

    #[test]
    fn from_bytes_rejects_bad_input() {
        assert_eq!(
            CargoPathBuffer::from_bytes(vec![0; 15], 1, false),
            Err(CargoPathError::BadLength(15))
        );
        let mut bytes = vec![0; 20];
        bytes[0] = 17;
        assert_eq!(
            CargoPathBuffer::from_bytes(bytes, 1, false),
            Err(CargoPathError::Corrupted { offset: 0, byte: 17 })
        );
    }

    #[test]
    #[should_panic(expected = "corrupted cargo buffer")]
    fn corrupted_marker_is_fatal() {
        let mut path = CargoPathBuffer::new(2, 1, false);
        path.buffer[5] = 42;
        let _ = path.cargos().count();
    }
}
