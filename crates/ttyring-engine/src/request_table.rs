//! In-flight request tracking.
//!
//! Every SQE handed to the kernel carries a request id in `user_data`; the
//! table maps that id back to its record when the CQE arrives. Lookups are
//! O(1) through a direct-mapped slot array sized to the ring depth, indexed
//! by `id % depth`; when a slot is taken by a different id the record spills
//! into an auxiliary map.
//!
//! The table is plain data: every call is made under the engine lock, which
//! also covers SQE submission, so a completion can never observe a record
//! that submission has not yet inserted.

use std::collections::HashMap;
use std::os::unix::io::RawFd;

use crate::buffer_pool::PooledBuf;

/// Which way the operation moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// One in-flight operation.
///
/// Lives from the instant its submission is handed to the kernel until the
/// completion that fully resolves it has been processed. For writes the
/// record owns the submitted buffer — the kernel reads from that memory
/// until the final completion, so the buffer must not be released earlier.
#[derive(Debug)]
pub struct RequestRecord {
    /// Unique, monotonic, never zero (zero is the wake-up sentinel).
    pub id: u64,
    pub dir: Direction,
    pub fd: RawFd,
    /// Write payload; `None` for reads.
    pub buf: Option<PooledBuf>,
    /// Bytes of the payload already acknowledged by the kernel.
    pub offset: usize,
}

/// Direct-mapped request table with spill map.
pub struct RequestTable {
    depth: u64,
    slots: Vec<Option<RequestRecord>>,
    spill: HashMap<u64, RequestRecord>,
}

impl RequestTable {
    /// `depth` is the submission ring depth; ids colliding modulo depth
    /// share a slot and the loser goes to the spill map.
    pub fn new(depth: usize) -> Self {
        let mut slots = Vec::with_capacity(depth);
        slots.resize_with(depth, || None);
        Self {
            depth: depth as u64,
            slots,
            spill: HashMap::new(),
        }
    }

    fn index(&self, id: u64) -> usize {
        (id % self.depth) as usize
    }

    fn slot_holds(&self, idx: usize, id: u64) -> bool {
        matches!(&self.slots[idx], Some(rec) if rec.id == id)
    }

    /// Insert the record for a freshly submitted id.
    pub fn insert(&mut self, record: RequestRecord) {
        debug_assert_ne!(record.id, 0, "id 0 is reserved for wake-ups");
        let idx = self.index(record.id);
        if self.slots[idx].is_none() {
            self.slots[idx] = Some(record);
        } else {
            self.spill.insert(record.id, record);
        }
    }

    pub fn find(&self, id: u64) -> Option<&RequestRecord> {
        let idx = self.index(id);
        if self.slot_holds(idx, id) {
            self.slots[idx].as_ref()
        } else {
            self.spill.get(&id)
        }
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut RequestRecord> {
        let idx = self.index(id);
        if self.slot_holds(idx, id) {
            self.slots[idx].as_mut()
        } else {
            self.spill.get_mut(&id)
        }
    }

    /// Remove and return the record for `id`, if in flight.
    pub fn take(&mut self, id: u64) -> Option<RequestRecord> {
        let idx = self.index(id);
        if self.slot_holds(idx, id) {
            self.slots[idx].take()
        } else {
            self.spill.remove(&id)
        }
    }

    pub fn erase(&mut self, id: u64) {
        let _ = self.take(id);
    }

    /// Number of records currently in flight.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count() + self.spill.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_rec(id: u64) -> RequestRecord {
        RequestRecord {
            id,
            dir: Direction::Read,
            fd: 3,
            buf: None,
            offset: 0,
        }
    }

    #[test]
    fn test_insert_find_take() {
        let mut t = RequestTable::new(16);
        t.insert(read_rec(1));
        assert_eq!(t.find(1).unwrap().id, 1);
        assert_eq!(t.len(), 1);

        let rec = t.take(1).unwrap();
        assert_eq!(rec.id, 1);
        assert!(t.find(1).is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn test_find_unknown_id() {
        let t = RequestTable::new(16);
        assert!(t.find(5).is_none());
    }

    #[test]
    fn test_collision_spills() {
        let mut t = RequestTable::new(16);
        // 1 and 17 map to the same slot.
        t.insert(read_rec(1));
        t.insert(read_rec(17));
        assert_eq!(t.len(), 2);

        // Each lookup returns exactly the inserted record.
        assert_eq!(t.find(1).unwrap().id, 1);
        assert_eq!(t.find(17).unwrap().id, 17);

        // Removing the slot occupant does not disturb the spilled record.
        assert_eq!(t.take(1).unwrap().id, 1);
        assert_eq!(t.find(17).unwrap().id, 17);
        assert_eq!(t.take(17).unwrap().id, 17);
        assert!(t.is_empty());
    }

    #[test]
    fn test_take_spilled_first() {
        let mut t = RequestTable::new(8);
        t.insert(read_rec(2));
        t.insert(read_rec(10));
        assert_eq!(t.take(10).unwrap().id, 10);
        assert_eq!(t.find(2).unwrap().id, 2);
    }

    #[test]
    fn test_find_mut_updates_offset() {
        let mut t = RequestTable::new(8);
        let mut rec = read_rec(4);
        rec.dir = Direction::Write;
        t.insert(rec);
        t.find_mut(4).unwrap().offset = 100;
        assert_eq!(t.find(4).unwrap().offset, 100);
    }

    #[test]
    fn test_erase_is_idempotent() {
        let mut t = RequestTable::new(8);
        t.insert(read_rec(3));
        t.erase(3);
        t.erase(3);
        assert!(t.find(3).is_none());
    }
}
