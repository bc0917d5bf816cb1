//! Page table entries and per-process page tables.
//!
//! A hand-rolled small struct rather than a generic abstraction, in the
//! style of the teacher's `PageFlags` — a page table entry here carries
//! exactly the three bits the simulator's eviction and fault logic needs:
//! `valid`, `reference`, `dirty`.

use std::collections::HashMap;

/// A single page table entry: virtual page → physical frame, plus the
/// bits the clock-eviction algorithm and dirty tracking need.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    /// The backing frame, or `None` when the page is not resident.
    pub frame: Option<u32>,
    /// Whether this entry currently maps to a resident frame.
    pub valid: bool,
    /// Set on every load; cleared by the clock hand as it sweeps past.
    pub reference: bool,
    /// Set when the page has been written since being loaded.
    pub dirty: bool,
}

impl PageTableEntry {
    /// An entry with no mapping.
    pub const fn empty() -> Self {
        PageTableEntry {
            frame: None,
            valid: false,
            reference: false,
            dirty: false,
        }
    }
}

/// Per-process map from virtual page number to [`PageTableEntry`].
#[derive(Debug, Clone, Default)]
pub struct PageTable {
    entries: HashMap<u32, PageTableEntry>,
}

impl PageTable {
    pub fn new() -> Self {
        PageTable {
            entries: HashMap::new(),
        }
    }

    /// The entry for `vp`, if the page has ever been touched.
    pub fn get(&self, vp: u32) -> Option<&PageTableEntry> {
        self.entries.get(&vp)
    }

    pub fn get_mut(&mut self, vp: u32) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(&vp)
    }

    /// Whether `vp` currently maps to a resident frame.
    pub fn is_resident(&self, vp: u32) -> bool {
        self.entries.get(&vp).is_some_and(|e| e.valid)
    }

    /// Install or replace the entry for `vp`.
    pub fn set(&mut self, vp: u32, entry: PageTableEntry) {
        self.entries.insert(vp, entry);
    }

    /// Invalidate `vp`'s entry in place, if present.
    pub fn invalidate(&mut self, vp: u32) {
        if let Some(entry) = self.entries.get_mut(&vp) {
            entry.valid = false;
            entry.frame = None;
        }
    }

    /// All virtual pages currently holding a valid mapping.
    pub fn resident_vps(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| e.valid)
            .map(|(vp, _)| *vp)
    }

    /// Any single resident virtual page, used by `evict_page(target)`.
    pub fn any_resident_vp(&self) -> Option<u32> {
        self.resident_vps().next()
    }

    pub fn resident_count(&self) -> usize {
        self.resident_vps().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entry_is_invalid() {
        let pte = PageTableEntry::empty();
        assert!(!pte.valid);
        assert!(pte.frame.is_none());
    }

    #[test]
    fn invalidate_clears_frame() {
        let mut pt = PageTable::new();
        pt.set(
            0,
            PageTableEntry {
                frame: Some(3),
                valid: true,
                reference: true,
                dirty: false,
            },
        );
        pt.invalidate(0);
        let e = pt.get(0).unwrap();
        assert!(!e.valid);
        assert!(e.frame.is_none());
    }

    #[test]
    fn resident_count_tracks_valid_entries() {
        let mut pt = PageTable::new();
        pt.set(0, PageTableEntry { frame: Some(0), valid: true, reference: false, dirty: false });
        pt.set(1, PageTableEntry { frame: Some(1), valid: true, reference: false, dirty: false });
        pt.set(2, PageTableEntry::empty());
        assert_eq!(pt.resident_count(), 2);
    }
}
