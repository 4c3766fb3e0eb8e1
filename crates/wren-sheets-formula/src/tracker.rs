//! Reference tracker
//!
//! A workbook-scoped index from resolved addresses to the formula tokens
//! that reference them, used to invalidate dependents when cells move.
//! Tokens do not hold back-pointers into the index; they are registered
//! into an arena and addressed by [`TokenHandle`], and every mutation goes
//! through the index so no caller can observe a stale address-to-token
//! mapping.
//!
//! A shared-formula token is registered once with the bounds of the whole
//! shared block: one token instance stands for every cell that shares the
//! formula, so its registration must cover all of them.

use ahash::AHashMap;
use wren_sheets_core::CellRange;

/// Opaque handle to a tracked reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHandle(usize);

/// A registered reference: the sheet and range a token resolves to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedRef {
    /// Sheet index
    pub sheet: usize,
    /// Registered range (covering the whole shared block for shared
    /// formulas)
    pub range: CellRange,
}

/// The tracker: an arena of registrations plus a per-sheet index
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    entries: Vec<Option<TrackedRef>>,
    free: Vec<usize>,
    by_sheet: AHashMap<usize, Vec<TokenHandle>>,
}

impl ReferenceTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reference, returning its handle
    pub fn register(&mut self, sheet: usize, range: CellRange) -> TokenHandle {
        let entry = TrackedRef { sheet, range };
        let handle = match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                TokenHandle(slot)
            }
            None => {
                self.entries.push(Some(entry));
                TokenHandle(self.entries.len() - 1)
            }
        };
        self.by_sheet.entry(sheet).or_default().push(handle);
        handle
    }

    /// Remove a registration. Idempotent for already-removed handles.
    pub fn unregister(&mut self, handle: TokenHandle) {
        if let Some(entry) = self.entries.get_mut(handle.0).and_then(Option::take) {
            if let Some(handles) = self.by_sheet.get_mut(&entry.sheet) {
                handles.retain(|&h| h != handle);
            }
            self.free.push(handle.0);
        }
    }

    /// Rewrite a registration's range in place.
    ///
    /// The arena entry and the index are updated together, before this
    /// returns, so lookups never see the old mapping.
    pub fn relocate(&mut self, handle: TokenHandle, sheet: usize, range: CellRange) {
        let slot = match self.entries.get_mut(handle.0) {
            Some(slot) if slot.is_some() => slot,
            _ => return,
        };
        let old = slot.replace(TrackedRef { sheet, range });
        if let Some(old) = old {
            if old.sheet != sheet {
                if let Some(handles) = self.by_sheet.get_mut(&old.sheet) {
                    handles.retain(|&h| h != handle);
                }
                self.by_sheet.entry(sheet).or_default().push(handle);
            }
        }
    }

    /// Look up a registration
    pub fn get(&self, handle: TokenHandle) -> Option<TrackedRef> {
        self.entries.get(handle.0).copied().flatten()
    }

    /// All handles whose registered range contains the given cell
    pub fn referencing(&self, sheet: usize, row: u32, col: u16) -> Vec<TokenHandle> {
        self.by_sheet
            .get(&sheet)
            .map(|handles| {
                handles
                    .iter()
                    .copied()
                    .filter(|h| {
                        self.get(*h)
                            .map(|e| e.range.contains(row, col))
                            .unwrap_or(false)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every registration on a sheet (wholesale invalidation after a
    /// structural edit)
    pub fn invalidate_sheet(&mut self, sheet: usize) {
        if let Some(handles) = self.by_sheet.remove(&sheet) {
            for handle in handles {
                if self.entries[handle.0].take().is_some() {
                    self.free.push(handle.0);
                }
            }
        }
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// Whether the tracker is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
