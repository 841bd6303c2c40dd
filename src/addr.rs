//! Address lookups over a parsed map.

use crate::model::{LinkMap, SectionRecord, SymbolRecord};
use rangemap::RangeMap;

/// Answers "what's at this address?" for one `LinkMap`.
///
/// Dead symbols have no address and zero-sized entries cover nothing, so
/// neither is indexed. Where entries overlap, the later one wins.
pub struct AddressIndex<'a> {
    linkmap: &'a LinkMap,
    symbols: RangeMap<u64, usize>,
    sections: RangeMap<u64, usize>,
}

impl<'a> AddressIndex<'a> {
    pub fn new(linkmap: &'a LinkMap) -> Self {
        let mut symbols = RangeMap::new();
        for (i, s) in linkmap.symbols.iter().enumerate() {
            if !s.dead {
                insert_span(&mut symbols, s.address, s.size, i);
            }
        }
        let mut sections = RangeMap::new();
        for (i, s) in linkmap.sections.iter().enumerate() {
            insert_span(&mut sections, s.address, s.size, i);
        }
        Self {
            linkmap,
            symbols,
            sections,
        }
    }

    pub fn symbol_at(&self, addr: u64) -> Option<&'a SymbolRecord> {
        let &i = self.symbols.get(&addr)?;
        self.linkmap.symbols.get(i)
    }

    pub fn section_at(&self, addr: u64) -> Option<&'a SectionRecord> {
        let &i = self.sections.get(&addr)?;
        self.linkmap.sections.get(i)
    }
}

/// Spans running past the top of the address space are cut off at
/// `u64::MAX`; one that starts there covers nothing and is skipped.
fn insert_span(map: &mut RangeMap<u64, usize>, start: u64, size: u64, value: usize) {
    let end = start.saturating_add(size);
    if end > start {
        map.insert(start..end, value);
    }
}
