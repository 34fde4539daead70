use std::collections::BTreeMap;

use crate::domain::Address;
use crate::events::GenerationRangeEvent;
use crate::image::MemoryRange;

/// Generation segments of the managed heap at dump time
#[derive(Debug, Clone, Default)]
pub struct HeapLayout {
    /// Segment start -> (generation, used range)
    segments: BTreeMap<Address, (u32, MemoryRange)>,
}

impl HeapLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &GenerationRangeEvent) {
        let range = MemoryRange {
            start: event.range_start.0,
            end: event.range_start.0.saturating_add(event.used_length),
        };
        self.segments.insert(event.range_start, (event.generation, range));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Generation owning `address`, if it falls inside a used range
    #[must_use]
    pub fn generation_of(&self, address: Address) -> Option<u32> {
        let (_, &(generation, range)) = self.segments.range(..=address).next_back()?;
        range.contains(address.0).then_some(generation)
    }

    /// Used bytes per generation
    #[must_use]
    pub fn used_by_generation(&self) -> BTreeMap<u32, u64> {
        let mut totals = BTreeMap::new();
        for &(generation, range) in self.segments.values() {
            *totals.entry(generation).or_insert(0) += range.end - range.start;
        }
        totals
    }
}
