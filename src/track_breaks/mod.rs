//! Ordered cut points ("track breaks") and the segments they describe.
//!
//! Positions are in 1/75 s blocks. The list is owned by the caller; the
//! engine only consumes the segments derived from it at write time.

mod naming;

use crate::audio::BLOCKS_PER_SECOND;
use crate::config::NamingSettings;

pub use naming::base_stem;

/// One cut point: the start of an output segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackBreak {
    /// Start position in blocks.
    pub position: u64,
    /// Whether the segment starting here is written.
    pub include: bool,
    /// Output filename stem, without extension.
    pub filename: String,
}

impl TrackBreak {
    pub fn new(position: u64) -> Self {
        Self {
            position,
            include: true,
            filename: String::new(),
        }
    }
}

/// A block range to export. `end == None` runs to the end of the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub end: Option<u64>,
    pub filename: String,
}

/// Sort by position, drop duplicate positions and derive the included segments.
///
/// A segment ends at the next break whether or not that break is included.
pub fn segments(breaks: &[TrackBreak]) -> Vec<Segment> {
    let mut ordered: Vec<&TrackBreak> = breaks.iter().collect();
    ordered.sort_by_key(|entry| entry.position);
    ordered.dedup_by_key(|entry| entry.position);
    ordered
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.include)
        .map(|(index, entry)| Segment {
            start: entry.position,
            end: ordered.get(index + 1).map(|next| next.position),
            filename: entry.filename.clone(),
        })
        .collect()
}

/// Format a block count as `m:ss.ff`, where `ff` counts blocks within the second.
pub fn format_block_time(blocks: u64) -> String {
    let per_second = u64::from(BLOCKS_PER_SECOND);
    let seconds = blocks / per_second;
    format!("{}:{:02}.{:02}", seconds / 60, seconds % 60, blocks % per_second)
}

/// Cut points kept sorted and unique by position.
#[derive(Clone, Debug, Default)]
pub struct TrackBreakList {
    breaks: Vec<TrackBreak>,
    total_blocks: u64,
}

impl TrackBreakList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over for a newly opened stream with a single break at the beginning.
    pub fn reset(&mut self, total_blocks: u64) {
        self.breaks.clear();
        self.total_blocks = total_blocks;
        self.insert(0);
    }

    /// Insert a break; returns `false` if one already exists at `position`.
    pub fn insert(&mut self, position: u64) -> bool {
        match self.search(position) {
            Ok(_) => false,
            Err(index) => {
                self.breaks.insert(index, TrackBreak::new(position));
                true
            }
        }
    }

    pub fn remove(&mut self, position: u64) -> Option<TrackBreak> {
        let index = self.search(position).ok()?;
        Some(self.breaks.remove(index))
    }

    pub fn set_include(&mut self, position: u64, include: bool) -> bool {
        self.entry_mut(position)
            .map(|entry| entry.include = include)
            .is_some()
    }

    pub fn set_filename(&mut self, position: u64, filename: impl Into<String>) -> bool {
        self.entry_mut(position)
            .map(|entry| entry.filename = filename.into())
            .is_some()
    }

    pub fn clear(&mut self) {
        self.breaks.clear();
    }

    pub fn set_total_blocks(&mut self, total_blocks: u64) {
        self.total_blocks = total_blocks;
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    pub fn len(&self) -> usize {
        self.breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrackBreak> {
        self.breaks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackBreak> {
        self.breaks.iter()
    }

    pub fn as_slice(&self) -> &[TrackBreak] {
        &self.breaks
    }

    /// Blocks from break `index` to the next break, or to the end of the stream.
    pub fn duration_blocks(&self, index: usize) -> Option<u64> {
        let entry = self.breaks.get(index)?;
        let end = self
            .breaks
            .get(index + 1)
            .map_or(self.total_blocks, |next| next.position);
        Some(end.saturating_sub(entry.position))
    }

    /// Display time of break `index`.
    pub fn time_label(&self, index: usize) -> Option<String> {
        self.breaks
            .get(index)
            .map(|entry| format_block_time(entry.position))
    }

    /// Display duration of the segment starting at break `index`.
    pub fn duration_label(&self, index: usize) -> Option<String> {
        self.duration_blocks(index).map(format_block_time)
    }

    /// Insert a break every `interval` blocks up to the end of the stream.
    ///
    /// Returns how many new breaks were added.
    pub fn auto_split(&mut self, interval: u64) -> usize {
        if interval == 0 {
            return 0;
        }
        let mut added = 0;
        let mut position = interval;
        while position <= self.total_blocks {
            if self.insert(position) {
                added += 1;
            }
            position += interval;
        }
        added
    }

    /// Regenerate every filename stem from `base`.
    pub fn rename(&mut self, base: &str, naming: &NamingSettings) {
        naming::apply(&mut self.breaks, base, naming);
    }

    pub fn segments(&self) -> Vec<Segment> {
        segments(&self.breaks)
    }

    fn search(&self, position: u64) -> Result<usize, usize> {
        self.breaks
            .binary_search_by_key(&position, |entry| entry.position)
    }

    fn entry_mut(&mut self, position: u64) -> Option<&mut TrackBreak> {
        let index = self.search(position).ok()?;
        self.breaks.get_mut(index)
    }
}
