use std::path::Path;

use super::TrackBreak;
use crate::audio::BLOCKS_PER_SECOND;
use crate::config::NamingSettings;

/// Filename stem of the source file, used as the base for segment names.
pub fn base_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Regenerate every stem from `base` according to `naming`.
///
/// Breaks must already be in ascending position order.
pub(super) fn apply(breaks: &mut [TrackBreak], base: &str, naming: &NamingSettings) {
    if naming.disc_numbering {
        let blocks_per_disc = u64::from(BLOCKS_PER_SECOND) * 60 * u64::from(naming.disc_length_minutes.max(1));
        let mut previous_disc = 0;
        let mut track = 0;
        for entry in breaks.iter_mut() {
            let disc = entry.position / blocks_per_disc + 1;
            track = if disc == previous_disc { track + 1 } else { 1 };
            previous_disc = disc;
            entry.filename = format!("{base}d{disc}t{track:02}");
        }
        return;
    }
    let suffix = &naming.filename_suffix;
    for (index, entry) in breaks.iter_mut().enumerate() {
        let number = index + 1;
        entry.filename = if naming.prepend_number {
            format!("{number:02}{suffix}{base}")
        } else {
            format!("{base}{suffix}{number:02}")
        };
    }
}
