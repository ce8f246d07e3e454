//! Static channel-name table.
//!
//! Used when a well's attributes carry no channel mapping of their own. The
//! indices follow the acquisition order the microscope writes.

/// Known channel labels and their channel index.
pub const KNOWN_CHANNELS: &[(&str, u32)] = &[
    ("BF LED matrix full", 0),
    ("Fluorescence 405 nm Ex", 1),
    ("Fluorescence 488 nm Ex", 2),
    ("Fluorescence 561 nm Ex", 3),
    ("Fluorescence 638 nm Ex", 4),
    ("Fluorescence 730 nm Ex", 5),
    ("BF LED matrix low NA", 6),
    ("BF LED matrix dark field", 7),
];

/// Look up a channel label in the static table (case-insensitive).
pub fn static_channel_index(label: &str) -> Option<u32> {
    KNOWN_CHANNELS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(label.trim()))
        .map(|(_, index)| *index)
}
