//! Experience points and levels.
//!
//! A child's level is `max(1, floor(sqrt(total_xp / 100)))`, so reaching
//! level `n` takes `n² × 100` XP. XP is unsigned; there is no way to hand the
//! engine a negative total.

use serde::{Deserialize, Serialize};

use crate::domain::EntryKind;

const XP_SCALE: u64 = 100;

pub const LOG_ACTIVITY: u32 = 10;
pub const ADD_PHOTO: u32 = 15;
pub const WRITE_NOTE: u32 = 10;
pub const COMPLETE_MILESTONE: u32 = 50;

/// Upper bound (inclusive) of each title bucket; the last bucket is open.
const LEVEL_TITLES: [(Option<u32>, &str); 5] = [
    (Some(3), "Little Sprout"),
    (Some(6), "Curious Explorer"),
    (Some(9), "Star Learner"),
    (Some(12), "Knowledge Knight"),
    (None, "Master Adventurer"),
];

pub fn level(total_xp: u64) -> u32 {
    // isqrt(u64::MAX / 100) < 2^32
    ((total_xp / XP_SCALE).isqrt() as u32).max(1)
}

/// XP required to reach `level`.
pub fn xp_threshold(level: u32) -> u64 {
    let l = u64::from(level);
    l * l * XP_SCALE
}

pub fn level_title(level: u32) -> &'static str {
    LEVEL_TITLES
        .iter()
        .find(|(upper, _)| upper.is_none_or(|u| level <= u))
        .map(|(_, title)| *title)
        .unwrap_or(LEVEL_TITLES[LEVEL_TITLES.len() - 1].1)
}

/// XP granted for logging an entry of the given kind.
pub fn award_for_entry(kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Photo => ADD_PHOTO,
        EntryKind::Note => WRITE_NOTE,
        EntryKind::Milestone => COMPLETE_MILESTONE,
        EntryKind::Activity | EntryKind::Counter => LOG_ACTIVITY,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelProgress {
    pub total_xp: u64,
    pub level: u32,
    pub title: String,
    /// Negative while a child is still below the level 1 threshold.
    pub xp_in_level: i64,
    pub xp_for_next: u64,
    /// `xp_in_level / xp_for_next`, not clamped.
    pub ratio: f64,
}

impl LevelProgress {
    /// Ratio clamped to `[0, 1]` for progress bars.
    pub fn clamped_ratio(&self) -> f64 {
        self.ratio.clamp(0.0, 1.0)
    }
}

pub fn progress(total_xp: u64) -> LevelProgress {
    let level = level(total_xp);
    let current = xp_threshold(level);
    let next = xp_threshold(level + 1);
    let xp_in_level = total_xp as i64 - current as i64;
    let xp_for_next = next - current;
    LevelProgress {
        total_xp,
        level,
        title: level_title(level).to_string(),
        xp_in_level,
        xp_for_next,
        ratio: xp_in_level as f64 / xp_for_next as f64,
    }
}
