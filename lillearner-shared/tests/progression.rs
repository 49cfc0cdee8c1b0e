use chrono::NaiveDate;
use lillearner_shared::domain::EntryKind;
use lillearner_shared::streak::{active_days, current_streak};
use lillearner_shared::xp;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn level_follows_square_thresholds() {
    assert_eq!(xp::level(0), 1);
    assert_eq!(xp::level(99), 1);
    assert_eq!(xp::level(399), 1);
    assert_eq!(xp::level(400), 2);
    assert_eq!(xp::level(899), 2);
    assert_eq!(xp::level(900), 3);
    assert_eq!(xp::level(10_000), 10);
    assert_eq!(xp::xp_threshold(4), 1600);
}

#[test]
fn level_never_decreases_as_xp_grows() {
    let mut prev = xp::level(0);
    for total in (0..50_000u64).step_by(37) {
        let lvl = xp::level(total);
        assert!(lvl >= prev, "level dropped at {total}");
        assert!(lvl >= 1);
        prev = lvl;
    }
    // no overflow at the top of the range
    assert!(xp::level(u64::MAX) > 1);
}

#[test]
fn progress_at_925_xp() {
    let p = xp::progress(925);
    assert_eq!(p.level, 3);
    assert_eq!(p.title, "Little Sprout");
    assert_eq!(p.xp_in_level, 25);
    assert_eq!(p.xp_for_next, 700);
    assert!((p.ratio - 25.0 / 700.0).abs() < 1e-9);
}

#[test]
fn progress_below_level_one_threshold_is_negative() {
    let p = xp::progress(40);
    assert_eq!(p.level, 1);
    assert_eq!(p.xp_in_level, -60);
    assert!(p.ratio < 0.0);
    assert_eq!(p.clamped_ratio(), 0.0);
}

#[test]
fn titles_by_level_bucket() {
    assert_eq!(xp::level_title(1), "Little Sprout");
    assert_eq!(xp::level_title(3), "Little Sprout");
    assert_eq!(xp::level_title(4), "Curious Explorer");
    assert_eq!(xp::level_title(7), "Star Learner");
    assert_eq!(xp::level_title(12), "Knowledge Knight");
    assert_eq!(xp::level_title(13), "Master Adventurer");
    assert_eq!(xp::level_title(99), "Master Adventurer");
}

#[test]
fn entry_awards_by_kind() {
    assert_eq!(xp::award_for_entry(EntryKind::Activity), 10);
    assert_eq!(xp::award_for_entry(EntryKind::Counter), 10);
    assert_eq!(xp::award_for_entry(EntryKind::Photo), 15);
    assert_eq!(xp::award_for_entry(EntryKind::Note), 10);
    assert_eq!(xp::award_for_entry(EntryKind::Milestone), 50);
}

#[test]
fn streak_counts_back_from_today() {
    let days = active_days([day(2024, 1, 1), day(2024, 1, 2), day(2024, 1, 3)]);
    assert_eq!(current_streak(&days, day(2024, 1, 3)), 3);
    // today not logged yet
    assert_eq!(current_streak(&days, day(2024, 1, 4)), 3);
    // yesterday missing
    assert_eq!(current_streak(&days, day(2024, 1, 5)), 0);
}

#[test]
fn streak_breaks_on_gap_and_ignores_future_days() {
    let days = active_days([
        day(2023, 12, 30),
        day(2024, 1, 2),
        day(2024, 1, 3),
        day(2024, 1, 9),
    ]);
    assert_eq!(current_streak(&days, day(2024, 1, 3)), 2);
    assert_eq!(current_streak(&active_days([]), day(2024, 1, 3)), 0);
}

#[test]
fn streak_collapses_repeated_days() {
    let days = active_days([day(2024, 1, 3), day(2024, 1, 3), day(2024, 1, 2)]);
    assert_eq!(days.len(), 2);
    assert_eq!(current_streak(&days, day(2024, 1, 3)), 2);
}
