//! Dashboard read models: per-category activity counts and milestone
//! completion per skill.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;

const SECONDS_PER_WEEK: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// One logged entry, already keyed by the category it is grouped under.
#[derive(Debug, Clone)]
pub struct StatsEntry {
    pub group_id: String,
    pub logged_at: DateTime<Utc>,
}

/// Boundaries of the current week and month as UTC instants.
#[derive(Debug, Clone, Copy)]
pub struct StatsWindow {
    pub week_start: DateTime<Utc>,
    pub month_start: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category_id: String,
    pub category_name: String,
    pub this_week: u32,
    pub this_month: u32,
    pub total: u32,
    pub last_entry_at: Option<DateTime<Utc>>,
    /// Entries per week since the first one, one decimal. Spans shorter
    /// than a week count as one week.
    pub avg_per_week: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    /// Busiest category first.
    pub stats: Vec<CategoryStats>,
    pub total_entries: u32,
    pub this_week_total: u32,
    pub this_month_total: u32,
}

#[derive(Default)]
struct Tally {
    this_week: u32,
    this_month: u32,
    total: u32,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

pub fn category_stats(
    entries: &[StatsEntry],
    window: &StatsWindow,
    name_of: impl Fn(&str) -> String,
) -> StatsSummary {
    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    let mut this_week_total = 0;
    let mut this_month_total = 0;
    for e in entries {
        let t = tallies.entry(e.group_id.as_str()).or_default();
        t.total += 1;
        if e.logged_at >= window.week_start {
            t.this_week += 1;
            this_week_total += 1;
        }
        if e.logged_at >= window.month_start {
            t.this_month += 1;
            this_month_total += 1;
        }
        t.first = Some(t.first.map_or(e.logged_at, |f| f.min(e.logged_at)));
        t.last = Some(t.last.map_or(e.logged_at, |l| l.max(e.logged_at)));
    }

    let mut stats: Vec<CategoryStats> = tallies
        .into_iter()
        .map(|(id, t)| CategoryStats {
            category_id: id.to_string(),
            category_name: name_of(id),
            this_week: t.this_week,
            this_month: t.this_month,
            total: t.total,
            last_entry_at: t.last,
            avg_per_week: t.first.map_or(0.0, |first| average_per_week(t.total, first, window.now)),
        })
        .collect();
    stats.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| b.last_entry_at.cmp(&a.last_entry_at))
            .then_with(|| a.category_id.cmp(&b.category_id))
    });

    StatsSummary {
        stats,
        total_entries: entries.len() as u32,
        this_week_total,
        this_month_total,
    }
}

fn average_per_week(total: u32, first: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let weeks = ((now - first).num_seconds() as f64 / SECONDS_PER_WEEK).max(1.0);
    (f64::from(total) / weeks * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub category_id: String,
    pub skill_id: String,
    pub skill_name: String,
    pub completed: u32,
    pub total: u32,
}

/// Completed milestones for every catalog skill that defines any, in
/// catalog order. Keys no longer in the catalog are not counted.
pub fn skill_progress<'a>(
    catalog: &Catalog,
    category: Option<&str>,
    completed: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<SkillProgress> {
    let done: HashSet<(&str, &str)> = completed.into_iter().collect();
    catalog
        .categories
        .iter()
        .filter(|c| category.is_none_or(|id| c.id == id))
        .flat_map(|c| c.skills.iter().map(move |s| (c, s)))
        .filter(|(_, s)| !s.milestones.is_empty())
        .map(|(c, s)| SkillProgress {
            category_id: c.id.clone(),
            skill_id: s.id.clone(),
            skill_name: s.name.clone(),
            completed: s
                .milestones
                .iter()
                .filter(|m| done.contains(&(s.id.as_str(), m.as_str())))
                .count() as u32,
            total: s.milestones.len() as u32,
        })
        .collect()
}
