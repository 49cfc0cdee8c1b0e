//! Periodic progress reports.
//!
//! A report is computed once from the rows that fall inside a closed
//! calendar window and then frozen; [`aggregate`] and [`narrative`] are
//! deterministic for a given input.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::domain::{EntryKind, Season};
use crate::xp;

pub const TOP_SKILLS_LIMIT: usize = 5;
pub const PHOTO_URL_LIMIT: usize = 6;

/// Inclusive calendar-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Monday through Sunday of the week containing `today`.
    pub fn week_of(today: NaiveDate) -> Option<Self> {
        let back = u64::from(today.weekday().num_days_from_monday());
        let start = today.checked_sub_days(Days::new(back))?;
        let end = start.checked_add_days(Days::new(6))?;
        Self::new(start, end)
    }

    /// First through last day of the month containing `today`.
    pub fn month_of(today: NaiveDate) -> Option<Self> {
        let start = today.with_day(1)?;
        let end = start
            .checked_add_months(Months::new(1))?
            .checked_sub_days(Days::new(1))?;
        Self::new(start, end)
    }

    /// The season window starting in `today`'s year; winter runs into the
    /// following year.
    pub fn season_of(season: Season, today: NaiveDate) -> Option<Self> {
        let (start, end) = season.window(today.year())?;
        Self::new(start, end)
    }
}

/// An entry inside the report window, in chronological order.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub category_id: String,
    pub skill_id: String,
    pub kind: EntryKind,
    pub media_urls: Vec<String>,
    pub logged_on: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct MilestoneReached {
    pub skill_id: String,
    pub milestone_key: String,
}

/// Rows fetched for the window. Entries must be in chronological order:
/// photo selection and top-skill tie breaking depend on it.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub entries: &'a [ReportEntry],
    pub milestones: &'a [MilestoneReached],
    pub xp_amounts: &'a [u32],
    /// Ledger total granted before the window opened.
    pub xp_before_period: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    /// Every catalog category is present, zero counts included.
    pub entries_by_category: BTreeMap<String, u32>,
    pub milestones_reached: Vec<String>,
    pub xp_earned: u64,
    pub levels_gained: u32,
    pub top_skills: Vec<String>,
    pub photo_urls: Vec<String>,
    pub total_entries: u32,
    /// Distinct days with at least one entry in the window. Not the
    /// consecutive-day streak.
    pub streak_days: u32,
    /// Most logged category, absent when nothing was logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_category: Option<String>,
}

pub fn aggregate(catalog: &Catalog, input: &ReportInput<'_>) -> ReportData {
    let mut entries_by_category: BTreeMap<String, u32> = catalog
        .categories
        .iter()
        .map(|c| (c.id.clone(), 0))
        .collect();
    for e in input.entries {
        *entries_by_category.entry(e.category_id.clone()).or_default() += 1;
    }

    let milestones_reached = input
        .milestones
        .iter()
        .map(|m| format!("{}:{}", m.skill_id, m.milestone_key))
        .collect();

    let xp_earned: u64 = input.xp_amounts.iter().map(|a| u64::from(*a)).sum();
    let levels_gained = xp::level(input.xp_before_period + xp_earned)
        .saturating_sub(xp::level(input.xp_before_period));

    let photo_urls = input
        .entries
        .iter()
        .filter(|e| e.kind == EntryKind::Photo)
        .flat_map(|e| e.media_urls.iter().cloned())
        .take(PHOTO_URL_LIMIT)
        .collect();

    let days: BTreeSet<NaiveDate> = input.entries.iter().map(|e| e.logged_on).collect();
    let top_category = top_category(catalog, input.entries, &entries_by_category);

    ReportData {
        entries_by_category,
        milestones_reached,
        xp_earned,
        levels_gained,
        top_skills: top_skills(input.entries),
        photo_urls,
        total_entries: input.entries.len() as u32,
        streak_days: days.len() as u32,
        top_category,
    }
}

/// Most logged skills, ties kept in first-seen order.
fn top_skills(entries: &[ReportEntry]) -> Vec<String> {
    let mut order: Vec<(&str, u32)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for e in entries {
        match index.get(e.skill_id.as_str()) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(e.skill_id.as_str(), order.len());
                order.push((e.skill_id.as_str(), 1));
            }
        }
    }
    // stable
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(TOP_SKILLS_LIMIT)
        .map(|(id, _)| id.to_string())
        .collect()
}

/// Short summary paragraph. Sentences whose figure is zero are left out.
pub fn narrative(child_name: &str, catalog: &Catalog, data: &ReportData) -> String {
    let mut parts = Vec::new();

    if let Some(category_id) = data.top_category.as_deref() {
        let count = data.entries_by_category.get(category_id).copied().unwrap_or(0);
        parts.push(format!(
            "{child_name} was most active in {} with {count} entries.",
            catalog.category_name(category_id)
        ));
    }

    let reached = data.milestones_reached.len();
    if reached > 0 {
        let plural = if reached == 1 { "" } else { "s" };
        parts.push(format!(
            "{child_name} reached {reached} new milestone{plural}!"
        ));
    }

    if data.xp_earned > 0 {
        parts.push(format!("Earned {} XP this period.", data.xp_earned));
    }

    if data.total_entries > 0 {
        parts.push("Keep up the great work!".to_string());
    } else {
        parts.push("Let's start logging some activities!".to_string());
    }

    parts.join(" ")
}

/// Highest non-zero category count. Ties go to the earlier catalog
/// category, then to ids outside the catalog in first-seen order.
fn top_category(
    catalog: &Catalog,
    entries: &[ReportEntry],
    counts: &BTreeMap<String, u32>,
) -> Option<String> {
    let mut extra: Vec<&str> = Vec::new();
    for e in entries {
        let id = e.category_id.as_str();
        if catalog.category(id).is_none() && !extra.contains(&id) {
            extra.push(id);
        }
    }
    let in_catalog = catalog.categories.iter().map(|c| c.id.as_str());
    let mut best: Option<(&str, u32)> = None;
    for id in in_catalog.chain(extra) {
        let count = counts.get(id).copied().unwrap_or(0);
        if count > best.map_or(0, |(_, c)| c) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id.to_string())
}
