use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::AchievementGroup;
use crate::domain::{BookStatus, CustomCategoryKind, EntryKind, ReportKind, Season};
use crate::report::ReportData;
use crate::voice::{EntryDraft, VoiceParseResult};
use crate::xp::LevelProgress;

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";
/// Longest accepted free-text counter value, in characters.
pub const MAX_ENTRY_VALUE_LEN: usize = 128;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// Children
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildDto {
    pub id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewChildReq {
    pub name: String,
    pub birthdate: NaiveDate,
}

// Entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDto {
    pub id: String,
    pub child_id: String,
    pub category_id: String,
    pub skill_id: String,
    pub entry_type: EntryKind,
    pub value: Option<String>,
    pub notes: Option<String>,
    pub media_urls: Vec<String>,
    pub lesson_number: Option<u32>,
    pub user_category_id: Option<String>,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntryReq {
    pub category_id: String,
    pub skill_id: String,
    pub entry_type: EntryKind,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub media_urls: Vec<String>,
    #[serde(default)]
    pub lesson_number: Option<u32>,
    #[serde(default)]
    pub user_category_id: Option<String>,
    /// Back-dates the entry; defaults to now.
    #[serde(default)]
    pub logged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryOutcomeDto {
    pub entry: EntryDto,
    pub xp_awarded: u32,
    pub level: LevelProgress,
    pub leveled_up: bool,
    pub new_achievements: Vec<AchievementDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkEntriesReq {
    pub entries: Vec<EntryDraft>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkEntriesResp {
    pub entries: Vec<EntryDto>,
    pub xp_awarded: u64,
    /// Newly unlocked achievements keyed by child id.
    pub new_achievements: BTreeMap<String, Vec<AchievementDto>>,
    /// Level after the write for every child touched, keyed by child id.
    pub levels: BTreeMap<String, ChildLevelOutcomeDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildLevelOutcomeDto {
    pub level: LevelProgress,
    pub leveled_up: bool,
}

// Milestones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilestoneDto {
    pub skill_id: String,
    pub milestone_key: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleMilestoneReq {
    pub skill_id: String,
    pub milestone_key: String,
    pub completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MilestoneOutcomeDto {
    pub milestone: MilestoneDto,
    pub xp_awarded: u32,
    pub level: LevelProgress,
    pub leveled_up: bool,
    pub new_achievements: Vec<AchievementDto>,
}

// Progress
#[derive(Debug, Serialize, Deserialize)]
pub struct StreakDto {
    pub child_id: String,
    pub today: NaiveDate,
    pub streak_days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TodayDto {
    pub child_id: String,
    pub today: NaiveDate,
    pub today_count: u32,
    pub total_xp: u64,
    pub current_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDto {
    pub key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub group: AchievementGroup,
    pub unlocked_at: DateTime<Utc>,
}

/// Query for the skill progress and book listings.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CategoryFilter {
    #[serde(default)]
    pub category_id: Option<String>,
}

// Books
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveBookDto {
    pub id: String,
    pub child_id: String,
    pub category_id: String,
    pub title: String,
    pub status: BookStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewBookReq {
    pub category_id: String,
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckAchievementsResp {
    pub new_achievements: Vec<AchievementDto>,
}

// Reports
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateReportReq {
    pub report_type: ReportKind,
    /// Explicit window; when omitted the current week, month or season is
    /// used according to `report_type`.
    #[serde(default)]
    pub period_start: Option<NaiveDate>,
    #[serde(default)]
    pub period_end: Option<NaiveDate>,
    #[serde(default)]
    pub season: Option<Season>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDto {
    pub id: String,
    pub child_id: String,
    pub report_type: ReportKind,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub season: Option<Season>,
    pub data: ReportData,
    pub narrative: String,
    pub generated_at: DateTime<Utc>,
}

// Custom categories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCategoryDto {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub category_type: CustomCategoryKind,
    pub total_lessons: Option<u32>,
    pub sort_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewUserCategoryReq {
    pub name: String,
    /// Defaults to `lesson`.
    #[serde(default)]
    pub category_type: Option<CustomCategoryKind>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub total_lessons: Option<u32>,
}

// Voice notes
#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceParseReq {
    pub text: String,
    #[serde(default)]
    pub active_child_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceParseResp {
    pub result: VoiceParseResult,
    pub drafts: Vec<EntryDraft>,
}
