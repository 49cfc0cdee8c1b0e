//! Write flows and read models on top of the store.
//!
//! A write persists its row and XP grant in one transaction, then runs the
//! achievement evaluator against a fresh snapshot of the child. Callers
//! hold the child's lock across the whole flow.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{Datelike, Days, NaiveDateTime, Utc};
use lillearner_shared::achievements::{self, ActivitySnapshot, EntryFact};
use lillearner_shared::api::{
    AchievementDto, ActiveBookDto, BulkEntriesReq, BulkEntriesResp, ChildDto, ChildLevelOutcomeDto,
    EntryDto, EntryOutcomeDto, GenerateReportReq, MAX_ENTRY_VALUE_LEN, MilestoneDto,
    MilestoneOutcomeDto, NewBookReq, NewEntryReq, ReportDto, StreakDto, TodayDto,
    ToggleMilestoneReq, UserCategoryDto, VoiceParseReq, VoiceParseResp,
};
use lillearner_shared::domain::{BookStatus, CustomCategoryKind, EntryKind, ReportKind, Season};
use lillearner_shared::report::{self, MilestoneReached, Period, ReportEntry, ReportInput};
use lillearner_shared::stats::{self, SkillProgress, StatsEntry, StatsSummary, StatsWindow};
use lillearner_shared::streak::{self, MAX_STREAK_DAYS};
use lillearner_shared::voice::{self, KnownCategory, KnownChild, VoiceParseResult};
use lillearner_shared::xp::{self, LevelProgress};
use tracing::{info, warn};

use super::{AppError, AppState, calendar};
use crate::storage::models::{Achievement, ActiveBook, Child, Entry, Milestone, Report, UserCategory};
use crate::storage::{EntryInput, LevelChange, ReportInsert};

/// Rows whose stored type no longer parses are left out of derived views.
fn known_kind(e: &Entry) -> Option<EntryKind> {
    match e.entry_type.parse::<EntryKind>() {
        Ok(k) => Some(k),
        Err(err) => {
            warn!(entry_id = %e.id, error = %err, "skipping entry with unknown type");
            None
        }
    }
}

fn merge(a: Option<LevelChange>, b: Option<LevelChange>) -> Option<LevelChange> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.then(b)),
        (a, b) => a.or(b),
    }
}

impl AppState {
    pub(super) async fn require_child(&self, child_id: &str) -> Result<Child, AppError> {
        self.store
            .get_child(child_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("child not found: {}", child_id)))
    }

    pub(super) async fn level_progress(&self, child_id: &str) -> Result<LevelProgress, AppError> {
        let total = self
            .store
            .child_level(child_id)
            .await?
            .map(|l| u64::try_from(l.total_xp).unwrap_or(0))
            .unwrap_or(0);
        Ok(xp::progress(total))
    }

    /// Every entry of the child mapped onto local days, plus the completed
    /// milestone count.
    async fn activity_snapshot(&self, child_id: &str) -> Result<ActivitySnapshot, AppError> {
        let entries = self.store.all_entries(child_id).await?;
        let completed = self.store.completed_milestone_count(child_id).await?;
        let facts = entries
            .into_iter()
            .filter_map(|e| {
                let kind = known_kind(&e)?;
                Some(EntryFact {
                    logged_on: calendar::local_day(&self.tz, e.logged_at),
                    category_id: e.category_id,
                    skill_id: e.skill_id,
                    kind,
                    value: e.value,
                })
            })
            .collect();
        Ok(ActivitySnapshot {
            entries: facts,
            completed_milestones: u64::try_from(completed).unwrap_or(0),
        })
    }

    /// Evaluates the catalog and persists whatever is newly satisfied.
    pub(super) async fn unlock_new_achievements(
        &self,
        child_id: &str,
    ) -> Result<(Vec<AchievementDto>, Option<LevelChange>), AppError> {
        let unlocked: HashSet<String> = self
            .store
            .list_achievements(child_id)
            .await?
            .into_iter()
            .map(|a| a.achievement_key)
            .collect();
        let snapshot = self.activity_snapshot(child_id).await?;
        let today = calendar::today(&self.tz);
        let keys: Vec<String> = achievements::evaluate(&self.catalog, &unlocked, &snapshot, today)
            .into_iter()
            .map(|def| def.key.clone())
            .collect();
        if keys.is_empty() {
            return Ok((Vec::new(), None));
        }
        let (rows, change) = self
            .store
            .unlock_achievements(child_id, keys, self.config.achievement_bonus_xp)
            .await?;
        for row in &rows {
            info!(child_id = %child_id, key = %row.achievement_key, "achievement unlocked");
        }
        Ok((rows.into_iter().map(|r| self.achievement_dto(r)).collect(), change))
    }

    pub(super) async fn log_entry(
        &self,
        child_id: &str,
        req: NewEntryReq,
    ) -> Result<EntryOutcomeDto, AppError> {
        let _guard = self.lock_child(child_id).await;
        self.require_child(child_id).await?;
        self.validate_entry_target(&req.category_id, &req.skill_id)?;
        if let Some(value) = &req.value
            && value.chars().count() > MAX_ENTRY_VALUE_LEN
        {
            return Err(AppError::bad_request(format!(
                "value must be at most {} characters",
                MAX_ENTRY_VALUE_LEN
            )));
        }

        let input = EntryInput {
            child_id: child_id.to_string(),
            category_id: req.category_id,
            skill_id: req.skill_id,
            kind: req.entry_type,
            value: req.value,
            notes: req.notes,
            media_urls: req.media_urls,
            lesson_number: req.lesson_number,
            user_category_id: req.user_category_id,
            logged_at: req.logged_at.unwrap_or_else(Utc::now).naive_utc(),
        };
        let xp_award = self
            .config
            .gamification
            .then(|| xp::award_for_entry(req.entry_type));
        let (entry, grant) = self.store.record_entry(input, xp_award).await?;

        let (new_achievements, bonus) = if self.config.gamification {
            self.unlock_new_achievements(child_id).await?
        } else {
            (Vec::new(), None)
        };
        let change = merge(grant, bonus);
        let level = match change {
            Some(c) => xp::progress(c.total_xp),
            None => self.level_progress(child_id).await?,
        };
        let leveled_up = change.is_some_and(|c| c.leveled_up());
        info!(
            child_id = %child_id,
            entry_id = %entry.id,
            entry_type = %entry.entry_type,
            xp_awarded = xp_award.unwrap_or(0),
            level = level.level,
            leveled_up,
            "entry logged"
        );
        Ok(EntryOutcomeDto {
            entry: entry_dto(entry)?,
            xp_awarded: xp_award.unwrap_or(0),
            level,
            leveled_up,
            new_achievements,
        })
    }

    /// A catalog skill must be logged under its own category. Ids outside
    /// the catalog (custom categories, voice sentinels) are accepted.
    fn validate_entry_target(&self, category_id: &str, skill_id: &str) -> Result<(), AppError> {
        if category_id.trim().is_empty() || skill_id.trim().is_empty() {
            return Err(AppError::bad_request("category_id and skill_id are required"));
        }
        if let Some((category, _)) = self.catalog.skill(skill_id)
            && category.id != category_id
        {
            return Err(AppError::bad_request(format!(
                "skill {} belongs to category {}",
                skill_id, category.id
            )));
        }
        Ok(())
    }

    pub(super) async fn log_bulk(&self, req: BulkEntriesReq) -> Result<BulkEntriesResp, AppError> {
        for d in &req.entries {
            self.validate_entry_target(&d.category_id, &d.skill_id)?;
        }
        // Lock in sorted order so concurrent bulk writes cannot deadlock.
        let child_ids: BTreeSet<String> =
            req.entries.iter().map(|d| d.child_id.clone()).collect();
        let mut guards = Vec::with_capacity(child_ids.len());
        for id in &child_ids {
            guards.push(self.lock_child(id).await);
        }
        for id in &child_ids {
            self.require_child(id).await?;
        }

        let now = Utc::now().naive_utc();
        let mut xp_awarded = 0u64;
        let inputs = req
            .entries
            .into_iter()
            .map(|d| {
                let award = self
                    .config
                    .gamification
                    .then(|| xp::award_for_entry(d.entry_type));
                xp_awarded += u64::from(award.unwrap_or(0));
                let input = EntryInput {
                    child_id: d.child_id,
                    category_id: d.category_id,
                    skill_id: d.skill_id,
                    kind: d.entry_type,
                    value: None,
                    notes: d.notes,
                    media_urls: Vec::new(),
                    lesson_number: d.lesson_number,
                    user_category_id: d.user_category_id,
                    logged_at: now,
                };
                (input, award)
            })
            .collect::<Vec<_>>();
        let (rows, mut grants) = self.store.record_entries(inputs).await?;

        let mut new_achievements = BTreeMap::new();
        let mut levels = BTreeMap::new();
        for id in &child_ids {
            let grant = grants.remove(id);
            let (unlocked, bonus) = if self.config.gamification {
                self.unlock_new_achievements(id).await?
            } else {
                (Vec::new(), None)
            };
            xp_awarded += unlocked.len() as u64 * u64::from(self.config.achievement_bonus_xp);
            if !unlocked.is_empty() {
                new_achievements.insert(id.clone(), unlocked);
            }
            let change = merge(grant, bonus);
            let level = match change {
                Some(c) => xp::progress(c.total_xp),
                None => self.level_progress(id).await?,
            };
            levels.insert(
                id.clone(),
                ChildLevelOutcomeDto {
                    level,
                    leveled_up: change.is_some_and(|c| c.leveled_up()),
                },
            );
        }
        drop(guards);

        info!(entries = rows.len(), children = child_ids.len(), xp_awarded, "bulk entries logged");
        Ok(BulkEntriesResp {
            entries: rows
                .into_iter()
                .map(entry_dto)
                .collect::<Result<_, _>>()?,
            xp_awarded,
            new_achievements,
            levels,
        })
    }

    pub(super) async fn toggle_milestone(
        &self,
        child_id: &str,
        req: ToggleMilestoneReq,
    ) -> Result<MilestoneOutcomeDto, AppError> {
        let _guard = self.lock_child(child_id).await;
        self.require_child(child_id).await?;
        let (_, skill) = self
            .catalog
            .skill(&req.skill_id)
            .ok_or_else(|| AppError::bad_request(format!("unknown skill: {}", req.skill_id)))?;
        if !skill.milestones.iter().any(|m| m == &req.milestone_key) {
            return Err(AppError::bad_request(format!(
                "unknown milestone {} for skill {}",
                req.milestone_key, req.skill_id
            )));
        }

        let award = self.config.gamification.then_some(xp::COMPLETE_MILESTONE);
        let (row, grant) = self
            .store
            .set_milestone(child_id, &req.skill_id, &req.milestone_key, req.completed, award)
            .await?;
        let xp_awarded = if grant.is_some() { xp::COMPLETE_MILESTONE } else { 0 };

        let (new_achievements, bonus) = if self.config.gamification {
            self.unlock_new_achievements(child_id).await?
        } else {
            (Vec::new(), None)
        };
        let change = merge(grant, bonus);
        let level = match change {
            Some(c) => xp::progress(c.total_xp),
            None => self.level_progress(child_id).await?,
        };
        let leveled_up = change.is_some_and(|c| c.leveled_up());
        info!(
            child_id = %child_id,
            skill_id = %row.skill_id,
            milestone = %row.milestone_key,
            completed = row.completed,
            xp_awarded,
            leveled_up,
            "milestone set"
        );
        Ok(MilestoneOutcomeDto {
            milestone: milestone_dto(row),
            xp_awarded,
            level,
            leveled_up,
            new_achievements,
        })
    }

    /// Manual re-check, e.g. after a catalog change.
    pub(super) async fn check_achievements(
        &self,
        child_id: &str,
    ) -> Result<Vec<AchievementDto>, AppError> {
        let _guard = self.lock_child(child_id).await;
        self.require_child(child_id).await?;
        let (unlocked, _) = self.unlock_new_achievements(child_id).await?;
        Ok(unlocked)
    }

    pub(super) async fn streak(&self, child_id: &str) -> Result<StreakDto, AppError> {
        self.require_child(child_id).await?;
        let today = calendar::today(&self.tz);
        let earliest = today
            .checked_sub_days(Days::new(u64::from(MAX_STREAK_DAYS)))
            .unwrap_or(today);
        let since = calendar::day_start_utc(&self.tz, earliest);
        let times = self.store.entry_times_since(child_id, since).await?;
        let days = streak::active_days(times.into_iter().map(|t| calendar::local_day(&self.tz, t)));
        Ok(StreakDto {
            child_id: child_id.to_string(),
            today,
            streak_days: streak::current_streak(&days, today),
        })
    }

    pub(super) async fn today_summary(&self, child_id: &str) -> Result<TodayDto, AppError> {
        self.require_child(child_id).await?;
        let today = calendar::today(&self.tz);
        let (from, to) = calendar::utc_range(&self.tz, today, today);
        let count = self.store.count_entries_between(child_id, from, to).await?;
        let progress = self.level_progress(child_id).await?;
        Ok(TodayDto {
            child_id: child_id.to_string(),
            today,
            today_count: u32::try_from(count).unwrap_or(u32::MAX),
            total_xp: progress.total_xp,
            current_level: progress.level,
        })
    }

    /// Per-category counts for the dashboard. Entries logged against a
    /// custom category are grouped under it rather than the catalog id.
    /// Weeks start on Sunday in the configured zone.
    pub(super) async fn category_stats(&self, child_id: &str) -> Result<StatsSummary, AppError> {
        self.require_child(child_id).await?;
        let today = calendar::today(&self.tz);
        let week_start = today
            .checked_sub_days(Days::new(u64::from(today.weekday().num_days_from_sunday())))
            .unwrap_or(today);
        let month_start = today.with_day(1).unwrap_or(today);
        let window = StatsWindow {
            week_start: timestamp(calendar::day_start_utc(&self.tz, week_start)),
            month_start: timestamp(calendar::day_start_utc(&self.tz, month_start)),
            now: Utc::now(),
        };

        let custom: HashMap<String, String> = self
            .store
            .list_user_categories()
            .await?
            .into_iter()
            .map(|c| (c.id, c.name))
            .collect();
        let entries: Vec<StatsEntry> = self
            .store
            .all_entries(child_id)
            .await?
            .into_iter()
            .map(|e| StatsEntry {
                group_id: e.user_category_id.unwrap_or(e.category_id),
                logged_at: timestamp(e.logged_at),
            })
            .collect();
        Ok(stats::category_stats(&entries, &window, |id| {
            custom
                .get(id)
                .cloned()
                .unwrap_or_else(|| self.catalog.category_name(id).to_string())
        }))
    }

    pub(super) async fn skill_progress(
        &self,
        child_id: &str,
        category_id: Option<&str>,
    ) -> Result<Vec<SkillProgress>, AppError> {
        self.require_child(child_id).await?;
        if let Some(id) = category_id
            && self.catalog.category(id).is_none()
        {
            return Err(AppError::bad_request(format!("unknown category: {}", id)));
        }
        let rows = self.store.list_milestones(child_id).await?;
        Ok(stats::skill_progress(
            &self.catalog,
            category_id,
            rows.iter()
                .filter(|m| m.completed)
                .map(|m| (m.skill_id.as_str(), m.milestone_key.as_str())),
        ))
    }

    pub(super) async fn add_book(
        &self,
        child_id: &str,
        req: NewBookReq,
    ) -> Result<ActiveBookDto, AppError> {
        self.require_child(child_id).await?;
        if req.category_id.trim().is_empty() {
            return Err(AppError::bad_request("category_id is required"));
        }
        let row = self
            .store
            .add_book(child_id, &req.category_id, &req.title)
            .await?;
        info!(child_id = %child_id, book_id = %row.id, category_id = %row.category_id, "book started");
        book_dto(row)
    }

    pub(super) async fn finish_book(
        &self,
        child_id: &str,
        book_id: &str,
    ) -> Result<ActiveBookDto, AppError> {
        self.require_child(child_id).await?;
        let row = self
            .store
            .finish_book(child_id, book_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("book not found: {}", book_id)))?;
        info!(child_id = %child_id, book_id = %row.id, "book finished");
        book_dto(row)
    }

    pub(super) async fn generate_report(
        &self,
        child_id: &str,
        req: GenerateReportReq,
    ) -> Result<ReportDto, AppError> {
        let child = self.require_child(child_id).await?;
        let today = calendar::today(&self.tz);
        let period = match (req.period_start, req.period_end) {
            (Some(start), Some(end)) => Period::new(start, end).ok_or_else(|| {
                AppError::bad_request("period_start must not be after period_end")
            })?,
            (None, None) => match req.report_type {
                ReportKind::Weekly => Period::week_of(today),
                ReportKind::Monthly => Period::month_of(today),
                ReportKind::Seasonal => {
                    let season = req.season.ok_or_else(|| {
                        AppError::bad_request("season is required for a seasonal report without dates")
                    })?;
                    Period::season_of(season, today)
                }
            }
            .ok_or_else(|| AppError::bad_request("period out of range"))?,
            _ => {
                return Err(AppError::bad_request(
                    "period_start and period_end must be given together",
                ));
            }
        };

        let (from, to) = calendar::utc_range(&self.tz, period.start, period.end);
        let entries = self.store.entries_between(child_id, from, to).await?;
        let milestones = self
            .store
            .milestones_completed_between(child_id, from, to)
            .await?;
        let xp_amounts = self.store.xp_amounts_between(child_id, from, to).await?;
        let xp_before_period = self.store.xp_total_before(child_id, from).await?;

        let report_entries: Vec<ReportEntry> = entries
            .iter()
            .filter_map(|e| {
                Some(ReportEntry {
                    kind: known_kind(e)?,
                    category_id: e.category_id.clone(),
                    skill_id: e.skill_id.clone(),
                    media_urls: media_urls(e),
                    logged_on: calendar::local_day(&self.tz, e.logged_at),
                })
            })
            .collect();
        let reached: Vec<MilestoneReached> = milestones
            .into_iter()
            .map(|m| MilestoneReached {
                skill_id: m.skill_id,
                milestone_key: m.milestone_key,
            })
            .collect();
        let input = ReportInput {
            entries: &report_entries,
            milestones: &reached,
            xp_amounts: &xp_amounts,
            xp_before_period,
        };
        let data = report::aggregate(&self.catalog, &input);
        let narrative = report::narrative(&child.name, &self.catalog, &data);
        let data_json = serde_json::to_string(&data).map_err(AppError::internal)?;

        let row = self
            .store
            .insert_report(ReportInsert {
                child_id: child_id.to_string(),
                kind: req.report_type,
                period_start: period.start,
                period_end: period.end,
                season: req.season,
                data_json,
                narrative,
            })
            .await?;
        info!(
            child_id = %child_id,
            report_id = %row.id,
            report_type = %row.report_type,
            start = %period.start,
            end = %period.end,
            total_entries = data.total_entries,
            "report generated"
        );
        report_dto(row)
    }

    pub(super) async fn parse_voice(&self, req: VoiceParseReq) -> Result<VoiceParseResp, AppError> {
        let text = req.text.trim();
        if text.is_empty() {
            return Ok(VoiceParseResp {
                result: VoiceParseResult::empty(&req.text),
                drafts: Vec::new(),
            });
        }
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| AppError::Unavailable("voice parsing is not configured".into()))?;

        let children: Vec<KnownChild> = self
            .store
            .list_children()
            .await?
            .into_iter()
            .map(|c| KnownChild {
                id: c.id,
                name: c.name,
            })
            .collect();
        if let Some(active) = req.active_child_id.as_deref()
            && !children.iter().any(|c| c.id == active)
        {
            return Err(AppError::not_found(format!("child not found: {}", active)));
        }
        let custom: Vec<KnownCategory> = self
            .store
            .list_user_categories()
            .await?
            .into_iter()
            .map(|c| KnownCategory {
                id: c.id,
                name: c.name,
                kind: c.category_type,
                total_lessons: c.total_lessons.and_then(|n| u32::try_from(n).ok()),
            })
            .collect();

        let prompt =
            voice::build_system_prompt(&children, &custom, &self.catalog).map_err(AppError::internal)?;
        let reply = llm
            .complete_json(&prompt, text)
            .await
            .map_err(|e| AppError::BadGateway(e.to_string()))?;
        let result = voice::parse_reply(&req.text, &reply);
        if let Some(raw) = &result.unparsed_reply {
            warn!(reply_len = raw.len(), "voice: model reply is not the expected JSON");
        }
        let drafts = voice::reconcile(
            &result.entries,
            &children,
            &custom,
            &self.catalog,
            req.active_child_id.as_deref(),
        );
        info!(
            parsed = result.entries.len(),
            drafts = drafts.len(),
            "voice note parsed"
        );
        Ok(VoiceParseResp { result, drafts })
    }

    pub(super) fn achievement_dto(&self, row: Achievement) -> AchievementDto {
        let unlocked_at = row.unlocked_at.and_utc();
        match self.catalog.achievement(&row.achievement_key) {
            Some(def) => AchievementDto {
                key: row.achievement_key,
                name: def.name.clone(),
                description: def.description.clone(),
                icon: def.icon.clone(),
                group: def.group,
                unlocked_at,
            },
            // Unlocked under an earlier catalog.
            None => AchievementDto {
                name: row.achievement_key.clone(),
                key: row.achievement_key,
                description: String::new(),
                icon: String::new(),
                group: lillearner_shared::catalog::AchievementGroup::Category,
                unlocked_at,
            },
        }
    }
}

fn media_urls(e: &Entry) -> Vec<String> {
    serde_json::from_str(&e.media_urls).unwrap_or_default()
}

fn timestamp(at: NaiveDateTime) -> chrono::DateTime<Utc> {
    at.and_utc()
}

pub(super) fn child_dto(c: Child) -> ChildDto {
    ChildDto {
        id: c.id,
        name: c.name,
        birthdate: c.birthdate,
        created_at: timestamp(c.created_at),
    }
}

pub(super) fn entry_dto(e: Entry) -> Result<EntryDto, AppError> {
    let entry_type = e.entry_type.parse::<EntryKind>().map_err(AppError::internal)?;
    let media_urls = media_urls(&e);
    Ok(EntryDto {
        id: e.id,
        child_id: e.child_id,
        category_id: e.category_id,
        skill_id: e.skill_id,
        entry_type,
        value: e.value,
        notes: e.notes,
        media_urls,
        lesson_number: e.lesson_number.and_then(|n| u32::try_from(n).ok()),
        user_category_id: e.user_category_id,
        logged_at: timestamp(e.logged_at),
    })
}

pub(super) fn milestone_dto(m: Milestone) -> MilestoneDto {
    MilestoneDto {
        skill_id: m.skill_id,
        milestone_key: m.milestone_key,
        completed: m.completed,
        completed_at: m.completed_at.map(timestamp),
    }
}

pub(super) fn report_dto(r: Report) -> Result<ReportDto, AppError> {
    let report_type = r.report_type.parse::<ReportKind>().map_err(AppError::internal)?;
    let season = r
        .season
        .as_deref()
        .map(str::parse::<Season>)
        .transpose()
        .map_err(AppError::internal)?;
    let data = serde_json::from_str(&r.data_json).map_err(AppError::internal)?;
    Ok(ReportDto {
        id: r.id,
        child_id: r.child_id,
        report_type,
        period_start: r.period_start,
        period_end: r.period_end,
        season,
        data,
        narrative: r.narrative,
        generated_at: timestamp(r.generated_at),
    })
}

pub(super) fn book_dto(b: ActiveBook) -> Result<ActiveBookDto, AppError> {
    let status = b.status.parse::<BookStatus>().map_err(AppError::internal)?;
    Ok(ActiveBookDto {
        id: b.id,
        child_id: b.child_id,
        category_id: b.category_id,
        title: b.title,
        status,
        started_at: timestamp(b.started_at),
        finished_at: b.finished_at.map(timestamp),
    })
}

pub(super) fn user_category_dto(c: UserCategory) -> Result<UserCategoryDto, AppError> {
    let category_type = c
        .category_type
        .parse::<CustomCategoryKind>()
        .map_err(AppError::internal)?;
    Ok(UserCategoryDto {
        id: c.id,
        name: c.name,
        icon: c.icon,
        color: c.color,
        category_type,
        total_lessons: c.total_lessons.and_then(|n| u32::try_from(n).ok()),
        sort_order: c.sort_order,
        is_active: c.is_active,
    })
}
