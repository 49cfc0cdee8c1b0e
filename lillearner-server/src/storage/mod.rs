pub mod models;
pub mod schema;

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use lillearner_shared::domain::{
    BookStatus, CustomCategoryKind, EntryKind, ReportKind, Season, XpSource,
};
use lillearner_shared::xp;
use models::{
    Achievement, ActiveBook, Child, ChildLevel, Entry, Milestone, MilestoneUpsert, NewActiveBook,
    NewChild, NewChildLevel, NewEntry, NewReport, NewUserCategory, NewXpEvent, Report,
    UserCategory,
};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A row with the same key already exists.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Level state before and after one or more XP grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub total_xp: u64,
    pub level_before: u32,
    pub level_after: u32,
}

impl LevelChange {
    pub fn leveled_up(&self) -> bool {
        self.level_after > self.level_before
    }

    /// Folds a later grant into this one.
    pub fn then(self, later: LevelChange) -> LevelChange {
        LevelChange {
            total_xp: later.total_xp,
            level_before: self.level_before,
            level_after: later.level_after,
        }
    }
}

/// A new entry as supplied by the service layer.
#[derive(Debug, Clone)]
pub struct EntryInput {
    pub child_id: String,
    pub category_id: String,
    pub skill_id: String,
    pub kind: EntryKind,
    pub value: Option<String>,
    pub notes: Option<String>,
    pub media_urls: Vec<String>,
    pub lesson_number: Option<u32>,
    pub user_category_id: Option<String>,
    pub logged_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ReportInsert {
    pub child_id: String,
    pub kind: ReportKind,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub season: Option<Season>,
    pub data_json: String,
    pub narrative: String,
}

#[derive(Debug, Clone)]
pub struct UserCategoryInput {
    pub name: String,
    pub kind: CustomCategoryKind,
    pub icon: String,
    pub color: String,
    pub total_lessons: Option<u32>,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    /// Runs `f` on a pooled connection off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    // Children

    /// Creates the child together with its zeroed level row.
    pub async fn create_child(&self, name: &str, birthdate: NaiveDate) -> Result<Child, StorageError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(StorageError::InvalidInput("name must not be empty".into()));
        }
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let id = Uuid::new_v4().to_string();
                let now = Utc::now().naive_utc();
                diesel::insert_into(schema::children::table)
                    .values(&NewChild {
                        id: &id,
                        name: &name,
                        birthdate,
                        created_at: now,
                    })
                    .execute(conn)?;
                diesel::insert_into(schema::child_levels::table)
                    .values(&NewChildLevel {
                        child_id: &id,
                        total_xp: 0,
                        current_level: 1,
                        updated_at: now,
                    })
                    .execute(conn)?;
                Ok(schema::children::table
                    .find(&id)
                    .select(Child::as_select())
                    .first(conn)?)
            })
        })
        .await
    }

    pub async fn list_children(&self) -> Result<Vec<Child>, StorageError> {
        use schema::children::dsl::*;
        self.blocking(|conn| {
            Ok(children
                .order((created_at.asc(), name.asc()))
                .select(Child::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn get_child(&self, child: &str) -> Result<Option<Child>, StorageError> {
        use schema::children::dsl::*;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(children
                .filter(id.eq(&child_id))
                .select(Child::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    /// Removes the child; dependent rows go with it through `ON DELETE CASCADE`.
    pub async fn delete_child(&self, child: &str) -> Result<bool, StorageError> {
        use schema::children::dsl::*;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            let deleted = diesel::delete(children.filter(id.eq(&child_id))).execute(conn)?;
            Ok(deleted > 0)
        })
        .await
    }

    // Entries

    /// Appends an entry and, when `xp_award` is set, grants its XP in the
    /// same transaction.
    pub async fn record_entry(
        &self,
        input: EntryInput,
        xp_award: Option<u32>,
    ) -> Result<(Entry, Option<LevelChange>), StorageError> {
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let entry = insert_entry_tx(conn, &input)?;
                let change = match xp_award {
                    Some(amount) => Some(grant_xp_tx(
                        conn,
                        &entry.child_id,
                        amount,
                        XpSource::Entry,
                        Some(&entry.id),
                        entry.logged_at,
                    )?),
                    None => None,
                };
                Ok((entry, change))
            })
        })
        .await
    }

    /// All-or-nothing variant of [`Store::record_entry`]. Level changes are
    /// folded per child.
    pub async fn record_entries(
        &self,
        inputs: Vec<(EntryInput, Option<u32>)>,
    ) -> Result<(Vec<Entry>, BTreeMap<String, LevelChange>), StorageError> {
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let mut created = Vec::with_capacity(inputs.len());
                let mut changes: BTreeMap<String, LevelChange> = BTreeMap::new();
                for (input, xp_award) in &inputs {
                    let entry = insert_entry_tx(conn, input)?;
                    if let Some(amount) = *xp_award {
                        let granted = grant_xp_tx(
                            conn,
                            &entry.child_id,
                            amount,
                            XpSource::Entry,
                            Some(&entry.id),
                            entry.logged_at,
                        )?;
                        changes
                            .entry(entry.child_id.clone())
                            .and_modify(|c| *c = c.then(granted))
                            .or_insert(granted);
                    }
                    created.push(entry);
                }
                Ok((created, changes))
            })
        })
        .await
    }

    /// Most recent entries first.
    pub async fn list_entries(
        &self,
        child: &str,
        category: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Entry>, StorageError> {
        use schema::entries::dsl as e;
        let child_id = child.to_string();
        let category = category.map(str::to_string);
        self.blocking(move |conn| {
            let mut q = e::entries.filter(e::child_id.eq(child_id)).into_boxed();
            if let Some(c) = category {
                q = q.filter(e::category_id.eq(c));
            }
            Ok(q.order((e::logged_at.desc(), e::created_at.desc()))
                .limit(limit)
                .select(Entry::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Every entry for the child in chronological order.
    pub async fn all_entries(&self, child: &str) -> Result<Vec<Entry>, StorageError> {
        use schema::entries::dsl as e;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(e::entries
                .filter(e::child_id.eq(child_id))
                .order((e::logged_at.asc(), e::created_at.asc()))
                .select(Entry::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Entries with `from <= logged_at < to`, chronological.
    pub async fn entries_between(
        &self,
        child: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Entry>, StorageError> {
        use schema::entries::dsl as e;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(e::entries
                .filter(e::child_id.eq(child_id))
                .filter(e::logged_at.ge(from))
                .filter(e::logged_at.lt(to))
                .order((e::logged_at.asc(), e::created_at.asc()))
                .select(Entry::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn count_entries_between(
        &self,
        child: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<i64, StorageError> {
        use schema::entries::dsl as e;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(e::entries
                .filter(e::child_id.eq(child_id))
                .filter(e::logged_at.ge(from))
                .filter(e::logged_at.lt(to))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    /// Entry timestamps at or after `since`, for streak computation.
    pub async fn entry_times_since(
        &self,
        child: &str,
        since: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>, StorageError> {
        use schema::entries::dsl as e;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(e::entries
                .filter(e::child_id.eq(child_id))
                .filter(e::logged_at.ge(since))
                .select(e::logged_at)
                .load(conn)?)
        })
        .await
    }

    // Milestones

    /// Upserts the milestone (last write wins). XP is granted only when the
    /// milestone moves from not completed to completed.
    pub async fn set_milestone(
        &self,
        child: &str,
        skill: &str,
        key: &str,
        completed: bool,
        xp_award: Option<u32>,
    ) -> Result<(Milestone, Option<LevelChange>), StorageError> {
        use schema::milestones::dsl as m;
        let child_id = child.to_string();
        let skill_id = skill.to_string();
        let milestone_key = key.to_string();
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let key_filter = || {
                    m::child_id
                        .eq(&child_id)
                        .and(m::skill_id.eq(&skill_id))
                        .and(m::milestone_key.eq(&milestone_key))
                };
                let was_completed: bool = m::milestones
                    .filter(key_filter())
                    .select(m::completed)
                    .first(conn)
                    .optional()?
                    .unwrap_or(false);

                let now = Utc::now().naive_utc();
                let completed_at = completed.then_some(now);
                diesel::insert_into(m::milestones)
                    .values(&MilestoneUpsert {
                        child_id: &child_id,
                        skill_id: &skill_id,
                        milestone_key: &milestone_key,
                        completed,
                        completed_at,
                    })
                    .on_conflict((m::child_id, m::skill_id, m::milestone_key))
                    .do_update()
                    .set((m::completed.eq(completed), m::completed_at.eq(completed_at)))
                    .execute(conn)?;

                let row = m::milestones
                    .filter(key_filter())
                    .select(Milestone::as_select())
                    .first(conn)?;

                let change = match xp_award {
                    Some(amount) if completed && !was_completed => {
                        let source = format!("{}:{}", skill_id, milestone_key);
                        Some(grant_xp_tx(
                            conn,
                            &child_id,
                            amount,
                            XpSource::Milestone,
                            Some(&source),
                            now,
                        )?)
                    }
                    _ => None,
                };
                Ok((row, change))
            })
        })
        .await
    }

    pub async fn list_milestones(&self, child: &str) -> Result<Vec<Milestone>, StorageError> {
        use schema::milestones::dsl as m;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(m::milestones
                .filter(m::child_id.eq(child_id))
                .order((m::skill_id.asc(), m::milestone_key.asc()))
                .select(Milestone::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn completed_milestone_count(&self, child: &str) -> Result<i64, StorageError> {
        use schema::milestones::dsl as m;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(m::milestones
                .filter(m::child_id.eq(child_id))
                .filter(m::completed.eq(true))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    /// Milestones completed with `from <= completed_at < to`, in completion order.
    pub async fn milestones_completed_between(
        &self,
        child: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Milestone>, StorageError> {
        use schema::milestones::dsl as m;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(m::milestones
                .filter(m::child_id.eq(child_id))
                .filter(m::completed.eq(true))
                .filter(m::completed_at.ge(from))
                .filter(m::completed_at.lt(to))
                .order(m::completed_at.asc())
                .select(Milestone::as_select())
                .load(conn)?)
        })
        .await
    }

    // XP ledger and levels

    pub async fn child_level(&self, child: &str) -> Result<Option<ChildLevel>, StorageError> {
        use schema::child_levels::dsl as cl;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(cl::child_levels
                .filter(cl::child_id.eq(child_id))
                .select(ChildLevel::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    /// Ledger total granted strictly before `at`.
    pub async fn xp_total_before(&self, child: &str, at: NaiveDateTime) -> Result<u64, StorageError> {
        use diesel::dsl::sum;
        use schema::xp_events::dsl as x;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            let total: Option<i64> = x::xp_events
                .filter(x::child_id.eq(child_id))
                .filter(x::created_at.lt(at))
                .select(sum(x::xp_amount))
                .first(conn)?;
            Ok(u64::try_from(total.unwrap_or(0)).unwrap_or(0))
        })
        .await
    }

    pub async fn xp_amounts_between(
        &self,
        child: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<u32>, StorageError> {
        use schema::xp_events::dsl as x;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            let rows: Vec<i32> = x::xp_events
                .filter(x::child_id.eq(child_id))
                .filter(x::created_at.ge(from))
                .filter(x::created_at.lt(to))
                .order(x::id.asc())
                .select(x::xp_amount)
                .load(conn)?;
            Ok(rows
                .into_iter()
                .map(|a| u32::try_from(a).unwrap_or(0))
                .collect())
        })
        .await
    }

    /// Recomputes every `child_levels` row from the XP ledger. Returns the
    /// number of children whose stored total differed.
    pub async fn rebuild_levels(&self) -> Result<usize, StorageError> {
        use diesel::dsl::sum;
        use schema::child_levels::dsl as cl;
        use schema::children::dsl as c;
        use schema::xp_events::dsl as x;
        self.blocking(|conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let ids: Vec<String> = c::children.select(c::id).load(conn)?;
                let now = Utc::now().naive_utc();
                let mut repaired = 0usize;
                for child_id in &ids {
                    let ledger: Option<i64> = x::xp_events
                        .filter(x::child_id.eq(child_id))
                        .select(sum(x::xp_amount))
                        .first(conn)?;
                    let total = ledger.unwrap_or(0).max(0);
                    let level = level_column(xp::level(total as u64));
                    let stored: Option<(i64, i32)> = cl::child_levels
                        .filter(cl::child_id.eq(child_id))
                        .select((cl::total_xp, cl::current_level))
                        .first(conn)
                        .optional()?;
                    if stored == Some((total, level)) {
                        continue;
                    }
                    debug!(child_id = %child_id, ?stored, total, level, "rebuild_levels: repairing");
                    diesel::insert_into(cl::child_levels)
                        .values(&NewChildLevel {
                            child_id,
                            total_xp: total,
                            current_level: level,
                            updated_at: now,
                        })
                        .on_conflict(cl::child_id)
                        .do_update()
                        .set((
                            cl::total_xp.eq(total),
                            cl::current_level.eq(level),
                            cl::updated_at.eq(now),
                        ))
                        .execute(conn)?;
                    repaired += 1;
                }
                info!(children = ids.len(), repaired, "rebuild_levels done");
                Ok(repaired)
            })
        })
        .await
    }

    // Achievements

    pub async fn list_achievements(&self, child: &str) -> Result<Vec<Achievement>, StorageError> {
        use schema::achievements::dsl as a;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(a::achievements
                .filter(a::child_id.eq(child_id))
                .order((a::unlocked_at.asc(), a::achievement_key.asc()))
                .select(Achievement::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Inserts unlock rows, ignoring keys that are already unlocked. Only
    /// rows actually inserted are returned; each earns `bonus_xp` when
    /// non-zero.
    pub async fn unlock_achievements(
        &self,
        child: &str,
        keys: Vec<String>,
        bonus_xp: u32,
    ) -> Result<(Vec<Achievement>, Option<LevelChange>), StorageError> {
        use schema::achievements::dsl as a;
        if keys.is_empty() {
            return Ok((Vec::new(), None));
        }
        let child_id = child.to_string();
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let now = Utc::now().naive_utc();
                let mut inserted = Vec::new();
                let mut change: Option<LevelChange> = None;
                for key in keys {
                    let row = Achievement {
                        child_id: child_id.clone(),
                        achievement_key: key,
                        unlocked_at: now,
                    };
                    let n = diesel::insert_into(a::achievements)
                        .values(&row)
                        .on_conflict_do_nothing()
                        .execute(conn)?;
                    if n == 0 {
                        trace!(child_id = %child_id, key = %row.achievement_key, "already unlocked");
                        continue;
                    }
                    if bonus_xp > 0 {
                        let granted = grant_xp_tx(
                            conn,
                            &child_id,
                            bonus_xp,
                            XpSource::Achievement,
                            Some(&row.achievement_key),
                            now,
                        )?;
                        change = Some(change.map_or(granted, |prev| prev.then(granted)));
                    }
                    inserted.push(row);
                }
                Ok((inserted, change))
            })
        })
        .await
    }

    // Reports

    pub async fn insert_report(&self, rec: ReportInsert) -> Result<Report, StorageError> {
        use schema::reports::dsl as r;
        self.blocking(move |conn| {
            let id = Uuid::new_v4().to_string();
            diesel::insert_into(r::reports)
                .values(&NewReport {
                    id: &id,
                    child_id: &rec.child_id,
                    report_type: rec.kind.as_str(),
                    period_start: rec.period_start,
                    period_end: rec.period_end,
                    season: rec.season.map(|s| s.as_str()),
                    data_json: &rec.data_json,
                    narrative: &rec.narrative,
                    generated_at: Utc::now().naive_utc(),
                })
                .execute(conn)?;
            Ok(r::reports
                .find(&id)
                .select(Report::as_select())
                .first(conn)?)
        })
        .await
    }

    /// Newest first.
    pub async fn list_reports(&self, child: &str) -> Result<Vec<Report>, StorageError> {
        use schema::reports::dsl as r;
        let child_id = child.to_string();
        self.blocking(move |conn| {
            Ok(r::reports
                .filter(r::child_id.eq(child_id))
                .order(r::generated_at.desc())
                .select(Report::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn get_report(&self, report: &str) -> Result<Option<Report>, StorageError> {
        use schema::reports::dsl as r;
        let report_id = report.to_string();
        self.blocking(move |conn| {
            Ok(r::reports
                .find(report_id)
                .select(Report::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    // Custom categories

    /// Ids are slugs of the name; a second category with the same slug is a
    /// conflict.
    pub async fn create_user_category(
        &self,
        input: UserCategoryInput,
    ) -> Result<UserCategory, StorageError> {
        use schema::user_categories::dsl as uc;
        let name = input.name.trim().to_string();
        let id = slug::slugify(&name);
        if id.is_empty() {
            return Err(StorageError::InvalidInput(
                "category name must contain letters or digits".into(),
            ));
        }
        let total_lessons = input
            .total_lessons
            .map(i32::try_from)
            .transpose()
            .map_err(|_| StorageError::InvalidInput("total_lessons out of range".into()))?;
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                let existing: i64 = uc::user_categories.count().get_result(conn)?;
                diesel::insert_into(uc::user_categories)
                    .values(&NewUserCategory {
                        id: &id,
                        name: &name,
                        icon: &input.icon,
                        color: &input.color,
                        category_type: input.kind.as_str(),
                        total_lessons,
                        sort_order: i32::try_from(existing).unwrap_or(i32::MAX),
                        is_active: true,
                        created_at: Utc::now().naive_utc(),
                    })
                    .execute(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            StorageError::Conflict(format!("category already exists: {}", id))
                        }
                        other => other.into(),
                    })?;
                Ok(uc::user_categories
                    .find(&id)
                    .select(UserCategory::as_select())
                    .first(conn)?)
            })
        })
        .await
    }

    /// Active categories in display order.
    pub async fn list_user_categories(&self) -> Result<Vec<UserCategory>, StorageError> {
        use schema::user_categories::dsl as uc;
        self.blocking(|conn| {
            Ok(uc::user_categories
                .filter(uc::is_active.eq(true))
                .order((uc::sort_order.asc(), uc::name.asc()))
                .select(UserCategory::as_select())
                .load(conn)?)
        })
        .await
    }

    // Books

    pub async fn add_book(
        &self,
        child: &str,
        category: &str,
        title: &str,
    ) -> Result<ActiveBook, StorageError> {
        use schema::active_books::dsl as b;
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(StorageError::InvalidInput("title must not be empty".into()));
        }
        let child_id = child.to_string();
        let category_id = category.to_string();
        self.blocking(move |conn| {
            let id = Uuid::new_v4().to_string();
            let now = Utc::now().naive_utc();
            diesel::insert_into(b::active_books)
                .values(&NewActiveBook {
                    id: &id,
                    child_id: &child_id,
                    category_id: &category_id,
                    title: &title,
                    status: BookStatus::Reading.as_str(),
                    started_at: now,
                    created_at: now,
                })
                .execute(conn)?;
            Ok(b::active_books
                .find(&id)
                .select(ActiveBook::as_select())
                .first(conn)?)
        })
        .await
    }

    /// Most recently started first.
    pub async fn list_books(
        &self,
        child: &str,
        category: Option<&str>,
    ) -> Result<Vec<ActiveBook>, StorageError> {
        use schema::active_books::dsl as b;
        let child_id = child.to_string();
        let category = category.map(str::to_string);
        self.blocking(move |conn| {
            let mut q = b::active_books
                .filter(b::child_id.eq(child_id))
                .into_boxed();
            if let Some(c) = category {
                q = q.filter(b::category_id.eq(c));
            }
            Ok(q.order((b::started_at.desc(), b::created_at.desc()))
                .select(ActiveBook::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Marks the book finished. Finishing twice keeps the first
    /// `finished_at`. `None` when the child has no such book.
    pub async fn finish_book(
        &self,
        child: &str,
        book: &str,
    ) -> Result<Option<ActiveBook>, StorageError> {
        use schema::active_books::dsl as b;
        let child_id = child.to_string();
        let book_id = book.to_string();
        self.blocking(move |conn| {
            conn.immediate_transaction::<_, StorageError, _>(|conn| {
                diesel::update(
                    b::active_books
                        .filter(b::id.eq(&book_id))
                        .filter(b::child_id.eq(&child_id))
                        .filter(b::status.eq(BookStatus::Reading.as_str())),
                )
                .set((
                    b::status.eq(BookStatus::Finished.as_str()),
                    b::finished_at.eq(Some(Utc::now().naive_utc())),
                ))
                .execute(conn)?;
                Ok(b::active_books
                    .filter(b::id.eq(&book_id))
                    .filter(b::child_id.eq(&child_id))
                    .select(ActiveBook::as_select())
                    .first(conn)
                    .optional()?)
            })
        })
        .await
    }
}

fn insert_entry_tx(conn: &mut SqliteConnection, input: &EntryInput) -> Result<Entry, StorageError> {
    use schema::entries::dsl as e;
    let id = Uuid::new_v4().to_string();
    let media = serde_json::to_string(&input.media_urls)
        .map_err(|err| StorageError::InvalidInput(err.to_string()))?;
    let lesson_number = input
        .lesson_number
        .map(i32::try_from)
        .transpose()
        .map_err(|_| StorageError::InvalidInput("lesson_number out of range".into()))?;
    diesel::insert_into(e::entries)
        .values(&NewEntry {
            id: &id,
            child_id: &input.child_id,
            category_id: &input.category_id,
            skill_id: &input.skill_id,
            entry_type: input.kind.as_str(),
            value: input.value.as_deref(),
            notes: input.notes.as_deref(),
            media_urls: &media,
            lesson_number,
            user_category_id: input.user_category_id.as_deref(),
            logged_at: input.logged_at,
            created_at: Utc::now().naive_utc(),
        })
        .execute(conn)?;
    Ok(e::entries
        .find(&id)
        .select(Entry::as_select())
        .first(conn)?)
}

/// Appends a ledger row and bumps the running total in place. Must run
/// inside an immediate transaction so the increment and the level
/// recomputation see the same total.
fn grant_xp_tx(
    conn: &mut SqliteConnection,
    child: &str,
    amount: u32,
    source: XpSource,
    source_id: Option<&str>,
    at: NaiveDateTime,
) -> Result<LevelChange, StorageError> {
    use schema::child_levels::dsl as cl;
    let xp_amount = i32::try_from(amount)
        .map_err(|_| StorageError::InvalidInput(format!("xp amount too large: {}", amount)))?;
    let now = Utc::now().naive_utc();

    diesel::insert_into(schema::xp_events::table)
        .values(&NewXpEvent {
            child_id: child,
            xp_amount,
            source_type: source.as_str(),
            source_id,
            created_at: at,
        })
        .execute(conn)?;

    diesel::insert_into(cl::child_levels)
        .values(&NewChildLevel {
            child_id: child,
            total_xp: 0,
            current_level: 1,
            updated_at: now,
        })
        .on_conflict_do_nothing()
        .execute(conn)?;

    let total: i64 = diesel::update(cl::child_levels.filter(cl::child_id.eq(child)))
        .set((
            cl::total_xp.eq(cl::total_xp + i64::from(amount)),
            cl::updated_at.eq(now),
        ))
        .returning(cl::total_xp)
        .get_result(conn)?;
    let total = u64::try_from(total).unwrap_or(0);
    let level_after = xp::level(total);
    diesel::update(cl::child_levels.filter(cl::child_id.eq(child)))
        .set(cl::current_level.eq(level_column(level_after)))
        .execute(conn)?;

    let change = LevelChange {
        total_xp: total,
        level_before: xp::level(total.saturating_sub(u64::from(amount))),
        level_after,
    };
    debug!(
        child_id = %child,
        amount,
        source = source.as_str(),
        total_xp = change.total_xp,
        level = change.level_after,
        "xp granted"
    );
    Ok(change)
}

fn level_column(level: u32) -> i32 {
    i32::try_from(level).unwrap_or(i32::MAX)
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}
