use crate::storage::schema::{
    achievements, active_books, child_levels, children, entries, milestones, reports,
    user_categories, xp_events,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = children)]
pub struct Child {
    pub id: String,
    pub name: String,
    pub birthdate: NaiveDate,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = children)]
pub struct NewChild<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub birthdate: NaiveDate,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = entries)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
pub struct Entry {
    pub id: String,
    pub child_id: String,
    pub category_id: String,
    pub skill_id: String,
    pub entry_type: String,
    pub value: Option<String>,
    pub notes: Option<String>,
    /// JSON array of strings.
    pub media_urls: String,
    pub lesson_number: Option<i32>,
    pub user_category_id: Option<String>,
    pub logged_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = entries)]
pub struct NewEntry<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub category_id: &'a str,
    pub skill_id: &'a str,
    pub entry_type: &'a str,
    pub value: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub media_urls: &'a str,
    pub lesson_number: Option<i32>,
    pub user_category_id: Option<&'a str>,
    pub logged_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = milestones)]
pub struct Milestone {
    pub child_id: String,
    pub skill_id: String,
    pub milestone_key: String,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Insertable, AsChangeset)]
#[diesel(table_name = milestones)]
#[diesel(treat_none_as_null = true)]
pub struct MilestoneUpsert<'a> {
    pub child_id: &'a str,
    pub skill_id: &'a str,
    pub milestone_key: &'a str,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = xp_events)]
pub struct XpEvent {
    pub id: i32,
    pub child_id: String,
    pub xp_amount: i32,
    pub source_type: String,
    pub source_id: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = xp_events)]
pub struct NewXpEvent<'a> {
    pub child_id: &'a str,
    pub xp_amount: i32,
    pub source_type: &'a str,
    pub source_id: Option<&'a str>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = child_levels)]
#[diesel(primary_key(child_id))]
pub struct ChildLevel {
    pub child_id: String,
    pub total_xp: i64,
    pub current_level: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = child_levels)]
pub struct NewChildLevel<'a> {
    pub child_id: &'a str,
    pub total_xp: i64,
    pub current_level: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = achievements)]
pub struct Achievement {
    pub child_id: String,
    pub achievement_key: String,
    pub unlocked_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = reports)]
pub struct Report {
    pub id: String,
    pub child_id: String,
    pub report_type: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub season: Option<String>,
    pub data_json: String,
    pub narrative: String,
    pub generated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = reports)]
pub struct NewReport<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub report_type: &'a str,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub season: Option<&'a str>,
    pub data_json: &'a str,
    pub narrative: &'a str,
    pub generated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = user_categories)]
pub struct UserCategory {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub category_type: String,
    pub total_lessons: Option<i32>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = user_categories)]
pub struct NewUserCategory<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub icon: &'a str,
    pub color: &'a str,
    pub category_type: &'a str,
    pub total_lessons: Option<i32>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = active_books)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
pub struct ActiveBook {
    pub id: String,
    pub child_id: String,
    pub category_id: String,
    pub title: String,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = active_books)]
pub struct NewActiveBook<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub category_id: &'a str,
    pub title: &'a str,
    pub status: &'a str,
    pub started_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}
