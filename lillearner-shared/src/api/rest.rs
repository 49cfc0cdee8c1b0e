//! Minimal REST client helpers for consumers (companion apps, scripts, tests).
//! Feature-gated by `rest-client` to avoid pulling reqwest into the server.

use super::endpoints as ep;
use super::*;
use crate::catalog::{AchievementDef, Category};
use crate::stats::{SkillProgress, StatsSummary};

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

fn mk_client() -> Result<reqwest::Client, RestError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| RestError::Http(e.to_string()))
}

async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn get_json<T: for<'de> serde::Deserialize<'de>>(url: String) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn post_json<B, T>(url: String, body: &B) -> Result<T, RestError>
where
    B: serde::Serialize + ?Sized,
    T: for<'de> serde::Deserialize<'de>,
{
    let client = mk_client()?;
    let res = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn catalog_categories(base: &str) -> Result<Vec<Category>, RestError> {
    get_json(ep::catalog_categories(base)).await
}

pub async fn catalog_achievements(base: &str) -> Result<Vec<AchievementDef>, RestError> {
    get_json(ep::catalog_achievements(base)).await
}

pub async fn create_child(base: &str, req: &NewChildReq) -> Result<ChildDto, RestError> {
    post_json(ep::children(base), req).await
}

pub async fn list_children(base: &str) -> Result<Vec<ChildDto>, RestError> {
    get_json(ep::children(base)).await
}

pub async fn create_entry(
    base: &str,
    child_id: &str,
    req: &NewEntryReq,
) -> Result<EntryOutcomeDto, RestError> {
    post_json(ep::child_entries(base, child_id), req).await
}

pub async fn list_entries(base: &str, child_id: &str) -> Result<Vec<EntryDto>, RestError> {
    get_json(ep::child_entries(base, child_id)).await
}

pub async fn bulk_entries(base: &str, req: &BulkEntriesReq) -> Result<BulkEntriesResp, RestError> {
    post_json(ep::entries_bulk(base), req).await
}

pub async fn toggle_milestone(
    base: &str,
    child_id: &str,
    req: &ToggleMilestoneReq,
) -> Result<MilestoneOutcomeDto, RestError> {
    post_json(ep::child_milestones(base, child_id), req).await
}

pub async fn list_milestones(base: &str, child_id: &str) -> Result<Vec<MilestoneDto>, RestError> {
    get_json(ep::child_milestones(base, child_id)).await
}

pub async fn child_level(base: &str, child_id: &str) -> Result<LevelProgress, RestError> {
    get_json(ep::child_level(base, child_id)).await
}

pub async fn child_streak(base: &str, child_id: &str) -> Result<StreakDto, RestError> {
    get_json(ep::child_streak(base, child_id)).await
}

pub async fn child_today(base: &str, child_id: &str) -> Result<TodayDto, RestError> {
    get_json(ep::child_today(base, child_id)).await
}

pub async fn list_achievements(
    base: &str,
    child_id: &str,
) -> Result<Vec<AchievementDto>, RestError> {
    get_json(ep::child_achievements(base, child_id)).await
}

pub async fn check_achievements(
    base: &str,
    child_id: &str,
) -> Result<CheckAchievementsResp, RestError> {
    post_json(ep::child_achievements_check(base, child_id), &serde_json::json!({})).await
}

pub async fn child_stats(base: &str, child_id: &str) -> Result<StatsSummary, RestError> {
    get_json(ep::child_stats(base, child_id)).await
}

pub async fn skill_progress(
    base: &str,
    child_id: &str,
    category_id: Option<&str>,
) -> Result<Vec<SkillProgress>, RestError> {
    get_json(ep::child_skill_progress(base, child_id, category_id)).await
}

pub async fn list_books(
    base: &str,
    child_id: &str,
    category_id: Option<&str>,
) -> Result<Vec<ActiveBookDto>, RestError> {
    get_json(ep::child_books(base, child_id, category_id)).await
}

pub async fn add_book(
    base: &str,
    child_id: &str,
    req: &NewBookReq,
) -> Result<ActiveBookDto, RestError> {
    post_json(ep::child_books(base, child_id, None), req).await
}

pub async fn finish_book(
    base: &str,
    child_id: &str,
    book_id: &str,
) -> Result<ActiveBookDto, RestError> {
    post_json(ep::child_book_finish(base, child_id, book_id), &serde_json::json!({})).await
}

pub async fn generate_report(
    base: &str,
    child_id: &str,
    req: &GenerateReportReq,
) -> Result<ReportDto, RestError> {
    post_json(ep::child_reports(base, child_id), req).await
}

pub async fn list_reports(base: &str, child_id: &str) -> Result<Vec<ReportDto>, RestError> {
    get_json(ep::child_reports(base, child_id)).await
}

pub async fn get_report(base: &str, report_id: &str) -> Result<ReportDto, RestError> {
    get_json(ep::report(base, report_id)).await
}

pub async fn create_category(
    base: &str,
    req: &NewUserCategoryReq,
) -> Result<UserCategoryDto, RestError> {
    post_json(ep::categories(base), req).await
}

pub async fn list_categories(base: &str) -> Result<Vec<UserCategoryDto>, RestError> {
    get_json(ep::categories(base)).await
}

pub async fn voice_parse(base: &str, req: &VoiceParseReq) -> Result<VoiceParseResp, RestError> {
    post_json(ep::voice_parse(base), req).await
}
