use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use lillearner_shared::api::{
    AchievementDto, ActiveBookDto, BulkEntriesReq, BulkEntriesResp, CategoryFilter,
    CheckAchievementsResp, ChildDto, EntryDto, EntryOutcomeDto, GenerateReportReq, MilestoneDto,
    MilestoneOutcomeDto, NewBookReq, NewChildReq, NewEntryReq, NewUserCategoryReq, ReportDto,
    StreakDto, TodayDto, ToggleMilestoneReq, UserCategoryDto, VoiceParseReq, VoiceParseResp,
};
use lillearner_shared::catalog::{AchievementDef, Category};
use lillearner_shared::domain::CustomCategoryKind;
use lillearner_shared::stats::{SkillProgress, StatsSummary};
use lillearner_shared::xp::LevelProgress;
use serde::Deserialize;

use super::progress::{
    book_dto, child_dto, entry_dto, milestone_dto, report_dto, user_category_dto,
};
use super::{AppError, AppState, calendar, record_child};
use crate::storage::UserCategoryInput;

const DEFAULT_ENTRY_LIMIT: i64 = 50;
const MAX_ENTRY_LIMIT: i64 = 500;
const DEFAULT_CATEGORY_COLOR: &str = "#5B9BD5";

pub(super) async fn catalog_categories(State(state): State<AppState>) -> Json<Vec<Category>> {
    Json(state.catalog.categories.clone())
}

pub(super) async fn catalog_achievements(
    State(state): State<AppState>,
) -> Json<Vec<AchievementDef>> {
    Json(state.catalog.achievements.clone())
}

pub(super) async fn list_children(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChildDto>>, AppError> {
    let rows = state.store.list_children().await?;
    Ok(Json(rows.into_iter().map(child_dto).collect()))
}

pub(super) async fn create_child(
    State(state): State<AppState>,
    Json(body): Json<NewChildReq>,
) -> Result<(StatusCode, Json<ChildDto>), AppError> {
    if body.birthdate > calendar::today(&state.tz) {
        return Err(AppError::bad_request("birthdate is in the future"));
    }
    let child = state.store.create_child(&body.name, body.birthdate).await?;
    record_child(&child.id);
    tracing::info!(child_id = %child.id, "child created");
    Ok((StatusCode::CREATED, Json(child_dto(child))))
}

pub(super) async fn get_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ChildDto>, AppError> {
    record_child(&id);
    Ok(Json(child_dto(state.require_child(&id).await?)))
}

pub(super) async fn delete_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    record_child(&id);
    let deleted = {
        let _guard = state.lock_child(&id).await;
        state.store.delete_child(&id).await?
    };
    if !deleted {
        return Err(AppError::not_found(format!("child not found: {}", id)));
    }
    state.forget_child(&id).await;
    tracing::info!(child_id = %id, "child deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub(super) struct EntryQuery {
    category: Option<String>,
    limit: Option<i64>,
}

pub(super) async fn list_entries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<EntryQuery>,
) -> Result<Json<Vec<EntryDto>>, AppError> {
    record_child(&id);
    state.require_child(&id).await?;
    let limit = q
        .limit
        .unwrap_or(DEFAULT_ENTRY_LIMIT)
        .clamp(1, MAX_ENTRY_LIMIT);
    let rows = state
        .store
        .list_entries(&id, q.category.as_deref(), limit)
        .await?;
    let items = rows
        .into_iter()
        .map(entry_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub(super) async fn create_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewEntryReq>,
) -> Result<(StatusCode, Json<EntryOutcomeDto>), AppError> {
    record_child(&id);
    let outcome = state.log_entry(&id, body).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub(super) async fn bulk_entries(
    State(state): State<AppState>,
    Json(body): Json<BulkEntriesReq>,
) -> Result<(StatusCode, Json<BulkEntriesResp>), AppError> {
    if body.entries.is_empty() {
        return Err(AppError::bad_request("entries must not be empty"));
    }
    let resp = state.log_bulk(body).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub(super) async fn list_milestones(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MilestoneDto>>, AppError> {
    record_child(&id);
    state.require_child(&id).await?;
    let rows = state.store.list_milestones(&id).await?;
    Ok(Json(rows.into_iter().map(milestone_dto).collect()))
}

pub(super) async fn toggle_milestone(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ToggleMilestoneReq>,
) -> Result<Json<MilestoneOutcomeDto>, AppError> {
    record_child(&id);
    Ok(Json(state.toggle_milestone(&id, body).await?))
}

pub(super) async fn child_level(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LevelProgress>, AppError> {
    record_child(&id);
    state.require_child(&id).await?;
    Ok(Json(state.level_progress(&id).await?))
}

pub(super) async fn child_streak(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StreakDto>, AppError> {
    record_child(&id);
    Ok(Json(state.streak(&id).await?))
}

pub(super) async fn child_today(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TodayDto>, AppError> {
    record_child(&id);
    Ok(Json(state.today_summary(&id).await?))
}

pub(super) async fn child_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StatsSummary>, AppError> {
    record_child(&id);
    Ok(Json(state.category_stats(&id).await?))
}

pub(super) async fn skill_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<CategoryFilter>,
) -> Result<Json<Vec<SkillProgress>>, AppError> {
    record_child(&id);
    Ok(Json(
        state.skill_progress(&id, q.category_id.as_deref()).await?,
    ))
}

pub(super) async fn list_books(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<CategoryFilter>,
) -> Result<Json<Vec<ActiveBookDto>>, AppError> {
    record_child(&id);
    state.require_child(&id).await?;
    let rows = state
        .store
        .list_books(&id, q.category_id.as_deref())
        .await?;
    let items = rows
        .into_iter()
        .map(book_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub(super) async fn add_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewBookReq>,
) -> Result<(StatusCode, Json<ActiveBookDto>), AppError> {
    record_child(&id);
    let book = state.add_book(&id, body).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

pub(super) async fn finish_book(
    State(state): State<AppState>,
    Path((id, book_id)): Path<(String, String)>,
) -> Result<Json<ActiveBookDto>, AppError> {
    record_child(&id);
    Ok(Json(state.finish_book(&id, &book_id).await?))
}

pub(super) async fn list_achievements(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AchievementDto>>, AppError> {
    record_child(&id);
    state.require_child(&id).await?;
    let rows = state.store.list_achievements(&id).await?;
    Ok(Json(
        rows.into_iter().map(|r| state.achievement_dto(r)).collect(),
    ))
}

pub(super) async fn check_achievements(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CheckAchievementsResp>, AppError> {
    record_child(&id);
    let new_achievements = state.check_achievements(&id).await?;
    Ok(Json(CheckAchievementsResp { new_achievements }))
}

pub(super) async fn list_reports(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ReportDto>>, AppError> {
    record_child(&id);
    state.require_child(&id).await?;
    let rows = state.store.list_reports(&id).await?;
    let items = rows
        .into_iter()
        .map(report_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub(super) async fn generate_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<GenerateReportReq>,
) -> Result<(StatusCode, Json<ReportDto>), AppError> {
    record_child(&id);
    let report = state.generate_report(&id, body).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

pub(super) async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReportDto>, AppError> {
    let row = state
        .store
        .get_report(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("report not found: {}", id)))?;
    record_child(&row.child_id);
    Ok(Json(report_dto(row)?))
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserCategoryDto>>, AppError> {
    let rows = state.store.list_user_categories().await?;
    let items = rows
        .into_iter()
        .map(user_category_dto)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

pub(super) async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<NewUserCategoryReq>,
) -> Result<(StatusCode, Json<UserCategoryDto>), AppError> {
    let row = state
        .store
        .create_user_category(UserCategoryInput {
            name: body.name,
            kind: body.category_type.unwrap_or(CustomCategoryKind::Lesson),
            icon: body.icon.unwrap_or_default(),
            color: body
                .color
                .unwrap_or_else(|| DEFAULT_CATEGORY_COLOR.to_string()),
            total_lessons: body.total_lessons,
        })
        .await?;
    tracing::info!(category_id = %row.id, "custom category created");
    Ok((StatusCode::CREATED, Json(user_category_dto(row)?)))
}

pub(super) async fn voice_parse(
    State(state): State<AppState>,
    Json(body): Json<VoiceParseReq>,
) -> Result<Json<VoiceParseResp>, AppError> {
    Ok(Json(state.parse_voice(body).await?))
}
