use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use chrono::{Days, NaiveDate, Utc};
use diesel::{Connection, RunQueryDsl, SqliteConnection};
use lillearner_server::server::llm::LlmClient;
use lillearner_server::server::{self, AppConfig, AppState, LlmConfig};
use lillearner_server::storage;
use lillearner_shared::api::rest::{self, RestError};
use lillearner_shared::api::{
    BulkEntriesReq, GenerateReportReq, MAX_ENTRY_VALUE_LEN, NewBookReq, NewChildReq,
    NewEntryReq, NewUserCategoryReq, ToggleMilestoneReq, VoiceParseReq,
};
use lillearner_shared::domain::{BookStatus, CustomCategoryKind, EntryKind, ReportKind, Season};
use lillearner_shared::voice::{EntryDraft, NO_SKILL};
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;

struct TestServer {
    base: String,
    db_path: String,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        Self::spawn_with(|state| state).await
    }

    async fn spawn_with(customize: impl FnOnce(AppState) -> AppState) -> Option<Self> {
        Self::spawn_configured(AppConfig::default(), customize).await
    }

    async fn spawn_configured(
        config: AppConfig,
        customize: impl FnOnce(AppState) -> AppState,
    ) -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db").to_str().unwrap().to_string();
        let store = storage::Store::connect_sqlite(&db_path).await.unwrap();
        let state = customize(AppState::new(config, store).unwrap());
        let (addr, handle) = match serve(server::router(state)).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            db_path,
            handle,
            _tempdir: dir,
        })
    }

    async fn child(&self, name: &str) -> String {
        rest::create_child(
            &self.base,
            &NewChildReq {
                name: name.into(),
                birthdate: NaiveDate::from_ymd_opt(2019, 5, 1).unwrap(),
            },
        )
        .await
        .unwrap()
        .id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    app: axum::Router,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

fn status_of(err: RestError) -> u16 {
    match err {
        RestError::Status { status, .. } => status,
        other => panic!("expected an HTTP status error, got {other:?}"),
    }
}

fn activity(category: &str, skill: &str) -> NewEntryReq {
    NewEntryReq {
        category_id: category.into(),
        skill_id: skill.into(),
        entry_type: EntryKind::Activity,
        value: None,
        notes: None,
        media_urls: Vec::new(),
        lesson_number: None,
        user_category_id: None,
        logged_at: None,
    }
}

fn milestone(skill: &str, key: &str, completed: bool) -> ToggleMilestoneReq {
    ToggleMilestoneReq {
        skill_id: skill.into(),
        milestone_key: key.into(),
        completed,
    }
}

#[tokio::test]
async fn logging_flow_awards_xp_achievements_and_reports() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();

    let catalog = rest::catalog_categories(base).await.unwrap();
    assert_eq!(catalog.len(), 8);
    assert!(
        rest::catalog_achievements(base)
            .await
            .unwrap()
            .iter()
            .any(|a| a.key == "first_steps")
    );

    let mia = srv.child("Mia").await;
    let children = rest::list_children(base).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "Mia");

    // First entry: 10 XP and the first-entry achievement
    let first = rest::create_entry(base, &mia, &activity("literacy", "books_read"))
        .await
        .unwrap();
    assert_eq!(first.xp_awarded, 10);
    assert_eq!(first.level.total_xp, 10);
    assert_eq!(first.level.level, 1);
    assert!(!first.leveled_up);
    let unlocked: Vec<_> = first.new_achievements.iter().map(|a| a.key.as_str()).collect();
    assert_eq!(unlocked, vec!["first_steps"]);

    // Photo entry keeps its media and is worth 15 XP
    let mut photo = activity("creative_expression", "art");
    photo.entry_type = EntryKind::Photo;
    photo.media_urls = vec!["https://img.example/1.jpg".into()];
    let second = rest::create_entry(base, &mia, &photo).await.unwrap();
    assert_eq!(second.xp_awarded, 15);
    assert_eq!(second.level.total_xp, 25);
    assert!(second.new_achievements.is_empty());
    assert_eq!(second.entry.media_urls, photo.media_urls);

    // Skill logged under the wrong category
    let err = rest::create_entry(base, &mia, &activity("numeracy", "books_read"))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 400);

    let err = rest::create_entry(base, "nobody", &activity("literacy", "books_read"))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 404);

    let entries = rest::list_entries(base, &mia).await.unwrap();
    assert_eq!(entries.len(), 2);
    // newest first
    assert_eq!(entries[0].entry_type, EntryKind::Photo);

    // Milestone XP is granted on the completing transition only
    let done = rest::toggle_milestone(base, &mia, &milestone("letter_names", "uppercase", true))
        .await
        .unwrap();
    assert_eq!(done.xp_awarded, 50);
    assert_eq!(done.level.total_xp, 75);
    assert!(done.milestone.completed);
    assert!(done.milestone.completed_at.is_some());

    let again = rest::toggle_milestone(base, &mia, &milestone("letter_names", "uppercase", true))
        .await
        .unwrap();
    assert_eq!(again.xp_awarded, 0);
    assert_eq!(again.level.total_xp, 75);

    let err = rest::toggle_milestone(base, &mia, &milestone("letter_names", "cursive", true))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 400);

    let milestones = rest::list_milestones(base, &mia).await.unwrap();
    assert_eq!(milestones.len(), 1);

    let level = rest::child_level(base, &mia).await.unwrap();
    assert_eq!(level.total_xp, 75);
    assert_eq!(level.title, "Little Sprout");

    let streak = rest::child_streak(base, &mia).await.unwrap();
    assert_eq!(streak.streak_days, 1);

    let today = rest::child_today(base, &mia).await.unwrap();
    assert_eq!(today.today_count, 2);
    assert_eq!(today.total_xp, 75);
    assert_eq!(today.current_level, 1);

    let achievements = rest::list_achievements(base, &mia).await.unwrap();
    assert_eq!(achievements.len(), 1);
    assert_eq!(achievements[0].name, "First Steps");
    let check = rest::check_achievements(base, &mia).await.unwrap();
    assert!(check.new_achievements.is_empty());

    // Report over a window around today
    let day = today.today;
    let report = rest::generate_report(
        base,
        &mia,
        &GenerateReportReq {
            report_type: ReportKind::Weekly,
            period_start: day.checked_sub_days(Days::new(1)),
            period_end: day.checked_add_days(Days::new(1)),
            season: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(report.data.total_entries, 2);
    assert_eq!(report.data.xp_earned, 75);
    assert_eq!(report.data.entries_by_category["literacy"], 1);
    assert_eq!(report.data.entries_by_category["numeracy"], 0);
    assert_eq!(report.data.milestones_reached, vec!["letter_names:uppercase"]);
    assert_eq!(report.data.photo_urls, vec!["https://img.example/1.jpg"]);
    assert!(report.narrative.contains("Earned 75 XP this period."));

    let fetched = rest::get_report(base, &report.id).await.unwrap();
    assert_eq!(fetched.data, report.data);
    assert_eq!(fetched.narrative, report.narrative);
    assert_eq!(rest::list_reports(base, &mia).await.unwrap().len(), 1);

    let err = rest::generate_report(
        base,
        &mia,
        &GenerateReportReq {
            report_type: ReportKind::Seasonal,
            period_start: None,
            period_end: None,
            season: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 400);

    let seasonal = rest::generate_report(
        base,
        &mia,
        &GenerateReportReq {
            report_type: ReportKind::Seasonal,
            period_start: None,
            period_end: None,
            season: Some(Season::Winter),
        },
    )
    .await
    .unwrap();
    assert_eq!(seasonal.season, Some(Season::Winter));

    let err = rest::get_report(base, "missing").await.unwrap_err();
    assert_eq!(status_of(err), 404);
}

#[tokio::test]
async fn milestone_recompletion_grants_xp_again() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();
    let leo = srv.child("Leo").await;

    let steps = [(true, 50, 50), (false, 0, 50), (true, 50, 100)];
    for (completed, xp, total) in steps {
        let out = rest::toggle_milestone(base, &leo, &milestone("swimming", "floating", completed))
            .await
            .unwrap();
        assert_eq!(out.xp_awarded, xp);
        assert_eq!(out.level.total_xp, total);
        assert_eq!(out.milestone.completed, completed);
    }
}

#[tokio::test]
async fn children_validation_and_deletion() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();

    let future = Utc::now().date_naive().checked_add_days(Days::new(30)).unwrap();
    let err = rest::create_child(
        base,
        &NewChildReq {
            name: "Later".into(),
            birthdate: future,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 400);

    let err = rest::create_child(
        base,
        &NewChildReq {
            name: "   ".into(),
            birthdate: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 400);

    let id = srv.child("Ada").await;
    rest::create_entry(base, &id, &activity("numeracy", "counting"))
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let url = format!("{}/api/v1/children/{}", base, id);
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));

    let res = client.delete(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = client.delete(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("child not found"));

    let err = rest::child_level(base, &id).await.unwrap_err();
    assert_eq!(status_of(err), 404);
}

#[tokio::test]
async fn bulk_entries_for_several_children() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();
    let mia = srv.child("Mia").await;
    let leo = srv.child("Leo").await;

    let draft = |child: &str, kind: EntryKind| EntryDraft {
        child_id: child.to_string(),
        category_id: "literacy".into(),
        skill_id: NO_SKILL.into(),
        entry_type: kind,
        notes: Some("from the car".into()),
        lesson_number: Some(58),
        user_category_id: None,
    };
    let resp = rest::bulk_entries(
        base,
        &BulkEntriesReq {
            entries: vec![
                draft(mia.as_str(), EntryKind::Activity),
                draft(leo.as_str(), EntryKind::Activity),
                draft(leo.as_str(), EntryKind::Photo),
            ],
        },
    )
    .await
    .unwrap();
    assert_eq!(resp.entries.len(), 3);
    assert_eq!(resp.xp_awarded, 35);
    assert_eq!(resp.entries[0].lesson_number, Some(58));
    for id in [&mia, &leo] {
        let unlocked = &resp.new_achievements[id.as_str()];
        assert_eq!(unlocked[0].key, "first_steps");
    }

    assert_eq!(rest::child_level(base, &leo).await.unwrap().total_xp, 25);
    assert_eq!(rest::child_level(base, &mia).await.unwrap().total_xp, 10);
    assert_eq!(resp.levels[leo.as_str()].level.total_xp, 25);
    assert_eq!(resp.levels[mia.as_str()].level.total_xp, 10);
    assert!(!resp.levels[leo.as_str()].leveled_up);

    let err = rest::bulk_entries(base, &BulkEntriesReq { entries: vec![] })
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 400);

    let err = rest::bulk_entries(
        base,
        &BulkEntriesReq {
            entries: vec![draft("ghost", EntryKind::Activity)],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 404);
    assert_eq!(rest::list_entries(base, &mia).await.unwrap().len(), 1);
}

#[tokio::test]
async fn bulk_level_up_includes_achievement_bonus() {
    let config = AppConfig {
        achievement_bonus_xp: 25,
        ..AppConfig::default()
    };
    let Some(srv) = TestServer::spawn_configured(config, |s| s).await else {
        return;
    };
    let base = srv.base.as_str();
    let leo = srv.child("Leo").await;

    let draft = EntryDraft {
        child_id: leo.clone(),
        category_id: "literacy".into(),
        skill_id: NO_SKILL.into(),
        entry_type: EntryKind::Activity,
        notes: None,
        lesson_number: None,
        user_category_id: None,
    };
    // 39 x 10 XP stays below level 2 until the unlock bonus lands
    let resp = rest::bulk_entries(
        base,
        &BulkEntriesReq {
            entries: vec![draft; 39],
        },
    )
    .await
    .unwrap();
    let unlocked = &resp.new_achievements[leo.as_str()];
    assert!(unlocked.iter().any(|a| a.key == "first_steps"));
    let expected = 390 + 25 * unlocked.len() as u64;
    assert_eq!(resp.xp_awarded, expected);

    let outcome = &resp.levels[leo.as_str()];
    assert_eq!(outcome.level.total_xp, expected);
    assert_eq!(outcome.level.level, 2);
    assert!(outcome.leveled_up);
    assert_eq!(rest::child_level(base, &leo).await.unwrap().total_xp, expected);
}

#[tokio::test]
async fn bulk_rejects_skill_under_wrong_category() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();
    let mia = srv.child("Mia").await;

    let good = EntryDraft {
        child_id: mia.clone(),
        category_id: "literacy".into(),
        skill_id: "books_read".into(),
        entry_type: EntryKind::Activity,
        notes: None,
        lesson_number: None,
        user_category_id: None,
    };
    let misfiled = EntryDraft {
        category_id: "numeracy".into(),
        ..good.clone()
    };
    let err = rest::bulk_entries(
        base,
        &BulkEntriesReq {
            entries: vec![good, misfiled],
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 400);
    assert!(rest::list_entries(base, &mia).await.unwrap().is_empty());
    assert_eq!(rest::child_level(base, &mia).await.unwrap().total_xp, 0);
}

#[tokio::test]
async fn overlong_counter_value_is_rejected() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();
    let mia = srv.child("Mia").await;

    let mut counter = activity("nature_science", "outdoor_exploration");
    counter.entry_type = EntryKind::Counter;
    counter.value = Some("1".repeat(MAX_ENTRY_VALUE_LEN + 1));
    let err = rest::create_entry(base, &mia, &counter).await.unwrap_err();
    assert_eq!(status_of(err), 400);

    counter.value = Some("2 hours in the woods".into());
    let ok = rest::create_entry(base, &mia, &counter).await.unwrap();
    assert_eq!(ok.entry.value.as_deref(), Some("2 hours in the woods"));
}

#[tokio::test]
async fn reports_skip_entries_with_unknown_type() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();
    let mia = srv.child("Mia").await;

    let stale = rest::create_entry(base, &mia, &activity("literacy", "books_read"))
        .await
        .unwrap();
    let mut conn = SqliteConnection::establish(&srv.db_path).unwrap();
    diesel::sql_query(format!(
        "UPDATE entries SET entry_type = 'sticker' WHERE id = '{}'",
        stale.entry.id
    ))
    .execute(&mut conn)
    .unwrap();

    let mut photo = activity("creative_expression", "art");
    photo.entry_type = EntryKind::Photo;
    photo.media_urls = vec!["https://img.example/2.jpg".into()];
    let logged = rest::create_entry(base, &mia, &photo).await.unwrap();
    let today = logged.entry.logged_at.date_naive();

    let report = rest::generate_report(
        base,
        &mia,
        &GenerateReportReq {
            report_type: ReportKind::Weekly,
            period_start: today.checked_sub_days(Days::new(1)),
            period_end: today.checked_add_days(Days::new(1)),
            season: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(report.data.total_entries, 1);
    assert_eq!(report.data.entries_by_category["literacy"], 0);
    assert_eq!(report.data.entries_by_category["creative_expression"], 1);
    assert_eq!(report.data.top_category.as_deref(), Some("creative_expression"));
}

#[tokio::test]
async fn dashboard_stats_skill_progress_and_books() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();
    let mia = srv.child("Mia").await;

    let piano = rest::create_category(
        base,
        &NewUserCategoryReq {
            name: "Piano".into(),
            category_type: None,
            icon: None,
            color: None,
            total_lessons: None,
        },
    )
    .await
    .unwrap();
    rest::create_entry(base, &mia, &activity("literacy", "books_read"))
        .await
        .unwrap();
    rest::create_entry(base, &mia, &activity("literacy", "narration"))
        .await
        .unwrap();
    let mut lesson = activity("creative_expression", NO_SKILL);
    lesson.user_category_id = Some(piano.id.clone());
    rest::create_entry(base, &mia, &lesson).await.unwrap();

    let summary = rest::child_stats(base, &mia).await.unwrap();
    assert_eq!(summary.total_entries, 3);
    assert_eq!(summary.this_week_total, 3);
    assert_eq!(summary.this_month_total, 3);
    assert_eq!(summary.stats[0].category_id, "literacy");
    assert_eq!(summary.stats[0].category_name, "Literacy");
    assert_eq!(summary.stats[0].total, 2);
    assert_eq!(summary.stats[1].category_id, "piano");
    assert_eq!(summary.stats[1].category_name, "Piano");

    rest::toggle_milestone(base, &mia, &milestone("letter_names", "uppercase", true))
        .await
        .unwrap();
    let progress = rest::skill_progress(base, &mia, Some("literacy")).await.unwrap();
    let letters = progress
        .iter()
        .find(|s| s.skill_id == "letter_names")
        .unwrap();
    assert_eq!((letters.completed, letters.total), (1, 2));
    let err = rest::skill_progress(base, &mia, Some("astronomy"))
        .await
        .unwrap_err();
    assert_eq!(status_of(err), 400);

    let book = rest::add_book(
        base,
        &mia,
        &NewBookReq {
            category_id: "literacy".into(),
            title: "Frog and Toad".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(book.status, BookStatus::Reading);
    let books = rest::list_books(base, &mia, Some("literacy")).await.unwrap();
    assert_eq!(books.len(), 1);
    assert!(rest::list_books(base, &mia, Some("piano")).await.unwrap().is_empty());

    let done = rest::finish_book(base, &mia, &book.id).await.unwrap();
    assert_eq!(done.status, BookStatus::Finished);
    assert!(done.finished_at.is_some());
    let err = rest::finish_book(base, &mia, "missing").await.unwrap_err();
    assert_eq!(status_of(err), 404);

    let err = rest::add_book(
        base,
        &mia,
        &NewBookReq {
            category_id: "literacy".into(),
            title: "  ".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 400);
    let err = rest::child_stats(base, "ghost").await.unwrap_err();
    assert_eq!(status_of(err), 404);
}

#[tokio::test]
async fn custom_categories_use_slug_ids() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let base = srv.base.as_str();

    let req = NewUserCategoryReq {
        name: "Piano Lessons".into(),
        category_type: None,
        icon: Some("🎹".into()),
        color: None,
        total_lessons: Some(120),
    };
    let created = rest::create_category(base, &req).await.unwrap();
    assert_eq!(created.id, "piano-lessons");
    assert_eq!(created.category_type, CustomCategoryKind::Lesson);
    assert_eq!(created.color, "#5B9BD5");
    assert_eq!(created.total_lessons, Some(120));
    assert_eq!(created.sort_order, 0);

    let err = rest::create_category(base, &req).await.unwrap_err();
    assert_eq!(status_of(err), 409);

    let journal = rest::create_category(
        base,
        &NewUserCategoryReq {
            name: "Nature Journal".into(),
            category_type: Some(CustomCategoryKind::Journal),
            icon: None,
            color: Some("#00AA00".into()),
            total_lessons: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(journal.sort_order, 1);

    let listed = rest::list_categories(base).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["piano-lessons", "nature-journal"]);
}

const LLM_KEY: &str = "test-key";

/// Serves a canned chat-completions reply and checks the request shape.
async fn mock_llm(content: &'static str) -> Option<(String, tokio::task::JoinHandle<()>)> {
    let app = axum::Router::new().route(
        "/v1/chat/completions",
        post(move |headers: HeaderMap, Json(body): Json<Value>| async move {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer test-key");
            if !authorized {
                return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
            }
            if body["response_format"]["type"] != "json_object"
                || body["messages"][0]["role"] != "system"
            {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
            }
            (
                StatusCode::OK,
                Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": content}}],
                    "usage": {"prompt_tokens": 120, "completion_tokens": 30}
                })),
            )
        }),
    );
    match serve(app).await {
        Ok((addr, handle)) => Some((format!("http://{}/v1", addr), handle)),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => None,
        Err(e) => panic!("failed to start mock llm: {e}"),
    }
}

fn llm_client(base_url: String) -> LlmClient {
    let cfg = LlmConfig {
        base_url,
        model: "test-model".into(),
        api_key_env: "UNUSED_LLM_KEY".into(),
        temperature: 0.1,
        timeout_secs: 5,
    };
    LlmClient::new(&cfg, LLM_KEY.into()).unwrap()
}

#[tokio::test]
async fn voice_note_becomes_entry_drafts() {
    let reply = r#"{"entries":[
        {"childName":"leo","categoryName":"Literacy","lessonNumber":58,"notes":"read aloud","confidence":0.9},
        {"childName":"Someone","categoryName":"Basket weaving","confidence":0.4}
    ]}"#;
    let Some((llm_url, llm_handle)) = mock_llm(reply).await else {
        return;
    };
    let Some(srv) = TestServer::spawn_with(|s| s.with_llm_client(llm_client(llm_url))).await
    else {
        return;
    };
    let base = srv.base.as_str();
    let _mia = srv.child("Mia").await;
    let leo = srv.child("Leo").await;

    let resp = rest::voice_parse(
        base,
        &VoiceParseReq {
            text: "Leo did reading lesson 58 and some basket weaving".into(),
            active_child_id: Some(leo.clone()),
        },
    )
    .await
    .unwrap();
    assert_eq!(resp.result.entries.len(), 2);
    assert_eq!(resp.drafts.len(), 2);
    assert_eq!(resp.drafts[0].child_id, leo);
    assert_eq!(resp.drafts[0].category_id, "literacy");
    assert_eq!(resp.drafts[0].lesson_number, Some(58));
    assert_eq!(resp.drafts[1].child_id, leo);
    assert_eq!(resp.drafts[1].category_id, "_unknown");

    // Drafts can be stored as they are
    let stored = rest::bulk_entries(
        base,
        &BulkEntriesReq {
            entries: resp.drafts,
        },
    )
    .await
    .unwrap();
    assert_eq!(stored.xp_awarded, 20);

    let blank = rest::voice_parse(
        base,
        &VoiceParseReq {
            text: "   ".into(),
            active_child_id: None,
        },
    )
    .await
    .unwrap();
    assert!(blank.result.entries.is_empty());
    assert!(blank.drafts.is_empty());

    let err = rest::voice_parse(
        base,
        &VoiceParseReq {
            text: "Mia painted".into(),
            active_child_id: Some("ghost".into()),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 404);

    llm_handle.abort();
}

#[tokio::test]
async fn malformed_model_reply_is_kept_for_review() {
    let Some((llm_url, llm_handle)) = mock_llm("Sure! Leo read a book.").await else {
        return;
    };
    let Some(srv) = TestServer::spawn_with(|s| s.with_llm_client(llm_client(llm_url))).await
    else {
        return;
    };
    let base = srv.base.as_str();
    srv.child("Leo").await;

    let resp = rest::voice_parse(
        base,
        &VoiceParseReq {
            text: "Leo read a book".into(),
            active_child_id: None,
        },
    )
    .await
    .unwrap();
    assert!(resp.result.entries.is_empty());
    assert!(resp.drafts.is_empty());
    assert_eq!(
        resp.result.unparsed_reply.as_deref(),
        Some("Sure! Leo read a book.")
    );
    llm_handle.abort();
}

#[tokio::test]
async fn voice_parsing_without_llm_is_unavailable() {
    let Some(srv) = TestServer::spawn().await else {
        return;
    };
    let err = rest::voice_parse(
        &srv.base,
        &VoiceParseReq {
            text: "Mia painted a tree".into(),
            active_child_id: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(status_of(err), 503);
}

#[tokio::test]
async fn rejected_llm_request_maps_to_bad_gateway() {
    let Some((llm_url, llm_handle)) = mock_llm("{}").await else {
        return;
    };
    let cfg = LlmConfig {
        base_url: llm_url,
        model: "test-model".into(),
        api_key_env: "UNUSED_LLM_KEY".into(),
        temperature: 0.1,
        timeout_secs: 5,
    };
    let wrong_key = LlmClient::new(&cfg, "wrong".into()).unwrap();
    let Some(srv) = TestServer::spawn_with(|s| s.with_llm_client(wrong_key)).await else {
        return;
    };
    let err = rest::voice_parse(
        &srv.base,
        &VoiceParseReq {
            text: "Mia painted a tree".into(),
            active_child_id: None,
        },
    )
    .await
    .unwrap_err();
    match err {
        RestError::Status { status, body } => {
            assert_eq!(status, 502);
            // upstream details stay in the server log
            assert!(!body.contains("bad key"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    llm_handle.abort();
}
