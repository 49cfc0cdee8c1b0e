use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn child_scoped(base: &str, child_id: &str, suffix: &str) -> String {
    let path = if suffix.is_empty() {
        format!("{}/children/{}", API_V1_PREFIX, enc(child_id))
    } else {
        format!("{}/children/{}/{}", API_V1_PREFIX, enc(child_id), suffix)
    };
    base_join(base, &path)
}

fn with_category(url: String, category_id: Option<&str>) -> String {
    match category_id {
        Some(c) => format!("{}?category_id={}", url, enc(c)),
        None => url,
    }
}

pub fn catalog_categories(base: &str) -> String {
    base_join(base, &format!("{}/catalog/categories", API_V1_PREFIX))
}
pub fn catalog_achievements(base: &str) -> String {
    base_join(base, &format!("{}/catalog/achievements", API_V1_PREFIX))
}
pub fn children(base: &str) -> String {
    base_join(base, &format!("{}/children", API_V1_PREFIX))
}
pub fn child(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "")
}
pub fn child_entries(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "entries")
}
pub fn child_milestones(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "milestones")
}
pub fn child_level(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "level")
}
pub fn child_streak(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "streak")
}
pub fn child_today(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "today")
}
pub fn child_achievements(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "achievements")
}
pub fn child_achievements_check(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "achievements/check")
}
pub fn child_stats(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "stats")
}
pub fn child_skill_progress(base: &str, child_id: &str, category_id: Option<&str>) -> String {
    with_category(child_scoped(base, child_id, "skills/progress"), category_id)
}
pub fn child_books(base: &str, child_id: &str, category_id: Option<&str>) -> String {
    with_category(child_scoped(base, child_id, "books"), category_id)
}
pub fn child_book_finish(base: &str, child_id: &str, book_id: &str) -> String {
    child_scoped(base, child_id, &format!("books/{}/finish", enc(book_id)))
}
pub fn child_reports(base: &str, child_id: &str) -> String {
    child_scoped(base, child_id, "reports")
}
pub fn report(base: &str, report_id: &str) -> String {
    base_join(
        base,
        &format!("{}/reports/{}", API_V1_PREFIX, enc(report_id)),
    )
}
pub fn entries_bulk(base: &str) -> String {
    base_join(base, &format!("{}/entries/bulk", API_V1_PREFIX))
}
pub fn categories(base: &str) -> String {
    base_join(base, &format!("{}/categories", API_V1_PREFIX))
}
pub fn voice_parse(base: &str) -> String {
    base_join(base, &format!("{}/voice/parse", API_V1_PREFIX))
}
