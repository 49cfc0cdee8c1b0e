//! Free-text ("voice note") logging.
//!
//! The text is sent to an LLM together with a system prompt naming the known
//! children and categories. The JSON that comes back is parsed leniently and
//! then reconciled against the known names into entry drafts that can be
//! persisted in bulk.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tinytemplate::TinyTemplate;

use crate::catalog::Catalog;
use crate::domain::EntryKind;

/// Category id used when a parsed category name matches nothing known.
pub const UNKNOWN_CATEGORY: &str = "_unknown";
/// Skill id for entries that were not logged against a catalog skill.
pub const NO_SKILL: &str = "_none";

const SYSTEM_PROMPT: &str = r##"You are a homeschool lesson log parser. The user will speak or type a quick update about their children's learning activities.

CHILDREN: {children}
CATEGORIES:
{{ for line in categories }}{line}
{{ endfor }}
RULES:
1. Extract individual log entries from the text
2. Match child names to the CHILDREN list (case-insensitive, handle nicknames)
3. Match subjects/categories to the CATEGORIES list (fuzzy match OK)
4. Extract lesson numbers when mentioned (e.g., "lesson 58", "page 42", "#58")
5. Extract any additional notes
6. If a child name is ambiguous or missing, use the first child
7. If a category is ambiguous, pick the closest match
8. Set confidence 0.0-1.0 based on how certain you are about each field

RESPONSE FORMAT (JSON only):
\{
  "entries": [
    \{
      "childName": "exact name from CHILDREN list",
      "categoryName": "exact name from CATEGORIES list",
      "lessonNumber": 58,
      "notes": "any additional context",
      "confidence": 0.95
    }
  ]
}

If the input doesn't contain any loggable activities, return: \{ "entries": [] }"##;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEntry {
    pub child_name: String,
    pub category_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParseResult {
    pub entries: Vec<ParsedEntry>,
    /// The user's input, kept for review screens.
    pub raw_text: String,
    /// The model's reply when it could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unparsed_reply: Option<String>,
}

impl VoiceParseResult {
    pub fn empty(raw_text: &str) -> Self {
        Self {
            entries: Vec::new(),
            raw_text: raw_text.to_string(),
            unparsed_reply: None,
        }
    }
}

/// A child the parser may attribute entries to.
#[derive(Debug, Clone)]
pub struct KnownChild {
    pub id: String,
    pub name: String,
}

/// A household-defined category.
#[derive(Debug, Clone)]
pub struct KnownCategory {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub total_lessons: Option<u32>,
}

/// A reconciled entry ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub child_id: String,
    pub category_id: String,
    pub skill_id: String,
    pub entry_type: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_category_id: Option<String>,
}

#[derive(Serialize)]
struct PromptCtx {
    children: String,
    categories: Vec<String>,
}

/// Custom categories are listed when there are any; otherwise the catalog
/// categories are.
pub fn build_system_prompt(
    children: &[KnownChild],
    custom: &[KnownCategory],
    catalog: &Catalog,
) -> Result<String, tinytemplate::error::Error> {
    let categories = if custom.is_empty() {
        catalog
            .categories
            .iter()
            .map(|c| format!("- \"{}\"", c.name))
            .collect()
    } else {
        custom
            .iter()
            .map(|c| {
                let total = c
                    .total_lessons
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unlimited".to_string());
                format!("- \"{}\" (type: {}, total: {})", c.name, c.kind, total)
            })
            .collect()
    };
    let ctx = PromptCtx {
        children: children
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        categories,
    };
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("system", SYSTEM_PROMPT)?;
    tt.render("system", &ctx)
}

/// Parses the model's JSON reply.
///
/// Each entry is converted on its own so one badly typed field never costs
/// the rest of the reply. A reply that is not a JSON object with an
/// `entries` array yields no entries and is kept in `unparsed_reply`.
pub fn parse_reply(raw_text: &str, reply: &str) -> VoiceParseResult {
    let unparsed = || VoiceParseResult {
        entries: Vec::new(),
        raw_text: raw_text.to_string(),
        unparsed_reply: Some(reply.to_string()),
    };
    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(reply) else {
        return unparsed();
    };
    let entries = match envelope.get("entries") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(entry_from_value).collect(),
        Some(_) => return unparsed(),
    };
    VoiceParseResult {
        entries,
        raw_text: raw_text.to_string(),
        unparsed_reply: None,
    }
}

fn entry_from_value(value: &Value) -> Option<ParsedEntry> {
    let obj = value.as_object()?;
    let text = |key: &str| match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    Some(ParsedEntry {
        child_name: text("childName"),
        category_name: text("categoryName"),
        lesson_number: obj.get("lessonNumber").and_then(lesson_from_value),
        notes: match obj.get("notes") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        },
        confidence: if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        },
    })
}

/// Accepts `58`, `58.0`, `"58"` and `"#58"`; anything else is dropped.
fn lesson_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return u32::try_from(v).ok();
            }
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= 0.0 && f <= f64::from(u32::MAX)).then_some(f as u32)
        }
        Value::String(s) => s.trim().trim_start_matches('#').trim().parse().ok(),
        _ => None,
    }
}

/// Maps parsed names onto known ids.
///
/// Children match case-insensitively by name, falling back to
/// `active_child` and then to the first known child. Categories try the
/// custom list first, then the catalog, then [`UNKNOWN_CATEGORY`]. Entries
/// are dropped only when there is no child at all to attach them to.
pub fn reconcile(
    parsed: &[ParsedEntry],
    children: &[KnownChild],
    custom: &[KnownCategory],
    catalog: &Catalog,
    active_child: Option<&str>,
) -> Vec<EntryDraft> {
    let fallback_child = active_child
        .map(str::to_string)
        .or_else(|| children.first().map(|c| c.id.clone()));

    parsed
        .iter()
        .filter_map(|p| {
            let child_name = p.child_name.trim().to_lowercase();
            let child_id = children
                .iter()
                .find(|c| c.name.to_lowercase() == child_name)
                .map(|c| c.id.clone())
                .or_else(|| fallback_child.clone())?;

            let category_name = p.category_name.trim().to_lowercase();
            let user_category = custom
                .iter()
                .find(|c| c.name.to_lowercase() == category_name);
            let category_id = user_category
                .map(|c| c.id.clone())
                .or_else(|| catalog.category_by_name(&category_name).map(|c| c.id.clone()))
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

            Some(EntryDraft {
                child_id,
                category_id,
                skill_id: NO_SKILL.to_string(),
                entry_type: EntryKind::Activity,
                notes: p.notes.clone().filter(|n| !n.trim().is_empty()),
                lesson_number: p.lesson_number,
                user_category_id: user_category.map(|c| c.id.clone()),
            })
        })
        .collect()
}
