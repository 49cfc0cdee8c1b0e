//! Static configuration: developmental categories, their skills and the
//! achievement catalog.
//!
//! The catalog is loaded once (either the bundled one or an override from the
//! server config) and then passed by reference into the engines.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::Season;

const BUILTIN_CATALOG: &str = include_str!("../catalog.yaml");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("duplicate {kind} id: {id}")]
    Duplicate { kind: &'static str, id: String },
    #[error("empty {0} id")]
    EmptyId(&'static str),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub categories: Vec<Category>,
    #[serde(default)]
    pub achievements: Vec<AchievementDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub tracking: TrackingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
    /// Milestone keys for mastery/progress skills and item keys for checklists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub milestones: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingKind {
    Mastery,
    Progress,
    Numeric,
    Count,
    Cumulative,
    Checklist,
    ActivityLog,
    ObservationLog,
    TopicLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDef {
    pub key: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub group: AchievementGroup,
    pub criteria: Criteria,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementGroup {
    Category,
    Streak,
    Milestone,
    Seasonal,
}

/// Unlock condition of an achievement. Each variant carries only the fields
/// it is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Criteria {
    EntryCount {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skill_id: Option<String>,
        target: u32,
    },
    MilestoneCount {
        target: u32,
    },
    StreakDays {
        target: u32,
    },
    CumulativeValue {
        skill_id: String,
        target: f64,
    },
    ChecklistComplete {
        category_id: String,
        #[serde(default = "default_checklist_target")]
        target: u32,
    },
    SeasonalEntries {
        season: Season,
        target: u32,
    },
}

fn default_checklist_target() -> u32 {
    1
}

impl Catalog {
    /// The catalog bundled with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Rejects empty and duplicate category and achievement ids. Skill ids
    /// must be unique across the whole catalog since entries and milestones
    /// reference them without their category.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut categories = HashSet::new();
        let mut skills = HashSet::new();
        for c in &self.categories {
            if c.id.is_empty() {
                return Err(CatalogError::EmptyId("category"));
            }
            if !categories.insert(c.id.as_str()) {
                return Err(CatalogError::Duplicate {
                    kind: "category",
                    id: c.id.clone(),
                });
            }
            for s in &c.skills {
                if s.id.is_empty() {
                    return Err(CatalogError::EmptyId("skill"));
                }
                if !skills.insert(s.id.as_str()) {
                    return Err(CatalogError::Duplicate {
                        kind: "skill",
                        id: s.id.clone(),
                    });
                }
            }
        }
        let mut keys = HashSet::new();
        for a in &self.achievements {
            if a.key.is_empty() {
                return Err(CatalogError::EmptyId("achievement"));
            }
            if !keys.insert(a.key.as_str()) {
                return Err(CatalogError::Duplicate {
                    kind: "achievement",
                    id: a.key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Case-insensitive lookup by display name.
    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        let needle = name.trim().to_lowercase();
        self.categories
            .iter()
            .find(|c| c.name.to_lowercase() == needle)
    }

    pub fn skill(&self, skill_id: &str) -> Option<(&Category, &Skill)> {
        self.categories.iter().find_map(|c| {
            c.skills
                .iter()
                .find(|s| s.id == skill_id)
                .map(|s| (c, s))
        })
    }

    pub fn achievement(&self, key: &str) -> Option<&AchievementDef> {
        self.achievements.iter().find(|a| a.key == key)
    }

    /// Display name of a category id, falling back to the id itself.
    pub fn category_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.category(id).map(|c| c.name.as_str()).unwrap_or(id)
    }
}
