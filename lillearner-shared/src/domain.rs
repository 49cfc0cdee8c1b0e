use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Activity,
    Photo,
    Note,
    Milestone,
    Counter,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Activity => "activity",
            EntryKind::Photo => "photo",
            EntryKind::Note => "note",
            EntryKind::Milestone => "milestone",
            EntryKind::Counter => "counter",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activity" => Ok(EntryKind::Activity),
            "photo" => Ok(EntryKind::Photo),
            "note" => Ok(EntryKind::Note),
            "milestone" => Ok(EntryKind::Milestone),
            "counter" => Ok(EntryKind::Counter),
            other => Err(UnknownVariant::new("entry type", other)),
        }
    }
}

/// Lifecycle of a book a child is working through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Reading,
    Finished,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Reading => "reading",
            BookStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reading" => Ok(BookStatus::Reading),
            "finished" => Ok(BookStatus::Finished),
            other => Err(UnknownVariant::new("book status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
            Season::Winter => "winter",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
            Season::Winter => "Winter",
        }
    }

    /// Inclusive calendar window of the season that starts in `year`.
    ///
    /// Winter starts on December 1st and runs to February 28th of the
    /// following year; February 29th is outside the window in leap years.
    /// Returns `None` only for years chrono cannot represent.
    pub fn window(&self, year: i32) -> Option<(NaiveDate, NaiveDate)> {
        let ymd = NaiveDate::from_ymd_opt;
        match self {
            Season::Spring => Some((ymd(year, 3, 1)?, ymd(year, 5, 31)?)),
            Season::Summer => Some((ymd(year, 6, 1)?, ymd(year, 8, 31)?)),
            Season::Fall => Some((ymd(year, 9, 1)?, ymd(year, 11, 30)?)),
            Season::Winter => Some((ymd(year, 12, 1)?, ymd(year.checked_add(1)?, 2, 28)?)),
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "fall" => Ok(Season::Fall),
            "winter" => Ok(Season::Winter),
            other => Err(UnknownVariant::new("season", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Weekly,
    Monthly,
    Seasonal,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Weekly => "weekly",
            ReportKind::Monthly => "monthly",
            ReportKind::Seasonal => "seasonal",
        }
    }
}

impl FromStr for ReportKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(ReportKind::Weekly),
            "monthly" => Ok(ReportKind::Monthly),
            "seasonal" => Ok(ReportKind::Seasonal),
            other => Err(UnknownVariant::new("report type", other)),
        }
    }
}

/// What an XP ledger row was granted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XpSource {
    Entry,
    Milestone,
    Achievement,
}

impl XpSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            XpSource::Entry => "entry",
            XpSource::Milestone => "milestone",
            XpSource::Achievement => "achievement",
        }
    }
}

impl FromStr for XpSource {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(XpSource::Entry),
            "milestone" => Ok(XpSource::Milestone),
            "achievement" => Ok(XpSource::Achievement),
            other => Err(UnknownVariant::new("xp source", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomCategoryKind {
    Lesson,
    Journal,
    Book,
}

impl CustomCategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomCategoryKind::Lesson => "lesson",
            CustomCategoryKind::Journal => "journal",
            CustomCategoryKind::Book => "book",
        }
    }
}

impl FromStr for CustomCategoryKind {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lesson" => Ok(CustomCategoryKind::Lesson),
            "journal" => Ok(CustomCategoryKind::Journal),
            "book" => Ok(CustomCategoryKind::Book),
            other => Err(UnknownVariant::new("category type", other)),
        }
    }
}
