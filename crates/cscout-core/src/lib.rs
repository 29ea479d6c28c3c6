//! Core domain model for Competition Scout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "cscout-core";

/// Closed set of competition categories a source can map into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Hackathon,
    CodingContest,
    CorporateChallenge,
    Kaggle,
    Gsoc,
    BugBounty,
    Ctf,
    PitchCompetition,
    Robotics,
    Design,
    Research,
    ClimateTech,
    Internship,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Hackathon => "hackathon",
            Category::CodingContest => "coding_contest",
            Category::CorporateChallenge => "corporate_challenge",
            Category::Kaggle => "kaggle",
            Category::Gsoc => "gsoc",
            Category::BugBounty => "bug_bounty",
            Category::Ctf => "ctf",
            Category::PitchCompetition => "pitch_competition",
            Category::Robotics => "robotics",
            Category::Design => "design",
            Category::Research => "research",
            Category::ClimateTech => "climate_tech",
            Category::Internship => "internship",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Mixed,
}

impl Difficulty {
    /// Ordinal position used for preference-distance scoring. `Mixed` has no
    /// position on the ladder.
    pub fn ordinal(self) -> Option<u8> {
        match self {
            Difficulty::Beginner => Some(0),
            Difficulty::Intermediate => Some(1),
            Difficulty::Advanced => Some(2),
            Difficulty::Expert => Some(3),
            Difficulty::Mixed => None,
        }
    }
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
            Difficulty::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeCommitment {
    Low,
    Medium,
    High,
}

impl TimeCommitment {
    /// Rough weekly hour estimate behind each commitment band.
    pub fn estimated_hours(self) -> u32 {
        match self {
            TimeCommitment::Low => 5,
            TimeCommitment::Medium => 15,
            TimeCommitment::High => 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prize {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
    pub currency: String,
}

impl Prize {
    pub fn cash(value: f64) -> Self {
        Self {
            kind: "cash".to_string(),
            value,
            currency: "USD".to_string(),
        }
    }
}

/// Canonical normalized competition produced by ingestion and persisted by
/// the sync orchestrator. `id` is the sole natural key; a later write with
/// the same `id` overwrites the earlier one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub platform: String,
    #[serde(default)]
    pub company: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub registration_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    pub difficulty: Difficulty,
    pub time_commitment: TimeCommitment,
    #[serde(default)]
    pub skills_required: Vec<String>,
    pub team_size: String,
    #[serde(default)]
    pub location: Option<String>,
    pub link: String,
    #[serde(default)]
    pub registration_link: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub prize: Option<Prize>,
    #[serde(default)]
    pub recruitment_potential: bool,
    #[serde(default)]
    pub companies_recruiting: Vec<String>,
    pub portfolio_value: u8,
    pub source: String,
    pub last_updated: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}

/// Stable record id: `<platform>_<native-id>`, lowercase platform slug.
pub fn record_id(platform: &str, native_id: &str) -> String {
    format!("{}_{}", platform.to_ascii_lowercase(), native_id)
}

/// Per-source sync bookkeeping. Written on every successful sync, read only
/// by the freshness gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub id: String,
    pub last_synced_at: DateTime<Utc>,
    pub record_count: usize,
}

/// The slice of a user profile the ranking engines consume. Treated as an
/// immutable snapshot for the duration of one ranking call; mutation happens
/// in collaborators outside this workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub preferred_categories: Vec<Category>,
    #[serde(default)]
    pub difficulty_preference: Option<Difficulty>,
    #[serde(default)]
    pub skill_levels: std::collections::BTreeMap<String, u8>,
    #[serde(default = "default_weekly_hours")]
    pub time_available_weekly: u32,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub saved_competitions: Vec<String>,
}

fn default_weekly_hours() -> u32 {
    10
}
