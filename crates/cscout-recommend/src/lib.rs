//! Ranking engines over persisted competition records: weighted preference
//! scoring per user and pairwise record similarity.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cscout_core::{CompetitionRecord, Difficulty, UserProfile};
use cscout_storage::{DocumentStore, Filter, Sort, StorageError, COMPETITIONS, USERS};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub mod filters;

pub const CRATE_NAME: &str = "cscout-recommend";

const CANDIDATE_LIMIT: usize = 500;
const SIMILARITY_CANDIDATE_LIMIT: usize = 200;
const SIMILARITY_THRESHOLD: f64 = 0.3;
const DEFAULT_WINDOW_DAYS: i64 = 30;
const RECRUITMENT_KEYWORDS: [&str; 5] = ["job", "career", "internship", "hiring", "recruitment"];

/// Factor weights for the recommendation score. Hand-tuned policy values,
/// adjustable at construction rather than baked into the formula.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub category: f64,
    pub difficulty: f64,
    pub skills: f64,
    pub time_fit: f64,
    pub recruitment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            category: 30.0,
            difficulty: 25.0,
            skills: 25.0,
            time_fit: 10.0,
            recruitment: 10.0,
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.category + self.difficulty + self.skills + self.time_fit + self.recruitment
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecommendation {
    pub record: CompetitionRecord,
    pub score: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarMatch {
    pub record: CompetitionRecord,
    pub similarity: f64,
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("competition not found: {0}")]
    CompetitionNotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn category_score(record: &CompetitionRecord, user: &UserProfile, weights: &ScoringWeights) -> (f64, Option<String>) {
    if user.preferred_categories.contains(&record.category) {
        let reason = format!("Matches your interest in {}", record.category);
        (weights.category, Some(reason))
    } else if !user.preferred_categories.is_empty() {
        // Exploration credit for unmatched but stated preferences.
        (weights.category * 0.3, None)
    } else {
        // No preferences set yet, give a base score.
        (weights.category * 0.5, None)
    }
}

fn difficulty_score(record: &CompetitionRecord, user: &UserProfile, weights: &ScoringWeights) -> (f64, Option<String>) {
    let preference = user.difficulty_preference.unwrap_or(Difficulty::Intermediate);
    match (preference.ordinal(), record.difficulty.ordinal()) {
        (Some(user_idx), Some(record_idx)) => {
            match user_idx.abs_diff(record_idx) {
                0 => (
                    weights.difficulty,
                    Some(format!("Perfect difficulty match ({})", record.difficulty)),
                ),
                1 => (
                    weights.difficulty * 0.7,
                    Some(format!("Close to your level ({})", record.difficulty)),
                ),
                _ => (weights.difficulty * 0.3, None),
            }
        }
        // Mixed or otherwise unranked difficulty on either side.
        _ => (weights.difficulty * 0.5, None),
    }
}

fn skills_score(record: &CompetitionRecord, user: &UserProfile, weights: &ScoringWeights) -> (f64, Option<String>) {
    let user_skills: HashSet<&str> = user.skill_levels.keys().map(String::as_str).collect();
    let record_skills: HashSet<&str> = record.skills_required.iter().map(String::as_str).collect();

    if user_skills.is_empty() || record_skills.is_empty() {
        return (weights.skills * 0.5, None);
    }

    let mut overlap: Vec<&str> = user_skills.intersection(&record_skills).copied().collect();
    if overlap.is_empty() {
        // Learning opportunity.
        return (weights.skills * 0.2, None);
    }
    overlap.sort_unstable();
    let ratio = overlap.len() as f64 / record_skills.len() as f64;
    let named: Vec<&str> = overlap.into_iter().take(3).collect();
    (
        weights.skills * ratio,
        Some(format!("Matches your skills: {}", named.join(", "))),
    )
}

fn time_score(record: &CompetitionRecord, user: &UserProfile, weights: &ScoringWeights) -> (f64, Option<String>) {
    let estimated = f64::from(record.time_commitment.estimated_hours());
    let available = f64::from(user.time_available_weekly);
    if available >= estimated {
        (weights.time_fit, Some("Fits your schedule".to_string()))
    } else if available >= estimated * 0.7 {
        (weights.time_fit * 0.6, None)
    } else {
        (0.0, None)
    }
}

fn recruitment_score(record: &CompetitionRecord, user: &UserProfile, weights: &ScoringWeights) -> (f64, Option<String>) {
    if !record.recruitment_potential {
        return (0.0, None);
    }
    let interested = user.goals.iter().any(|goal| {
        let goal = goal.to_lowercase();
        RECRUITMENT_KEYWORDS.iter().any(|kw| goal.contains(kw))
    });
    if interested {
        (
            weights.recruitment,
            Some("Has recruitment opportunities".to_string()),
        )
    } else {
        (weights.recruitment * 0.5, None)
    }
}

/// Weighted match score for one candidate, normalized to 0..100 and rounded
/// to two decimals. Returns `None` for hard exclusions: a start date already
/// in the past, or a record the user has saved.
pub fn score_record(
    record: &CompetitionRecord,
    user: &UserProfile,
    weights: &ScoringWeights,
    now: DateTime<Utc>,
) -> Option<(f64, Vec<String>)> {
    if record.start_date.is_some_and(|start| start < now) {
        return None;
    }
    if user.saved_competitions.contains(&record.id) {
        return None;
    }

    let mut score = 0.0;
    let mut reasons = Vec::new();
    for (sub_score, reason) in [
        category_score(record, user, weights),
        difficulty_score(record, user, weights),
        skills_score(record, user, weights),
        time_score(record, user, weights),
        recruitment_score(record, user, weights),
    ] {
        score += sub_score;
        reasons.extend(reason);
    }

    // Normalization is deliberate even though defaults sum to 100; it keeps
    // scores on the same scale when the weights are retuned.
    Some((round2(score / weights.total() * 100.0), reasons))
}

/// Pairwise record similarity in 0..1. Category 0.4, difficulty 0.2,
/// platform 0.15, plus 0.25 scaled by the Jaccard index of the skill sets
/// when both are non-empty.
pub fn similarity(a: &CompetitionRecord, b: &CompetitionRecord) -> f64 {
    let mut score = 0.0;
    if a.category == b.category {
        score += 0.4;
    }
    if a.difficulty == b.difficulty {
        score += 0.2;
    }
    if a.platform == b.platform {
        score += 0.15;
    }

    let skills_a: HashSet<&str> = a.skills_required.iter().map(String::as_str).collect();
    let skills_b: HashSet<&str> = b.skills_required.iter().map(String::as_str).collect();
    if !skills_a.is_empty() && !skills_b.is_empty() {
        let overlap = skills_a.intersection(&skills_b).count() as f64;
        let union = skills_a.union(&skills_b).count() as f64;
        score += 0.25 * (overlap / union);
    }
    score
}

/// Read-only ranking facade over the document store.
pub struct RecommendationEngine {
    store: Arc<dyn DocumentStore>,
    weights: ScoringWeights,
}

impl RecommendationEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_weights(store, ScoringWeights::default())
    }

    pub fn with_weights(store: Arc<dyn DocumentStore>, weights: ScoringWeights) -> Self {
        Self { store, weights }
    }

    async fn load_candidates(&self, limit: usize) -> Result<Vec<CompetitionRecord>, StorageError> {
        let documents = self
            .store
            .find_all(
                COMPETITIONS,
                &Filter::new(),
                Some(&Sort::ascending("start_date")),
                Some(limit),
                0,
            )
            .await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value::<CompetitionRecord>(document) {
                Ok(record) => records.push(record),
                Err(err) => warn!(error = %err, "skipping undecodable stored record"),
            }
        }
        Ok(records)
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StorageError> {
        let Some(document) = self.store.find_by_id(USERS, user_id).await? else {
            return Ok(None);
        };
        match serde_json::from_value(document) {
            Ok(profile) => Ok(Some(profile)),
            Err(err) => {
                warn!(user_id, error = %err, "stored profile is undecodable, falling back");
                Ok(None)
            }
        }
    }

    /// Ranked recommendations for one user. Without a stored profile this
    /// falls back to upcoming competitions at a fixed score of 50.
    pub async fn recommend(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ScoredRecommendation>, RecommendError> {
        let Some(user) = self.load_profile(user_id).await? else {
            return Ok(self.default_recommendations(limit).await?);
        };

        let candidates = self.load_candidates(CANDIDATE_LIMIT).await?;
        let now = Utc::now();

        let mut scored: Vec<ScoredRecommendation> = candidates
            .into_iter()
            .filter_map(|record| {
                score_record(&record, &user, &self.weights, now)
                    .map(|(score, reasons)| ScoredRecommendation { record, score, reasons })
            })
            .collect();

        // Stable sort keeps candidate order for tied scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn default_recommendations(
        &self,
        limit: usize,
    ) -> Result<Vec<ScoredRecommendation>, StorageError> {
        let candidates = self.load_candidates(CANDIDATE_LIMIT).await?;
        let now = Utc::now();
        let mut upcoming = filters::upcoming(candidates, now, Duration::days(DEFAULT_WINDOW_DAYS));
        upcoming.sort_by_key(|record| record.start_date);
        upcoming.truncate(limit);
        Ok(upcoming
            .into_iter()
            .map(|record| ScoredRecommendation {
                record,
                score: 50.0,
                reasons: vec!["Popular upcoming competition".to_string()],
            })
            .collect())
    }

    /// Records similar to `competition_id`, strongest first. Matches at or
    /// below the 0.3 threshold are dropped.
    pub async fn similar(
        &self,
        competition_id: &str,
        limit: usize,
    ) -> Result<Vec<SimilarMatch>, RecommendError> {
        let reference = self
            .store
            .find_by_id(COMPETITIONS, competition_id)
            .await?
            .and_then(|document| serde_json::from_value::<CompetitionRecord>(document).ok())
            .ok_or_else(|| RecommendError::CompetitionNotFound(competition_id.to_string()))?;

        let candidates = self.load_candidates(SIMILARITY_CANDIDATE_LIMIT).await?;
        let mut matches: Vec<SimilarMatch> = candidates
            .into_iter()
            .filter(|record| record.id != reference.id)
            .filter_map(|record| {
                let similarity = similarity(&reference, &record);
                (similarity > SIMILARITY_THRESHOLD).then_some(SimilarMatch { record, similarity })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    /// Competitions starting within the next `days`, soonest first.
    pub async fn upcoming(
        &self,
        days: i64,
        limit: usize,
    ) -> Result<Vec<CompetitionRecord>, RecommendError> {
        let candidates = self.load_candidates(CANDIDATE_LIMIT).await?;
        let mut upcoming = filters::upcoming(candidates, Utc::now(), Duration::days(days));
        upcoming.sort_by_key(|record| record.start_date);
        upcoming.truncate(limit);
        Ok(upcoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cscout_core::{Category, TimeCommitment};
    use cscout_storage::MemoryStore;

    // The engine reads the real clock, so test records are laid out relative
    // to now.
    fn mk_record(id: &str, start_offset_days: i64) -> CompetitionRecord {
        let now = Utc::now();
        CompetitionRecord {
            id: id.to_string(),
            title: format!("Competition {id}"),
            description: String::new(),
            category: Category::Hackathon,
            subcategory: None,
            platform: "Test".to_string(),
            company: None,
            start_date: Some(now + Duration::days(start_offset_days)),
            end_date: None,
            registration_deadline: None,
            duration_hours: None,
            difficulty: Difficulty::Intermediate,
            time_commitment: TimeCommitment::Medium,
            skills_required: vec![],
            team_size: "team".to_string(),
            location: None,
            link: format!("https://example.org/{id}"),
            registration_link: None,
            tags: vec![],
            prize: None,
            recruitment_potential: false,
            companies_recruiting: vec![],
            portfolio_value: 50,
            source: "test".to_string(),
            last_updated: now,
            scraped_at: now,
        }
    }

    fn mk_profile() -> UserProfile {
        UserProfile {
            user_id: "u1".to_string(),
            preferred_categories: vec![],
            difficulty_preference: None,
            skill_levels: Default::default(),
            time_available_weekly: 10,
            goals: vec![],
            saved_competitions: vec![],
        }
    }

    #[test]
    fn matching_difficulty_earns_full_weight() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.difficulty_preference = Some(Difficulty::Intermediate);
        let record = mk_record("a", 10);

        let (sub, reason) = difficulty_score(&record, &user, &weights);
        assert_eq!(sub, 25.0);
        assert!(reason.unwrap().contains("Perfect difficulty match"));
    }

    #[test]
    fn adjacent_and_distant_difficulty_are_discounted() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.difficulty_preference = Some(Difficulty::Beginner);

        let mut near = mk_record("a", 10);
        near.difficulty = Difficulty::Intermediate;
        assert_eq!(difficulty_score(&near, &user, &weights).0, 25.0 * 0.7);

        let mut far = mk_record("b", 10);
        far.difficulty = Difficulty::Expert;
        assert_eq!(difficulty_score(&far, &user, &weights).0, 25.0 * 0.3);

        let mut mixed = mk_record("c", 10);
        mixed.difficulty = Difficulty::Mixed;
        assert_eq!(difficulty_score(&mixed, &user, &weights).0, 25.0 * 0.5);
    }

    #[test]
    fn empty_preferences_earn_half_category_weight() {
        let weights = ScoringWeights::default();
        let user = mk_profile();
        let record = mk_record("a", 10);
        assert_eq!(category_score(&record, &user, &weights).0, 15.0);
    }

    #[test]
    fn unmatched_category_earns_exploration_credit() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.preferred_categories = vec![Category::Kaggle];
        let record = mk_record("a", 10);
        let (sub, reason) = category_score(&record, &user, &weights);
        assert_eq!(sub, 30.0 * 0.3);
        assert!(reason.is_none());
    }

    #[test]
    fn skills_scale_with_required_overlap() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.skill_levels.insert("rust".to_string(), 4);
        user.skill_levels.insert("sql".to_string(), 2);

        let mut record = mk_record("a", 10);
        record.skills_required = vec!["rust".to_string(), "go".to_string()];
        let (sub, reason) = skills_score(&record, &user, &weights);
        assert_eq!(sub, 25.0 * 0.5);
        assert!(reason.unwrap().contains("rust"));

        record.skills_required = vec!["go".to_string()];
        assert_eq!(skills_score(&record, &user, &weights).0, 25.0 * 0.2);

        record.skills_required.clear();
        assert_eq!(skills_score(&record, &user, &weights).0, 25.0 * 0.5);
    }

    #[test]
    fn recruitment_goal_keyword_earns_full_weight() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.goals = vec!["Land an Internship".to_string()];
        let mut record = mk_record("a", 10);
        record.recruitment_potential = true;

        let (sub, reason) = recruitment_score(&record, &user, &weights);
        assert_eq!(sub, 10.0);
        assert!(reason.is_some());

        user.goals = vec!["have fun".to_string()];
        assert_eq!(recruitment_score(&record, &user, &weights).0, 5.0);

        record.recruitment_potential = false;
        assert_eq!(recruitment_score(&record, &user, &weights).0, 0.0);
    }

    #[test]
    fn time_fit_tiers() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        let mut record = mk_record("a", 10);
        record.time_commitment = TimeCommitment::High;

        user.time_available_weekly = 30;
        assert_eq!(time_score(&record, &user, &weights).0, 10.0);
        user.time_available_weekly = 21;
        assert_eq!(time_score(&record, &user, &weights).0, 6.0);
        user.time_available_weekly = 10;
        assert_eq!(time_score(&record, &user, &weights).0, 0.0);
    }

    #[test]
    fn past_and_saved_records_are_excluded() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        let past = mk_record("past", -1);
        assert!(score_record(&past, &user, &weights, Utc::now()).is_none());

        let saved = mk_record("saved", 10);
        user.saved_competitions = vec!["saved".to_string()];
        assert!(score_record(&saved, &user, &weights, Utc::now()).is_none());
    }

    #[test]
    fn perfect_match_scores_one_hundred() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.preferred_categories = vec![Category::Hackathon];
        user.difficulty_preference = Some(Difficulty::Intermediate);
        user.skill_levels.insert("rust".to_string(), 5);
        user.time_available_weekly = 40;
        user.goals = vec!["get a job".to_string()];

        let mut record = mk_record("a", 10);
        record.skills_required = vec!["rust".to_string()];
        record.recruitment_potential = true;

        let (score, reasons) = score_record(&record, &user, &weights, Utc::now()).unwrap();
        assert_eq!(score, 100.0);
        assert_eq!(reasons.len(), 5);
    }

    #[test]
    fn score_is_rounded_to_two_decimals() {
        let weights = ScoringWeights::default();
        let mut user = mk_profile();
        user.skill_levels.insert("rust".to_string(), 5);
        let mut record = mk_record("a", 10);
        record.skills_required = vec![
            "rust".to_string(),
            "go".to_string(),
            "zig".to_string(),
        ];

        // 15 category + 25 difficulty + 25/3 skills = 48.333..., rounded.
        let (score, _) = score_record(&record, &user, &weights, Utc::now()).unwrap();
        assert_eq!(score, 48.33);
    }

    // Accumulated component sums carry float error, so compare within an
    // epsilon.
    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn similarity_components_sum() {
        let a = mk_record("a", 5);
        let mut b = mk_record("b", 9);
        assert_close(similarity(&a, &b), 0.75);

        b.platform = "Other".to_string();
        b.difficulty = Difficulty::Expert;
        assert_close(similarity(&a, &b), 0.4);

        let mut c = mk_record("c", 9);
        c.skills_required = vec!["rust".to_string(), "ml".to_string()];
        let mut d = mk_record("d", 9);
        d.skills_required = vec!["rust".to_string()];
        // Jaccard 1/2 on top of full category/difficulty/platform match.
        assert_close(similarity(&c, &d), 0.75 + 0.25 * 0.5);
    }

    async fn seeded_store(records: &[CompetitionRecord]) -> Arc<dyn DocumentStore> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        for record in records {
            store
                .upsert(COMPETITIONS, &record.id, serde_json::to_value(record).unwrap())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn missing_profile_falls_back_to_upcoming() {
        let records = vec![mk_record("soon", 3), mk_record("later", 12), mk_record("distant", 90)];
        let store = seeded_store(&records).await;
        let engine = RecommendationEngine::new(store);

        let out = engine.recommend("nobody", 10).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record.id, "soon");
        assert_eq!(out[1].record.id, "later");
        assert!(out.iter().all(|r| r.score == 50.0));
        assert_eq!(out[0].reasons, vec!["Popular upcoming competition"]);
    }

    #[tokio::test]
    async fn recommend_ranks_and_caps() {
        let mut strong = mk_record("strong", 5);
        strong.category = Category::Kaggle;
        strong.recruitment_potential = true;
        let weak = mk_record("weak", 6);
        let past = mk_record("past", -3);
        let store = seeded_store(&[past, weak, strong]).await;

        let mut user = mk_profile();
        user.preferred_categories = vec![Category::Kaggle];
        user.goals = vec!["career growth".to_string()];
        store
            .upsert(USERS, &user.user_id, serde_json::to_value(&user).unwrap())
            .await
            .unwrap();

        let engine = RecommendationEngine::new(store);
        let out = engine.recommend("u1", 10).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record.id, "strong");
        assert!(out[0].score > out[1].score);

        let capped = engine.recommend("u1", 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn tied_scores_preserve_candidate_order() {
        // Identical records except id and start date; the store sorts by
        // start date, so "first" precedes "second" in the candidate list.
        let store = seeded_store(&[mk_record("second", 8), mk_record("first", 4)]).await;
        store
            .upsert(USERS, "u1", serde_json::to_value(&mk_profile()).unwrap())
            .await
            .unwrap();

        let engine = RecommendationEngine::new(store);
        let out = engine.recommend("u1", 10).await.unwrap();
        assert_eq!(out[0].score, out[1].score);
        assert_eq!(out[0].record.id, "first");
        assert_eq!(out[1].record.id, "second");
    }

    #[tokio::test]
    async fn similar_excludes_reference_and_weak_matches() {
        let reference = mk_record("ref", 5);
        let mut twin = mk_record("twin", 8);
        twin.skills_required = vec!["rust".to_string()];
        let mut unrelated = mk_record("unrelated", 8);
        unrelated.category = Category::BugBounty;
        unrelated.difficulty = Difficulty::Expert;
        unrelated.platform = "Elsewhere".to_string();

        let store = seeded_store(&[reference, twin, unrelated]).await;
        let engine = RecommendationEngine::new(store);

        let out = engine.similar("ref", 5).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].record.id, "twin");
        assert_close(out[0].similarity, 0.75);

        let err = engine.similar("missing", 5).await.unwrap_err();
        assert!(matches!(err, RecommendError::CompetitionNotFound(_)));
    }
}
