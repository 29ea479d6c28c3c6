//! Stateless filtering helpers over already-loaded competition records.

use chrono::{DateTime, Duration, Utc};
use cscout_core::{Category, CompetitionRecord, Difficulty, TimeCommitment};

/// Records starting inside `[now, now + window)`. Records without a start
/// date are dropped.
pub fn upcoming(
    records: Vec<CompetitionRecord>,
    now: DateTime<Utc>,
    window: Duration,
) -> Vec<CompetitionRecord> {
    let end = now + window;
    records
        .into_iter()
        .filter(|record| {
            record
                .start_date
                .is_some_and(|start| start >= now && start < end)
        })
        .collect()
}

pub fn by_category(records: Vec<CompetitionRecord>, category: Category) -> Vec<CompetitionRecord> {
    records
        .into_iter()
        .filter(|record| record.category == category)
        .collect()
}

pub fn by_difficulty(
    records: Vec<CompetitionRecord>,
    difficulty: Difficulty,
) -> Vec<CompetitionRecord> {
    records
        .into_iter()
        .filter(|record| record.difficulty == difficulty)
        .collect()
}

pub fn by_platform(records: Vec<CompetitionRecord>, platform: &str) -> Vec<CompetitionRecord> {
    records
        .into_iter()
        .filter(|record| record.platform.eq_ignore_ascii_case(platform))
        .collect()
}

pub fn by_time_commitment(
    records: Vec<CompetitionRecord>,
    commitment: TimeCommitment,
) -> Vec<CompetitionRecord> {
    records
        .into_iter()
        .filter(|record| record.time_commitment == commitment)
        .collect()
}

pub fn recruiting_only(records: Vec<CompetitionRecord>) -> Vec<CompetitionRecord> {
    records
        .into_iter()
        .filter(|record| record.recruitment_potential)
        .collect()
}

/// Case-insensitive substring search over title, description, platform, and
/// tags.
pub fn search(records: Vec<CompetitionRecord>, query: &str) -> Vec<CompetitionRecord> {
    let needle = query.to_lowercase();
    records
        .into_iter()
        .filter(|record| {
            record.title.to_lowercase().contains(&needle)
                || record.description.to_lowercase().contains(&needle)
                || record.platform.to_lowercase().contains(&needle)
                || record
                    .tags
                    .iter()
                    .any(|tag| tag.to_lowercase().contains(&needle))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cscout_core::TimeCommitment;

    fn test_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).single().unwrap()
    }

    fn mk_record(id: &str, title: &str, start_offset_days: i64) -> CompetitionRecord {
        CompetitionRecord {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            category: Category::Hackathon,
            subcategory: None,
            platform: "Test".to_string(),
            company: None,
            start_date: Some(test_now() + Duration::days(start_offset_days)),
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
            tags: vec!["ai".to_string()],
            prize: None,
            recruitment_potential: false,
            companies_recruiting: vec![],
            portfolio_value: 50,
            source: "test".to_string(),
            last_updated: test_now(),
            scraped_at: test_now(),
        }
    }

    #[test]
    fn upcoming_window_is_half_open() {
        let mut dateless = mk_record("dateless", "No Date", 1);
        dateless.start_date = None;
        let records = vec![
            mk_record("past", "Past", -1),
            mk_record("today", "Today", 0),
            mk_record("inside", "Inside", 6),
            mk_record("boundary", "Boundary", 7),
            dateless,
        ];

        let kept = upcoming(records, test_now(), Duration::days(7));
        let ids: Vec<&str> = kept.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["today", "inside"]);
    }

    #[test]
    fn search_covers_title_description_and_tags() {
        let mut described = mk_record("b", "Other", 1);
        described.description = "A machine learning sprint".to_string();
        described.tags.clear();
        let records = vec![
            mk_record("a", "ML Marathon", 1),
            described,
            mk_record("c", "Chess Open", 1),
        ];

        assert_eq!(search(records.clone(), "machine").len(), 1);
        assert_eq!(search(records.clone(), "marathon").len(), 1);
        assert_eq!(search(records, "AI").len(), 2);
    }

    #[test]
    fn recruiting_filter_keeps_flagged_records() {
        let mut flagged = mk_record("a", "One", 1);
        flagged.recruitment_potential = true;
        let records = vec![flagged, mk_record("b", "Two", 1)];
        let kept = recruiting_only(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }

    #[test]
    fn platform_filter_ignores_case() {
        let records = vec![mk_record("a", "One", 1)];
        assert_eq!(by_platform(records.clone(), "TEST").len(), 1);
        assert_eq!(by_platform(records, "other").len(), 0);
    }
}
