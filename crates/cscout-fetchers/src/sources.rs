//! Built-in source adapters: Codeforces, Kaggle (JSON APIs), Hackalist and
//! HackerRank (HTML listings).

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use cscout_core::{record_id, Category, CompetitionRecord, Difficulty, Prize, TimeCommitment};
use cscout_storage::HttpClient;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::warn;

use crate::{FetchError, ParseError, RawPayload, SourceFetcher};

fn slug(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn selector(sel: &str) -> Result<Selector, ParseError> {
    Selector::parse(sel).map_err(|err| ParseError::Payload(format!("bad selector {sel}: {err}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(card: ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Fixed-time Kaggle API timestamps, e.g. `2026-11-30T23:59:00.000Z`.
fn parse_api_timestamp(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// First standalone 4-digit run in a human date string.
fn find_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    for i in 0..bytes.len().saturating_sub(3) {
        let run = &bytes[i..i + 4];
        let boundary_before = i == 0 || !bytes[i - 1].is_ascii_digit();
        let boundary_after = i + 4 == bytes.len() || !bytes[i + 4].is_ascii_digit();
        if boundary_before && boundary_after && run.iter().all(u8::is_ascii_digit) {
            return text[i..i + 4].parse().ok();
        }
    }
    None
}

fn month_day_to_date(month: &str, day: &str, year: i32) -> Option<DateTime<Utc>> {
    // Truncate on char boundaries; scraped text is not guaranteed ASCII.
    let month: String = month.chars().take(3).collect();
    let composed = format!("{month} {day} {year}");
    NaiveDate::parse_from_str(&composed, "%b %d %Y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Human date ranges like `Jan 5 - 7, 2026` or `Jan 30 - Feb 1, 2026`.
fn parse_date_range(
    text: &str,
    default_year: i32,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let year = find_year(text).unwrap_or(default_year);
    let without_year = text.split(',').next().unwrap_or(text);
    let mut halves = without_year.splitn(2, '-').map(str::trim);

    let start_tokens: Vec<&str> = halves
        .next()
        .map(|part| part.split_whitespace().collect())
        .unwrap_or_default();
    let start = match start_tokens.as_slice() {
        [month, day] => month_day_to_date(month, day, year),
        _ => None,
    };

    let end_tokens: Vec<&str> = halves
        .next()
        .map(|part| part.split_whitespace().collect())
        .unwrap_or_default();
    let end = match end_tokens.as_slice() {
        [month, day] => month_day_to_date(month, day, year),
        // Day only, same month as the start.
        [day] if start_tokens.len() == 2 => month_day_to_date(start_tokens[0], day, year),
        _ => None,
    };

    (start, end)
}

/// Coding contests from the Codeforces contest list API.
#[derive(Debug, Clone)]
pub struct CodeforcesFetcher {
    base_url: String,
}

impl CodeforcesFetcher {
    pub fn new() -> Self {
        Self {
            base_url: "https://codeforces.com/api".to_string(),
        }
    }

    fn parse_contest(&self, contest: &Value, now: DateTime<Utc>) -> Option<CompetitionRecord> {
        // Only regular upcoming rounds.
        if contest.get("type").and_then(Value::as_str) != Some("CF")
            || contest.get("phase").and_then(Value::as_str) != Some("BEFORE")
        {
            return None;
        }

        let native_id = contest.get("id").and_then(Value::as_i64)?;
        let start_seconds = contest.get("startTimeSeconds").and_then(Value::as_i64)?;
        let start_date = DateTime::from_timestamp(start_seconds, 0)?;
        if start_date < now {
            return None;
        }

        let title = contest
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Codeforces Contest")
            .to_string();
        let difficulty = if title.contains("Div. 1") {
            Difficulty::Advanced
        } else if title.contains("Div. 2") {
            Difficulty::Intermediate
        } else if title.contains("Div. 3") || title.contains("Div. 4") {
            Difficulty::Beginner
        } else {
            Difficulty::Intermediate
        };

        let duration_seconds = contest
            .get("durationSeconds")
            .and_then(Value::as_i64)
            .unwrap_or(7200);
        let duration_hours = duration_seconds as f64 / 3600.0;
        let link = format!("https://codeforces.com/contests/{native_id}");

        Some(CompetitionRecord {
            id: record_id("codeforces", &native_id.to_string()),
            title,
            description: "Codeforces CF Contest".to_string(),
            category: Category::CodingContest,
            subcategory: None,
            platform: "Codeforces".to_string(),
            company: None,
            start_date: Some(start_date),
            end_date: DateTime::from_timestamp(start_seconds + duration_seconds, 0),
            registration_deadline: None,
            duration_hours: Some(duration_hours),
            difficulty,
            time_commitment: if duration_hours <= 5.0 {
                TimeCommitment::Medium
            } else {
                TimeCommitment::High
            },
            skills_required: vec![
                "Algorithms".to_string(),
                "Data Structures".to_string(),
                "Problem Solving".to_string(),
            ],
            team_size: "solo".to_string(),
            location: None,
            link: link.clone(),
            registration_link: Some(link),
            tags: vec![
                "competitive programming".to_string(),
                "algorithms".to_string(),
            ],
            prize: None,
            recruitment_potential: true,
            companies_recruiting: vec!["Top Tech Companies".to_string()],
            portfolio_value: 50,
            source: "Codeforces API".to_string(),
            last_updated: now,
            scraped_at: now,
        })
    }

    fn parse_at(&self, raw: &RawPayload, now: DateTime<Utc>) -> Result<Vec<CompetitionRecord>, ParseError> {
        let RawPayload::Json(value) = raw else {
            return Err(ParseError::Payload("expected JSON payload".to_string()));
        };
        let contests = value
            .get("result")
            .and_then(Value::as_array)
            .ok_or_else(|| ParseError::Payload("missing result array".to_string()))?;
        Ok(contests
            .iter()
            .filter_map(|contest| self.parse_contest(contest, now))
            .collect())
    }
}

impl Default for CodeforcesFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for CodeforcesFetcher {
    fn name(&self) -> &'static str {
        "codeforces"
    }

    async fn fetch(&self, http: &HttpClient) -> Result<RawPayload, FetchError> {
        let value = http
            .get_json(self.name(), &format!("{}/contest.list", self.base_url))
            .await?;
        Ok(RawPayload::Json(value))
    }

    fn parse(&self, raw: &RawPayload) -> Result<Vec<CompetitionRecord>, ParseError> {
        self.parse_at(raw, Utc::now())
    }
}

/// Data science competitions from the public Kaggle competitions API.
#[derive(Debug, Clone)]
pub struct KaggleFetcher {
    base_url: String,
}

impl KaggleFetcher {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.kaggle.com/api/v1/competitions".to_string(),
        }
    }

    fn parse_competition(&self, comp: &Value, now: DateTime<Utc>) -> Option<CompetitionRecord> {
        let status = comp.get("status").and_then(Value::as_str)?;
        if status != "active" && status != "completed" {
            return None;
        }

        let deadline = comp.get("deadline").and_then(Value::as_str)?;
        let enabled = comp.get("enabledDate").and_then(Value::as_str)?;
        let end_date = parse_api_timestamp(deadline)?;
        let start_date = parse_api_timestamp(enabled)?;
        if end_date < now {
            return None;
        }

        let native_id = comp.get("id").and_then(Value::as_i64)?;
        let title = comp
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Kaggle Competition")
            .to_string();
        let reward = comp.get("reward").and_then(Value::as_f64).unwrap_or(0.0);
        let difficulty = if reward >= 10_000.0 {
            Difficulty::Expert
        } else if reward >= 5_000.0 {
            Difficulty::Advanced
        } else if reward >= 1_000.0 {
            Difficulty::Intermediate
        } else {
            Difficulty::Beginner
        };

        let title_lower = title.to_ascii_lowercase();
        let mut tags = vec![
            "data science".to_string(),
            "machine learning".to_string(),
            "kaggle".to_string(),
        ];
        if title_lower.contains("nlp") || title_lower.contains("natural language") {
            tags.push("nlp".to_string());
        }
        if title_lower.contains("computer vision") || title_lower.contains("image") {
            tags.push("computer vision".to_string());
        }
        if title_lower.contains("tabular") || title_lower.contains("structured") {
            tags.push("tabular data".to_string());
        }

        let url_segment = comp.get("url").and_then(Value::as_str).unwrap_or_default();
        let team = comp.get("teamCount").and_then(Value::as_i64).unwrap_or(1) > 1;

        Some(CompetitionRecord {
            id: record_id("kaggle", &native_id.to_string()),
            title,
            description: comp
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            category: Category::Kaggle,
            subcategory: None,
            platform: "Kaggle".to_string(),
            company: comp
                .get("organizationName")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            start_date: Some(start_date),
            end_date: Some(end_date),
            registration_deadline: Some(end_date - Duration::days(7)),
            duration_hours: Some((end_date - start_date).num_seconds() as f64 / 3600.0),
            difficulty,
            time_commitment: TimeCommitment::High,
            skills_required: vec![
                "Data Science".to_string(),
                "Machine Learning".to_string(),
                "Python".to_string(),
                "Data Analysis".to_string(),
            ],
            team_size: if team { "team" } else { "solo" }.to_string(),
            location: None,
            link: format!("https://kaggle.com/c/{url_segment}"),
            registration_link: None,
            tags,
            prize: (reward > 0.0).then(|| Prize::cash(reward)),
            recruitment_potential: true,
            companies_recruiting: vec!["Top Tech Companies".to_string()],
            portfolio_value: 80,
            source: "Kaggle API".to_string(),
            last_updated: now,
            scraped_at: now,
        })
    }

    fn parse_at(&self, raw: &RawPayload, now: DateTime<Utc>) -> Result<Vec<CompetitionRecord>, ParseError> {
        let RawPayload::Json(value) = raw else {
            return Err(ParseError::Payload("expected JSON payload".to_string()));
        };
        let competitions = value
            .as_array()
            .ok_or_else(|| ParseError::Payload("expected top-level array".to_string()))?;
        Ok(competitions
            .iter()
            .filter_map(|comp| self.parse_competition(comp, now))
            .collect())
    }
}

impl Default for KaggleFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for KaggleFetcher {
    fn name(&self) -> &'static str {
        "kaggle"
    }

    async fn fetch(&self, http: &HttpClient) -> Result<RawPayload, FetchError> {
        let value = http
            .get_json(self.name(), &format!("{}/list?sortBy=latestDeadline", self.base_url))
            .await?;
        Ok(RawPayload::Json(value))
    }

    fn parse(&self, raw: &RawPayload) -> Result<Vec<CompetitionRecord>, ParseError> {
        self.parse_at(raw, Utc::now())
    }
}

/// Hackathons scraped from the Hackalist listing page.
#[derive(Debug, Clone)]
pub struct HackalistFetcher {
    base_url: String,
}

impl HackalistFetcher {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.hackalist.org".to_string(),
        }
    }

    fn parse_card(
        &self,
        card: ElementRef<'_>,
        selectors: &HackalistSelectors,
        now: DateTime<Utc>,
    ) -> Option<CompetitionRecord> {
        let title = first_text(card, &selectors.title)?;

        let mut link = card.value().attr("href").unwrap_or_default().to_string();
        if !link.is_empty() && !link.starts_with("http") {
            link = format!("{}{link}", self.base_url);
        }

        let date_text = first_text(card, &selectors.date).unwrap_or_default();
        let (start_date, end_date) = parse_date_range(&date_text, now.year());
        let year = find_year(&date_text).unwrap_or_else(|| now.year());

        let description = first_text(card, &selectors.description)
            .unwrap_or_else(|| format!("Hackathon: {title}"));
        let location = first_text(card, &selectors.location);

        let prize = first_text(card, &selectors.prize).and_then(|text| {
            let digits: String = text.chars().filter(char::is_ascii_digit).collect();
            let value: f64 = digits.parse().ok()?;
            (value > 0.0).then(|| Prize::cash(value))
        });

        Some(CompetitionRecord {
            id: record_id("hackalist", &format!("{}_{year}", slug(&title))),
            title,
            description,
            category: Category::Hackathon,
            subcategory: None,
            platform: "Hackalist".to_string(),
            company: None,
            start_date,
            end_date,
            registration_deadline: None,
            duration_hours: None,
            difficulty: Difficulty::Intermediate,
            time_commitment: TimeCommitment::High,
            skills_required: vec![
                "Software Development".to_string(),
                "Problem Solving".to_string(),
                "Teamwork".to_string(),
            ],
            team_size: "team".to_string(),
            location,
            link,
            registration_link: None,
            tags: vec!["hackathon".to_string(), "innovation".to_string()],
            prize,
            recruitment_potential: true,
            companies_recruiting: vec![],
            portfolio_value: 70,
            source: "Hackalist Web Scraping".to_string(),
            last_updated: now,
            scraped_at: now,
        })
    }

    fn parse_at(&self, raw: &RawPayload, now: DateTime<Utc>) -> Result<Vec<CompetitionRecord>, ParseError> {
        let RawPayload::Html(pages) = raw else {
            return Err(ParseError::Payload("expected HTML payload".to_string()));
        };
        let selectors = HackalistSelectors::new()?;
        let mut records = Vec::new();
        for page in pages {
            let document = Html::parse_document(page);
            for card in document.select(&selectors.card) {
                match self.parse_card(card, &selectors, now) {
                    Some(record) => records.push(record),
                    None => warn!(source = self.name(), "skipping card without a title"),
                }
            }
        }
        Ok(records)
    }
}

impl Default for HackalistFetcher {
    fn default() -> Self {
        Self::new()
    }
}

struct HackalistSelectors {
    card: Selector,
    title: Selector,
    date: Selector,
    location: Selector,
    description: Selector,
    prize: Selector,
}

impl HackalistSelectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            card: selector(".hackathon-tile")?,
            title: selector(".hackathon-title")?,
            date: selector(".hackathon-date")?,
            location: selector(".hackathon-location")?,
            description: selector(".hackathon-description")?,
            prize: selector(".hackathon-prize")?,
        })
    }
}

#[async_trait]
impl SourceFetcher for HackalistFetcher {
    fn name(&self) -> &'static str {
        "hackalist"
    }

    async fn fetch(&self, http: &HttpClient) -> Result<RawPayload, FetchError> {
        let page = http.get_text(self.name(), &format!("{}/", self.base_url)).await?;
        Ok(RawPayload::Html(vec![page]))
    }

    fn parse(&self, raw: &RawPayload) -> Result<Vec<CompetitionRecord>, ParseError> {
        self.parse_at(raw, Utc::now())
    }
}

/// Contests scraped from the HackerRank contests page.
#[derive(Debug, Clone)]
pub struct HackerRankFetcher {
    base_url: String,
}

impl HackerRankFetcher {
    pub fn new() -> Self {
        Self {
            base_url: "https://www.hackerrank.com".to_string(),
        }
    }

    fn parse_meta_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let year = find_year(text).unwrap_or_else(|| now.year());
        let tokens: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .collect();
        tokens
            .windows(2)
            .find_map(|pair| month_day_to_date(pair[0], pair[1], year))
    }

    fn parse_card(
        &self,
        card: ElementRef<'_>,
        selectors: &HackerRankSelectors,
        now: DateTime<Utc>,
    ) -> Option<CompetitionRecord> {
        let name_element = card.select(&selectors.name).next()?;
        let title = element_text(name_element);
        if title.is_empty() {
            return None;
        }

        let link = name_element
            .value()
            .attr("href")
            .map(|href| format!("{}{href}", self.base_url))
            .unwrap_or_default();

        let mut start_date = None;
        let mut end_date = None;
        for meta in card.select(&selectors.meta) {
            let text = element_text(meta);
            let lower = text.to_ascii_lowercase();
            if lower.contains("starts") {
                start_date = Self::parse_meta_date(&text, now);
            } else if lower.contains("ends") {
                end_date = Self::parse_meta_date(&text, now);
            }
        }
        // Listing pages omit exact dates for some live contests.
        let start_date = start_date.or(Some(now + Duration::days(1)));
        let end_date = end_date.or(Some(now + Duration::days(7)));

        Some(CompetitionRecord {
            id: record_id("hackerrank", &slug(&title)),
            title,
            description: "HackerRank contest".to_string(),
            category: Category::CorporateChallenge,
            subcategory: None,
            platform: "HackerRank".to_string(),
            company: None,
            start_date,
            end_date,
            registration_deadline: None,
            duration_hours: None,
            difficulty: Difficulty::Intermediate,
            time_commitment: TimeCommitment::Medium,
            skills_required: vec![
                "Algorithms".to_string(),
                "Problem Solving".to_string(),
            ],
            team_size: "solo".to_string(),
            location: None,
            link,
            registration_link: None,
            tags: vec!["coding contest".to_string(), "hackerrank".to_string()],
            prize: None,
            recruitment_potential: true,
            companies_recruiting: vec![],
            portfolio_value: 55,
            source: "HackerRank Web Scraping".to_string(),
            last_updated: now,
            scraped_at: now,
        })
    }

    fn parse_at(&self, raw: &RawPayload, now: DateTime<Utc>) -> Result<Vec<CompetitionRecord>, ParseError> {
        let RawPayload::Html(pages) = raw else {
            return Err(ParseError::Payload("expected HTML payload".to_string()));
        };
        let selectors = HackerRankSelectors::new()?;
        let mut records = Vec::new();
        for page in pages {
            let document = Html::parse_document(page);
            for card in document.select(&selectors.card) {
                if let Some(record) = self.parse_card(card, &selectors, now) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }
}

impl Default for HackerRankFetcher {
    fn default() -> Self {
        Self::new()
    }
}

struct HackerRankSelectors {
    card: Selector,
    name: Selector,
    meta: Selector,
}

impl HackerRankSelectors {
    fn new() -> Result<Self, ParseError> {
        Ok(Self {
            card: selector(".contest-card")?,
            name: selector(".contest-name")?,
            meta: selector(".contest-meta")?,
        })
    }
}

#[async_trait]
impl SourceFetcher for HackerRankFetcher {
    fn name(&self) -> &'static str {
        "hackerrank"
    }

    async fn fetch(&self, http: &HttpClient) -> Result<RawPayload, FetchError> {
        let page = http
            .get_text(self.name(), &format!("{}/contests", self.base_url))
            .await?;
        Ok(RawPayload::Html(vec![page]))
    }

    fn parse(&self, raw: &RawPayload) -> Result<Vec<CompetitionRecord>, ParseError> {
        self.parse_at(raw, Utc::now())
    }
}
