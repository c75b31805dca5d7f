//! ============================================================================
//! Core Types for Story Search
//! ============================================================================
//! Story records, extracted annotations, parsed query parameters and the
//! request/response shapes of the search API. Serialized as camelCase JSON
//! for callers on the other side of the HTTP/RPC layer.
//! ============================================================================

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SearchError};

/// The indexed unit: one story with its vector and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    /// Opaque unique identifier (assigned on insert when empty)
    #[serde(default)]
    pub id: String,
    /// Vector embedding; computed lazily when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    pub metadata: StoryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    pub core: CoreMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted: Option<ExtractedMetadata>,
}

/// Canonical source fields, always present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMetadata {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub username: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub owner_handle: String,
}

/// Structured annotations derived from story text. A ranking and
/// filtering aid only, never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedMetadata {
    pub topics: Vec<String>,
    pub summary: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub experiences: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub personality_traits: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub emotional_tone: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters_description: Option<String>,
}

impl ExtractedMetadata {
    /// Trivial annotation used when extraction fails: the first word of
    /// the title as the only topic
    pub fn fallback(title: &str) -> Self {
        let topics = title
            .split_whitespace()
            .next()
            .map(|w| vec![w.to_lowercase()])
            .unwrap_or_default();
        Self {
            topics,
            ..Default::default()
        }
    }
}

impl StoryRecord {
    /// Create a story with empty embedding and no extracted metadata
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        username: impl Into<String>,
        owner_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            embedding: Vec::new(),
            metadata: StoryMetadata {
                core: CoreMetadata {
                    title: title.into(),
                    content: content.into(),
                    username: username.into(),
                    created_at: chrono::Utc::now().timestamp(),
                    owner_handle: owner_handle.into(),
                },
                extracted: None,
            },
        }
    }

    /// Attach a pre-computed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Attach pre-computed extracted metadata
    pub fn with_extracted(mut self, extracted: ExtractedMetadata) -> Self {
        self.metadata.extracted = Some(extracted);
        self
    }

    pub fn title(&self) -> &str {
        &self.metadata.core.title
    }

    /// Text that gets embedded for this story
    pub fn embedding_text(&self) -> String {
        format!(
            "{}\n\n{}",
            self.metadata.core.title, self.metadata.core.content
        )
    }
}

/// Classified purpose of a search query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    General,
    Professional,
    Connection,
    Dating,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::General => "general",
            Intent::Professional => "professional",
            Intent::Connection => "connection",
            Intent::Dating => "dating",
        };
        f.write_str(name)
    }
}

impl FromStr for Intent {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(Intent::General),
            "professional" => Ok(Intent::Professional),
            "connection" => Ok(Intent::Connection),
            "dating" => Ok(Intent::Dating),
            _ => Err(SearchError::InvalidInput(format!("Unknown intent: {}", s))),
        }
    }
}

/// Age constraint parsed from a query: an exact age or an inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgeConstraint {
    Exact(u32),
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<u32>,
    },
}

impl AgeConstraint {
    pub fn contains(&self, age: u32) -> bool {
        match *self {
            AgeConstraint::Exact(value) => age == value,
            AgeConstraint::Range { min, max } => {
                min.map_or(true, |lo| age >= lo) && max.map_or(true, |hi| age <= hi)
            }
        }
    }

    /// Inclusive bounds, used for range push-down
    pub fn bounds(&self) -> (Option<u32>, Option<u32>) {
        match *self {
            AgeConstraint::Exact(value) => (Some(value), Some(value)),
            AgeConstraint::Range { min, max } => (min, max),
        }
    }
}

impl FromStr for AgeConstraint {
    type Err = SearchError;

    /// Accepts `34`, `25-35`, `30+` and `<40`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|_| SearchError::InvalidInput(format!("Invalid age: {}", s)))
        };

        if let Some(lo) = s.strip_suffix('+') {
            return Ok(AgeConstraint::Range {
                min: Some(parse(lo)?),
                max: None,
            });
        }
        if let Some(hi) = s.strip_prefix('<') {
            return Ok(AgeConstraint::Range {
                min: None,
                max: Some(parse(hi)?),
            });
        }
        if let Some((lo, hi)) = s.split_once('-') {
            let (lo, hi) = (parse(lo)?, parse(hi)?);
            if lo > hi {
                return Err(SearchError::InvalidInput(format!(
                    "Empty age range: {}",
                    s
                )));
            }
            return Ok(AgeConstraint::Range {
                min: Some(lo),
                max: Some(hi),
            });
        }
        Ok(AgeConstraint::Exact(parse(s)?))
    }
}

/// Metadata fields a search can be constrained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterField {
    Profession,
    Interests,
    Age,
    Gender,
    Location,
    Experiences,
    PersonalityTraits,
    Skills,
}

impl FilterField {
    pub const ALL: [FilterField; 8] = [
        FilterField::Profession,
        FilterField::Interests,
        FilterField::Age,
        FilterField::Gender,
        FilterField::Location,
        FilterField::Experiences,
        FilterField::PersonalityTraits,
        FilterField::Skills,
    ];

    /// Payload key used by the external index
    pub fn payload_key(&self) -> &'static str {
        match self {
            FilterField::Profession => "profession",
            FilterField::Interests => "interests",
            FilterField::Age => "age",
            FilterField::Gender => "gender",
            FilterField::Location => "location",
            FilterField::Experiences => "experiences",
            FilterField::PersonalityTraits => "personality_traits",
            FilterField::Skills => "skills",
        }
    }
}

impl FromStr for FilterField {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "profession" => Ok(FilterField::Profession),
            "interests" | "interest" => Ok(FilterField::Interests),
            "age" => Ok(FilterField::Age),
            "gender" => Ok(FilterField::Gender),
            "location" => Ok(FilterField::Location),
            "experiences" | "experience" => Ok(FilterField::Experiences),
            "personalitytraits" | "traits" => Ok(FilterField::PersonalityTraits),
            "skills" | "skill" => Ok(FilterField::Skills),
            _ => Err(SearchError::InvalidInput(format!(
                "Unknown filter field: {}",
                s
            ))),
        }
    }
}

/// Structured constraints parsed from a free-text query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub intent: Intent,
    /// Accepted alternatives; a single string deserializes as one value
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub profession: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<AgeConstraint>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub gender: Vec<String>,
    #[serde(deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub experiences: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub personality_traits: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    /// Free keywords; informative only, never filtered on
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

impl SearchParams {
    /// Constraint fields that carry at least one value
    pub fn constrained_fields(&self) -> Vec<FilterField> {
        FilterField::ALL
            .into_iter()
            .filter(|field| match field {
                FilterField::Age => self.age.is_some(),
                _ => !self.text_values(*field).is_empty(),
            })
            .collect()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.constrained_fields().is_empty()
    }

    /// Text values for a field (empty for `Age`)
    pub fn text_values(&self, field: FilterField) -> Vec<&str> {
        match field {
            FilterField::Profession => self.profession.iter().map(String::as_str).collect(),
            FilterField::Gender => self.gender.iter().map(String::as_str).collect(),
            FilterField::Location => self.location.iter().map(String::as_str).collect(),
            FilterField::Interests => self.interests.iter().map(String::as_str).collect(),
            FilterField::Experiences => self.experiences.iter().map(String::as_str).collect(),
            FilterField::PersonalityTraits => {
                self.personality_traits.iter().map(String::as_str).collect()
            }
            FilterField::Skills => self.skills.iter().map(String::as_str).collect(),
            FilterField::Age => Vec::new(),
        }
    }

    /// Merge caller-supplied filters over the parsed parameters.
    /// An explicit field replaces whatever extraction produced for it;
    /// every supplied value is kept. `age` takes exactly one constraint.
    pub fn apply_overrides(&mut self, filters: &HashMap<String, Vec<String>>) -> Result<()> {
        for (name, values) in filters {
            let field: FilterField = name.parse()?;
            let values: Vec<String> = values
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                continue;
            }
            match field {
                FilterField::Profession => self.profession = values,
                FilterField::Gender => self.gender = values,
                FilterField::Location => self.location = values,
                FilterField::Age => match values.as_slice() {
                    [single] => self.age = Some(single.parse()?),
                    _ => {
                        return Err(SearchError::InvalidInput(format!(
                            "age takes a single constraint, got {}",
                            values.join(", ")
                        )))
                    }
                },
                FilterField::Interests => self.interests = values,
                FilterField::Experiences => self.experiences = values,
                FilterField::PersonalityTraits => self.personality_traits = values,
                FilterField::Skills => self.skills = values,
            }
        }
        Ok(())
    }
}

/// A string, a list of strings or null, as a list without blank entries
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let values = match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    };
    Ok(values.into_iter().filter(|v| !v.trim().is_empty()).collect())
}

/// A ranked hit: the story plus its cosine similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub record: StoryRecord,
    pub score: f32,
}

/// Per-call search options; unset values fall back to configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub threshold: Option<f32>,
    pub intent: Option<Intent>,
    pub filters: HashMap<String, Vec<String>>,
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_filter(mut self, field: &str, value: &str) -> Self {
        self.filters
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
        self
    }
}

/// Response of the search API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_indexed: usize,
    pub results_found: usize,
    /// Text that was actually embedded
    pub rewritten_query: String,
    /// Constraints that were applied
    pub params: SearchParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_creation() {
        let story = StoryRecord::new("s1", "Finding Love in Paris", "A story", "amelie", "@amelie");
        assert_eq!(story.id, "s1");
        assert_eq!(story.title(), "Finding Love in Paris");
        assert!(story.embedding.is_empty());
        assert!(story.metadata.extracted.is_none());
        assert!(story.embedding_text().starts_with("Finding Love in Paris\n\n"));
    }

    #[test]
    fn test_fallback_metadata_uses_first_title_word() {
        let meta = ExtractedMetadata::fallback("Quantum Archaeologist");
        assert_eq!(meta.topics, vec!["quantum".to_string()]);
        assert!(ExtractedMetadata::fallback("").topics.is_empty());
    }

    #[test]
    fn test_intent_parsing() {
        assert_eq!("dating".parse::<Intent>().unwrap(), Intent::Dating);
        assert_eq!("Professional".parse::<Intent>().unwrap(), Intent::Professional);
        assert!("romance".parse::<Intent>().is_err());
    }

    #[test]
    fn test_age_constraint_parsing() {
        assert_eq!("34".parse::<AgeConstraint>().unwrap(), AgeConstraint::Exact(34));
        assert_eq!(
            "25-35".parse::<AgeConstraint>().unwrap(),
            AgeConstraint::Range {
                min: Some(25),
                max: Some(35)
            }
        );
        let open = "30+".parse::<AgeConstraint>().unwrap();
        assert!(open.contains(30));
        assert!(open.contains(80));
        assert!(!open.contains(29));
        assert!("40-30".parse::<AgeConstraint>().is_err());
        assert!("old".parse::<AgeConstraint>().is_err());
    }

    #[test]
    fn test_age_constraint_json_shapes() {
        let exact: AgeConstraint = serde_json::from_str("34").unwrap();
        assert_eq!(exact, AgeConstraint::Exact(34));
        let range: AgeConstraint = serde_json::from_str(r#"{"min": 25}"#).unwrap();
        assert_eq!(
            range,
            AgeConstraint::Range {
                min: Some(25),
                max: None
            }
        );
    }

    #[test]
    fn test_overrides_replace_extracted_fields() {
        let mut params = SearchParams {
            interests: vec!["hiking".into()],
            ..Default::default()
        };
        let mut filters = HashMap::new();
        filters.insert("interests".to_string(), vec!["art".into(), "travel".into()]);
        filters.insert("personality_traits".to_string(), vec!["kind".into()]);
        filters.insert("age".to_string(), vec!["25-35".into()]);
        params.apply_overrides(&filters).unwrap();

        assert_eq!(params.interests, vec!["art", "travel"]);
        assert_eq!(params.personality_traits, vec!["kind"]);
        assert!(params.age.unwrap().contains(30));
        assert_eq!(
            params.constrained_fields(),
            vec![
                FilterField::Interests,
                FilterField::Age,
                FilterField::PersonalityTraits
            ]
        );
    }

    #[test]
    fn test_overrides_keep_every_value() {
        let mut params = SearchParams {
            profession: vec!["chef".into()],
            ..Default::default()
        };
        let mut filters = HashMap::new();
        filters.insert("profession".to_string(), vec!["engineer".into(), "doctor".into()]);
        filters.insert("location".to_string(), vec!["Paris".into(), " ".into()]);
        params.apply_overrides(&filters).unwrap();

        assert_eq!(params.profession, vec!["engineer", "doctor"]);
        assert_eq!(params.text_values(FilterField::Profession), vec!["engineer", "doctor"]);
        assert_eq!(params.location, vec!["Paris"]);
    }

    #[test]
    fn test_two_age_constraints_rejected() {
        let mut params = SearchParams::default();
        let mut filters = HashMap::new();
        filters.insert("age".to_string(), vec!["25-35".into(), "50+".into()]);
        assert!(matches!(
            params.apply_overrides(&filters),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_single_valued_fields_accept_string_or_list() {
        let params: SearchParams = serde_json::from_str(
            r#"{"profession": "nurse", "location": ["Paris", "Lyon"], "gender": null}"#,
        )
        .unwrap();
        assert_eq!(params.profession, vec!["nurse"]);
        assert_eq!(params.location, vec!["Paris", "Lyon"]);
        assert!(params.gender.is_empty());
    }

    #[test]
    fn test_unknown_filter_field_is_invalid_input() {
        let mut params = SearchParams::default();
        let mut filters = HashMap::new();
        filters.insert("zodiac".to_string(), vec!["leo".into()]);
        assert!(matches!(
            params.apply_overrides(&filters),
            Err(SearchError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_story_json_is_camel_case() {
        let story = StoryRecord::new("s1", "T", "C", "u", "@u").with_extracted(ExtractedMetadata {
            personality_traits: vec!["curious".into()],
            ..Default::default()
        });
        let json = serde_json::to_value(&story).unwrap();
        assert!(json["metadata"]["core"]["ownerHandle"].is_string());
        assert!(json["metadata"]["extracted"]["personalityTraits"].is_array());
        assert!(json.get("embedding").is_none());
    }
}
