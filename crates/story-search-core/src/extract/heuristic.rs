//! Deterministic extractor: vocabulary lookups and a few regexes.
//! Works offline and always succeeds, which makes it the debug stand-in for
//! the LLM extractor and the default when no key is configured.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use super::{MetadataExtractor, QueryAnalysis};
use crate::error::Result;
use crate::types::{AgeConstraint, ExtractedMetadata, Intent, SearchParams};

/// Inflections a vocabulary word may carry and still count as mentioned
const SUFFIXES: &[&str] = &["", "s", "es", "ing", "ling", "ed", "er", "ers", "ist", "ists", "y"];

const MAX_TOPICS: usize = 5;
const MAX_KEYWORDS: usize = 10;
const MAX_SUMMARY_SENTENCES: usize = 2;
const MAX_SENTENCE_CHARS: usize = 200;

/// Multi-word entries come before their single-word tails
const PROFESSIONS: &[&str] = &[
    "software engineer", "product manager", "data scientist", "project manager",
    "engineer", "developer", "designer", "manager", "teacher", "professor", "nurse",
    "doctor", "physician", "scientist", "archaeologist", "physicist", "researcher",
    "artist", "painter", "musician", "writer", "journalist", "chef", "lawyer",
    "accountant", "entrepreneur", "founder", "photographer", "pilot", "architect",
    "consultant", "therapist", "farmer", "student", "librarian", "mechanic",
];

const INTERESTS: &[&str] = &[
    "art", "travel", "music", "hiking", "cooking", "reading", "photography", "painting",
    "dancing", "yoga", "gaming", "movie", "film", "sport", "fitness", "running",
    "gardening", "writing", "history", "science", "technology", "nature", "fashion",
    "wine", "coffee", "museum", "theater", "poetry", "chess", "climbing", "surfing",
    "cycling", "camping", "volunteering",
];

const TRAITS: &[&str] = &[
    "kind", "funny", "adventurous", "curious", "creative", "ambitious", "introverted",
    "extroverted", "outgoing", "shy", "caring", "honest", "loyal", "optimistic",
    "passionate", "patient", "calm", "energetic", "thoughtful", "witty", "driven",
];

const SKILLS: &[&str] = &[
    "public speaking", "data analysis", "machine learning", "programming", "coding",
    "design", "leadership", "negotiation", "marketing", "sales", "teaching",
    "management", "research", "photography", "writing", "cooking",
];

const LOCATIONS: &[&str] = &[
    "New York", "San Francisco", "Los Angeles", "Paris", "London", "Berlin", "Tokyo",
    "Madrid", "Rome", "Barcelona", "Amsterdam", "Lisbon", "Sydney", "Toronto",
    "Chicago", "Seattle", "Boston", "Dubai", "Singapore", "Mumbai", "Nairobi",
];

const DATING_CUES: &[&str] = &[
    "date", "dating", "romantic", "romance", "partner", "love", "relationship",
    "girlfriend", "boyfriend", "soulmate", "single", "wife", "husband",
];

const PROFESSIONAL_CUES: &[&str] = &[
    "hire", "hiring", "job", "career", "cofounder", "mentor", "expert", "professional",
    "colleague", "freelance", "consultant", "collaborate", "business", "recruit",
];

const CONNECTION_CUES: &[&str] = &[
    "friend", "connect", "community", "meet", "buddy", "companion", "network", "talk",
];

const FEMALE_WORDS: &[&str] = &["woman", "women", "female", "females", "girl", "girls", "lady", "ladies"];
const MALE_WORDS: &[&str] = &["man", "men", "male", "males", "guy", "guys"];

const TONES: &[(&str, &[&str])] = &[
    ("joyful", &["happy", "joy", "excited", "grateful", "delight", "laugh"]),
    ("melancholic", &["sad", "lonely", "grief", "lost", "miss", "cry"]),
    ("hopeful", &["hope", "dream", "future", "someday"]),
    ("anxious", &["nervous", "afraid", "anxious", "fear", "worry"]),
    ("romantic", &["love", "romantic", "romance"]),
];

const EXPERIENCE_OPENERS: &[&str] = &[
    "i've ", "i have ", "i once ", "i spent ", "i met ", "i moved ", "i worked ",
    "i lived ", "i traveled ", "i travelled ", "i studied ", "i built ",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "who", "that", "this", "have", "has", "are", "was",
    "were", "but", "not", "you", "your", "our", "their", "they", "them", "from", "into",
    "about", "there", "what", "when", "where", "which", "while", "will", "would", "could",
    "should", "some", "someone", "something", "every", "each", "just", "like", "also",
    "than", "then", "very", "been", "being", "over", "under", "more", "most", "looking",
    "find", "want", "need", "both", "together", "next", "single", "my", "me", "we", "us",
    "all", "any", "out", "its", "his", "her", "him", "she", "he", "one", "years", "old",
];

static AGE_RANGE_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:between|aged?|ages)\s+(\d{1,2})\s*(?:-|to|and)\s*(\d{1,2})(?:\s*(?:years?[\s-]*old|y/?o)\b)?")
        .expect("valid age range regex")
});

static AGE_RANGE_SUFFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\s*(?:-|to)\s*(\d{1,2})\s*(?:years?[\s-]*old|y/?o)\b")
        .expect("valid age range regex")
});

static AGE_DECADE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bin\s+(?:their|his|her|my|the)\s+(\d)0s\b").expect("valid decade regex")
});

static AGE_MIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:over|older than|above)\s+(\d{1,2})(?:\s*(?:years?[\s-]*old|y/?o))?\b")
        .expect("valid age bound regex")
});

static AGE_MAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:under|younger than|below)\s+(\d{1,2})(?:\s*(?:years?[\s-]*old|y/?o))?\b")
        .expect("valid age bound regex")
});

static AGE_EXACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:aged?\s+(\d{1,2})\b|(\d{1,2})\s*(?:years?[\s-]*old|y/?o)\b)")
        .expect("valid exact age regex")
});

static SELF_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:i am|i'm|im)\s+(\d{1,2})\b").expect("valid self age regex")
});

static SELF_GENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:i am|i'm|im|as)\s+an?\s+(woman|man|girl|guy|mother|father|mom|dad|wife|husband)\b")
        .expect("valid self gender regex")
});

/// Vocabulary- and regex-based extractor
#[derive(Debug, Clone, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Annotate a story. Never fails.
    pub fn annotate(&self, text: &str, title: &str) -> ExtractedMetadata {
        let full = format!("{} {}", title, text);
        let tokens = tokenize(&full);
        let phrase_text = phrase_haystack(&tokens);

        ExtractedMetadata {
            topics: top_topics(&tokens),
            summary: sentences(text)
                .into_iter()
                .take(MAX_SUMMARY_SENTENCES)
                .map(|s| truncate_chars(&s, MAX_SENTENCE_CHARS))
                .collect(),
            profession: first_mention(PROFESSIONS, &tokens, &phrase_text).map(str::to_string),
            interests: all_mentions(INTERESTS, &tokens, &phrase_text),
            age: story_age(&full),
            gender: story_gender(&full),
            experiences: experiences(text),
            personality_traits: all_mentions(TRAITS, &tokens, &phrase_text),
            skills: all_mentions(SKILLS, &tokens, &phrase_text),
            location: first_location(&phrase_text),
            relationship_status: relationship_status(&tokens),
            education: education(&tokens),
            emotional_tone: TONES
                .iter()
                .filter(|(_, cues)| cues.iter().any(|cue| mentions(&tokens, &phrase_text, cue)))
                .map(|(tone, _)| tone.to_string())
                .collect(),
            ..Default::default()
        }
    }

    /// Parse a query. Never fails; an empty query passes through.
    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        if query.trim().is_empty() {
            return QueryAnalysis::passthrough(query);
        }

        let (age, rewritten) = match query_age(query) {
            Some((constraint, start, end)) => {
                let stripped = format!("{} {}", &query[..start], &query[end..]);
                let stripped = collapse_whitespace(&stripped);
                let rewritten = if stripped.is_empty() {
                    query.trim().to_string()
                } else {
                    stripped
                };
                (Some(constraint), rewritten)
            }
            None => (None, query.trim().to_string()),
        };

        let tokens = tokenize(query);
        let phrase_text = phrase_haystack(&tokens);

        let params = SearchParams {
            intent: classify_intent(&tokens, &phrase_text),
            profession: first_mention(PROFESSIONS, &tokens, &phrase_text)
                .map(str::to_string)
                .into_iter()
                .collect(),
            interests: all_mentions(INTERESTS, &tokens, &phrase_text),
            age,
            gender: query_gender(&tokens).into_iter().collect(),
            location: first_location(&phrase_text).into_iter().collect(),
            experiences: Vec::new(),
            personality_traits: all_mentions(TRAITS, &tokens, &phrase_text),
            skills: all_mentions(SKILLS, &tokens, &phrase_text),
            keywords: keywords(&tokens),
        };

        QueryAnalysis {
            rewritten_query: rewritten,
            params,
        }
    }
}

#[async_trait]
impl MetadataExtractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn extract_metadata(&self, text: &str, title: &str) -> Result<ExtractedMetadata> {
        Ok(self.annotate(text, title))
    }

    async fn extract_query_params(&self, query: &str) -> Result<QueryAnalysis> {
        Ok(self.analyze(query))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Space-padded token string for multi-word phrase lookups
fn phrase_haystack(tokens: &[String]) -> String {
    format!(" {} ", tokens.join(" "))
}

fn token_matches(token: &str, term: &str) -> bool {
    token
        .strip_prefix(term)
        .map_or(false, |rest| SUFFIXES.contains(&rest))
}

fn mentions(tokens: &[String], phrase_text: &str, term: &str) -> bool {
    let term = term.to_lowercase();
    if term.contains(' ') {
        phrase_text.contains(&format!(" {} ", term)) || phrase_text.contains(&format!(" {}s ", term))
    } else {
        tokens.iter().any(|t| token_matches(t, &term))
    }
}

fn first_mention(vocab: &[&'static str], tokens: &[String], phrase_text: &str) -> Option<&'static str> {
    vocab
        .iter()
        .copied()
        .find(|term| mentions(tokens, phrase_text, term))
}

/// Every vocabulary hit, skipping single words already covered by a
/// longer phrase hit ("engineer" inside "software engineer")
fn all_mentions(vocab: &[&str], tokens: &[String], phrase_text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for term in vocab {
        if !mentions(tokens, phrase_text, term) {
            continue;
        }
        if found.iter().any(|f| f.contains(' ') && f.split(' ').any(|w| w == *term)) {
            continue;
        }
        found.push(term.to_string());
    }
    found
}

fn first_location(phrase_text: &str) -> Option<String> {
    LOCATIONS
        .iter()
        .find(|loc| phrase_text.contains(&format!(" {} ", loc.to_lowercase())))
        .map(|loc| loc.to_string())
}

fn classify_intent(tokens: &[String], phrase_text: &str) -> Intent {
    let score = |cues: &[&str]| {
        cues.iter()
            .filter(|cue| mentions(tokens, phrase_text, cue))
            .count()
    };
    let dating = score(DATING_CUES);
    let professional = score(PROFESSIONAL_CUES);
    let connection = score(CONNECTION_CUES);

    let best = dating.max(professional).max(connection);
    if best == 0 {
        Intent::General
    } else if dating == best {
        Intent::Dating
    } else if professional == best {
        Intent::Professional
    } else {
        Intent::Connection
    }
}

fn query_gender(tokens: &[String]) -> Option<String> {
    let female = tokens.iter().any(|t| FEMALE_WORDS.contains(&t.as_str()));
    let male = tokens.iter().any(|t| MALE_WORDS.contains(&t.as_str()));
    match (female, male) {
        (true, false) => Some("female".to_string()),
        (false, true) => Some("male".to_string()),
        _ => None,
    }
}

fn story_gender(text: &str) -> Option<String> {
    let caps = SELF_GENDER.captures(text)?;
    let word = caps.get(1)?.as_str().to_lowercase();
    let gender = match word.as_str() {
        "woman" | "girl" | "mother" | "mom" | "wife" => "female",
        _ => "male",
    };
    Some(gender.to_string())
}

fn parse_age(value: &str) -> Option<u32> {
    value.parse().ok()
}

/// Age constraint in a query plus the byte span it occupied
fn query_age(query: &str) -> Option<(AgeConstraint, usize, usize)> {
    for re in [&*AGE_RANGE_PREFIXED, &*AGE_RANGE_SUFFIXED] {
        if let Some(caps) = re.captures(query) {
            let whole = caps.get(0)?;
            let lo = parse_age(caps.get(1)?.as_str())?;
            let hi = parse_age(caps.get(2)?.as_str())?;
            let (min, max) = if lo <= hi { (lo, hi) } else { (hi, lo) };
            return Some((
                AgeConstraint::Range {
                    min: Some(min),
                    max: Some(max),
                },
                whole.start(),
                whole.end(),
            ));
        }
    }

    if let Some(caps) = AGE_DECADE.captures(query) {
        let whole = caps.get(0)?;
        let decade = parse_age(caps.get(1)?.as_str())? * 10;
        return Some((
            AgeConstraint::Range {
                min: Some(decade),
                max: Some(decade + 9),
            },
            whole.start(),
            whole.end(),
        ));
    }

    if let Some(caps) = AGE_MIN.captures(query) {
        let whole = caps.get(0)?;
        let bound = parse_age(caps.get(1)?.as_str())?;
        return Some((
            AgeConstraint::Range {
                min: Some(bound + 1),
                max: None,
            },
            whole.start(),
            whole.end(),
        ));
    }

    if let Some(caps) = AGE_MAX.captures(query) {
        let whole = caps.get(0)?;
        let bound = parse_age(caps.get(1)?.as_str())?;
        return Some((
            AgeConstraint::Range {
                min: None,
                max: Some(bound.saturating_sub(1)),
            },
            whole.start(),
            whole.end(),
        ));
    }

    let caps = AGE_EXACT.captures(query)?;
    let whole = caps.get(0)?;
    let value = caps.get(1).or_else(|| caps.get(2))?;
    Some((
        AgeConstraint::Exact(parse_age(value.as_str())?),
        whole.start(),
        whole.end(),
    ))
}

/// A story author's own age; "in my 30s" becomes the decade midpoint
fn story_age(text: &str) -> Option<u32> {
    if let Some(caps) = AGE_EXACT.captures(text) {
        return caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| parse_age(m.as_str()));
    }
    if let Some(caps) = SELF_AGE.captures(text) {
        return caps.get(1).and_then(|m| parse_age(m.as_str()));
    }
    AGE_DECADE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_age(m.as_str()))
        .map(|decade| decade * 10 + 5)
}

fn relationship_status(tokens: &[String]) -> Option<String> {
    let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));
    if has(&["married", "wife", "husband"]) {
        Some("married".to_string())
    } else if has(&["engaged", "fiance", "fiancee"]) {
        Some("engaged".to_string())
    } else if has(&["divorced"]) {
        Some("divorced".to_string())
    } else if has(&["single"]) {
        Some("single".to_string())
    } else {
        None
    }
}

fn education(tokens: &[String]) -> Option<String> {
    let has = |words: &[&str]| tokens.iter().any(|t| words.contains(&t.as_str()));
    if has(&["phd", "doctorate"]) {
        Some("doctorate".to_string())
    } else if has(&["master's", "masters", "mba"]) {
        Some("master's degree".to_string())
    } else if has(&["university", "college", "bachelor's", "degree"]) {
        Some("university".to_string())
    } else {
        None
    }
}

fn is_content_word(token: &str) -> bool {
    token.chars().count() >= 3
        && !STOPWORDS.contains(&token)
        && !token.chars().all(|c| c.is_ascii_digit())
}

/// Most frequent content words, ties broken by first appearance
fn top_topics(tokens: &[String]) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, token) in tokens.iter().enumerate() {
        if token.chars().count() < 4 || !is_content_word(token) {
            continue;
        }
        counts.entry(token.as_str()).or_insert((0, idx)).0 += 1;
    }
    let mut ranked: Vec<(&str, usize, usize)> =
        counts.into_iter().map(|(t, (c, first))| (t, c, first)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_TOPICS)
        .map(|(t, _, _)| t.to_string())
        .collect()
}

fn keywords(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokens {
        if is_content_word(token) && !out.contains(token) {
            out.push(token.clone());
        }
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

fn sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(collapse_whitespace)
        .filter(|s| !s.is_empty())
        .collect()
}

fn experiences(text: &str) -> Vec<String> {
    sentences(text)
        .into_iter()
        .filter(|s| {
            let lower = format!("{} ", s.to_lowercase());
            EXPERIENCE_OPENERS.iter().any(|o| lower.starts_with(o))
        })
        .take(3)
        .map(|s| truncate_chars(&s, MAX_SENTENCE_CHARS))
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dating_query() {
        let analysis = HeuristicExtractor::new().analyze("romantic partner who loves art and travel");
        assert_eq!(analysis.params.intent, Intent::Dating);
        assert_eq!(analysis.params.interests, vec!["art", "travel"]);
        assert!(analysis.params.profession.is_empty());
        assert!(analysis.params.gender.is_empty());
        assert_eq!(analysis.rewritten_query, "romantic partner who loves art and travel");
    }

    #[test]
    fn test_professional_query_with_age_range() {
        let analysis =
            HeuristicExtractor::new().analyze("hiring software engineers aged 25-35 in Berlin");
        let params = &analysis.params;
        assert_eq!(params.intent, Intent::Professional);
        assert_eq!(params.profession, vec!["software engineer"]);
        assert_eq!(
            params.age,
            Some(AgeConstraint::Range {
                min: Some(25),
                max: Some(35)
            })
        );
        assert_eq!(params.location, vec!["Berlin"]);
        assert_eq!(analysis.rewritten_query, "hiring software engineers in Berlin");
    }

    #[test]
    fn test_age_phrases() {
        let extractor = HeuristicExtractor::new();
        let age = |q: &str| extractor.analyze(q).params.age;
        assert_eq!(
            age("friends between 30 and 40"),
            Some(AgeConstraint::Range {
                min: Some(30),
                max: Some(40)
            })
        );
        assert_eq!(
            age("a woman in her 30s"),
            Some(AgeConstraint::Range {
                min: Some(30),
                max: Some(39)
            })
        );
        assert_eq!(
            age("mentors over 50"),
            Some(AgeConstraint::Range {
                min: Some(51),
                max: None
            })
        );
        assert_eq!(age("a 29 year old chef"), Some(AgeConstraint::Exact(29)));
        assert_eq!(age("people who love chess"), None);
    }

    #[test]
    fn test_gender_and_connection_intent() {
        let analysis = HeuristicExtractor::new().analyze("women to meet as friends");
        assert_eq!(analysis.params.intent, Intent::Connection);
        assert_eq!(analysis.params.gender, vec!["female"]);
        assert!(HeuristicExtractor::new()
            .analyze("many people")
            .params
            .gender
            .is_empty());
    }

    #[test]
    fn test_general_query_is_unconstrained() {
        let analysis = HeuristicExtractor::new().analyze("stories about the ocean");
        assert_eq!(analysis.params.intent, Intent::General);
        assert!(analysis.params.is_unconstrained());
        assert!(analysis.params.keywords.contains(&"ocean".to_string()));
    }

    #[test]
    fn test_empty_query_passthrough() {
        let analysis = HeuristicExtractor::new().analyze("   ");
        assert_eq!(analysis, QueryAnalysis::passthrough("   "));
    }

    #[test]
    fn test_story_annotation() {
        let meta = HeuristicExtractor::new().annotate(
            "I'm a woman, 34 years old, working as a nurse in London. I love hiking and \
             photography. I've volunteered abroad twice. I am curious and patient.",
            "Night Shifts",
        );
        assert_eq!(meta.profession.as_deref(), Some("nurse"));
        assert_eq!(meta.age, Some(34));
        assert_eq!(meta.gender.as_deref(), Some("female"));
        assert_eq!(meta.location.as_deref(), Some("London"));
        assert!(meta.interests.contains(&"hiking".to_string()));
        assert!(meta.interests.contains(&"photography".to_string()));
        assert_eq!(meta.personality_traits, vec!["curious", "patient"]);
        assert_eq!(meta.experiences, vec!["I've volunteered abroad twice"]);
        assert!(!meta.topics.is_empty());
        assert_eq!(meta.summary.len(), 2);
    }

    #[test]
    fn test_phrase_supersedes_word() {
        let tokens = tokenize("a senior software engineer");
        let haystack = phrase_haystack(&tokens);
        assert_eq!(
            all_mentions(PROFESSIONS, &tokens, &haystack),
            vec!["software engineer"]
        );
    }

    #[test]
    fn test_token_inflections() {
        assert!(token_matches("travelling", "travel"));
        assert!(token_matches("loves", "love"));
        assert!(!token_matches("article", "art"));
        assert!(!token_matches("many", "man"));
    }

    #[test]
    fn test_deterministic_topics() {
        let extractor = HeuristicExtractor::new();
        let text = "Gardens and gardens everywhere, river walks by the river.";
        assert_eq!(
            extractor.annotate(text, "Walks").topics,
            extractor.annotate(text, "Walks").topics
        );
    }
}
