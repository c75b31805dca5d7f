//! ============================================================================
//! Metadata Filter - Post-retrieval constraint checks
//! ============================================================================
//! A candidate is kept when every constrained field matches: OR across the
//! values listed for one field, AND across fields. Missing annotations
//! never exclude a candidate, neither a missing `extracted` block nor a
//! single empty field.
//! ============================================================================

use crate::fuzzy;
use crate::types::{ExtractedMetadata, FilterField, SearchParams, SearchResult};

/// Whether a story's annotations satisfy the parsed constraints.
/// Fields in `skip` were already evaluated by the index.
pub fn story_matches(
    params: &SearchParams,
    extracted: Option<&ExtractedMetadata>,
    skip: &[FilterField],
) -> bool {
    let Some(meta) = extracted else {
        return true;
    };

    params
        .constrained_fields()
        .into_iter()
        .filter(|field| !skip.contains(field))
        .all(|field| field_matches(params, meta, field))
}

/// Keep only results whose annotations satisfy `params`, preserving order
pub fn apply_filters(
    results: Vec<SearchResult>,
    params: &SearchParams,
    skip: &[FilterField],
) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| story_matches(params, r.record.metadata.extracted.as_ref(), skip))
        .collect()
}

fn field_matches(params: &SearchParams, meta: &ExtractedMetadata, field: FilterField) -> bool {
    match field {
        FilterField::Age => match (params.age, meta.age) {
            (Some(constraint), Some(age)) => constraint.contains(age),
            _ => true,
        },
        FilterField::Gender => match meta.gender.as_deref() {
            Some(actual) if !actual.trim().is_empty() => {
                let actual = normalize_gender(actual);
                params.gender.iter().any(|wanted| normalize_gender(wanted) == actual)
            }
            _ => true,
        },
        _ => {
            let candidates = candidate_values(meta, field);
            if candidates.is_empty() {
                return true;
            }
            fuzzy::matches_any(candidates.as_slice(), params.text_values(field).as_slice())
        }
    }
}

/// Non-empty annotation values for a text field
pub fn candidate_values(meta: &ExtractedMetadata, field: FilterField) -> Vec<&str> {
    let values: Vec<&str> = match field {
        FilterField::Profession => meta.profession.as_deref().into_iter().collect(),
        FilterField::Gender => meta.gender.as_deref().into_iter().collect(),
        FilterField::Location => meta.location.as_deref().into_iter().collect(),
        FilterField::Interests => meta.interests.iter().map(String::as_str).collect(),
        FilterField::Experiences => meta.experiences.iter().map(String::as_str).collect(),
        FilterField::PersonalityTraits => {
            meta.personality_traits.iter().map(String::as_str).collect()
        }
        FilterField::Skills => meta.skills.iter().map(String::as_str).collect(),
        FilterField::Age => Vec::new(),
    };
    values.into_iter().filter(|v| !v.trim().is_empty()).collect()
}

/// Canonical gender label. Compared exactly: substring rules would
/// let "male" match "female".
pub fn normalize_gender(value: &str) -> String {
    match value.trim().to_lowercase().as_str() {
        "m" | "male" | "man" | "men" | "guy" | "boy" => "male".to_string(),
        "f" | "female" | "woman" | "women" | "girl" | "lady" => "female".to_string(),
        "nb" | "non-binary" | "nonbinary" | "enby" => "non-binary".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::annotated_story;
    use crate::types::AgeConstraint;

    fn hit(record: crate::types::StoryRecord) -> SearchResult {
        SearchResult { record, score: 0.5 }
    }

    #[test]
    fn test_missing_metadata_passes() {
        let params = SearchParams {
            profession: vec!["engineer".into()],
            ..Default::default()
        };
        assert!(story_matches(&params, None, &[]));
        assert!(story_matches(&params, Some(&ExtractedMetadata::default()), &[]));
    }

    #[test]
    fn test_or_within_field_and_across_fields() {
        let story = annotated_story("a", "software engineer", &["hiking", "chess"], 31);
        let meta = story.metadata.extracted.as_ref();

        let any_interest = SearchParams {
            interests: vec!["painting".into(), "chess".into()],
            ..Default::default()
        };
        assert!(story_matches(&any_interest, meta, &[]));

        let both_fields = SearchParams {
            profession: vec!["engineer".into()],
            interests: vec!["chess".into()],
            age: Some(AgeConstraint::Range {
                min: Some(25),
                max: Some(35),
            }),
            ..Default::default()
        };
        assert!(story_matches(&both_fields, meta, &[]));

        let wrong_profession = SearchParams {
            profession: vec!["pilot".into()],
            interests: vec!["chess".into()],
            ..Default::default()
        };
        assert!(!story_matches(&wrong_profession, meta, &[]));
    }

    #[test]
    fn test_skip_fields_are_not_rechecked() {
        let story = annotated_story("a", "chef", &["cooking"], 40);
        let params = SearchParams {
            profession: vec!["pilot".into()],
            ..Default::default()
        };
        let meta = story.metadata.extracted.as_ref();
        assert!(!story_matches(&params, meta, &[]));
        assert!(story_matches(&params, meta, &[FilterField::Profession]));
    }

    #[test]
    fn test_age_constraint() {
        let story = annotated_story("a", "chef", &[], 40);
        let meta = story.metadata.extracted.as_ref();
        let exact = SearchParams {
            age: Some(AgeConstraint::Exact(41)),
            ..Default::default()
        };
        assert!(!story_matches(&exact, meta, &[]));
        let open = SearchParams {
            age: Some(AgeConstraint::Range {
                min: Some(35),
                max: None,
            }),
            ..Default::default()
        };
        assert!(story_matches(&open, meta, &[]));
    }

    #[test]
    fn test_gender_is_exact_after_normalization() {
        let meta = ExtractedMetadata {
            gender: Some("Female".into()),
            ..Default::default()
        };
        let male = SearchParams {
            gender: vec!["male".into()],
            ..Default::default()
        };
        let woman = SearchParams {
            gender: vec!["woman".into()],
            ..Default::default()
        };
        let either = SearchParams {
            gender: vec!["man".into(), "f".into()],
            ..Default::default()
        };
        assert!(!story_matches(&male, Some(&meta), &[]));
        assert!(story_matches(&woman, Some(&meta), &[]));
        assert!(story_matches(&either, Some(&meta), &[]));
    }

    #[test]
    fn test_apply_filters_preserves_order() {
        let results = vec![
            hit(annotated_story("1", "nurse", &["travel"], 30)),
            hit(annotated_story("2", "pilot", &["chess"], 30)),
            hit(annotated_story("3", "doctor", &["travel", "art"], 30)),
        ];
        let params = SearchParams {
            interests: vec!["travel".into()],
            ..Default::default()
        };
        let kept: Vec<String> = apply_filters(results, &params, &[])
            .into_iter()
            .map(|r| r.record.id)
            .collect();
        assert_eq!(kept, vec!["1", "3"]);
    }
}
