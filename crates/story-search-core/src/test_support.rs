//! Shared helpers for unit tests: a local HTTP stub server and a small
//! story fixture set.

use axum::Router;

use crate::types::{ExtractedMetadata, StoryRecord};

/// Serve `app` on an ephemeral localhost port and return its base URL
pub async fn spawn_stub(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub listener address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

pub fn quantum_story() -> StoryRecord {
    StoryRecord::new(
        "quantum",
        "Quantum Archaeologist",
        "I spend my days in a physics lab reconstructing ancient pottery with quantum \
         imaging. My research team maps buried ruins without digging a single trench.",
        "mira",
        "@mira",
    )
}

pub fn product_story() -> StoryRecord {
    StoryRecord::new(
        "product",
        "Product Manager",
        "Roadmaps, sprint reviews and stakeholder syncs fill my calendar. I ship features \
         for a fintech startup and measure everything with dashboards.",
        "devon",
        "@devon",
    )
}

pub fn paris_story() -> StoryRecord {
    StoryRecord::new(
        "paris",
        "Finding Love in Paris",
        "We met on a rainy afternoon in Montmartre, two strangers sheltering under the \
         awning of a street artist. Years later we are still lovers, traveling by night \
         train and sketching every city we reach.",
        "amelie",
        "@amelie",
    )
}

pub fn sample_stories() -> Vec<StoryRecord> {
    vec![quantum_story(), product_story(), paris_story()]
}

/// A story with hand-written annotations for filter tests
pub fn annotated_story(id: &str, profession: &str, interests: &[&str], age: u32) -> StoryRecord {
    StoryRecord::new(id, format!("Story {}", id), "A short story.", "user", "@user").with_extracted(
        ExtractedMetadata {
            topics: vec!["life".into()],
            profession: Some(profession.to_string()),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            age: Some(age),
            ..Default::default()
        },
    )
}
