// End-to-end tests for the recommendation pipeline

use async_trait::async_trait;
use linkweaver_core::{
    Embedder, EmbeddingError, FastEmbedEmbedder, GenerationError, HashingEmbedder, LinkContext,
    Pipeline, PipelineConfig, PipelineError, PipelineEvent, PageRecord, SnippetGenerator,
    SnippetRequest, Stage,
};
use linkweaver_scanner::FetchEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

const GARDEN_TEXT: &str = "Garden rakes and shovels for spring planting. \
    Spring planting needs good soil and sharp garden tools.";

fn record(url: &str, keywords: &[&str], priority: f64) -> PageRecord {
    PageRecord::new(url, keywords.iter().map(|k| k.to_string()).collect()).with_priority(priority)
}

fn same_texts(paths: &[&str]) -> HashMap<String, String> {
    paths
        .iter()
        .map(|p| (p.to_string(), GARDEN_TEXT.to_string()))
        .collect()
}

fn recording_callback() -> (Arc<Mutex<Vec<PipelineEvent>>>, linkweaver_core::EventCallback) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();
    let callback: linkweaver_core::EventCallback = Arc::new(move |event: PipelineEvent| {
        events_clone.lock().unwrap().push(event);
    });
    (events, callback)
}

/// Pipeline with the offline embedder so tests never load the sentence model.
fn offline_pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::new(config).with_embedder(Arc::new(HashingEmbedder::default()))
}

/// Embeds text onto three topic axes by counting topic words.
struct TopicEmbedder;

const TOPICS: [&[&str]; 3] = [
    &["rose", "roses", "prune", "pruning", "bloom", "blooms"],
    &["shoe", "shoes", "running", "trail", "run"],
    &["tax", "taxes", "invoice", "accounting", "filing"],
];

impl Embedder for TopicEmbedder {
    fn dimension(&self) -> usize {
        TOPICS.len()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; TOPICS.len()];
        for word in text.split(|c: char| !c.is_alphanumeric()) {
            let word = word.to_lowercase();
            for (axis, topic) in TOPICS.iter().enumerate() {
                if topic.contains(&word.as_str()) {
                    vector[axis] += 1.0;
                }
            }
        }
        if vector.iter().all(|v| *v == 0.0) {
            return Err(EmbeddingError::EmptyText);
        }
        Ok(vector)
    }
}

fn topic_records() -> Vec<PageRecord> {
    vec![
        record("/roses-pruning", &["pruning"], 0.9),
        record("/roses-care", &["blooms"], 0.9),
        record("/trail-shoes", &["trail"], 0.9),
        record("/taxes", &["invoice"], 0.9),
    ]
}

fn topic_texts() -> HashMap<String, String> {
    [
        (
            "/roses-pruning",
            "Pruning roses in late winter keeps each rose bush open. Prune above an outward bud.",
        ),
        (
            "/roses-care",
            "Roses need sun, deep watering and feeding to keep their blooms coming. Deadhead \
             spent blooms and prune weak canes.",
        ),
        (
            "/trail-shoes",
            "Trail running shoes need grip on loose ground. Replace running shoes every few \
             hundred miles.",
        ),
        (
            "/taxes",
            "Filing taxes as a freelancer means keeping every invoice. Good accounting makes \
             tax season calm.",
        ),
    ]
    .into_iter()
    .map(|(path, text)| (path.to_string(), text.to_string()))
    .collect()
}

fn recommended_pairs(report: &linkweaver_core::PipelineReport) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = report
        .recommendations
        .iter()
        .map(|r| (r.source().to_string(), r.destination().to_string()))
        .collect();
    pairs.sort();
    pairs
}

struct EchoGenerator;

#[async_trait]
impl SnippetGenerator for EchoGenerator {
    async fn generate(&self, request: &SnippetRequest) -> Result<String, GenerationError> {
        Ok(format!("Browse our {} today.", request.anchor_text))
    }
}

// ============================================================================
// Fetch Stage Tests
// ============================================================================

#[tokio::test]
async fn test_slow_page_is_dropped_and_rest_continue() {
    let server = MockServer::start().await;
    let html = format!("<html><body><main><p>{}</p></main></body></html>", GARDEN_TEXT);
    for route in ["/a", "/c"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(html.clone()),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(html.clone())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = PipelineConfig {
        timeout_secs: 1,
        ..Default::default()
    };
    let (events, callback) = recording_callback();
    let pipeline = offline_pipeline(config).with_event_callback(callback);
    let records = vec![
        record("/a", &["rakes"], 0.9),
        record("/b", &["soil"], 0.9),
        record("/c", &["shovels"], 0.9),
    ];

    let report = pipeline.run(&server.uri(), &records).await.unwrap();

    assert_eq!(report.summary.pages_requested, 3);
    assert_eq!(report.summary.pages_fetched, 2);
    assert_eq!(report.summary.similarity_pairs, 1);
    assert_eq!(report.recommendations.len(), 2);
    for rec in &report.recommendations {
        assert_ne!(rec.source(), "/b");
        assert_ne!(rec.destination(), "/b");
    }

    let events = events.lock().unwrap();
    assert!(events.iter().any(|event| matches!(
        event,
        PipelineEvent::Fetch(FetchEvent::Failed { path, .. }) if path == "/b"
    )));
}

#[tokio::test]
async fn test_invalid_base_url_fails_before_fetching() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let result = pipeline
        .run("not-a-url", &[record("/a", &["x"], 0.9)])
        .await;
    assert!(matches!(result, Err(PipelineError::InvalidBaseUrl(_))));
}

#[tokio::test]
async fn test_no_fetched_pages_is_an_empty_report() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let report = pipeline
        .run_with_texts(
            &[record("/a", &["x"], 0.9), record("/b", &["y"], 0.9)],
            HashMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.summary.pages_fetched, 0);
    assert_eq!(report.summary.similarity_pairs, 0);
    assert!(report.recommendations.is_empty());
}

// ============================================================================
// Ranking Tests
// ============================================================================

#[tokio::test]
async fn test_max_links_keeps_highest_priority_destination() {
    let config = PipelineConfig {
        max_links: 1,
        ..Default::default()
    };
    let pipeline = offline_pipeline(config);
    let records = vec![
        record("/a", &["rakes"], 0.75),
        record("/b", &["shovels"], 0.9),
        record("/c", &["soil"], 0.8),
    ];

    let report = pipeline
        .run_with_texts(&records, same_texts(&["/a", "/b", "/c"]))
        .await
        .unwrap();

    let from_a: Vec<_> = report
        .recommendations
        .iter()
        .filter(|r| r.source() == "/a")
        .collect();
    assert_eq!(from_a.len(), 1);
    assert_eq!(from_a[0].destination(), "/b");

    let pairs: Vec<_> = report
        .recommendations
        .iter()
        .map(|r| (r.source(), r.destination()))
        .collect();
    assert_eq!(pairs, vec![("/a", "/b"), ("/c", "/b"), ("/b", "/c")]);
}

#[tokio::test]
async fn test_output_is_sorted_and_capped() {
    let config = PipelineConfig {
        max_links: 2,
        output_cap: 4,
        ..Default::default()
    };
    let pipeline = offline_pipeline(config);
    let paths = ["/p1", "/p2", "/p3", "/p4", "/p5"];
    let records: Vec<_> = paths
        .iter()
        .enumerate()
        .map(|(i, p)| record(p, &["garden"], 0.71 + i as f64 * 0.05))
        .collect();

    let report = pipeline
        .run_with_texts(&records, same_texts(&paths))
        .await
        .unwrap();

    assert_eq!(report.recommendations.len(), 4);
    assert_eq!(report.summary.candidates_kept, 4);
    for window in report.recommendations.windows(2) {
        assert!(window[0].candidate.priority >= window[1].candidate.priority);
    }
    let mut per_source: HashMap<&str, usize> = HashMap::new();
    for rec in &report.recommendations {
        *per_source.entry(rec.source()).or_default() += 1;
        assert_ne!(rec.source(), rec.destination());
        assert!(rec.candidate.priority > 0.7);
        assert!(rec.candidate.similarity > 0.65);
    }
    assert!(per_source.values().all(|count| *count <= 2));
}

#[tokio::test]
async fn test_low_priority_destinations_are_never_recommended() {
    let pipeline = offline_pipeline(PipelineConfig::default());
    let records = vec![record("/a", &["rakes"], 0.7), record("/b", &["soil"], 0.2)];

    let report = pipeline
        .run_with_texts(&records, same_texts(&["/a", "/b"]))
        .await
        .unwrap();

    assert_eq!(report.summary.similarity_pairs, 1);
    assert!(report.recommendations.is_empty());
}

// ============================================================================
// Context Tests
// ============================================================================

#[tokio::test]
async fn test_template_used_when_no_sentence_and_no_generator() {
    let pipeline = offline_pipeline(PipelineConfig::default());
    let records = vec![
        record("/a", &["rakes"], 0.5),
        PageRecord::new("/b", vec!["widget".to_string()])
            .with_anchor_text("Widget Catalog")
            .with_priority(0.9),
    ];

    let report = pipeline
        .run_with_texts(&records, same_texts(&["/a", "/b"]))
        .await
        .unwrap();

    assert_eq!(report.recommendations.len(), 1);
    let rec = &report.recommendations[0];
    assert_eq!((rec.source(), rec.destination()), ("/a", "/b"));
    assert_eq!(
        rec.context,
        LinkContext::Template("Learn more about Widget Catalog.".to_string())
    );
    assert_eq!(report.summary.contexts_template, 1);
}

#[tokio::test]
async fn test_existing_sentence_preferred_over_generator() {
    let pipeline = offline_pipeline(PipelineConfig::default())
        .with_snippet_generator(Arc::new(EchoGenerator));
    let records = vec![
        record("/a", &["rakes"], 0.5),
        record("/b", &["soil"], 0.9),
    ];

    let report = pipeline
        .run_with_texts(&records, same_texts(&["/a", "/b"]))
        .await
        .unwrap();

    assert_eq!(report.recommendations.len(), 1);
    assert_eq!(
        report.recommendations[0].context.text(),
        "ADD TO EXISTING CONTENT: 'Spring planting needs good soil and sharp garden tools.'"
    );
    assert_eq!(report.summary.contexts_existing, 1);
}

#[tokio::test]
async fn test_generator_used_when_no_sentence_matches() {
    let pipeline = offline_pipeline(PipelineConfig::default())
        .with_snippet_generator(Arc::new(EchoGenerator));
    let records = vec![
        record("/a", &["rakes"], 0.5),
        PageRecord::new("/b", vec!["compost".to_string()])
            .with_anchor_text("compost bins")
            .with_priority(0.9),
    ];

    let report = pipeline
        .run_with_texts(&records, same_texts(&["/a", "/b"]))
        .await
        .unwrap();

    assert_eq!(
        report.recommendations[0].context,
        LinkContext::Generated("Browse our compost bins today.".to_string())
    );
    assert_eq!(report.summary.contexts_generated, 1);
}

// ============================================================================
// Event Tests
// ============================================================================

#[tokio::test]
async fn test_stage_events_are_ordered() {
    let (events, callback) = recording_callback();
    let pipeline = offline_pipeline(PipelineConfig::default()).with_event_callback(callback);
    let records = vec![record("/a", &["rakes"], 0.9), record("/b", &["soil"], 0.9)];

    pipeline
        .run_with_texts(&records, same_texts(&["/a", "/b"]))
        .await
        .unwrap();

    let stages: Vec<(bool, Stage)> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::StageStarted { stage, .. } => Some((true, *stage)),
            PipelineEvent::StageCompleted { stage, .. } => Some((false, *stage)),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            (true, Stage::Embed),
            (false, Stage::Embed),
            (true, Stage::Rank),
            (false, Stage::Rank),
            (true, Stage::Context),
            (false, Stage::Context),
        ]
    );
}

// ============================================================================
// Similarity Tests
// ============================================================================

#[tokio::test]
async fn test_related_pages_linked_and_unrelated_pages_not() {
    let pipeline =
        Pipeline::new(PipelineConfig::default()).with_embedder(Arc::new(TopicEmbedder));

    let report = pipeline
        .run_with_texts(&topic_records(), topic_texts())
        .await
        .unwrap();

    assert_eq!(report.summary.pages_embedded, 4);
    assert_eq!(
        recommended_pairs(&report),
        vec![
            ("/roses-care".to_string(), "/roses-pruning".to_string()),
            ("/roses-pruning".to_string(), "/roses-care".to_string()),
        ]
    );
    for rec in &report.recommendations {
        assert!(rec.candidate.similarity > 0.65);
    }
}

#[tokio::test]
async fn test_blank_texts_do_not_load_a_model() {
    let pipeline = Pipeline::new(PipelineConfig::default());
    let records = vec![record("/a", &["x"], 0.9), record("/b", &["y"], 0.9)];
    let texts = [("/a", "   "), ("/b", "\n\t")]
        .into_iter()
        .map(|(path, text)| (path.to_string(), text.to_string()))
        .collect();

    let report = pipeline.run_with_texts(&records, texts).await.unwrap();

    assert_eq!(report.summary.pages_embedded, 0);
    assert_eq!(report.summary.similarity_pairs, 0);
    assert!(report.recommendations.is_empty());
}

#[tokio::test]
#[ignore = "downloads the all-MiniLM-L6-v2 model"]
async fn test_sentence_model_links_related_pages_only() {
    let embedder = tokio::task::spawn_blocking(FastEmbedEmbedder::try_new)
        .await
        .unwrap()
        .unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).with_embedder(Arc::new(embedder));

    let report = pipeline
        .run_with_texts(&topic_records(), topic_texts())
        .await
        .unwrap();

    let pairs = recommended_pairs(&report);
    assert!(pairs.contains(&("/roses-pruning".to_string(), "/roses-care".to_string())));
    for (source, destination) in &pairs {
        let roses = |p: &str| p.starts_with("/roses");
        assert!(roses(source) && roses(destination), "{} -> {}", source, destination);
    }
}
