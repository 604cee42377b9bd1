// tests/ai_mock.rs
//
// Narrative commentary with the mock and disabled clients. Tests that touch
// AI_TEST_MODE run serially so the env var does not leak between them.

use serial_test::serial;

use danmaku_analyzer::ai::{analyze_with_ai, build_client_from_config, DisabledClient, MockClient};
use danmaku_analyzer::config::AiConfig;
use danmaku_analyzer::record::CommentRecord;
use danmaku_analyzer::text::LexiconAnalyzer;
use danmaku_analyzer::{assemble, summary::SummaryReport};

fn records(n: usize) -> Vec<CommentRecord> {
    (0..n)
        .map(|i| CommentRecord::new(format!("弹幕{i} 太精彩了"), (i % 300) as f64))
        .collect()
}

fn report_for(recs: &[CommentRecord]) -> SummaryReport {
    let lex = LexiconAnalyzer::default();
    assemble(recs, 60.0, &lex, &lex)
        .unwrap()
        .report()
        .cloned()
        .expect("non-empty input yields a report")
}

#[tokio::test]
#[serial]
async fn mock_mode_env_selects_mock_client() {
    std::env::set_var("AI_TEST_MODE", "mock");
    let client = build_client_from_config(&AiConfig::default()).unwrap();
    std::env::remove_var("AI_TEST_MODE");
    assert_eq!(client.provider_name(), "mock");
    let out = client.complete("prompt", "system").await.unwrap();
    assert!(!out.is_empty());
}

#[tokio::test]
#[serial]
async fn disabled_config_yields_disabled_client() {
    std::env::remove_var("AI_TEST_MODE");
    let client = build_client_from_config(&AiConfig::default()).unwrap();
    assert_eq!(client.provider_name(), "disabled");
    assert!(client.complete("p", "s").await.is_err());
}

#[tokio::test]
async fn sections_use_configured_sample_sizes() {
    let recs = records(500);
    let report = report_for(&recs);
    let texts: Vec<&str> = recs.iter().map(|r| r.text.as_str()).collect();
    let mock = MockClient::new("看起来观众很开心");

    let ai = analyze_with_ai(&mock, &AiConfig::default(), &report, &texts).await;

    assert_eq!(ai.provider, "mock");
    assert_eq!(ai.sentiment.sample_count, 50);
    assert_eq!(ai.themes.sample_count, 100);
    assert_eq!(ai.comprehensive.sample_count, 30);
    let hot = ai.hot_moments.expect("report has hot moments");
    assert!(hot.sample_count <= 5);
    assert_eq!(hot.analysis.as_deref(), Some("看起来观众很开心"));

    let prompts = mock.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[0].contains("弹幕0 太精彩了"));
    assert!(!prompts[0].contains("弹幕50 太精彩了"));
    assert!(prompts[2].contains("热点1:"));
}

#[tokio::test]
async fn short_input_caps_sample_counts() {
    let recs = records(12);
    let report = report_for(&recs);
    let texts: Vec<&str> = recs.iter().map(|r| r.text.as_str()).collect();
    let ai = analyze_with_ai(&MockClient::new("ok"), &AiConfig::default(), &report, &texts).await;
    assert_eq!(ai.sentiment.sample_count, 12);
    assert_eq!(ai.themes.sample_count, 12);
    assert_eq!(ai.comprehensive.sample_count, 12);
}

#[tokio::test]
async fn disabled_client_reports_errors_per_section() {
    let recs = records(40);
    let report = report_for(&recs);
    let texts: Vec<&str> = recs.iter().map(|r| r.text.as_str()).collect();
    let ai = analyze_with_ai(&DisabledClient, &AiConfig::default(), &report, &texts).await;

    assert_eq!(ai.provider, "disabled");
    for section in [&ai.sentiment, &ai.themes, &ai.comprehensive] {
        assert!(section.analysis.is_none());
        assert!(section.error.as_deref().unwrap().contains("disabled"));
    }
    let json = serde_json::to_value(&ai).unwrap();
    assert!(json["sentiment"].get("analysis").is_none());
}

#[tokio::test]
async fn no_texts_short_circuits() {
    let recs = records(3);
    let report = report_for(&recs);
    let mock = MockClient::new("unused");
    let ai = analyze_with_ai(&mock, &AiConfig::default(), &report, &[]).await;
    assert!(mock.prompts().is_empty());
    assert!(ai.hot_moments.is_none());
    assert_eq!(ai.sentiment.error.as_deref(), Some("no data"));
}
