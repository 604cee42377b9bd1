// tests/window_scenarios.rs
//
// Aggregation invariants over synthetic comment streams (seeded, so runs are repeatable).

use rand::{rngs::StdRng, Rng, SeedableRng};

use danmaku_analyzer::record::CommentRecord;
use danmaku_analyzer::summary::{assemble, HOT_PERCENTILE, HOT_WINDOW_SECONDS};
use danmaku_analyzer::text::LexiconAnalyzer;
use danmaku_analyzer::window::{
    bucket, detect_hot_moments, distribution_table, hot_moment_threshold, MAX_HOT_MOMENTS,
};

fn synthetic(seed: u64, n: usize, span: f64) -> Vec<CommentRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let words = ["前方高能", "哈哈哈", "名场面", "awsl", "太精彩了", "无聊"];
    (0..n)
        .map(|_| {
            // bursty: a third of the comments land around 120 s
            let ts = if rng.random_bool(0.33) {
                120.0 + rng.random_range(0.0..15.0)
            } else {
                rng.random_range(0.0..span)
            };
            CommentRecord::new(words[rng.random_range(0..words.len())], ts)
        })
        .collect()
}

#[test]
fn bucket_counts_always_sum_to_input_len() {
    for seed in 0..5 {
        let recs = synthetic(seed, 500, 900.0);
        for w in [0.5, 1.0, 7.0, 30.0, 60.0, 1000.0] {
            let windows = bucket(&recs, w).unwrap();
            let total: usize = windows.iter().map(|x| x.count).sum();
            assert_eq!(total, recs.len(), "seed {seed} window {w}");
            assert!(windows.windows(2).all(|p| p[0].start < p[1].start));
            assert!(windows.iter().all(|x| x.samples.len() <= 5));
            assert!(windows.iter().all(|x| (x.end - x.start - w).abs() < 1e-9));
        }
    }
}

#[test]
fn hot_moments_are_sorted_and_above_threshold() {
    for seed in 0..5 {
        let recs = synthetic(seed, 800, 1200.0);
        let threshold = hot_moment_threshold(&recs, HOT_WINDOW_SECONDS, HOT_PERCENTILE)
            .unwrap()
            .unwrap();
        let hot = detect_hot_moments(&recs, HOT_WINDOW_SECONDS, HOT_PERCENTILE).unwrap();
        assert!(!hot.is_empty());
        assert!(hot.len() <= MAX_HOT_MOMENTS);
        assert!(hot.windows(2).all(|p| p[0].count >= p[1].count));
        assert!(hot.iter().all(|h| h.count as f64 >= threshold));
        // the burst around 120 s must be the top moment
        assert_eq!(hot[0].start, 120.0);
    }
}

#[test]
fn hundred_records_one_per_second() {
    let recs: Vec<_> = (0..100).map(|i| CommentRecord::new("x", i as f64)).collect();
    let windows = bucket(&recs, 10.0).unwrap();
    assert_eq!(windows.len(), 10);
    assert!(windows.iter().all(|w| w.count == 10));
    assert_eq!(hot_moment_threshold(&recs, 10.0, 90.0).unwrap(), Some(10.0));
    let hot = detect_hot_moments(&recs, 10.0, 90.0).unwrap();
    assert_eq!(hot.len(), 10);
    // ties keep window order
    let starts: Vec<f64> = hot.iter().map(|h| h.start).collect();
    assert_eq!(starts, (0..10).map(|i| i as f64 * 10.0).collect::<Vec<_>>());
}

#[test]
fn distribution_rows_match_buckets() {
    let recs = synthetic(42, 300, 600.0);
    let rows = distribution_table(&recs, 60.0).unwrap();
    let windows = bucket(&recs, 60.0).unwrap();
    assert_eq!(rows.len(), windows.len());
    for (row, w) in rows.iter().zip(&windows) {
        assert_eq!(row.time_start, w.start);
        assert_eq!(row.count, w.count);
        assert!(row.time_avg >= row.time_start && row.time_avg < row.time_end);
    }
}

#[test]
fn assemble_is_stable_across_calls() {
    let recs = synthetic(9, 400, 600.0);
    let a = LexiconAnalyzer::default();
    let first = serde_json::to_string(&assemble(&recs, 45.0, &a, &a).unwrap()).unwrap();
    let second = serde_json::to_string(&assemble(&recs, 45.0, &a, &a).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn garbled_timestamps_land_in_first_window() {
    let recs = vec![
        CommentRecord::from_raw("a", "not-a-time"),
        CommentRecord::from_raw("b", "0:00:05.00"),
        CommentRecord::new("c", f64::NAN),
    ];
    let windows = bucket(&recs, 30.0).unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].count, 3);
    assert_eq!(windows[0].samples, vec!["a", "b", "c"]);
}
