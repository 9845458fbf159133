//! Integration tests for mediameta-probe

mod common;

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mediameta_probe::{
    AttributeName, AttributeValue, CancellationToken, Config, ContainerKind, ExtractionResult, ExtractionStatus,
    Extractor, FailureReason, FileHandle, Limits, Locator,
};

fn run(data: Vec<u8>) -> (ExtractionResult, BTreeMap<String, AttributeValue>) {
    run_with(&Extractor::default(), data)
}

fn run_with(extractor: &Extractor, data: Vec<u8>) -> (ExtractionResult, BTreeMap<String, AttributeValue>) {
    let mut sink = BTreeMap::new();
    let result = extractor.extract_handle(FileHandle::from_bytes(data), &mut sink, &CancellationToken::new());
    (result, sink)
}

fn number(sink: &BTreeMap<String, AttributeValue>, name: &str) -> Option<f64> {
    sink.get(name).and_then(AttributeValue::as_f64)
}

fn string<'a>(sink: &'a BTreeMap<String, AttributeValue>, name: &str) -> Option<&'a str> {
    sink.get(name).and_then(AttributeValue::as_str)
}

/// Every reported name is in the vocabulary and carries its declared type.
fn assert_conforms(sink: &BTreeMap<String, AttributeValue>) {
    for (key, value) in sink {
        let name: AttributeName = key.parse().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(value.attribute_type(), name.attribute_type(), "{key}");
        if let AttributeValue::Number(n) = value {
            assert!(n.is_finite() && *n >= 0.0, "{key} = {n}");
            if name.is_integral() {
                assert_eq!(n.fract(), 0.0, "{key} = {n}");
            }
        }
    }
}

#[test]
fn test_every_family_extracts_cleanly() {
    for (label, kind, data) in common::all() {
        let (result, sink) = run(data);
        assert_eq!(result.container, kind, "{label}");
        assert_eq!(result.status, ExtractionStatus::Success, "{label}: {:?}", result.notes);
        assert!(string(&sink, "container-format").is_some(), "{label}");
        assert!(number(&sink, "duration-seconds").is_some(), "{label}");
        assert_conforms(&sink);
    }
}

#[test]
fn test_unknown_content_is_empty_success() {
    for data in [Vec::new(), b"hello world, definitely not media".to_vec(), vec![0u8; 4096]] {
        let (result, sink) = run(data);
        assert_eq!(result.status, ExtractionStatus::Success);
        assert_eq!(result.container, ContainerKind::Unknown);
        assert!(sink.is_empty());
    }
}

#[test]
fn test_text_spelling_box_types_is_unknown() {
    for text in ["Let skip the intro.\n", "I'm free to go home now\n", "Now moov along\n"] {
        let (result, sink) = run(text.as_bytes().to_vec());
        assert_eq!(result.container, ContainerKind::Unknown, "{text:?}");
        assert_eq!(result.status, ExtractionStatus::Success);
        assert!(sink.is_empty(), "{text:?}: {sink:?}");
    }
}

#[test]
fn test_mp4_attributes() {
    let (result, sink) = run(common::mp4());
    assert_eq!(result.status, ExtractionStatus::Success, "{:?}", result.notes);
    assert_eq!(string(&sink, "container-format"), Some("MPEG-4"));
    assert_eq!(string(&sink, "title"), Some("Song"));
    assert_eq!(string(&sink, "language"), Some("eng"));
    assert_eq!(number(&sink, "track-count"), Some(1.0));
    assert!(string(&sink, "creation-date").is_some());
}

#[test]
fn test_larger_duration_wins_regardless_of_order() {
    for data in [common::mp4(), common::mp4_track_first()] {
        let (_, sink) = run(data);
        assert_eq!(number(&sink, "duration-seconds"), Some(125.4));
    }
}

#[test]
fn test_wave_attributes() {
    let (_, sink) = run(common::wave());
    assert_eq!(string(&sink, "container-format"), Some("WAVE"));
    assert_eq!(string(&sink, "audio-codec"), Some("PCM"));
    assert_eq!(string(&sink, "title"), Some("Take 1"));
    assert_eq!(number(&sink, "sample-rate"), Some(44_100.0));
    assert_eq!(number(&sink, "audio-channels"), Some(2.0));
    assert_eq!(number(&sink, "bits-per-sample"), Some(16.0));
    assert_eq!(number(&sink, "duration-seconds"), Some(0.1));
    assert_eq!(sink.get("has-audio"), Some(&AttributeValue::Boolean(true)));
    assert!(!sink.contains_key("has-video"));
}

#[test]
fn test_avi_attributes() {
    let (_, sink) = run(common::avi());
    assert_eq!(string(&sink, "video-codec"), Some("Xvid"));
    assert_eq!(string(&sink, "codec-name"), Some("Xvid"));
    assert_eq!(number(&sink, "width"), Some(640.0));
    assert_eq!(number(&sink, "height"), Some(480.0));
    assert_eq!(number(&sink, "frame-rate"), Some(25.0));
    assert_eq!(number(&sink, "duration-seconds"), Some(10.0));
    assert_eq!(sink.get("has-video"), Some(&AttributeValue::Boolean(true)));
}

#[test]
fn test_aiff_attributes() {
    let (_, sink) = run(common::aiff());
    assert_eq!(string(&sink, "container-format"), Some("AIFF"));
    assert_eq!(string(&sink, "title"), Some("Aiff Song"));
    assert_eq!(number(&sink, "sample-rate"), Some(44_100.0));
    assert_eq!(number(&sink, "duration-seconds"), Some(2.0));
}

#[test]
fn test_matroska_attributes() {
    let (_, sink) = run(common::mkv());
    assert_eq!(string(&sink, "container-format"), Some("WebM"));
    assert_eq!(string(&sink, "title"), Some("Movie"));
    assert_eq!(string(&sink, "artist"), Some("Director"));
    assert_eq!(string(&sink, "video-codec"), Some("AVC"));
    assert_eq!(number(&sink, "width"), Some(1920.0));
    assert_eq!(number(&sink, "height"), Some(1080.0));
    assert_eq!(number(&sink, "duration-seconds"), Some(125.4));
}

#[test]
fn test_mp3_attributes() {
    let (_, sink) = run(common::mp3(10));
    assert_eq!(string(&sink, "container-format"), Some("MPEG Audio"));
    assert_eq!(string(&sink, "audio-codec"), Some("MP3"));
    assert_eq!(string(&sink, "title"), Some("Track"));
    assert_eq!(string(&sink, "artist"), Some("Artist"));
    assert_eq!(string(&sink, "genre"), Some("Rock"));
    assert_eq!(number(&sink, "track-number"), Some(3.0));
    assert_eq!(number(&sink, "track-total"), Some(12.0));
    assert_eq!(number(&sink, "bit-rate"), Some(128_000.0));
    assert_eq!(number(&sink, "sample-rate"), Some(44_100.0));
    let duration = number(&sink, "duration-seconds").unwrap();
    assert!((duration - 0.260_625).abs() < 1e-9, "{duration}");
}

#[test]
fn test_mp3_tags_after_large_artwork() {
    let (result, sink) = run(common::mp3_with_artwork(2 * 1024 * 1024));
    assert_eq!(result.status, ExtractionStatus::Success, "{:?}", result.notes);
    assert_eq!(sink.get("has-artwork"), Some(&AttributeValue::Boolean(true)));
    assert_eq!(string(&sink, "title"), Some("After Art"));
    assert_eq!(string(&sink, "artist"), Some("Band"));
    assert_eq!(number(&sink, "bit-rate"), Some(128_000.0));
}

#[test]
fn test_flac_attributes() {
    let (_, sink) = run(common::flac());
    assert_eq!(string(&sink, "audio-codec"), Some("FLAC"));
    assert_eq!(string(&sink, "title"), Some("Flac Song"));
    assert_eq!(string(&sink, "encoder"), Some("reference libFLAC"));
    assert_eq!(number(&sink, "year"), Some(2004.0));
    assert_eq!(string(&sink, "creation-date"), Some("2004-05-01T00:00:00Z"));
    assert_eq!(number(&sink, "track-total"), Some(12.0));
    assert_eq!(number(&sink, "duration-seconds"), Some(10.0));
}

#[test]
fn test_ogg_attributes() {
    let (_, sink) = run(common::ogg_vorbis());
    assert_eq!(string(&sink, "container-format"), Some("Ogg"));
    assert_eq!(string(&sink, "audio-codec"), Some("Vorbis"));
    assert_eq!(string(&sink, "title"), Some("Ogg Song"));
    assert_eq!(number(&sink, "bit-rate"), Some(128_000.0));
    assert_eq!(number(&sink, "duration-seconds"), Some(10.0));
}

#[test]
fn test_truncation_at_every_offset_is_contained() {
    for (label, _, data) in common::all() {
        for cut in 0..data.len() {
            let (result, sink) = run(data[..cut].to_vec());
            assert!(
                !result.notes.iter().any(|n| n.starts_with("parser panicked")),
                "{label} cut at {cut}: {:?}",
                result.notes
            );
            assert!(!result.is_failure(), "{label} cut at {cut}: {:?}", result.status);
            assert_conforms(&sink);
        }
    }
}

#[test]
fn test_corrupted_bytes_are_contained() {
    for (label, _, data) in common::all() {
        for position in (0..data.len()).step_by(7) {
            let mut damaged = data.clone();
            damaged[position] ^= 0xA5;
            let (result, sink) = run(damaged);
            assert!(
                !result.notes.iter().any(|n| n.starts_with("parser panicked")),
                "{label} flipped at {position}"
            );
            assert_conforms(&sink);
        }
    }
}

#[test]
fn test_extraction_is_idempotent() {
    let extractor = Extractor::default();
    for (label, _, data) in common::all() {
        let (first, first_sink) = run_with(&extractor, data.clone());
        let (second, second_sink) = run_with(&extractor, data);
        assert_eq!(first, second, "{label}");
        assert_eq!(first_sink, second_sink, "{label}");
    }
}

#[test]
fn test_deep_nesting_is_bounded() {
    let (result, sink) = run(common::deep_mkv(2_000));
    assert!(
        matches!(
            result.status,
            ExtractionStatus::PartialSuccess | ExtractionStatus::Failure(FailureReason::Timeout)
        ),
        "{:?}",
        result.status
    );
    if result.status == ExtractionStatus::PartialSuccess {
        assert!(result.notes.iter().any(|n| n.contains("nesting")));
        assert_eq!(string(&sink, "title"), Some("Deep"));
    }
}

#[test]
fn test_zero_budget_times_out() {
    let extractor = Extractor::new(
        Limits {
            time_budget_ms: 0,
            ..Limits::default()
        },
        Config::default().mapping_table(),
    );
    let (result, sink) = run_with(&extractor, common::flac());
    assert_eq!(result.status, ExtractionStatus::Failure(FailureReason::Timeout));
    assert!(sink.is_empty());
}

#[test]
fn test_timeout_while_parsing_keeps_mapped_attributes() {
    let extractor = Extractor::new(
        Limits {
            time_budget_ms: 30,
            ..Limits::default()
        },
        Config::default().mapping_table(),
    );
    let data = common::mkv_with_voids("Kept", 4_000_000);

    let started = Instant::now();
    let (result, sink) = run_with(&extractor, data);
    let elapsed = started.elapsed();

    assert_eq!(result.status, ExtractionStatus::Failure(FailureReason::Timeout));
    assert_eq!(result.container, ContainerKind::Matroska);
    assert_eq!(string(&sink, "title"), Some("Kept"));
    assert_eq!(string(&sink, "container-format"), Some("Matroska"));
    assert_conforms(&sink);
    assert!(elapsed < Duration::from_secs(1), "{elapsed:?}");
}

#[test]
fn test_cancelled_token_times_out() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut sink = BTreeMap::new();
    let result = Extractor::default().extract_handle(FileHandle::from_bytes(common::mkv()), &mut sink, &cancel);
    assert_eq!(result.status, ExtractionStatus::Failure(FailureReason::Timeout));
}

#[test]
fn test_unmapped_keys_never_surface() {
    let (result, sink) = run(common::flac_with_comments(&["TITLE=Kept", "REPLAYGAIN_TRACK_GAIN=-6.2 dB", "MOOD=calm"]));
    assert_eq!(result.status, ExtractionStatus::Success);
    assert_eq!(string(&sink, "title"), Some("Kept"));
    assert!(!sink.values().any(|v| v.as_str() == Some("calm")));
    assert_conforms(&sink);
}

#[test]
fn test_configured_rules_extend_the_table() {
    let config = Config::from_json(r#"{"rules": [{"family": "flac", "key": "vorbis:MOOD", "target": "comment"}]}"#).unwrap();
    let extractor = Extractor::from_config(&config);
    let (_, sink) = run_with(&extractor, common::flac_with_comments(&["MOOD=calm"]));
    assert_eq!(string(&sink, "comment"), Some("calm"));
}

#[test]
fn test_missing_file_is_io_failure() {
    let mut sink = BTreeMap::new();
    let result = mediameta_probe::extract("/nonexistent/path/movie.mkv", &mut sink, &CancellationToken::new());
    assert!(matches!(result.status, ExtractionStatus::Failure(FailureReason::Io(_))));
    assert!(result.attributes.is_empty());
    assert!(sink.is_empty());
}

#[test]
fn test_extract_from_path_and_file_url() {
    let mut file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
    file.write_all(&common::ogg_vorbis()).unwrap();
    file.flush().unwrap();

    let mut by_path = BTreeMap::new();
    let path = file.path().to_str().unwrap();
    let result = mediameta_probe::extract(path, &mut by_path, &CancellationToken::new());
    assert_eq!(result.status, ExtractionStatus::Success, "{:?}", result.notes);
    assert_eq!(result.container, ContainerKind::Ogg);

    let url = url::Url::from_file_path(file.path()).unwrap();
    let mut by_url = BTreeMap::new();
    let locator = Locator::parse(url.as_str()).unwrap();
    Extractor::default().extract(&locator, &mut by_url, &CancellationToken::new());
    assert_eq!(by_path, by_url);
}

#[test]
fn test_extension_is_never_consulted() {
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    file.write_all(&common::wave()).unwrap();
    file.flush().unwrap();

    let mut sink = BTreeMap::new();
    let result = Extractor::default().extract_path(file.path(), &mut sink, &CancellationToken::new());
    assert_eq!(result.container, ContainerKind::Wave);
}

#[test]
fn test_concurrent_extractions_share_one_extractor() {
    let extractor = Arc::new(Extractor::default());
    let expected: Vec<_> = common::all().into_iter().map(|(_, _, data)| run(data).1).collect();

    std::thread::scope(|scope| {
        let handles: Vec<_> = common::all()
            .into_iter()
            .map(|(_, _, data)| {
                let extractor = Arc::clone(&extractor);
                scope.spawn(move || run_with(&extractor, data).1)
            })
            .collect();
        for (handle, expected) in handles.into_iter().zip(expected) {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
