//! End-to-end tests for the load pipeline

use hatch_runtime::{
    AssetKind, Diagnostic, HatchConfig, MemoryUserData, Pipeline, RecordingHost,
    RecordingRuntime, RecordingSink, RuntimeError, RuntimeOverrides, UserDataKey, UserDataStore,
};
use serde_json::json;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zip::write::SimpleFileOptions;

fn create_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

const ROOT: &str = r#"{
    "title": "Capital cities",
    "language": "en",
    "mainLibrary": "H5P.Quiz",
    "embedTypes": ["div"],
    "preloadedDependencies": [
        {"machineName": "H5P.Quiz", "majorVersion": 1, "minorVersion": 0},
        {"machineName": "FontAwesome", "majorVersion": 4, "minorVersion": 5}
    ]
}"#;

const QUIZ: &str = r#"{
    "machineName": "H5P.Quiz",
    "preloadedJs": [{"path": "scripts/quiz.js"}],
    "preloadedCss": [{"path": "styles/quiz.css"}],
    "preloadedDependencies": [
        {"machineName": "H5P.Question", "majorVersion": 1, "minorVersion": 0},
        {"machineName": "FontAwesome", "majorVersion": 4, "minorVersion": 5}
    ]
}"#;

const QUESTION: &str = r#"{
    "machineName": "H5P.Question",
    "preloadedJs": [{"path": "question.js"}, {"path": "feedback.js"}],
    "preloadedCss": [{"path": "styles/question.css"}],
    "preloadedDependencies": [
        {"machineName": "H5P.JoubelUI", "majorVersion": 1, "minorVersion": 0}
    ]
}"#;

const JOUBEL: &str = r#"{
    "machineName": "H5P.JoubelUI",
    "preloadedJs": [{"path": "joubel.js"}],
    "preloadedDependencies": [
        {"machineName": "FontAwesome", "majorVersion": 4, "minorVersion": 5},
        {"machineName": "H5P.Question", "majorVersion": 1, "minorVersion": 0}
    ]
}"#;

const FONT_AWESOME: &str = r#"{
    "machineName": "FontAwesome",
    "preloadedCss": [{"path": "fa.css"}]
}"#;

fn quiz_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("h5p.json", ROOT),
        ("content/content.json", r#"{"question": "Capital of France?"}"#),
        ("content/images/paris.png", "png-bytes"),
        ("H5P.Quiz-1.0/library.json", QUIZ),
        ("H5P.Quiz-1.0/scripts/quiz.js", "var Quiz = {};"),
        ("H5P.Quiz-1.0/styles/quiz.css", ".quiz{background:url(\"../images/bg.png\")}"),
        ("H5P.Quiz-1.0/images/bg.png", "bg"),
        ("H5P.Question-1.0/library.json", QUESTION),
        ("H5P.Question-1.0/question.js", "var Question = {};"),
        ("H5P.Question-1.0/feedback.js", "var Feedback = {};"),
        (
            "H5P.Question-1.0/styles/question.css",
            ".ok{background:url(../images/check.svg)} .x{background:url('missing.png')}",
        ),
        ("H5P.Question-1.0/images/check.svg", "<svg/>"),
        ("H5P.JoubelUI-1.0/library.json", JOUBEL),
        ("H5P.JoubelUI-1.0/joubel.js", "var Joubel = {};"),
        ("FontAwesome-4.5/library.json", FONT_AWESOME),
        ("FontAwesome-4.5/fa.css", "@font-face{src:url('fonts/fa.woff2') format('woff2')}"),
        ("FontAwesome-4.5/fonts/fa.woff2", "woff2"),
    ]
}

struct Harness {
    host: Arc<RecordingHost>,
    runtime: RecordingRuntime,
    user_data: Arc<MemoryUserData>,
    sink: Arc<RecordingSink>,
}

impl Harness {
    fn new(host: RecordingHost) -> Self {
        Self {
            host: Arc::new(host),
            runtime: RecordingRuntime::new(),
            user_data: Arc::new(MemoryUserData::new()),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    async fn load(&self, bytes: Vec<u8>) -> Result<hatch_runtime::LoadReport, RuntimeError> {
        Pipeline::new(HatchConfig::default())
            .load(
                "quiz.h5p",
                |_| async move { Ok::<_, std::io::Error>(bytes) },
                self.host.clone(),
                &self.runtime,
                self.user_data.clone(),
                self.sink.clone(),
            )
            .await
    }
}

#[tokio::test]
async fn test_end_to_end_load() {
    let harness = Harness::new(RecordingHost::new());
    let report = harness.load(create_archive(&quiz_files())).await.unwrap();

    assert_eq!(
        report.order,
        vec!["FontAwesome-4.5", "H5P.JoubelUI-1.0", "H5P.Question-1.0", "H5P.Quiz-1.0"]
    );
    assert_eq!(report.styles_loaded, 3);
    assert_eq!(report.scripts_loaded, 4);

    // Every style lands before the first script
    let injections = harness.host.injections();
    let first_script = injections
        .iter()
        .position(|i| i.kind == AssetKind::Script)
        .unwrap();
    assert!(injections[..first_script]
        .iter()
        .all(|i| i.kind == AssetKind::Style));
    assert_eq!(
        harness.host.injected(AssetKind::Style),
        vec![
            "FontAwesome-4.5/fa.css",
            "H5P.Question-1.0/styles/question.css",
            "H5P.Quiz-1.0/styles/quiz.css"
        ]
    );

    let scripts = harness.host.injected(AssetKind::Script);
    assert_eq!(scripts[0], "H5P.JoubelUI-1.0/joubel.js");
    assert!(scripts[1..3].contains(&"H5P.Question-1.0/question.js".to_string()));
    assert!(scripts[1..3].contains(&"H5P.Question-1.0/feedback.js".to_string()));
    assert_eq!(scripts[3], "H5P.Quiz-1.0/scripts/quiz.js");

    // The cycle JoubelUI -> Question was truncated, one stylesheet reference is dangling
    assert!(report.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::CyclicDependency { from, to } if from == "H5P.JoubelUI-1.0" && to == "H5P.Question-1.0"
    )));
    assert!(report.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::UnresolvedStylesheetReference { reference, .. } if reference == "missing.png"
    )));

    let init = harness.runtime.take_init().unwrap();
    assert_eq!(init.main_package.as_deref(), Some("H5P.Quiz-1.0"));
    assert_eq!(init.root.title, "Capital cities");
    assert_eq!(
        init.content_json.as_deref(),
        Some(r#"{"question": "Capital of France?"}"#)
    );
}

#[tokio::test]
async fn test_stylesheets_reference_handles() {
    let pipeline = Pipeline::default();
    let archive = pipeline
        .fetch("quiz.h5p", |_| async {
            Ok::<_, std::io::Error>(create_archive(&quiz_files()))
        })
        .await
        .unwrap();
    let prepared = pipeline.prepare(archive).await.unwrap();

    let fa = prepared.store.package("FontAwesome-4.5").unwrap();
    let font = fa.handle("fonts/fa.woff2").unwrap();
    let css = prepared
        .store
        .blob(fa.handle("fa.css").unwrap())
        .unwrap()
        .text()
        .unwrap();
    assert_eq!(
        css,
        format!("@font-face{{src:url('{}') format('woff2')}}", font)
    );

    // The style plan carries the rewritten sheet
    let tier = &prepared.styles.tiers[0];
    assert_eq!(tier.package_path, "FontAwesome-4.5");
    assert_eq!(&tier.assets[0].handle, fa.handle("fa.css").unwrap());

    // Nothing handed to the host is an archive path
    let harness = Harness::new(RecordingHost::new());
    pipeline
        .run(
            prepared,
            harness.host.clone(),
            &harness.runtime,
            harness.user_data.clone(),
            harness.sink.clone(),
        )
        .await
        .unwrap();
    for injection in harness.host.injections() {
        assert!(injection.handle.as_str().starts_with("hatch:"));
    }

    let overrides = harness.runtime.take_init().unwrap().overrides;
    let content_type = overrides.content_type("FontAwesome").unwrap();
    assert_eq!(content_type.library_path(), "hatch:lib/FontAwesome-4.5");
    assert!(content_type.library_file_path("fonts/fa.woff2").is_some());
}

#[tokio::test]
async fn test_loader_invoked_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let bytes = create_archive(&quiz_files());
    let harness = Harness::new(RecordingHost::new());

    let counter = calls.clone();
    Pipeline::default()
        .load(
            "quiz.h5p",
            move |origin| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(origin, "quiz.h5p");
                Ok::<_, std::io::Error>(bytes)
            },
            harness.host.clone(),
            &harness.runtime,
            harness.user_data.clone(),
            harness.sink.clone(),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_descriptor_aborts_before_any_tier() {
    let files: Vec<_> = quiz_files()
        .into_iter()
        .filter(|(name, _)| *name != "FontAwesome-4.5/library.json")
        .collect();
    let harness = Harness::new(RecordingHost::new());

    let error = harness.load(create_archive(&files)).await.unwrap_err();
    assert_eq!(error.missing_entry(), Some("FontAwesome-4.5/library.json"));
    assert!(harness.host.injections().is_empty());
    assert!(!harness.runtime.is_initialized());
}

#[tokio::test]
async fn test_unmatched_main_library_still_loads() {
    let root = ROOT.replace(r#""mainLibrary": "H5P.Quiz""#, r#""mainLibrary": "H5P.Essay""#);
    let files: Vec<_> = quiz_files()
        .into_iter()
        .map(|(name, data)| (name, if name == "h5p.json" { root.as_str() } else { data }))
        .collect();
    let harness = Harness::new(RecordingHost::new());

    let report = harness.load(create_archive(&files)).await.unwrap();
    assert_eq!(report.scripts_loaded, 4);
    assert!(report.diagnostics.iter().any(|d| matches!(
        d,
        Diagnostic::UnmatchedMainLibrary { main_library } if main_library == "H5P.Essay"
    )));

    let init = harness.runtime.take_init().unwrap();
    assert_eq!(init.main_package, None);
}

#[tokio::test]
async fn test_script_failure_prevents_init() {
    let harness = Harness::new(
        RecordingHost::new().with_failing_script("H5P.Question-1.0", "feedback.js"),
    );

    let error = harness.load(create_archive(&quiz_files())).await.unwrap_err();
    match error {
        RuntimeError::ScriptLoad { package, path, .. } => {
            assert_eq!(package, "H5P.Question-1.0");
            assert_eq!(path, "feedback.js");
        }
        other => panic!("expected script failure, got {:?}", other),
    }

    // Styles and the earlier tier are not rolled back
    assert_eq!(harness.host.injected(AssetKind::Style).len(), 3);
    let scripts = harness.host.injected(AssetKind::Script);
    assert!(scripts.contains(&"H5P.JoubelUI-1.0/joubel.js".to_string()));
    assert!(!scripts.contains(&"H5P.Quiz-1.0/scripts/quiz.js".to_string()));
    assert!(!harness.runtime.is_initialized());
}

#[tokio::test]
async fn test_fetch_failure() {
    let harness = Harness::new(RecordingHost::new());
    let result = Pipeline::default()
        .load(
            "remote.h5p",
            |_| async { Err::<Vec<u8>, _>("connection refused") },
            harness.host.clone(),
            &harness.runtime,
            harness.user_data.clone(),
            harness.sink.clone(),
        )
        .await;

    assert!(matches!(result, Err(RuntimeError::Source { origin, .. }) if origin == "remote.h5p"));
}

#[tokio::test]
async fn test_not_an_archive() {
    let harness = Harness::new(RecordingHost::new());
    let result = harness.load(b"plain text".to_vec()).await;
    assert!(matches!(
        result,
        Err(RuntimeError::Archive(hatch_pm::ArchiveError::Format(_)))
    ));
}

#[tokio::test]
async fn test_path_resolution_and_user_data() {
    let harness = Harness::new(RecordingHost::new());
    harness.load(create_archive(&quiz_files())).await.unwrap();
    let overrides = harness.runtime.take_init().unwrap().overrides;

    let paris = overrides.resolve_path("images/paris.png").unwrap();
    assert_eq!(overrides.resolve_path("content/images/paris.png"), Some(paris));
    assert!(overrides.resolve_path("images/missing.png").is_none());
    assert!(overrides.resolve_path("https://example.com/a.png").is_none());
    assert!(overrides.resolve_path("content.json").is_none());

    let key = UserDataKey::new("1", "state", "sub-7");
    overrides.user_data_set(key.clone(), json!({"answered": true}));
    assert_eq!(harness.user_data.get(&key), Some(json!({"answered": true})));
    assert_eq!(overrides.user_data_get(&key), Some(json!({"answered": true})));
    assert!(overrides.user_data_delete(&key));
    assert!(harness.user_data.is_empty());

    assert!(overrides.content_type("H5P.Missing").is_none());
}

fn statement(verb: &str) -> serde_json::Value {
    json!({
        "actor": {"name": "learner"},
        "verb": {"id": format!("http://adlnet.gov/expapi/verbs/{}", verb)}
    })
}

#[tokio::test(start_paused = true)]
async fn test_event_policy() {
    let harness = Harness::new(RecordingHost::new());
    harness.load(create_archive(&quiz_files())).await.unwrap();
    let overrides = harness.runtime.take_init().unwrap().overrides;

    // Deny-listed verbs are never reported
    assert!(!overrides.dispatch_event(statement("attempted")));
    assert!(!overrides.dispatch_event(statement("progressed")));
    assert!(!overrides.dispatch_event(json!({"no": "verb"})));

    // Ten interactions inside five seconds collapse to leading + trailing
    for _ in 0..10 {
        assert!(overrides.dispatch_event(statement("interacted")));
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
    assert!(overrides.dispatch_event(statement("answered")));
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        harness.sink.verbs(),
        vec!["interacted", "answered", "interacted"]
    );
}
