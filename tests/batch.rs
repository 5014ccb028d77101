//! Integration tests for `BatchCoordinator`: discovery, skip/force, failure
//! isolation, ordering and cancellation.

mod common;

use common::{fast_config, touch_pdf, FakeExtractor, ScriptedProvider};
use pdftranslate2md::{
    BatchCoordinator, BatchStatus, BatchSummary, ChannelProgressSink, ErrorKind, ProgressStatus,
    ProviderError,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn pdfs(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|n| {
            let p = dir.join(format!("{n}.pdf"));
            touch_pdf(&p);
            p
        })
        .collect()
}

#[tokio::test]
async fn existing_output_is_skipped_without_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("a.md"), "already translated").unwrap();
    let inputs = pdfs(dir.path(), &["a", "b"]);

    let provider = Arc::new(ScriptedProvider::new());
    let extractor = Arc::new(FakeExtractor::new(&["page text"]));
    let (sink, mut rx) = ChannelProgressSink::new();
    let config = fast_config()
        .provider(provider.clone())
        .progress_callback(Arc::new(sink))
        .build()
        .unwrap();

    let items = BatchCoordinator::new(config, extractor.clone())
        .run_batch(&inputs, &out, false)
        .await;

    assert_eq!(items[0].status, BatchStatus::SkippedExisting);
    assert_eq!(items[1].status, BatchStatus::Completed);
    assert_eq!(extractor.call_count(), 1);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(
        std::fs::read_to_string(out.join("a.md")).unwrap(),
        "already translated"
    );

    let first = rx.try_recv().unwrap();
    assert_eq!(first.document_id, "a");
    assert_eq!(first.status, ProgressStatus::Skipped);
}

#[tokio::test]
async fn force_retranslates_existing_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("a.md"), "stale").unwrap();
    let inputs = pdfs(dir.path(), &["a"]);

    let provider = Arc::new(ScriptedProvider::new());
    let config = fast_config().provider(provider.clone()).build().unwrap();

    let items = BatchCoordinator::new(config, Arc::new(FakeExtractor::new(&["fresh"])))
        .run_batch(&inputs, &out, true)
        .await;

    assert_eq!(items[0].status, BatchStatus::Completed);
    assert_eq!(items[0].pages, 1);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(std::fs::read_to_string(out.join("a.md")).unwrap(), "fresh\n");
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let inputs = pdfs(dir.path(), &["d1", "d2", "d3", "d4", "d5"]);

    let provider = Arc::new(
        ScriptedProvider::new().always_fail("poison", ProviderError::fatal("401 invalid api key")),
    );
    let extractor =
        Arc::new(FakeExtractor::new(&["ok page one", "ok page two"]).with_document("d3", &["poison"]));
    let config = fast_config()
        .provider(provider.clone())
        .batch_concurrency(2)
        .build()
        .unwrap();

    let items = BatchCoordinator::new(config, extractor)
        .run_batch(&inputs, &out, false)
        .await;

    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![
            BatchStatus::Completed,
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::Completed,
            BatchStatus::Completed,
        ]
    );
    // Results come back in input order regardless of completion order.
    for (item, input) in items.iter().zip(&inputs) {
        assert_eq!(&item.input_path, input);
    }

    let failure = items[2].error.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::FatalProvider);
    assert!(failure.message.contains("invalid api key"));
    assert!(!out.join("d3.md").exists());
    assert!(out.join("d5.md").exists());

    let summary = BatchSummary::from_items(&items);
    assert_eq!(summary.completed, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.pages, 8);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn directory_inputs_are_not_searched_recursively() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("papers");
    std::fs::create_dir_all(src.join("nested")).unwrap();
    pdfs(&src, &["b", "a"]);
    pdfs(&src.join("nested"), &["deep"]);
    std::fs::write(src.join("notes.txt"), "not a pdf").unwrap();
    let out = dir.path().join("out");

    let provider = Arc::new(ScriptedProvider::new());
    let config = fast_config().provider(provider.clone()).build().unwrap();

    let items = BatchCoordinator::new(config, Arc::new(FakeExtractor::new(&["x"])))
        .run_batch(&[src.clone()], &out, false)
        .await;

    let names: Vec<_> = items
        .iter()
        .map(|i| i.output_path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.md", "b.md"]);
    assert!(items.iter().all(|i| i.status == BatchStatus::Completed));
    assert!(!out.join("deep.md").exists());
}

#[tokio::test]
async fn missing_and_colliding_inputs_become_failed_items() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("one");
    let second = dir.path().join("two");
    std::fs::create_dir_all(&first).unwrap();
    std::fs::create_dir_all(&second).unwrap();
    let a1 = pdfs(&first, &["a"]).remove(0);
    let a2 = pdfs(&second, &["a"]).remove(0);
    let missing = dir.path().join("missing.pdf");
    let out = dir.path().join("out");

    let provider = Arc::new(ScriptedProvider::new());
    let config = fast_config().provider(provider.clone()).build().unwrap();

    let items = BatchCoordinator::new(config, Arc::new(FakeExtractor::new(&["x"])))
        .run_batch(&[missing.clone(), a1, a2], &out, false)
        .await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].input_path, missing);
    assert_eq!(items[0].status, BatchStatus::Failed);
    assert_eq!(items[0].error.as_ref().unwrap().kind, ErrorKind::InvalidInput);
    assert_eq!(items[1].status, BatchStatus::Completed);
    assert_eq!(items[2].status, BatchStatus::Failed);
    assert!(items[2].error.as_ref().unwrap().message.contains("collides"));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn extraction_failure_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = pdfs(dir.path(), &["broken", "good"]);
    let out = dir.path().join("out");

    let config = fast_config()
        .provider(Arc::new(ScriptedProvider::new()))
        .build()
        .unwrap();
    let extractor = Arc::new(FakeExtractor::new(&["x"]).failing("broken"));

    let items = BatchCoordinator::new(config, extractor)
        .run_batch(&inputs, &out, false)
        .await;

    assert_eq!(items[0].error.as_ref().unwrap().kind, ErrorKind::ExtractionFailure);
    assert_eq!(items[1].status, BatchStatus::Completed);
}

#[tokio::test]
async fn cancellation_marks_unstarted_items() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = pdfs(dir.path(), &["a", "b", "c"]);
    let out = dir.path().join("out");

    let config = fast_config().build().unwrap();
    let cancel = config.cancel.clone();
    let provider = Arc::new(ScriptedProvider::new().on_call(move |_| cancel.cancel()));
    let mut config = config;
    config.provider = Some(provider.clone());

    let items = BatchCoordinator::new(config, Arc::new(FakeExtractor::new(&["only page"])))
        .run_batch(&inputs, &out, false)
        .await;

    // The in-flight document stops before writing; the rest never start.
    assert!(items.iter().all(|i| i.status == BatchStatus::Cancelled));
    assert!(items.iter().all(|i| i.error.is_none()));
    assert_eq!(provider.call_count(), 1);
    assert!(!out.join("a.md").exists());

    let summary = BatchSummary::from_items(&items);
    assert_eq!(summary.cancelled, 3);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn images_default_under_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = pdfs(dir.path(), &["fig"]);
    let out = dir.path().join("out");

    let mut pages = common::pages(&["Figure"]);
    pages[0].images = vec![common::image(b"img")];
    let extractor = Arc::new(FakeExtractor::new(&[]).with_pages("fig", pages));
    let config = fast_config()
        .provider(Arc::new(ScriptedProvider::new()))
        .build()
        .unwrap();

    let items = BatchCoordinator::new(config, extractor)
        .run_batch(&inputs, &out, false)
        .await;

    assert_eq!(items[0].status, BatchStatus::Completed);
    assert!(out.join("images").join("fig").join("page1_img1.png").exists());
}
