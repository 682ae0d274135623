//! Server calls flowing through the dispatcher into the store.

mod common;

use std::sync::Arc;

use common::{dispatcher, run, MockApi};
use trackview_core::error::{ApiError, ErrorCode};
use trackview_core::lifecycle::RequestView;
use trackview_core::models::{
    ArtifactFile, ArtifactListing, Experiment, ModelVersion, RunStatus, SearchRunsPage,
    SearchRunsRequest, TagTarget,
};

#[tokio::test]
async fn test_list_experiments_settles_request() {
    let api = Arc::new(MockApi::new());
    *api.experiments.lock().unwrap() = vec![Experiment::new("0", "Default"), Experiment::new("1", "cifar")];
    let d = dispatcher(api.clone());

    let id = d.list_experiments().await;

    let store = d.store().read().await;
    let state = store.lifecycle().get(&id).unwrap();
    assert!(!state.active);
    assert!(state.error.is_none());
    assert_eq!(state.data.as_ref().unwrap().as_array().unwrap().len(), 2);
    assert_eq!(store.entities().experiments().len(), 2);
    assert_eq!(store.lifecycle().view(&[id]), RequestView::Ready);
}

#[tokio::test]
async fn test_missing_run_renders_not_found() {
    let api = Arc::new(MockApi::new());
    let d = dispatcher(api);

    let id = d.get_run("nope").await;

    let store = d.store().read().await;
    assert!(store.entities().run("nope").is_none());
    match store.lifecycle().view(&[id]) {
        RequestView::NotFound(message) => assert!(message.contains("nope")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_server_failure_renders_generic_error() {
    let api = Arc::new(MockApi::new());
    *api.fail_with.lock().unwrap() = Some(ApiError::new(ErrorCode::InternalError, "db down").with_status(500));
    let d = dispatcher(api);

    let id = d.list_experiments().await;

    let store = d.store().read().await;
    assert_eq!(store.lifecycle().view(&[id.clone()]), RequestView::Failed("db down".into()));
    assert_eq!(store.lifecycle().first_error(&[id]).unwrap().status, Some(500));
}

#[tokio::test]
async fn test_load_more_uses_next_page_token() {
    let api = Arc::new(MockApi::new());
    {
        let mut pages = api.pages.lock().unwrap();
        pages.insert(
            None,
            SearchRunsPage {
                runs: vec![run("a", "0", RunStatus::Finished)],
                next_page_token: Some("p2".into()),
            },
        );
        pages.insert(
            Some("p2".into()),
            SearchRunsPage {
                runs: vec![run("b", "0", RunStatus::Finished)],
                next_page_token: None,
            },
        );
    }
    let d = dispatcher(api.clone());
    let request = SearchRunsRequest {
        experiment_ids: vec!["0".into()],
        ..Default::default()
    };

    d.search_runs(&request).await;
    assert!(d.load_more_runs(&request).await.is_some());
    assert!(d.load_more_runs(&request).await.is_none());

    assert_eq!(api.calls(), vec!["search_runs:None", "search_runs:Some(\"p2\")"]);
    let store = d.store().read().await;
    assert_eq!(store.entities().runs_for_experiment("0").len(), 2);
}

#[tokio::test]
async fn test_tag_round_trip_through_server() {
    let api = Arc::new(MockApi::new());
    let d = dispatcher(api.clone());
    let target = TagTarget::Run("r1".into());

    d.set_tag(&target, "note", "hello").await;
    assert_eq!(
        d.store().read().await.entities().run_tags("r1").unwrap()["note"].value,
        "hello"
    );

    d.delete_tag(&target, "note").await;
    assert!(d.store().read().await.entities().run_tags("r1").is_none());
}

#[tokio::test]
async fn test_rejected_tag_delete_keeps_tag() {
    let api = Arc::new(MockApi::new());
    let d = dispatcher(api.clone());
    let target = TagTarget::Experiment("0".into());
    d.set_tag(&target, "owner", "me").await;

    *api.fail_with.lock().unwrap() = Some(ApiError::new(ErrorCode::PermissionDenied, "nope"));
    d.delete_tag(&target, "owner").await;

    assert!(d.store().read().await.entities().experiment_tags("0").is_some());
}

#[tokio::test]
async fn test_artifact_browsing_and_model_versions() {
    let api = Arc::new(MockApi::new());
    api.artifacts.lock().unwrap().insert(
        ("r1".into(), "".into()),
        ArtifactListing {
            root_uri: Some("s3://bucket/0/r1/artifacts".into()),
            files: vec![ArtifactFile::dir("model"), ArtifactFile::file("notes.txt", 5)],
        },
    );
    api.artifacts.lock().unwrap().insert(
        ("r1".into(), "model".into()),
        ArtifactListing {
            root_uri: None,
            files: vec![ArtifactFile::file("model/MLmodel", 120)],
        },
    );
    *api.model_versions.lock().unwrap() = vec![ModelVersion {
        name: "classifier".into(),
        version: "3".into(),
        source: "s3://bucket/0/r1/artifacts/model/".into(),
        run_id: "r1".into(),
        status: Some("READY".into()),
        creation_timestamp: None,
    }];
    let d = dispatcher(api.clone());

    d.list_artifacts("r1", None).await;
    d.list_artifacts("r1", Some("model")).await;
    d.search_model_versions_for_runs(&["r1".into()]).await;

    assert!(api.calls().contains(&"search_model_versions:run_id IN ('r1')".to_string()));
    let store = d.store().read().await;
    let tree = store.entities().artifact_tree("r1").unwrap();
    assert!(tree.find("model/MLmodel").is_some());
    let matched = store.entities().model_versions_at("r1", "model");
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].version, "3");
}
