//! HTTP surface against an in-memory orchestrator

use parostok_core::{AdapterSet, CatalogConfig, Orchestrator};
use parostok_provenance::{Attribute, JobId, Source, SourceId};
use parostok_server::api::{Accepted, JobView};
use parostok_server::routes;
use parostok_store::{MemoryStore, SnapshotPublisher};
use parostok_test_utils::{
    candidate, fixed_time, observed, registry, ScriptedAdapter, UA_PRODUCT_URL,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

struct Harness {
    orchestrator: Orchestrator,
    config: Arc<CatalogConfig>,
    _dir: tempfile::TempDir,
    snapshot: std::path::PathBuf,
}

fn harness() -> Harness {
    let sources = vec![
        Source::enabled("scripted_ua", "UA"),
        Source::disabled("scripted_us", "US", "ToS pending"),
    ];
    let mut config = CatalogConfig::new().with_sources(sources.clone());
    config.default_markets = vec!["UA".into(), "US".into()];
    config.default_sources = vec![SourceId::new("scripted_ua"), SourceId::new("scripted_us")];

    let adapter = ScriptedAdapter::returning(
        "scripted_ua",
        vec![candidate(
            "ДКС 3747",
            "UA",
            vec![observed("fao", "260"), observed("maturity_group", "середньорання")],
        )],
    );
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("catalog_fallback.json");
    let orchestrator = Orchestrator::builder(registry(sources), Arc::new(MemoryStore::new()))
        .adapters(AdapterSet::new().with(adapter))
        .publisher(SnapshotPublisher::new(snapshot.clone()))
        .build();

    Harness {
        orchestrator,
        config: Arc::new(config),
        _dir: dir,
        snapshot,
    }
}

impl Harness {
    fn api(
        &self,
    ) -> impl warp::Filter<Extract = (impl warp::Reply,), Error = std::convert::Infallible> + Clone
    {
        routes(self.orchestrator.clone(), Arc::clone(&self.config))
    }
}

fn body<B: AsRef<[u8]>>(res: &warp::http::Response<B>) -> Value {
    serde_json::from_slice(res.body().as_ref()).unwrap()
}

async fn poll_until_terminal(h: &Harness, job_id: JobId) -> JobView {
    let api = h.api();
    for _ in 0..400 {
        let res = warp::test::request()
            .method("GET")
            .path(&format!("/update/{job_id}"))
            .reply(&api)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let view: JobView = serde_json::from_slice(res.body()).unwrap();
        if view.ended_at.is_some() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let res = warp::test::request().path("/health").reply(&h.api()).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(&res)["status"], "ok");
}

#[tokio::test]
async fn update_is_accepted_and_polled_to_completion() {
    let h = harness();
    let res = warp::test::request()
        .method("POST")
        .path("/update")
        .json(&json!({}))
        .reply(&h.api())
        .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: Accepted = serde_json::from_slice(res.body()).unwrap();

    let view = poll_until_terminal(&h, accepted.job_id).await;
    assert_eq!(view.status.as_str(), "succeeded");
    assert_eq!(view.counts.added, 2);
    let messages: Vec<&str> = view.step_logs.iter().map(|l| l.message.as_str()).collect();
    assert_eq!(messages[0], "Starting catalog sync job.");
    assert!(messages.iter().any(|m| m.contains("ToS pending")));

    let res = warp::test::request().path("/catalog").reply(&h.api()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let catalog = body(&res);
    let ua = catalog["crops"]["UA"].as_array().unwrap();
    assert_eq!(ua.len(), 1);
    assert_eq!(ua[0]["name"], "ДКС 3747");
    assert_eq!(ua[0]["attributes"].as_array().unwrap().len(), 2);
    assert!(h.snapshot.exists());
}

#[tokio::test]
async fn status_wire_shape() {
    let h = harness();
    let res = warp::test::request()
        .method("POST")
        .path("/update")
        .json(&json!({ "markets": ["UA"], "sources": ["scripted_ua"], "dry_run": true }))
        .reply(&h.api())
        .await;
    let accepted: Accepted = serde_json::from_slice(res.body()).unwrap();
    poll_until_terminal(&h, accepted.job_id).await;

    let res = warp::test::request()
        .path(&format!("/update/{}", accepted.job_id))
        .reply(&h.api())
        .await;
    let view = body(&res);
    assert_eq!(view["status"], "succeeded");
    assert!(view["step_logs"][0]["message"].is_string());
    assert!(view["step_logs"][0]["at"].is_string());
    assert_eq!(view["counts"]["added"], 0);
}

#[tokio::test]
async fn unknown_and_garbage_job_ids_are_not_found() {
    let h = harness();
    for path in [format!("/update/{}", JobId::new()), "/update/not-a-job".to_string()] {
        let res = warp::test::request().path(&path).reply(&h.api()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
        assert!(body(&res)["error"].as_str().unwrap().contains("job not found"));
    }
}

#[tokio::test]
async fn malformed_request_creates_a_failed_job() {
    let h = harness();
    let res = warp::test::request()
        .method("POST")
        .path("/update")
        .json(&json!({ "markets": ["  "] }))
        .reply(&h.api())
        .await;
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let accepted: Accepted = serde_json::from_slice(res.body()).unwrap();

    let view = poll_until_terminal(&h, accepted.job_id).await;
    assert_eq!(view.status.as_str(), "failed");
    assert!(view.step_logs[0].message.starts_with("Rejected request"));
}

#[tokio::test]
async fn sources_list_reasons_and_latest_run() {
    let h = harness();
    let res = warp::test::request().path("/catalog/sources").reply(&h.api()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let overview = body(&res);
    assert_eq!(overview["latest_run"], Value::Null);
    assert_eq!(overview["sources"][1]["id"], "scripted_us");
    assert_eq!(overview["sources"][1]["enabled"], false);
    assert_eq!(overview["sources"][1]["reason"], "ToS pending");

    let job = h.orchestrator.submit(h.config.resolve_request(None, None, false));
    h.orchestrator.wait(job, Duration::from_millis(5)).await.unwrap();

    let res = warp::test::request().path("/catalog/sources").reply(&h.api()).await;
    let overview = body(&res);
    assert_eq!(overview["latest_run"]["job_id"], job.to_string());
    assert_eq!(overview["sources"][0]["last_run"], job.to_string());
}

#[tokio::test]
async fn catalog_market_filter_is_case_insensitive() {
    let h = harness();
    let job = h.orchestrator.submit(h.config.resolve_request(None, None, false));
    h.orchestrator.wait(job, Duration::from_millis(5)).await.unwrap();

    let res = warp::test::request().path("/catalog?market=us").reply(&h.api()).await;
    assert_eq!(body(&res)["crops"], json!({}));

    let res = warp::test::request().path("/catalog?market=ua").reply(&h.api()).await;
    assert_eq!(body(&res)["crops"]["UA"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn manual_import_accepts_complete_provenance() {
    let h = harness();
    let attr = Attribute::observed("fao", "260", UA_PRODUCT_URL, "ФАО: 260", fixed_time());
    let payload = json!({
        "items": [{
            "name": "ДКС 3747", "market": "UA", "crop": "corn", "source_url": UA_PRODUCT_URL,
            "attributes": [attr]
        }]
    });
    let res = warp::test::request()
        .method("POST")
        .path("/manual-import")
        .json(&payload)
        .reply(&h.api())
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(&res)["added"], 1);
    assert!(h.snapshot.exists());
}

#[tokio::test]
async fn manual_import_rejects_tampered_evidence() {
    let h = harness();
    let mut attr = Attribute::observed("fao", "260", UA_PRODUCT_URL, "ФАО: 260", fixed_time());
    attr.evidence = Some("ФАО: 300".into());
    let payload = json!({
        "items": [{
            "name": "ДКС 3747", "market": "UA", "crop": "corn", "source_url": UA_PRODUCT_URL,
            "attributes": [attr]
        }]
    });
    let res = warp::test::request()
        .method("POST")
        .path("/manual-import")
        .json(&payload)
        .reply(&h.api())
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let error = body(&res);
    assert!(error["error"].is_string());
    assert_eq!(error["retryable"], false);

    let res = warp::test::request().path("/catalog").reply(&h.api()).await;
    assert_eq!(body(&res)["crops"], json!({}));
}

#[tokio::test]
async fn invalid_json_is_a_bad_request() {
    let h = harness();
    let res = warp::test::request()
        .method("POST")
        .path("/update")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&h.api())
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(body(&res)["error"].is_string());
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let h = harness();
    let res = warp::test::request().path("/nope").reply(&h.api()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body(&res)["error"], "not found");
}
