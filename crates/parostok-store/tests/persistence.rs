//! Durability and truthfulness across store backends

use chrono::Utc;
use parostok_provenance::{Attribute, HybridDraft, JobId, Market, Run, RunRequest, RunStatus};
use parostok_store::{MemoryStore, ProvenanceStore, SnapshotPublisher, SqliteStore, UpsertOutcome};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const URL: &str = "https://www.cropscience.bayer.ua/Products/Dekalb/Corn/DKS3747";

async fn seed(store: &dyn ProvenanceStore) {
    let id = store
        .ensure_hybrid(HybridDraft::new("ДКС 3747", "UA", "corn", URL).with_brand("DEKALB"), Utc::now())
        .await
        .unwrap();
    for (key, value, evidence) in [
        ("fao", "260", "ФАО: 260"),
        ("grain_type", "зубоподібний", "Тип зерна: зубоподібний"),
    ] {
        let outcome = store
            .upsert_attribute(&id, Attribute::observed(key, value, URL, evidence, Utc::now()))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Added);
    }
    store
        .upsert_attribute(&id, Attribute::unknown("maturity_group", Utc::now()))
        .await
        .unwrap();
}

#[tokio::test]
async fn sqlite_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/catalog.db");

    let job_id = JobId::new();
    let expected = {
        let store = SqliteStore::open(&path).unwrap();
        seed(&store).await;
        let mut run = Run::new(job_id, RunRequest::new(["UA"], ["bayer_ua_dekalb"]), Utc::now());
        run.transition(RunStatus::Running, Utc::now()).unwrap();
        run.transition(RunStatus::Succeeded, Utc::now()).unwrap();
        store.record_run(&run).await.unwrap();
        store.catalog(None).await.unwrap()
    };

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.catalog(None).await.unwrap(), expected);
    assert_eq!(
        reopened.run(job_id).await.unwrap().map(|r| r.status),
        Some(RunStatus::Succeeded)
    );
    assert_eq!(expected.attribute_count(), 3);
}

#[tokio::test]
async fn backends_agree_on_catalog_shape() {
    let memory = MemoryStore::new();
    let sqlite = SqliteStore::open_in_memory().unwrap();
    seed(&memory).await;
    seed(&sqlite).await;

    let a = memory.catalog(Some(&Market::new("ua"))).await.unwrap();
    let b = sqlite.catalog(Some(&Market::new("UA"))).await.unwrap();
    let keys = |c: &parostok_provenance::Catalog| {
        c.entries()
            .flat_map(|e| e.attributes.iter().map(|a| (a.key.clone(), a.value.clone())))
            .collect::<Vec<_>>()
    };
    assert_eq!(keys(&a), keys(&b));
    assert_eq!(a.hybrid_count(), b.hybrid_count());
}

#[tokio::test]
async fn unchanged_observation_keeps_snapshot_identical() {
    let dir = tempfile::tempdir().unwrap();
    let store = MemoryStore::new();
    let publisher = SnapshotPublisher::new(dir.path().join("catalog.json"));
    seed(&store).await;
    let first = publisher.publish(&store.catalog(None).await.unwrap()).await.unwrap();

    let id = store
        .ensure_hybrid(HybridDraft::new("ДКС 3747", "UA", "corn", URL), Utc::now())
        .await
        .unwrap();
    let again = store
        .upsert_attribute(&id, Attribute::observed("fao", "260", URL, "ФАО: 260", Utc::now()))
        .await
        .unwrap();
    assert_eq!(again, UpsertOutcome::Unchanged);

    // last_seen moves, so compare attributes only
    let catalog = store.catalog(None).await.unwrap();
    let loaded = publisher.load().await.unwrap();
    let attrs = |c: &parostok_provenance::Catalog| {
        c.entries().flat_map(|e| e.attributes.clone()).collect::<Vec<_>>()
    };
    assert_eq!(attrs(&catalog), attrs(&loaded));
    assert_eq!(first.hybrids, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stored_attributes_are_always_truthful(
        writes in proptest::collection::vec(
            (prop::sample::select(vec!["fao", "grain_type", "rating.Посухостійкість"]),
             prop::option::of("[a-z0-9]{1,8}"),
             any::<bool>()),
            1..20,
        )
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let store = SqliteStore::open_in_memory().unwrap();
            let id = store
                .ensure_hybrid(HybridDraft::new("ДКС 4014", "UA", "corn", URL), Utc::now())
                .await
                .unwrap();
            for (key, value, tamper) in writes {
                let mut attr = match value {
                    Some(v) => Attribute::observed(key, v.clone(), URL, format!("{key}: {v}"), Utc::now()),
                    None => Attribute::unknown(key, Utc::now()),
                };
                if tamper {
                    attr.source_url = None;
                }
                // rejected writes leave the store untouched
                let _ = store.upsert_attribute(&id, attr).await;
            }
            let catalog = store.catalog(None).await.unwrap();
            for entry in catalog.entries() {
                for attr in &entry.attributes {
                    assert!(attr.is_truthful(), "untruthful attribute stored: {attr:?}");
                }
            }
        });
    }
}
