use std::sync::Arc;

use async_trait::async_trait;
use revdesk_core::{Category, Sentiment};
use revdesk_drafts::backend::YANDEX_COMPLETION_URL;
use revdesk_drafts::{BackendCredentials, BackendProfile, DraftDefaults, DraftService, LlmBackend};
use revdesk_marketplace::{MarketplaceClient, MarketplaceConfig};
use revdesk_storage::testing::ScriptedTransport;
use revdesk_storage::{JsonRequest, JsonResponse, JsonTransport, MemoryReviewStore, ReviewStore, TransportError};
use revdesk_sync::{CyclePlan, PollOutcome, ReviewPoller, ReviewService, StopReason};
use serde_json::{json, Value as JsonValue};
use tokio::sync::Notify;

const BASE: &str = "https://seller.test";
const FETCH_V1: &str = "https://seller.test/v1/review/list";
const FETCH_V2: &str = "https://seller.test/v2/review/list";

fn page(start: usize, len: usize) -> JsonValue {
    let reviews: Vec<JsonValue> = (start..start + len)
        .map(|i| {
            json!({
                "id": format!("review-{i}"),
                "sku": 100_000 + i,
                "text": format!("Отзыв номер {i}"),
                "rating": 4,
                "published_at": "2026-03-01T10:00:00Z"
            })
        })
        .collect();
    json!({ "reviews": reviews })
}

fn client(transport: Arc<dyn JsonTransport>) -> Arc<MarketplaceClient> {
    let mut config = MarketplaceConfig::new("1001", "ozon-key");
    config.base_url = BASE.to_string();
    Arc::new(MarketplaceClient::new(config, transport))
}

fn service(transport: &Arc<ScriptedTransport>, store: &Arc<MemoryReviewStore>) -> ReviewService {
    ReviewService::new(client(transport.clone()), store.clone())
}

fn yandex_drafts(transport: &Arc<ScriptedTransport>) -> Arc<DraftService> {
    let backend = LlmBackend::new(
        BackendProfile::yandex(),
        BackendCredentials::new("y-key", Some("b1g")),
        None,
        transport.clone(),
    );
    Arc::new(DraftService::new(backend, DraftDefaults::default()))
}

fn yandex_answer(text: &str) -> String {
    json!({"result": {"alternatives": [{"message": {"role": "assistant", "text": text}}]}}).to_string()
}

fn offsets(transport: &ScriptedTransport) -> Vec<u64> {
    transport
        .calls()
        .iter()
        .filter(|c| c.url == FETCH_V1)
        .filter_map(|c| c.body["offset"].as_u64())
        .collect()
}

#[tokio::test]
async fn pagination_stops_after_a_short_page() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond_json(FETCH_V1, 200, &page(0, 100))
        .respond_json(FETCH_V1, 200, &page(100, 100))
        .respond_json(FETCH_V1, 200, &page(200, 37));
    let store = Arc::new(MemoryReviewStore::new());

    let summary = service(&transport, &store)
        .run_ingestion_cycle(CyclePlan::SCHEDULED)
        .await;

    assert_eq!(summary.fetched, 237);
    assert_eq!(summary.saved, 237);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.stop, StopReason::ShortBatch);
    assert_eq!(offsets(&transport), vec![0, 100, 200]);
    assert_eq!(store.count().await.unwrap(), 237);
}

#[tokio::test]
async fn repeated_cycles_store_each_review_once() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_always(FETCH_V1, 200, page(0, 12).to_string());
    let store = Arc::new(MemoryReviewStore::new());
    let service = service(&transport, &store);

    let first = service.run_ingestion_cycle(CyclePlan::SCHEDULED).await;
    let second = service.run_ingestion_cycle(CyclePlan::SCHEDULED).await;

    assert_eq!(first.saved, 12);
    assert_eq!(second.saved, 0);
    assert_eq!(second.duplicates, 12);
    assert_eq!(store.count().await.unwrap(), 12);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn fetch_failure_on_a_later_batch_keeps_earlier_work() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond_json(FETCH_V1, 200, &page(0, 100))
        .respond(FETCH_V1, 500, "upstream down");
    let store = Arc::new(MemoryReviewStore::new());

    let summary = service(&transport, &store)
        .run_ingestion_cycle(CyclePlan::SCHEDULED)
        .await;

    assert_eq!(summary.fetched, 100);
    assert_eq!(summary.batches, 1);
    assert!(matches!(summary.stop, StopReason::FetchFailed(_)));
    assert_eq!(transport.call_count(FETCH_V2), 1);
    assert_eq!(store.count().await.unwrap(), 100);
}

#[tokio::test]
async fn storage_failure_ends_the_cycle() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_always(FETCH_V1, 200, page(0, 100).to_string());
    let store = Arc::new(MemoryReviewStore::new());
    store.set_unavailable(true);

    let summary = service(&transport, &store)
        .run_ingestion_cycle(CyclePlan::SCHEDULED)
        .await;

    assert!(matches!(summary.stop, StopReason::StoreFailed(_)));
    assert_eq!(summary.saved, 0);
    assert_eq!(transport.call_count(FETCH_V1), 1);
}

#[tokio::test]
async fn unmappable_items_are_skipped_and_counted() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json(
        FETCH_V1,
        200,
        &json!({"result": {"reviews": [
            {"id": "ok-1", "text": "Хорошо"},
            {"text": "нет идентификатора"},
            {"id": "ok-2", "text": "Нормально"}
        ], "count": 3}}),
    );
    let store = Arc::new(MemoryReviewStore::new());

    let summary = service(&transport, &store)
        .run_ingestion_cycle(CyclePlan::SCHEDULED)
        .await;

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.saved, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.stop, StopReason::ShortBatch);
}

#[tokio::test]
async fn batch_limit_caps_a_cycle() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond_json(FETCH_V1, 200, &page(0, 100))
        .respond_json(FETCH_V1, 200, &page(100, 100))
        .respond_json(FETCH_V1, 200, &page(200, 100));
    let store = Arc::new(MemoryReviewStore::new());
    let plan = CyclePlan {
        max_batches: 2,
        ..CyclePlan::SCHEDULED
    };

    let summary = service(&transport, &store).run_ingestion_cycle(plan).await;

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.fetched, 200);
    assert_eq!(summary.stop, StopReason::BatchLimit);
}

#[tokio::test]
async fn manual_sync_filters_by_date_with_its_own_plan() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json(FETCH_V1, 200, &page(0, 5));
    let store = Arc::new(MemoryReviewStore::new());

    let summary = service(&transport, &store).run_manual_sync().await.unwrap();

    assert_eq!(summary.saved, 5);
    let calls = transport.calls();
    assert!(calls[0].body["filter"]["date_from"].is_string());
    assert_eq!(calls[0].body["limit"], 100);
}

#[tokio::test]
async fn auto_draft_enriches_new_reviews() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond_json(FETCH_V1, 200, &page(0, 1))
        .respond(YANDEX_COMPLETION_URL, 200, yandex_answer("положительная"))
        .respond(YANDEX_COMPLETION_URL, 200, yandex_answer("качество"))
        .respond_always(YANDEX_COMPLETION_URL, 200, yandex_answer("Спасибо за оценку!"));
    let store = Arc::new(MemoryReviewStore::new());
    let service = service(&transport, &store).with_drafts(yandex_drafts(&transport), true);

    let summary = service.run_ingestion_cycle(CyclePlan::SCHEDULED).await;
    assert_eq!(summary.saved, 1);

    let stored = store.find_by_external_id("review-0").await.unwrap().unwrap();
    assert_eq!(stored.sentiment, Some(Sentiment::Positive));
    assert_eq!(stored.category, Some(Category::Quality));
    assert_eq!(stored.drafts.len(), 3);
    assert_eq!(stored.product_name.as_deref(), Some("Товар 100000"));
}

#[tokio::test]
async fn exhausted_ai_quota_still_stores_reviews() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .respond_json(FETCH_V1, 200, &page(0, 4))
        .respond_always(YANDEX_COMPLETION_URL, 429, "quota");
    let store = Arc::new(MemoryReviewStore::new());
    let drafts = yandex_drafts(&transport);
    let service = service(&transport, &store).with_drafts(drafts.clone(), true);

    let summary = service.run_ingestion_cycle(CyclePlan::SCHEDULED).await;

    assert_eq!(summary.saved, 4);
    assert!(drafts.quota_exceeded());
    assert_eq!(transport.call_count(YANDEX_COMPLETION_URL), 1);
    for review in store.all().await {
        assert_eq!(review.sentiment, None);
        assert!(review.drafts.is_empty());
    }
}

#[tokio::test]
async fn drafts_are_not_generated_when_auto_draft_is_off() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.respond_json(FETCH_V1, 200, &page(0, 2));
    let store = Arc::new(MemoryReviewStore::new());
    let service = service(&transport, &store).with_drafts(yandex_drafts(&transport), false);

    service.run_ingestion_cycle(CyclePlan::SCHEDULED).await;
    assert_eq!(transport.call_count(YANDEX_COMPLETION_URL), 0);
}

/// Holds every request until released.
#[derive(Default)]
struct GatedTransport {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl JsonTransport for GatedTransport {
    async fn post_json(&self, request: &JsonRequest) -> Result<JsonResponse, TransportError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(JsonResponse {
            status: 200,
            url: request.url.clone(),
            body: r#"{"reviews": []}"#.to_string(),
        })
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn overlapping_poll_is_skipped_while_a_cycle_runs() {
    let transport = Arc::new(GatedTransport::default());
    let service = ReviewService::new(client(transport.clone()), Arc::new(MemoryReviewStore::new()));
    let poller = Arc::new(ReviewPoller::new(Arc::new(service), CyclePlan::SCHEDULED, 30));

    let in_flight = {
        let poller = Arc::clone(&poller);
        tokio::spawn(async move { poller.poll_once().await })
    };
    transport.entered.notified().await;

    assert_eq!(poller.poll_once().await, PollOutcome::SkippedBusy);

    transport.release.notify_one();
    match in_flight.await.unwrap() {
        PollOutcome::Completed(summary) => assert_eq!(summary.stop, StopReason::EmptyBatch),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
