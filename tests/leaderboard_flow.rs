use std::{io, sync::Arc};

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use futures::future::BoxFuture;
use leaderboard_back::{
    config::AppConfig,
    dao::{
        cache::MemoryCache,
        leaderboard_store::{LeaderboardStore, MemoryLeaderboardStore},
        models::{GameMode, RankEntryEntity, RecalculationSummary, ScoreEventEntity, UserId},
        storage::{StorageError, StorageResult},
    },
    routes,
    services::{
        leaderboard_service,
        scheduler::{RecalculationScheduler, TriggerOutcome},
        score_service,
    },
    state::{AppState, SharedState},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const A: UserId = 1;
const B: UserId = 2;

fn entry(user_id: UserId, total_score: i64, rank: u64) -> RankEntryEntity {
    RankEntryEntity {
        user_id,
        total_score,
        rank,
    }
}

fn memory_state() -> (SharedState, MemoryLeaderboardStore) {
    let store = MemoryLeaderboardStore::new();
    let state = AppState::new(
        Arc::new(store.clone()),
        Arc::new(MemoryCache::new()),
        AppConfig::default(),
    );
    (state, store)
}

async fn submit(state: &SharedState, user_id: UserId, score: i64, mode: GameMode) {
    score_service::submit_score(state, ScoreEventEntity::now(user_id, score, mode))
        .await
        .unwrap();
}

#[tokio::test]
async fn ranks_follow_recalculation_and_cache_staleness_is_bounded() {
    let (state, _store) = memory_state();
    let scheduler = RecalculationScheduler::from_state(&state);

    submit(&state, A, 50, GameMode::Solo).await;
    submit(&state, B, 30, GameMode::Team).await;
    assert!(matches!(
        scheduler.trigger().await,
        TriggerOutcome::Completed(RecalculationSummary {
            ranked_users: 2,
            scored_events: 2
        })
    ));

    let top = leaderboard_service::get_top(&state, None).await.unwrap();
    assert_eq!(top.value, vec![entry(A, 50, 1), entry(B, 30, 2)]);
    let a_rank = leaderboard_service::get_user_rank(&state, A).await.unwrap();
    assert_eq!(a_rank.value, entry(A, 50, 1));
    assert_eq!(state.cache().get_user_rank(A).await, Some(entry(A, 50, 1)));

    submit(&state, A, 20, GameMode::Solo).await;
    assert_eq!(state.cache().get_user_rank(A).await, None);

    let stale = leaderboard_service::get_top(&state, None).await.unwrap();
    assert!(stale.hit);
    assert_eq!(stale.value[0], entry(A, 50, 1));

    scheduler.trigger().await;

    let fresh = leaderboard_service::get_top(&state, None).await.unwrap();
    assert!(!fresh.hit);
    assert_eq!(fresh.value, vec![entry(A, 70, 1), entry(B, 30, 2)]);
}

#[tokio::test]
async fn recalculation_is_idempotent() {
    let (state, store) = memory_state();
    let scheduler = RecalculationScheduler::from_state(&state);
    submit(&state, A, 10, GameMode::Solo).await;
    submit(&state, B, 10, GameMode::Solo).await;
    submit(&state, 3, 25, GameMode::Team).await;

    scheduler.trigger().await;
    let first = store.top_ranks(10).await.unwrap();
    scheduler.trigger().await;
    let second = store.top_ranks(10).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![entry(3, 25, 1), entry(A, 10, 2), entry(B, 10, 3)]
    );
}

#[tokio::test]
async fn empty_leaderboard_is_an_empty_list() {
    let (state, _store) = memory_state();
    RecalculationScheduler::from_state(&state).trigger().await;

    let top = leaderboard_service::get_top(&state, None).await.unwrap();
    assert!(top.value.is_empty());
    assert_eq!(state.cache().get_top(10).await, Some(Vec::new()));
}

/// Store whose recalculation always rolls back.
#[derive(Clone, Default)]
struct RollbackStore {
    inner: MemoryLeaderboardStore,
}

impl LeaderboardStore for RollbackStore {
    fn append_score_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.append_score_event(event)
    }

    fn recalculate_ranks(&self) -> BoxFuture<'static, StorageResult<RecalculationSummary>> {
        Box::pin(async {
            Err(StorageError::aborted(
                "write conflict during rank upsert".into(),
                io::Error::other("write conflict"),
            ))
        })
    }

    fn top_ranks(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<RankEntryEntity>>> {
        self.inner.top_ranks(limit)
    }

    fn find_rank(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<RankEntryEntity>>> {
        self.inner.find_rank(user_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}

#[tokio::test]
async fn failed_recalculation_keeps_ranks_and_top_cache() {
    let inner = MemoryLeaderboardStore::new();
    inner
        .append_score_event(ScoreEventEntity::now(A, 50, GameMode::Solo))
        .await
        .unwrap();
    inner.recalculate_ranks().await.unwrap();

    let store = RollbackStore {
        inner: inner.clone(),
    };
    let state = AppState::new(
        Arc::new(store),
        Arc::new(MemoryCache::new()),
        AppConfig::default(),
    );
    let top = leaderboard_service::get_top(&state, None).await.unwrap();
    submit(&state, A, 20, GameMode::Solo).await;

    let scheduler = RecalculationScheduler::from_state(&state);
    assert_eq!(scheduler.trigger().await, TriggerOutcome::Failed);

    assert_eq!(inner.top_ranks(10).await.unwrap(), vec![entry(A, 50, 1)]);
    assert_eq!(state.cache().get_top(10).await, Some(top.value));
    assert_eq!(state.recalculation().snapshot().await.failed, 1);
}

async fn send(state: &SharedState, request: Request<Body>) -> (StatusCode, Value) {
    let response = routes::router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn http_round_trip_through_submit_and_reads() {
    let (state, _store) = memory_state();

    let (status, _) = send(
        &state,
        post_json(
            "/api/v1/leaderboard/submit",
            json!({"user_id": A, "score": 50, "game_mode": "solo"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = send(&state, get("/api/v1/leaderboard/rank/1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    RecalculationScheduler::from_state(&state).trigger().await;

    let (status, body) = send(&state, get("/api/v1/leaderboard/top?limit=5")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cached"], json!(false));
    assert_eq!(
        body["entries"],
        json!([{"user_id": 1, "total_score": 50, "rank": 1}])
    );

    let (_, body) = send(&state, get("/api/v1/leaderboard/top?limit=5")).await;
    assert_eq!(body["cached"], json!(true));

    let (status, body) = send(&state, get("/api/v1/leaderboard/rank/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entry"]["rank"], json!(1));

    let (status, body) = send(&state, get("/api/v1/leaderboard/recalculation")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], json!("idle"));
    assert_eq!(body["succeeded_runs"], json!(1));
    assert_eq!(body["last_run"]["outcome"], json!("succeeded"));
}

#[tokio::test]
async fn invalid_requests_are_rejected_with_400() {
    let (state, store) = memory_state();

    for payload in [
        json!({"user_id": 1, "score": 0, "game_mode": "solo"}),
        json!({"user_id": 0, "score": 10, "game_mode": "solo"}),
        json!({"user_id": 1, "score": 10, "game_mode": "ranked"}),
    ] {
        let (status, body) = send(&state, post_json("/api/v1/leaderboard/submit", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }
    assert_eq!(store.event_count().await, 0);

    let (status, _) = send(&state, get("/api/v1/leaderboard/top?limit=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&state, get("/api/v1/leaderboard/top?limit=101")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&state, get("/api/v1/leaderboard/rank/-4")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unparsable_query_and_path_get_json_errors() {
    let (state, _store) = memory_state();

    for uri in [
        "/api/v1/leaderboard/top?limit=ten",
        "/api/v1/leaderboard/top?limit=-1",
        "/api/v1/leaderboard/rank/abc",
    ] {
        let (status, body) = send(&state, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["message"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn oversized_score_is_rejected() {
    let (state, store) = memory_state();

    let (status, _) = send(
        &state,
        post_json(
            "/api/v1/leaderboard/submit",
            json!({"user_id": 1, "score": i64::MAX, "game_mode": "solo"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(store.event_count().await, 0);
}

#[tokio::test]
async fn healthcheck_reports_ok_for_reachable_store() {
    let (state, _store) = memory_state();
    let (status, body) = send(&state, get("/healthcheck")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
