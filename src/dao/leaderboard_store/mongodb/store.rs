use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::doc,
    options::{Acknowledgment, IndexOptions, ReadConcern, TransactionOptions, WriteConcern},
};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{
    config::MongoConfig,
    connection::{RetryPolicy, establish_connection},
    error::{MongoDaoError, MongoResult},
    models::{
        MongoRankDocument, MongoScoreEventDocument, MongoUserTotal, totals_pipeline, user_filter,
    },
};
use crate::dao::{
    leaderboard_store::LeaderboardStore,
    models::{RankEntryEntity, RecalculationSummary, ScoreEventEntity, UserId},
    ranking::{UserTotal, assign_dense_ranks, summarize},
    storage::StorageResult,
};

const SCORE_EVENT_COLLECTION_NAME: &str = "score_events";
const RANK_COLLECTION_NAME: &str = "rank_entries";

#[derive(Clone)]
pub struct MongoLeaderboardStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config, RetryPolicy::RECONNECT).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLeaderboardStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config, RetryPolicy::STARTUP).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let ranks = self.rank_collection().await;
        let unique_user = IndexModel::builder()
            .keys(doc! {"user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("rank_user_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        ranks
            .create_index(unique_user)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RANK_COLLECTION_NAME,
                index: "user_id",
                source,
            })?;

        let by_rank = IndexModel::builder()
            .keys(doc! {"rank": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("rank_order_idx".to_owned()))
                    .build(),
            )
            .build();
        ranks
            .create_index(by_rank)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RANK_COLLECTION_NAME,
                index: "rank",
                source,
            })?;

        let events = self.event_collection().await;
        let by_user = IndexModel::builder()
            .keys(doc! {"user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("score_event_user_idx".to_owned()))
                    .build(),
            )
            .build();
        events
            .create_index(by_user)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SCORE_EVENT_COLLECTION_NAME,
                index: "user_id",
                source,
            })?;

        Ok(())
    }

    async fn client(&self) -> Client {
        let guard = self.inner.state.read().await;
        guard.client.clone()
    }

    async fn event_collection(&self) -> Collection<MongoScoreEventDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoScoreEventDocument>(SCORE_EVENT_COLLECTION_NAME)
    }

    async fn rank_collection(&self) -> Collection<MongoRankDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRankDocument>(RANK_COLLECTION_NAME)
    }

    async fn append_score_event(&self, event: ScoreEventEntity) -> MongoResult<()> {
        let user_id = event.user_id;
        let document: MongoScoreEventDocument = event.into();
        self.event_collection()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::AppendEvent { user_id, source })?;
        Ok(())
    }

    async fn top_ranks(&self, limit: usize) -> MongoResult<Vec<RankEntryEntity>> {
        let documents: Vec<MongoRankDocument> = self
            .rank_collection()
            .await
            .find(doc! {})
            .sort(doc! {"rank": 1})
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::LoadTopRanks { limit, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadTopRanks { limit, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_rank(&self, user_id: UserId) -> MongoResult<Option<RankEntryEntity>> {
        let document = self
            .rank_collection()
            .await
            .find_one(user_filter(user_id))
            .await
            .map_err(|source| MongoDaoError::LoadRank { user_id, source })?;

        Ok(document.map(Into::into))
    }

    /// Recompute totals and ranks inside a snapshot-isolated transaction.
    ///
    /// The aggregation reads from the transaction snapshot, so score events
    /// committed after it started are left for the next run. Any failure aborts
    /// the transaction and leaves the previous rank table untouched.
    async fn recalculate_ranks(&self) -> MongoResult<RecalculationSummary> {
        let client = self.client().await;
        let mut session = client
            .start_session()
            .await
            .map_err(|source| MongoDaoError::StartTransaction { source })?;

        let options = TransactionOptions::builder()
            .read_concern(ReadConcern::snapshot())
            .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
            .build();
        session
            .start_transaction()
            .with_options(options)
            .await
            .map_err(|source| MongoDaoError::StartTransaction { source })?;

        match self.rewrite_ranks(&mut session).await {
            Ok(summary) => {
                session
                    .commit_transaction()
                    .await
                    .map_err(|source| MongoDaoError::CommitTransaction { source })?;
                Ok(summary)
            }
            Err(err) => {
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(error = %abort_err, "failed to abort rank recalculation transaction");
                }
                Err(err)
            }
        }
    }

    async fn rewrite_ranks(&self, session: &mut ClientSession) -> MongoResult<RecalculationSummary> {
        let events = self.event_collection().await;
        let mut cursor = events
            .aggregate(totals_pipeline())
            .with_type::<MongoUserTotal>()
            .session(&mut *session)
            .await
            .map_err(|source| MongoDaoError::AggregateTotals { source })?;
        let rows: Vec<MongoUserTotal> = cursor
            .stream(&mut *session)
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::AggregateTotals { source })?;

        let totals: Vec<UserTotal> = rows.into_iter().map(Into::into).collect();
        let summary = summarize(&totals);
        let ranks = assign_dense_ranks(totals);
        debug!(users = ranks.len(), "writing recalculated rank entries");

        let collection = self.rank_collection().await;
        for entry in &ranks {
            let document = MongoRankDocument::from(entry);
            collection
                .replace_one(user_filter(entry.user_id), &document)
                .upsert(true)
                .session(&mut *session)
                .await
                .map_err(|source| MongoDaoError::WriteRank {
                    user_id: entry.user_id,
                    source,
                })?;
        }

        Ok(summary)
    }
}

impl LeaderboardStore for MongoLeaderboardStore {
    fn append_score_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_score_event(event).await.map_err(Into::into) })
    }

    fn recalculate_ranks(&self) -> BoxFuture<'static, StorageResult<RecalculationSummary>> {
        let store = self.clone();
        Box::pin(async move { store.recalculate_ranks().await.map_err(Into::into) })
    }

    fn top_ranks(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<RankEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.top_ranks(limit).await.map_err(Into::into) })
    }

    fn find_rank(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<RankEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_rank(user_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
