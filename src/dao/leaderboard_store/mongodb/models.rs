use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::dao::{
    models::{GameMode, RankEntryEntity, ScoreEventEntity, UserId},
    ranking::UserTotal,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreEventDocument {
    user_id: i64,
    score: i64,
    game_mode: GameMode,
    occurred_at: DateTime,
}

impl From<ScoreEventEntity> for MongoScoreEventDocument {
    fn from(value: ScoreEventEntity) -> Self {
        Self {
            user_id: value.user_id,
            score: value.score,
            game_mode: value.game_mode,
            occurred_at: DateTime::from_system_time(value.occurred_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRankDocument {
    user_id: i64,
    total_score: i64,
    rank: i64,
}

impl From<&RankEntryEntity> for MongoRankDocument {
    fn from(value: &RankEntryEntity) -> Self {
        Self {
            user_id: value.user_id,
            total_score: value.total_score,
            rank: i64::try_from(value.rank).unwrap_or(i64::MAX),
        }
    }
}

impl From<MongoRankDocument> for RankEntryEntity {
    fn from(value: MongoRankDocument) -> Self {
        Self {
            user_id: value.user_id,
            total_score: value.total_score,
            rank: u64::try_from(value.rank).unwrap_or_default(),
        }
    }
}

/// Row produced by [`totals_pipeline`].
#[derive(Debug, Clone, Deserialize)]
pub struct MongoUserTotal {
    #[serde(rename = "_id")]
    user_id: i64,
    #[serde(deserialize_with = "saturating_total")]
    total_score: i64,
    events: i64,
}

/// Numeric shapes `$sum` can produce.
#[derive(Deserialize)]
#[serde(untagged)]
enum SumValue {
    Long(i64),
    Double(f64),
}

/// `$sum` over longs turns into a double once it leaves the `i64` range; clamp
/// it back so totals saturate like the in-memory aggregation.
fn saturating_total<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match SumValue::deserialize(deserializer)? {
        SumValue::Long(total) => total,
        SumValue::Double(total) => total as i64,
    })
}

impl From<MongoUserTotal> for UserTotal {
    fn from(value: MongoUserTotal) -> Self {
        Self {
            user_id: value.user_id,
            total_score: value.total_score,
            events: u64::try_from(value.events).unwrap_or_default(),
        }
    }
}

/// Group every score event by user and sum scores and event counts.
pub fn totals_pipeline() -> Vec<Document> {
    vec![doc! {
        "$group": {
            "_id": "$user_id",
            "total_score": { "$sum": "$score" },
            "events": { "$sum": 1 },
        }
    }]
}

pub fn user_filter(user_id: UserId) -> Document {
    doc! {"user_id": user_id}
}
