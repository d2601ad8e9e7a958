use crate::{
    db::DbPool,
    entities::service_order::{self, Column, Entity as ServiceOrderEntity, Priority, Status},
    errors::ServiceError,
};
use chrono::NaiveDate;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, ConnectionTrait, DbBackend, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QuerySelect,
};
use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

/// Completion-time statistics as seen by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatisticsSnapshot {
    pub total_orders: u64,
    /// Orders the user requested or is responsible for
    pub user_orders_count: u64,
    /// Closed orders with a completion date
    pub completed_orders: u64,
    /// Mean days from start to completion; 0 when nothing is completed
    pub avg_completion_days: f64,
    /// Mean completion days keyed by priority label, completed priorities only
    #[schema(value_type = Object)]
    pub priority_stats: PriorityStats,
    /// Open orders past their predicted date
    pub delayed_count: u64,
}

/// Mean completion days per priority.
///
/// Serialized as an object keyed by label, lowest priority first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorityStats(BTreeMap<Priority, f64>);

impl PriorityStats {
    pub fn insert(&mut self, priority: Priority, days: f64) {
        self.0.insert(priority, days);
    }

    pub fn get(&self, priority: Priority) -> Option<f64> {
        self.0.get(&priority).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Priority, f64)> + '_ {
        self.0.iter().map(|(priority, days)| (*priority, *days))
    }
}

impl FromIterator<(Priority, f64)> for PriorityStats {
    fn from_iter<I: IntoIterator<Item = (Priority, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for PriorityStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (priority, days) in &self.0 {
            map.serialize_entry(priority.label(), days)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PriorityStats {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(label, days)| {
                Priority::from_label(&label)
                    .map(|priority| (priority, days))
                    .ok_or_else(|| {
                        serde::de::Error::custom(format!("unknown priority label {}", label))
                    })
            })
            .collect()
    }
}

/// Per-priority sum of completion days over completed orders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityTotals {
    pub priority: Priority,
    pub total_days: f64,
    pub completed: u64,
}

/// Completion figures folded from per-priority totals.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSummary {
    pub completed_orders: u64,
    pub avg_completion_days: f64,
    pub priority_stats: PriorityStats,
}

impl CompletionSummary {
    pub fn from_totals(rows: &[PriorityTotals]) -> Self {
        let mut completed_orders = 0u64;
        let mut total_days = 0f64;
        let mut priority_stats = PriorityStats::default();

        for row in rows.iter().filter(|row| row.completed > 0) {
            completed_orders += row.completed;
            total_days += row.total_days;
            priority_stats.insert(row.priority, row.total_days / row.completed as f64);
        }

        let avg_completion_days = if completed_orders == 0 {
            0.0
        } else {
            total_days / completed_orders as f64
        };

        Self {
            completed_orders,
            avg_completion_days,
            priority_stats,
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct PriorityRow {
    priority: Priority,
    total_days: Option<f64>,
    completed: i64,
}

/// Whole days from start to completion, as a floating expression for the backend.
fn completion_days_sql(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "CAST(completion_date - start_date AS DOUBLE PRECISION)",
        DbBackend::MySql => "DATEDIFF(completion_date, start_date)",
        DbBackend::Sqlite => "julianday(completion_date) - julianday(start_date)",
    }
}

/// Grouped SUM/COUNT of completion days per priority, computed in the database.
pub async fn completion_totals<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<PriorityTotals>, ServiceError> {
    let days = completion_days_sql(db.get_database_backend());
    let rows = ServiceOrderEntity::find()
        .select_only()
        .column(Column::Priority)
        .column_as(Expr::cust(format!("SUM({})", days)), "total_days")
        .column_as(Expr::col(Column::Id).count(), "completed")
        .filter(Column::Status.eq(Status::Closed))
        .filter(Column::CompletionDate.is_not_null())
        .group_by(Column::Priority)
        .into_model::<PriorityRow>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| PriorityTotals {
            priority: row.priority,
            total_days: row.total_days.unwrap_or(0.0),
            completed: u64::try_from(row.completed).unwrap_or(0),
        })
        .collect())
}

/// Computes a fresh statistics snapshot on every call
#[derive(Clone)]
pub struct StatisticsService {
    db_pool: Arc<DbPool>,
}

impl StatisticsService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn snapshot(&self, user_id: i32) -> Result<StatisticsSnapshot, ServiceError> {
        self.snapshot_at(user_id, service_order::today()).await
    }

    #[instrument(skip(self))]
    pub async fn snapshot_at(
        &self,
        user_id: i32,
        today: NaiveDate,
    ) -> Result<StatisticsSnapshot, ServiceError> {
        let db = &*self.db_pool;
        crate::tracing::timed("statistics.snapshot", async move {
            let total_orders = ServiceOrderEntity::find().count(db).await?;
            let user_orders_count = ServiceOrderEntity::find()
                .filter(
                    Condition::any()
                        .add(Column::FromUser.eq(user_id))
                        .add(Column::Responsible.eq(user_id)),
                )
                .count(db)
                .await?;
            let delayed_count = ServiceOrderEntity::find()
                .filter(Column::Status.eq(Status::Open))
                .filter(Column::PredictedDate.lt(today))
                .count(db)
                .await?;

            let totals = completion_totals(db).await.map_err(|e| {
                error!(error = %e, "Failed to aggregate completion times");
                e
            })?;
            let summary = CompletionSummary::from_totals(&totals);

            Ok::<_, ServiceError>(StatisticsSnapshot {
                total_orders,
                user_orders_count,
                completed_orders: summary.completed_orders,
                avg_completion_days: summary.avg_completion_days,
                priority_stats: summary.priority_stats,
                delayed_count,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_completed_orders_means_zero_average() {
        let summary = CompletionSummary::from_totals(&[]);
        assert_eq!(summary.completed_orders, 0);
        assert_eq!(summary.avg_completion_days, 0.0);
        assert!(summary.priority_stats.is_empty());
    }

    #[test]
    fn averages_are_weighted_by_order_count() {
        let summary = CompletionSummary::from_totals(&[
            PriorityTotals {
                priority: Priority::High,
                total_days: 6.0,
                completed: 3,
            },
            PriorityTotals {
                priority: Priority::Low,
                total_days: 10.0,
                completed: 1,
            },
        ]);
        assert_eq!(summary.completed_orders, 4);
        assert_eq!(summary.avg_completion_days, 4.0);
        assert_eq!(summary.priority_stats.get(Priority::High), Some(2.0));
        assert_eq!(summary.priority_stats.get(Priority::Low), Some(10.0));
        assert_eq!(summary.priority_stats.get(Priority::Medium), None);
    }

    #[test]
    fn priority_stats_serialize_lowest_priority_first() {
        let stats: PriorityStats = [
            (Priority::High, 4.0),
            (Priority::Low, 1.5),
            (Priority::Medium, 2.0),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"Baixa":1.5,"Média":2.0,"Alta":4.0}"#);

        let back: PriorityStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
        assert!(serde_json::from_str::<PriorityStats>(r#"{"Urgente":1.0}"#).is_err());
    }

    #[test]
    fn empty_priority_rows_are_omitted() {
        let summary = CompletionSummary::from_totals(&[PriorityTotals {
            priority: Priority::Medium,
            total_days: 0.0,
            completed: 0,
        }]);
        assert!(summary.priority_stats.is_empty());
    }

    #[test]
    fn day_difference_expression_follows_backend() {
        assert!(completion_days_sql(DbBackend::Sqlite).contains("julianday"));
        assert!(completion_days_sql(DbBackend::Postgres).contains("DOUBLE PRECISION"));
    }
}
