use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{entity::prelude::*, ActiveValue, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Urgency of a service order.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    /// Human-facing label shown to agents and fed to the assistant.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Baixa",
            Priority::Medium => "Média",
            Priority::High => "Alta",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [Priority::Low, Priority::Medium, Priority::High]
            .into_iter()
            .find(|priority| priority.label() == label)
    }
}

/// Lifecycle state of a service order.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "unresolved")]
    Unresolved,
}

/// The `service_orders` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "service_orders")]
#[schema(as = ServiceOrder)]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    /// Resolution notes
    #[sea_orm(column_type = "Text", nullable)]
    pub resolved: Option<String>,
    pub start_date: NaiveDate,
    pub predicted_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    /// Whole days past `predicted_date`; derived on every save
    pub days_delay: i32,
    pub priority: Priority,
    pub status: Status,
    /// Requesting user
    pub from_user: i32,
    pub responsible: Option<i32>,
    /// Satisfaction score, 1 to 5
    pub rate: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::FromUser",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Requester,
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::Responsible",
        to = "super::user::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    Responsible,
}

/// Local calendar date used as "today" for delay computations.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Whole days an order is late, never negative.
///
/// The reference date is the completion date when the order is finished,
/// otherwise `today`. A missing predicted date yields no delay.
pub fn compute_days_delay(
    predicted_date: Option<NaiveDate>,
    completion_date: Option<NaiveDate>,
    today: NaiveDate,
) -> i32 {
    let Some(predicted) = predicted_date else {
        return 0;
    };
    let reference = completion_date.unwrap_or(today);
    let days = (reference - predicted).num_days().max(0);
    i32::try_from(days).unwrap_or(i32::MAX)
}

/// Checks the date ordering and rating bounds every stored order satisfies.
pub fn check_invariants(
    start_date: NaiveDate,
    predicted_date: NaiveDate,
    completion_date: Option<NaiveDate>,
    rate: Option<i32>,
) -> Result<(), String> {
    if start_date > predicted_date {
        return Err("start_date must be on or before predicted_date".to_string());
    }
    if let Some(completion) = completion_date {
        if completion < start_date {
            return Err("completion_date must be on or after start_date".to_string());
        }
    }
    if let Some(rate) = rate {
        if !(1..=5).contains(&rate) {
            return Err("rate must be between 1 and 5".to_string());
        }
    }
    Ok(())
}

impl Model {
    pub fn calculate_days_delay(&self, today: NaiveDate) -> i32 {
        compute_days_delay(Some(self.predicted_date), self.completion_date, today)
    }

    /// Days from start to completion, for finished orders.
    pub fn completion_days(&self) -> Option<i64> {
        self.completion_date
            .map(|completion| (completion - self.start_date).num_days())
    }

    pub fn is_closed(&self) -> bool {
        self.status == Status::Closed
    }
}

fn current_value<T>(value: &ActiveValue<T>) -> Option<T>
where
    T: Clone + Into<Value>,
{
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v.clone()),
        ActiveValue::NotSet => None,
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        // Client-supplied delays are always overwritten
        let predicted = current_value(&active_model.predicted_date);
        let completion = current_value(&active_model.completion_date).flatten();
        active_model.days_delay = Set(compute_days_delay(predicted, completion, today()));

        let now = Utc::now();
        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);

        Ok(active_model)
    }
}
