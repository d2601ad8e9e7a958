use crate::{
    db::DbPool,
    entities::{
        service_order::{
            self, check_invariants, ActiveModel as ServiceOrderActiveModel, Column,
            Entity as ServiceOrderEntity, Model as ServiceOrderModel, Priority, Status,
        },
        user,
    },
    errors::ServiceError,
};
use chrono::NaiveDate;
use sea_orm::{
    sea_query::{Expr, Func, Query, SelectStatement, SimpleExpr},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Distinguishes an absent field from an explicit `null`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateServiceOrderRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub resolved: Option<String>,
    pub start_date: NaiveDate,
    pub predicted_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    /// Defaults to medium
    pub priority: Option<Priority>,
    /// Requesting user; defaults to the caller
    pub from_user: Option<i32>,
    pub responsible: Option<i32>,
    #[validate(range(min = 1, max = 5, message = "Rate must be between 1 and 5"))]
    pub rate: Option<i32>,
}

/// Partial update. Nullable fields are cleared with an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateServiceOrderRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, nullable)]
    pub resolved: Option<Option<String>>,
    pub start_date: Option<NaiveDate>,
    pub predicted_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<NaiveDate>, nullable)]
    pub completion_date: Option<Option<NaiveDate>>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    pub from_user: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>, nullable)]
    pub responsible: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>, nullable)]
    pub rate: Option<Option<i32>>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServiceOrderListQuery {
    /// 1-based page number
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// open, closed or unresolved
    pub status: Option<String>,
    /// low, medium or high
    pub priority: Option<String>,
    pub from_user: Option<i32>,
    pub responsible: Option<i32>,
    pub predicted_date: Option<NaiveDate>,
    /// Case-insensitive match on text fields and usernames
    pub search: Option<String>,
    /// created_at, updated_at, predicted_date, completion_date, days_delay or priority.
    /// A leading `-` sorts descending.
    pub sort_by: Option<String>,
    /// asc or desc
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    PredictedDate,
    CompletionDate,
    DaysDelay,
    Priority,
}

impl SortField {
    fn column(self) -> Column {
        match self {
            SortField::CreatedAt => Column::CreatedAt,
            SortField::UpdatedAt => Column::UpdatedAt,
            SortField::PredictedDate => Column::PredictedDate,
            SortField::CompletionDate => Column::CompletionDate,
            SortField::DaysDelay => Column::DaysDelay,
            SortField::Priority => Column::Priority,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortDirection {
    Asc,
    Desc,
}

/// Resolves `sort_by`/`sort_order` into a column and direction.
fn parse_sort(
    sort_by: Option<&str>,
    sort_order: Option<&str>,
) -> Result<(SortField, SortDirection), ServiceError> {
    let (field, descending_prefix) = match sort_by.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => match raw.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (raw, false),
        },
        None => ("created_at", false),
    };
    let field = SortField::from_str(field)
        .map_err(|_| ServiceError::ValidationError(format!("Cannot sort by '{}'", field)))?;

    let direction = match sort_order.map(|s| s.trim().to_ascii_lowercase()) {
        Some(order) if order == "asc" => SortDirection::Asc,
        Some(order) if order == "desc" => SortDirection::Desc,
        Some(order) => {
            return Err(ServiceError::ValidationError(format!(
                "sort_order must be asc or desc, got '{}'",
                order
            )))
        }
        None if descending_prefix => SortDirection::Desc,
        None if sort_by.is_some() => SortDirection::Asc,
        None => SortDirection::Desc,
    };
    Ok((field, direction))
}

fn parse_filter<T: FromStr>(name: &str, raw: Option<&str>) -> Result<Option<T>, ServiceError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => T::from_str(&value.to_ascii_lowercase())
            .map(Some)
            .map_err(|_| ServiceError::ValidationError(format!("Invalid {} '{}'", name, value))),
        None => Ok(None),
    }
}

/// Accepts an integer (or integer string) in 1..=5.
pub fn parse_rate(value: Option<&Value>) -> Result<i32, ServiceError> {
    let invalid = || ServiceError::ValidationError("Rate must be an integer between 1 and 5".to_string());
    let rate = match value {
        None | Some(Value::Null) => {
            return Err(ServiceError::ValidationError("rate is required".to_string()))
        }
        Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid)?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    if !(1..=5).contains(&rate) {
        return Err(invalid());
    }
    i32::try_from(rate).map_err(|_| invalid())
}

pub fn parse_responsible_id(value: Option<&Value>) -> Result<i32, ServiceError> {
    let invalid = || ServiceError::ValidationError("responsible_id must be a user id".to_string());
    let id = match value {
        None | Some(Value::Null) => {
            return Err(ServiceError::ValidationError(
                "responsible_id is required".to_string(),
            ))
        }
        Some(Value::Number(n)) => n.as_i64().ok_or_else(invalid)?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        Some(_) => return Err(invalid()),
    };
    i32::try_from(id).map_err(|_| invalid())
}

fn lower_like(column: Column, pattern: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col((ServiceOrderEntity, column)))).like(pattern)
}

fn users_matching(pattern: &str) -> SelectStatement {
    Query::select()
        .column(user::Column::Id)
        .from(user::Entity)
        .and_where(
            Expr::expr(Func::lower(Expr::col((user::Entity, user::Column::Username))))
                .like(pattern),
        )
        .to_owned()
}

async fn ensure_user_exists<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    field: &str,
) -> Result<(), ServiceError> {
    let found = user::Entity::find_by_id(user_id).one(db).await?;
    if found.is_none() {
        return Err(ServiceError::BadRequest(format!(
            "{} references unknown user {}",
            field, user_id
        )));
    }
    Ok(())
}

fn validation(message: String) -> ServiceError {
    ServiceError::ValidationError(message)
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkCloseRequest {
    pub ids: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkCloseResult {
    pub closed: Vec<i32>,
    /// Already closed, left untouched
    pub skipped: Vec<i32>,
    /// Starting after today, so they cannot be completed yet
    pub rejected: Vec<i32>,
    pub not_found: Vec<i32>,
}

/// Dashboard counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ServiceOrderSummary {
    pub total: u64,
    pub open: u64,
    pub closed: u64,
    pub unresolved: u64,
    pub high_priority: u64,
    /// Not closed and past the predicted date
    pub overdue: u64,
}

#[derive(Debug, Clone)]
pub struct ServiceOrderPage {
    pub orders: Vec<ServiceOrderModel>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Service-order repository and command handlers
#[derive(Clone)]
pub struct ServiceOrderService {
    db_pool: Arc<DbPool>,
    default_page_size: u64,
    max_page_size: u64,
}

impl ServiceOrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            db_pool,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_limits(mut self, default_page_size: u64, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size.max(1);
        self.default_page_size = default_page_size.clamp(1, self.max_page_size);
        self
    }

    async fn begin(&self, action: &str) -> Result<DatabaseTransaction, ServiceError> {
        self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, action, "Failed to start transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn commit(txn: DatabaseTransaction, action: &str) -> Result<(), ServiceError> {
        txn.commit().await.map_err(|e| {
            error!(error = %e, action, "Failed to commit transaction");
            ServiceError::DatabaseError(e)
        })
    }

    async fn find_in<C: ConnectionTrait>(
        db: &C,
        order_id: i32,
    ) -> Result<ServiceOrderModel, ServiceError> {
        ServiceOrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                warn!(order_id, "Service order not found");
                ServiceError::NotFound(format!("Service order {} not found", order_id))
            })
    }

    /// Filtered, searched, sorted and paginated listing
    #[instrument(skip(self, query))]
    pub async fn list_orders(
        &self,
        query: ServiceOrderListQuery,
    ) -> Result<ServiceOrderPage, ServiceError> {
        let db = &*self.db_pool;
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .limit
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        let (sort_field, direction) =
            parse_sort(query.sort_by.as_deref(), query.sort_order.as_deref())?;

        let mut select = ServiceOrderEntity::find();
        if let Some(status) = parse_filter::<Status>("status", query.status.as_deref())? {
            select = select.filter(Column::Status.eq(status));
        }
        if let Some(priority) = parse_filter::<Priority>("priority", query.priority.as_deref())? {
            select = select.filter(Column::Priority.eq(priority));
        }
        if let Some(from_user) = query.from_user {
            select = select.filter(Column::FromUser.eq(from_user));
        }
        if let Some(responsible) = query.responsible {
            select = select.filter(Column::Responsible.eq(responsible));
        }
        if let Some(predicted) = query.predicted_date {
            select = select.filter(Column::PredictedDate.eq(predicted));
        }
        if let Some(term) = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
        {
            let pattern = format!("%{}%", term);
            select = select.filter(
                Condition::any()
                    .add(lower_like(Column::Title, &pattern))
                    .add(lower_like(Column::Description, &pattern))
                    .add(lower_like(Column::Resolved, &pattern))
                    .add(Column::FromUser.in_subquery(users_matching(&pattern)))
                    .add(Column::Responsible.in_subquery(users_matching(&pattern))),
            );
        }

        select = match direction {
            SortDirection::Asc => select
                .order_by_asc(sort_field.column())
                .order_by_asc(Column::Id),
            SortDirection::Desc => select
                .order_by_desc(sort_field.column())
                .order_by_desc(Column::Id),
        };

        let paginator = select.paginate(db, per_page);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count service orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, "Failed to fetch service orders page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(ServiceOrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: i32) -> Result<ServiceOrderModel, ServiceError> {
        Self::find_in(&*self.db_pool, order_id).await
    }

    /// Creates an open order requested by `caller_id` unless `from_user` says otherwise
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_order(
        &self,
        caller_id: i32,
        request: CreateServiceOrderRequest,
    ) -> Result<ServiceOrderModel, ServiceError> {
        request.validate()?;
        check_invariants(
            request.start_date,
            request.predicted_date,
            request.completion_date,
            request.rate,
        )
        .map_err(validation)?;

        let txn = self.begin("create service order").await?;
        let from_user = request.from_user.unwrap_or(caller_id);
        ensure_user_exists(&txn, from_user, "from_user").await?;
        if let Some(responsible) = request.responsible {
            ensure_user_exists(&txn, responsible, "responsible").await?;
        }

        let order = ServiceOrderActiveModel {
            title: Set(request.title),
            description: Set(request.description),
            resolved: Set(request.resolved),
            start_date: Set(request.start_date),
            predicted_date: Set(request.predicted_date),
            completion_date: Set(request.completion_date),
            days_delay: Set(0),
            priority: Set(request.priority.unwrap_or_default()),
            status: Set(Status::Open),
            from_user: Set(from_user),
            responsible: Set(request.responsible),
            rate: Set(request.rate),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert service order");
            ServiceError::DatabaseError(e)
        })?;

        Self::commit(txn, "create service order").await?;
        info!(order_id = order.id, days_delay = order.days_delay, "Service order created");
        Ok(order)
    }

    #[instrument(skip(self, request))]
    pub async fn update_order(
        &self,
        order_id: i32,
        request: UpdateServiceOrderRequest,
    ) -> Result<ServiceOrderModel, ServiceError> {
        request.validate()?;

        let txn = self.begin("update service order").await?;
        let existing = Self::find_in(&txn, order_id).await?;

        let start_date = request.start_date.unwrap_or(existing.start_date);
        let predicted_date = request.predicted_date.unwrap_or(existing.predicted_date);
        let completion_date = request.completion_date.unwrap_or(existing.completion_date);
        let rate = request.rate.unwrap_or(existing.rate);
        check_invariants(start_date, predicted_date, completion_date, rate).map_err(validation)?;

        if let Some(from_user) = request.from_user {
            ensure_user_exists(&txn, from_user, "from_user").await?;
        }
        if let Some(Some(responsible)) = request.responsible {
            ensure_user_exists(&txn, responsible, "responsible").await?;
        }

        let mut order = existing.into_active_model();
        if let Some(title) = request.title {
            order.title = Set(title);
        }
        if let Some(description) = request.description {
            order.description = Set(description);
        }
        if let Some(resolved) = request.resolved {
            order.resolved = Set(resolved);
        }
        if let Some(priority) = request.priority {
            order.priority = Set(priority);
        }
        if let Some(status) = request.status {
            order.status = Set(status);
        }
        if let Some(from_user) = request.from_user {
            order.from_user = Set(from_user);
        }
        if let Some(responsible) = request.responsible {
            order.responsible = Set(responsible);
        }
        order.start_date = Set(start_date);
        order.predicted_date = Set(predicted_date);
        order.completion_date = Set(completion_date);
        order.rate = Set(rate);

        let updated = order.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to update service order");
            ServiceError::DatabaseError(e)
        })?;

        Self::commit(txn, "update service order").await?;
        info!(order_id, days_delay = updated.days_delay, "Service order updated");
        Ok(updated)
    }

    /// Hard delete
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: i32) -> Result<(), ServiceError> {
        let result = ServiceOrderEntity::delete_by_id(order_id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, order_id, "Failed to delete service order");
                ServiceError::DatabaseError(e)
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Service order {} not found",
                order_id
            )));
        }
        info!(order_id, "Service order deleted");
        Ok(())
    }

    /// Closing stamps today as the completion date, which must not precede the start
    fn ensure_closable(order: &ServiceOrderModel, today: NaiveDate) -> Result<(), ServiceError> {
        if order.is_closed() {
            return Err(ServiceError::Conflict(
                "Service order is already closed".to_string(),
            ));
        }
        service_order::check_invariants(
            order.start_date,
            order.predicted_date,
            Some(today),
            order.rate,
        )
        .map_err(|_| {
            ServiceError::Conflict(
                "Service order cannot be closed before its start date".to_string(),
            )
        })
    }

    async fn close_in(
        txn: &DatabaseTransaction,
        order: ServiceOrderModel,
        today: NaiveDate,
    ) -> Result<ServiceOrderModel, ServiceError> {
        let order_id = order.id;
        let mut active = order.into_active_model();
        active.status = Set(Status::Closed);
        active.completion_date = Set(Some(today));
        active.update(txn).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to close service order");
            ServiceError::DatabaseError(e)
        })
    }

    /// Closes an order today; an already closed order is a conflict
    #[instrument(skip(self))]
    pub async fn close_order(&self, order_id: i32) -> Result<ServiceOrderModel, ServiceError> {
        let txn = self.begin("close service order").await?;
        let existing = Self::find_in(&txn, order_id).await?;
        let today = service_order::today();
        Self::ensure_closable(&existing, today)?;

        let closed = Self::close_in(&txn, existing, today).await?;
        Self::commit(txn, "close service order").await?;
        info!(order_id, days_delay = closed.days_delay, "Service order closed");
        Ok(closed)
    }

    /// Records a satisfaction score taken from the raw `rate` body field
    #[instrument(skip(self, value))]
    pub async fn rate_order(
        &self,
        order_id: i32,
        value: Option<&Value>,
    ) -> Result<ServiceOrderModel, ServiceError> {
        let rate = parse_rate(value)?;

        let txn = self.begin("rate service order").await?;
        let existing = Self::find_in(&txn, order_id).await?;
        let mut active = existing.into_active_model();
        active.rate = Set(Some(rate));
        let rated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to rate service order");
            ServiceError::DatabaseError(e)
        })?;

        Self::commit(txn, "rate service order").await?;
        info!(order_id, rate, "Service order rated");
        Ok(rated)
    }

    /// Assigns a responsible user taken from the raw `responsible_id` body field
    #[instrument(skip(self, value))]
    pub async fn assign_order(
        &self,
        order_id: i32,
        value: Option<&Value>,
    ) -> Result<ServiceOrderModel, ServiceError> {
        let responsible_id = parse_responsible_id(value)?;

        let txn = self.begin("assign service order").await?;
        let existing = Self::find_in(&txn, order_id).await?;
        let responsible = user::Entity::find_by_id(responsible_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", responsible_id)))?;

        let mut active = existing.into_active_model();
        active.responsible = Set(Some(responsible.id));
        let assigned = active.update(&txn).await.map_err(|e| {
            error!(error = %e, order_id, "Failed to assign service order");
            ServiceError::DatabaseError(e)
        })?;

        Self::commit(txn, "assign service order").await?;
        info!(order_id, responsible_id, "Service order assigned");
        Ok(assigned)
    }

    /// Closes every listed order that is still open or unresolved, atomically
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn bulk_close(&self, ids: Vec<i32>) -> Result<BulkCloseResult, ServiceError> {
        let unique: BTreeSet<i32> = ids.into_iter().collect();
        if unique.is_empty() {
            return Err(ServiceError::ValidationError(
                "ids must contain at least one order id".to_string(),
            ));
        }

        let txn = self.begin("bulk close service orders").await?;
        let mut found: HashMap<i32, ServiceOrderModel> = ServiceOrderEntity::find()
            .filter(Column::Id.is_in(unique.iter().copied()))
            .all(&txn)
            .await?
            .into_iter()
            .map(|order| (order.id, order))
            .collect();

        let today = service_order::today();
        let mut result = BulkCloseResult::default();
        for id in unique {
            match found.remove(&id) {
                None => result.not_found.push(id),
                Some(order) if order.is_closed() => result.skipped.push(id),
                Some(order) if Self::ensure_closable(&order, today).is_err() => {
                    result.rejected.push(id)
                }
                Some(order) => {
                    Self::close_in(&txn, order, today).await?;
                    result.closed.push(id);
                }
            }
        }

        Self::commit(txn, "bulk close service orders").await?;
        info!(
            closed = result.closed.len(),
            skipped = result.skipped.len(),
            rejected = result.rejected.len(),
            not_found = result.not_found.len(),
            "Bulk close finished"
        );
        Ok(result)
    }

    pub async fn summary(&self) -> Result<ServiceOrderSummary, ServiceError> {
        self.summary_at(service_order::today()).await
    }

    #[instrument(skip(self))]
    pub async fn summary_at(&self, today: NaiveDate) -> Result<ServiceOrderSummary, ServiceError> {
        let db = &*self.db_pool;
        let with_status = |status: Status| {
            ServiceOrderEntity::find()
                .filter(Column::Status.eq(status))
                .count(db)
        };

        Ok(ServiceOrderSummary {
            total: ServiceOrderEntity::find().count(db).await?,
            open: with_status(Status::Open).await?,
            closed: with_status(Status::Closed).await?,
            unresolved: with_status(Status::Unresolved).await?,
            high_priority: ServiceOrderEntity::find()
                .filter(Column::Priority.eq(Priority::High))
                .count(db)
                .await?,
            overdue: ServiceOrderEntity::find()
                .filter(Column::Status.ne(Status::Closed))
                .filter(Column::PredictedDate.lt(today))
                .count(db)
                .await?,
        })
    }
}
