use crate::{
    auth::password::{hash_password, validate_password_strength},
    db::DbPool,
    entities::{
        group, group_permission, permission,
        user::{self, ActiveModel as UserActiveModel, Entity as UserEntity, Model as UserModel},
        user_group, user_permission,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, Func, Query, SelectStatement},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: String,
    pub password: String,
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    /// Group ids
    #[serde(default)]
    pub groups: Vec<i32>,
    /// Permission ids granted directly
    #[serde(default)]
    pub user_permissions: Vec<i32>,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 150, message = "Username must be 1-150 characters"))]
    pub username: Option<String>,
    pub password: Option<String>,
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_active: Option<bool>,
    /// Replaces the user's group memberships when present
    pub groups: Option<Vec<i32>>,
    /// Replaces the user's direct permissions when present
    pub user_permissions: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

impl From<UserModel> for UserResponse {
    fn from(model: UserModel) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            first_name: model.first_name,
            last_name: model.last_name,
            is_staff: model.is_staff,
            is_superuser: model.is_superuser,
            is_active: model.is_active,
            last_login: model.last_login,
            date_joined: model.date_joined,
        }
    }
}

/// A user together with group names and direct permission codenames
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDetail {
    #[serde(flatten)]
    pub user: UserResponse,
    pub groups: Vec<String>,
    pub user_permissions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserWithGroups {
    #[serde(flatten)]
    pub user: UserResponse,
    pub groups: Vec<String>,
}

/// Everything a client needs to decide what to show a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FullAccessResponse {
    pub user: UserWithGroups,
    /// Effective permission codenames, direct and inherited
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

fn groups_of(user_id: i32) -> SelectStatement {
    Query::select()
        .column(user_group::Column::GroupId)
        .from(user_group::Entity)
        .and_where(user_group::Column::UserId.eq(user_id))
        .to_owned()
}

/// Permissions granted directly or through any of the user's groups, ordered by codename.
pub async fn effective_permissions<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Vec<permission::Model>, ServiceError> {
    let direct = Query::select()
        .column(user_permission::Column::PermissionId)
        .from(user_permission::Entity)
        .and_where(user_permission::Column::UserId.eq(user_id))
        .to_owned();
    let inherited = Query::select()
        .column(group_permission::Column::PermissionId)
        .from(group_permission::Entity)
        .and_where(group_permission::Column::GroupId.in_subquery(groups_of(user_id)))
        .to_owned();

    permission::Entity::find()
        .filter(
            Condition::any()
                .add(permission::Column::Id.in_subquery(direct))
                .add(permission::Column::Id.in_subquery(inherited)),
        )
        .order_by_asc(permission::Column::Codename)
        .all(db)
        .await
        .map_err(ServiceError::DatabaseError)
}

pub async fn effective_permission_codenames<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Vec<String>, ServiceError> {
    Ok(effective_permissions(db, user_id)
        .await?
        .into_iter()
        .map(|p| p.codename)
        .collect())
}

pub async fn group_names<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Vec<String>, ServiceError> {
    let groups = group::Entity::find()
        .filter(group::Column::Id.in_subquery(groups_of(user_id)))
        .order_by_asc(group::Column::Name)
        .all(db)
        .await?;
    Ok(groups.into_iter().map(|g| g.name).collect())
}

async fn direct_permission_codenames<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Vec<String>, ServiceError> {
    let subquery = Query::select()
        .column(user_permission::Column::PermissionId)
        .from(user_permission::Entity)
        .and_where(user_permission::Column::UserId.eq(user_id))
        .to_owned();
    let permissions = permission::Entity::find()
        .filter(permission::Column::Id.in_subquery(subquery))
        .order_by_asc(permission::Column::Codename)
        .all(db)
        .await?;
    Ok(permissions.into_iter().map(|p| p.codename).collect())
}

/// Fails with `BadRequest` unless every id names an existing group.
async fn check_group_ids<C: ConnectionTrait>(db: &C, ids: &[i32]) -> Result<(), ServiceError> {
    let unique: BTreeSet<i32> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(());
    }
    let found = group::Entity::find()
        .filter(group::Column::Id.is_in(unique.iter().copied()))
        .count(db)
        .await?;
    if found as usize != unique.len() {
        return Err(ServiceError::BadRequest(
            "groups contains an unknown group id".to_string(),
        ));
    }
    Ok(())
}

async fn check_permission_ids<C: ConnectionTrait>(
    db: &C,
    ids: &[i32],
) -> Result<(), ServiceError> {
    let unique: BTreeSet<i32> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(());
    }
    let found = permission::Entity::find()
        .filter(permission::Column::Id.is_in(unique.iter().copied()))
        .count(db)
        .await?;
    if found as usize != unique.len() {
        return Err(ServiceError::BadRequest(
            "user_permissions contains an unknown permission id".to_string(),
        ));
    }
    Ok(())
}

async fn ensure_username_free<C: ConnectionTrait>(
    db: &C,
    username: &str,
    except: Option<i32>,
) -> Result<(), ServiceError> {
    let existing = UserEntity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    match existing {
        Some(found) if Some(found.id) != except => Err(ServiceError::BadRequest(
            "A user with that username already exists".to_string(),
        )),
        _ => Ok(()),
    }
}

async fn replace_groups<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    ids: &[i32],
) -> Result<(), ServiceError> {
    user_group::Entity::delete_many()
        .filter(user_group::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    let unique: BTreeSet<i32> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(());
    }
    user_group::Entity::insert_many(unique.into_iter().map(|group_id| user_group::ActiveModel {
        user_id: Set(user_id),
        group_id: Set(group_id),
    }))
    .exec_without_returning(db)
    .await?;
    Ok(())
}

async fn replace_permissions<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    ids: &[i32],
) -> Result<(), ServiceError> {
    user_permission::Entity::delete_many()
        .filter(user_permission::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    let unique: BTreeSet<i32> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(());
    }
    user_permission::Entity::insert_many(unique.into_iter().map(|permission_id| {
        user_permission::ActiveModel {
            user_id: Set(user_id),
            permission_id: Set(permission_id),
        }
    }))
    .exec_without_returning(db)
    .await?;
    Ok(())
}

/// User administration and permission lookups
#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn find(&self, user_id: i32) -> Result<UserModel, ServiceError> {
        UserEntity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| {
                warn!(user_id, "User not found");
                ServiceError::NotFound(format!("User {} not found", user_id))
            })
    }

    async fn detail<C: ConnectionTrait>(
        db: &C,
        model: UserModel,
    ) -> Result<UserDetail, ServiceError> {
        let groups = group_names(db, model.id).await?;
        let user_permissions = direct_permission_codenames(db, model.id).await?;
        Ok(UserDetail {
            user: model.into(),
            groups,
            user_permissions,
        })
    }

    /// Lists users ordered by id, optionally matching a username/email fragment
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
    ) -> Result<UserListResponse, ServiceError> {
        let db = &*self.db_pool;
        let mut query = UserEntity::find();
        if let Some(term) = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", term);
            query = query.filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((UserEntity, user::Column::Username))))
                            .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((UserEntity, user::Column::Email))))
                            .like(pattern),
                    ),
            );
        }

        let paginator = query
            .order_by_asc(user::Column::Id)
            .paginate(db, per_page);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count users");
            ServiceError::DatabaseError(e)
        })?;
        let users = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, "Failed to fetch users page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(UserListResponse {
            users: users.into_iter().map(UserResponse::from).collect(),
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: i32) -> Result<UserDetail, ServiceError> {
        let model = self.find(user_id).await?;
        Self::detail(&*self.db_pool, model).await
    }

    /// Plain account record, for the `me` endpoint
    pub async fn get_account(&self, user_id: i32) -> Result<UserResponse, ServiceError> {
        Ok(self.find(user_id).await?.into())
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserDetail, ServiceError> {
        request.validate()?;
        validate_password_strength(&request.password)?;
        let password_hash = hash_password(&request.password)?;

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for user creation");
            ServiceError::DatabaseError(e)
        })?;

        ensure_username_free(&txn, &request.username, None).await?;
        check_group_ids(&txn, &request.groups).await?;
        check_permission_ids(&txn, &request.user_permissions).await?;

        let account = UserActiveModel {
            username: Set(request.username.clone()),
            email: Set(request.email.unwrap_or_default()),
            first_name: Set(request.first_name.unwrap_or_default()),
            last_name: Set(request.last_name.unwrap_or_default()),
            password_hash: Set(password_hash),
            is_staff: Set(request.is_staff),
            is_superuser: Set(request.is_superuser),
            is_active: Set(true),
            last_login: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to insert user");
            ServiceError::DatabaseError(e)
        })?;

        replace_groups(&txn, account.id, &request.groups).await?;
        replace_permissions(&txn, account.id, &request.user_permissions).await?;
        let detail = Self::detail(&txn, account).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit user creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id = detail.user.id, "User created");
        Ok(detail)
    }

    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        user_id: i32,
        request: UpdateUserRequest,
    ) -> Result<UserDetail, ServiceError> {
        request.validate()?;
        let password_hash = match request.password.as_deref() {
            Some(password) => {
                validate_password_strength(password)?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let db = &*self.db_pool;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for user update");
            ServiceError::DatabaseError(e)
        })?;

        let existing = UserEntity::find_by_id(user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))?;

        if let Some(username) = request.username.as_deref() {
            ensure_username_free(&txn, username, Some(user_id)).await?;
        }
        if let Some(groups) = request.groups.as_deref() {
            check_group_ids(&txn, groups).await?;
        }
        if let Some(permissions) = request.user_permissions.as_deref() {
            check_permission_ids(&txn, permissions).await?;
        }

        let mut account = existing.into_active_model();
        if let Some(username) = request.username {
            account.username = Set(username);
        }
        if let Some(hash) = password_hash {
            account.password_hash = Set(hash);
        }
        if let Some(email) = request.email {
            account.email = Set(email);
        }
        if let Some(first_name) = request.first_name {
            account.first_name = Set(first_name);
        }
        if let Some(last_name) = request.last_name {
            account.last_name = Set(last_name);
        }
        if let Some(is_staff) = request.is_staff {
            account.is_staff = Set(is_staff);
        }
        if let Some(is_superuser) = request.is_superuser {
            account.is_superuser = Set(is_superuser);
        }
        if let Some(is_active) = request.is_active {
            account.is_active = Set(is_active);
        }

        let updated = account.update(&txn).await.map_err(|e| {
            error!(error = %e, user_id, "Failed to update user");
            ServiceError::DatabaseError(e)
        })?;

        if let Some(groups) = request.groups.as_deref() {
            replace_groups(&txn, user_id, groups).await?;
        }
        if let Some(permissions) = request.user_permissions.as_deref() {
            replace_permissions(&txn, user_id, permissions).await?;
        }
        let detail = Self::detail(&txn, updated).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit user update");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id, "User updated");
        Ok(detail)
    }

    /// Hard delete; requested orders cascade, assignments are cleared
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: i32) -> Result<(), ServiceError> {
        let result = UserEntity::delete_by_id(user_id)
            .exec(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, user_id, "Failed to delete user");
                ServiceError::DatabaseError(e)
            })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("User {} not found", user_id)));
        }
        info!(user_id, "User deleted");
        Ok(())
    }

    pub async fn permissions_of(&self, user_id: i32) -> Result<Vec<String>, ServiceError> {
        effective_permission_codenames(&*self.db_pool, user_id).await
    }

    pub async fn groups_of(&self, user_id: i32) -> Result<Vec<String>, ServiceError> {
        group_names(&*self.db_pool, user_id).await
    }

    #[instrument(skip(self))]
    pub async fn full_access(&self, user_id: i32) -> Result<FullAccessResponse, ServiceError> {
        let model = self.find(user_id).await?;
        let db = &*self.db_pool;
        let groups = group_names(db, user_id).await?;
        let permissions = effective_permission_codenames(db, user_id).await?;
        Ok(FullAccessResponse {
            user: UserWithGroups {
                user: model.into(),
                groups,
            },
            permissions,
        })
    }

    pub async fn list_permissions(&self) -> Result<Vec<permission::Model>, ServiceError> {
        permission::Entity::find()
            .order_by_asc(permission::Column::AppLabel)
            .order_by_asc(permission::Column::Codename)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Adds a user to a group by name, used when provisioning agents
    pub async fn add_to_group(&self, user_id: i32, group_name: &str) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let found = group::Entity::find()
            .filter(group::Column::Name.eq(group_name))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Group {} not found", group_name)))?;
        user_group::Entity::insert(user_group::ActiveModel {
            user_id: Set(user_id),
            group_id: Set(found.id),
        })
        .exec_without_returning(db)
        .await?;
        Ok(())
    }
}
