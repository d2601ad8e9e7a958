use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_auth_tables::Migration),
            Box::new(m20240101_000002_create_service_orders_table::Migration),
            Box::new(m20240101_000003_seed_permissions::Migration),
        ]
    }
}

mod m20240101_000001_create_auth_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_auth_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Username)
                                .string_len(150)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::Email).string().not_null().default(""))
                        .col(ColumnDef::new(Users::FirstName).string().not_null().default(""))
                        .col(ColumnDef::new(Users::LastName).string().not_null().default(""))
                        .col(ColumnDef::new(Users::PasswordHash).text().not_null())
                        .col(
                            ColumnDef::new(Users::IsStaff)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Users::IsSuperuser)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Users::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::LastLogin)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Users::DateJoined)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Users::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Groups::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Groups::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Groups::Name)
                                .string_len(150)
                                .not_null()
                                .unique_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Permissions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Permissions::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Permissions::Codename)
                                .string_len(100)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Permissions::Name).string().not_null())
                        .col(ColumnDef::new(Permissions::AppLabel).string_len(100).not_null())
                        .col(ColumnDef::new(Permissions::Model).string_len(100).not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UserGroups::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(UserGroups::UserId).integer().not_null())
                        .col(ColumnDef::new(UserGroups::GroupId).integer().not_null())
                        .primary_key(
                            Index::create()
                                .col(UserGroups::UserId)
                                .col(UserGroups::GroupId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_groups_user_id")
                                .from(UserGroups::Table, UserGroups::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_groups_group_id")
                                .from(UserGroups::Table, UserGroups::GroupId)
                                .to(Groups::Table, Groups::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(GroupPermissions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(GroupPermissions::GroupId).integer().not_null())
                        .col(
                            ColumnDef::new(GroupPermissions::PermissionId)
                                .integer()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(GroupPermissions::GroupId)
                                .col(GroupPermissions::PermissionId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_group_permissions_group_id")
                                .from(GroupPermissions::Table, GroupPermissions::GroupId)
                                .to(Groups::Table, Groups::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_group_permissions_permission_id")
                                .from(GroupPermissions::Table, GroupPermissions::PermissionId)
                                .to(Permissions::Table, Permissions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UserPermissions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(UserPermissions::UserId).integer().not_null())
                        .col(
                            ColumnDef::new(UserPermissions::PermissionId)
                                .integer()
                                .not_null(),
                        )
                        .primary_key(
                            Index::create()
                                .col(UserPermissions::UserId)
                                .col(UserPermissions::PermissionId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_permissions_user_id")
                                .from(UserPermissions::Table, UserPermissions::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_user_permissions_permission_id")
                                .from(UserPermissions::Table, UserPermissions::PermissionId)
                                .to(Permissions::Table, Permissions::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UserPermissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GroupPermissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(UserGroups::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Permissions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Groups::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Users {
        Table,
        Id,
        Username,
        Email,
        FirstName,
        LastName,
        PasswordHash,
        IsStaff,
        IsSuperuser,
        IsActive,
        LastLogin,
        DateJoined,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Groups {
        Table,
        Id,
        Name,
    }

    #[derive(DeriveIden)]
    pub(super) enum Permissions {
        Table,
        Id,
        Codename,
        Name,
        AppLabel,
        Model,
    }

    #[derive(DeriveIden)]
    pub(super) enum UserGroups {
        Table,
        UserId,
        GroupId,
    }

    #[derive(DeriveIden)]
    pub(super) enum GroupPermissions {
        Table,
        GroupId,
        PermissionId,
    }

    #[derive(DeriveIden)]
    pub(super) enum UserPermissions {
        Table,
        UserId,
        PermissionId,
    }
}

mod m20240101_000002_create_service_orders_table {

    use super::m20240101_000001_create_auth_tables::Users;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_service_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ServiceOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ServiceOrders::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ServiceOrders::Title).string_len(255).not_null())
                        .col(ColumnDef::new(ServiceOrders::Description).text().not_null())
                        .col(ColumnDef::new(ServiceOrders::Resolved).text().null())
                        .col(ColumnDef::new(ServiceOrders::StartDate).date().not_null())
                        .col(ColumnDef::new(ServiceOrders::PredictedDate).date().not_null())
                        .col(ColumnDef::new(ServiceOrders::CompletionDate).date().null())
                        .col(
                            ColumnDef::new(ServiceOrders::DaysDelay)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ServiceOrders::Priority)
                                .string_len(16)
                                .not_null()
                                .default("medium"),
                        )
                        .col(
                            ColumnDef::new(ServiceOrders::Status)
                                .string_len(16)
                                .not_null()
                                .default("open"),
                        )
                        .col(ColumnDef::new(ServiceOrders::FromUser).integer().not_null())
                        .col(ColumnDef::new(ServiceOrders::Responsible).integer().null())
                        .col(ColumnDef::new(ServiceOrders::Rate).integer().null())
                        .col(
                            ColumnDef::new(ServiceOrders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ServiceOrders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .check(
                            Expr::col(ServiceOrders::Rate)
                                .is_null()
                                .or(Expr::col(ServiceOrders::Rate).between(1, 5)),
                        )
                        .check(
                            Expr::col(ServiceOrders::StartDate)
                                .lte(Expr::col(ServiceOrders::PredictedDate)),
                        )
                        .check(
                            Expr::col(ServiceOrders::CompletionDate).is_null().or(
                                Expr::col(ServiceOrders::CompletionDate)
                                    .gte(Expr::col(ServiceOrders::StartDate)),
                            ),
                        )
                        .check(Expr::col(ServiceOrders::DaysDelay).gte(0))
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_service_orders_from_user")
                                .from(ServiceOrders::Table, ServiceOrders::FromUser)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_service_orders_responsible")
                                .from(ServiceOrders::Table, ServiceOrders::Responsible)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, column) in [
                ("idx_service_orders_status", ServiceOrders::Status),
                ("idx_service_orders_priority", ServiceOrders::Priority),
                ("idx_service_orders_predicted_date", ServiceOrders::PredictedDate),
                ("idx_service_orders_created_at", ServiceOrders::CreatedAt),
                ("idx_service_orders_from_user", ServiceOrders::FromUser),
                ("idx_service_orders_responsible", ServiceOrders::Responsible),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(ServiceOrders::Table)
                            .col(column)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ServiceOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ServiceOrders {
        Table,
        Id,
        Title,
        Description,
        Resolved,
        StartDate,
        PredictedDate,
        CompletionDate,
        DaysDelay,
        Priority,
        Status,
        FromUser,
        Responsible,
        Rate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_seed_permissions {

    use super::m20240101_000001_create_auth_tables::{
        GroupPermissions, Groups, Permissions,
    };
    use crate::auth::permissions::{AGENTS_GROUP, AGENT_PERMISSIONS, PERMISSION_DEFINITIONS};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_seed_permissions"
        }
    }

    fn seed_error(e: impl std::fmt::Display) -> DbErr {
        DbErr::Migration(format!("Failed to build seed statement: {}", e))
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            let mut insert = Query::insert();
            insert.into_table(Permissions::Table).columns([
                Permissions::Codename,
                Permissions::Name,
                Permissions::AppLabel,
                Permissions::Model,
            ]);
            for def in PERMISSION_DEFINITIONS.iter() {
                insert
                    .values([
                        def.codename.clone().into(),
                        def.name.clone().into(),
                        def.app_label.clone().into(),
                        def.model.clone().into(),
                    ])
                    .map_err(seed_error)?;
            }
            manager.exec_stmt(insert).await?;

            manager
                .exec_stmt(
                    Query::insert()
                        .into_table(Groups::Table)
                        .columns([Groups::Name])
                        .values([AGENTS_GROUP.into()])
                        .map_err(seed_error)?
                        .to_owned(),
                )
                .await?;

            // Cross join the agents group with its permission rows
            let grants = Query::select()
                .column((Groups::Table, Groups::Id))
                .column((Permissions::Table, Permissions::Id))
                .from(Groups::Table)
                .from(Permissions::Table)
                .and_where(Expr::col((Groups::Table, Groups::Name)).eq(AGENTS_GROUP))
                .and_where(
                    Expr::col((Permissions::Table, Permissions::Codename))
                        .is_in(AGENT_PERMISSIONS.iter().copied()),
                )
                .to_owned();

            manager
                .exec_stmt(
                    Query::insert()
                        .into_table(GroupPermissions::Table)
                        .columns([GroupPermissions::GroupId, GroupPermissions::PermissionId])
                        .select_from(grants)
                        .map_err(seed_error)?
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .exec_stmt(
                    Query::delete()
                        .from_table(Groups::Table)
                        .and_where(Expr::col(Groups::Name).eq(AGENTS_GROUP))
                        .to_owned(),
                )
                .await?;

            let codenames: Vec<String> = PERMISSION_DEFINITIONS
                .iter()
                .map(|d| d.codename.clone())
                .collect();
            manager
                .exec_stmt(
                    Query::delete()
                        .from_table(Permissions::Table)
                        .and_where(Expr::col(Permissions::Codename).is_in(codenames))
                        .to_owned(),
                )
                .await
        }
    }
}
