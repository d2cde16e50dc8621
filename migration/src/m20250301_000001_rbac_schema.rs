use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Name).string().not_null().primary_key())
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Grant ids are stored as a JSON array, like client redirect URIs
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Roles::Name).string().not_null().primary_key())
                    .col(string_null(Roles::Description))
                    .col(string(Roles::Grants))
                    .col(
                        ColumnDef::new(Roles::System)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PermissionGrants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PermissionGrants::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(PermissionGrants::ResourceType))
                    .col(string(PermissionGrants::ResourceUid))
                    .col(string(PermissionGrants::PermissionTypes))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserRoleAssignments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserRoleAssignments::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(string(UserRoleAssignments::User))
                    .col(string(UserRoleAssignments::Role))
                    .col(big_integer(UserRoleAssignments::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_role_assignment_user_role")
                    .table(UserRoleAssignments::Table)
                    .col(UserRoleAssignments::User)
                    .col(UserRoleAssignments::Role)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserRoleAssignments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PermissionGrants::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Roles {
    Table,
    Name,
    Description,
    Grants,
    System,
}

#[derive(DeriveIden)]
enum PermissionGrants {
    Table,
    Id,
    ResourceType,
    ResourceUid,
    PermissionTypes,
}

#[derive(DeriveIden)]
enum UserRoleAssignments {
    Table,
    Id,
    User,
    Role,
    CreatedAt,
}
