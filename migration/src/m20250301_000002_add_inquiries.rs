use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Inquiries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Inquiries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_null(Inquiries::Liveaction))
                    .col(string(Inquiries::Schema))
                    .col(big_integer(Inquiries::Ttl))
                    .col(string(Inquiries::Roles))
                    .col(string(Inquiries::Users))
                    .col(ColumnDef::new(Inquiries::Tag).string().not_null().default(""))
                    .col(
                        ColumnDef::new(Inquiries::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(string_null(Inquiries::Response))
                    .col(string(Inquiries::Context))
                    .col(big_integer(Inquiries::CreatedAt))
                    .col(big_integer_null(Inquiries::RespondedAt))
                    .col(string_null(Inquiries::RespondedBy))
                    .to_owned(),
            )
            .await?;

        // The expiry sweep scans pending rows by age
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_inquiries_status_created")
                    .table(Inquiries::Table)
                    .col(Inquiries::Status)
                    .col(Inquiries::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Inquiries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Inquiries {
    Table,
    Id,
    Liveaction,
    Schema,
    Ttl,
    Roles,
    Users,
    Tag,
    Status,
    Response,
    Context,
    CreatedAt,
    RespondedAt,
    RespondedBy,
}
