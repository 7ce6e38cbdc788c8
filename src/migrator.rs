use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_invoices_table::Migration),
            Box::new(m20250101_000002_create_invoice_lines_table::Migration),
            Box::new(m20250101_000003_create_product_master_table::Migration),
            Box::new(m20250101_000004_create_price_observations_table::Migration),
        ]
    }
}

#[derive(DeriveIden)]
enum Invoices {
    Table,
    Id,
    SupplierId,
    SupplierName,
    Phone,
    Email,
    InvoiceNumber,
    InvoiceDate,
    TotalAmount,
    InvoiceType,
    RawText,
    SourceChannel,
    SourceThreadId,
    SourceMessageId,
    Status,
    ErrorCode,
    ErrorMessage,
    FileName,
    MimeType,
    FileSha256,
    FileSize,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InvoiceLines {
    Table,
    Id,
    InvoiceId,
    SupplierId,
    SupplierName,
    InvoiceNumber,
    InvoiceDate,
    RawReferenceCode,
    ReferenceCode,
    ReferenceOrigin,
    Description,
    Quantity,
    UnitPrice,
    LineTotal,
    PriceFlag,
    PriceFlagReason,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ProductMaster {
    Table,
    ReferenceCode,
    Ean,
    Description,
    Size,
    Colour,
    Family,
    Brand,
    Season,
    Material,
    QuantityOnHand,
    UnitCost,
    RetailPrice,
    OutletPrice,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PriceObservations {
    Table,
    Id,
    SupplierId,
    ReferenceCode,
    ObservedPrice,
    InvoiceId,
    LineId,
    CreatedAt,
}

mod m20250101_000001_create_invoices_table {
    use super::Invoices;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000001_create_invoices_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Invoices::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Invoices::SupplierId).string().not_null())
                        .col(ColumnDef::new(Invoices::SupplierName).string().null())
                        .col(ColumnDef::new(Invoices::Phone).string().null())
                        .col(ColumnDef::new(Invoices::Email).string().null())
                        .col(ColumnDef::new(Invoices::InvoiceNumber).string().null())
                        .col(ColumnDef::new(Invoices::InvoiceDate).date().null())
                        .col(ColumnDef::new(Invoices::TotalAmount).decimal().null())
                        .col(ColumnDef::new(Invoices::InvoiceType).string().null())
                        .col(ColumnDef::new(Invoices::RawText).text().null())
                        .col(ColumnDef::new(Invoices::SourceChannel).string().null())
                        .col(ColumnDef::new(Invoices::SourceThreadId).string().null())
                        .col(ColumnDef::new(Invoices::SourceMessageId).string().null())
                        .col(
                            ColumnDef::new(Invoices::Status)
                                .string_len(20)
                                .not_null()
                                .default("draft"),
                        )
                        .col(ColumnDef::new(Invoices::ErrorCode).string().null())
                        .col(ColumnDef::new(Invoices::ErrorMessage).text().null())
                        .col(ColumnDef::new(Invoices::FileName).string().null())
                        .col(ColumnDef::new(Invoices::MimeType).string().null())
                        .col(ColumnDef::new(Invoices::FileSha256).string_len(64).null())
                        .col(ColumnDef::new(Invoices::FileSize).big_integer().null())
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_supplier_id")
                        .table(Invoices::Table)
                        .col(Invoices::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoices_status")
                        .table(Invoices::Table)
                        .col(Invoices::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }
}

mod m20250101_000002_create_invoice_lines_table {
    use super::{InvoiceLines, Invoices};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000002_create_invoice_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceLines::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(InvoiceLines::InvoiceId).integer().not_null())
                        .col(ColumnDef::new(InvoiceLines::SupplierId).string().not_null())
                        .col(ColumnDef::new(InvoiceLines::SupplierName).string().null())
                        .col(ColumnDef::new(InvoiceLines::InvoiceNumber).string().null())
                        .col(ColumnDef::new(InvoiceLines::InvoiceDate).date().null())
                        .col(ColumnDef::new(InvoiceLines::RawReferenceCode).string().null())
                        .col(ColumnDef::new(InvoiceLines::ReferenceCode).string().null())
                        .col(ColumnDef::new(InvoiceLines::ReferenceOrigin).string_len(16).null())
                        .col(ColumnDef::new(InvoiceLines::Description).text().null())
                        .col(ColumnDef::new(InvoiceLines::Quantity).decimal().null())
                        .col(ColumnDef::new(InvoiceLines::UnitPrice).decimal().null())
                        .col(ColumnDef::new(InvoiceLines::LineTotal).decimal().null())
                        .col(ColumnDef::new(InvoiceLines::PriceFlag).string_len(32).null())
                        .col(ColumnDef::new(InvoiceLines::PriceFlagReason).string().null())
                        .col(
                            ColumnDef::new(InvoiceLines::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoice_lines_invoice_id")
                                .from(InvoiceLines::Table, InvoiceLines::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // NULL codes are distinct under both SQLite and PostgreSQL
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_invoice_lines_invoice_reference")
                        .table(InvoiceLines::Table)
                        .col(InvoiceLines::InvoiceId)
                        .col(InvoiceLines::ReferenceCode)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_lines_reference_code")
                        .table(InvoiceLines::Table)
                        .col(InvoiceLines::ReferenceCode)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceLines::Table).to_owned())
                .await
        }
    }
}

mod m20250101_000003_create_product_master_table {
    use super::ProductMaster;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000003_create_product_master_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductMaster::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductMaster::ReferenceCode)
                                .string()
                                .not_null()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(ProductMaster::Ean).string().null())
                        .col(ColumnDef::new(ProductMaster::Description).text().null())
                        .col(ColumnDef::new(ProductMaster::Size).string().null())
                        .col(ColumnDef::new(ProductMaster::Colour).string().null())
                        .col(ColumnDef::new(ProductMaster::Family).string().null())
                        .col(ColumnDef::new(ProductMaster::Brand).string().null())
                        .col(ColumnDef::new(ProductMaster::Season).string().null())
                        .col(ColumnDef::new(ProductMaster::Material).string().null())
                        .col(ColumnDef::new(ProductMaster::QuantityOnHand).decimal().null())
                        .col(ColumnDef::new(ProductMaster::UnitCost).decimal().null())
                        .col(ColumnDef::new(ProductMaster::RetailPrice).decimal().null())
                        .col(ColumnDef::new(ProductMaster::OutletPrice).decimal().null())
                        .col(
                            ColumnDef::new(ProductMaster::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductMaster::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_master_ean")
                        .table(ProductMaster::Table)
                        .col(ProductMaster::Ean)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductMaster::Table).to_owned())
                .await
        }
    }
}

mod m20250101_000004_create_price_observations_table {
    use super::{Invoices, PriceObservations};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250101_000004_create_price_observations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PriceObservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PriceObservations::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(PriceObservations::SupplierId).string().not_null())
                        .col(
                            ColumnDef::new(PriceObservations::ReferenceCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PriceObservations::ObservedPrice)
                                .decimal()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PriceObservations::InvoiceId).integer().not_null())
                        // no FK to invoice_lines: lines are replaced on reprocessing
                        .col(ColumnDef::new(PriceObservations::LineId).integer().not_null())
                        .col(
                            ColumnDef::new(PriceObservations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_price_observations_invoice_id")
                                .from(PriceObservations::Table, PriceObservations::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_price_observations_invoice_line")
                        .table(PriceObservations::Table)
                        .col(PriceObservations::InvoiceId)
                        .col(PriceObservations::LineId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_price_observations_reference_created")
                        .table(PriceObservations::Table)
                        .col(PriceObservations::ReferenceCode)
                        .col(PriceObservations::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PriceObservations::Table).to_owned())
                .await
        }
    }
}
