use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_products_table::Migration),
            Box::new(m20240601_000002_create_demand_records_table::Migration),
            Box::new(m20240601_000003_create_inventory_levels_table::Migration),
            Box::new(m20240601_000004_create_policy_parameters_table::Migration),
            Box::new(m20240601_000005_create_optimization_runs_table::Migration),
            Box::new(m20240601_000006_create_inventory_actions_table::Migration),
            Box::new(m20240601_000007_create_performance_metrics_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240601_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Products::Sku).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Category).string().not_null())
                        .col(ColumnDef::new(Products::UnitCost).double().not_null())
                        .col(ColumnDef::new(Products::SellingPrice).double().not_null())
                        .col(ColumnDef::new(Products::LeadTimeDays).integer().not_null())
                        .col(
                            ColumnDef::new(Products::ShelfLifeDays)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::MinOrderQuantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Products::MaxOrderQuantity)
                                .integer()
                                .not_null()
                                .default(10000),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_sku")
                        .table(Products::Table)
                        .col(Products::Sku)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Sku,
        Name,
        Category,
        UnitCost,
        SellingPrice,
        LeadTimeDays,
        ShelfLifeDays,
        MinOrderQuantity,
        MaxOrderQuantity,
        CreatedAt,
    }
}

mod m20240601_000002_create_demand_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_demand_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DemandRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DemandRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DemandRecords::ProductId).uuid().not_null())
                        .col(ColumnDef::new(DemandRecords::Date).date().not_null())
                        .col(
                            ColumnDef::new(DemandRecords::QuantityDemanded)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DemandRecords::QuantityFulfilled)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DemandRecords::IsForecast)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(DemandRecords::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_demand_records_product_date")
                        .table(DemandRecords::Table)
                        .col(DemandRecords::ProductId)
                        .col(DemandRecords::Date)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DemandRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum DemandRecords {
        Table,
        Id,
        ProductId,
        Date,
        QuantityDemanded,
        QuantityFulfilled,
        IsForecast,
        CreatedAt,
    }
}

mod m20240601_000003_create_inventory_levels_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_inventory_levels_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::StockLevel)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::ReservedStock)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::InTransit)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::AvailableStock)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLevels::RecordedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_levels_product_recorded")
                        .table(InventoryLevels::Table)
                        .col(InventoryLevels::ProductId)
                        .col(InventoryLevels::RecordedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLevels::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryLevels {
        Table,
        Id,
        ProductId,
        StockLevel,
        ReservedStock,
        InTransit,
        AvailableStock,
        RecordedAt,
    }
}

mod m20240601_000004_create_policy_parameters_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_policy_parameters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PolicyParameters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PolicyParameters::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::ReorderPoint)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::SafetyStock)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::OrderQuantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::ReviewPeriodDays)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(PolicyParameters::GpMean).double().null())
                        .col(
                            ColumnDef::new(PolicyParameters::GpVariance)
                                .double()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::AcquisitionValue)
                                .double()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PolicyParameters::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_policy_parameters_product_active")
                        .table(PolicyParameters::Table)
                        .col(PolicyParameters::ProductId)
                        .col(PolicyParameters::IsActive)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PolicyParameters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PolicyParameters {
        Table,
        Id,
        ProductId,
        ReorderPoint,
        SafetyStock,
        OrderQuantity,
        ReviewPeriodDays,
        IsActive,
        GpMean,
        GpVariance,
        AcquisitionValue,
        CreatedAt,
    }
}

mod m20240601_000005_create_optimization_runs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000005_create_optimization_runs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OptimizationRuns::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OptimizationRuns::RunId)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OptimizationRuns::ProductId).uuid().null())
                        .col(ColumnDef::new(OptimizationRuns::Method).string().not_null())
                        .col(
                            ColumnDef::new(OptimizationRuns::ObjectiveValue)
                                .double()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OptimizationRuns::ConstraintsSatisfied)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(OptimizationRuns::ConvergenceIterations)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OptimizationRuns::ExecutionTimeSeconds)
                                .double()
                                .null(),
                        )
                        .col(ColumnDef::new(OptimizationRuns::Parameters).text().null())
                        .col(
                            ColumnDef::new(OptimizationRuns::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_optimization_runs_method_created")
                        .table(OptimizationRuns::Table)
                        .col(OptimizationRuns::Method)
                        .col(OptimizationRuns::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OptimizationRuns::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum OptimizationRuns {
        Table,
        RunId,
        ProductId,
        Method,
        ObjectiveValue,
        ConstraintsSatisfied,
        ConvergenceIterations,
        ExecutionTimeSeconds,
        Parameters,
        CreatedAt,
    }
}

mod m20240601_000006_create_inventory_actions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000006_create_inventory_actions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryActions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryActions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryActions::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryActions::ActionType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryActions::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryActions::ExpectedDelivery)
                                .timestamp()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryActions::Cost).double().null())
                        .col(
                            ColumnDef::new(InventoryActions::StateVector)
                                .text()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryActions::QValue).double().null())
                        .col(ColumnDef::new(InventoryActions::Reward).double().null())
                        .col(
                            ColumnDef::new(InventoryActions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_actions_product_created")
                        .table(InventoryActions::Table)
                        .col(InventoryActions::ProductId)
                        .col(InventoryActions::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryActions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryActions {
        Table,
        Id,
        ProductId,
        ActionType,
        Quantity,
        ExpectedDelivery,
        Cost,
        StateVector,
        QValue,
        Reward,
        CreatedAt,
    }
}

mod m20240601_000007_create_performance_metrics_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000007_create_performance_metrics_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PerformanceMetrics::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PerformanceMetrics::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PerformanceMetrics::MetricName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PerformanceMetrics::MetricValue)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PerformanceMetrics::MetricCategory)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PerformanceMetrics::TimePeriod)
                                .string()
                                .not_null()
                                .default("daily"),
                        )
                        .col(
                            ColumnDef::new(PerformanceMetrics::RecordedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_performance_metrics_name_recorded")
                        .table(PerformanceMetrics::Table)
                        .col(PerformanceMetrics::MetricName)
                        .col(PerformanceMetrics::RecordedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PerformanceMetrics::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PerformanceMetrics {
        Table,
        Id,
        MetricName,
        MetricValue,
        MetricCategory,
        TimePeriod,
        RecordedAt,
    }
}
