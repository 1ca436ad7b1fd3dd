use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Product reference data.
///
/// Created externally and treated as immutable by the engine; the optimizers
/// only read economics and ordering constraints from here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// SKU (Stock Keeping Unit)
    #[validate(length(
        min = 1,
        max = 100,
        message = "SKU must be between 1 and 100 characters"
    ))]
    pub sku: String,

    /// Product name
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Product category (e.g. personal_care, food_beverage)
    #[validate(length(min = 1, max = 100))]
    pub category: String,

    /// Unit cost used for holding-cost accrual
    #[validate(range(min = 0.0))]
    pub unit_cost: f64,

    /// Selling price per unit
    #[validate(range(min = 0.0))]
    pub selling_price: f64,

    /// Supplier lead time in days
    #[validate(range(min = 0))]
    pub lead_time_days: i32,

    /// Shelf life in days
    #[validate(range(min = 0))]
    pub shelf_life_days: i32,

    /// Minimum order quantity accepted by the supplier
    #[validate(range(min = 0))]
    pub min_order_quantity: i32,

    /// Maximum order quantity accepted by the supplier
    #[validate(range(min = 0))]
    pub max_order_quantity: i32,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::demand_record::Entity")]
    DemandRecords,
    #[sea_orm(has_many = "super::inventory_level::Entity")]
    InventoryLevels,
    #[sea_orm(has_many = "super::policy_parameters::Entity")]
    PolicyParameters,
    #[sea_orm(has_many = "super::inventory_action::Entity")]
    InventoryActions,
}

impl Related<super::demand_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DemandRecords.def()
    }
}

impl Related<super::inventory_level::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryLevels.def()
    }
}

impl Related<super::policy_parameters::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PolicyParameters.def()
    }
}

impl Related<super::inventory_action::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InventoryActions.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.min_order_quantity {
                active_model.min_order_quantity = Set(1);
            }

            if let ActiveValue::NotSet = active_model.max_order_quantity {
                active_model.max_order_quantity = Set(10_000);
            }

            active_model.created_at = Set(Utc::now());
        }

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        if model.min_order_quantity > model.max_order_quantity {
            return Err(DbErr::Custom(format!(
                "Validation error: min_order_quantity {} exceeds max_order_quantity {}",
                model.min_order_quantity, model.max_order_quantity
            )));
        }

        Ok(active_model)
    }
}
