use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Point-in-time inventory snapshot for one product.
///
/// `available_stock` is derived, never stored as a free value: every write
/// recomputes it as `stock_level - reserved_stock`, and rows where that
/// difference would be negative are rejected outright.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "inventory_levels")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product reference
    pub product_id: Uuid,

    /// Units physically on hand
    #[validate(range(min = 0))]
    pub stock_level: i32,

    /// Units reserved against open orders
    #[validate(range(min = 0))]
    pub reserved_stock: i32,

    /// Units ordered but not yet received
    #[validate(range(min = 0))]
    pub in_transit: i32,

    /// Derived: stock_level - reserved_stock
    pub available_stock: i32,

    /// When this snapshot was taken
    pub recorded_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
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
            if let ActiveValue::NotSet = active_model.reserved_stock {
                active_model.reserved_stock = Set(0);
            }

            if let ActiveValue::NotSet = active_model.in_transit {
                active_model.in_transit = Set(0);
            }

            if let ActiveValue::NotSet = active_model.recorded_at {
                active_model.recorded_at = Set(Utc::now());
            }
        }

        let stock_level = match &active_model.stock_level {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => *v,
            ActiveValue::NotSet => {
                return Err(DbErr::Custom(
                    "Validation error: stock_level is required".to_string(),
                ))
            }
        };
        let reserved_stock = match &active_model.reserved_stock {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => *v,
            ActiveValue::NotSet => 0,
        };

        if reserved_stock > stock_level {
            return Err(DbErr::Custom(format!(
                "Validation error: reserved_stock {} exceeds stock_level {}",
                reserved_stock, stock_level
            )));
        }

        // Never trust a caller-supplied available_stock.
        active_model.available_stock = Set(stock_level - reserved_stock);

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        Ok(active_model)
    }
}
