use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Daily demand observation or forecast for one product.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "demand_records")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product reference
    pub product_id: Uuid,

    /// Day this observation covers
    pub date: Date,

    /// Units demanded on that day
    #[validate(range(min = 0))]
    pub quantity_demanded: i32,

    /// Units actually fulfilled from stock
    #[validate(range(min = 0))]
    pub quantity_fulfilled: i32,

    /// True for forecast rows, false for historical observations
    pub is_forecast: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
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
            if let ActiveValue::NotSet = active_model.is_forecast {
                active_model.is_forecast = Set(false);
            }

            active_model.created_at = Set(Utc::now());
        }

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        // Historical rows cannot fulfill more than was demanded.
        if !model.is_forecast && model.quantity_fulfilled > model.quantity_demanded {
            return Err(DbErr::Custom(format!(
                "Validation error: quantity_fulfilled {} exceeds quantity_demanded {}",
                model.quantity_fulfilled, model.quantity_demanded
            )));
        }

        Ok(active_model)
    }
}
