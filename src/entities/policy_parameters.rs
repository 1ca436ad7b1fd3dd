use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Versioned reorder policy produced by the strategic optimizer.
///
/// Rows are append-only: a new version is inserted and the prior active row
/// deactivated in the same transaction, so at most one row per product carries
/// `is_active = true` while the full history stays queryable.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "policy_parameters")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product reference
    pub product_id: Uuid,

    /// Stock threshold that triggers a replenishment order
    #[validate(range(min = 0))]
    pub reorder_point: i32,

    /// Buffer stock held against demand variability
    #[validate(range(min = 0))]
    pub safety_stock: i32,

    /// Units ordered per replenishment event
    #[validate(range(min = 1))]
    pub order_quantity: i32,

    /// Review cadence in days
    #[validate(range(min = 1))]
    pub review_period_days: i32,

    /// Whether this is the version tactical runs consume
    pub is_active: bool,

    /// Surrogate posterior mean at the chosen optimum
    pub gp_mean: Option<f64>,

    /// Surrogate posterior variance at the chosen optimum
    pub gp_variance: Option<f64>,

    /// Acquisition value at the chosen optimum
    pub acquisition_value: Option<f64>,

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
            if let ActiveValue::NotSet = active_model.review_period_days {
                active_model.review_period_days = Set(1);
            }

            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }

            active_model.created_at = Set(Utc::now());
        }

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        if let Some(variance) = model.gp_variance {
            if variance < 0.0 {
                return Err(DbErr::Custom(format!(
                    "Validation error: gp_variance {} is negative",
                    variance
                )));
            }
        }

        Ok(active_model)
    }
}
