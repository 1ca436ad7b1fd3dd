use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Kind of tactical decision recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    Order,
    NoAction,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::NoAction => "no_action",
        }
    }
}

/// Replenishment decision emitted by the tactical controller.
///
/// The decision trace (baseline, chosen correction index, forecast, predicted
/// service level) rides along as JSON so the learning update can reconstruct
/// the state/action pair when it computes the delayed reward. `q_value` and
/// `reward` are filled in by that later pass.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "inventory_actions")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product reference
    pub product_id: Uuid,

    /// "order" or "no_action"
    pub action_type: String,

    /// Units ordered
    #[validate(range(min = 0))]
    pub quantity: i32,

    /// Expected arrival (now + lead time) for order actions
    pub expected_delivery: Option<DateTime<Utc>>,

    /// Purchase cost of the ordered units
    pub cost: Option<f64>,

    /// JSON decision trace used for reward attribution
    #[sea_orm(column_type = "Text", nullable)]
    pub state_vector: Option<String>,

    /// Q-value of the chosen action at decision time
    pub q_value: Option<f64>,

    /// Realized reward, filled in by the learning update
    pub reward: Option<f64>,

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
            if let ActiveValue::NotSet = active_model.action_type {
                active_model.action_type = Set(ActionType::Order.as_str().to_string());
            }

            active_model.created_at = Set(Utc::now());
        }

        let model: Model = active_model.clone().try_into().map_err(|_| {
            DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
        })?;

        if let Err(err) = model.validate() {
            return Err(DbErr::Custom(format!("Validation error: {}", err)));
        }

        if model.action_type.parse::<ActionType>().is_err() {
            return Err(DbErr::Custom(format!(
                "Validation error: unknown action_type '{}'",
                model.action_type
            )));
        }

        Ok(active_model)
    }
}
