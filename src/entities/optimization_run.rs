use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Which optimization tier produced a run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum OptimizationMethod {
    Strategic,
    Tactical,
}

impl OptimizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strategic => "strategic",
            Self::Tactical => "tactical",
        }
    }
}

/// Immutable audit record for one optimization attempt.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "optimization_runs")]
pub struct Model {
    /// Run identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub run_id: Uuid,

    /// Product the run covered; None for cycle-level tactical runs
    pub product_id: Option<Uuid>,

    /// Method tag: "strategic" or "tactical"
    pub method: String,

    /// Final objective value, when the run produced one
    pub objective_value: Option<f64>,

    /// Whether service-level constraints were satisfied
    pub constraints_satisfied: bool,

    /// Iterations consumed before stopping
    pub convergence_iterations: Option<i32>,

    /// Wall-clock spent in the run
    pub execution_time_seconds: Option<f64>,

    /// JSON detail payload (chosen parameters, per-step counts)
    #[sea_orm(column_type = "Text", nullable)]
    pub parameters: Option<String>,

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
        // Audit rows are written once and never touched again.
        if !insert {
            return Err(DbErr::Custom(
                "optimization_runs rows are immutable".to_string(),
            ));
        }

        let mut active_model = self;
        active_model.created_at = Set(Utc::now());

        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips_through_strings() {
        assert_eq!(OptimizationMethod::Strategic.as_str(), "strategic");
        assert_eq!(OptimizationMethod::Tactical.to_string(), "tactical");
        assert_eq!(
            "tactical".parse::<OptimizationMethod>().unwrap(),
            OptimizationMethod::Tactical
        );
    }
}
