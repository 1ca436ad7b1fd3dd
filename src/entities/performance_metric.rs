use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only numeric time series consumed by the coordinator's
/// aggregation pass and by dashboards.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "performance_metrics")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Metric name, e.g. "tactical_actions_generated"
    pub metric_name: String,

    /// Numeric value
    pub metric_value: f64,

    /// Category: "cost", "service", "efficiency" or "consistency"
    pub metric_category: String,

    /// Aggregation period tag: "daily", "weekly" or "monthly"
    pub time_period: String,

    /// When the metric was recorded
    pub recorded_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.time_period {
                active_model.time_period = Set("daily".to_string());
            }

            active_model.recorded_at = Set(Utc::now());
        }

        if let ActiveValue::Set(value) | ActiveValue::Unchanged(value) = active_model.metric_value {
            if !value.is_finite() {
                return Err(DbErr::Custom(format!(
                    "Validation error: metric_value {} is not finite",
                    value
                )));
            }
        }

        Ok(active_model)
    }
}
