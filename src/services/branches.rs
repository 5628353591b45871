use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    db,
    entities::{branch::{self, Entity as Branch}, inventory},
    errors::ServiceError,
    services::analytics::achievement_pct,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBranchRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    #[schema(example = "Chennai")]
    pub name: String,
    #[validate(length(max = 100, message = "state must be at most 100 characters"))]
    #[serde(default)]
    #[schema(example = "Tamil Nadu")]
    pub state: String,
    #[validate(range(min = 0.0, max = 100.0, message = "market_share must be between 0 and 100"))]
    #[serde(default)]
    pub market_share: f64,
    #[validate(range(min = 0.0, max = 100.0, message = "penetration must be between 0 and 100"))]
    #[serde(default)]
    pub penetration: f64,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBranchRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1 to 100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 100, message = "state must be at most 100 characters"))]
    pub state: Option<String>,
    #[validate(range(min = 0.0, max = 100.0, message = "market_share must be between 0 and 100"))]
    pub market_share: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "penetration must be between 0 and 100"))]
    pub penetration: Option<f64>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BranchQuery {
    /// Exact state name
    pub state: Option<String>,
}

/// Totals over one branch's inventory rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BranchInventorySummary {
    pub product_count: u64,
    pub total_billing: i64,
    pub total_plan: i64,
    pub total_available_stock: i64,
    pub total_in_transit_stock: i64,
    pub achievement_pct: f64,
}

impl BranchInventorySummary {
    pub fn from_rows(rows: &[inventory::Model]) -> Self {
        let total_billing: i64 = rows.iter().map(|r| r.billing as i64).sum();
        let total_plan: i64 = rows.iter().map(|r| r.monthly_plan as i64).sum();
        Self {
            product_count: rows.len() as u64,
            total_billing,
            total_plan,
            total_available_stock: rows.iter().map(|r| r.available_stock as i64).sum(),
            total_in_transit_stock: rows.iter().map(|r| r.in_transit_stock as i64).sum(),
            achievement_pct: achievement_pct(total_billing, total_plan),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BranchDetail {
    #[serde(flatten)]
    pub branch: branch::Model,
    pub summary: BranchInventorySummary,
}

/// Sales office management
#[derive(Clone)]
pub struct BranchService {
    db: Arc<DatabaseConnection>,
}

impl BranchService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(&self, query: &BranchQuery) -> Result<Vec<branch::Model>, ServiceError> {
        let mut select = Branch::find();
        if let Some(state) = query.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(branch::Column::State.eq(state));
        }
        Ok(select
            .order_by_asc(branch::Column::Name)
            .all(&*self.db)
            .await?)
    }

    pub async fn get(&self, id: i32) -> Result<branch::Model, ServiceError> {
        Branch::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Branch", id))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<branch::Model>, ServiceError> {
        Ok(Branch::find()
            .filter(branch::Column::Name.eq(name.trim()))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_with_summary(&self, id: i32) -> Result<BranchDetail, ServiceError> {
        let branch = self.get(id).await?;
        let rows = inventory::Entity::find()
            .filter(inventory::Column::BranchId.eq(id))
            .all(&*self.db)
            .await?;
        Ok(BranchDetail {
            branch,
            summary: BranchInventorySummary::from_rows(&rows),
        })
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateBranchRequest) -> Result<branch::Model, ServiceError> {
        request.validate()?;
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::ValidationError("name cannot be blank".to_string()));
        }
        if self.find_by_name(&name).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Branch '{}' already exists", name)));
        }

        let created = branch::ActiveModel {
            name: Set(name),
            state: Set(request.state.trim().to_string()),
            market_share: Set(request.market_share),
            penetration: Set(request.penetration),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(branch_id = created.id, "Branch created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i32,
        request: UpdateBranchRequest,
    ) -> Result<branch::Model, ServiceError> {
        request.validate()?;
        let existing = self.get(id).await?;

        let new_name = match request.name.as_deref().map(str::trim) {
            Some("") => {
                return Err(ServiceError::ValidationError("name cannot be blank".to_string()))
            }
            Some(name) if name != existing.name => {
                if self.find_by_name(name).await?.is_some() {
                    return Err(ServiceError::Conflict(format!("Branch '{}' already exists", name)));
                }
                Some(name.to_string())
            }
            _ => None,
        };

        let mut active = existing.into_active_model();
        if let Some(name) = new_name {
            active.name = Set(name);
        }
        if let Some(state) = request.state {
            active.state = Set(state.trim().to_string());
        }
        if let Some(share) = request.market_share {
            active.market_share = Set(share);
        }
        if let Some(penetration) = request.penetration {
            active.penetration = Set(penetration);
        }

        let updated = active.update(&*self.db).await?;
        info!(branch_id = id, "Branch updated");
        Ok(updated)
    }

    /// Removes the branch together with its inventory rows.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let removed_rows = db::transaction(&self.db, move |txn| {
            Box::pin(async move {
                let rows = inventory::Entity::delete_many()
                    .filter(inventory::Column::BranchId.eq(id))
                    .exec(txn)
                    .await?;
                let result = Branch::delete_by_id(id).exec(txn).await?;
                if result.rows_affected == 0 {
                    return Err(ServiceError::not_found("Branch", id));
                }
                Ok::<_, ServiceError>(rows.rows_affected)
            })
        })
        .await?;

        info!(branch_id = id, inventory_rows = removed_rows, "Branch deleted");
        Ok(())
    }
}
