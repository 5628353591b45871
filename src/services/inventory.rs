use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Select, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    entities::{branch, inventory, product},
    errors::ServiceError,
    services::{analytics::achievement_pct, contains_literal},
};

/// Inventory row joined with its product and branch
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryView {
    pub id: i32,
    pub product_id: i32,
    #[schema(example = "AC-1.5T-5S-INV")]
    pub material: String,
    pub technology: String,
    pub star_rating: i32,
    pub branch_id: i32,
    #[schema(example = "Chennai")]
    pub branch_name: String,
    pub state: String,
    pub opening_stock: i32,
    pub available_stock: i32,
    pub in_transit_stock: i32,
    pub billing: i32,
    pub monthly_plan: i32,
    /// billing / monthly_plan in percent
    pub achievement_pct: f64,
    pub updated_at: DateTime<Utc>,
}

impl InventoryView {
    fn build(row: inventory::Model, product: &product::Model, branch: &branch::Model) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            material: product.material.clone(),
            technology: product.technology.clone(),
            star_rating: product.star_rating,
            branch_id: row.branch_id,
            branch_name: branch.name.clone(),
            state: branch.state.clone(),
            opening_stock: row.opening_stock,
            available_stock: row.available_stock,
            in_transit_stock: row.in_transit_stock,
            billing: row.billing,
            monthly_plan: row.monthly_plan,
            achievement_pct: achievement_pct(row.billing as i64, row.monthly_plan as i64),
            updated_at: row.updated_at,
        }
    }
}

/// Attach product and branch details to raw inventory rows.
///
/// Loads the referenced products and branches with two `IN` queries.
pub(crate) async fn attach_details<C>(
    db: &C,
    rows: Vec<inventory::Model>,
) -> Result<Vec<InventoryView>, ServiceError>
where
    C: ConnectionTrait,
{
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: HashSet<i32> = rows.iter().map(|r| r.product_id).collect();
    let branch_ids: HashSet<i32> = rows.iter().map(|r| r.branch_id).collect();

    let products: HashMap<i32, product::Model> = product::Entity::find()
        .filter(product::Column::Id.is_in(product_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    let branches: HashMap<i32, branch::Model> = branch::Entity::find()
        .filter(branch::Column::Id.is_in(branch_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let product = products.get(&row.product_id)?;
            let branch = branches.get(&row.branch_id)?;
            Some(InventoryView::build(row, product, branch))
        })
        .collect())
}

/// Filters accepted by the inventory listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InventoryQuery {
    pub branch_id: Option<i32>,
    pub product_id: Option<i32>,
    /// Exact technology name
    pub technology: Option<String>,
    /// Case-insensitive material substring
    pub material: Option<String>,
    /// Only rows below the configured low-stock threshold
    pub low_stock: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateInventoryRequest {
    #[validate(range(min = 0, message = "opening_stock cannot be negative"))]
    pub opening_stock: Option<i32>,
    #[validate(range(min = 0, message = "available_stock cannot be negative"))]
    pub available_stock: Option<i32>,
    #[validate(range(min = 0, message = "in_transit_stock cannot be negative"))]
    pub in_transit_stock: Option<i32>,
    #[validate(range(min = 0, message = "billing cannot be negative"))]
    pub billing: Option<i32>,
    #[validate(range(min = 0, message = "monthly_plan cannot be negative"))]
    pub monthly_plan: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpsertInventoryRequest {
    pub product_id: i32,
    pub branch_id: i32,
    #[serde(flatten)]
    #[validate]
    pub values: UpdateInventoryRequest,
}

/// Queries and edits of per-branch stock rows
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    low_stock_threshold: i32,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, low_stock_threshold: i32) -> Self {
        Self {
            db,
            low_stock_threshold,
        }
    }

    pub fn low_stock_threshold(&self) -> i32 {
        self.low_stock_threshold
    }

    fn filtered(&self, query: &InventoryQuery) -> Select<inventory::Entity> {
        let mut select = inventory::Entity::find();

        if let Some(branch_id) = query.branch_id {
            select = select.filter(inventory::Column::BranchId.eq(branch_id));
        }
        if let Some(product_id) = query.product_id {
            select = select.filter(inventory::Column::ProductId.eq(product_id));
        }
        let technology = query.technology.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let material = query.material.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if technology.is_some() || material.is_some() {
            select = select.inner_join(product::Entity);
            if let Some(technology) = technology {
                select = select.filter(product::Column::Technology.eq(technology));
            }
            if let Some(material) = material {
                select = select.filter(
                    product::Column::Material.like(contains_literal(&material.to_uppercase())),
                );
            }
        }
        if query.low_stock.unwrap_or(false) {
            select = select.filter(inventory::Column::AvailableStock.lt(self.low_stock_threshold));
        }
        select
    }

    /// Paginated listing; `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        query: &InventoryQuery,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<InventoryView>, u64), ServiceError> {
        let db = &*self.db;
        let paginator = self
            .filtered(query)
            .order_by_asc(inventory::Column::Id)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((attach_details(db, rows).await?, total))
    }

    /// Rows whose available stock is below `threshold`, lowest first.
    pub async fn low_stock(&self, threshold: Option<i32>) -> Result<Vec<InventoryView>, ServiceError> {
        let threshold = threshold.unwrap_or(self.low_stock_threshold);
        let rows = inventory::Entity::find()
            .filter(inventory::Column::AvailableStock.lt(threshold))
            .order_by_asc(inventory::Column::AvailableStock)
            .order_by_asc(inventory::Column::Id)
            .all(&*self.db)
            .await?;
        attach_details(&*self.db, rows).await
    }

    pub async fn get(&self, id: i32) -> Result<InventoryView, ServiceError> {
        let row = inventory::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory row", id))?;
        attach_details(&*self.db, vec![row])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::not_found("Inventory row", id))
    }

    pub async fn for_product(&self, product_id: i32) -> Result<Vec<InventoryView>, ServiceError> {
        let rows = inventory::Entity::find()
            .filter(inventory::Column::ProductId.eq(product_id))
            .order_by_asc(inventory::Column::BranchId)
            .all(&*self.db)
            .await?;
        attach_details(&*self.db, rows).await
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i32,
        request: UpdateInventoryRequest,
    ) -> Result<InventoryView, ServiceError> {
        request.validate()?;
        let row = inventory::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Inventory row", id))?;

        let mut active = row.into_active_model();
        apply_values(&mut active, &request);
        let saved = active.update(&*self.db).await?;

        info!(inventory_id = id, "Inventory row updated");
        self.get(saved.id).await
    }

    /// Insert or update the row for (product_id, branch_id).
    /// Returns the row and whether it was newly created.
    #[instrument(skip(self, request), fields(product_id = request.product_id, branch_id = request.branch_id))]
    pub async fn upsert(
        &self,
        request: UpsertInventoryRequest,
    ) -> Result<(InventoryView, bool), ServiceError> {
        request.validate()?;
        let db = &*self.db;

        if product::Entity::find_by_id(request.product_id)
            .one(db)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found("Product", request.product_id));
        }
        if branch::Entity::find_by_id(request.branch_id)
            .one(db)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found("Branch", request.branch_id));
        }

        let existing = inventory::Entity::find()
            .filter(inventory::Column::ProductId.eq(request.product_id))
            .filter(inventory::Column::BranchId.eq(request.branch_id))
            .one(db)
            .await?;

        let (saved, created) = match existing {
            Some(row) => {
                let mut active = row.into_active_model();
                apply_values(&mut active, &request.values);
                (active.update(db).await?, false)
            }
            None => {
                let values = &request.values;
                let active = inventory::ActiveModel {
                    product_id: Set(request.product_id),
                    branch_id: Set(request.branch_id),
                    opening_stock: Set(values.opening_stock.unwrap_or(0)),
                    available_stock: Set(values.available_stock.unwrap_or(0)),
                    in_transit_stock: Set(values.in_transit_stock.unwrap_or(0)),
                    billing: Set(values.billing.unwrap_or(0)),
                    monthly_plan: Set(values.monthly_plan.unwrap_or(0)),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                };
                (active.insert(db).await?, true)
            }
        };

        info!(inventory_id = saved.id, created, "Inventory row upserted");
        Ok((self.get(saved.id).await?, created))
    }
}

fn apply_values(active: &mut inventory::ActiveModel, values: &UpdateInventoryRequest) {
    if let Some(v) = values.opening_stock {
        active.opening_stock = Set(v);
    }
    if let Some(v) = values.available_stock {
        active.available_stock = Set(v);
    }
    if let Some(v) = values.in_transit_stock {
        active.in_transit_stock = Set(v);
    }
    if let Some(v) = values.billing {
        active.billing = Set(v);
    }
    if let Some(v) = values.monthly_plan {
        active.monthly_plan = Set(v);
    }
    active.updated_at = Set(Utc::now());
}
