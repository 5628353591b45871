use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Select, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::{
    db,
    entities::{inventory, product::{self, Entity as Product}},
    errors::ServiceError,
    services::{
        contains_literal,
        inventory::{attach_details, InventoryView},
    },
};

fn check_tonnage(tonnage: f64) -> Result<(), ServiceError> {
    if tonnage.is_finite() && tonnage > 0.0 {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(
            "tonnage must be greater than 0".to_string(),
        ))
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("price");
        err.message = Some("price cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

fn validate_material(material: &str) -> Result<(), ValidationError> {
    if material.trim().is_empty() {
        let mut err = ValidationError::new("material");
        err.message = Some("material cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(
        length(max = 64, message = "material must be at most 64 characters"),
        custom = "validate_material"
    )]
    #[schema(example = "AC-1.5T-5S-INV")]
    pub material: String,
    #[schema(example = 1.5)]
    pub tonnage: f64,
    #[validate(range(min = 0, max = 5, message = "star_rating must be between 0 and 5"))]
    #[schema(example = 5)]
    pub star_rating: i32,
    #[serde(default)]
    #[schema(example = "Inverter")]
    pub technology: String,
    #[validate(custom = "validate_price")]
    #[schema(value_type = String, example = "42990.00")]
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "factory_stock cannot be negative"))]
    pub factory_stock: i32,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(
        length(max = 64, message = "material must be at most 64 characters"),
        custom = "validate_material"
    )]
    pub material: Option<String>,
    pub tonnage: Option<f64>,
    #[validate(range(min = 0, max = 5, message = "star_rating must be between 0 and 5"))]
    pub star_rating: Option<i32>,
    pub technology: Option<String>,
    #[validate(custom = "validate_price")]
    #[schema(value_type = Option<String>)]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "factory_stock cannot be negative"))]
    pub factory_stock: Option<i32>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductQuery {
    /// Case-insensitive material substring
    pub search: Option<String>,
    pub technology: Option<String>,
    pub star_rating: Option<i32>,
}

/// Distinct values for the dashboard's filter drop-downs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductFilters {
    pub technologies: Vec<String>,
    pub star_ratings: Vec<i32>,
    pub tonnages: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: product::Model,
    pub inventory: Vec<InventoryView>,
}

/// Product catalogue management
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn filtered(query: &ProductQuery) -> Select<Product> {
        let mut select = Product::find();
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select
                .filter(product::Column::Material.like(contains_literal(&search.to_uppercase())));
        }
        if let Some(technology) = query.technology.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(product::Column::Technology.eq(technology));
        }
        if let Some(stars) = query.star_rating {
            select = select.filter(product::Column::StarRating.eq(stars));
        }
        select
    }

    /// Paginated listing ordered by material; `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        query: &ProductQuery,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = Self::filtered(query)
            .order_by_asc(product::Column::Material)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    pub async fn filters(&self) -> Result<ProductFilters, ServiceError> {
        let products = Product::find().all(&*self.db).await?;

        let technologies: BTreeSet<String> = products
            .iter()
            .map(|p| p.technology.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let star_ratings: BTreeSet<i32> = products.iter().map(|p| p.star_rating).collect();

        let mut tonnages: Vec<f64> = products.iter().map(|p| p.tonnage).collect();
        tonnages.sort_by(|a, b| a.total_cmp(b));
        tonnages.dedup();

        Ok(ProductFilters {
            technologies: technologies.into_iter().collect(),
            star_ratings: star_ratings.into_iter().collect(),
            tonnages,
        })
    }

    pub async fn get(&self, id: i32) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    pub async fn find_by_material(&self, material: &str) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Material.eq(normalize_material(material)))
            .one(&*self.db)
            .await?)
    }

    /// The product with one inventory row per branch that stocks it.
    pub async fn get_with_inventory(&self, id: i32) -> Result<ProductDetail, ServiceError> {
        let product = self.get(id).await?;
        let rows = inventory::Entity::find()
            .filter(inventory::Column::ProductId.eq(id))
            .order_by_asc(inventory::Column::BranchId)
            .all(&*self.db)
            .await?;
        let inventory = attach_details(&*self.db, rows).await?;
        Ok(ProductDetail { product, inventory })
    }

    #[instrument(skip(self, request), fields(material = %request.material))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<product::Model, ServiceError> {
        request.validate()?;
        check_tonnage(request.tonnage)?;
        let material = normalize_material(&request.material);

        if self.find_by_material(&material).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Product with material '{}' already exists",
                material
            )));
        }

        let model = product::ActiveModel {
            material: Set(material),
            tonnage: Set(request.tonnage),
            star_rating: Set(request.star_rating),
            technology: Set(request.technology.trim().to_string()),
            price: Set(request.price.round_dp(2)),
            factory_stock: Set(request.factory_stock),
            ..Default::default()
        };
        let created = model.insert(&*self.db).await?;
        info!(product_id = created.id, "Product created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i32,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        if let Some(tonnage) = request.tonnage {
            check_tonnage(tonnage)?;
        }
        let existing = self.get(id).await?;

        if let Some(material) = request.material.as_deref() {
            let material = normalize_material(material);
            if material != existing.material {
                if let Some(other) = self.find_by_material(&material).await? {
                    if other.id != id {
                        return Err(ServiceError::Conflict(format!(
                            "Product with material '{}' already exists",
                            material
                        )));
                    }
                }
            }
        }

        let mut active = existing.into_active_model();
        if let Some(material) = request.material {
            active.material = Set(normalize_material(&material));
        }
        if let Some(tonnage) = request.tonnage {
            active.tonnage = Set(tonnage);
        }
        if let Some(stars) = request.star_rating {
            active.star_rating = Set(stars);
        }
        if let Some(technology) = request.technology {
            active.technology = Set(technology.trim().to_string());
        }
        if let Some(price) = request.price {
            active.price = Set(price.round_dp(2));
        }
        if let Some(stock) = request.factory_stock {
            active.factory_stock = Set(stock);
        }

        let updated = active.update(&*self.db).await?;
        info!(product_id = id, "Product updated");
        Ok(updated)
    }

    /// Removes the product and its inventory rows in one transaction.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let removed_rows = db::transaction(&self.db, move |txn| {
            Box::pin(async move {
                let rows = inventory::Entity::delete_many()
                    .filter(inventory::Column::ProductId.eq(id))
                    .exec(txn)
                    .await?;
                let result = Product::delete_by_id(id).exec(txn).await?;
                if result.rows_affected == 0 {
                    return Err(ServiceError::not_found("Product", id));
                }
                Ok::<_, ServiceError>(rows.rows_affected)
            })
        })
        .await?;

        info!(product_id = id, inventory_rows = removed_rows, "Product deleted");
        Ok(())
    }
}

/// Material codes are stored trimmed and upper-cased.
pub fn normalize_material(material: &str) -> String {
    material.trim().to_uppercase()
}
