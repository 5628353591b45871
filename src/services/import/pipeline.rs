use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, IntoActiveModel, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::parser::{RowError, SalesRecord};
use crate::{
    entities::{branch, inventory, product},
    errors::ServiceError,
};

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    pub rows_read: usize,
    pub rows_imported: usize,
    pub rows_skipped: usize,
    pub errors: Vec<RowError>,
    pub products_created: usize,
    pub products_updated: usize,
    pub branches_created: usize,
    pub branches_updated: usize,
    pub inventory_created: usize,
    pub inventory_updated: usize,
}

/// Product attributes merged across every row naming the material
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProductRow {
    pub material: String,
    pub technology: Option<String>,
    pub tonnage: Option<f64>,
    pub star_rating: Option<i32>,
    pub price: Option<Decimal>,
    pub factory_stock: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BranchRow {
    pub name: String,
    pub state: Option<String>,
    pub market_share: Option<f64>,
    pub penetration: Option<f64>,
}

/// Stock figures for one (material, branch) pair after aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StockFigures {
    pub opening_stock: i64,
    pub available_stock: i64,
    pub in_transit_stock: i64,
    pub billing: i64,
    pub monthly_plan: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRow {
    pub material: String,
    pub branch: String,
    pub figures: StockFigures,
}

/// Deduplicated, aggregated contents of a sheet, ready to write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportBatch {
    pub products: Vec<ProductRow>,
    pub branches: Vec<BranchRow>,
    pub inventory: Vec<InventoryRow>,
}

/// Opening stock is 120% of the larger of plan and billing, rounded up.
pub fn simulated_opening(billing: i64, plan: i64) -> i64 {
    let base = billing.max(plan).max(0);
    (base * 6 + 4) / 5
}

/// Fills in whichever stock figures the sheet did not provide.
pub fn simulate_stock(
    billing: i64,
    plan: i64,
    opening: Option<i64>,
    available: Option<i64>,
    in_transit: Option<i64>,
) -> StockFigures {
    let opening_stock = opening.unwrap_or_else(|| simulated_opening(billing, plan));
    let available_stock = available.unwrap_or_else(|| (opening_stock - billing).max(0));
    let in_transit_stock = in_transit.unwrap_or_else(|| {
        let gap = (plan - billing).max(0);
        (gap + 1) / 2
    });
    StockFigures {
        opening_stock,
        available_stock,
        in_transit_stock,
        billing,
        monthly_plan: plan,
    }
}

fn sum_optional(acc: Option<i64>, value: Option<i64>) -> Option<i64> {
    match (acc, value) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

#[derive(Default)]
struct PairTotals {
    billing: i64,
    plan: i64,
    opening: Option<i64>,
    available: Option<i64>,
    in_transit: Option<i64>,
}

/// Deduplicates products and branches, sums billing and plan per pair and
/// simulates missing stock. Output keeps first-appearance order.
pub fn build_batch(records: &[SalesRecord]) -> ImportBatch {
    let mut products: Vec<ProductRow> = Vec::new();
    let mut product_index: HashMap<String, usize> = HashMap::new();
    let mut branches: Vec<BranchRow> = Vec::new();
    let mut branch_index: HashMap<String, usize> = HashMap::new();
    let mut pairs: Vec<(String, String)> = Vec::new();
    let mut totals: HashMap<(String, String), PairTotals> = HashMap::new();

    for record in records {
        let material = record.material.trim().to_uppercase();
        let branch_name = record.branch.trim().to_string();

        let idx = *product_index.entry(material.clone()).or_insert_with(|| {
            products.push(ProductRow {
                material: material.clone(),
                ..Default::default()
            });
            products.len() - 1
        });
        let product = &mut products[idx];
        overwrite(&mut product.technology, record.technology.clone());
        overwrite(&mut product.tonnage, record.tonnage);
        overwrite(&mut product.star_rating, record.star_rating);
        overwrite(&mut product.price, record.price);
        overwrite(&mut product.factory_stock, record.factory_stock);

        let idx = *branch_index.entry(branch_name.clone()).or_insert_with(|| {
            branches.push(BranchRow {
                name: branch_name.clone(),
                ..Default::default()
            });
            branches.len() - 1
        });
        let branch = &mut branches[idx];
        overwrite(&mut branch.state, record.state.clone());
        overwrite(&mut branch.market_share, record.market_share);
        overwrite(&mut branch.penetration, record.penetration);

        let key = (material, branch_name);
        let entry = totals.entry(key.clone()).or_insert_with(|| {
            pairs.push(key);
            PairTotals::default()
        });
        entry.billing += record.billing;
        entry.plan += record.monthly_plan;
        entry.opening = sum_optional(entry.opening, record.opening_stock);
        entry.available = sum_optional(entry.available, record.available_stock);
        entry.in_transit = sum_optional(entry.in_transit, record.in_transit_stock);
    }

    let inventory = pairs
        .into_iter()
        .filter_map(|key| {
            let t = totals.remove(&key)?;
            Some(InventoryRow {
                figures: simulate_stock(t.billing, t.plan, t.opening, t.available, t.in_transit),
                material: key.0,
                branch: key.1,
            })
        })
        .collect();

    ImportBatch {
        products,
        branches,
        inventory,
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}

/// Counts of rows written by [`write_batch`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub products_created: usize,
    pub products_updated: usize,
    pub branches_created: usize,
    pub branches_updated: usize,
    pub inventory_created: usize,
    pub inventory_updated: usize,
}

/// Upserts products, then branches, then inventory rows inside `txn`.
/// Stock values replace what was stored, so replaying a batch is a no-op.
pub async fn write_batch(
    txn: &DatabaseTransaction,
    batch: ImportBatch,
) -> Result<WriteCounts, ServiceError> {
    let mut counts = WriteCounts::default();

    let materials: Vec<String> = batch.products.iter().map(|p| p.material.clone()).collect();
    let mut product_ids: HashMap<String, i32> = HashMap::new();
    let mut existing_products: HashMap<String, product::Model> = product::Entity::find()
        .filter(product::Column::Material.is_in(materials))
        .all(txn)
        .await?
        .into_iter()
        .map(|p| (p.material.clone(), p))
        .collect();

    for row in batch.products {
        let saved = match existing_products.remove(&row.material) {
            Some(model) => {
                let mut active = model.into_active_model();
                if let Some(technology) = row.technology {
                    active.technology = Set(technology);
                }
                if let Some(tonnage) = row.tonnage {
                    active.tonnage = Set(tonnage);
                }
                if let Some(stars) = row.star_rating {
                    active.star_rating = Set(stars);
                }
                if let Some(price) = row.price {
                    active.price = Set(price);
                }
                if let Some(stock) = row.factory_stock {
                    active.factory_stock = Set(clamp_i32(stock));
                }
                counts.products_updated += 1;
                active.update(txn).await?
            }
            None => {
                counts.products_created += 1;
                product::ActiveModel {
                    material: Set(row.material),
                    technology: Set(row.technology.unwrap_or_default()),
                    tonnage: Set(row.tonnage.unwrap_or(1.0)),
                    star_rating: Set(row.star_rating.unwrap_or(0)),
                    price: Set(row.price.unwrap_or(Decimal::ZERO)),
                    factory_stock: Set(clamp_i32(row.factory_stock.unwrap_or(0))),
                    ..Default::default()
                }
                .insert(txn)
                .await?
            }
        };
        product_ids.insert(saved.material, saved.id);
    }

    let names: Vec<String> = batch.branches.iter().map(|b| b.name.clone()).collect();
    let mut branch_ids: HashMap<String, i32> = HashMap::new();
    let mut existing_branches: HashMap<String, branch::Model> = branch::Entity::find()
        .filter(branch::Column::Name.is_in(names))
        .all(txn)
        .await?
        .into_iter()
        .map(|b| (b.name.clone(), b))
        .collect();

    for row in batch.branches {
        let saved = match existing_branches.remove(&row.name) {
            Some(model) => {
                let mut active = model.into_active_model();
                if let Some(state) = row.state {
                    active.state = Set(state);
                }
                if let Some(share) = row.market_share {
                    active.market_share = Set(share);
                }
                if let Some(penetration) = row.penetration {
                    active.penetration = Set(penetration);
                }
                counts.branches_updated += 1;
                active.update(txn).await?
            }
            None => {
                counts.branches_created += 1;
                branch::ActiveModel {
                    name: Set(row.name),
                    state: Set(row.state.unwrap_or_default()),
                    market_share: Set(row.market_share.unwrap_or(0.0)),
                    penetration: Set(row.penetration.unwrap_or(0.0)),
                    ..Default::default()
                }
                .insert(txn)
                .await?
            }
        };
        branch_ids.insert(saved.name, saved.id);
    }

    let ids: Vec<i32> = product_ids.values().copied().collect();
    let mut existing_rows: HashMap<(i32, i32), inventory::Model> = inventory::Entity::find()
        .filter(inventory::Column::ProductId.is_in(ids))
        .all(txn)
        .await?
        .into_iter()
        .map(|row| ((row.product_id, row.branch_id), row))
        .collect();

    for row in batch.inventory {
        let (Some(&product_id), Some(&branch_id)) =
            (product_ids.get(&row.material), branch_ids.get(&row.branch))
        else {
            return Err(ServiceError::InternalError(format!(
                "Import lost track of {} at {}",
                row.material, row.branch
            )));
        };

        let f = row.figures;
        let mut active = match existing_rows.remove(&(product_id, branch_id)) {
            Some(model) => {
                counts.inventory_updated += 1;
                model.into_active_model()
            }
            None => {
                counts.inventory_created += 1;
                inventory::ActiveModel {
                    product_id: Set(product_id),
                    branch_id: Set(branch_id),
                    ..Default::default()
                }
            }
        };
        active.opening_stock = Set(clamp_i32(f.opening_stock));
        active.available_stock = Set(clamp_i32(f.available_stock));
        active.in_transit_stock = Set(clamp_i32(f.in_transit_stock));
        active.billing = Set(clamp_i32(f.billing));
        active.monthly_plan = Set(clamp_i32(f.monthly_plan));
        active.save(txn).await?;
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(material: &str, branch: &str, billing: i64, plan: i64) -> SalesRecord {
        SalesRecord {
            row: 2,
            material: material.into(),
            branch: branch.into(),
            billing,
            monthly_plan: plan,
            ..Default::default()
        }
    }

    #[test]
    fn simulation_matches_worked_example() {
        let f = simulate_stock(30, 40, None, None, None);
        assert_eq!(f.opening_stock, 48);
        assert_eq!(f.available_stock, 18);
        assert_eq!(f.in_transit_stock, 5);
    }

    #[test]
    fn opening_rounds_up() {
        assert_eq!(simulated_opening(0, 0), 0);
        assert_eq!(simulated_opening(1, 0), 2);
        assert_eq!(simulated_opening(5, 3), 6);
        assert_eq!(simulated_opening(7, 11), 14);
    }

    #[test]
    fn provided_stock_is_kept() {
        let f = simulate_stock(10, 20, Some(3), None, Some(0));
        assert_eq!(f.opening_stock, 3);
        assert_eq!(f.available_stock, 0);
        assert_eq!(f.in_transit_stock, 0);
    }

    #[test]
    fn batch_dedupes_and_sums_pairs() {
        let mut first = record("ac-1", "Chennai", 10, 20);
        first.technology = Some("Inverter".into());
        first.star_rating = Some(3);
        let mut later = record("AC-1 ", "Chennai", 5, 5);
        later.star_rating = Some(5);
        let other_branch = record("AC-1", "Pune", 1, 1);

        let batch = build_batch(&[first, later, other_branch]);

        assert_eq!(batch.products.len(), 1);
        let product = &batch.products[0];
        assert_eq!(product.material, "AC-1");
        assert_eq!(product.technology.as_deref(), Some("Inverter"));
        assert_eq!(product.star_rating, Some(5));

        let names: Vec<&str> = batch.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Chennai", "Pune"]);

        assert_eq!(batch.inventory.len(), 2);
        let chennai = &batch.inventory[0];
        assert_eq!(chennai.figures.billing, 15);
        assert_eq!(chennai.figures.monthly_plan, 25);
        assert_eq!(chennai.figures.opening_stock, 30);
    }

    #[test]
    fn provided_stock_sums_across_rows() {
        let mut a = record("AC-1", "Chennai", 1, 1);
        a.available_stock = Some(4);
        let mut b = record("AC-1", "Chennai", 1, 1);
        b.available_stock = Some(6);
        let batch = build_batch(&[a, b]);
        assert_eq!(batch.inventory[0].figures.available_stock, 10);
    }

    proptest! {
        #[test]
        fn simulated_stock_is_consistent(billing in 0i64..1_000_000, plan in 0i64..1_000_000) {
            let f = simulate_stock(billing, plan, None, None, None);
            let base = billing.max(plan);
            prop_assert!(f.opening_stock * 5 >= base * 6);
            prop_assert!(f.opening_stock * 5 < base * 6 + 5);
            prop_assert!(f.available_stock >= 0);
            prop_assert!(f.available_stock <= f.opening_stock);
            prop_assert!(f.in_transit_stock * 2 >= (plan - billing).max(0));
            prop_assert!(f.in_transit_stock >= 0);
            prop_assert_eq!(f.billing, billing);
            prop_assert_eq!(f.monthly_plan, plan);
        }
    }
}
