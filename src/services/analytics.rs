use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::{
    entities::{branch, inventory, product},
    errors::ServiceError,
};

/// billing / plan × 100 rounded to 2 dp; 0 when there is no plan.
pub fn achievement_pct(billing: i64, plan: i64) -> f64 {
    if plan <= 0 {
        return 0.0;
    }
    round2(billing as f64 / plan as f64 * 100.0)
}

/// part / whole × 100 rounded to 2 dp; 0 when whole is 0.
pub fn share_pct(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub total_products: u64,
    pub total_branches: u64,
    pub total_opening_stock: i64,
    pub total_available_stock: i64,
    pub total_in_transit_stock: i64,
    pub total_billing: i64,
    pub total_plan: i64,
    pub total_factory_stock: i64,
    pub achievement_pct: f64,
    pub low_stock_count: u64,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BranchPerformance {
    pub branch_id: i32,
    pub branch_name: String,
    pub state: String,
    pub billing: i64,
    pub plan: i64,
    pub achievement_pct: f64,
    pub available_stock: i64,
    pub market_share: f64,
    pub penetration: f64,
}

/// Billing and plan for one technology or star-rating bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SegmentBreakdown {
    #[schema(example = "Inverter")]
    pub segment: String,
    pub product_count: u64,
    pub billing: i64,
    pub plan: i64,
    pub achievement_pct: f64,
    /// This segment's share of total billing, in percent
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StatePerformance {
    pub state: String,
    pub branch_count: u64,
    pub billing: i64,
    pub plan: i64,
    pub achievement_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductSales {
    pub product_id: i32,
    pub material: String,
    pub technology: String,
    pub star_rating: i32,
    pub billing: i64,
    pub plan: i64,
    pub achievement_pct: f64,
}

/// All rows the analytics need, fetched in three queries.
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    pub products: Vec<product::Model>,
    pub branches: Vec<branch::Model>,
    pub inventory: Vec<inventory::Model>,
}

#[derive(Default)]
struct Totals {
    billing: i64,
    plan: i64,
    available: i64,
}

impl Dataset {
    pub fn summary(&self, low_stock_threshold: i32) -> DashboardSummary {
        let total_billing: i64 = self.inventory.iter().map(|r| r.billing as i64).sum();
        let total_plan: i64 = self.inventory.iter().map(|r| r.monthly_plan as i64).sum();

        DashboardSummary {
            total_products: self.products.len() as u64,
            total_branches: self.branches.len() as u64,
            total_opening_stock: self.inventory.iter().map(|r| r.opening_stock as i64).sum(),
            total_available_stock: self.inventory.iter().map(|r| r.available_stock as i64).sum(),
            total_in_transit_stock: self.inventory.iter().map(|r| r.in_transit_stock as i64).sum(),
            total_billing,
            total_plan,
            total_factory_stock: self.products.iter().map(|p| p.factory_stock as i64).sum(),
            achievement_pct: achievement_pct(total_billing, total_plan),
            low_stock_count: self
                .inventory
                .iter()
                .filter(|r| r.available_stock < low_stock_threshold)
                .count() as u64,
            generated_at: Utc::now(),
        }
    }

    fn totals_by<K, F>(&self, key: F) -> HashMap<K, Totals>
    where
        K: std::hash::Hash + Eq,
        F: Fn(&inventory::Model) -> Option<K>,
    {
        let mut totals: HashMap<K, Totals> = HashMap::new();
        for row in &self.inventory {
            if let Some(k) = key(row) {
                let entry = totals.entry(k).or_default();
                entry.billing += row.billing as i64;
                entry.plan += row.monthly_plan as i64;
                entry.available += row.available_stock as i64;
            }
        }
        totals
    }

    /// Per-branch figures, highest billing first.
    pub fn branch_performance(&self) -> Vec<BranchPerformance> {
        let totals = self.totals_by(|row| Some(row.branch_id));
        let mut rows: Vec<BranchPerformance> = self
            .branches
            .iter()
            .map(|b| {
                let t = totals.get(&b.id);
                let billing = t.map_or(0, |t| t.billing);
                let plan = t.map_or(0, |t| t.plan);
                BranchPerformance {
                    branch_id: b.id,
                    branch_name: b.name.clone(),
                    state: b.state.clone(),
                    billing,
                    plan,
                    achievement_pct: achievement_pct(billing, plan),
                    available_stock: t.map_or(0, |t| t.available),
                    market_share: b.market_share,
                    penetration: b.penetration,
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.billing
                .cmp(&a.billing)
                .then_with(|| a.branch_name.cmp(&b.branch_name))
        });
        rows
    }

    fn segments<F>(&self, segment_of: F) -> Vec<SegmentBreakdown>
    where
        F: Fn(&product::Model) -> String,
    {
        let product_segment: HashMap<i32, String> = self
            .products
            .iter()
            .map(|p| (p.id, segment_of(p)))
            .collect();

        let mut product_counts: BTreeMap<String, u64> = BTreeMap::new();
        for segment in product_segment.values() {
            *product_counts.entry(segment.clone()).or_default() += 1;
        }

        let totals = self.totals_by(|row| product_segment.get(&row.product_id).cloned());
        let grand_billing: i64 = totals.values().map(|t| t.billing).sum();

        let mut rows: Vec<SegmentBreakdown> = product_counts
            .into_iter()
            .map(|(segment, product_count)| {
                let t = totals.get(&segment);
                let billing = t.map_or(0, |t| t.billing);
                let plan = t.map_or(0, |t| t.plan);
                SegmentBreakdown {
                    segment,
                    product_count,
                    billing,
                    plan,
                    achievement_pct: achievement_pct(billing, plan),
                    share_pct: share_pct(billing, grand_billing),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.billing.cmp(&a.billing).then_with(|| a.segment.cmp(&b.segment)));
        rows
    }

    pub fn technology_breakdown(&self) -> Vec<SegmentBreakdown> {
        self.segments(|p| {
            let tech = p.technology.trim();
            if tech.is_empty() {
                "Unspecified".to_string()
            } else {
                tech.to_string()
            }
        })
    }

    pub fn star_rating_breakdown(&self) -> Vec<SegmentBreakdown> {
        self.segments(|p| format!("{} Star", p.star_rating))
    }

    pub fn state_breakdown(&self) -> Vec<StatePerformance> {
        let branch_state: HashMap<i32, String> = self
            .branches
            .iter()
            .map(|b| (b.id, state_label(&b.state)))
            .collect();

        let mut branch_counts: BTreeMap<String, u64> = BTreeMap::new();
        for state in branch_state.values() {
            *branch_counts.entry(state.clone()).or_default() += 1;
        }

        let totals = self.totals_by(|row| branch_state.get(&row.branch_id).cloned());

        let mut rows: Vec<StatePerformance> = branch_counts
            .into_iter()
            .map(|(state, branch_count)| {
                let t = totals.get(&state);
                let billing = t.map_or(0, |t| t.billing);
                let plan = t.map_or(0, |t| t.plan);
                StatePerformance {
                    state,
                    branch_count,
                    billing,
                    plan,
                    achievement_pct: achievement_pct(billing, plan),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.billing.cmp(&a.billing).then_with(|| a.state.cmp(&b.state)));
        rows
    }

    /// Materials ordered by billing, highest first.
    pub fn top_products(&self, limit: usize) -> Vec<ProductSales> {
        let totals = self.totals_by(|row| Some(row.product_id));
        let mut rows: Vec<ProductSales> = self
            .products
            .iter()
            .map(|p| {
                let t = totals.get(&p.id);
                let billing = t.map_or(0, |t| t.billing);
                let plan = t.map_or(0, |t| t.plan);
                ProductSales {
                    product_id: p.id,
                    material: p.material.clone(),
                    technology: p.technology.clone(),
                    star_rating: p.star_rating,
                    billing,
                    plan,
                    achievement_pct: achievement_pct(billing, plan),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.billing.cmp(&a.billing).then_with(|| a.material.cmp(&b.material)));
        rows.truncate(limit);
        rows
    }
}

fn state_label(state: &str) -> String {
    let trimmed = state.trim();
    if trimmed.is_empty() {
        "Unspecified".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Aggregate sales and stock figures across branches and products
#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<DatabaseConnection>,
    low_stock_threshold: i32,
}

impl AnalyticsService {
    pub fn new(db: Arc<DatabaseConnection>, low_stock_threshold: i32) -> Self {
        Self {
            db,
            low_stock_threshold,
        }
    }

    pub async fn load(&self) -> Result<Dataset, ServiceError> {
        let db = &*self.db;
        let dataset = Dataset {
            products: product::Entity::find().all(db).await?,
            branches: branch::Entity::find().all(db).await?,
            inventory: inventory::Entity::find().all(db).await?,
        };
        debug!(
            products = dataset.products.len(),
            branches = dataset.branches.len(),
            rows = dataset.inventory.len(),
            "Loaded analytics dataset"
        );
        Ok(dataset)
    }

    pub async fn summary(&self) -> Result<DashboardSummary, ServiceError> {
        Ok(self.load().await?.summary(self.low_stock_threshold))
    }

    pub async fn branch_performance(&self) -> Result<Vec<BranchPerformance>, ServiceError> {
        Ok(self.load().await?.branch_performance())
    }

    pub async fn technology_breakdown(&self) -> Result<Vec<SegmentBreakdown>, ServiceError> {
        Ok(self.load().await?.technology_breakdown())
    }

    pub async fn star_rating_breakdown(&self) -> Result<Vec<SegmentBreakdown>, ServiceError> {
        Ok(self.load().await?.star_rating_breakdown())
    }

    pub async fn state_breakdown(&self) -> Result<Vec<StatePerformance>, ServiceError> {
        Ok(self.load().await?.state_breakdown())
    }

    pub async fn top_products(&self, limit: usize) -> Result<Vec<ProductSales>, ServiceError> {
        Ok(self.load().await?.top_products(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;

    fn product(id: i32, material: &str, tech: &str, stars: i32) -> product::Model {
        product::Model {
            id,
            material: material.into(),
            tonnage: 1.5,
            star_rating: stars,
            technology: tech.into(),
            price: Decimal::new(3500000, 2),
            factory_stock: 10,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn branch(id: i32, name: &str, state: &str) -> branch::Model {
        branch::Model {
            id,
            name: name.into(),
            state: state.into(),
            market_share: 12.5,
            penetration: 40.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn row(id: i32, product_id: i32, branch_id: i32, billing: i32, plan: i32, available: i32) -> inventory::Model {
        inventory::Model {
            id,
            product_id,
            branch_id,
            opening_stock: available + billing,
            available_stock: available,
            in_transit_stock: 0,
            billing,
            monthly_plan: plan,
            updated_at: Utc::now(),
        }
    }

    fn dataset() -> Dataset {
        Dataset {
            products: vec![
                product(1, "AC-INV-5", "Inverter", 5),
                product(2, "AC-FIX-3", "Fixed Speed", 3),
                product(3, "AC-INV-3", "Inverter", 3),
            ],
            branches: vec![
                branch(1, "Chennai", "Tamil Nadu"),
                branch(2, "Coimbatore", "Tamil Nadu"),
                branch(3, "Pune", "Maharashtra"),
            ],
            inventory: vec![
                row(1, 1, 1, 30, 40, 5),
                row(2, 2, 1, 10, 20, 50),
                row(3, 3, 2, 20, 20, 8),
                row(4, 1, 3, 40, 20, 30),
            ],
        }
    }

    #[rstest]
    #[case(50, 100, 50.0)]
    #[case(1, 3, 33.33)]
    #[case(2, 3, 66.67)]
    #[case(10, 0, 0.0)]
    #[case(0, 10, 0.0)]
    fn achievement_is_rounded_and_zero_safe(#[case] billing: i64, #[case] plan: i64, #[case] expected: f64) {
        assert_eq!(achievement_pct(billing, plan), expected);
    }

    #[test]
    fn summary_totals_rows_and_products() {
        let summary = dataset().summary(10);
        assert_eq!(summary.total_products, 3);
        assert_eq!(summary.total_branches, 3);
        assert_eq!(summary.total_billing, 100);
        assert_eq!(summary.total_plan, 100);
        assert_eq!(summary.total_available_stock, 93);
        assert_eq!(summary.total_factory_stock, 30);
        assert_eq!(summary.achievement_pct, 100.0);
        assert_eq!(summary.low_stock_count, 2);
    }

    #[test]
    fn empty_dataset_summary_is_all_zero() {
        let summary = Dataset::default().summary(10);
        assert_eq!(summary.total_billing, 0);
        assert_eq!(summary.achievement_pct, 0.0);
        assert_eq!(summary.low_stock_count, 0);
    }

    #[test]
    fn branches_sorted_by_billing_desc() {
        let rows = dataset().branch_performance();
        let names: Vec<&str> = rows.iter().map(|r| r.branch_name.as_str()).collect();
        assert_eq!(names, vec!["Chennai", "Pune", "Coimbatore"]);
        assert_eq!(rows[0].billing, 40);
        assert_eq!(rows[0].plan, 60);
        assert_eq!(rows[0].achievement_pct, 66.67);
        assert_eq!(rows[1].achievement_pct, 200.0);
    }

    #[test]
    fn technology_shares_sum_to_hundred() {
        let rows = dataset().technology_breakdown();
        assert_eq!(rows[0].segment, "Inverter");
        assert_eq!(rows[0].billing, 90);
        assert_eq!(rows[0].product_count, 2);
        assert_eq!(rows[0].share_pct, 90.0);
        assert_eq!(rows[1].segment, "Fixed Speed");
        assert_eq!(rows[1].share_pct, 10.0);
    }

    #[test]
    fn star_rating_buckets() {
        let rows = dataset().star_rating_breakdown();
        assert_eq!(rows[0].segment, "5 Star");
        assert_eq!(rows[0].billing, 70);
        assert_eq!(rows[1].segment, "3 Star");
        assert_eq!(rows[1].billing, 30);
        assert_eq!(rows[1].product_count, 2);
    }

    #[test]
    fn states_group_branches() {
        let rows = dataset().state_breakdown();
        assert_eq!(rows[0].state, "Tamil Nadu");
        assert_eq!(rows[0].branch_count, 2);
        assert_eq!(rows[0].billing, 60);
        assert_eq!(rows[1].state, "Maharashtra");
        assert_eq!(rows[1].achievement_pct, 200.0);
    }

    #[test]
    fn top_products_respects_limit() {
        let rows = dataset().top_products(2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].material, "AC-INV-5");
        assert_eq!(rows[0].billing, 70);
        assert_eq!(rows[1].material, "AC-INV-3");
    }
}
