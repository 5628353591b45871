use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{AsRefStr, Display};
use tracing::{debug, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::{branch, inventory, product},
    errors::ServiceError,
    services::{
        analytics::AnalyticsService,
        branches::BranchInventorySummary,
        inventory::InventoryService,
    },
};

static MATERIAL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9./_-]*").expect("valid token regex"));

/// What the chatbot decided a message was about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    Greeting,
    Help,
    LowStock,
    TopProducts,
    TopBranch,
    Achievement,
    TotalSales,
    TechnologyMix,
    ProductCount,
    BranchLookup,
    ProductStock,
    Fallback,
}

/// Keyword rules checked in order; the first hit wins.
const RULES: &[(Intent, &[&str])] = &[
    (Intent::Greeting, &["hello", "hi", "hey", "good morning"]),
    (Intent::Help, &["help", "what can you"]),
    (Intent::LowStock, &["low stock", "out of stock", "shortage"]),
    (Intent::TopProducts, &["top product", "best selling", "best seller"]),
    (Intent::TopBranch, &["top branch", "best branch", "best performing"]),
    (Intent::Achievement, &["achievement", "target", "plan"]),
    (Intent::TotalSales, &["total sales", "billing", "sales"]),
    (Intent::TechnologyMix, &["technology", "inverter"]),
    (Intent::ProductCount, &["how many products", "product count"]),
];

const FALLBACK_REPLY: &str = "I did not understand that. Ask me about sales, targets, \
    low stock, top products, top branches, a branch name, or the stock of a material code.";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChatRequest {
    #[validate(length(max = 1000, message = "message must be at most 1000 characters"))]
    #[schema(example = "Which branch is performing best?")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub intent: Intent,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Keyword match that must start on a word boundary. Keywords shorter than
/// four characters must also end on one, so "hi" does not fire on "which".
pub fn contains_keyword(message: &str, keyword: &str) -> bool {
    let strict_end = keyword.chars().count() < 4;
    message.match_indices(keyword).any(|(start, _)| {
        let starts_clean = message[..start].chars().next_back().map_or(true, |c| !is_word_char(c));
        let ends_clean = message[start + keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word_char(c));
        starts_clean && (!strict_end || ends_clean)
    })
}

/// Rules 1 to 9; `message` must already be lower-cased.
pub fn match_static(message: &str) -> Option<Intent> {
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| contains_keyword(message, k)))
        .map(|(intent, _)| *intent)
}

/// Longest branch name that appears in the message as whole words.
pub fn match_branch<'a>(message: &str, branch_names: &'a [String]) -> Option<&'a str> {
    branch_names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter(|name| {
            let needle = name.to_lowercase();
            message.match_indices(needle.as_str()).any(|(start, _)| {
                let before = message[..start].chars().next_back();
                let after = message[start + needle.len()..].chars().next();
                before.map_or(true, |c| !is_word_char(c)) && after.map_or(true, |c| !is_word_char(c))
            })
        })
        .max_by_key(|name| name.len())
}

/// A material code named in a message that also asks about stock.
pub fn match_material(message: &str, materials: &[String]) -> Option<String> {
    if !contains_keyword(&message.to_lowercase(), "stock") {
        return None;
    }
    MATERIAL_TOKEN_RE
        .find_iter(message)
        .map(|m| m.as_str().trim_end_matches(['.', '-', '/', '_']).to_uppercase())
        .find(|token| materials.iter().any(|m| m == token))
}

/// Answers canned questions from the live data
#[derive(Clone)]
pub struct ChatbotService {
    db: Arc<DatabaseConnection>,
    analytics: AnalyticsService,
    inventory: InventoryService,
}

impl ChatbotService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        analytics: AnalyticsService,
        inventory: InventoryService,
    ) -> Self {
        Self {
            db,
            analytics,
            inventory,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn respond(&self, request: ChatRequest) -> Result<ChatResponse, ServiceError> {
        request.validate()?;
        let message = request.message.trim();
        if message.is_empty() {
            return Err(ServiceError::BadRequest("message cannot be empty".to_string()));
        }
        let lowered = message.to_lowercase();

        if let Some(intent) = match_static(&lowered) {
            debug!(intent = %intent, "Matched keyword rule");
            return self.answer(intent).await;
        }

        let branch_names: Vec<String> = branch::Entity::find()
            .select_only()
            .column(branch::Column::Name)
            .into_tuple()
            .all(&*self.db)
            .await?;
        if let Some(name) = match_branch(&lowered, &branch_names) {
            return self.branch_lookup(name).await;
        }

        let materials: Vec<String> = product::Entity::find()
            .select_only()
            .column(product::Column::Material)
            .into_tuple()
            .all(&*self.db)
            .await?;
        if let Some(material) = match_material(message, &materials) {
            return self.product_stock(&material).await;
        }

        Ok(ChatResponse {
            intent: Intent::Fallback,
            reply: FALLBACK_REPLY.to_string(),
            data: None,
        })
    }

    async fn answer(&self, intent: Intent) -> Result<ChatResponse, ServiceError> {
        let (reply, data) = match intent {
            Intent::Greeting => (
                "Hello! I can answer questions about sales, targets, stock levels, branches \
                 and products. Type 'help' to see what to ask."
                    .to_string(),
                None,
            ),
            Intent::Help => (
                "Try: 'total sales', 'achievement', 'top products', 'top branch', \
                 'low stock', 'technology mix', 'how many products', a branch name, \
                 or 'stock of <material code>'."
                    .to_string(),
                None,
            ),
            Intent::LowStock => {
                let rows = self.inventory.low_stock(None).await?;
                let threshold = self.inventory.low_stock_threshold();
                let reply = if rows.is_empty() {
                    format!("No inventory rows are below {} units.", threshold)
                } else {
                    let lowest: Vec<String> = rows
                        .iter()
                        .take(5)
                        .map(|r| format!("{} at {} ({} units)", r.material, r.branch_name, r.available_stock))
                        .collect();
                    format!(
                        "{} inventory rows are below {} units. Lowest: {}.",
                        rows.len(),
                        threshold,
                        lowest.join(", ")
                    )
                };
                let top: Vec<_> = rows.into_iter().take(5).collect();
                (reply, Some(json!(top)))
            }
            Intent::TopProducts => {
                let top = self.analytics.top_products(5).await?;
                let reply = if top.iter().all(|p| p.billing == 0) {
                    "No sales have been recorded yet.".to_string()
                } else {
                    let names: Vec<String> = top
                        .iter()
                        .map(|p| format!("{} ({} units)", p.material, p.billing))
                        .collect();
                    format!("Top selling products: {}.", names.join(", "))
                };
                (reply, Some(json!(top)))
            }
            Intent::TopBranch => {
                let branches = self.analytics.branch_performance().await?;
                match branches.first() {
                    Some(best) => (
                        format!(
                            "{} ({}) leads with {} units billed against a plan of {} ({}% achievement).",
                            best.branch_name, best.state, best.billing, best.plan, best.achievement_pct
                        ),
                        Some(json!(best)),
                    ),
                    None => ("No branches have been set up yet.".to_string(), None),
                }
            }
            Intent::Achievement => {
                let summary = self.analytics.summary().await?;
                (
                    format!(
                        "Overall achievement is {}%: {} units billed against a plan of {}.",
                        summary.achievement_pct, summary.total_billing, summary.total_plan
                    ),
                    Some(json!(summary)),
                )
            }
            Intent::TotalSales => {
                let summary = self.analytics.summary().await?;
                (
                    format!(
                        "Total billing is {} units across {} branches.",
                        summary.total_billing, summary.total_branches
                    ),
                    Some(json!(summary)),
                )
            }
            Intent::TechnologyMix => {
                let mix = self.analytics.technology_breakdown().await?;
                let reply = if mix.is_empty() {
                    "No products have been set up yet.".to_string()
                } else {
                    let parts: Vec<String> = mix
                        .iter()
                        .map(|s| format!("{} {}%", s.segment, s.share_pct))
                        .collect();
                    format!("Billing by technology: {}.", parts.join(", "))
                };
                (reply, Some(json!(mix)))
            }
            Intent::ProductCount => {
                let count = product::Entity::find().count(&*self.db).await?;
                (
                    format!("There are {} products in the catalogue.", count),
                    Some(json!({ "total_products": count })),
                )
            }
            Intent::BranchLookup | Intent::ProductStock | Intent::Fallback => {
                (FALLBACK_REPLY.to_string(), None)
            }
        };

        Ok(ChatResponse { intent, reply, data })
    }

    async fn branch_lookup(&self, name: &str) -> Result<ChatResponse, ServiceError> {
        let branches = branch::Entity::find().all(&*self.db).await?;
        let Some(found) = branches.into_iter().find(|b| b.name.trim() == name) else {
            return Ok(ChatResponse {
                intent: Intent::Fallback,
                reply: FALLBACK_REPLY.to_string(),
                data: None,
            });
        };

        let rows = inventory::Entity::find()
            .filter(inventory::Column::BranchId.eq(found.id))
            .all(&*self.db)
            .await?;
        let summary = BranchInventorySummary::from_rows(&rows);
        Ok(ChatResponse {
            intent: Intent::BranchLookup,
            reply: format!(
                "{} ({}) has billed {} units against a plan of {} ({}% achievement) \
                 with {} units available and {} in transit.",
                found.name,
                found.state,
                summary.total_billing,
                summary.total_plan,
                summary.achievement_pct,
                summary.total_available_stock,
                summary.total_in_transit_stock
            ),
            data: Some(json!({ "branch": found, "summary": summary })),
        })
    }

    async fn product_stock(&self, material: &str) -> Result<ChatResponse, ServiceError> {
        let Some(found) = product::Entity::find()
            .filter(product::Column::Material.eq(material))
            .one(&*self.db)
            .await?
        else {
            return Ok(ChatResponse {
                intent: Intent::Fallback,
                reply: FALLBACK_REPLY.to_string(),
                data: None,
            });
        };

        let rows = self.inventory.for_product(found.id).await?;
        let available: i64 = rows.iter().map(|r| r.available_stock as i64).sum();
        let in_transit: i64 = rows.iter().map(|r| r.in_transit_stock as i64).sum();
        Ok(ChatResponse {
            intent: Intent::ProductStock,
            reply: format!(
                "{} has {} units available across {} branches, {} in transit and {} at the factory.",
                found.material,
                available,
                rows.len(),
                in_transit,
                found.factory_stock
            ),
            data: Some(json!({ "product": found, "inventory": rows })),
        })
    }
}
