use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// Registers the `bearer_auth` scheme referenced by every protected path
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                Http::builder()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Sales Dashboard API",
        version = "0.1.0",
        description = r#"
# Sales Dashboard API

Backend for the sales and inventory analytics dashboard.

## Features

- **Catalog**: Products (materials) and branches with per-branch inventory
- **Ingestion**: Upload `.csv` or `.xlsx` sales sheets; re-imports update in place
- **Analytics**: Totals, plan achievement, technology/star-rating/state breakdowns
- **Chatbot**: Keyword-driven answers about stock and sales

## Authentication

Every endpoint except login, status and health requires a JWT obtained from
`POST /api/auth/login`:

```
Authorization: Bearer <your-jwt-token>
```

Creating, updating and deleting users, products, branches and inventory, and
uploading sheets, requires the `admin` role.

## Error Handling

Failures return a JSON body with the HTTP status category and a message:

```json
{
  "error": "Not Found",
  "message": "Not found: Product 42 not found",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Login, token verification and profile"),
        (name = "users", description = "Account administration"),
        (name = "products", description = "Product catalog"),
        (name = "branches", description = "Sales branches"),
        (name = "inventory", description = "Per-branch stock and sales figures"),
        (name = "analytics", description = "Dashboard aggregates"),
        (name = "uploads", description = "Spreadsheet ingestion"),
        (name = "chat", description = "Rule-based assistant"),
        (name = "health", description = "Health and status endpoints")
    ),
    paths(
        // Auth
        crate::handlers::auth::login,
        crate::handlers::auth::verify,
        crate::handlers::auth::change_password,
        crate::handlers::auth::get_profile,
        crate::handlers::auth::update_profile,

        // Users
        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::delete_user,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::product_filters,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        // Branches
        crate::handlers::branches::list_branches,
        crate::handlers::branches::get_branch,
        crate::handlers::branches::create_branch,
        crate::handlers::branches::update_branch,
        crate::handlers::branches::delete_branch,

        // Inventory
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::get_inventory,
        crate::handlers::inventory::update_inventory,
        crate::handlers::inventory::upsert_inventory,

        // Analytics
        crate::handlers::analytics::summary,
        crate::handlers::analytics::branch_performance,
        crate::handlers::analytics::technology_breakdown,
        crate::handlers::analytics::star_rating_breakdown,
        crate::handlers::analytics::state_breakdown,
        crate::handlers::analytics::top_products,

        // Uploads
        crate::handlers::uploads::upload_file,
        crate::handlers::uploads::list_uploads,

        // Chat
        crate::handlers::chat::chat,

        // Health
        crate::handlers::health::health_check,
        crate::api_status,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::ResponseMeta,
            crate::StatusResponse,
            crate::errors::ErrorResponse,
            crate::auth::IssuedToken,

            // Auth & users
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::LoginResponse,
            crate::handlers::auth::VerifyResponse,
            crate::services::users::UserProfile,
            crate::services::users::CreateUserRequest,
            crate::services::users::UpdateProfileRequest,
            crate::services::users::ChangePasswordRequest,

            // Catalog
            crate::entities::product::Model,
            crate::entities::branch::Model,
            crate::services::products::CreateProductRequest,
            crate::services::products::UpdateProductRequest,
            crate::services::products::ProductFilters,
            crate::services::products::ProductDetail,
            crate::services::branches::CreateBranchRequest,
            crate::services::branches::UpdateBranchRequest,
            crate::services::branches::BranchInventorySummary,
            crate::services::branches::BranchDetail,

            // Inventory
            crate::entities::inventory::Model,
            crate::services::inventory::InventoryView,
            crate::services::inventory::UpdateInventoryRequest,
            crate::services::inventory::UpsertInventoryRequest,

            // Analytics
            crate::services::analytics::DashboardSummary,
            crate::services::analytics::BranchPerformance,
            crate::services::analytics::SegmentBreakdown,
            crate::services::analytics::StatePerformance,
            crate::services::analytics::ProductSales,

            // Uploads
            crate::entities::file_upload::Model,
            crate::handlers::uploads::UploadForm,
            crate::services::uploads::UploadOutcome,
            crate::services::import::ImportReport,
            crate::services::import::RowError,

            // Chat
            crate::services::chatbot::ChatRequest,
            crate::services::chatbot::ChatResponse,
            crate::services::chatbot::Intent,

            // Health
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentHealth,
            crate::handlers::health::ComponentStatus,
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
