pub mod analytics;
pub mod auth;
pub mod branches;
pub mod chat;
pub mod common;
pub mod health;
pub mod inventory;
pub mod products;
pub mod uploads;
pub mod users;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    services::{
        analytics::AnalyticsService, branches::BranchService, chatbot::ChatbotService,
        import::ImportService, inventory::InventoryService, products::ProductService,
        uploads::UploadService, users::UserService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<UserService>,
    pub products: Arc<ProductService>,
    pub branches: Arc<BranchService>,
    pub inventory: Arc<InventoryService>,
    pub analytics: Arc<AnalyticsService>,
    pub uploads: Arc<UploadService>,
    pub chatbot: Arc<ChatbotService>,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig) -> Self {
        let inventory = InventoryService::new(db.clone(), config.low_stock_threshold);
        let analytics = AnalyticsService::new(db.clone(), config.low_stock_threshold);
        let imports = ImportService::new(db.clone());

        Self {
            users: Arc::new(UserService::new(db.clone())),
            products: Arc::new(ProductService::new(db.clone())),
            branches: Arc::new(BranchService::new(db.clone())),
            chatbot: Arc::new(ChatbotService::new(
                db.clone(),
                analytics.clone(),
                inventory.clone(),
            )),
            uploads: Arc::new(UploadService::new(
                db,
                imports,
                config.upload_dir.clone(),
                config.max_upload_bytes,
            )),
            inventory: Arc::new(inventory),
            analytics: Arc::new(analytics),
        }
    }
}
