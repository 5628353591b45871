//! Spreadsheet ingestion: parse a CSV/XLSX sheet, fold its rows into
//! products, branches and inventory, and write everything in one transaction.

pub mod parser;
pub mod pipeline;

use std::path::Path;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{info, instrument, warn};

use crate::{db, errors::ServiceError, tracing::with_metrics};

pub use parser::{RowError, SourceFormat};
pub use pipeline::ImportReport;

#[derive(Clone)]
pub struct ImportService {
    db: Arc<DatabaseConnection>,
}

impl ImportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Imports a file from disk; the extension picks the parser.
    pub async fn import_file(&self, path: &Path) -> Result<ImportReport, ServiceError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ServiceError::BadRequest(format!("Invalid file path {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ServiceError::ImportError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        self.import_bytes(&name, &bytes).await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn import_bytes(&self, file_name: &str, bytes: &[u8]) -> Result<ImportReport, ServiceError> {
        with_metrics("sales_import", || async {
            let format = SourceFormat::from_file_name(file_name)?;
            let sheet = parser::parse(format, bytes)?;
            if !sheet.errors.is_empty() {
                warn!(
                    file = %file_name,
                    skipped = sheet.errors.len(),
                    "Some rows could not be imported"
                );
            }

            let batch = pipeline::build_batch(&sheet.records);
            let counts = db::transaction(&self.db, move |txn| {
                Box::pin(async move { pipeline::write_batch(txn, batch).await })
            })
            .await?;

            let report = ImportReport {
                rows_read: sheet.rows_read,
                rows_imported: sheet.rows_read - sheet.errors.len(),
                rows_skipped: sheet.errors.len(),
                errors: sheet.errors,
                products_created: counts.products_created,
                products_updated: counts.products_updated,
                branches_created: counts.branches_created,
                branches_updated: counts.branches_updated,
                inventory_created: counts.inventory_created,
                inventory_updated: counts.inventory_updated,
            };
            info!(
                file = %file_name,
                format = %format,
                rows_imported = report.rows_imported,
                rows_skipped = report.rows_skipped,
                "Import finished"
            );
            Ok::<_, ServiceError>(report)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{establish_connection_with_config, run_migrations, DbConfig},
        entities::{inventory, product},
    };
    use assert_matches::assert_matches;
    use sea_orm::{EntityTrait, PaginatorTrait};

    async fn service() -> (ImportService, Arc<DatabaseConnection>) {
        let pool = establish_connection_with_config(&DbConfig::for_url("sqlite::memory:"))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let db = Arc::new(pool);
        (ImportService::new(db.clone()), db)
    }

    const SHEET: &str = "Material,Branch,State,Technology,Tonnage,Star Rating,Price,Billing,Plan\n\
        AC-15-INV,Chennai,Tamil Nadu,Inverter,1.5,5,42990,30,40\n\
        AC-15-INV,Pune,Maharashtra,Inverter,1.5,5,42990,12,10\n\
        AC-10-FIX,Chennai,Tamil Nadu,Fixed Speed,1,3,29990,5,20\n\
        ,Chennai,Tamil Nadu,Inverter,1,3,1,1,1\n";

    #[tokio::test]
    async fn reimport_is_idempotent() {
        let (service, db) = service().await;

        let first = service.import_bytes("sales.csv", SHEET.as_bytes()).await.unwrap();
        assert_eq!(first.rows_read, 4);
        assert_eq!(first.rows_imported, 3);
        assert_eq!(first.rows_skipped, 1);
        assert_eq!(first.errors[0].row, 5);
        assert_eq!(first.products_created, 2);
        assert_eq!(first.branches_created, 2);
        assert_eq!(first.inventory_created, 3);

        let second = service.import_bytes("sales.csv", SHEET.as_bytes()).await.unwrap();
        assert_eq!(second.products_created, 0);
        assert_eq!(second.products_updated, 2);
        assert_eq!(second.inventory_created, 0);
        assert_eq!(second.inventory_updated, 3);

        assert_eq!(product::Entity::find().count(&*db).await.unwrap(), 2);
        let rows = inventory::Entity::find().all(&*db).await.unwrap();
        assert_eq!(rows.len(), 3);
        let chennai_inv = rows
            .iter()
            .find(|r| r.billing == 30)
            .expect("row for AC-15-INV at Chennai");
        assert_eq!(chennai_inv.opening_stock, 48);
        assert_eq!(chennai_inv.available_stock, 18);
        assert_eq!(chennai_inv.in_transit_stock, 5);
    }

    #[tokio::test]
    async fn missing_column_touches_nothing() {
        let (service, db) = service().await;
        let result = service
            .import_bytes("sales.csv", b"Material,Billing\nAC-1,5\n")
            .await;
        assert_matches!(result, Err(ServiceError::ImportError(_)));
        assert_eq!(product::Entity::find().count(&*db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn import_file_reads_from_disk() {
        let (service, _db) = service().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("march.csv");
        std::fs::write(&path, SHEET).unwrap();

        let report = service.import_file(&path).await.unwrap();
        assert_eq!(report.rows_imported, 3);
    }
}
