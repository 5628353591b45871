use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryOrder, QuerySelect,
    Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entities::file_upload::{self, Entity as FileUpload},
    errors::ServiceError,
    services::import::{ImportReport, ImportService, SourceFormat},
};

/// Stored upload together with what the import made of it
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadOutcome {
    pub upload: file_upload::Model,
    pub report: ImportReport,
}

/// Keeps uploaded spreadsheets on disk and feeds them to the importer
#[derive(Clone)]
pub struct UploadService {
    db: Arc<DatabaseConnection>,
    imports: ImportService,
    upload_dir: PathBuf,
    max_upload_bytes: usize,
}

impl UploadService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        imports: ImportService,
        upload_dir: impl Into<PathBuf>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            db,
            imports,
            upload_dir: upload_dir.into(),
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Saves the file, records it, and imports it.
    ///
    /// A failed import is recorded on the upload row and then returned as the error.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn store_and_import(
        &self,
        original_name: &str,
        content_type: Option<String>,
        bytes: &[u8],
        uploaded_by: Option<i32>,
    ) -> Result<UploadOutcome, ServiceError> {
        SourceFormat::from_file_name(original_name)?;
        if bytes.is_empty() {
            return Err(ServiceError::BadRequest("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(ServiceError::PayloadTooLarge(format!(
                "File exceeds the {} byte upload limit",
                self.max_upload_bytes
            )));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let stored_path = self.upload_dir.join(stored_file_name(original_name));
        tokio::fs::write(&stored_path, bytes).await?;

        let record = file_upload::ActiveModel {
            original_name: Set(original_name.to_string()),
            stored_path: Set(stored_path.to_string_lossy().into_owned()),
            content_type: Set(content_type),
            size_bytes: Set(bytes.len() as i64),
            uploaded_by: Set(uploaded_by),
            processed: Set(false),
            rows_imported: Set(0),
            error_message: Set(None),
            uploaded_at: Set(Utc::now()),
            processed_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        info!(upload_id = record.id, path = %stored_path.display(), "Upload stored");

        let upload_id = record.id;
        let mut active = record.into_active_model();
        active.processed_at = Set(Some(Utc::now()));

        match self.imports.import_bytes(original_name, bytes).await {
            Ok(report) => {
                active.processed = Set(true);
                active.rows_imported = Set(i32::try_from(report.rows_imported).unwrap_or(i32::MAX));
                let upload = active.update(&*self.db).await?;
                Ok(UploadOutcome { upload, report })
            }
            Err(err) => {
                error!(upload_id, error = %err, "Import of uploaded file failed");
                active.error_message = Set(Some(err.response_message()));
                active.update(&*self.db).await?;
                Err(err)
            }
        }
    }

    /// Most recent uploads first.
    pub async fn list(&self, limit: u64) -> Result<Vec<file_upload::Model>, ServiceError> {
        Ok(FileUpload::find()
            .order_by_desc(file_upload::Column::UploadedAt)
            .order_by_desc(file_upload::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }
}

/// Unique on-disk name that keeps a readable, sanitized form of the original.
fn stored_file_name(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", Uuid::new_v4().simple(), safe)
}
