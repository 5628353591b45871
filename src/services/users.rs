use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{self, UserRole},
    entities::user::{self, Entity as User},
    errors::ServiceError,
};

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid username regex"));

/// Public view of a user; never carries the password hash
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: i32,
    #[schema(example = "priya")]
    pub username: String,
    #[schema(example = "Priya Natarajan")]
    pub full_name: String,
    #[schema(example = "user")]
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<user::Model> for UserProfile {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            full_name: model.full_name,
            role: model.role,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 3, max = 50, message = "Username must be 3 to 50 characters"),
        regex(path = "USERNAME_RE", message = "Username may contain letters, digits, '.', '_' and '-'")
    )]
    #[schema(example = "ravi")]
    pub username: String,

    #[schema(example = "s3cure-pass")]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Full name must be 1 to 100 characters"))]
    #[schema(example = "Ravi Kumar")]
    pub full_name: String,

    /// `admin` or `user`; defaults to `user`
    #[schema(example = "user")]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Full name must be 1 to 100 characters"))]
    pub full_name: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Account management and credential checks
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Verifies a username/password pair.
    ///
    /// Unknown usernames and wrong passwords produce the same error.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let found = self.find_by_username(username.trim()).await?;
        match found {
            Some(user) if auth::verify_password(password, &user.password_hash) => Ok(user),
            _ => {
                warn!(username = %username, "Failed login attempt");
                Err(ServiceError::Unauthorized("Invalid credentials".to_string()))
            }
        }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(User::find()
            .filter(user::Column::Username.eq(username))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_user(&self, id: i32) -> Result<user::Model, ServiceError> {
        User::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, ServiceError> {
        let users = User::find()
            .order_by_asc(user::Column::Username)
            .all(&*self.db)
            .await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserProfile, ServiceError> {
        request.validate()?;
        auth::check_policy(&request.password)
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let role = match request.role.as_deref() {
            Some(raw) => UserRole::from_str(raw.trim().to_lowercase().as_str())
                .map_err(|_| ServiceError::ValidationError(format!("Unknown role '{}'", raw)))?,
            None => UserRole::default(),
        };

        let username = request.username.trim().to_string();
        if self.find_by_username(&username).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let created = self
            .insert_user(&username, &request.password, request.full_name.trim(), role)
            .await?;
        info!(user_id = created.id, role = %role, "User created");
        Ok(created.into())
    }

    async fn insert_user(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
        role: UserRole,
    ) -> Result<user::Model, ServiceError> {
        let password_hash =
            auth::hash_password(password).map_err(|e| ServiceError::HashError(e.to_string()))?;

        let now = Utc::now();
        let model = user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            full_name: Set(full_name.to_string()),
            role: Set(role.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        Ok(model.insert(&*self.db).await?)
    }

    #[instrument(skip(self, request))]
    pub async fn change_password(
        &self,
        user_id: i32,
        request: ChangePasswordRequest,
    ) -> Result<(), ServiceError> {
        let user = self.get_user(user_id).await?;

        if !auth::verify_password(&request.current_password, &user.password_hash) {
            return Err(ServiceError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }
        auth::check_policy(&request.new_password)
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        if request.new_password == request.current_password {
            return Err(ServiceError::BadRequest(
                "New password must differ from the current password".to_string(),
            ));
        }

        let password_hash = auth::hash_password(&request.new_password)
            .map_err(|e| ServiceError::HashError(e.to_string()))?;
        let mut active = user.into_active_model();
        active.password_hash = Set(password_hash);
        active.update(&*self.db).await?;

        info!(user_id, "Password changed");
        Ok(())
    }

    pub async fn update_profile(
        &self,
        user_id: i32,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile, ServiceError> {
        request.validate()?;
        let mut active = self.get_user(user_id).await?.into_active_model();
        active.full_name = Set(request.full_name.trim().to_string());
        Ok(active.update(&*self.db).await?.into())
    }

    /// Deletes another user's account; admins cannot delete themselves.
    #[instrument(skip(self))]
    pub async fn delete_user(&self, acting_user_id: i32, id: i32) -> Result<(), ServiceError> {
        if acting_user_id == id {
            return Err(ServiceError::BadRequest(
                "You cannot delete your own account".to_string(),
            ));
        }
        let result = User::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("User", id));
        }
        info!(user_id = id, "User deleted");
        Ok(())
    }

    /// Creates the admin account unless the username already exists.
    /// Returns true when an account was created.
    pub async fn seed_admin(
        &self,
        username: &str,
        password: &str,
        full_name: &str,
    ) -> Result<bool, ServiceError> {
        if self.find_by_username(username).await?.is_some() {
            return Ok(false);
        }
        auth::check_policy(password).map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        let admin = self
            .insert_user(username, password, full_name, UserRole::Admin)
            .await?;
        info!(user_id = admin.id, username = %username, "Seeded admin account");
        Ok(true)
    }
}
