pub mod branch;
pub mod file_upload;
pub mod inventory;
pub mod product;
pub mod user;
