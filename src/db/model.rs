//! Row decoding for the SQLite tables.
//!
//! Ids are stored as UUID text and enum columns as their lower-case names, so
//! every decoder goes through [`uuid_col`] and [`enum_col`] instead of relying
//! on driver-level conversions.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::model::{
    Product, ProductStatus, ProductSummary, Request, RequestStatus, Seller, SellerRequest,
    SellerRequestStatus, SellerStatus, TransactionKind,
};

fn uuid_col(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Ok(Uuid::parse_str(&raw)?)
}

fn opt_uuid_col(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| Uuid::parse_str(&s)).transpose().map_err(Into::into)
}

fn enum_col<T>(row: &SqliteRow, column: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    let raw: String = row.try_get(column)?;
    parse(&raw).ok_or_else(|| {
        StoreError::Persistence(format!("unexpected value {:?} in column {}", raw, column))
    })
}

pub fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: uuid_col(row, "id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        category: row.try_get("category")?,
        image_url: row.try_get("image_url")?,
        seller_id: opt_uuid_col(row, "seller_id")?,
        status: enum_col(row, "status", ProductStatus::parse)?,
        kind: enum_col(row, "type", TransactionKind::parse)?,
        deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
    })
}

pub fn product_summary_from_row(row: &SqliteRow) -> Result<ProductSummary> {
    Ok(ProductSummary {
        id: uuid_col(row, "id")?,
        title: row.try_get("title")?,
        status: enum_col(row, "status", ProductStatus::parse)?,
    })
}

pub fn request_from_row(row: &SqliteRow) -> Result<Request> {
    Ok(Request {
        id: uuid_col(row, "id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        user_name: row.try_get("user_name")?,
        user_email: row.try_get("user_email")?,
        user_phone: row.try_get("user_phone")?,
        status: enum_col(row, "status", RequestStatus::parse)?,
        kind: enum_col(row, "type", TransactionKind::parse)?,
        notes: row.try_get("notes")?,
    })
}

pub fn seller_from_row(row: &SqliteRow) -> Result<Seller> {
    Ok(Seller {
        id: uuid_col(row, "id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        user_id: opt_uuid_col(row, "user_id")?,
        company_name: row.try_get("company_name")?,
        contact_name: row.try_get("contact_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        status: enum_col(row, "status", SellerStatus::parse)?,
    })
}

pub fn seller_request_from_row(row: &SqliteRow) -> Result<SellerRequest> {
    Ok(SellerRequest {
        id: uuid_col(row, "id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        company_name: row.try_get("company_name")?,
        contact_name: row.try_get("contact_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        business_description: row.try_get("business_description")?,
        product_categories: row.try_get("product_categories")?,
        status: enum_col(row, "status", SellerRequestStatus::parse)?,
    })
}

/// The request a joined `request_products` row belongs to.
pub fn link_request_id(row: &SqliteRow) -> Result<Uuid> {
    uuid_col(row, "request_id")
}

/// The seller a joined product summary belongs to.
pub fn summary_seller_id(row: &SqliteRow) -> Result<Uuid> {
    uuid_col(row, "seller_id")
}
