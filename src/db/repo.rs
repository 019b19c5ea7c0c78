use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteQueryResult,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::model::{
    link_request_id, product_from_row, product_summary_from_row, request_from_row,
    seller_from_row, seller_request_from_row, summary_seller_id,
};
use crate::error::{Result, StoreError};
use crate::model::{
    NewProduct, NewRequest, NewSeller, NewSellerRequest, Product, ProductFilter, ProductStatus,
    ProductSummary, Request, RequestProduct, RequestStatus, RequestWithProducts, Seller,
    SellerRequest, SellerRequestStatus, SellerStatus, SellerWithProducts, TransactionKind,
};

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    let options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);

    // Every connection to `sqlite::memory:` opens its own empty database, so
    // an in-memory pool is pinned to a single connection that never expires.
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = pool_options.connect_with(options).await?;
    debug!(url = %normalized, "sqlite pool ready");
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn expect_row(
    result: SqliteQueryResult,
    entity: &'static str,
    id: Uuid,
) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

// ---------------------------------------------------------------- products

#[instrument(skip_all)]
pub async fn list_products(pool: &Pool, filter: &ProductFilter) -> Result<Vec<Product>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT * FROM products WHERE deleted_at IS NULL");
    if let Some(kind) = filter.kind {
        qb.push(" AND type = ").push_bind(kind.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(seller_id) = filter.seller_id {
        qb.push(" AND seller_id = ").push_bind(seller_id.to_string());
    }
    qb.push(" ORDER BY created_at DESC, rowid DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit as i64);
    }

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(product_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_product(pool: &Pool, id: Uuid) -> Result<Product> {
    let row = sqlx::query("SELECT * FROM products WHERE id = ? AND deleted_at IS NULL")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => product_from_row(&row),
        None => Err(StoreError::not_found("product", id)),
    }
}

#[instrument(skip_all)]
pub async fn insert_product(pool: &Pool, product: &NewProduct) -> Result<Product> {
    let row = Product {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        title: product.title.clone(),
        description: product.description.clone(),
        price: product.price,
        category: product.category.clone(),
        image_url: product.image_url.clone(),
        seller_id: product.seller_id,
        status: product.status,
        kind: product.kind,
        deleted_at: None,
    };
    sqlx::query(
        "INSERT INTO products (id, created_at, title, description, price, category, image_url, seller_id, status, type) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id.to_string())
    .bind(row.created_at)
    .bind(&row.title)
    .bind(&row.description)
    .bind(row.price)
    .bind(&row.category)
    .bind(&row.image_url)
    .bind(row.seller_id.map(|id| id.to_string()))
    .bind(row.status.as_str())
    .bind(row.kind.as_str())
    .execute(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn set_product_status(pool: &Pool, id: Uuid, status: ProductStatus) -> Result<()> {
    let result = sqlx::query("UPDATE products SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    expect_row(result, "product", id)
}

#[instrument(skip_all)]
pub async fn soft_delete_product(pool: &Pool, id: Uuid) -> Result<()> {
    let result = sqlx::query("UPDATE products SET deleted_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    expect_row(result, "product", id)
}

// ---------------------------------------------------------------- requests

async fn insert_request_tx(tx: &mut Transaction<'_, Sqlite>, request: &NewRequest) -> Result<Request> {
    let row = Request {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        user_name: request.user_name.clone(),
        user_email: request.user_email.clone(),
        user_phone: request.user_phone.clone(),
        status: request.status,
        kind: request.kind,
        notes: None,
    };
    sqlx::query(
        "INSERT INTO requests (id, created_at, user_name, user_email, user_phone, status, type) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id.to_string())
    .bind(row.created_at)
    .bind(&row.user_name)
    .bind(&row.user_email)
    .bind(&row.user_phone)
    .bind(row.status.as_str())
    .bind(row.kind.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(row)
}

async fn insert_links_tx(tx: &mut Transaction<'_, Sqlite>, links: &[RequestProduct]) -> Result<()> {
    for link in links {
        sqlx::query("INSERT INTO request_products (request_id, product_id) VALUES (?, ?)")
            .bind(link.request_id.to_string())
            .bind(link.product_id.to_string())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn insert_request(pool: &Pool, request: &NewRequest) -> Result<Request> {
    let mut tx = pool.begin().await?;
    let row = insert_request_tx(&mut tx, request).await?;
    tx.commit().await?;
    Ok(row)
}

/// All links land or none do.
#[instrument(skip_all)]
pub async fn insert_links(pool: &Pool, links: &[RequestProduct]) -> Result<()> {
    if links.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    insert_links_tx(&mut tx, links).await?;
    tx.commit().await?;
    Ok(())
}

/// Request row and links in one transaction; a failed link leaves nothing behind.
#[instrument(skip_all)]
pub async fn insert_request_with_products(
    pool: &Pool,
    request: &NewRequest,
    product_ids: &[Uuid],
) -> Result<Request> {
    let mut tx = pool.begin().await?;
    let row = insert_request_tx(&mut tx, request).await?;
    let links: Vec<RequestProduct> = product_ids
        .iter()
        .map(|&product_id| RequestProduct {
            request_id: row.id,
            product_id,
        })
        .collect();
    insert_links_tx(&mut tx, &links).await?;
    tx.commit().await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn delete_request(pool: &Pool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM request_products WHERE request_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM requests WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_requests(
    pool: &Pool,
    kind: TransactionKind,
    status: Option<RequestStatus>,
) -> Result<Vec<RequestWithProducts>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM requests WHERE type = ");
    qb.push_bind(kind.as_str());
    if let Some(status) = status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY created_at DESC, rowid DESC");
    let requests = qb
        .build()
        .fetch_all(pool)
        .await?
        .iter()
        .map(request_from_row)
        .collect::<Result<Vec<_>>>()?;

    let link_rows = sqlx::query(
        "SELECT rp.request_id, p.* FROM request_products rp \
         JOIN products p ON p.id = rp.product_id \
         JOIN requests r ON r.id = rp.request_id \
         WHERE r.type = ? ORDER BY rp.rowid",
    )
    .bind(kind.as_str())
    .fetch_all(pool)
    .await?;

    let mut products: HashMap<Uuid, Vec<Product>> = HashMap::new();
    for row in &link_rows {
        products
            .entry(link_request_id(row)?)
            .or_default()
            .push(product_from_row(row)?);
    }

    Ok(requests
        .into_iter()
        .map(|request| RequestWithProducts {
            products: products.remove(&request.id).unwrap_or_default(),
            request,
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn set_request_status(pool: &Pool, id: Uuid, status: RequestStatus) -> Result<()> {
    let result = sqlx::query("UPDATE requests SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    expect_row(result, "request", id)
}

// ---------------------------------------------------------------- sellers

#[instrument(skip_all)]
pub async fn list_sellers(
    pool: &Pool,
    status: Option<SellerStatus>,
) -> Result<Vec<SellerWithProducts>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sellers");
    if let Some(status) = status {
        qb.push(" WHERE status = ").push_bind(status.as_str());
    }
    qb.push(" ORDER BY created_at DESC, rowid DESC");
    let sellers = qb
        .build()
        .fetch_all(pool)
        .await?
        .iter()
        .map(seller_from_row)
        .collect::<Result<Vec<_>>>()?;

    let summary_rows = sqlx::query(
        "SELECT id, title, status, seller_id FROM products WHERE seller_id IS NOT NULL ORDER BY rowid",
    )
    .fetch_all(pool)
    .await?;
    let mut products: HashMap<Uuid, Vec<ProductSummary>> = HashMap::new();
    for row in &summary_rows {
        products
            .entry(summary_seller_id(row)?)
            .or_default()
            .push(product_summary_from_row(row)?);
    }

    Ok(sellers
        .into_iter()
        .map(|seller| SellerWithProducts {
            products: products.remove(&seller.id).unwrap_or_default(),
            seller,
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn get_seller(pool: &Pool, id: Uuid) -> Result<Seller> {
    let row = sqlx::query("SELECT * FROM sellers WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => seller_from_row(&row),
        None => Err(StoreError::not_found("seller", id)),
    }
}

#[instrument(skip_all)]
pub async fn insert_seller(pool: &Pool, seller: &NewSeller) -> Result<Seller> {
    let row = Seller {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        user_id: seller.user_id,
        company_name: seller.company_name.clone(),
        contact_name: seller.contact_name.clone(),
        email: seller.email.clone(),
        phone: seller.phone.clone(),
        status: seller.status,
    };
    sqlx::query(
        "INSERT INTO sellers (id, created_at, user_id, company_name, contact_name, email, phone, status) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id.to_string())
    .bind(row.created_at)
    .bind(row.user_id.map(|id| id.to_string()))
    .bind(&row.company_name)
    .bind(&row.contact_name)
    .bind(&row.email)
    .bind(&row.phone)
    .bind(row.status.as_str())
    .execute(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn set_seller_status(pool: &Pool, id: Uuid, status: SellerStatus) -> Result<()> {
    let result = sqlx::query("UPDATE sellers SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    expect_row(result, "seller", id)
}

#[instrument(skip_all)]
pub async fn list_seller_requests(pool: &Pool) -> Result<Vec<SellerRequest>> {
    let rows = sqlx::query("SELECT * FROM seller_requests ORDER BY created_at DESC, rowid DESC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(seller_request_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_seller_request(pool: &Pool, id: Uuid) -> Result<SellerRequest> {
    let row = sqlx::query("SELECT * FROM seller_requests WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => seller_request_from_row(&row),
        None => Err(StoreError::not_found("seller request", id)),
    }
}

#[instrument(skip_all)]
pub async fn insert_seller_request(
    pool: &Pool,
    request: &NewSellerRequest,
) -> Result<SellerRequest> {
    let row = SellerRequest {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        company_name: request.company_name.clone(),
        contact_name: request.contact_name.clone(),
        email: request.email.clone(),
        phone: request.phone.clone(),
        business_description: request.business_description.clone(),
        product_categories: request.product_categories.clone(),
        status: SellerRequestStatus::Pending,
    };
    sqlx::query(
        "INSERT INTO seller_requests (id, created_at, company_name, contact_name, email, phone, business_description, product_categories, status) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id.to_string())
    .bind(row.created_at)
    .bind(&row.company_name)
    .bind(&row.contact_name)
    .bind(&row.email)
    .bind(&row.phone)
    .bind(&row.business_description)
    .bind(&row.product_categories)
    .bind(row.status.as_str())
    .execute(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn set_seller_request_status(
    pool: &Pool,
    id: Uuid,
    status: SellerRequestStatus,
) -> Result<()> {
    let result = sqlx::query("UPDATE seller_requests SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    expect_row(result, "seller request", id)
}
