//! Client for the hosted backend: PostgREST tables under `/rest/v1`, auth
//! under `/auth/v1` and object storage under `/storage/v1`.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{Backend, ObjectStorage, ProductStore, RequestStore, SellerStore};
use crate::auth::{AuthService, AuthUser, Session};
use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::events::{ChangeFeed, ChangeOp, Table};
use crate::model::{
    NewProduct, NewRequest, NewSeller, NewSellerRequest, Product, ProductFilter, ProductStatus,
    Request, RequestProduct, RequestStatus, RequestWithProducts, Seller, SellerRequest,
    SellerRequestStatus, SellerStatus, SellerWithProducts, TransactionKind,
};

pub mod model;
pub mod query;

use model::{RequestRow, SellerRow, REQUEST_WITH_PRODUCTS, SELLER_WITH_PRODUCTS};
pub use query::Query;

#[derive(Clone)]
pub struct RestBackend {
    http: Client,
    base_url: Url,
    anon_key: String,
    access_token: Option<String>,
    bucket: String,
    changes: ChangeFeed,
}

impl fmt::Debug for RestBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestBackend")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: String, bucket: String) -> Result<Self> {
        // `Url::join` drops the last path segment unless it ends in a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| StoreError::Validation(format!("invalid backend url: {}", e)))?;
        let http = Client::builder()
            .user_agent(concat!("labmart/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            anon_key,
            access_token: None,
            bucket,
            changes: ChangeFeed::new(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.backend.url,
            cfg.backend.anon_key.clone(),
            cfg.backend.storage_bucket.clone(),
        )
    }

    /// Requests after this carry the signed-in user's token instead of the
    /// anonymous key.
    pub fn with_session(self, session: &Session) -> Self {
        self.with_access_token(session.access_token.clone())
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Persistence(format!("invalid backend URL: {}", e)))
    }

    pub fn build_request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer()));
        if let Some(body) = body {
            builder = builder
                .header("Content-Type", "application/json")
                .header("Prefer", "return=representation")
                .json(body);
        }
        Ok(builder.build()?)
    }

    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        debug!(method = %request.method(), url = %request.url(), "backend request");
        let res = self.http.execute(request).await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "backend rejected request");
            return Err(StoreError::Persistence(format!(
                "backend error {}: {}",
                status, body
            )));
        }
        Ok(res)
    }

    async fn select<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>> {
        let request = self.build_request(Method::GET, query.url(&self.base_url)?, None)?;
        let res = self.send(request).await?;
        Ok(res.json().await?)
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        query: Query,
        entity: &'static str,
        id: Uuid,
    ) -> Result<T> {
        self.select::<T>(&query.eq("id", id).limit(Some(1)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(entity, id))
    }

    async fn insert<T: DeserializeOwned>(&self, table: Table, body: &Value) -> Result<Vec<T>> {
        let url = query::table_url(&self.base_url, table)?;
        let request = self.build_request(Method::POST, url, Some(body))?;
        let rows = self.send(request).await?.json().await?;
        self.changes.publish(table, ChangeOp::Insert);
        Ok(rows)
    }

    async fn insert_one<T: DeserializeOwned>(&self, table: Table, body: &Value) -> Result<T> {
        self.insert::<T>(table, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                StoreError::Persistence(format!("insert into {} returned no row", table.as_str()))
            })
    }

    /// PATCHes the row `id` of the query's table. With
    /// `return=representation` an unmatched filter answers `[]`, which is
    /// reported as `NotFound`.
    async fn update(
        &self,
        entity: &'static str,
        id: Uuid,
        query: Query,
        body: &Value,
    ) -> Result<()> {
        let query = query.eq("id", id);
        let request = self.build_request(Method::PATCH, query.url(&self.base_url)?, Some(body))?;
        let rows: Vec<Value> = self.send(request).await?.json().await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(entity, id));
        }
        self.changes.publish(query.target(), ChangeOp::Update);
        Ok(())
    }

    async fn delete(&self, query: &Query) -> Result<()> {
        let request = self.build_request(Method::DELETE, query.url(&self.base_url)?, None)?;
        self.send(request).await?;
        self.changes.publish(query.target(), ChangeOp::Delete);
        Ok(())
    }

    pub fn public_url(&self, key: &str) -> Result<Url> {
        self.endpoint(&format!("storage/v1/object/public/{}/{}", self.bucket, key))
    }

    async fn auth_call(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let res = self.http.execute(request).await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("{}: {}", status, body)));
        }
        Ok(res)
    }
}

pub fn product_query(filter: &ProductFilter) -> Query {
    Query::table(Table::Products)
        .eq_opt("type", filter.kind)
        .eq_opt("status", filter.status)
        .eq_opt("category", filter.category.as_deref())
        .eq_opt("seller_id", filter.seller_id)
        .is_null("deleted_at")
        .newest_first()
        .limit(filter.limit)
}

#[async_trait]
impl ProductStore for RestBackend {
    #[instrument(skip_all)]
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        self.select(&product_query(filter)).await
    }

    async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.select_one(Query::table(Table::Products).is_null("deleted_at"), "product", id)
            .await
    }

    #[instrument(skip_all)]
    async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        self.insert_one(Table::Products, &serde_json::to_value(product)?)
            .await
    }

    async fn update_product_status(&self, id: Uuid, status: ProductStatus) -> Result<()> {
        self.update(
            "product",
            id,
            Query::table(Table::Products),
            &json!({ "status": status }),
        )
        .await
    }

    async fn soft_delete_product(&self, id: Uuid) -> Result<()> {
        self.update(
            "product",
            id,
            Query::table(Table::Products),
            &json!({ "deleted_at": Utc::now() }),
        )
        .await
    }
}

#[async_trait]
impl RequestStore for RestBackend {
    #[instrument(skip_all)]
    async fn create_request(&self, request: &NewRequest) -> Result<Request> {
        self.insert_one(Table::Requests, &serde_json::to_value(request)?)
            .await
    }

    #[instrument(skip_all, fields(count = links.len()))]
    async fn link_products(&self, links: &[RequestProduct]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }
        self.insert::<Value>(Table::RequestProducts, &serde_json::to_value(links)?)
            .await?;
        Ok(())
    }

    async fn delete_request(&self, id: Uuid) -> Result<()> {
        self.delete(&Query::table(Table::Requests).eq("id", id))
            .await
    }

    #[instrument(skip_all)]
    async fn list_requests(
        &self,
        kind: TransactionKind,
        status: Option<RequestStatus>,
    ) -> Result<Vec<RequestWithProducts>> {
        let query = Query::table(Table::Requests)
            .select(REQUEST_WITH_PRODUCTS)
            .eq("type", kind)
            .eq_opt("status", status)
            .newest_first();
        let rows: Vec<RequestRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_request_status(&self, id: Uuid, status: RequestStatus) -> Result<()> {
        self.update(
            "request",
            id,
            Query::table(Table::Requests),
            &json!({ "status": status }),
        )
        .await
    }
}

#[async_trait]
impl SellerStore for RestBackend {
    #[instrument(skip_all)]
    async fn list_sellers(&self, status: Option<SellerStatus>) -> Result<Vec<SellerWithProducts>> {
        let query = Query::table(Table::Sellers)
            .select(SELLER_WITH_PRODUCTS)
            .eq_opt("status", status)
            .newest_first();
        let rows: Vec<SellerRow> = self.select(&query).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_seller(&self, id: Uuid) -> Result<Seller> {
        self.select_one(Query::table(Table::Sellers), "seller", id)
            .await
    }

    async fn create_seller(&self, seller: &NewSeller) -> Result<Seller> {
        self.insert_one(Table::Sellers, &serde_json::to_value(seller)?)
            .await
    }

    async fn update_seller_status(&self, id: Uuid, status: SellerStatus) -> Result<()> {
        self.update(
            "seller",
            id,
            Query::table(Table::Sellers),
            &json!({ "status": status }),
        )
        .await
    }

    async fn list_seller_requests(&self) -> Result<Vec<SellerRequest>> {
        self.select(&Query::table(Table::SellerRequests).newest_first())
            .await
    }

    async fn get_seller_request(&self, id: Uuid) -> Result<SellerRequest> {
        self.select_one(Query::table(Table::SellerRequests), "seller request", id)
            .await
    }

    async fn create_seller_request(&self, request: &NewSellerRequest) -> Result<SellerRequest> {
        let mut body = serde_json::to_value(request)?;
        body["status"] = json!(SellerRequestStatus::Pending);
        self.insert_one(Table::SellerRequests, &body).await
    }

    async fn update_seller_request_status(
        &self,
        id: Uuid,
        status: SellerRequestStatus,
    ) -> Result<()> {
        self.update(
            "seller request",
            id,
            Query::table(Table::SellerRequests),
            &json!({ "status": status }),
        )
        .await
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    #[instrument(skip_all, fields(key = %key, size = bytes.len()))]
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let url = self.endpoint(&format!("storage/v1/object/{}/{}", self.bucket, key))?;
        let request = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.bearer()))
            .header("Content-Type", content_type)
            .body(bytes)
            .build()?;
        self.send(request).await?;
        Ok(self.public_url(key)?.to_string())
    }
}

#[async_trait]
impl AuthService for RestBackend {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/token?grant_type=password")?;
        let request = self.build_request(
            Method::POST,
            url,
            Some(&json!({ "email": email, "password": password })),
        )?;
        Ok(self.auth_call(request).await?.json().await?)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser> {
        let url = self.endpoint("auth/v1/signup")?;
        let request = self.build_request(
            Method::POST,
            url,
            Some(&json!({ "email": email, "password": password, "data": metadata })),
        )?;
        let body: Value = self.auth_call(request).await?.json().await?;
        Ok(model::signup_user(body)?)
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let request = self
            .http
            .post(self.endpoint("auth/v1/logout")?)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .build()?;
        self.auth_call(request).await?;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>> {
        let request = self
            .http
            .get(self.endpoint("auth/v1/user")?)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .build()?;
        let res = self.http.execute(request).await?;
        if res.status() == StatusCode::UNAUTHORIZED || res.status() == StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(StoreError::Auth(format!("{}: {}", status, body)));
        }
        Ok(Some(res.json().await?))
    }
}

impl Backend for RestBackend {
    fn changes(&self) -> &ChangeFeed {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestBackend {
        RestBackend::new(
            "https://demo.supabase.co",
            "anon-key".into(),
            "product-images".into(),
        )
        .unwrap()
    }

    fn header<'a>(request: &'a reqwest::Request, name: &str) -> Option<&'a str> {
        request.headers().get(name).and_then(|h| h.to_str().ok())
    }

    #[test]
    fn insert_request_sets_headers() {
        let client = client();
        let url = query::table_url(&client.base_url, Table::Requests).unwrap();
        let request = client
            .build_request(Method::POST, url, Some(&json!({ "sample": true })))
            .unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.url().path(), "/rest/v1/requests");
        assert_eq!(header(&request, "apikey"), Some("anon-key"));
        assert_eq!(header(&request, "Authorization"), Some("Bearer anon-key"));
        assert_eq!(header(&request, "Prefer"), Some("return=representation"));
        assert_eq!(header(&request, "Content-Type"), Some("application/json"));
    }

    #[test]
    fn session_token_replaces_anon_bearer() {
        let session = Session {
            access_token: "user-token".into(),
            refresh_token: None,
            user: AuthUser {
                id: Uuid::new_v4(),
                email: None,
                user_metadata: Value::Null,
            },
        };
        let client = client().with_session(&session);
        let url = query::table_url(&client.base_url, Table::Products).unwrap();
        let request = client.build_request(Method::GET, url, None).unwrap();
        assert_eq!(header(&request, "Authorization"), Some("Bearer user-token"));
        assert_eq!(header(&request, "apikey"), Some("anon-key"));
        assert!(header(&request, "Prefer").is_none());
    }

    #[test]
    fn product_query_always_excludes_deleted_rows() {
        let url = product_query(&ProductFilter::default())
            .url(&client().base_url)
            .unwrap();
        let query = url.query().unwrap_or_default().to_string();
        assert!(query.contains("deleted_at=is.null"));
        assert!(query.contains("order=created_at.desc"));
        assert!(!query.contains("limit"));
    }

    #[test]
    fn public_url_points_at_bucket() {
        let url = client().public_url("abc.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://demo.supabase.co/storage/v1/object/public/product-images/abc.png"
        );
    }

    /// Serves every request with `200` and `body`, like PostgREST answering a
    /// PATCH whose filter matched `body` rows.
    async fn stub_backend(body: &'static str) -> RestBackend {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text[..end]
                            .lines()
                            .find_map(|l| {
                                let (name, value) = l.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())
                                    .flatten()
                            })
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + length {
                            break;
                        }
                    }
                }
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        RestBackend::new(
            &format!("http://{}", addr),
            "anon-key".into(),
            "product-images".into(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn patch_matching_nothing_is_not_found() {
        let backend = stub_backend("[]").await;
        let id = Uuid::new_v4();

        let err = backend
            .update_request_status(id, RequestStatus::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "request", .. }));
        let err = backend
            .update_seller_status(id, SellerStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "seller", .. }));
        assert!(backend
            .update_seller_request_status(id, SellerRequestStatus::Rejected)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(backend
            .update_product_status(id, ProductStatus::Inactive)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(backend.soft_delete_product(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn patch_matching_a_row_succeeds() {
        let backend = stub_backend(r#"[{"id":"x"}]"#).await;
        let mut sub = backend.changes().subscribe();
        backend
            .update_request_status(Uuid::new_v4(), RequestStatus::Rejected)
            .await
            .unwrap();
        let change = sub.next_change(&[Table::Requests]).await.unwrap();
        assert_eq!(change.op, ChangeOp::Update);
    }
}
