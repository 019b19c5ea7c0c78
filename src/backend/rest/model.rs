use serde::Deserialize;
use serde_json::Value;

use crate::auth::AuthUser;
use crate::model::{Product, ProductSummary, Request, RequestWithProducts, Seller, SellerWithProducts};

/// Embedded select used for request boards.
pub const REQUEST_WITH_PRODUCTS: &str = "*,products:request_products(product:products(*))";

/// Embedded select used for seller boards.
pub const SELLER_WITH_PRODUCTS: &str = "*,products(id,title,status)";

#[derive(Deserialize, Debug)]
pub struct RequestRow {
    #[serde(flatten)]
    pub request: Request,
    #[serde(default)]
    pub products: Vec<LinkedProduct>,
}

#[derive(Deserialize, Debug)]
pub struct LinkedProduct {
    /// Null when the linked product row is gone.
    pub product: Option<Product>,
}

impl From<RequestRow> for RequestWithProducts {
    fn from(row: RequestRow) -> Self {
        RequestWithProducts {
            request: row.request,
            products: row.products.into_iter().filter_map(|l| l.product).collect(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct SellerRow {
    #[serde(flatten)]
    pub seller: Seller,
    #[serde(default)]
    pub products: Vec<ProductSummary>,
}

impl From<SellerRow> for SellerWithProducts {
    fn from(row: SellerRow) -> Self {
        SellerWithProducts {
            seller: row.seller,
            products: row.products,
        }
    }
}

/// The signup endpoint answers with either a session or a bare user,
/// depending on whether email confirmation is enabled.
pub fn signup_user(body: Value) -> serde_json::Result<AuthUser> {
    match body.get("user") {
        Some(user) if !user.is_null() => serde_json::from_value(user.clone()),
        _ => serde_json::from_value(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_row_drops_missing_products() {
        let row: RequestRow = serde_json::from_value(json!({
            "id": "0b7c2b1e-3c1f-4b39-a1d5-51a1f1f1e001",
            "created_at": "2024-05-01T10:00:00Z",
            "user_name": "A",
            "user_email": "a@x.com",
            "user_phone": "555",
            "status": "pending",
            "type": "buy",
            "notes": null,
            "products": [
                { "product": {
                    "id": "0b7c2b1e-3c1f-4b39-a1d5-51a1f1f1e002",
                    "created_at": "2024-04-01T10:00:00Z",
                    "title": "Pipette",
                    "description": "",
                    "price": 100.0,
                    "category": "Lab",
                    "image_url": "",
                    "status": "active",
                    "type": "buy"
                } },
                { "product": null }
            ]
        }))
        .unwrap();

        let full = RequestWithProducts::from(row);
        assert_eq!(full.products.len(), 1);
        assert_eq!(full.products[0].title, "Pipette");
    }

    #[test]
    fn signup_accepts_user_or_session_shape() {
        let id = "0b7c2b1e-3c1f-4b39-a1d5-51a1f1f1e003";
        let bare = signup_user(json!({ "id": id, "email": "a@x.com" })).unwrap();
        let wrapped =
            signup_user(json!({ "access_token": "t", "user": { "id": id, "email": "a@x.com" } }))
                .unwrap();
        assert_eq!(bare.id, wrapped.id);
    }
}
