use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a lower-case string enum with `as_str`/`parse` helpers matching
/// the column values stored by the backend.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Whether a product (and a request for it) is a purchase or a donation.
    TransactionKind { Buy => "buy", Donate => "donate" }
);

string_enum!(ProductStatus {
    Active => "active",
    Inactive => "inactive",
    Pending => "pending",
});

string_enum!(RequestStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

string_enum!(SellerStatus {
    Pending => "pending",
    Active => "active",
    Suspended => "suspended",
    Banned => "banned",
});

string_enum!(SellerRequestStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image_url: String,
    #[serde(default)]
    pub seller_id: Option<Uuid>,
    pub status: ProductStatus,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Insert payload for the products table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewProduct {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<Uuid>,
    pub status: ProductStatus,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

/// Compact product view embedded in seller listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
    pub status: ProductStatus,
}

impl From<&Product> for ProductSummary {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            title: p.title.clone(),
            status: p.status,
        }
    }
}

/// Requester identity collected by the submission form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    pub status: RequestStatus,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Request {
    /// Short human-facing reference derived from the row id.
    pub fn reference_number(&self) -> String {
        reference_number(self.id)
    }
}

pub fn reference_number(id: Uuid) -> String {
    let simple = id.simple().to_string();
    format!("RQ-{}", simple[..8].to_ascii_uppercase())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewRequest {
    pub user_name: String,
    pub user_email: String,
    pub user_phone: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub status: RequestStatus,
}

impl NewRequest {
    pub fn pending(kind: TransactionKind, contact: &Contact) -> Self {
        Self {
            user_name: contact.name.clone(),
            user_email: contact.email.clone(),
            user_phone: contact.phone.clone(),
            kind,
            status: RequestStatus::Pending,
        }
    }
}

/// Link row between a request and one of its products.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestProduct {
    pub request_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RequestWithProducts {
    #[serde(flatten)]
    pub request: Request,
    pub products: Vec<Product>,
}

impl RequestWithProducts {
    pub fn total_value(&self) -> f64 {
        self.products.iter().map(|p| p.price).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seller {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub status: SellerStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewSeller {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub status: SellerStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SellerWithProducts {
    #[serde(flatten)]
    pub seller: Seller,
    pub products: Vec<ProductSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SellerRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub business_description: String,
    pub product_categories: String,
    pub status: SellerRequestStatus,
}

impl SellerRequest {
    /// Seller row created when this application is approved.
    pub fn to_active_seller(&self) -> NewSeller {
        NewSeller {
            user_id: None,
            company_name: self.company_name.clone(),
            contact_name: self.contact_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            status: SellerStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NewSellerRequest {
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub business_description: String,
    pub product_categories: String,
}

/// Equality filters applied to product reads. Soft-deleted rows are always
/// excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub kind: Option<TransactionKind>,
    pub status: Option<ProductStatus>,
    pub category: Option<String>,
    pub seller_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl ProductFilter {
    pub fn matches(&self, p: &Product) -> bool {
        p.deleted_at.is_none()
            && self.kind.map_or(true, |k| p.kind == k)
            && self.status.map_or(true, |s| p.status == s)
            && self.category.as_deref().map_or(true, |c| p.category == c)
            && self.seller_id.map_or(true, |id| p.seller_id == Some(id))
    }
}
