//! Contact forms: quote/donation request submission and seller applications.
//!
//! Both forms validate their fields before anything is written, report the
//! outcome through a [`Notifier`] and hand back a [`Confirmation`] that the
//! caller renders.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::SellerStore;
use crate::cart::CartStore;
use crate::error::{Result, StoreError};
use crate::export::format_price;
use crate::model::{reference_number, Contact, NewSellerRequest, TransactionKind};
use crate::notify::Notifier;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationKind {
    Buy,
    Donate,
    Seller,
}

impl From<TransactionKind> for ConfirmationKind {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Buy => ConfirmationKind::Buy,
            TransactionKind::Donate => ConfirmationKind::Donate,
        }
    }
}

/// Snapshot of one submitted cart entry. Donations carry no price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub title: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Confirmation {
    pub kind: ConfirmationKind,
    pub request_id: Uuid,
    pub reference_number: String,
    pub contact: Contact,
    pub items: Vec<LineItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<String>,
}

impl Confirmation {
    pub fn title(&self) -> &'static str {
        match self.kind {
            ConfirmationKind::Buy => "Quote Request Confirmation",
            ConfirmationKind::Donate => "Donation Request Confirmation",
            ConfirmationKind::Seller => "Seller Registration Confirmation",
        }
    }

    pub fn next_steps(&self) -> &'static str {
        match self.kind {
            ConfirmationKind::Seller => {
                "Our team will review your application and contact you within 2-3 business days."
            }
            _ => "Our team will review your request and get back to you shortly with more information.",
        }
    }

    /// Plain-text rendering of the confirmation card.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(self.title());
        out.push('\n');
        out.push_str(&format!("Reference Number: {}\n", self.reference_number));
        if let Some(company) = &self.company_name {
            out.push_str(&format!("Company: {}\n", company));
        }
        out.push_str(&format!("Name: {}\n", self.contact.name));
        out.push_str(&format!("Email: {}\n", self.contact.email));
        out.push_str(&format!("Phone: {}\n", self.contact.phone));

        if !self.items.is_empty() {
            out.push_str("Items:\n");
            for item in &self.items {
                match item.price {
                    Some(price) => out.push_str(&format!(
                        "  - {} ({}) {}\n",
                        item.title,
                        item.category,
                        format_price(price)
                    )),
                    None => out.push_str(&format!("  - {} ({})\n", item.title, item.category)),
                }
            }
        }
        if let Some(categories) = &self.categories {
            out.push_str(&format!("Product Categories: {}\n", categories));
        }
        out.push_str("Next Steps: ");
        out.push_str(self.next_steps());
        out.push('\n');
        out
    }
}

fn required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn valid_email(value: &str) -> Result<()> {
    required("email", value)?;
    if !EMAIL_RE.is_match(value.trim()) {
        return Err(StoreError::Validation(format!(
            "{:?} is not a valid email address",
            value.trim()
        )));
    }
    Ok(())
}

pub fn validate_contact(contact: &Contact) -> Result<()> {
    required("name", &contact.name)?;
    valid_email(&contact.email)?;
    required("phone", &contact.phone)
}

pub fn validate_seller_application(app: &NewSellerRequest) -> Result<()> {
    required("company name", &app.company_name)?;
    required("contact name", &app.contact_name)?;
    valid_email(&app.email)?;
    required("phone", &app.phone)?;
    required("business description", &app.business_description)?;
    required("product categories", &app.product_categories)
}

fn trimmed(contact: &Contact) -> Contact {
    Contact {
        name: contact.name.trim().to_string(),
        email: contact.email.trim().to_string(),
        phone: contact.phone.trim().to_string(),
    }
}

/// Submits the `kind` cart list for `contact`.
///
/// The line-item snapshot is taken before submission since a successful
/// submit empties the list.
#[instrument(skip_all, fields(kind = %kind))]
pub async fn submit_request(
    cart: &mut CartStore,
    kind: TransactionKind,
    contact: &Contact,
    notifier: &dyn Notifier,
) -> Result<Confirmation> {
    let check = validate_contact(contact).and_then(|_| {
        if cart.items(kind).is_empty() {
            Err(StoreError::Validation("no products selected".into()))
        } else {
            Ok(())
        }
    });
    if let Err(err) = check {
        notifier.error(&err.to_string());
        return Err(err);
    }

    let contact = trimmed(contact);
    let items: Vec<LineItem> = cart
        .items(kind)
        .iter()
        .map(|p| LineItem {
            title: p.title.clone(),
            category: p.category.clone(),
            price: (kind == TransactionKind::Buy).then_some(p.price),
        })
        .collect();

    match cart.submit(kind, &contact).await {
        Ok(submitted) => {
            notifier.success(match kind {
                TransactionKind::Buy => "Quote request submitted successfully",
                TransactionKind::Donate => "Donation request submitted successfully",
            });
            Ok(Confirmation {
                kind: kind.into(),
                request_id: submitted.id,
                reference_number: submitted.reference_number,
                contact,
                items,
                company_name: None,
                categories: None,
            })
        }
        Err(err) => {
            warn!(?err, "request submission failed");
            notifier.error("Failed to submit request");
            Err(err)
        }
    }
}

/// Files a pending seller application.
#[instrument(skip_all)]
pub async fn apply_as_seller(
    sellers: &dyn SellerStore,
    application: &NewSellerRequest,
    notifier: &dyn Notifier,
) -> Result<Confirmation> {
    if let Err(err) = validate_seller_application(application) {
        notifier.error(&err.to_string());
        return Err(err);
    }

    let created = match sellers.create_seller_request(application).await {
        Ok(created) => created,
        Err(err) => {
            warn!(?err, "seller application failed");
            notifier.error("Failed to submit request. Please try again.");
            return Err(err);
        }
    };
    info!(application_id = %created.id, "seller application filed");

    Ok(Confirmation {
        kind: ConfirmationKind::Seller,
        request_id: created.id,
        reference_number: reference_number(created.id),
        contact: Contact {
            name: created.contact_name,
            email: created.email,
            phone: created.phone,
        },
        items: Vec::new(),
        company_name: Some(created.company_name),
        categories: Some(created.product_categories),
    })
}
