use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use labmart::admin::{self, ProductCatalog, ProductDraft, RequestBoard, SellerApplications, SellerBoard};
use labmart::auth::{self, AdminLogin, AuthService};
use labmart::backend::{Backend, RestBackend, SqliteBackend};
use labmart::cart::CartStore;
use labmart::config::{self, BackendKind, Config};
use labmart::export::format_price;
use labmart::listing::{add_to_cart_by_id, ProductListing};
use labmart::model::{
    Contact, NewSellerRequest, ProductFilter, ProductStatus, RequestStatus, SellerStatus,
    TransactionKind,
};
use labmart::notify::TracingNotifier;
use labmart::submission::{apply_as_seller, submit_request};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "labmart.yaml")]
    config: PathBuf,

    /// Access token of a signed-in user (rest backend only)
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn enum_arg<T: Copy + fmt::Display>(all: &'static [T], s: &str) -> Result<T, String> {
    all.iter().copied().find(|v| v.to_string() == s).ok_or_else(|| {
        let names: Vec<String> = all.iter().map(|v| v.to_string()).collect();
        format!("expected one of: {}", names.join(", "))
    })
}

fn kind_arg(s: &str) -> Result<TransactionKind, String> {
    enum_arg(TransactionKind::ALL, s)
}

fn request_status_arg(s: &str) -> Result<RequestStatus, String> {
    enum_arg(RequestStatus::ALL, s)
}

fn seller_status_arg(s: &str) -> Result<SellerStatus, String> {
    enum_arg(SellerStatus::ALL, s)
}

fn product_status_arg(s: &str) -> Result<ProductStatus, String> {
    enum_arg(ProductStatus::ALL, s)
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print an example configuration file
    ExampleConfig,
    /// List active products of a kind
    Products {
        #[arg(value_parser = kind_arg)]
        kind: TransactionKind,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Submit a quote (buy) or donation request for the given product ids
    Submit {
        #[arg(value_parser = kind_arg)]
        kind: TransactionKind,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(required = true)]
        products: Vec<Uuid>,
    },
    /// Apply to become a seller
    ApplySeller {
        #[arg(long)]
        company: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        categories: String,
    },
    /// List requests of a kind, optionally exporting them as CSV
    Requests {
        #[arg(value_parser = kind_arg)]
        kind: TransactionKind,
        #[arg(long, value_parser = request_status_arg)]
        status: Option<RequestStatus>,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Approve or reject a request
    SetRequestStatus {
        #[arg(value_parser = kind_arg)]
        kind: TransactionKind,
        id: Uuid,
        #[arg(value_parser = request_status_arg)]
        status: RequestStatus,
    },
    /// List sellers with their products
    Sellers {
        #[arg(long, value_parser = seller_status_arg)]
        status: Option<SellerStatus>,
    },
    SetSellerStatus {
        id: Uuid,
        #[arg(value_parser = seller_status_arg)]
        status: SellerStatus,
    },
    /// List seller applications
    SellerRequests,
    ApproveSeller {
        id: Uuid,
    },
    RejectSeller {
        id: Uuid,
    },
    /// Back-office product catalog
    Catalog {
        #[arg(long, value_parser = kind_arg)]
        kind: Option<TransactionKind>,
        #[arg(long, value_parser = product_status_arg)]
        status: Option<ProductStatus>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        seller: Option<Uuid>,
    },
    /// Add a product (starts pending), optionally uploading an image
    AddProduct {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        price: f64,
        #[arg(long)]
        category: String,
        #[arg(long, value_parser = kind_arg)]
        kind: TransactionKind,
        #[arg(long)]
        image: Option<PathBuf>,
    },
    SetProductStatus {
        id: Uuid,
        #[arg(value_parser = product_status_arg)]
        status: ProductStatus,
    },
    /// Soft-delete a product
    DeleteProduct {
        id: Uuid,
    },
    /// Dashboard counters as JSON
    Stats,
    /// Sign in as the configured admin (password falls back to LABMART_ADMIN_PASSWORD)
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Invalidate the session given with --token
    SignOut,
    /// Check whether --token belongs to the admin
    WhoAmI,
}

impl Command {
    fn needs_auth_service(&self) -> bool {
        matches!(self, Command::SignIn { .. } | Command::SignOut | Command::WhoAmI)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    match cfg.app.backend {
        BackendKind::Rest => {
            let mut backend = RestBackend::from_config(&cfg)?;
            if let Some(token) = &args.token {
                backend = backend.with_access_token(token.clone());
            }
            if args.command.needs_auth_service() {
                return run_auth(&backend, &cfg, args.token.as_deref(), args.command).await;
            }
            run(Arc::new(backend), &cfg, args.command).await
        }
        BackendKind::Sqlite => {
            if args.command.needs_auth_service() {
                bail!("authentication commands need the rest backend");
            }
            let backend = SqliteBackend::from_config(&cfg).await?;
            info!(url = %cfg.database_url(), "using local store");
            run(Arc::new(backend), &cfg, args.command).await
        }
    }
}

async fn run_auth(
    auth_service: &dyn AuthService,
    cfg: &Config,
    token: Option<&str>,
    command: Command,
) -> Result<()> {
    match command {
        Command::SignIn { email, password } => {
            let password = match password {
                Some(p) => p,
                None => std::env::var("LABMART_ADMIN_PASSWORD")
                    .map_err(|_| anyhow!("pass --password or set LABMART_ADMIN_PASSWORD"))?,
            };
            match auth::admin_sign_in(auth_service, &cfg.admin.email, &email, &password).await? {
                AdminLogin::SignedIn(session) => println!("{}", session.access_token),
                AdminLogin::SignedUp(user) => {
                    println!("admin account {} created; sign in again once confirmed", user.id)
                }
            }
        }
        Command::SignOut => {
            let token = token.ok_or_else(|| anyhow!("--token is required"))?;
            auth_service.sign_out(token).await?;
            println!("Signed out successfully");
        }
        Command::WhoAmI => {
            let token = token.ok_or_else(|| anyhow!("--token is required"))?;
            let admin = auth::is_admin(auth_service, &cfg.admin.email, token).await;
            println!("{}", if admin { "admin" } else { "not admin" });
        }
        other => bail!("{:?} is not an authentication command", other),
    }
    Ok(())
}

async fn run<B: Backend + 'static>(backend: Arc<B>, cfg: &Config, command: Command) -> Result<()> {
    let notifier = TracingNotifier;

    match command {
        Command::Products {
            kind,
            category,
            limit,
        } => {
            let mut listing =
                ProductListing::load(backend.clone(), kind, limit.or(cfg.app.listing_limit)).await;
            println!("categories: {}", listing.categories().join(", "));
            if category.is_some() {
                listing.select_category(category).await;
            }
            for p in listing.products() {
                println!("{}  {}  [{}]  {}", p.id, p.title, p.category, format_price(p.price));
            }
        }
        Command::Submit {
            kind,
            name,
            email,
            phone,
            products,
        } => {
            let mut cart = CartStore::new(backend.clone());
            for id in products {
                let product = add_to_cart_by_id(backend.as_ref(), &mut cart, &notifier, id).await?;
                if product.kind != kind {
                    bail!("product {} is a {} listing, not {}", id, product.kind, kind);
                }
            }
            let contact = Contact { name, email, phone };
            let confirmation = submit_request(&mut cart, kind, &contact, &notifier).await?;
            print!("{}", confirmation.render_text());
        }
        Command::ApplySeller {
            company,
            contact,
            email,
            phone,
            description,
            categories,
        } => {
            let application = NewSellerRequest {
                company_name: company,
                contact_name: contact,
                email,
                phone,
                business_description: description,
                product_categories: categories,
            };
            let confirmation = apply_as_seller(backend.as_ref(), &application, &notifier).await?;
            print!("{}", confirmation.render_text());
        }
        Command::Requests { kind, status, csv } => {
            let board = RequestBoard::load(backend.clone(), kind, status).await?;
            match csv {
                Some(path) => {
                    tokio::fs::write(&path, board.to_csv())
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("exported {} requests to {}", board.rows().len(), path.display());
                }
                None => {
                    for r in board.rows() {
                        println!(
                            "{}  {}  {} <{}>  {} items  {}",
                            r.request.reference_number(),
                            r.request.status,
                            r.request.user_name,
                            r.request.user_email,
                            r.products.len(),
                            format_price(r.total_value()),
                        );
                    }
                }
            }
        }
        Command::SetRequestStatus { kind, id, status } => {
            let mut board = RequestBoard::load(backend.clone(), kind, None).await?;
            if board.find(id).is_none() {
                bail!("no {} request with id {}", kind, id);
            }
            board.update_status(id, status, &notifier).await?;
        }
        Command::Sellers { status } => {
            let board = SellerBoard::load(backend.clone(), status).await?;
            for s in board.rows() {
                let titles: Vec<&str> = s.products.iter().map(|p| p.title.as_str()).collect();
                println!(
                    "{}  {}  {}  {} <{}>  products: {}",
                    s.seller.id,
                    s.seller.status,
                    s.seller.company_name,
                    s.seller.contact_name,
                    s.seller.email,
                    titles.join("; "),
                );
            }
        }
        Command::SetSellerStatus { id, status } => {
            let mut board = SellerBoard::load(backend.clone(), None).await?;
            board.update_status(id, status, &notifier).await?;
        }
        Command::SellerRequests => {
            let apps = SellerApplications::load(backend.clone()).await?;
            for a in apps.rows() {
                println!(
                    "{}  {}  {}  {} <{}>  {}",
                    a.id, a.status, a.company_name, a.contact_name, a.email, a.product_categories
                );
            }
        }
        Command::ApproveSeller { id } => {
            let mut apps = SellerApplications::load(backend.clone()).await?;
            let seller = apps.approve(id, &notifier).await?;
            println!("seller {} is active", seller.id);
        }
        Command::RejectSeller { id } => {
            let mut apps = SellerApplications::load(backend.clone()).await?;
            apps.reject(id, &notifier).await?;
        }
        Command::Catalog {
            kind,
            status,
            category,
            seller,
        } => {
            let filter = ProductFilter {
                kind,
                status,
                category,
                seller_id: seller,
                limit: None,
            };
            let catalog = ProductCatalog::load(backend.clone(), filter).await?;
            for p in catalog.rows() {
                println!(
                    "{}  {}  {}  {}  [{}]  {}",
                    p.id,
                    p.kind,
                    p.status,
                    p.title,
                    p.category,
                    format_price(p.price)
                );
            }
        }
        Command::AddProduct {
            title,
            description,
            price,
            category,
            kind,
            image,
        } => {
            let image_url = match image {
                Some(path) => Some(admin::upload_image(backend.as_ref(), &path, &notifier).await?),
                None => None,
            };
            let draft = ProductDraft {
                title,
                description,
                price,
                category,
                kind,
            };
            let product = admin::add_product(backend.as_ref(), &draft, image_url, &notifier).await?;
            println!("{}", product.id);
        }
        Command::SetProductStatus { id, status } => {
            let mut catalog = ProductCatalog::load(backend.clone(), ProductFilter::default()).await?;
            catalog.update_status(id, status, &notifier).await?;
        }
        Command::DeleteProduct { id } => {
            let mut catalog = ProductCatalog::load(backend.clone(), ProductFilter::default()).await?;
            catalog.delete(id, &notifier).await?;
        }
        Command::Stats => {
            let stats =
                admin::load_stats(backend.as_ref(), backend.as_ref(), backend.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::ExampleConfig | Command::SignIn { .. } | Command::SignOut | Command::WhoAmI => {
            bail!("command is handled before a backend is opened")
        }
    }
    Ok(())
}
