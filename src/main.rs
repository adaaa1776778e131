//! # Helpdesk: Multi-Tenant Help Desk Server
//!
//! Usage:
//!   helpdesk serve                                   # Start the gateway (port from config, default 3000)
//!   helpdesk serve --port 8080 --config ./helpdesk.toml
//!   helpdesk create-tenant --name "Acme" --slug acme --trial-days 14
//!   helpdesk create-user --email agent@acme.com --password ... --tenant acme
//!   helpdesk deactivate-tenant --slug acme
//!   helpdesk list-tenants
//!   helpdesk audit-log --limit 20

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use helpdesk_core::config::{HelpdeskConfig, expand_path};
use helpdesk_tenancy::PlatformDb;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "helpdesk", version, about = "🎧 Helpdesk: multi-tenant help desk with knowledge-grounded livechat")]
struct Cli {
    /// Config file (default: ~/.helpdesk/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Listen port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Register a new tenant
    CreateTenant {
        #[arg(long)]
        name: String,
        /// Public identifier used by the help center and livechat widget
        #[arg(long)]
        slug: String,
        #[arg(long, default_value = "free")]
        plan: String,
        /// Start a trial ending this many days from now
        #[arg(long)]
        trial_days: Option<i64>,
    },
    /// Create a staff account attached to a tenant
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Tenant slug
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "agent")]
        role: String,
    },
    /// Soft-deactivate a tenant; its data stays readable
    DeactivateTenant {
        #[arg(long)]
        slug: String,
    },
    /// List all tenants
    ListTenants,
    /// Show the most recent platform audit events
    AuditLog {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<HelpdeskConfig> {
    let config = match path {
        Some(p) => HelpdeskConfig::load_from(p)?.with_env_overrides(),
        None => HelpdeskConfig::load()?,
    };
    Ok(config)
}

fn open_platform(config: &HelpdeskConfig) -> Result<PlatformDb> {
    let db_path = expand_path(&config.tenancy.platform_db);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    PlatformDb::open(&db_path).with_context(|| format!("opening {}", db_path.display()))
}

/// Audit writes never abort a command; failures are logged.
fn audit(db: &PlatformDb, event_type: &str, details: &str) {
    if let Err(e) = db.log_event(event_type, "cli", Some(details)) {
        tracing::warn!("⚠️ Audit log write failed ({event_type}): {e}");
    }
}

fn log_filter(verbose: bool) -> &'static str {
    if verbose {
        "helpdesk=debug,helpdesk_gateway=debug,helpdesk_tenancy=debug,helpdesk_knowledge=debug,helpdesk_providers=debug,tower_http=debug"
    } else {
        "helpdesk=info,helpdesk_gateway=info,helpdesk_tenancy=info,helpdesk_knowledge=info,helpdesk_providers=info"
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose))))
        .with_target(false)
        .init();

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if config.llm.api_key.is_empty() {
                tracing::warn!("⚠️  No LLM API key configured. Set HELPDESK_LLM_API_KEY unless the endpoint is local.");
            }
            let state = helpdesk_gateway::AppState::from_config(config)?;

            println!("🎧 Helpdesk v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 Port:        {}", state.config.server.port);
            println!("   🗄️  Platform DB: {}", state.config.tenancy.platform_db);
            println!("   📂 Tenant data: {}", state.config.tenancy.data_dir);
            println!("   🧠 Model:       {} ({})", state.llm.name(), state.config.llm.base_url);
            println!();

            helpdesk_gateway::start(Arc::new(state)).await?;
        }
        Command::CreateTenant { name, slug, plan, trial_days } => {
            if !is_valid_slug(&slug) {
                bail!("Slug must be lowercase letters, digits and dashes");
            }
            let db = open_platform(&config)?;
            if db.is_slug_taken(&slug) {
                bail!("Slug '{slug}' is already taken");
            }
            let tenant = db.create_tenant(&name, &slug, &plan, trial_days)?;
            audit(&db, "tenant_created", &format!("slug={slug}"));
            println!("✅ Tenant created:");
            println!("   ID:    {}", tenant.id);
            println!("   Slug:  {}", tenant.slug);
            println!("   Plan:  {}", tenant.plan);
            if let Some(ends) = &tenant.trial_ends_at {
                println!("   Trial: ends {ends}");
            }
        }
        Command::CreateUser { email, password, tenant, role } => {
            let db = open_platform(&config)?;
            let tenant = db
                .get_tenant_by_slug(&tenant)?
                .with_context(|| format!("no tenant with slug '{tenant}'"))?;
            let email = email.trim().to_lowercase();
            if db.get_user_by_email(&email)?.is_some() {
                bail!("User '{email}' already exists");
            }
            let hash = helpdesk_tenancy::auth::hash_password(&password)?;
            let id = db.create_user(&email, &hash, Some(&tenant.id), &role)?;
            audit(&db, "user_created", &format!("email={email} tenant={}", tenant.slug));
            println!("✅ User {email} ({role}) created for tenant {} [{id}]", tenant.slug);
        }
        Command::DeactivateTenant { slug } => {
            let db = open_platform(&config)?;
            let tenant = db
                .get_tenant_by_slug(&slug)?
                .with_context(|| format!("no tenant with slug '{slug}'"))?;
            db.set_tenant_active(&tenant.id, false)?;
            audit(&db, "tenant_deactivated", &format!("slug={slug}"));
            println!("⏸️  Tenant {slug} deactivated");
        }
        Command::ListTenants => {
            let db = open_platform(&config)?;
            let tenants = db.list_tenants()?;
            if tenants.is_empty() {
                println!("No tenants yet. Create one with `helpdesk create-tenant`.");
            }
            for t in tenants {
                let status = if t.active { "active" } else { "inactive" };
                println!(
                    "{:<20} {:<24} {:<8} {:<9} {}",
                    t.slug,
                    t.name,
                    t.plan,
                    status,
                    t.trial_ends_at.as_deref().unwrap_or("-")
                );
            }
        }
        Command::AuditLog { limit } => {
            let db = open_platform(&config)?;
            for e in db.recent_events(limit)? {
                println!(
                    "{:<26} {:<20} {:<38} {}",
                    e.created_at,
                    e.event_type,
                    e.actor_id,
                    e.details.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}
