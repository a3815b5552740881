use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use zzp_manager::api::{self, AppState};
use zzp_manager::auth::{self, Caller};
use zzp_manager::config::{self, Config, LogFormat};
use zzp_manager::db::Database;
use zzp_manager::invoice_gen::InvoiceGenerator;
use zzp_manager::mail::Mailer;
use zzp_manager::models::{NewProfile, PaymentTerm, Role};
use zzp_manager::ui;
use zzp_manager::validation::Validator;

#[derive(Parser)]
#[command(name = "zzp-manager", about = "Invoicing and client onboarding for Dutch freelancers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Open the terminal review console
    Dashboard {
        /// Email of the user whose permissions apply
        #[arg(long = "as")]
        as_user: String,
    },
    /// Apply database migrations
    Migrate,
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Mark overdue invoices and drop expired sessions
    SweepOverdue,
}

#[derive(Subcommand)]
enum UserCommand {
    /// Create a user and assign a role
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        role: Role,
        /// Limit the role to one profile
        #[arg(long)]
        profile: Option<i32>,
        /// RFC 3339 timestamp after which the role lapses
        #[arg(long)]
        expires: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Register the business that sends invoices
    Add(ProfileArgs),
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    kvk: String,
    #[arg(long)]
    vat: String,
    #[arg(long)]
    iban: String,
    #[arg(long)]
    bic: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    postal_code: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    term: Option<PaymentTerm>,
    #[arg(long)]
    prefix: Option<String>,
}

impl From<ProfileArgs> for NewProfile {
    fn from(args: ProfileArgs) -> Self {
        Self {
            name: args.name,
            email: args.email,
            phone: args.phone,
            address: args.address,
            postal_code: args.postal_code,
            city: args.city,
            kvk_number: args.kvk,
            vat_id: args.vat,
            iban: args.iban,
            bic: args.bic,
            default_payment_term: args.term,
            invoice_prefix: args.prefix,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init()?;

    // the console owns the terminal, so it gets no stdout logging
    if !matches!(cli.command, Command::Dashboard { .. }) {
        init_tracing(config.log_format);
    }

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Dashboard { as_user } => dashboard(&config, &as_user).await,
        Command::Migrate => {
            let db = Database::new(&config).await.context("connecting to database")?;
            db.migrate().await.context("running migrations")?;
            Ok(())
        }
        Command::User(UserCommand::Add {
            email,
            name,
            password,
            role,
            profile,
            expires,
        }) => {
            let db = Database::new(&config).await.context("connecting to database")?;
            if let Some(profile_id) = profile {
                db.get_profile(profile_id)
                    .await
                    .with_context(|| format!("profile {profile_id}"))?;
            }
            let hash = auth::hash_password(&password)?;
            let user = db.create_user(&email, &name, &hash).await.context("creating user")?;
            db.assign_role(user.id, role, profile, expires)
                .await
                .context("assigning role")?;
            println!("Created user {} ({}) with role {role}", user.id, user.email);
            Ok(())
        }
        Command::Profile(ProfileCommand::Add(args)) => {
            let db = Database::new(&config).await.context("connecting to database")?;
            let profile = db.create_profile(&args.into()).await.context("creating profile")?;
            println!("Created profile {} ({})", profile.id, profile.name);
            Ok(())
        }
        Command::SweepOverdue => {
            let db = Database::new(&config).await.context("connecting to database")?;
            let overdue = db.sweep_overdue(Utc::now().date_naive()).await?;
            let purged = db.purge_expired_sessions().await?;
            tracing::info!(overdue = overdue.len(), purged_sessions = purged, "sweep finished");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let db = Database::new(&config).await.context("connecting to database")?;
    db.migrate().await.context("running migrations")?;

    let validator = Validator::from_config(&config).context("building registry clients")?;
    let mailer = Mailer::from_config(&config).context("configuring mail")?;
    let invoices = InvoiceGenerator::new(&config.invoice_output_dir).context("preparing invoice directory")?;

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid BIND_ADDR '{}'", config.bind_addr))?;
    let purge_every = config.registry_cache_ttl().max(Duration::from_secs(60));
    let purger = tokio::spawn(purge_registry_caches(validator.clone(), purge_every));
    let app = api::router(AppState::new(db, config, validator, mailer, invoices));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("serving HTTP")?;
    purger.abort();
    Ok(())
}

async fn purge_registry_caches(validator: Validator, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let purged = validator.purge_caches();
        if purged > 0 {
            tracing::debug!(purged, "expired registry answers dropped");
        }
    }
}

async fn dashboard(config: &Config, email: &str) -> Result<()> {
    let db = Database::new(config).await.context("connecting to database")?;
    let Some(user) = db.find_user_by_email(email).await? else {
        bail!("no user with email {email}");
    };
    let roles = db.roles_for_user(user.id).await?;
    let caller = Caller::new(user, roles);

    ui::run_dashboard(db, caller).await?;
    println!("Thanks for using ZZP Manager!");
    Ok(())
}
