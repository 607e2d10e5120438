mod api;
mod dispatcher;
mod notify;
mod poller;

use anyhow::Context as _;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Args, Parser, Subcommand};
use disparo_billing::SubscriptionClient;
use disparo_core::{
    config::{self, shellexpand, Config},
    message::{ListSection, Payload},
    session::Session,
};
use disparo_gateway::{AccountClient, GatewayClient};
use dispatcher::BulkDispatcher;
use notify::ConsoleNotifier;
use poller::{ConnectionPoller, PollStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[derive(Parser)]
#[command(
    name = "disparo",
    version,
    about = "Disparo: WhatsApp campaign sender"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "DISPARO_CONFIG")]
    config: String,
}

#[derive(Args)]
struct Credentials {
    /// Account email.
    #[arg(long, env = "DISPARO_EMAIL")]
    email: String,
    /// Account password.
    #[arg(long, env = "DISPARO_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the subscription and payment backend.
    Serve,
    /// Show the effective configuration.
    Status,
    /// Create an account.
    Register {
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Ask the backend whether an email has an active subscription.
    Subscription {
        #[arg(long, env = "DISPARO_EMAIL")]
        email: String,
    },
    /// Create a card payment intent (amount in centavos).
    Pay {
        #[arg(long)]
        amount: i64,
    },
    /// Pair a gateway instance by scanning its QR code.
    Connect {
        /// Instance name.
        instance: String,
        #[command(flatten)]
        credentials: Credentials,
    },
    /// Send one message to many recipients.
    Send {
        #[command(flatten)]
        credentials: Credentials,
        /// Recipients, separated by commas or newlines.
        #[arg(long, short)]
        to: String,
        /// Seconds between recipients.
        #[arg(long)]
        delay: Option<f64>,
        /// Instance to send through (defaults to gateway.instance_id).
        #[arg(long)]
        instance: Option<String>,
        #[command(subcommand)]
        message: SendMessage,
    },
}

#[derive(Subcommand)]
enum SendMessage {
    /// Plain text.
    Text { text: String },
    /// Media by public URL.
    MediaUrl {
        url: String,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Media uploaded from a local file.
    MediaFile {
        path: PathBuf,
        #[arg(long)]
        caption: Option<String>,
        /// MIME type of the file, e.g. image/png.
        #[arg(long)]
        mime: Option<String>,
    },
    /// A map pin.
    Location {
        #[arg(long, allow_hyphen_values = true)]
        latitude: String,
        #[arg(long, allow_hyphen_values = true)]
        longitude: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    /// An interactive list; sections come from a JSON file.
    List {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "Ver opções")]
        button_text: String,
        #[arg(long)]
        footer: Option<String>,
        /// JSON array of `{title, rows: [{title, description, rowId}]}`.
        #[arg(long)]
        sections: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let log_dir = PathBuf::from(shellexpand(&cfg.disparo.data_dir)).join("logs");
            let _guard = init_logging(&cfg.disparo.log_level, Some(&log_dir))?;
            serve(&cfg).await?;
        }
        Commands::Status => {
            init_logging("warn", None)?;
            print_status(&cli.config, &cfg);
        }
        Commands::Register { credentials } => {
            init_logging("warn", None)?;
            let account = account_client(&cfg)?;
            account
                .register(&credentials.email, &credentials.password)
                .await?;
            println!("Account created for {}.", credentials.email);
        }
        Commands::Subscription { email } => {
            init_logging("warn", None)?;
            let client = subscription_client(&cfg)?;
            let active = client.has_active_subscription(&email).await?;
            println!(
                "{email}: {}",
                if active { "active subscription" } else { "no active subscription" }
            );
        }
        Commands::Pay { amount } => {
            init_logging("warn", None)?;
            let client = subscription_client(&cfg)?;
            let secret = client.create_payment_intent(amount).await?;
            println!("{secret}");
        }
        Commands::Connect {
            instance,
            credentials,
        } => {
            init_logging("warn", None)?;
            connect(&cfg, &credentials, &instance).await?;
        }
        Commands::Send {
            credentials,
            to,
            delay,
            instance,
            message,
        } => {
            init_logging("warn", None)?;
            let payload = build_payload(message).await?;
            let delay = delay.unwrap_or(cfg.dispatch.default_delay_secs);
            let instance = instance.unwrap_or_else(|| cfg.gateway.instance_id.clone());
            send(&cfg, &credentials, &to, payload, delay, instance).await?;
        }
    }

    Ok(())
}

/// Log to stderr, and also to `{log_dir}/disparo.log` when given. `RUST_LOG`
/// wins over `default_level`.
fn init_logging(default_level: &str, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let Some(dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let (file, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "disparo.log"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(file))
        .init();
    Ok(Some(guard))
}

fn timeout(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.gateway.timeout_secs)
}

fn account_client(cfg: &Config) -> anyhow::Result<AccountClient> {
    Ok(AccountClient::new(&cfg.account, timeout(cfg))?)
}

fn subscription_client(cfg: &Config) -> anyhow::Result<SubscriptionClient> {
    if cfg.billing.backend_url.is_empty() {
        anyhow::bail!(
            "billing backend URL is not set. Set billing.backend_url in config.toml \
             or DISPARO_BACKEND_URL."
        );
    }
    let http = reqwest::Client::builder().timeout(timeout(cfg)).build()?;
    Ok(SubscriptionClient::new(http, &cfg.billing.backend_url))
}

async fn serve(cfg: &Config) -> anyhow::Result<()> {
    let state = api::ApiState::from_config(&cfg.billing, timeout(cfg))?;
    info!("Disparo backend starting");
    api::serve(&cfg.api, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
    })
    .await?;
    Ok(())
}

fn print_status(path: &str, cfg: &Config) {
    let set = |value: &str| if value.is_empty() { "not set" } else { "set" };

    println!("Disparo: Status Check\n");
    println!("Config: {path}");
    println!("Name: {}", cfg.disparo.name);
    println!("Data dir: {}", shellexpand(&cfg.disparo.data_dir));
    println!();
    println!(
        "  gateway backend: {}",
        if cfg.gateway.backend_url.is_empty() {
            "not set"
        } else {
            cfg.gateway.backend_url.as_str()
        }
    );
    println!("  status webhook:  {}", cfg.gateway.status_url);
    println!("  instance:        {}", cfg.gateway.instance_id);
    println!("  gateway api key: {}", set(&cfg.gateway.api_key));
    println!("  poll interval:   {}s", cfg.poller.interval().as_secs());
    println!();
    println!("  stripe:          {}", set(&cfg.billing.stripe_secret_key));
    println!("  asaas:           {}", set(&cfg.billing.asaas_api_key));
    println!("  api:             {}:{}", cfg.api.host, cfg.api.port);
}

/// Check credentials against the login webhook and record the user.
async fn login(cfg: &Config, credentials: &Credentials) -> anyhow::Result<Arc<Session>> {
    let account = account_client(cfg)?;
    if !account
        .login(&credentials.email, &credentials.password)
        .await?
    {
        anyhow::bail!("invalid email or password");
    }
    let session = Arc::new(Session::new());
    session.login(&credentials.email);
    if let Some(at) = session.logged_in_at() {
        info!("logged in as {} at {at}", credentials.email);
    }
    Ok(session)
}

async fn connect(cfg: &Config, credentials: &Credentials, instance: &str) -> anyhow::Result<()> {
    let session = login(cfg, credentials).await?;
    let gateway = Arc::new(GatewayClient::new(&cfg.gateway)?);
    let poller = ConnectionPoller::new(
        gateway,
        Arc::new(ConsoleNotifier),
        session.clone(),
        &cfg.poller,
    );
    let qr_path = PathBuf::from(shellexpand(&cfg.disparo.data_dir)).join("qr.png");

    // Subscribe first so a reply that lands right away still wakes the loop.
    let mut updates = poller.subscribe();
    poller.open();
    poller.set_instance_name(instance);
    poller.start()?;
    let mut shown_qr: Option<String> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                poller.close();
                eprintln!();
                println!("Cancelled.");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = updates.borrow_and_update().clone();
                match snap.status {
                    PollStatus::ShowingQr => {
                        if snap.qr_image != shown_qr {
                            if let Some(image) = snap.qr_image.as_deref() {
                                write_qr(&qr_path, image)?;
                                println!("\nScan the QR code saved at {}", qr_path.display());
                            }
                            shown_qr = snap.qr_image.clone();
                        }
                        eprint!("\rNext check in {:>2}s ", snap.countdown_secs);
                    }
                    PollStatus::Connected => {
                        eprintln!();
                        println!("Instance {} connected.", snap.instance_name.trim());
                        break;
                    }
                    PollStatus::Failed => {
                        eprintln!();
                        anyhow::bail!(
                            "connection check failed: {}",
                            snap.last_error.unwrap_or_default()
                        );
                    }
                    _ => {}
                }
            }
        }
    }
    session.logout();
    Ok(())
}

fn write_qr(path: &Path, image: &str) -> anyhow::Result<()> {
    let bytes = BASE64
        .decode(image.trim())
        .context("QR image is not valid base64")?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

async fn build_payload(message: SendMessage) -> anyhow::Result<Payload> {
    let payload = match message {
        SendMessage::Text { text } => Payload::Text { text },
        SendMessage::MediaUrl { url, caption } => Payload::MediaUrl {
            media_url: url,
            caption,
        },
        SendMessage::MediaFile {
            path,
            caption,
            mime,
        } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Payload::MediaFile {
                file_name,
                mime_type: mime,
                bytes,
                caption,
            }
        }
        SendMessage::Location {
            latitude,
            longitude,
            name,
            address,
        } => Payload::Location {
            latitude,
            longitude,
            name,
            address,
        },
        SendMessage::List {
            title,
            description,
            button_text,
            footer,
            sections,
        } => {
            let raw = tokio::fs::read_to_string(&sections)
                .await
                .with_context(|| format!("failed to read {}", sections.display()))?;
            let sections = ListSection::parse_all(&raw)
                .with_context(|| format!("{} is not a valid sections list", sections.display()))?;
            Payload::List {
                title,
                description,
                button_text,
                footer_text: footer,
                sections,
            }
        }
    };
    Ok(payload)
}

async fn send(
    cfg: &Config,
    credentials: &Credentials,
    recipients: &str,
    payload: Payload,
    delay: f64,
    instance: String,
) -> anyhow::Result<()> {
    let session = login(cfg, credentials).await?;
    let user = session.require_user()?;
    let gateway = Arc::new(GatewayClient::new(&cfg.gateway)?);
    let dispatcher = BulkDispatcher::new(
        gateway,
        Arc::new(ConsoleNotifier),
        session.clone(),
        instance,
    );

    let handle = dispatcher.submit(recipients, payload, delay)?;
    info!("{user} started dispatch {}", handle.id());

    let mut progress = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                break;
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let p = *progress.borrow_and_update();
                eprint!("\rSent {}/{} ", p.sent, p.total);
            }
        }
    }

    let report = handle.wait().await;
    eprintln!();
    session.logout();
    match report.error() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
