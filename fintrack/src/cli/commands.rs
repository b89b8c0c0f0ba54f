//! CLI command execution.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::api::{BendClient, OtpExchange, TransactionSet};
use crate::config::{default_config_file, mask_secret, Config};
use crate::error::SessionError;
use crate::logging;
use crate::models::Session;
use crate::session::{DeviceIdentity, SessionStore};

use super::args::{Cli, Commands, ConfigAction, OutputFormat, TransactionArgs};
use super::output::{
    build_filters, format_remaining, render_accounts, render_counts, render_transaction_preview,
    resolve_date_range, staging_file_name, write_staging_file, DateRange, StagingFile,
};

const LOGIN_HINT: &str = "Run 'fintrack login' to authenticate";
const PREVIEW_ROWS: usize = 10;

/// Execute the parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let log_http = cli.command.log_http();
    logging::init(cli.verbose, log_http);

    let explicit = cli.config.as_deref();
    let load = || -> Result<Config> {
        let mut config = Config::load(explicit).context("Failed to load configuration")?;
        config.log_http |= log_http;
        Ok(config)
    };

    match cli.command {
        Commands::Login {
            phone,
            otp,
            otp_mode,
            channel,
            ..
        } => cmd_login(&load()?, phone, otp, otp_mode, channel).await,
        Commands::Check { .. } => cmd_check(&load()?).await,
        Commands::Accounts { output, .. } => cmd_accounts(&load()?, output).await,
        Commands::Transactions(args) => cmd_transactions(&load()?, &args).await,
        Commands::Logout => cmd_logout(&load()?),
        Commands::Config { action } => cmd_config(explicit, action),
    }
}

/// Put a usable session into `client`.
///
/// A valid stored session is used as is. An invalid one with a refresh token
/// is refreshed and saved. Anything else asks the operator to log in.
/// Returns the session as it now is on disk.
pub async fn ensure_session(store: &SessionStore, client: &mut BendClient) -> Result<Session> {
    let session = match store.load() {
        Ok(session) => session,
        Err(SessionError::NotFound(_)) => bail!("No session found. {LOGIN_HINT}"),
        Err(e) => return Err(e).context(format!("Failed to load session. {LOGIN_HINT}")),
    };

    if session.is_valid() {
        client.set_session(session.clone());
        return Ok(session);
    }

    if !session.has_refresh_token() {
        return Err(SessionError::Expired).context(format!("Session expired. {LOGIN_HINT}"));
    }

    eprintln!("Session expired, attempting to refresh...");
    client.set_session(session);
    client
        .refresh_session()
        .await
        .with_context(|| format!("Session refresh failed. {LOGIN_HINT}"))?;

    let refreshed = client
        .session()
        .cloned()
        .context("Refresh produced no session")?;
    store
        .save(&refreshed)
        .context("Failed to save refreshed session")?;
    eprintln!("Session refreshed");
    Ok(refreshed)
}

/// Write the held session back if a call changed it since `saved`, which
/// happens when the server rotates the `marble-cookie`.
fn sync_session(store: &SessionStore, client: &BendClient, saved: &Session) -> Result<()> {
    match client.session() {
        Some(current) if current != saved => {
            store.save(current).context("Failed to save session")?;
            tracing::debug!("session cookie rotated, saved");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Attach `action` to a client error, pointing at `fintrack login` when the
/// failure needs a new session.
fn api_context<T>(result: crate::error::Result<T>, action: &str) -> Result<T> {
    result.map_err(|err| {
        let message = if err.is_reauth_required() {
            format!("{action}. {LOGIN_HINT}")
        } else if err.status() == Some(429) {
            format!("{action}. The server is rate limiting requests; retry later or raise rate_limit_ms")
        } else {
            action.to_string()
        };
        anyhow::Error::new(err).context(message)
    })
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}

fn print_session_saved(store: &SessionStore, session: &Session) {
    println!("Session saved to: {}", store.path().display());
    if let Some(expires_at) = session.expires_at {
        println!("Token expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

async fn cmd_login(
    config: &Config,
    phone: Option<String>,
    otp: Option<String>,
    otp_mode: bool,
    channel: String,
) -> Result<()> {
    let store = SessionStore::new(&config.session_file);

    let info = store.describe();
    if info.valid {
        println!("Already authenticated.");
        if let Some(remaining) = info.time_remaining {
            println!("Session valid for {}", format_remaining(remaining));
        }
        println!("Run 'fintrack logout' first to log in again.");
        return Ok(());
    }

    if otp_mode || phone.is_some() {
        return login_with_otp(config, &store, phone, otp, channel).await;
    }

    let Some(refresh_token) = config.refresh_token() else {
        bail!(
            "No refresh token configured. Set refresh_token in {} or FINTRACK_REFRESH_TOKEN, \
             or run 'fintrack login --otp-mode'",
            config.target_file().display()
        );
    };

    println!("Using refresh token from configuration...");
    let mut client = BendClient::from_config(config).context("Failed to create client")?;
    client
        .initialize_from_refresh_token(refresh_token)
        .await
        .context("Failed to initialize from refresh token")?;

    // The refresh rotated the token; the configured one is spent.
    let rotated = client
        .session()
        .map(|session| session.refresh_token.clone())
        .context("Login produced no session")?;
    persist_credentials(config, client.device(), &rotated)?;

    finish_login(&store, &mut client).await
}

async fn login_with_otp(
    config: &Config,
    store: &SessionStore,
    phone: Option<String>,
    otp: Option<String>,
    channel: String,
) -> Result<()> {
    let phone = match phone {
        Some(phone) => phone,
        None => prompt("Phone number: ")?,
    };
    let exchange = OtpExchange::new(&phone)?.with_channel(channel);

    let mut client = BendClient::from_config(config).context("Failed to create client")?;
    client
        .request_otp(&exchange)
        .await
        .context("Failed to request OTP")?;
    println!("OTP sent to {} via {}", exchange.phone(), exchange.channel());

    let code = match otp {
        Some(code) => code,
        None => prompt("Enter OTP: ")?,
    };
    client
        .login_with_otp(&exchange, &code)
        .await
        .context("Failed to verify OTP")?;
    println!("OTP verified");

    // The bootstrap refresh already spent the verified token, so the
    // session holds the one to keep.
    let session = client
        .clear_session()
        .context("OTP login produced no session")?;
    persist_credentials(config, exchange.device(), &session.refresh_token)?;
    println!(
        "Configuration updated with device_hash and refresh_token: {}",
        config.target_file().display()
    );

    // Later runs will present the exchange's device, so verify with it too.
    let updated = config.with_credentials(exchange.device(), &session.refresh_token);
    let mut client = BendClient::from_config(&updated).context("Failed to create client")?;
    client.set_session(session);

    finish_login(store, &mut client).await
}

/// Store the device and current refresh token in the config file without
/// baking in environment overrides.
fn persist_credentials(config: &Config, device: &DeviceIdentity, refresh_token: &str) -> Result<()> {
    let target = config.target_file();
    let on_disk = if target.exists() {
        Config::load_from_file(&target)?
    } else {
        Config::default()
    };
    on_disk
        .with_credentials(device, refresh_token)
        .save(&target)
        .context("Failed to update configuration")?;
    Ok(())
}

async fn finish_login(store: &SessionStore, client: &mut BendClient) -> Result<()> {
    let session = client.session().context("Login produced no session")?;
    store.save(session).context("Failed to save session")?;
    println!("Authentication successful!");
    print_session_saved(store, session);

    let saved = session.clone();
    match client.check_session().await {
        Ok(user) => println!("Authenticated as {}", user.full_name()),
        Err(e) => eprintln!("Warning: session verification failed: {e}"),
    }
    sync_session(store, client, &saved)?;

    println!();
    println!("Next steps:");
    println!("- Check accounts: fintrack accounts");
    println!("- Fetch transactions: fintrack transactions");
    Ok(())
}

async fn cmd_check(config: &Config) -> Result<()> {
    let store = SessionStore::new(&config.session_file);
    let info = store.describe();
    if !info.exists {
        bail!("No session found. {LOGIN_HINT}");
    }

    println!("Session file: {}", store.path().display());
    println!(
        "Refresh token: {}",
        if info.has_refresh_token { "present" } else { "missing" }
    );

    let mut client = BendClient::from_config(config).context("Failed to create client")?;
    let saved = ensure_session(&store, &mut client).await?;

    let info = store.describe();
    if let Some(expires_at) = info.expires_at {
        println!("Expires: {}", expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(remaining) = info.time_remaining {
        println!("Valid for: {}", format_remaining(remaining));
    }

    let user = api_context(client.check_session().await, "Session check failed")?;
    sync_session(&store, &client, &saved)?;

    println!();
    println!("User: {}", user.full_name());
    println!("ID: {}", user.uuid);
    if !user.email.is_empty() {
        println!("Email: {}", user.email);
    }
    if !user.phone.is_empty() {
        println!("Phone: {}", user.phone);
    }
    Ok(())
}

async fn cmd_accounts(config: &Config, output: OutputFormat) -> Result<()> {
    let store = SessionStore::new(&config.session_file);
    let mut client = BendClient::from_config(config).context("Failed to create client")?;
    let saved = ensure_session(&store, &mut client).await?;

    let accounts = api_context(client.accounts().await, "Failed to fetch accounts")?;
    sync_session(&store, &client, &saved)?;
    if accounts.is_empty() {
        println!("No accounts found");
        return Ok(());
    }

    print!("{}", render_accounts(&accounts, output)?);
    if output == OutputFormat::Table {
        println!();
        println!("Use an account ID with 'fintrack transactions --account-id <UUID>'");
    }
    Ok(())
}

async fn cmd_transactions(config: &Config, args: &TransactionArgs) -> Result<()> {
    let (start, end) =
        resolve_date_range(args.from.as_deref(), args.to.as_deref(), args.days, Utc::now())?;

    let store = SessionStore::new(&config.session_file);
    let mut client = BendClient::from_config(config).context("Failed to create client")?;
    let saved = ensure_session(&store, &mut client).await?;

    println!(
        "Fetching transactions from {} to {}",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    );

    let user_id = api_context(client.user_id().await, "Failed to get user ID")?;
    let filters = build_filters(args, start, end);

    let set = if args.all {
        api_context(
            client.fetch_all_transactions(&user_id, filters).await,
            "Failed to fetch transactions",
        )?
    } else {
        let page = api_context(
            client.fetch_transactions(&user_id, &filters).await,
            "Failed to fetch transactions",
        )?;
        TransactionSet {
            transactions: page.transactions,
            counts: page.counts,
            total: page.total,
            pages: 1,
        }
    };

    sync_session(&store, &client, &saved)?;

    if set.transactions.is_empty() {
        println!("No transactions found");
        return Ok(());
    }

    println!(
        "Found {} transactions in {} page(s) (total in API: {})",
        set.transactions.len(),
        set.pages,
        set.total
    );
    print!("{}", render_transaction_preview(&set.transactions, PREVIEW_ROWS));

    let file = StagingFile {
        transactions: &set.transactions,
        counts: &set.counts,
        fetched_at: Utc::now(),
        date_range: DateRange {
            from: start,
            to: end,
        },
        total_count: set.transactions.len(),
    };
    let name = staging_file_name(args, start, end, Utc::now());
    let path = write_staging_file(&args.staging_dir, &name, &file)?;

    print!("{}", render_counts(&set.counts));
    println!("Saved {} transactions to {}", set.transactions.len(), path.display());
    Ok(())
}

fn cmd_logout(config: &Config) -> Result<()> {
    let store = SessionStore::new(&config.session_file);
    store.delete().context("Failed to delete session")?;
    println!("Logged out. Removed {}", store.path().display());
    Ok(())
}

fn cmd_config(explicit: Option<&Path>, action: ConfigAction) -> Result<()> {
    let target = explicit.map_or_else(default_config_file, Path::to_path_buf);
    match action {
        ConfigAction::Show => {
            let config = Config::load(explicit).context("Failed to load configuration")?;
            let rendered = serde_json::to_string_pretty(&config.redacted())
                .context("Failed to serialize configuration")?;
            println!("{rendered}");
        }
        ConfigAction::Path => println!("{}", target.display()),
        ConfigAction::Get { key } => {
            let config =
                Config::load_unvalidated(explicit).context("Failed to load configuration")?;
            println!("{}", config.get_value(&key)?);
        }
        ConfigAction::Set { key, value } => {
            set_config_value(&target, &key, &value)?;
            let shown = if key == "refresh_token" {
                mask_secret(&value)
            } else {
                value
            };
            println!("Set {key} = {shown}");
        }
        ConfigAction::Validate => {
            let config =
                Config::load_unvalidated(explicit).context("Failed to load configuration")?;
            config.validate().context("Configuration validation failed")?;
            println!("Configuration is valid");
        }
    }
    Ok(())
}

/// Edit one key in the file at `target`, leaving environment overrides out.
fn set_config_value(target: &Path, key: &str, value: &str) -> Result<()> {
    let mut on_disk = if target.exists() {
        Config::load_from_file(target)?
    } else {
        Config::default()
    };
    on_disk.set_value(key, value)?;
    on_disk
        .validate()
        .with_context(|| format!("Refusing to set {key}"))?;
    on_disk
        .save(target)
        .context("Failed to update configuration")?;
    Ok(())
}
