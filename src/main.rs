mod account;
mod actor;
mod cache;
mod classify;
mod config;
mod console;
mod constants;
mod credentials;
mod mail;
mod notify;
mod reply;
mod session;

use anyhow::{Context, Result};
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::account::AccountRegistry;
use crate::config::Config;
use crate::console::{ConsoleCommand, HELP};
use crate::credentials::CredentialStore;
use crate::mail::{ImapConnector, MailboxConnector, MailboxSession};
use crate::notify::Dispatcher;
use crate::reply::{LlmReplyGenerator, ReplyGenerator};
use crate::session::{SessionManager, WorkerSettings};

type Manager = SessionManager<ImapConnector>;

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailsift=debug"));

    // Stdout carries the event stream, so logs go to a file when possible
    let log_file = Config::data_dir()
        .ok()
        .and_then(|dir| std::fs::create_dir_all(&dir).ok().map(|_| dir))
        .map(|dir| dir.join("mailsift.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"mailsift - Classify incoming IMAP mail and alert on interested replies

Usage: mailsift [command]

Commands:
    run (default)             Connect all accounts, poll, and read commands from stdin
    check [--notify-test]     Verify configuration, credentials and connectivity
    set-password <account>    Store the IMAP password for an account
    help                      Show this help message

Configuration file: ~/.config/mailsift/config.toml (override with MAILSIFT_CONFIG)
"#
    );
}

/// One JSON object per line on stdout.
fn print_event<T: Serialize>(event: &T) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!("Failed to serialize event: {}", e),
    }
}

async fn run_service() -> Result<()> {
    setup_logging();

    let config = Config::load()?;
    config.ensure_dirs()?;

    let registry = AccountRegistry::from_config(&config)?;
    let dispatcher = Dispatcher::from_webhook(config.notifications.slack_webhook_url.as_deref());
    let replies: Arc<dyn ReplyGenerator> = Arc::new(LlmReplyGenerator::new(&config.reply));

    tracing::info!("Starting mailsift with {} account(s)", registry.len());

    let (manager, mut events) = SessionManager::new(
        registry,
        ImapConnector,
        dispatcher,
        replies,
        WorkerSettings::from_config(&config),
    );
    let manager = Arc::new(manager);
    manager.connect_all().await;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !dispatch_console_line(&manager, &line) {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed, running until interrupted");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    manager.disconnect_all().await;
    drop(manager);
    printer.abort();
    Ok(())
}

/// Run one console line. Returns false on quit.
fn dispatch_console_line(manager: &Arc<Manager>, line: &str) -> bool {
    let command = match console::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(e) => {
            eprintln!("{}", e);
            return true;
        }
    };

    let manager = Arc::clone(manager);
    match command {
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Help => eprintln!("{}", HELP),
        // Results arrive on the event stream
        ConsoleCommand::Fetch { account, uid } => {
            tokio::spawn(async move {
                let _ = manager.fetch_one(&account, uid).await;
            });
        }
        ConsoleCommand::List { account } => {
            tokio::spawn(async move {
                let _ = manager.fetch_list(&account).await;
            });
        }
        ConsoleCommand::Reply { account, uid } => {
            tokio::spawn(async move {
                match manager.generate_reply(&account, uid).await {
                    Ok(result) => print_event(&serde_json::json!({
                        "event": "reply-generated",
                        "data": result,
                    })),
                    Err(e) => print_event(&serde_json::json!({
                        "event": "reply-error",
                        "data": {
                            "accountId": account,
                            "uid": uid,
                            "error": e.to_string(),
                            "kind": e.kind(),
                        },
                    })),
                }
            });
        }
        ConsoleCommand::Reconnect { account } => {
            tokio::spawn(async move {
                if let Err(e) = manager.reconnect(&account).await {
                    eprintln!("reconnect {}: {}", account, e);
                }
            });
        }
        ConsoleCommand::Status => {
            tokio::spawn(async move {
                for (account, state) in manager.states().await {
                    eprintln!("{:<20} {}", account, state);
                }
            });
        }
    }

    true
}

async fn run_check(notify_test: bool) -> Result<()> {
    let config = Config::load()?;
    println!("Configuration OK: {}", Config::config_path()?.display());

    let registry = match AccountRegistry::from_config(&config) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Credential error: {:#}", e);
            std::process::exit(1);
        }
    };

    let connector = ImapConnector;
    let limit = config.connection.connect_timeout();
    let mut failures = 0;

    for account in registry.iter() {
        print!("{} ({}): ", account.id, account.address());
        match tokio::time::timeout(limit, connector.connect(account)).await {
            Ok(Ok(mut session)) => {
                let inbox = session.open_inbox().await;
                let _ = session.logout().await;
                match inbox {
                    Ok(()) => println!("OK"),
                    Err(e) => {
                        failures += 1;
                        println!("login OK, INBOX failed: {}", e);
                    }
                }
            }
            Ok(Err(e)) => {
                failures += 1;
                println!("FAILED: {}", e);
            }
            Err(_) => {
                failures += 1;
                println!("FAILED: timed out after {:?}", limit);
            }
        }
    }

    let dispatcher = Dispatcher::from_webhook(config.notifications.slack_webhook_url.as_deref());
    if notify_test {
        if dispatcher.notifier().test_connection().await {
            println!("Slack test notification sent");
        } else {
            failures += 1;
            println!("Slack test notification failed or notifications disabled");
        }
    }

    let replies = LlmReplyGenerator::new(&config.reply);
    match replies.client() {
        Some(client) => match client.test_connection().await {
            Ok(answer) => println!("Reply model OK: {}", answer),
            Err(e) => println!("Reply model unavailable ({:#}), template replies will be used", e),
        },
        None => println!("Reply model not configured, template replies will be used"),
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_set_password(account_id: &str) -> Result<()> {
    use std::io::{self, Write};

    let config = Config::load()?;
    let account = config
        .account(account_id)
        .with_context(|| format!("No account with id '{}' in configuration", account_id))?;

    print!("IMAP password for {} ({}): ", account.id, account.user);
    io::stdout().flush()?;
    let password = rpassword_read()?;
    println!();

    if password.is_empty() {
        anyhow::bail!("Empty password, nothing stored");
    }

    config.ensure_dirs()?;
    CredentialStore::new(&account.id, &account.user).set_password(&password)?;
    println!("Password stored for account '{}'.", account.id);
    Ok(())
}

fn rpassword_read() -> Result<String> {
    use std::io;

    // Disable echo
    let _guard = DisableEcho::new()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    Ok(password.trim().to_string())
}

struct DisableEcho {
    #[cfg(unix)]
    original: libc::termios,
}

impl DisableEcho {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use std::mem::MaybeUninit;
        use std::os::unix::io::AsRawFd;

        let fd = std::io::stdin().as_raw_fd();
        let mut termios = MaybeUninit::<libc::termios>::uninit();

        unsafe {
            if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
                anyhow::bail!("Failed to get terminal attributes");
            }
            let original = termios.assume_init();
            let mut new = original;
            new.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &new) != 0 {
                anyhow::bail!("Failed to set terminal attributes");
            }
            Ok(Self { original })
        }
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
impl Drop for DisableEcho {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let fd = std::io::stdin().as_raw_fd();
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some("check") => {
            let notify_test = args.iter().skip(2).any(|a| a == "--notify-test");
            run_check(notify_test).await
        }
        Some("set-password") => match args.get(2) {
            Some(account_id) => run_set_password(account_id),
            None => {
                eprintln!("Usage: mailsift set-password <account>");
                std::process::exit(1);
            }
        },
        Some("run") | None => run_service().await,
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }
}
