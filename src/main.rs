//! ferrokv server binary
//!
//! Wires the pieces together: CLI options, logging, the tokio runtime
//! (sized by `--workers`), the listener, the reaper, and the two-signal
//! shutdown sequence. The first SIGINT/SIGTERM drains connections and
//! auto-saves; a second one exits immediately.

use anyhow::Context;
use ferrokv::connection::{handle_connection, ConnectionRegistry, Reaper, ReaperConfig, ServerStats};
use ferrokv::storage::{EngineConfig, KvEngine};
use ferrokv::CommandHandler;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn, Level};

/// Marker variable so the daemonized child skips re-execing itself.
const DAEMON_ENV_GUARD: &str = "FERROKV_DAEMONIZED";

/// Server configuration.
struct Config {
    port: u16,
    bind: String,
    db_file: PathBuf,
    capacity: usize,
    workers: usize,
    daemonize: bool,
    log_file: Option<PathBuf>,
    backlog: u32,
    auto_save: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: ferrokv::DEFAULT_PORT,
            bind: ferrokv::DEFAULT_HOST.to_string(),
            db_file: PathBuf::from("kvstore.db"),
            capacity: 1024,
            workers: 4,
            daemonize: false,
            log_file: None,
            backlog: 512,
            auto_save: true,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments.
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "-p" | "--port" => {
                    config.port = Self::value_of(&args, &mut i, "port")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Invalid port: {}", args[i]);
                            std::process::exit(1);
                        });
                }
                "-b" | "--bind" => {
                    config.bind = Self::value_of(&args, &mut i, "bind");
                }
                "-f" | "--db-file" => {
                    config.db_file = PathBuf::from(Self::value_of(&args, &mut i, "db-file"));
                }
                "-c" | "--capacity" => {
                    config.capacity = Self::value_of(&args, &mut i, "capacity")
                        .parse()
                        .ok()
                        .filter(|&n| n > 0)
                        .unwrap_or_else(|| {
                            eprintln!("Invalid capacity: {}", args[i]);
                            std::process::exit(1);
                        });
                }
                "-w" | "--workers" => {
                    config.workers = Self::value_of(&args, &mut i, "workers")
                        .parse()
                        .ok()
                        .filter(|&n| (1..=64).contains(&n))
                        .unwrap_or_else(|| {
                            eprintln!("Invalid worker count: {}", args[i]);
                            std::process::exit(1);
                        });
                }
                "-d" | "--daemonize" => config.daemonize = true,
                "-l" | "--log-file" => {
                    config.log_file = Some(PathBuf::from(Self::value_of(&args, &mut i, "log-file")));
                }
                "--backlog" => {
                    config.backlog = Self::value_of(&args, &mut i, "backlog")
                        .parse()
                        .ok()
                        .filter(|&n| n > 0)
                        .unwrap_or_else(|| {
                            eprintln!("Invalid backlog: {}", args[i]);
                            std::process::exit(1);
                        });
                }
                "--no-auto-save" => config.auto_save = false,
                "-h" | "--help" => {
                    print_help(&args[0]);
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    print_version();
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown option: {}", other);
                    print_help(&args[0]);
                    std::process::exit(1);
                }
            }
            i += 1;
        }

        config
    }

    /// Returns the value following a flag, exiting when it is missing.
    fn value_of(args: &[String], i: &mut usize, name: &str) -> String {
        *i += 1;
        match args.get(*i) {
            Some(value) => value.clone(),
            None => {
                eprintln!("Option --{} requires a value", name);
                std::process::exit(1);
            }
        }
    }

    fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn print_help(prog: &str) {
    println!("Usage: {} [OPTIONS]", prog);
    println!("Options:");
    println!("  -p, --port <port>         Listen port (default: {})", ferrokv::DEFAULT_PORT);
    println!("  -b, --bind <addr>         Bind address (default: {})", ferrokv::DEFAULT_HOST);
    println!("  -f, --db-file <file>      Database file (default: kvstore.db)");
    println!("  -c, --capacity <n>        Initial capacity (default: 1024)");
    println!("  -w, --workers <n>         Runtime worker threads, 1..64 (default: 4)");
    println!("  -d, --daemonize           Run detached in the background");
    println!("  -l, --log-file <file>     Log file (default: stderr)");
    println!("  -h, --help                Show this help");
    println!("  -v, --version             Show version");
    println!("      --backlog <n>         Listen backlog (default: 512)");
    println!("      --no-auto-save        Disable auto-save on shutdown");
}

fn print_version() {
    println!("ferrokv server v{}", ferrokv::VERSION);
    println!("Protocol version: {}", ferrokv::PROTOCOL_VERSION);
}

fn print_banner(config: &Config) {
    println!(
        r#"
  ferrokv v{} - in-memory typed key/value store
  ─────────────────────────────────────────────
  Listening on {}
  Database file: {}

  Use Ctrl+C to shut down gracefully.
"#,
        ferrokv::VERSION,
        config.bind_address(),
        config.db_file.display(),
    );
}

/// Re-executes the binary detached from the terminal, then exits the
/// parent. The child sees the guard variable and proceeds normally.
fn daemonize() -> anyhow::Result<()> {
    if std::env::var_os(DAEMON_ENV_GUARD).is_some() {
        return Ok(());
    }

    let exe = std::env::current_exe().context("cannot resolve own executable")?;
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();

    std::process::Command::new(exe)
        .args(args)
        .env(DAEMON_ENV_GUARD, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn daemon process")?;

    std::process::exit(0);
}

fn init_logging(config: &Config) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false);

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Arc::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    if config.daemonize {
        daemonize()?;
    }

    init_logging(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(version = ferrokv::VERSION, "Starting ferrokv server");

    let engine = Arc::new(
        KvEngine::open(EngineConfig {
            capacity: config.capacity,
            db_file: config.db_file.clone(),
            auto_save: config.auto_save,
        })
        .context("failed to open database")?,
    );

    let stats = Arc::new(ServerStats::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let commands = CommandHandler::new(Arc::clone(&engine), Arc::clone(&stats));
    let reaper = Reaper::start(Arc::clone(&registry), ReaperConfig::default());

    let listener = bind_listener(&config)
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(addr = %config.bind_address(), "Server listening");

    if !config.daemonize {
        print_banner(&config);
    }

    tokio::select! {
        _ = accept_loop(listener, registry.clone(), commands, stats) => {}
        _ = shutdown_signal() => {}
    }

    // From here on a second signal means "right now".
    tokio::spawn(async {
        shutdown_signal().await;
        warn!("Second termination signal, exiting immediately");
        std::process::exit(1);
    });

    info!("Shutting down");
    reaper.stop();
    registry.close_all();

    // Give connection tasks a moment to observe the close and drain.
    for _ in 0..100 {
        if registry.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    engine.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Builds the listener by hand so backlog and address reuse apply.
fn bind_listener(config: &Config) -> anyhow::Result<TcpListener> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(config.backlog)?)
}

/// Accepts connections until the task is dropped by the shutdown select.
async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    commands: CommandHandler,
    stats: Arc<ServerStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    Arc::clone(&registry),
                    commands.clone(),
                    Arc::clone(&stats),
                ));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}
