use std::io::Write as _;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{setgid, setuid, User};
use tokio::net::TcpListener;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gearmand_rs::config::{Args, ServerConfig};
use gearmand_rs::queue::file::FileQueue;
use gearmand_rs::queue::memory::MemoryQueue;
use gearmand_rs::queue::PersistentQueue;
use gearmand_rs::server::Server;

fn main() -> ExitCode {
    let args = Args::parse();

    if args.check_args {
        return ExitCode::SUCCESS;
    }

    init_logging(&args);

    // SIGPIPE defaults to terminating the process; every other Unix network
    // server ignores it and handles the resulting EPIPE on write instead.
    if let Err(error) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
        warn!(%error, "failed to ignore SIGPIPE");
    }

    if let Err(error) = raise_file_descriptor_limit(args.file_descriptors) {
        warn!(%error, "failed to raise RLIMIT_NOFILE");
    }

    if let Some(pid_file) = &args.pid_file {
        if let Err(error) = write_pid_file(pid_file) {
            error!(%error, "failed to write pid file");
            return ExitCode::FAILURE;
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(args.threads.max(1))
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(error) => {
            error!(%error, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        },
    };

    let result = runtime.block_on(async_main(args));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "fatal error");
            ExitCode::FAILURE
        },
    }
}

async fn async_main(args: Args) -> Result<()> {
    let hostname = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string());
    let config = ServerConfig::from_args(&args, &hostname);

    let mut listeners = Vec::new();
    for addr in args.listen_addrs() {
        let listener = TcpListener::bind((addr, args.port))
            .await
            .with_context(|| format!("binding {addr}:{}", args.port))?;
        listeners.push(listener);
    }

    // Listen sockets are bound; drop to the unprivileged user before serving.
    if let Some(user) = &args.user {
        drop_privileges(user)?;
    }

    let queue: Arc<dyn PersistentQueue> = match args.queue_type.as_str() {
        "memory" => Arc::new(MemoryQueue::new(Some(args.queue_file.clone()))),
        "file" => Arc::new(FileQueue::open(args.queue_file.clone()).context("opening queue file")?),
        other => anyhow::bail!("unknown queue type: {other}"),
    };

    let server = Server::new(config, queue);

    let cancel = CancellationToken::new();
    let graceful = CancellationToken::new();
    spawn_signal_handlers(cancel.clone(), graceful.clone());

    info!(threads = args.threads, queue_type = %args.queue_type, "gearmand starting");

    server.run(listeners, cancel, graceful).await;

    if let Some(pid_file) = &args.pid_file {
        let _ = std::fs::remove_file(pid_file);
    }

    Ok(())
}

fn spawn_signal_handlers(cancel: CancellationToken, graceful: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = match unix_signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler");
                return;
            },
        };
        let mut sigint = match unix_signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(error) => {
                warn!(%error, "failed to install SIGINT handler");
                return;
            },
        };
        let mut sigusr1 = match unix_signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(error) => {
                warn!(%error, "failed to install SIGUSR1 handler");
                return;
            },
        };

        loop {
            tokio::select! {
                _ = sigterm.recv() => { info!("SIGTERM received, shutting down immediately"); cancel.cancel(); break; },
                _ = sigint.recv() => { info!("SIGINT received, shutting down immediately"); cancel.cancel(); break; },
                _ = sigusr1.recv() => { info!("SIGUSR1 received, shutting down gracefully"); graceful.cancel(); },
                _ = cancel.cancelled() => break,
            }
        }
    });
}

fn raise_file_descriptor_limit(requested: u64) -> nix::Result<()> {
    let (_, hard) = nix::sys::resource::getrlimit(Resource::RLIMIT_NOFILE)?;
    setrlimit(Resource::RLIMIT_NOFILE, requested.min(hard), hard)
}

fn drop_privileges(user: &str) -> Result<()> {
    let user = User::from_name(user)
        .context("looking up user")?
        .with_context(|| format!("no such user: {user}"))?;
    setgid(user.gid).context("setgid")?;
    setuid(user.uid).context("setuid")?;
    Ok(())
}

fn write_pid_file(path: &std::path::Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// Custom `MakeWriter` that periodically reopens its target file, so an
/// external log rotator can move the old file out from under us without
/// the process holding a dangling fd forever.
#[derive(Clone)]
struct ReopeningFileWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl ReopeningFileWriter {
    fn open(path: &std::path::Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Arc::new(Mutex::new(file)) })
    }

    /// Runs on a plain OS thread rather than a tokio task: logging is set up
    /// before the tokio runtime is built.
    fn spawn_reopener(&self, path: std::path::PathBuf) {
        let file = self.file.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(60));
            match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
                Ok(reopened) => *file.lock().unwrap() = reopened,
                Err(error) => eprintln!("failed to reopen log file {}: {error}", path.display()),
            }
        });
    }
}

impl std::io::Write for ReopeningFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.lock().unwrap().flush()
    }
}

impl<'w> tracing_subscriber::fmt::MakeWriter<'w> for ReopeningFileWriter {
    type Writer = Self;

    fn make_writer(&'w self) -> Self::Writer {
        self.clone()
    }
}

fn init_logging(args: &Args) {
    let level = args.tracing_level();

    if args.syslog {
        warn!("--syslog is not implemented in this build; logging to stderr/file instead");
    }

    match &args.log_file {
        Some(path) => match ReopeningFileWriter::open(path) {
            Ok(writer) => {
                writer.spawn_reopener(path.clone());
                tracing_subscriber::fmt().json().with_max_level(level).with_writer(writer).init();
            },
            Err(error) => {
                tracing_subscriber::fmt().json().with_max_level(level).init();
                error!(%error, path = %path.display(), "failed to open log file, logging to stderr");
            },
        },
        None => {
            tracing_subscriber::fmt().json().with_max_level(level).init();
        },
    }

    if args.daemon {
        warn!("--daemon is accepted for compatibility but this build never forks into the background");
    }
}
