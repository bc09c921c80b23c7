//! CLI surface and derived server configuration. Mirrors the flags of the
//! original `gearmand` binary; daemonization/syslog plumbing is accepted for
//! compatibility but only does what the crate's scope covers (see DESIGN.md).

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "gearmand", about, long_about = None, version)]
pub struct Args {
    /// Addresses to listen on. May be given multiple times.
    #[arg(short = 'L', long = "listen")]
    pub listen: Vec<IpAddr>,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 4730)]
    pub port: u16,

    /// Number of runtime worker threads.
    #[arg(short, long, default_value_t = 4)]
    pub threads: usize,

    /// TCP listen backlog.
    #[arg(short, long, default_value_t = 32)]
    pub backlog: i32,

    /// Number of file descriptors to request via setrlimit.
    #[arg(short = 'f', long = "file-descriptors", default_value_t = 8192)]
    pub file_descriptors: u64,

    /// Number of times a failing foreground job is retried before WORK_FAIL
    /// is delivered to the client.
    #[arg(short = 'j', long = "job-retries", default_value_t = 0)]
    pub job_retries: u8,

    /// Number of sleeping workers woken per dispatchable job (0 = all).
    #[arg(short = 'w', long = "worker-wakeup", default_value_t = 0)]
    pub worker_wakeup: u32,

    /// Assign jobs to a worker's registered functions round-robin instead of
    /// always draining the first-registered function first.
    #[arg(short = 'R', long = "round-robin", default_value_t = false)]
    pub round_robin: bool,

    /// Persistent queue backend: "memory" or "file".
    #[arg(short = 'q', long = "queue-type", default_value = "memory")]
    pub queue_type: String,

    /// Path used by the "file" queue backend.
    #[arg(long = "queue-file", default_value = "/tmp/gearmand-queue.dat")]
    pub queue_file: PathBuf,

    /// Log file path. Reopened every 60 seconds to accommodate rotation.
    #[arg(short = 'l', long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// PID file path.
    #[arg(short = 'P', long = "pid-file")]
    pub pid_file: Option<PathBuf>,

    /// Run as a daemon. Out of scope for this crate (see spec); accepted for
    /// CLI compatibility and logs a warning if set.
    #[arg(short, long, default_value_t = false)]
    pub daemon: bool,

    /// Drop privileges to this user after binding listen sockets.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Increase verbosity. May be repeated.
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log through syslog instead of stderr/JSON.
    #[arg(long, default_value_t = false)]
    pub syslog: bool,

    /// Maximum accepted size, in bytes, of a job payload (SUBMIT_JOB body).
    #[arg(short = 'z', long = "max-job-size", default_value_t = 4 * 1024 * 1024)]
    pub max_job_size: u32,

    /// Parse and validate arguments, then exit 0 without starting the server.
    #[arg(long, default_value_t = false)]
    pub check_args: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen: vec![],
            port: 4730,
            threads: 4,
            backlog: 32,
            file_descriptors: 8192,
            job_retries: 0,
            worker_wakeup: 0,
            round_robin: false,
            queue_type: "memory".into(),
            queue_file: "/tmp/gearmand-queue.dat".into(),
            log_file: None,
            pid_file: None,
            daemon: false,
            user: None,
            verbose: 0,
            syslog: false,
            max_job_size: 4 * 1024 * 1024,
            check_args: false,
        }
    }
}

impl Args {
    /// Listen addresses, defaulting to the wildcard address if none given.
    pub fn listen_addrs(&self) -> Vec<IpAddr> {
        if self.listen.is_empty() {
            vec![IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))]
        } else {
            self.listen.clone()
        }
    }

    pub fn tracing_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

/// Server-wide tunables derived from [`Args`], threaded explicitly through
/// constructors instead of living behind a global singleton.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub job_retries: u8,
    pub worker_wakeup: u32,
    pub round_robin: bool,
    pub max_job_size: u32,
    pub job_handle_prefix: String,
}

impl ServerConfig {
    pub fn from_args(args: &Args, hostname: &str) -> Self {
        Self {
            job_retries: args.job_retries,
            worker_wakeup: args.worker_wakeup,
            round_robin: args.round_robin,
            max_job_size: args.max_job_size,
            job_handle_prefix: format!("H:{hostname}:"),
        }
    }
}
