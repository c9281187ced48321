use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::{fmt, time::Duration};
use streamload_core::types::DEFAULT_SERVER_ADDR;
use tonic::codec::CompressionEncoding;

/// Runtime configuration for the `streamload` binary.
///
/// These settings control how many streaming sessions are opened against the
/// target, how fast they are launched and how long each one holds its stream
/// open. All values are parsed from CLI arguments or environment variables
/// (a `.env` file is honored), with defaults that match a local greeter
/// server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "streamload",
    version,
    about = "Holds many concurrent bidirectional gRPC streams open against a Greeter server"
)]
pub struct CliArgs {
    /// Address of the Greeter server, as `host:port` or a full URI.
    ///
    /// Environment variable: `SERVER`
    #[arg(long, env = "SERVER", default_value_t = String::from(DEFAULT_SERVER_ADDR))]
    pub server: String,

    /// Number of clients to simulate. Each client owns one connection and
    /// one stream.
    ///
    /// Environment variable: `CLIENTS`
    #[arg(long, env = "CLIENTS", default_value_t = 1)]
    pub clients: u64,

    /// Pause between two client launches, in milliseconds. Caps the
    /// connection burst rate against the target.
    ///
    /// Environment variable: `LAUNCH_DELAY_MS`
    #[arg(long, env = "LAUNCH_DELAY_MS", default_value_t = 100)]
    pub launch_delay_ms: u64,

    /// How long a client holds the stream after each received message before
    /// closing its send half, in seconds.
    ///
    /// Environment variable: `HOLD_SECS`
    #[arg(long, env = "HOLD_SECS", default_value_t = 60)]
    pub hold_secs: u64,

    /// Idle interval after which the live client count is reported, in
    /// seconds. The run ends on the first idle report that sees zero clients.
    ///
    /// Environment variable: `REPORT_INTERVAL_SECS`
    #[arg(long, env = "REPORT_INTERVAL_SECS", default_value_t = 20)]
    pub report_interval_secs: u64,

    /// Log the launch count every N launches.
    ///
    /// Environment variable: `PROGRESS_EVERY`
    #[arg(long, env = "PROGRESS_EVERY", default_value_t = 10)]
    pub progress_every: u64,

    /// Upper bound on dialing (TCP connect plus TLS handshake), in seconds.
    ///
    /// Environment variable: `CONNECT_TIMEOUT_SECS`
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// After an interrupt, how long to wait for cancelled clients to unwind,
    /// in seconds.
    ///
    /// Environment variable: `DRAIN_TIMEOUT_SECS`
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 5)]
    pub drain_timeout_secs: u64,

    /// End each client after a single send/receive/hold cycle instead of
    /// receiving until the server ends the stream.
    ///
    /// Environment variable: `SINGLE_CYCLE`
    #[arg(long, env = "SINGLE_CYCLE", default_value_t = false)]
    pub single_cycle: bool,

    /// Perform a unary `SayHello` with this name before opening the stream.
    ///
    /// Environment variable: `GREET`
    #[arg(long, env = "GREET")]
    pub greet: Option<String>,

    /// Compression used for both directions of the stream.
    ///
    /// Environment variable: `COMPRESSION`
    #[arg(long, env = "COMPRESSION", value_enum, default_value_t = Compression::None)]
    pub compression: Compression,

    /// Connect over TLS.
    ///
    /// Environment variable: `TLS`
    #[arg(long, env = "TLS", default_value_t = false)]
    pub tls: bool,

    /// Skip server certificate verification when `--tls` is set.
    ///
    /// Environment variable: `INSECURE_SKIP_VERIFY`
    #[arg(
        long,
        env = "INSECURE_SKIP_VERIFY",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub insecure_skip_verify: bool,

    /// Log every received message and client start.
    ///
    /// Environment variable: `DEBUG`
    #[arg(long, env = "DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Emit logs as JSON lines instead of human-readable output.
    ///
    /// Environment variable: `LOG_JSON`
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,

    /// Port for the `/healthz` and `/stats` HTTP endpoints. `0` disables the
    /// listener.
    ///
    /// Environment variable: `HTTP_PORT`
    #[arg(long, env = "HTTP_PORT", default_value_t = 7789)]
    pub http_port: u16,
}

/// Compression applied to requests and accepted on responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Compression {
    #[default]
    None,
    Deflate,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Deflate => write!(f, "deflate"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Deflate => Some(CompressionEncoding::Deflate),
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

/// Immutable per-session settings, shared by every session of a run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server: String,
    pub tls: bool,
    pub insecure_skip_verify: bool,
    pub debug: bool,
    pub hold: Duration,
    pub connect_timeout: Duration,
    pub single_cycle: bool,
    pub greet: Option<String>,
    pub compression: Compression,
}

/// Validated configuration for a whole load-test run.
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub session: SessionConfig,
    pub clients: u64,
    pub launch_delay: Duration,
    pub report_interval: Duration,
    pub progress_every: u64,
    pub drain_timeout: Duration,
    pub log_json: bool,
    pub http_port: Option<u16>,
}

impl TryFrom<CliArgs> for LoadTestConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let server = args.server.trim().to_string();
        if server.is_empty() {
            bail!("SERVER must not be empty");
        }

        if args.report_interval_secs == 0 {
            bail!("REPORT_INTERVAL_SECS must be greater than 0");
        }

        if args.progress_every == 0 {
            bail!("PROGRESS_EVERY must be greater than 0");
        }

        if args.connect_timeout_secs == 0 {
            bail!("CONNECT_TIMEOUT_SECS must be greater than 0");
        }

        if let Some(name) = &args.greet {
            if name.trim().is_empty() {
                bail!("GREET must not be blank when set");
            }
        }

        Ok(Self {
            session: SessionConfig {
                server,
                tls: args.tls,
                insecure_skip_verify: args.insecure_skip_verify,
                debug: args.debug,
                hold: Duration::from_secs(args.hold_secs),
                connect_timeout: Duration::from_secs(args.connect_timeout_secs),
                single_cycle: args.single_cycle,
                greet: args.greet,
                compression: args.compression,
            },
            clients: args.clients,
            launch_delay: Duration::from_millis(args.launch_delay_ms),
            report_interval: Duration::from_secs(args.report_interval_secs),
            progress_every: args.progress_every,
            drain_timeout: Duration::from_secs(args.drain_timeout_secs),
            log_json: args.log_json,
            http_port: (args.http_port != 0).then_some(args.http_port),
        })
    }
}
