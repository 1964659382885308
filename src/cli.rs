//! Command-line interface for mudgate.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Every option is optional so [`crate::config::Config::apply_args`]
/// can tell "not given" from "given" and keep the priority chain
/// intact.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Game server host name or address.
    pub host: Option<String>,
    /// Game server port.
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Password-derivation secret (overrides MUDGATE_SECRET).
    pub secret: Option<String>,
    /// Path to the credential store file.
    pub store_path: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// React in public channels too, not only direct messages.
    pub all_channels: bool,
    /// Do not create missing game accounts.
    pub no_auto_create: bool,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('H') | Long("host") => {
                result.host = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("port") => {
                let value: String = parser.value()?.parse()?;
                result.port = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("port", value))?,
                );
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('s') | Long("secret") => {
                result.secret = Some(parser.value()?.parse()?);
            }
            Long("store") => {
                result.store_path = Some(parser.value()?.parse()?);
            }
            Long("all-channels") => {
                result.all_channels = true;
            }
            Long("no-auto-create") => {
                result.no_auto_create = true;
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"mudgate {version}
Chat-to-MUD gateway with per-identity game sessions

USAGE:
    mudgate [OPTIONS]

OPTIONS:
    -H, --host <HOST>       Game server host [default: 127.0.0.1]
    -p, --port <PORT>       Game server port [default: 4000]
    -c, --config <FILE>     Path to configuration file (JSON)
    -s, --secret <SECRET>   Password-derivation secret
        --store <FILE>      Credential store file [default: data/users.json]
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
        --all-channels      React in public channels, not only DMs
        --no-auto-create    Never create missing game accounts
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    MUDGATE_HOST            Game server host (overrides config)
    MUDGATE_PORT            Game server port (overrides config)
    MUDGATE_SECRET          Password-derivation secret (required)
    MUDGATE_ACCOUNT_PREFIX  Prefix for provisioned account names
    MUDGATE_STORE_PATH      Credential store file (overrides config)
    MUDGATE_LOG_LEVEL       Log level (overrides config)
    RUST_LOG                Alternative log level setting

EXAMPLES:
    # Local game server, secret from the environment
    MUDGATE_SECRET=change-me mudgate

    # Remote game server
    mudgate -H mud.example.net -p 4000 -s change-me

    # Start with config file
    mudgate -c /etc/mudgate/config.json -s change-me
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("mudgate {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
