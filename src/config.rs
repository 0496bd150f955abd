use crate::errors::ProcessorError::{self, ConfigError};
use clap::{App, Arg, ArgMatches};
use rusoto_core::Region;
use std::str::FromStr;
use std::time::Duration;

pub type Queue = String;
pub type Port = u32;

/// SQS caps a single receive at 10 messages
pub const MAX_RECEIVE_MESSAGES: u32 = 10;
/// SQS caps the long-poll wait at 20 seconds
pub const MAX_WAIT_SECONDS: u32 = 20;

const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(1000);
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(2000);

/// Where the queue lives
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// An ElasticMQ server on localhost
    Local(Port, Queue),
    AWS(Region, Queue),
}

impl Mode {
    pub fn queue(&self) -> &str {
        match self {
            Mode::Local(_, queue) | Mode::AWS(_, queue) => queue,
        }
    }
}

/// Which received messages get deleted after processing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    /// Delete everything that was received, whatever the outcome
    All,
    /// Delete only messages whose processing succeeded; the rest are
    /// redelivered and eventually dead-lettered by the queue
    #[default]
    OnSuccess,
}

impl FromStr for DeletePolicy {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(DeletePolicy::All),
            "on-success" => Ok(DeletePolicy::OnSuccess),
            other => Err(ConfigError(format!(
                "Invalid delete policy '{}', expected 'all' or 'on-success'",
                other
            ))),
        }
    }
}

/// Immutable worker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mode: Mode,
    pub max_messages: u32,
    pub wait_seconds: u32,
    /// Pause after every iteration, `None` to poll again right away
    pub idle_delay: Option<Duration>,
    /// Pause after a failed receive, independent of the idle delay
    pub error_backoff: Duration,
    pub visibility_timeout: Option<u32>,
    pub delete_policy: DeletePolicy,
    /// How long an in-flight delete may run on after shutdown was requested
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn new(mode: Mode) -> Self {
        Config {
            mode,
            max_messages: MAX_RECEIVE_MESSAGES,
            wait_seconds: MAX_WAIT_SECONDS,
            idle_delay: Some(DEFAULT_IDLE_DELAY),
            error_backoff: DEFAULT_ERROR_BACKOFF,
            visibility_timeout: None,
            delete_policy: DeletePolicy::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_wait_seconds(mut self, wait_seconds: u32) -> Self {
        self.wait_seconds = wait_seconds;
        self
    }

    pub fn with_idle_delay(mut self, idle_delay: Option<Duration>) -> Self {
        self.idle_delay = idle_delay;
        self
    }

    pub fn with_error_backoff(mut self, error_backoff: Duration) -> Self {
        self.error_backoff = error_backoff;
        self
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Option<u32>) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    pub fn validate(self) -> Result<Self, ProcessorError> {
        if self.mode.queue().is_empty() {
            return Err(ConfigError("The queue must not be empty".to_owned()));
        }
        if self.max_messages == 0 || self.max_messages > MAX_RECEIVE_MESSAGES {
            return Err(ConfigError(format!(
                "max messages must be between 1 and {}, got {}",
                MAX_RECEIVE_MESSAGES, self.max_messages
            )));
        }
        if self.wait_seconds > MAX_WAIT_SECONDS {
            return Err(ConfigError(format!(
                "wait seconds must be at most {}, got {}",
                MAX_WAIT_SECONDS, self.wait_seconds
            )));
        }
        if self.error_backoff.is_zero() {
            return Err(ConfigError("error backoff must be greater than zero".to_owned()));
        }
        Ok(self)
    }
}

/// Raw command line and environment values
#[derive(Debug, Default)]
pub struct Cli {
    maybe_local: Option<String>,
    maybe_region: Option<String>,
    maybe_queue: Option<String>,
    maybe_max_messages: Option<String>,
    maybe_wait_seconds: Option<String>,
    maybe_idle_delay_ms: Option<String>,
    maybe_error_backoff_ms: Option<String>,
    maybe_visibility_timeout: Option<String>,
    maybe_delete_policy: Option<String>,
    maybe_shutdown_grace_ms: Option<String>,
}

impl Cli {
    pub fn new() -> Self {
        let matches = get_matches();
        let value = |name: &str| matches.value_of(name).map(|s| s.to_owned());
        Cli {
            maybe_local: value("local"),
            maybe_region: value("region"),
            maybe_queue: value("queue"),
            maybe_max_messages: value("max-messages"),
            maybe_wait_seconds: value("wait-seconds"),
            maybe_idle_delay_ms: value("idle-delay-ms"),
            maybe_error_backoff_ms: value("error-backoff-ms"),
            maybe_visibility_timeout: value("visibility-timeout"),
            maybe_delete_policy: value("delete-policy"),
            maybe_shutdown_grace_ms: value("shutdown-grace-ms"),
        }
    }

    #[cfg(test)]
    fn new_with(
        maybe_local: Option<String>,
        maybe_region: Option<String>,
        maybe_queue: Option<String>,
    ) -> Self {
        Cli {
            maybe_local,
            maybe_region,
            maybe_queue,
            ..Cli::default()
        }
    }

    pub fn determine_mode(&self) -> Result<Mode, ProcessorError> {
        if let Some(queue) = self.maybe_queue.clone() {
            if let Some(port_string) = self.maybe_local.as_ref() {
                port_string
                    .parse::<Port>()
                    .map_err(|_| ConfigError(format!("Invalid port '{}'", port_string)))
                    .map(|port| Mode::Local(port, queue))
            } else if let Some(region_string) = self.maybe_region.as_ref() {
                Region::from_str(region_string)
                    .map_err(|_| ConfigError(format!("Invalid region '{}'", region_string)))
                    .map(|region| Mode::AWS(region, queue))
            } else {
                Err(ConfigError(
                    "No local or region parameter was specified".to_owned(),
                ))
            }
        } else {
            Err(ConfigError("No queue was specified".to_owned()))
        }
    }

    pub fn build_config(&self) -> Result<Config, ProcessorError> {
        let mut config = Config::new(self.determine_mode()?);
        if let Some(max_messages) = parse_opt::<u32>("max-messages", &self.maybe_max_messages)? {
            config = config.with_max_messages(max_messages);
        }
        if let Some(wait_seconds) = parse_opt::<u32>("wait-seconds", &self.maybe_wait_seconds)? {
            config = config.with_wait_seconds(wait_seconds);
        }
        if let Some(millis) = parse_opt::<u64>("idle-delay-ms", &self.maybe_idle_delay_ms)? {
            let idle_delay = if millis == 0 {
                None
            } else {
                Some(Duration::from_millis(millis))
            };
            config = config.with_idle_delay(idle_delay);
        }
        if let Some(millis) = parse_opt::<u64>("error-backoff-ms", &self.maybe_error_backoff_ms)? {
            config = config.with_error_backoff(Duration::from_millis(millis));
        }
        let visibility_timeout =
            parse_opt::<u32>("visibility-timeout", &self.maybe_visibility_timeout)?;
        config = config.with_visibility_timeout(visibility_timeout);
        if let Some(policy) = self.maybe_delete_policy.as_ref() {
            config = config.with_delete_policy(policy.parse()?);
        }
        if let Some(millis) = parse_opt::<u64>("shutdown-grace-ms", &self.maybe_shutdown_grace_ms)?
        {
            config = config.with_shutdown_grace(Duration::from_millis(millis));
        }
        config.validate()
    }
}

fn parse_opt<T: FromStr>(name: &str, value: &Option<String>) -> Result<Option<T>, ProcessorError> {
    value
        .as_ref()
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| ConfigError(format!("Invalid value '{}' for {}", s, name)))
        })
        .transpose()
}

fn get_matches<'a>() -> ArgMatches<'a> {
    App::new("sqs-queue-worker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Processes messages off of an SQS queue")
        .arg(
            Arg::with_name("local")
                .short("l")
                .long("local")
                .help("Run against a local Elastic MQ server running on port")
                .value_name("PORT")
                .env("SQS_LOCAL_PORT")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("region")
                .short("r")
                .long("region")
                .help("The Amazon region of the sqs server")
                .value_name("REGION")
                .env("AWS_REGION")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("queue")
                .short("q")
                .long("queue")
                .help("The url of the queue")
                .value_name("QUEUE")
                .env("QUEUE_URL")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("max-messages")
                .long("max-messages")
                .help("Maximum number of messages per receive (1-10)")
                .value_name("COUNT")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("wait-seconds")
                .long("wait-seconds")
                .help("Long poll wait per receive in seconds (0-20)")
                .value_name("SECONDS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("idle-delay-ms")
                .long("idle-delay-ms")
                .help("Pause between polls in milliseconds, 0 disables it")
                .value_name("MILLIS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("error-backoff-ms")
                .long("error-backoff-ms")
                .help("Pause after a failed receive in milliseconds")
                .value_name("MILLIS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("visibility-timeout")
                .long("visibility-timeout")
                .help("Visibility timeout for received messages in seconds")
                .value_name("SECONDS")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("delete-policy")
                .long("delete-policy")
                .help("Which messages to delete after processing")
                .possible_values(&["all", "on-success"])
                .value_name("POLICY")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("shutdown-grace-ms")
                .long("shutdown-grace-ms")
                .help("How long a pending delete may finish after shutdown is requested")
                .value_name("MILLIS")
                .takes_value(true),
        )
        .get_matches()
}
