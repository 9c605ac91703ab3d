use std::{
    fmt,
    net::Ipv4Addr,
    path::PathBuf,
    time::Duration,
};

use clap::{
    Parser,
    ValueEnum,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateSwitching {
    /// State switching disabled: deferred calls drain as soon as they are
    /// queued.
    Off,
    /// Poll an external HTTP endpoint for the idle state.
    Api,
}

#[derive(Parser, Clone)]
#[clap(author = "tFaaS")]
pub struct TfaasConfig {
    /// Host interface to bind to
    #[clap(short, long, default_value = "0.0.0.0")]
    pub interface: Ipv4Addr,

    /// Port for function traffic
    #[clap(long, default_value = "8000")]
    pub http_port: u16,

    /// Port for the management API
    #[clap(long, default_value = "8080")]
    pub config_port: u16,

    /// State switching type
    #[clap(long, value_enum, default_value = "off")]
    pub stateswitching: StateSwitching,

    /// Host for api state switching
    #[clap(long, default_value = "http://localhost:8080")]
    pub stateswitching_api_url: String,

    /// Interval for polling the state switching api (s)
    #[clap(long, default_value = "1")]
    pub stateswitching_update_interval: u64,

    /// Interval for re-checking the cached idle state (s)
    #[clap(long, default_value = "1")]
    pub stateswitching_interval: u64,

    /// Backoff period between deferred dispatches (s)
    #[clap(long, default_value = "0.5")]
    pub rproxy_backoff_period: f64,

    /// Resume from a previous run
    #[clap(long)]
    pub resume: bool,

    /// Directory to persist function calls
    #[clap(long, default_value = "/tmp/tfaas-persist")]
    pub persist_dir: PathBuf,

    /// Directory to persist function descriptors
    #[clap(long, default_value = "/tmp/tfaas-persist-func")]
    pub persist_func_dir: PathBuf,

    /// Container backend
    #[clap(long, default_value = "dockerlight")]
    pub tf_backend: String,
}

impl fmt::Debug for TfaasConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("config_port", &self.config_port)
            .field("stateswitching", &self.stateswitching)
            .field("resume", &self.resume)
            .field("tf_backend", &self.tf_backend)
            .finish()
    }
}

impl TfaasConfig {
    pub fn http_bind_address(&self) -> ([u8; 4], u16) {
        (self.interface.octets(), self.http_port)
    }

    pub fn config_bind_address(&self) -> ([u8; 4], u16) {
        (self.interface.octets(), self.config_port)
    }

    /// The address clients use to reach function traffic, as reported by
    /// upload responses.
    pub fn rproxy_addr(&self) -> String {
        format!("{}:{}", self.interface, self.http_port)
    }

    pub fn check_period(&self) -> Duration {
        Duration::from_secs(self.stateswitching_interval)
    }

    pub fn backoff_period(&self) -> Duration {
        Duration::from_secs_f64(self.rproxy_backoff_period)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.stateswitching_update_interval)
    }

    #[cfg(test)]
    pub fn new_for_test() -> anyhow::Result<Self> {
        // Easiest way to get a config object with defaults is to parse from
        // the cmd line
        Ok(Self::try_parse_from(["tfaas-backend"])?)
    }
}
