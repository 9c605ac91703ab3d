//! Tunable limits and parameters.
//!
//! Every knob here can be overridden with an environment variable of the same
//! name.

use std::{
    env,
    fmt::Debug,
    str::FromStr,
    sync::LazyLock,
};

/// Reads an override for `name` from the environment, falling back to the
/// default when the variable is unset or does not parse.
fn env_config<T: Debug + FromStr>(name: &str, default: T) -> T
where
    T::Err: Debug,
{
    let Ok(raw) = env::var(name) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => {
            tracing::info!("Overriding {name} to {value:?} from environment");
            value
        },
        Err(e) => {
            tracing::warn!("Invalid value {raw} for {name}, using {default:?}: {e:?}");
            default
        },
    }
}

/// Maximum number of deferred calls the executor keeps in flight across all
/// functions before it stops parking on the wake signal and throttles itself
/// with the backoff sleep alone.
pub static RPROXY_MAX_INFLIGHT: LazyLock<i32> =
    LazyLock::new(|| env_config("RPROXY_MAX_INFLIGHT", 50));

/// TCP accept backlog for the HTTP listening sockets.
pub static HTTP_SERVER_TCP_BACKLOG: LazyLock<u32> =
    LazyLock::new(|| env_config("HTTP_SERVER_TCP_BACKLOG", 1024));

/// Maximum concurrent requests on each HTTP service.
pub static MAX_CONCURRENT_REQUESTS: LazyLock<usize> =
    LazyLock::new(|| env_config("MAX_CONCURRENT_REQUESTS", 1024));

#[cfg(test)]
mod tests {
    use super::env_config;

    #[test]
    fn test_env_config_prefers_the_environment() {
        // SAFETY: tests in this module are the only place this variable is
        // touched.
        unsafe { std::env::set_var("TFAAS_TEST_KNOB", "7") };
        assert_eq!(env_config("TFAAS_TEST_KNOB", 3), 7);
        unsafe { std::env::set_var("TFAAS_TEST_KNOB", "not a number") };
        assert_eq!(env_config("TFAAS_TEST_KNOB", 3), 3);
        unsafe { std::env::remove_var("TFAAS_TEST_KNOB") };
        assert_eq!(env_config("TFAAS_TEST_KNOB", 3), 3);
    }
}
