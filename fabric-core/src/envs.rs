use std::env;
use std::str::FromStr;

use anyhow::Context as _;

/// Env var overriding [`crate::config::ClientConfig::security_enabled`]
pub const FABRIC_SECURITY_ENABLED_ENV: &str = "FABRIC_SECURITY_ENABLED";

/// Env var overriding [`crate::config::ClientConfig::tcert_batch_size`]
pub const FABRIC_TCERT_BATCH_SIZE_ENV: &str = "FABRIC_TCERT_BATCH_SIZE";

/// Env var overriding the per-orderer block delivery timeout, in
/// milliseconds
pub const FABRIC_DELIVER_TIMEOUT_MS_ENV: &str = "FABRIC_DELIVER_TIMEOUT_MS";

/// Env var that turns off abbreviation of long byte values in logs
pub const FABRIC_LOG_FULL_ENV: &str = "FABRIC_LOG_FULL";

/// Check if env variable is set and not equal `0` or `false` which are common
/// ways to disable something.
pub fn is_env_var_set(var: &str) -> bool {
    env::var_os(var).is_some_and(|v| v != "0" && v != "false")
}

/// Parse env variable `var` if it is set
pub fn parse_env_var<T>(var: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(var) {
        Ok(value) => Ok(Some(
            value
                .parse()
                .with_context(|| format!("failure parsing env var {var}"))?,
        )),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failure looking up env var {var}")),
    }
}
