use std::ffi::OsStr;

/// Environment variables whose name contains this marker switch discovery on.
pub const DISCOVERY_ENV_MARKER: &str = "CONSUL_";

/// Decide once, at boot, whether the process should talk to the registry.
///
/// Only the variable names matter, values are ignored.
pub fn enabled_from_env() -> bool {
    enabled_from_vars(std::env::vars_os())
}

pub fn enabled_from_vars<I, K, V>(vars: I) -> bool
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
{
    vars.into_iter()
        .any(|(name, _)| name.as_ref().to_string_lossy().contains(DISCOVERY_ENV_MARKER))
}
