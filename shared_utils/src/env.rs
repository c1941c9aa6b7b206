use thiserror::Error;

/// An environment variable required by the application is not set.
#[derive(Debug, Error)]
#[error("Missing environment variable: {0}")]
pub struct MissingEnvVarError(pub String);

/// Reads an environment variable, returning a structured error if it's missing.
///
/// This is a thin wrapper around `std::env::var` that provides a more
/// ergonomic and specific error type for missing variables. Empty values are
/// treated as missing, since a blank credential is never usable.
///
/// # Arguments
/// * `name` - The name of the environment variable to read.
pub fn get_env_var(name: &str) -> Result<String, MissingEnvVarError> {
    get_env_var_opt(name).ok_or_else(|| MissingEnvVarError(name.to_string()))
}

/// Reads an optional override from the environment.
///
/// Returns `None` when the variable is unset, not valid unicode, or blank.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_names_the_variable() {
        let name = "SHARED_UTILS_TEST_SURELY_UNSET_VAR";
        let err = get_env_var(name).unwrap_err();
        assert_eq!(err.to_string(), format!("Missing environment variable: {name}"));
        assert!(get_env_var_opt(name).is_none());
    }

    #[test]
    fn present_variable_is_returned() {
        // PATH is set in every sane test environment.
        assert!(get_env_var("PATH").is_ok());
    }
}
