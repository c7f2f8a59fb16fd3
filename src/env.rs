/// Interpret a string value such as "1" or "no" as a boolean.
///
/// Returns `None` and logs a warning if the value is not recognized.
pub fn str_as_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            log::warn!("Unrecognized boolean value \"{}\"", s);
            None
        }
    }
}

/// Return whether a flag controlled by an environment variable is enabled.
///
/// Returns `default` if the variable is unset or has an unrecognized value.
pub fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|s| str_as_bool(&s))
        .unwrap_or(default)
}
