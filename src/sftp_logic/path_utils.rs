//! Path helpers shared by both backends
//!
//! Tree paths are composed with `/` on both sides; remote paths are POSIX
//! regardless of the local OS.

/// Join a base path and one component with `/`
pub fn join_path(base: &str, component: &str) -> String {
    if base.is_empty() {
        component.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Parent directory of `path` (`/` for top-level entries, `.` for bare names)
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None if trimmed.is_empty() && path.starts_with('/') => "/".to_string(),
        None => ".".to_string(),
    }
}

/// Last component of `path`
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Quote a path for a POSIX shell, keeping a leading `~` expandable
pub fn shell_quote_path(path: &str) -> String {
    if path == "~" {
        return "~".to_string();
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return format!("~/{}", shell_quote(rest));
    }
    shell_quote(path)
}

/// Path as the SFTP server expects it: `~` becomes the session's home-relative form
pub fn sftp_path(path: &str) -> &str {
    if path == "~" {
        "."
    } else if let Some(rest) = path.strip_prefix("~/") {
        rest
    } else {
        path
    }
}

pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
