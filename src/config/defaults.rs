//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

/// Name of the configuration directory that marks a site root.
pub const CONF_DIR: &str = ".webjot";

/// Name of the optional config file inside [`CONF_DIR`].
pub const CONF_FILE: &str = "config.toml";

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use crate::vars::FrontMatter;

    pub fn header_delim() -> String {
        "@@@@@@@".into()
    }

    pub fn front_matter() -> FrontMatter {
        FrontMatter::Yaml
    }

    pub fn ldelim() -> String {
        "{{".into()
    }

    pub fn rdelim() -> String {
        "}}".into()
    }

    pub fn default_layout() -> String {
        "layout.html".into()
    }

    pub fn env_prefix() -> String {
        "JOT_".into()
    }

    pub fn publish_dir() -> String {
        ".pub".into()
    }
}

// ============================================================================
// [serve] Section Defaults
// ============================================================================

pub mod serve {
    pub fn interface() -> String {
        "127.0.0.1".into()
    }

    pub fn port() -> u16 {
        8080
    }
}
