//! `[build]` section configuration.
//!
//! Contains rendering settings: header parsing, template delimiters, layout
//! and output locations.

use super::defaults;
use crate::{template::Delims, vars::FrontMatter};
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[build]` section in config.toml.
///
/// # Example
/// ```toml
/// [build]
/// header_delim = "---"
/// front_matter = "lines"
/// ldelim = "<<"
/// rdelim = ">>"
/// default_layout = "base.html"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Line separating front matter from the body. Empty: no front matter.
    #[serde(default = "defaults::build::header_delim")]
    #[educe(Default = defaults::build::header_delim())]
    pub header_delim: String,

    /// How front matter is parsed: `yaml` or `lines`.
    #[serde(default = "defaults::build::front_matter")]
    #[educe(Default = defaults::build::front_matter())]
    pub front_matter: FrontMatter,

    /// Default left variable delimiter.
    #[serde(default = "defaults::build::ldelim")]
    #[educe(Default = defaults::build::ldelim())]
    pub ldelim: String,

    /// Default right variable delimiter.
    #[serde(default = "defaults::build::rdelim")]
    #[educe(Default = defaults::build::rdelim())]
    pub rdelim: String,

    /// Layout used when a document names none, relative to the config dir.
    #[serde(default = "defaults::build::default_layout")]
    #[educe(Default = defaults::build::default_layout())]
    pub default_layout: String,

    /// Prefix of environment variables imported as globals and exported
    /// to commands.
    #[serde(default = "defaults::build::env_prefix")]
    #[educe(Default = defaults::build::env_prefix())]
    pub env_prefix: String,

    /// Output directory name, relative to the site root.
    #[serde(default = "defaults::build::publish_dir")]
    #[educe(Default = defaults::build::publish_dir())]
    pub publish_dir: String,

    /// Skip copying assets whose destination has the same size and mtime.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub copy_on_dirty: bool,
}

impl BuildConfig {
    /// System default template delimiters.
    pub fn delims(&self) -> Delims {
        Delims::new(&self.ldelim, &self.rdelim)
    }
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use crate::vars::FrontMatter;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();
        let build = &config.build;

        assert_eq!(build.header_delim, "@@@@@@@");
        assert_eq!(build.front_matter, FrontMatter::Yaml);
        assert_eq!(build.delims().left, "{{");
        assert_eq!(build.delims().right, "}}");
        assert_eq!(build.default_layout, "layout.html");
        assert_eq!(build.env_prefix, "JOT_");
        assert_eq!(build.publish_dir, ".pub");
        assert!(build.copy_on_dirty);
    }

    #[test]
    fn test_build_config_override() {
        let config = r#"
            [build]
            header_delim = "---"
            front_matter = "lines"
            ldelim = "<<"
            rdelim = ">>"
            copy_on_dirty = false
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.build.header_delim, "---");
        assert_eq!(config.build.front_matter, FrontMatter::Lines);
        assert_eq!(config.build.delims().left, "<<");
        assert!(!config.build.copy_on_dirty);
        // untouched fields keep defaults
        assert_eq!(config.build.default_layout, "layout.html");
    }

    #[test]
    fn test_build_config_bad_front_matter() {
        let config = r#"
            [build]
            front_matter = "toml"
        "#;
        assert!(toml::from_str::<SiteConfig>(config).is_err());
    }
}
