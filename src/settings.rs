//! Matcher settings.
//!
//! Settings are collected with a [`Builder`] through the [`Configurable`] interface, by name and
//! textual value, and then frozen into an immutable [`Flags`] value. The same flags can also be
//! read from a TOML document with a `[matcher]` table:
//!
//! ```toml
//! [matcher]
//! max-label-root-depth = 500
//! subsume-loads = false
//! collector = "z"
//! ```

use crate::gc::CollectorKind;
use core::fmt;
use core::str::FromStr;
use log::trace;
use thiserror::Error;

/// An error produced when changing a setting.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SetError {
    /// No setting by this name exists.
    #[error("No existing setting named '{0}'")]
    BadName(String),

    /// Type mismatch for setting (e.g., setting an enum setting as a bool).
    #[error("Trying to set a setting with the wrong type")]
    BadType,

    /// This is not a valid value for this setting.
    #[error("Unexpected value for a setting, expected {0}")]
    BadValue(String),
}

/// A result returned when changing a setting.
pub type SetResult<T> = Result<T, SetError>;

/// An error produced when reading settings from a TOML document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid TOML or does not describe the flags.
    #[error("failed to parse matcher settings")]
    Parse(#[from] toml::de::Error),
}

/// A string-based configurator for settings groups.
pub trait Configurable {
    /// Set the string value of any setting by name.
    ///
    /// This can set any type of setting whether it is numeric, boolean, or enumerated.
    fn set(&mut self, name: &str, value: &str) -> SetResult<()>;

    /// Enable a boolean setting.
    fn enable(&mut self, name: &str) -> SetResult<()>;
}

/// The lowest accepted recursion limit for labeling a match tree.
pub const MIN_LABEL_ROOT_DEPTH: u32 = 100;

/// Immutable settings consulted while matching.
#[derive(serde_derive::Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Flags {
    #[serde(
        default = "default_max_label_root_depth",
        rename = "max-label-root-depth"
    )]
    max_label_root_depth: u32,
    #[serde(default = "default_node_limit", rename = "node-limit")]
    node_limit: u32,
    #[serde(default = "default_node_limit_fudge", rename = "node-limit-fudge")]
    node_limit_fudge: u32,
    #[serde(default = "default_subsume_loads", rename = "subsume-loads")]
    subsume_loads: bool,
    #[serde(default, rename = "use-fpu-for-spilling")]
    use_fpu_for_spilling: bool,
    #[serde(default = "default_verify_graph", rename = "verify-graph")]
    verify_graph: bool,
    #[serde(default)]
    collector: CollectorKind,
}

// wrapped, so we have a named section in the document
#[derive(serde_derive::Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct Config {
    matcher: Flags,
}

fn default_max_label_root_depth() -> u32 {
    1100
}

fn default_node_limit() -> u32 {
    80_000
}

fn default_node_limit_fudge() -> u32 {
    2_000
}

fn default_subsume_loads() -> bool {
    true
}

fn default_verify_graph() -> bool {
    cfg!(debug_assertions)
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            max_label_root_depth: default_max_label_root_depth(),
            node_limit: default_node_limit(),
            node_limit_fudge: default_node_limit_fudge(),
            subsume_loads: default_subsume_loads(),
            use_fpu_for_spilling: false,
            verify_graph: default_verify_graph(),
            collector: CollectorKind::default(),
        }
    }
}

impl Flags {
    /// Create flags from a finished builder.
    pub fn new(builder: Builder) -> Self {
        builder.flags
    }

    /// Read flags from the `[matcher]` table of a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        trace!("Loaded matcher settings: {:?}", config.matcher);
        Ok(config.matcher)
    }

    /// Maximum recursion depth while labeling one match tree.
    ///
    /// Values below [`MIN_LABEL_ROOT_DEPTH`] are raised to it when matching starts.
    pub fn max_label_root_depth(&self) -> u32 {
        self.max_label_root_depth
    }

    /// Maximum number of machine-space nodes built while matching before the unit is
    /// abandoned. Nodes of the input graph do not count against it.
    pub fn node_limit(&self) -> u32 {
        self.node_limit
    }

    /// Headroom kept below `node_limit` while building instructions.
    pub fn node_limit_fudge(&self) -> u32 {
        self.node_limit_fudge
    }

    /// Whether loads may be folded into the instructions that use them.
    pub fn subsume_loads(&self) -> bool {
        self.subsume_loads
    }

    /// Whether integer values may spill to float registers and vice versa.
    pub fn use_fpu_for_spilling(&self) -> bool {
        self.use_fpu_for_spilling
    }

    /// Whether to run the def-use verifier on the input and output graphs.
    pub fn verify_graph(&self) -> bool {
        self.verify_graph
    }

    /// The collector whose matcher hooks are installed.
    pub fn collector(&self) -> CollectorKind {
        self.collector
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "[matcher]")?;
        writeln!(f, "max-label-root-depth = {}", self.max_label_root_depth)?;
        writeln!(f, "node-limit = {}", self.node_limit)?;
        writeln!(f, "node-limit-fudge = {}", self.node_limit_fudge)?;
        writeln!(f, "subsume-loads = {}", self.subsume_loads)?;
        writeln!(f, "use-fpu-for-spilling = {}", self.use_fpu_for_spilling)?;
        writeln!(f, "verify-graph = {}", self.verify_graph)?;
        writeln!(f, "collector = \"{}\"", self.collector)
    }
}

/// Collect settings before freezing them into [`Flags`].
#[derive(Clone, Debug, Default)]
pub struct Builder {
    flags: Flags,
}

/// Create a new builder with all settings at their defaults.
pub fn builder() -> Builder {
    Builder::default()
}

fn parse_bool(value: &str) -> SetResult<bool> {
    match value {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(SetError::BadValue("bool".to_string())),
    }
}

fn parse_num(value: &str) -> SetResult<u32> {
    value
        .parse()
        .map_err(|_| SetError::BadValue("number".to_string()))
}

impl Configurable for Builder {
    fn set(&mut self, name: &str, value: &str) -> SetResult<()> {
        let flags = &mut self.flags;
        match name {
            "max_label_root_depth" => flags.max_label_root_depth = parse_num(value)?,
            "node_limit" => flags.node_limit = parse_num(value)?,
            "node_limit_fudge" => flags.node_limit_fudge = parse_num(value)?,
            "subsume_loads" => flags.subsume_loads = parse_bool(value)?,
            "use_fpu_for_spilling" => flags.use_fpu_for_spilling = parse_bool(value)?,
            "verify_graph" => flags.verify_graph = parse_bool(value)?,
            "collector" => flags.collector = CollectorKind::from_str(value)?,
            _ => return Err(SetError::BadName(name.to_string())),
        }
        Ok(())
    }

    fn enable(&mut self, name: &str) -> SetResult<()> {
        match name {
            "subsume_loads" | "use_fpu_for_spilling" | "verify_graph" => self.set(name, "true"),
            "max_label_root_depth" | "node_limit" | "node_limit_fudge" | "collector" => {
                Err(SetError::BadType)
            }
            _ => Err(SetError::BadName(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_default() {
        let f = Flags::default();
        let text = f.to_string();
        assert!(text.starts_with("[matcher]\n"));
        assert!(text.contains("max-label-root-depth = 1100\n"));
        assert!(text.contains("collector = \"serial\"\n"));
    }

    #[test]
    fn builder_sets_by_name() {
        let mut b = builder();
        b.set("max_label_root_depth", "250").unwrap();
        b.enable("use_fpu_for_spilling").unwrap();
        b.set("subsume_loads", "false").unwrap();
        b.set("collector", "shenandoah").unwrap();
        let f = Flags::new(b);
        assert_eq!(f.max_label_root_depth(), 250);
        assert!(f.use_fpu_for_spilling());
        assert!(!f.subsume_loads());
        assert_eq!(f.collector(), CollectorKind::Shenandoah);
    }

    #[test]
    fn builder_errors() {
        let mut b = builder();
        assert_eq!(
            b.set("not_a_flag", "1"),
            Err(SetError::BadName("not_a_flag".to_string()))
        );
        assert_eq!(b.enable("node_limit"), Err(SetError::BadType));
        assert_eq!(
            b.set("node_limit", "lots"),
            Err(SetError::BadValue("number".to_string()))
        );
        assert!(matches!(
            b.set("collector", "refcount"),
            Err(SetError::BadValue(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let f = Flags::from_toml(
            "[matcher]\nmax-label-root-depth = 500\nsubsume-loads = false\ncollector = \"z\"\n",
        )
        .unwrap();
        assert_eq!(f.max_label_root_depth(), 500);
        assert!(!f.subsume_loads());
        assert_eq!(f.collector(), CollectorKind::Z);
        assert_eq!(f.node_limit(), 80_000);

        let again = Flags::from_toml(&f.to_string()).unwrap();
        assert_eq!(f, again);
    }

    #[test]
    fn toml_rejects_unknown_keys() {
        assert!(Flags::from_toml("[matcher]\nfast = true\n").is_err());
        assert!(Flags::from_toml("[other]\n").is_err());
    }
}
