// Engine configuration

use serde::{Deserialize, Serialize};

/// Default layout for `$CurrentTime` when none is passed.
pub const DEFAULT_TIME_LAYOUT: &str = "%Y-%m-%d %I:%M:%S";

/// Tunables for building a registry and running an evaluator.
///
/// Missing fields take their defaults, so `{}` is a valid configuration:
///
/// ```
/// use harmonize::Options;
///
/// let opts = Options::from_json_str(r#"{"max_call_depth": 32}"#).unwrap();
/// assert_eq!(opts.max_call_depth, 32);
/// assert_eq!(opts.default_time_layout, "%Y-%m-%d %I:%M:%S");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Deepest allowed chain of nested projector calls.
    pub max_call_depth: usize,
    /// strftime layout used by `$CurrentTime` for an empty layout argument.
    pub default_time_layout: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            max_call_depth: 128,
            default_time_layout: DEFAULT_TIME_LAYOUT.to_string(),
        }
    }
}

impl Options {
    pub fn from_json_str(s: &str) -> Result<Options, serde_json::Error> {
        serde_json::from_str(s)
    }
}
