use serde::{Deserialize, Serialize};

/// Crates whose events are shown at `info` unless `RUST_LOG` says otherwise.  Names use
/// underscores, the form targets take in events.
const WORKSPACE_TARGETS: &[&str] = &["raftkv_error", "raftkv_load", "raftkv_tracing", "raftkv_types"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(level)
    }
}

/// Raise or lower the level of one target, e.g. `{ target: "h2", level: "debug" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub target: String,
    pub level: LogLevel,
}

/// `EnvFilter` directives: everything at `error`, the workspace at `info`, then the overrides.
/// Later directives for the same target win.
pub fn directives(overrides: &[LogFilter]) -> String {
    let mut directives = vec!["error".to_string(), "opentelemetry_sdk=info".to_string()];
    directives.extend(WORKSPACE_TARGETS.iter().map(|target| format!("{target}=info")));
    directives.extend(
        overrides
            .iter()
            .map(|filter| format!("{}={}", filter.target, filter.level)),
    );
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_render_lowercase() {
        assert_eq!("debug", LogLevel::Debug.to_string());
        assert_eq!("warn", LogLevel::Warn.to_string());
    }

    #[test]
    fn overrides_follow_workspace_defaults() {
        let rendered = directives(&[LogFilter {
            target: "raftkv_load".to_string(),
            level: LogLevel::Trace,
        }]);
        assert!(rendered.starts_with("error,"));
        let default = rendered.find("raftkv_load=info").unwrap();
        let custom = rendered.find("raftkv_load=trace").unwrap();
        assert!(default < custom);
        assert!(!directives(&[]).ends_with(','));
    }
}
