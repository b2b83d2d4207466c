use crate::weak_error;
use anyhow::Context;
use serde::Deserialize;
use std::fs::read_to_string;
use std::io;
use std::path::Path;

/// Session settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum number of frames kept per thread, innermost first.
    pub call_stack_limit: usize,
    /// Pause target on a breakpoint hit at an address without breakpoints.
    pub pause_on_unknown_hit: bool,
    /// Log filter, used by the `rtm` binary only.
    pub log_level: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_stack_limit: 256,
            pause_on_unknown_hit: true,
            log_level: None,
        }
    }
}

impl SessionConfig {
    const DEFAULT_PATH: &'static str = ".config/rtm/session.toml";

    /// Load config from file.
    ///
    /// Without explicit path config is read from `~/.config/rtm/session.toml`, a missing
    /// file means defaults. Malformed content is logged and replaced by defaults.
    /// Only an explicit path that can't be read is an error.
    pub fn from_file(path: Option<&Path>) -> anyhow::Result<Self> {
        let data = match path {
            None => {
                let Some(home) = home::home_dir() else {
                    return Ok(Self::default());
                };
                match read_to_string(home.join(Self::DEFAULT_PATH)) {
                    Ok(data) => data,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
                    Err(e) => {
                        log::warn!(target: "debugger", "config file unavailable: {e}");
                        return Ok(Self::default());
                    }
                }
            }
            Some(path) => read_to_string(path)
                .with_context(|| format!("read config file {}", path.display()))?,
        };

        Ok(Self::parse(&data).unwrap_or_default())
    }

    /// Parse TOML config, log and return `None` if it is malformed.
    pub fn parse(data: &str) -> Option<Self> {
        weak_error!(toml::from_str(data), "malformed session config:")
    }
}
