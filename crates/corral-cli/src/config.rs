//! Configuration loading helpers for the runner.
//!
//! Leading configuration flags are handed to `ortho_config`; everything from
//! the first other token onwards belongs to the runner's own parser.

use std::ffi::{OsStr, OsString};

use corral_config::{CONFIG_CLI_FLAGS, Config};
use ortho_config::OrthoConfig;

use crate::AppError;

pub(crate) trait ConfigLoader {
    /// Loads configuration for the runner.
    ///
    /// Configuration flags must appear before the runner's own arguments.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    let Some((flag, inline)) = text
        .strip_prefix("--")
        .map(|rest| rest.split_once('=').map_or((rest, false), |(flag, _)| (flag, true)))
    else {
        return FlagAction::Stop;
    };
    if CONFIG_CLI_FLAGS
        .iter()
        .any(|known| known.strip_prefix("--") == Some(flag))
    {
        FlagAction::Include {
            needs_value: !inline,
        }
    } else {
        FlagAction::Stop
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) runner_arguments: Vec<OsString>,
}

/// Splits `args` (program name first) into configuration and runner
/// arguments. Both halves keep the program name.
pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ConfigArgumentSplit {
            config_arguments: Vec::new(),
            runner_arguments: Vec::new(),
        };
    };
    let mut config_arguments = vec![program.clone()];
    let mut remaining = rest.iter().peekable();
    while let Some(argument) = remaining.peek() {
        let FlagAction::Include { needs_value } = classify(argument) else {
            break;
        };
        config_arguments.extend(remaining.next().cloned());
        if needs_value {
            config_arguments.extend(remaining.next().cloned());
        }
    }
    let mut runner_arguments = vec![program.clone()];
    runner_arguments.extend(remaining.cloned());
    ConfigArgumentSplit {
        config_arguments,
        runner_arguments,
    }
}
