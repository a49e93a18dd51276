// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Logging bootstrap shared by all of the daemon's binaries and tests.

use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::Context;
use slog::Drain;

/// How log records are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly terminal output.
    Human,
    /// Newline-delimited JSON records.
    #[default]
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(LogFormat::Human),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {s}")),
        }
    }
}

fn async_root<D>(name: &'static str, drain: D) -> slog::Logger
where
    D: Drain + Send + 'static,
    D::Err: std::fmt::Debug,
{
    let drain = slog_async::Async::new(drain.fuse()).build().fuse();
    slog::Logger::root(drain, slog::o!("name" => name.to_string()))
}

/// Build the root logger, writing to `log_file` if one is given and stdout
/// otherwise.
pub fn init(
    name: &'static str,
    log_file: &Option<String>,
    log_format: LogFormat,
) -> anyhow::Result<slog::Logger> {
    let log = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {path}"))?;
            match log_format {
                LogFormat::Human => {
                    let decorator = slog_term::PlainDecorator::new(file);
                    let drain =
                        slog_term::FullFormat::new(decorator).build();
                    async_root(name, drain)
                }
                LogFormat::Json => {
                    let drain = slog_bunyan::with_name(name, file).build();
                    async_root(name, drain)
                }
            }
        }
        None => match log_format {
            LogFormat::Human => {
                let decorator = slog_term::TermDecorator::new().build();
                let drain = slog_term::FullFormat::new(decorator).build();
                async_root(name, drain)
            }
            LogFormat::Json => {
                let drain =
                    slog_bunyan::with_name(name, std::io::stdout()).build();
                async_root(name, drain)
            }
        },
    };
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::LogFormat;

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
