// console.rs

use std::{
    io::{BufRead, Write},
    str::FromStr,
};

use anyhow::bail;
use log::*;

use crate::*;

const PROMPT: &str = "tempnode> ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Pause,
    NoSleep,
    Restart,
    Temperature,
    ConfigShow,
    Version,
}

impl FromStr for ConsoleCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        Ok(match words.as_slice() {
            ["help"] => ConsoleCommand::Help,
            ["pause"] => ConsoleCommand::Pause,
            ["nosleep"] => ConsoleCommand::NoSleep,
            ["restart"] => ConsoleCommand::Restart,
            ["temperature"] | ["temperature", "read"] => ConsoleCommand::Temperature,
            ["config"] | ["config", "show"] => ConsoleCommand::ConfigShow,
            ["version"] => ConsoleCommand::Version,
            [] => bail!("empty command"),
            _ => bail!("Unknown command: {line}"),
        })
    }
}

fn help_text() -> String {
    [
        "help                 show this help",
        "pause                stop sampling and sleeping until restart",
        "nosleep              stay powered between cycles until restart",
        "restart              reboot the node",
        "temperature [read]   print the last sampled temperature",
        "config [show]        print the running configuration",
        "version              print firmware version",
    ]
    .join("\n")
}

/// Carries out one command against the running boot and returns the text to print.
pub fn execute(state: &NodeState, cmd: ConsoleCommand) -> anyhow::Result<String> {
    info!("Console: {cmd:?}");
    Ok(match cmd {
        ConsoleCommand::Help => help_text(),
        ConsoleCommand::Pause => {
            state.pause();
            "Temperature processing and sleeping paused.\n\
             Perform any needed configuration, then issue a `restart` command."
                .into()
        }
        ConsoleCommand::NoSleep => {
            state.disable_deep_sleep();
            "Deep sleep disabled.\n\
             Perform any needed configuration, then issue a `restart` \n\
             command to re-enable deep sleep."
                .into()
        }
        ConsoleCommand::Restart => {
            state.request_restart();
            "Restarting".into()
        }
        ConsoleCommand::Temperature => match state.last_sample() {
            Some(t) => format!("Temperature is {t:.1}°{}", state.config.unit_suffix()),
            None => "No temperature sampled yet.".into(),
        },
        ConsoleCommand::ConfigShow => {
            let mut shown = state.config.clone();
            if !shown.wifi_pass.is_empty() {
                shown.wifi_pass = "********".into();
            }
            serde_json::to_string_pretty(&shown)?
        }
        ConsoleCommand::Version => format!("Software version {FW_VERSION}"),
    })
}

/// Line loop for a serial console. Returns when input ends.
pub fn run_console(state: &NodeState, input: impl BufRead, mut output: impl Write) -> anyhow::Result<()> {
    write!(output, "{PROMPT}")?;
    output.flush()?;
    for line in input.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            let reply = line
                .parse::<ConsoleCommand>()
                .and_then(|cmd| execute(state, cmd));
            match reply {
                Ok(text) => writeln!(output, "{text}")?,
                Err(e) => writeln!(output, "Error: {e}")?,
            }
        }
        write!(output, "{PROMPT}")?;
        output.flush()?;
    }
    Ok(())
}


// EOF
