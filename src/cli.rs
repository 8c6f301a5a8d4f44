use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "snapsolve", version, about = "Screenshot a coding problem and stream an answer")]
pub struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Start with the overlay off; triggers are ignored until `overlay on`.
    #[arg(long)]
    pub inactive: bool,
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Capture,
    Append,
    Stop,
    Ask(String),
    Overlay(bool),
    Status,
    Help,
    Quit,
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word {
            "capture" | "c" | "takeScreenshot" => Ok(Self::Capture),
            "append" | "a" | "appendScreenshot" => Ok(Self::Append),
            "stop" | "s" | "stopSolutionStream" => Ok(Self::Stop),
            "ask" | "?" => {
                if rest.is_empty() {
                    Err("usage: ask <question>".to_string())
                } else {
                    Ok(Self::Ask(rest.to_string()))
                }
            }
            "overlay" => match rest {
                "on" => Ok(Self::Overlay(true)),
                "off" => Ok(Self::Overlay(false)),
                _ => Err("usage: overlay on|off".to_string()),
            },
            "status" => Ok(Self::Status),
            "help" | "h" => Ok(Self::Help),
            "quit" | "q" | "exit" => Ok(Self::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command: {} (try `help`)", other)),
        }
    }
}

pub const HELP: &str = "\
commands:
  capture | c          screenshot and solve from scratch
  append  | a          add a screenshot to the current problem
  stop    | s          stop the answer being streamed
  ask <question>       follow-up question (alias: ? <question>)
  overlay on|off       enable or ignore triggers
  status               show conversation state
  quit    | q          exit";
