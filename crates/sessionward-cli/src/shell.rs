//! Command parsing for the interactive shell.

use anyhow::{bail, Context, Result};
use serde_json::Value;

pub const HELP: &str = "\
Commands:
  get <path>            GET a JSON resource
  post <path> <json>    POST a JSON body
  delete <path>         DELETE a resource
  status                Show session state and time left
  renew                 Renew the access credential now
  login                 Sign in
  logout                Sign out
  help                  Show this help
  quit                  Exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Get(String),
    Post { path: String, body: Value },
    Delete(String),
    Status,
    Renew,
    Login,
    Logout,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "" => Command::Empty,
            "get" => Command::Get(required_path(rest)?),
            "delete" | "del" => Command::Delete(required_path(rest)?),
            "post" => {
                let (path, body) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let path = required_path(path)?;
                let body = if body.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(body.trim()).context("Body is not valid JSON")?
                };
                Command::Post { path, body }
            }
            "status" => Command::Status,
            "renew" => Command::Renew,
            "login" => Command::Login,
            "logout" => Command::Logout,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("Unknown command '{}'. Type 'help' for a list.", other),
        };
        Ok(command)
    }
}

fn required_path(raw: &str) -> Result<String> {
    let path = raw.split_whitespace().next().unwrap_or_default();
    if path.is_empty() {
        bail!("Missing path");
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{}", path))
    }
}
