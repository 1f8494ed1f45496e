//! Line commands for the interactive session.

use querydeck_core::controller::Edit;
use querydeck_core::types::Speed;

pub const HELP: &str = "\
Type a search term and pause to search. Commands:
  :threshold X    relevance threshold in [0, 1]
  :limit N        maximum number of results
  :fast on|off    optimized mode
  :speed 0|1|2    processing speed
  :dataset NAME   dataset to search
  :clear          clear the search term
  :help           show this help
  :quit           leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Edit(Edit),
    Help,
    Quit,
}

/// Parse one stdin line. Anything not starting with `:` is a new search term.
pub fn parse_line(line: &str) -> Result<Input, String> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Input::Edit(Edit::SearchTerm(line.to_string())));
    };

    let (name, arg) = match command.trim().split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command.trim(), ""),
    };

    let edit = match name {
        "q" | "quit" => return Ok(Input::Quit),
        "h" | "help" => return Ok(Input::Help),
        "clear" => Edit::SearchTerm(String::new()),
        "threshold" => Edit::Threshold(
            arg.parse().map_err(|_| format!("threshold must be a number (got '{arg}')"))?,
        ),
        "limit" => Edit::Limit(
            arg.parse().map_err(|_| format!("limit must be a positive integer (got '{arg}')"))?,
        ),
        "fast" => Edit::Fast(match arg {
            "on" | "true" | "yes" | "1" => true,
            "off" | "false" | "no" | "0" => false,
            other => return Err(format!("fast must be on or off (got '{other}')")),
        }),
        "speed" => Edit::Speed(arg.parse::<Speed>()?),
        "dataset" if !arg.is_empty() => Edit::Dataset(arg.to_string()),
        "dataset" => return Err("dataset needs a name".to_string()),
        other => return Err(format!("unknown command ':{other}' (try :help)")),
    };
    Ok(Input::Edit(edit))
}
