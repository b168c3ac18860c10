//! Console commands, parsing and autocomplete logic

use crate::list::{validate_page_size, FetchError, Filter, Sort};

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub usage: &'static str,
  pub description: &'static str,
}

/// All available commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "next",
    aliases: &["n"],
    usage: "next",
    description: "Next page",
  },
  Command {
    name: "prev",
    aliases: &["p", "previous"],
    usage: "prev",
    description: "Previous page",
  },
  Command {
    name: "page",
    aliases: &["g", "goto"],
    usage: "page N",
    description: "Jump to page N",
  },
  Command {
    name: "more",
    aliases: &["m"],
    usage: "more",
    description: "Load the next page (feed mode)",
  },
  Command {
    name: "size",
    aliases: &["pagesize"],
    usage: "size N",
    description: "Change the page size",
  },
  Command {
    name: "filter",
    aliases: &["f", "where"],
    usage: "filter [field=value | field=min..max]...",
    description: "Replace the filter (no arguments clears it)",
  },
  Command {
    name: "sort",
    aliases: &["o", "order"],
    usage: "sort field[:asc|:desc]",
    description: "Change the sort order",
  },
  Command {
    name: "refresh",
    aliases: &["r", "reload"],
    usage: "refresh",
    description: "Refetch, ignoring cached pages",
  },
  Command {
    name: "retry",
    aliases: &[],
    usage: "retry",
    description: "Retry the failed load",
  },
  Command {
    name: "add",
    aliases: &["a", "new"],
    usage: "add TITLE",
    description: "Create a task",
  },
  Command {
    name: "done",
    aliases: &["d", "complete"],
    usage: "done ID",
    description: "Mark a task done",
  },
  Command {
    name: "delete",
    aliases: &["rm", "del"],
    usage: "delete ID",
    description: "Delete a task",
  },
  Command {
    name: "status",
    aliases: &["s", "info"],
    usage: "status",
    description: "Show paging and cache state",
  },
  Command {
    name: "help",
    aliases: &["h", "?"],
    usage: "help",
    description: "List commands",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    usage: "quit",
    description: "Exit taskpager",
  },
];

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
  Next,
  Prev,
  Page(u32),
  More,
  Size(u32),
  Filter(Filter),
  Sort(Sort),
  Refresh,
  Retry,
  Add(String),
  Done(String),
  Delete(String),
  Status,
  Help,
  Quit,
}

/// Why a line could not be turned into an action
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
  /// Blank line
  Empty,
  /// No such command; carries the closest suggestions
  Unknown {
    input: String,
    suggestions: Vec<&'static str>,
  },
  /// Known command, bad arguments
  Usage(&'static Command),
  /// Arguments parsed but failed validation
  Invalid(FetchError),
}

/// Parse one console line.
pub fn parse(line: &str) -> Result<Action, ParseError> {
  let mut words = line.split_whitespace();
  let first = words.next().ok_or(ParseError::Empty)?;
  let args: Vec<&str> = words.collect();

  let cmd = resolve(first).ok_or_else(|| ParseError::Unknown {
    input: first.to_string(),
    suggestions: get_suggestions(first)
      .into_iter()
      .take(3)
      .map(|c| c.name)
      .collect(),
  })?;

  let usage = || ParseError::Usage(cmd);
  let single = || match args.as_slice() {
    [arg] => Ok(*arg),
    _ => Err(usage()),
  };
  let number = || single()?.parse::<u32>().map_err(|_| usage());

  match cmd.name {
    "next" => Ok(Action::Next),
    "prev" => Ok(Action::Prev),
    "page" => Ok(Action::Page(number()?)),
    "more" => Ok(Action::More),
    "size" => {
      let size = validate_page_size(number()?).map_err(ParseError::Invalid)?;
      Ok(Action::Size(size))
    }
    "filter" => Filter::parse(&args)
      .map(Action::Filter)
      .map_err(ParseError::Invalid),
    "sort" => single()?
      .parse::<Sort>()
      .map(Action::Sort)
      .map_err(ParseError::Invalid),
    "refresh" => Ok(Action::Refresh),
    "retry" => Ok(Action::Retry),
    "add" if args.is_empty() => Err(usage()),
    "add" => Ok(Action::Add(args.join(" "))),
    "done" => Ok(Action::Done(single()?.to_string())),
    "delete" => Ok(Action::Delete(single()?.to_string())),
    "status" => Ok(Action::Status),
    "help" => Ok(Action::Help),
    "quit" => Ok(Action::Quit),
    // Every table entry is matched above
    other => Err(ParseError::Unknown {
      input: other.to_string(),
      suggestions: Vec::new(),
    }),
  }
}

/// Find the command named exactly by `word` or one of its aliases.
fn resolve(word: &str) -> Option<&'static Command> {
  let word = word.to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == word || cmd.aliases.contains(&word.as_str()))
}

/// Get autocomplete suggestions for a given input
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = Vec::new();

  for cmd in COMMANDS {
    // Exact match on name
    if cmd.name == input_lower {
      matches.push((cmd, 0)); // Highest priority
      continue;
    }

    // Exact match on alias
    if cmd.aliases.contains(&input_lower.as_str()) {
      matches.push((cmd, 1));
      continue;
    }

    // Prefix match on name
    if cmd.name.starts_with(&input_lower) {
      matches.push((cmd, 2));
      continue;
    }

    // Prefix match on alias
    if cmd.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((cmd, 3));
      continue;
    }

    // Fuzzy match (contains)
    if cmd.name.contains(&input_lower) {
      matches.push((cmd, 4));
      continue;
    }

    // Fuzzy match on alias
    if cmd.aliases.iter().any(|a| a.contains(&input_lower)) {
      matches.push((cmd, 5));
    }
  }

  // Sort by priority
  matches.sort_by_key(|(_, priority)| *priority);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    let suggestions = get_suggestions("");
    assert_eq!(suggestions.len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_match() {
    let suggestions = get_suggestions("refresh");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "refresh");
  }

  #[test]
  fn test_alias_match() {
    let suggestions = get_suggestions("n");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "next");
  }

  #[test]
  fn test_prefix_match() {
    let suggestions = get_suggestions("fil");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "filter");
  }

  #[test]
  fn test_fuzzy_match() {
    let suggestions = get_suggestions("fres");
    assert!(!suggestions.is_empty());
    assert_eq!(suggestions[0].name, "refresh");
  }

  #[test]
  fn test_parse_navigation() {
    assert_eq!(parse("next"), Ok(Action::Next));
    assert_eq!(parse("  P "), Ok(Action::Prev));
    assert_eq!(parse("page 4"), Ok(Action::Page(4)));
    assert_eq!(parse("g 2"), Ok(Action::Page(2)));
    assert!(matches!(parse("page"), Err(ParseError::Usage(c)) if c.name == "page"));
    assert!(matches!(parse("page two"), Err(ParseError::Usage(_))));
  }

  #[test]
  fn test_parse_filter_and_sort() {
    assert_eq!(
      parse("filter status=done points=1..3"),
      Ok(Action::Filter(
        Filter::parse(&["points=1..3", "status=done"]).unwrap()
      ))
    );
    assert_eq!(parse("filter"), Ok(Action::Filter(Filter::default())));
    assert!(matches!(
      parse("filter points=lots"),
      Err(ParseError::Invalid(FetchError::Validation(_)))
    ));
    assert_eq!(parse("sort -due"), Ok(Action::Sort("due:desc".parse().unwrap())));
  }

  #[test]
  fn test_parse_size_validates() {
    assert_eq!(parse("size 50"), Ok(Action::Size(50)));
    assert!(matches!(parse("size 0"), Err(ParseError::Invalid(_))));
  }

  #[test]
  fn test_parse_mutations() {
    assert_eq!(parse("done t-12"), Ok(Action::Done("t-12".to_string())));
    assert_eq!(parse("rm 9"), Ok(Action::Delete("9".to_string())));
    assert!(matches!(parse("done"), Err(ParseError::Usage(_))));
  }

  #[test]
  fn test_parse_add() {
    assert_eq!(
      parse("add  Water the plants "),
      Ok(Action::Add("Water the plants".to_string()))
    );
    assert_eq!(parse("new Bins"), Ok(Action::Add("Bins".to_string())));
    assert!(matches!(parse("add"), Err(ParseError::Usage(c)) if c.name == "add"));
  }

  #[test]
  fn test_every_command_parses() {
    for cmd in COMMANDS {
      let line = match cmd.name {
        "page" | "size" => format!("{} 2", cmd.name),
        "sort" => format!("{} title", cmd.name),
        "add" | "done" | "delete" => format!("{} x", cmd.name),
        name => name.to_string(),
      };
      assert!(parse(&line).is_ok(), "'{}' did not parse", line);
    }
    assert_eq!(parse("quit"), Ok(Action::Quit));
    assert_eq!(parse("exit"), Ok(Action::Quit));
  }

  #[test]
  fn test_unknown_suggests() {
    match parse("refr") {
      Err(ParseError::Unknown { suggestions, .. }) => assert_eq!(suggestions[0], "refresh"),
      other => panic!("unexpected {:?}", other),
    }
    assert_eq!(parse("   "), Err(ParseError::Empty));
  }
}
