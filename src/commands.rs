//! Commands accepted on stdin while `splitc watch` is running

/// What a watch command does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Refresh,
  Hide,
  Show,
  OwedToMe,
  IOwe,
  Status,
  Help,
  Quit,
}

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
  pub action: Action,
}

/// All watch commands
pub const COMMANDS: &[Command] = &[
  Command {
    name: "refresh",
    aliases: &["r", "fetch"],
    description: "Fetch bills now",
    action: Action::Refresh,
  },
  Command {
    name: "hide",
    aliases: &["h", "away"],
    description: "Mark the client as hidden",
    action: Action::Hide,
  },
  Command {
    name: "show",
    aliases: &["v", "visible", "back"],
    description: "Mark the client as visible (refreshes if stale)",
    action: Action::Show,
  },
  Command {
    name: "owed",
    aliases: &["o", "mine"],
    description: "Print bills owed to me",
    action: Action::OwedToMe,
  },
  Command {
    name: "owe",
    aliases: &["i", "debts"],
    description: "Print bills I owe",
    action: Action::IOwe,
  },
  Command {
    name: "status",
    aliases: &["st", "info"],
    description: "Print cache status",
    action: Action::Status,
  },
  Command {
    name: "help",
    aliases: &["?"],
    description: "List commands",
    action: Action::Help,
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Stop watching",
    action: Action::Quit,
  },
];

/// Commands matching `input`, best match first
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return COMMANDS.iter().collect();
  }

  let mut matches: Vec<(&Command, u32)> = COMMANDS
    .iter()
    .filter_map(|cmd| match_rank(cmd, &input_lower).map(|rank| (cmd, rank)))
    .collect();

  // Stable sort keeps table order within a rank
  matches.sort_by_key(|(_, rank)| *rank);

  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Lower is better; `None` means no match
fn match_rank(cmd: &Command, input: &str) -> Option<u32> {
  if cmd.name == input {
    Some(0)
  } else if cmd.aliases.contains(&input) {
    Some(1)
  } else if cmd.name.starts_with(input) {
    Some(2)
  } else if cmd.aliases.iter().any(|a| a.starts_with(input)) {
    Some(3)
  } else if cmd.name.contains(input) {
    Some(4)
  } else if cmd.aliases.iter().any(|a| a.contains(input)) {
    Some(5)
  } else {
    None
  }
}

/// Resolve a typed line to an action. Empty input resolves to nothing.
pub fn resolve(input: &str) -> Option<Action> {
  if input.trim().is_empty() {
    return None;
  }
  get_suggestions(input).first().map(|cmd| cmd.action)
}
