//! Line commands read from stdin while the service runs.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Fetch { account: String, uid: u32 },
    Reply { account: String, uid: u32 },
    Reconnect { account: String },
    List { account: String },
    Status,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid uid '{0}'")]
    BadUid(String),
}

pub const HELP: &str = "\
Commands:
    fetch <account> <uid>   Fetch, classify and print one message
    reply <account> <uid>   Draft a reply for one message
    list <account>          Fetch and classify the recent message list
    reconnect <account>     Restart the account's session
    status                  Show session state per account
    quit                    Disconnect and exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    let command = match (cmd.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("fetch", [account, uid]) => ConsoleCommand::Fetch {
            account: account.to_string(),
            uid: parse_uid(uid)?,
        },
        ("fetch", _) => return Err(ConsoleError::Usage("fetch <account> <uid>")),
        ("reply", [account, uid]) => ConsoleCommand::Reply {
            account: account.to_string(),
            uid: parse_uid(uid)?,
        },
        ("reply", _) => return Err(ConsoleError::Usage("reply <account> <uid>")),
        ("reconnect", [account]) => ConsoleCommand::Reconnect {
            account: account.to_string(),
        },
        ("reconnect", _) => return Err(ConsoleError::Usage("reconnect <account>")),
        ("list", [account]) => ConsoleCommand::List {
            account: account.to_string(),
        },
        ("list", _) => return Err(ConsoleError::Usage("list <account>")),
        ("status", []) => ConsoleCommand::Status,
        ("help" | "?", _) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        (other, _) => return Err(ConsoleError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

fn parse_uid(raw: &str) -> Result<u32, ConsoleError> {
    raw.parse()
        .ok()
        .filter(|uid| *uid > 0)
        .ok_or_else(|| ConsoleError::BadUid(raw.to_string()))
}
