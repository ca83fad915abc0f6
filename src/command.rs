use std::path::PathBuf;

use chrono::NaiveDate;

use crate::model::*;

/// Date format accepted on the console.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parsed console command.
#[derive(Debug, PartialEq)]
pub enum Command {
    Initialize {
        path: PathBuf,
        opened_on: Option<NaiveDate>,
    },
    Begin {
        hotel: String,
    },
    Quit,
    Help,
    Register {
        name: String,
        email: String,
    },
    Reserve {
        guest: GuestId,
        room_type: RoomType,
        range: DateRange,
    },
    DeleteReservation {
        guest: GuestId,
    },
    CheckIn {
        guest: GuestId,
    },
    CheckOut {
        guest: GuestId,
        paid: bool,
    },
    ClientInfo {
        guest: GuestId,
    },
    CurrentClients {
        state: GuestState,
    },
    ClientId {
        name: String,
        email: String,
    },
    Available {
        room_type: RoomType,
        range: DateRange,
    },
    Calendar {
        room: RoomNumber,
    },
    Rooms,
    Export {
        room: RoomNumber,
    },
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let words = tokenize(line)?;
    let Some((verb, args)) = words.split_first() else {
        return Err(CommandError::Empty);
    };

    match verb.to_lowercase().as_str() {
        "initialize" => {
            arity("initialize", args, 1, 2)?;
            Ok(Command::Initialize {
                path: PathBuf::from(&args[0]),
                opened_on: args.get(1).map(|s| parse_date(s)).transpose()?,
            })
        }
        "begin" => {
            arity("begin", args, 1, 1)?;
            Ok(Command::Begin { hotel: args[0].clone() })
        }
        "quit" | "exit" => {
            arity("quit", args, 0, 0)?;
            Ok(Command::Quit)
        }
        "help" => {
            arity("help", args, 0, 0)?;
            Ok(Command::Help)
        }
        "register" => {
            arity("register", args, 2, 2)?;
            Ok(Command::Register {
                name: args[0].clone(),
                email: args[1].clone(),
            })
        }
        "reserve" => {
            arity("reserve", args, 4, 4)?;
            Ok(Command::Reserve {
                guest: parse_number(&args[0], "guest id")?,
                room_type: parse_number(&args[1], "room type")?,
                range: parse_range(&args[2], &args[3])?,
            })
        }
        "delete-reservation" => {
            arity("delete-reservation", args, 1, 1)?;
            Ok(Command::DeleteReservation {
                guest: parse_number(&args[0], "guest id")?,
            })
        }
        "check-in" => {
            arity("check-in", args, 1, 1)?;
            Ok(Command::CheckIn {
                guest: parse_number(&args[0], "guest id")?,
            })
        }
        "check-out" => {
            arity("check-out", args, 2, 2)?;
            Ok(Command::CheckOut {
                guest: parse_number(&args[0], "guest id")?,
                paid: parse_bool(&args[1])?,
            })
        }
        "client-info" => {
            arity("client-info", args, 1, 1)?;
            Ok(Command::ClientInfo {
                guest: parse_number(&args[0], "guest id")?,
            })
        }
        "current-clients" => {
            arity("current-clients", args, 1, 1)?;
            Ok(Command::CurrentClients {
                state: parse_state(&args[0])?,
            })
        }
        "client-id" => {
            arity("client-id", args, 2, 2)?;
            Ok(Command::ClientId {
                name: args[0].clone(),
                email: args[1].clone(),
            })
        }
        "available" => {
            arity("available", args, 3, 3)?;
            Ok(Command::Available {
                room_type: parse_number(&args[0], "room type")?,
                range: parse_range(&args[1], &args[2])?,
            })
        }
        "calendar" => {
            arity("calendar", args, 1, 1)?;
            Ok(Command::Calendar {
                room: parse_number(&args[0], "room number")?,
            })
        }
        "rooms" => {
            arity("rooms", args, 0, 0)?;
            Ok(Command::Rooms)
        }
        "export" => {
            arity("export", args, 1, 1)?;
            Ok(Command::Export {
                room: parse_number(&args[0], "room number")?,
            })
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Split on whitespace; double quotes group words into one argument.
fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for c in line.trim().chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if in_quotes {
        return Err(CommandError::InvalidArgument("unterminated quote".into()));
    }
    if has_word {
        words.push(current);
    }
    Ok(words)
}

fn arity(command: &'static str, args: &[String], min: usize, max: usize) -> Result<(), CommandError> {
    if args.len() < min || args.len() > max {
        return Err(CommandError::WrongArity(command, min, args.len()));
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(s: &str, what: &str) -> Result<T, CommandError> {
    s.parse()
        .map_err(|_| CommandError::InvalidArgument(format!("bad {what}: {s}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, CommandError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| CommandError::InvalidArgument(format!("bad date: {s} (expected YYYY-MM-DD)")))
}

/// Ordering is left to the engine so an inverted range reports as such.
fn parse_range(start: &str, end: &str) -> Result<DateRange, CommandError> {
    Ok(DateRange::new(parse_date(start)?, parse_date(end)?))
}

fn parse_bool(s: &str) -> Result<bool, CommandError> {
    match s.to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => Err(CommandError::InvalidArgument(format!("bad bool: {s}"))),
    }
}

/// A state code (1 checked in, 2 reserved, 3 idle) or its name.
fn parse_state(s: &str) -> Result<GuestState, CommandError> {
    let by_name = match s.to_lowercase().as_str() {
        "checked-in" | "checkedin" => Some(GuestState::CheckedIn),
        "reserved" => Some(GuestState::Reserved),
        "idle" => Some(GuestState::Idle),
        _ => None,
    };
    by_name
        .or_else(|| s.parse().ok().and_then(GuestState::from_code))
        .ok_or_else(|| CommandError::InvalidArgument(format!("bad client state: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    WrongArity(&'static str, usize, usize),
    InvalidArgument(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Empty => write!(f, "empty command"),
            CommandError::Unknown(c) => write!(f, "unknown command: {c}"),
            CommandError::WrongArity(c, expected, got) => {
                write!(f, "{c}: expected {expected} arguments, got {got}")
            }
            CommandError::InvalidArgument(s) => write!(f, "invalid argument: {s}"),
        }
    }
}

impl std::error::Error for CommandError {}
