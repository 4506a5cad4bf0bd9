//! Interactive command parsing
//!
//! Accepted verbs and their minimum argument counts:
//!
//! | input                    | arguments                 |
//! |--------------------------|---------------------------|
//! | `dial A B C ...`         | two or more extensions    |
//! | `join CALLID A B C ...`  | a call id + one or more   |
//! | `list`                   | none                      |
//! | `exit`                   | none                      |

use std::str::FromStr;

use thiserror::Error;

pub const MENU: &str = "Enter one of the available options:
-> list                    (list all ongoing calls with their call IDs and participants)
-> dial A B C ...          (initiate a call between extensions A, B, C, etc.)
-> join CALLID A B C ...   (allow extensions A, B, C, etc. to join the call with ID CALLID)
-> exit                    (exit the application)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Dial { extensions: Vec<String> },
    Join { call_id: String, extensions: Vec<String> },
    List,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{command} expects {expected}")]
    Arity {
        command: &'static str,
        expected: &'static str,
    },
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut fields = input.split_whitespace();
        let verb = fields.next().ok_or(ParseError::Empty)?;
        let args: Vec<String> = fields.map(str::to_string).collect();

        match verb {
            "dial" if args.len() >= 2 => Ok(Command::Dial { extensions: args }),
            "dial" => Err(ParseError::Arity {
                command: "dial",
                expected: "at least two extensions",
            }),
            "join" => match args.split_first() {
                Some((call_id, extensions)) if !extensions.is_empty() => Ok(Command::Join {
                    call_id: call_id.clone(),
                    extensions: extensions.to_vec(),
                }),
                _ => Err(ParseError::Arity {
                    command: "join",
                    expected: "a call id and at least one extension",
                }),
            },
            "list" if args.is_empty() => Ok(Command::List),
            "list" => Err(ParseError::Arity {
                command: "list",
                expected: "no arguments",
            }),
            "exit" if args.is_empty() => Ok(Command::Exit),
            "exit" => Err(ParseError::Arity {
                command: "exit",
                expected: "no arguments",
            }),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}
