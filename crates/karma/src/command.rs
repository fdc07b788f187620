//! Parsing of console input lines.
//!
//! Every line is `<user id> <text>`. The text is either a slash command
//! (`/up`, `/down`, `/show`, `/help`) or an answer to a prompt:
//!
//! ```text
//! 1 /up fixed the flaky test
//! 1 select 1000 2
//! 3 confirm 1001
//! 2 decline 1001
//! ```

use karma_ids::{IdParseError, SessionId, UserId};
use karma_workflow::{Choice, Direction};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected `<user id> <command>`")]
    MissingCommand,

    #[error("Invalid user id: {0}")]
    InvalidUser(#[from] IdParseError),

    #[error("`{0}` needs a session id")]
    MissingSession(&'static str),

    #[error("`select` needs a user id after the session id")]
    MissingCandidate,
}

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Request {
        direction: Direction,
        reason: Option<String>,
    },
    Show {
        user: Option<UserId>,
    },
    Help,
    Select {
        session_id: SessionId,
        candidate: UserId,
    },
    Resolve {
        session_id: SessionId,
        choice: Choice,
    },
    UnknownCommand(String),
    /// Plain chat text; nothing to do
    Chatter,
}

/// A parsed line: who said it and what it means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub actor: UserId,
    pub input: Input,
}

pub fn parse_line(line: &str) -> Result<Line, ParseError> {
    let line = line.trim();
    let (actor, text) = line.split_once(char::is_whitespace).ok_or(ParseError::MissingCommand)?;
    let actor = UserId::parse(actor)?;
    let input = parse_input(text.trim())?;
    Ok(Line { actor, input })
}

fn parse_input(text: &str) -> Result<Input, ParseError> {
    let (word, rest) = match text.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (text, ""),
    };

    let input = match word {
        "/up" => Input::Request {
            direction: Direction::Up,
            reason: reason(rest),
        },
        "/down" => Input::Request {
            direction: Direction::Down,
            reason: reason(rest),
        },
        "/show" if rest.is_empty() => Input::Show { user: None },
        "/show" => Input::Show {
            user: Some(UserId::parse(rest)?),
        },
        "/help" => Input::Help,
        "select" => {
            let mut parts = rest.split_whitespace();
            let session_id = session(parts.next(), "select")?;
            let candidate = parts.next().ok_or(ParseError::MissingCandidate)?;
            Input::Select {
                session_id,
                candidate: UserId::parse(candidate)?,
            }
        }
        "confirm" => Input::Resolve {
            session_id: session(rest.split_whitespace().next(), "confirm")?,
            choice: Choice::Confirm,
        },
        "decline" => Input::Resolve {
            session_id: session(rest.split_whitespace().next(), "decline")?,
            choice: Choice::Decline,
        },
        command if command.starts_with('/') => Input::UnknownCommand(command.to_string()),
        _ => Input::Chatter,
    };
    Ok(input)
}

fn reason(rest: &str) -> Option<String> {
    (!rest.is_empty()).then(|| rest.to_string())
}

fn session(token: Option<&str>, command: &'static str) -> Result<SessionId, ParseError> {
    token
        .and_then(|token| SessionId::parse(token).ok())
        .ok_or(ParseError::MissingSession(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use karma_ids::MessageId;

    #[test]
    fn test_request_with_and_without_reason() {
        let line = parse_line("1 /up   fixed the flaky test  ").unwrap();
        assert_eq!(line.actor, UserId::new(1));
        assert_eq!(
            line.input,
            Input::Request {
                direction: Direction::Up,
                reason: Some("fixed the flaky test".to_string())
            }
        );

        let line = parse_line("2 /down").unwrap();
        assert_eq!(
            line.input,
            Input::Request {
                direction: Direction::Down,
                reason: None
            }
        );
    }

    #[test]
    fn test_show() {
        assert_eq!(parse_line("1 /show").unwrap().input, Input::Show { user: None });
        assert_eq!(
            parse_line("1 /show 3").unwrap().input,
            Input::Show {
                user: Some(UserId::new(3))
            }
        );
        assert!(matches!(
            parse_line("1 /show bob"),
            Err(ParseError::InvalidUser(_))
        ));
    }

    #[test]
    fn test_prompt_answers() {
        assert_eq!(
            parse_line("1 select 1000 2").unwrap().input,
            Input::Select {
                session_id: SessionId::from(MessageId::new(1000)),
                candidate: UserId::new(2)
            }
        );
        assert_eq!(
            parse_line("3 confirm 1001").unwrap().input,
            Input::Resolve {
                session_id: SessionId::from(MessageId::new(1001)),
                choice: Choice::Confirm
            }
        );
        assert_eq!(
            parse_line("2 decline 1001").unwrap().input,
            Input::Resolve {
                session_id: SessionId::from(MessageId::new(1001)),
                choice: Choice::Decline
            }
        );
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(parse_line("/up"), Err(ParseError::MissingCommand));
        assert!(matches!(
            parse_line("alice /up"),
            Err(ParseError::InvalidUser(_))
        ));
        assert_eq!(
            parse_line("1 confirm"),
            Err(ParseError::MissingSession("confirm"))
        );
        assert_eq!(
            parse_line("1 select 1000"),
            Err(ParseError::MissingCandidate)
        );
    }

    #[test]
    fn test_unknown_and_chatter() {
        assert_eq!(
            parse_line("1 /frobnicate now").unwrap().input,
            Input::UnknownCommand("/frobnicate".to_string())
        );
        assert_eq!(parse_line("1 good morning").unwrap().input, Input::Chatter);
    }
}
