//! User-visible notices. The transport decides how they look.

use crate::types::Standing;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    RequestNoLongerValid,
    SelectionAlreadyActive,
    OnlyRequesterMaySelect,
    UnknownCandidate,
    RequesterCannotApprove,
    CandidateCannotApprove,
    CandidateCannotDecline,
    CommandFailed,
    Granted {
        recipient_name: String,
        delta: i64,
        reason: Option<String>,
    },
    Declined,
    UnregisteredUser,
    Total {
        name: String,
        total: i64,
    },
    Standings(Vec<Standing>),
    Help,
    UnknownCommand,
}

impl Notice {
    /// Whether the notice reports a problem rather than a result.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::Granted { .. }
                | Self::Declined
                | Self::Total { .. }
                | Self::Standings(_)
                | Self::Help
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestNoLongerValid => f.write_str("The request is no longer valid"),
            Self::SelectionAlreadyActive => {
                f.write_str("You already have an active recipient selection")
            }
            Self::OnlyRequesterMaySelect => {
                f.write_str("Only the user who made the request can pick the recipient")
            }
            Self::UnknownCandidate => f.write_str("That user cannot receive karma"),
            Self::RequesterCannotApprove => {
                f.write_str("The request cannot be approved by its initiator")
            }
            Self::CandidateCannotApprove => {
                f.write_str("The request cannot be approved by its recipient")
            }
            Self::CandidateCannotDecline => {
                f.write_str("The request cannot be declined by its recipient")
            }
            Self::CommandFailed => f.write_str("The command could not be executed"),
            Self::Granted {
                recipient_name,
                delta,
                reason,
            } => {
                write!(f, "{} receives {:+} karma", recipient_name, delta)?;
                match reason {
                    Some(reason) => write!(f, " for: \"{}\"", reason),
                    None => Ok(()),
                }
            }
            Self::Declined => f.write_str("The request was declined"),
            Self::UnregisteredUser => f.write_str("That user is not registered"),
            Self::Total { name, total } => write!(f, "{} has {} karma", name, total),
            Self::Standings(standings) => {
                f.write_str("Current standings:")?;
                for (index, standing) in standings.iter().enumerate() {
                    write!(f, "\n  {}. {}: {}", index + 1, standing.name, standing.total)?;
                }
                Ok(())
            }
            Self::Help => f.write_str(
                "Supported commands:\n\
                 \x20 /help            list supported commands\n\
                 \x20 /up [reason]     request +1 karma for someone\n\
                 \x20 /down [reason]   request -1 karma for someone\n\
                 \x20 /show [user]     show one user's karma, or everyone's",
            ),
            Self::UnknownCommand => f.write_str("Unknown command, type /help for help"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karma_ids::UserId;

    #[test]
    fn test_granted_text() {
        let notice = Notice::Granted {
            recipient_name: "Bob".to_string(),
            delta: 1,
            reason: Some("helped debug".to_string()),
        };
        assert_eq!(notice.to_string(), "Bob receives +1 karma for: \"helped debug\"");
        assert!(!notice.is_error());
    }

    #[test]
    fn test_standings_text() {
        let notice = Notice::Standings(vec![
            Standing {
                user: UserId::new(2),
                name: "Bob".to_string(),
                total: 3,
            },
            Standing {
                user: UserId::new(1),
                name: "Alice".to_string(),
                total: -1,
            },
        ]);
        assert_eq!(
            notice.to_string(),
            "Current standings:\n  1. Bob: 3\n  2. Alice: -1"
        );
    }
}
