//! Session mode: which storage backend an operation targets.
//!
//! The session subsystem is a collaborator. This crate only reads its flags, once per
//! call, and passes the resulting [`SessionMode`] down explicitly.

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    Authenticated,
    Guest,
    Demo,
}

impl SessionMode {
    /// Demo wins over guest.
    pub fn from_flags(is_guest: bool, is_demo: bool) -> Self {
        match (is_guest, is_demo) {
            (_, true) => SessionMode::Demo,
            (true, false) => SessionMode::Guest,
            (false, false) => SessionMode::Authenticated,
        }
    }

    /// Guest and demo sessions have no remote source; they live in the local store.
    pub fn is_local(self) -> bool {
        !matches!(self, SessionMode::Authenticated)
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionMode::Authenticated => "authenticated",
            SessionMode::Guest => "guest",
            SessionMode::Demo => "demo",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown session mode '{0}' (expected authenticated, guest or demo)")]
pub struct ParseSessionModeError(String);

impl FromStr for SessionMode {
    type Err = ParseSessionModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authenticated" | "auth" => Ok(SessionMode::Authenticated),
            "guest" => Ok(SessionMode::Guest),
            "demo" => Ok(SessionMode::Demo),
            other => Err(ParseSessionModeError(other.to_string())),
        }
    }
}

/// Synchronous view of the current session.
pub trait SessionProvider: Send + Sync {
    fn is_guest(&self) -> bool;
    fn is_demo(&self) -> bool;

    fn mode(&self) -> SessionMode {
        SessionMode::from_flags(self.is_guest(), self.is_demo())
    }
}

/// A provider whose mode is set directly (tests, the demo binary, sign-in flows).
#[derive(Debug)]
pub struct StaticSession {
    mode: RwLock<SessionMode>,
}

impl StaticSession {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode: RwLock::new(mode),
        }
    }

    pub fn set(&self, mode: SessionMode) {
        *self.mode.write().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    fn current(&self) -> SessionMode {
        *self.mode.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionProvider for StaticSession {
    // A demo session is also a guest session: neither has an account.
    fn is_guest(&self) -> bool {
        self.current().is_local()
    }

    fn is_demo(&self) -> bool {
        self.current() == SessionMode::Demo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_wins_over_guest() {
        assert_eq!(SessionMode::from_flags(true, true), SessionMode::Demo);
        assert_eq!(SessionMode::from_flags(false, true), SessionMode::Demo);
        assert_eq!(SessionMode::from_flags(true, false), SessionMode::Guest);
        assert_eq!(SessionMode::from_flags(false, false), SessionMode::Authenticated);
    }

    #[test]
    fn test_static_session_round_trips_mode() {
        let session = StaticSession::new(SessionMode::Guest);
        assert_eq!(session.mode(), SessionMode::Guest);
        session.set(SessionMode::Demo);
        assert!(session.is_guest());
        assert_eq!(session.mode(), SessionMode::Demo);
        session.set(SessionMode::Authenticated);
        assert!(!session.is_guest());
        assert_eq!(session.mode(), SessionMode::Authenticated);
    }

    #[test]
    fn test_parse() {
        assert_eq!(" Demo ".parse::<SessionMode>().unwrap(), SessionMode::Demo);
        assert!("admin".parse::<SessionMode>().is_err());
    }
}
