//! Command classifier (C2): decides what a client session does with a
//! parsed command before it ever touches an upstream connection.
//!
//! Grounded on `JasonkayZK-mini-redis/src/cmd/mod.rs`'s
//! `Command::from_frame` dispatch-by-lowercased-name pattern. The teacher
//! builds a typed command struct per name because it goes on to execute the
//! command against a local store; this proxy never inspects command
//! arguments beyond name/argc/first-key, so the classifier returns a
//! `Decision` instead of a command value.

pub mod denylist;

use crate::command::denylist::{is_denylisted, is_multi_key};
use crate::resp::CommandFrame;

/// What a session should do with a classified command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fail immediately with a RESP error; never forwarded.
    Unsupported,
    /// Handle locally; synthesizes its own reply.
    Intercept(Intercept),
    /// Forward, and also drive the transaction state machine.
    TransactionAffecting(Transition),
    /// Forward as an ordinary command.
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercept {
    Ping,
    Quit,
    Select,
}

/// Which transaction-mode transition a transaction-affecting command drives
/// (spec section 4.6's state table), independent of the session's current
/// mode — the session applies this against its own state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Watch,
    Multi,
    Unwatch,
    ExecOrDiscard,
}

/// Classify `cmd` given whether multiplexing is enabled for this session.
pub fn classify(cmd: &CommandFrame, multiplexing: bool) -> Decision {
    let name = cmd.name();

    if is_denylisted(name) {
        return Decision::Unsupported;
    }

    if multiplexing && is_multi_key(name) {
        return Decision::Unsupported;
    }

    match name {
        "ping" => Decision::Intercept(Intercept::Ping),
        "quit" => Decision::Intercept(Intercept::Quit),
        "select" => Decision::Intercept(Intercept::Select),
        "watch" => Decision::TransactionAffecting(Transition::Watch),
        "multi" => Decision::TransactionAffecting(Transition::Multi),
        "unwatch" => Decision::TransactionAffecting(Transition::Unwatch),
        "exec" | "discard" => Decision::TransactionAffecting(Transition::ExecOrDiscard),
        _ => Decision::Forward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use crate::resp::command_frame::scan;

    fn frame(raw: &[u8]) -> CommandFrame {
        let mut buf = BytesMut::from(raw);
        scan(&mut buf).unwrap().unwrap()
    }

    #[test]
    fn ping_is_intercepted() {
        let f = frame(b"*1\r\n$4\r\nPING\r\n");
        assert_eq!(classify(&f, false), Decision::Intercept(Intercept::Ping));
    }

    #[test]
    fn get_is_forwarded() {
        let f = frame(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert_eq!(classify(&f, false), Decision::Forward);
    }

    #[test]
    fn subscribe_is_unsupported() {
        let f = frame(b"*2\r\n$9\r\nSUBSCRIBE\r\n$2\r\nch\r\n");
        assert_eq!(classify(&f, false), Decision::Unsupported);
    }

    #[test]
    fn mget_is_unsupported_only_when_multiplexing() {
        let f = frame(b"*3\r\n$4\r\nMGET\r\n$1\r\na\r\n$1\r\nb\r\n");
        assert_eq!(classify(&f, false), Decision::Forward);
        assert_eq!(classify(&f, true), Decision::Unsupported);
    }

    #[test]
    fn multi_advances_transaction() {
        let f = frame(b"*1\r\n$5\r\nMULTI\r\n");
        assert_eq!(
            classify(&f, false),
            Decision::TransactionAffecting(Transition::Multi)
        );
    }
}
