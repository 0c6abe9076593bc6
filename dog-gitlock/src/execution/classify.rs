//! Failure classification for git errors.
//!
//! Git only reports lock conflicts as text, so this is a best-effort
//! substring match. A false positive costs one extra backoff; a false
//! negative surfaces a retriable failure as terminal. Replace this function
//! if the wrapped tool ever exposes structured errors.

use crate::OperationError;

/// Fragments of git's lock-conflict messages, lowercase
const LOCK_ERROR_PATTERNS: &[&str] = &[
    "index.lock",
    "unable to create",
    "file exists",
    "another git process seems to be running",
];

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Git's own lock was held; retry after backoff
    LockContention,
    /// Anything else; surface to the caller unchanged
    Terminal,
}

/// Classify a payload failure
pub fn classify_failure(error: &OperationError) -> FailureClass {
    let message = error.message().to_lowercase();
    if LOCK_ERROR_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
    {
        FailureClass::LockContention
    } else {
        FailureClass::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_git_lock_messages() {
        let messages = [
            "fatal: Unable to create '/config/.git/index.lock': File exists.",
            "error: could not lock config file: File exists",
            "Another git process seems to be running in this repository",
            "INDEX.LOCK present",
        ];
        for message in messages {
            assert_eq!(
                classify_failure(&OperationError::new(message)),
                FailureClass::LockContention,
                "{message}"
            );
        }
    }

    #[test]
    fn other_failures_are_terminal() {
        for message in [
            "fatal: not a git repository",
            "error: pathspec 'x' did not match any file(s) known to git",
            "",
        ] {
            assert_eq!(classify_failure(&OperationError::new(message)), FailureClass::Terminal);
        }
    }
}
