use std::process::ExitCode;

/// How a lifecycle ended.
///
/// Maps onto the process exit status:
///
/// | Outcome              | exit code |
/// |----------------------|-----------|
/// | `Clean`              | 0         |
/// | `Fatal`              | 10        |
/// | `PreconditionFailed` | 255       |
///
/// `Fatal` means the keeper should be restarted by whatever supervises the
/// process (systemd, Kubernetes, a shell loop).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Terminated on request (keeper logic or OS signal), or nothing to supervise.
    Clean,
    /// A watcher died, blocks went stale, or a hook failed.
    Fatal,
    /// The account could not sign; nothing was started.
    PreconditionFailed,
}

impl Outcome {
    /// Process exit status for this outcome.
    ///
    /// # Example
    /// ```
    /// use keepervisor::Outcome;
    ///
    /// assert_eq!(Outcome::Clean.exit_code(), 0);
    /// assert_eq!(Outcome::Fatal.exit_code(), 10);
    /// ```
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Clean => 0,
            Outcome::Fatal => 10,
            Outcome::PreconditionFailed => 255,
        }
    }
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        ExitCode::from(outcome.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_failure_is_minus_one() {
        assert_eq!(Outcome::PreconditionFailed.exit_code() as i8, -1);
    }
}
