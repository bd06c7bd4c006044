//! Update pipeline states and the transitions allowed between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a single module update.
///
/// The happy path is strictly sequential from `Pending` to `Completed`.
/// `Completed`, `Failed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Pending,
    Downloading,
    Verifying,
    BackingUp,
    Applying,
    Migrating,
    Seeding,
    HealthChecking,
    Completed,
    Failed,
    RolledBack,
}

impl UpdateStatus {
    pub const ALL: [UpdateStatus; 11] = [
        Self::Pending,
        Self::Downloading,
        Self::Verifying,
        Self::BackingUp,
        Self::Applying,
        Self::Migrating,
        Self::Seeding,
        Self::HealthChecking,
        Self::Completed,
        Self::Failed,
        Self::RolledBack,
    ];

    /// The following state on the happy path.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Downloading),
            Self::Downloading => Some(Self::Verifying),
            Self::Verifying => Some(Self::BackingUp),
            Self::BackingUp => Some(Self::Applying),
            Self::Applying => Some(Self::Migrating),
            Self::Migrating => Some(Self::Seeding),
            Self::Seeding => Some(Self::HealthChecking),
            Self::HealthChecking => Some(Self::Completed),
            Self::Completed | Self::Failed | Self::RolledBack => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }

    pub fn is_in_progress(self) -> bool {
        !self.is_terminal() && self != Self::Pending
    }

    /// States reached only after a backup has been taken.
    pub fn can_roll_back(self) -> bool {
        matches!(
            self,
            Self::Applying | Self::Migrating | Self::Seeding | Self::HealthChecking
        )
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            Self::Failed => true,
            Self::RolledBack => self.can_roll_back(),
            _ => self.next() == Some(to),
        }
    }

    /// Short step label used in log entries.
    pub fn step(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "download",
            Self::Verifying => "verify",
            Self::BackingUp => "backup",
            Self::Applying => "apply",
            Self::Migrating => "migrate",
            Self::Seeding => "seed",
            Self::HealthChecking => "health_check",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rollback",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::BackingUp => "backing_up",
            Self::Applying => "applying",
            Self::Migrating => "migrating",
            Self::Seeding => "seeding",
            Self::HealthChecking => "health_checking",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn happy_path_reaches_completed() {
        let mut status = UpdateStatus::Pending;
        let mut steps = 0;
        while let Some(next) = status.next() {
            assert!(status.can_transition_to(next));
            status = next;
            steps += 1;
        }
        assert_eq!(status, UpdateStatus::Completed);
        assert_eq!(steps, 8);
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in UpdateStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in UpdateStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn every_non_terminal_state_can_fail() {
        for from in UpdateStatus::ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(UpdateStatus::Failed));
        }
    }

    #[rstest]
    #[case(UpdateStatus::Pending, false)]
    #[case(UpdateStatus::Downloading, false)]
    #[case(UpdateStatus::Verifying, false)]
    #[case(UpdateStatus::BackingUp, false)]
    #[case(UpdateStatus::Applying, true)]
    #[case(UpdateStatus::Migrating, true)]
    #[case(UpdateStatus::Seeding, true)]
    #[case(UpdateStatus::HealthChecking, true)]
    fn rollback_only_after_backup(#[case] from: UpdateStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(UpdateStatus::RolledBack), allowed);
    }

    #[test]
    fn in_progress_excludes_pending_and_terminal() {
        let in_progress: Vec<UpdateStatus> = UpdateStatus::ALL
            .into_iter()
            .filter(|s| s.is_in_progress())
            .collect();
        assert_eq!(
            in_progress,
            vec![
                UpdateStatus::Downloading,
                UpdateStatus::Verifying,
                UpdateStatus::BackingUp,
                UpdateStatus::Applying,
                UpdateStatus::Migrating,
                UpdateStatus::Seeding,
                UpdateStatus::HealthChecking,
            ]
        );
    }

    #[test]
    fn skipping_a_step_is_rejected() {
        assert!(!UpdateStatus::Downloading.can_transition_to(UpdateStatus::BackingUp));
        assert!(!UpdateStatus::Pending.can_transition_to(UpdateStatus::Completed));
        assert!(!UpdateStatus::Migrating.can_transition_to(UpdateStatus::Applying));
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&UpdateStatus::HealthChecking).unwrap();
        assert_eq!(json, "\"health_checking\"");
        let back: UpdateStatus = serde_json::from_str("\"rolled_back\"").unwrap();
        assert_eq!(back, UpdateStatus::RolledBack);
        assert_eq!(UpdateStatus::BackingUp.to_string(), "backing_up");
    }
}
