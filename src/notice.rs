use crate::rotator::{Outcome, RejectReason, RotationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Warning,
    Error,
}

/// What the admin sees after submitting the reset form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub details: Vec<String>,
}

pub fn success_message(count: usize) -> String {
    match count {
        0 => "Success! The passwords have been reset.".to_string(),
        1 => "Success! 1 password has been reset.".to_string(),
        n => format!("Success! {n} passwords have been reset."),
    }
}

pub fn rejection_notice(reason: RejectReason) -> Notice {
    Notice {
        kind: NoticeKind::Error,
        message: reason.to_string(),
        details: Vec::new(),
    }
}

fn completion_notice(result: &RotationResult) -> Notice {
    let details: Vec<String> = result
        .failures
        .iter()
        .map(|(user, cause)| format!("User #{user}: {cause}"))
        .collect();

    Notice {
        kind: if details.is_empty() { NoticeKind::Success } else { NoticeKind::Warning },
        message: success_message(result.succeeded),
        details,
    }
}

pub fn notice_for(outcome: &Outcome) -> Notice {
    match outcome {
        Outcome::Rejected(reason) => rejection_notice(*reason),
        Outcome::Completed(result) => completion_notice(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotator::FailureCause;
    use std::collections::BTreeSet;

    #[test]
    fn pluralized_success() {
        assert_eq!(success_message(0), "Success! The passwords have been reset.");
        assert_eq!(success_message(1), "Success! 1 password has been reset.");
        assert_eq!(success_message(4), "Success! 4 passwords have been reset.");
    }

    #[test]
    fn every_reason_has_its_own_message() {
        let reasons = [
            RejectReason::MissingConfirmation,
            RejectReason::NoRolesSelected,
            RejectReason::NoUsers,
            RejectReason::ProcessFailure,
        ];
        let messages: BTreeSet<String> = reasons.iter().map(|r| rejection_notice(*r).message).collect();
        assert_eq!(messages.len(), 4);
        assert_eq!(
            rejection_notice(RejectReason::NoUsers).message,
            "There are no users to process."
        );
    }

    #[test]
    fn partial_failure_is_a_warning_with_details() {
        let outcome = Outcome::Completed(RotationResult {
            attempted: 2,
            succeeded: 1,
            failures: vec![(3, FailureCause::CredentialStoreFailure("disk full".into()))],
        });
        let notice = notice_for(&outcome);
        assert_eq!(notice.kind, NoticeKind::Warning);
        assert_eq!(notice.message, "Success! 1 password has been reset.");
        assert_eq!(notice.details, vec!["User #3: credential store failure: disk full".to_string()]);
    }
}
