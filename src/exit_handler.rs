//! Exit code logic for the harvester process.
//!
//! Single responsibility: map a batch report to the process exit outcome.

use harvester_core::BatchReport;

use crate::ProcessExit;

/// Determines the process exit outcome from a finished batch.
pub(crate) fn determine_exit_outcome(report: &BatchReport) -> ProcessExit {
    if report.interrupted {
        return ProcessExit::Failure;
    }
    let summary = report.summary();
    if summary.failed() == 0 {
        ProcessExit::Success
    } else if summary.done > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use harvester_core::{AssetOutcome, AssetStatus};

    use super::determine_exit_outcome;
    use crate::ProcessExit;
    use harvester_core::BatchReport;

    fn report(statuses: Vec<AssetStatus>, interrupted: bool) -> BatchReport {
        BatchReport {
            outcomes: statuses
                .into_iter()
                .enumerate()
                .map(|(index, status)| AssetOutcome {
                    index,
                    url: None,
                    file_name: format!("{index}.jpg"),
                    local_path: PathBuf::from(format!("{index}.jpg")),
                    byte_size: None,
                    status,
                    attempts: 1,
                    collided_with: None,
                })
                .collect(),
            interrupted,
        }
    }

    fn done() -> AssetStatus {
        AssetStatus::Done {
            dimensions: None,
            upscaled_from: None,
        }
    }

    fn failed() -> AssetStatus {
        AssetStatus::InspectFailed {
            kind: "decode",
            reason: "bad header".to_string(),
        }
    }

    #[test]
    fn test_exit_outcome_success_when_no_failures() {
        assert_eq!(
            determine_exit_outcome(&report(vec![done(), done()], false)),
            ProcessExit::Success
        );
    }

    #[test]
    fn test_exit_outcome_success_when_batch_empty() {
        assert_eq!(
            determine_exit_outcome(&report(vec![], false)),
            ProcessExit::Success
        );
    }

    #[test]
    fn test_exit_outcome_partial_when_mixed() {
        assert_eq!(
            determine_exit_outcome(&report(vec![done(), failed()], false)),
            ProcessExit::Partial
        );
    }

    #[test]
    fn test_exit_outcome_failure_when_all_failed() {
        assert_eq!(
            determine_exit_outcome(&report(vec![failed(), failed()], false)),
            ProcessExit::Failure
        );
    }

    #[test]
    fn test_exit_outcome_failure_when_interrupted() {
        assert_eq!(
            determine_exit_outcome(&report(vec![done(), AssetStatus::Cancelled], true)),
            ProcessExit::Failure
        );
    }
}
