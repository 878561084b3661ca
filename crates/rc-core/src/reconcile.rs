use log::warn;

use crate::job::JobStatus;

/// Aggregate judgment of whether a batch still needs polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AllTerminal,
    StillPending,
}

/// Folds one poll response into the known per-job statuses.
///
/// Every id in `previous` survives: a fetched entry replaces it, an id the
/// backend has not reported on keeps its previous entry (a missing id means
/// "still pending", not an error). Fetched entries for unknown ids are
/// ignored. Submission order is preserved.
///
/// The verdict is `AllTerminal` iff every resulting state is `COMPLETED` or
/// `FAILED`, vacuously so for an empty batch.
pub fn reconcile(previous: &[JobStatus], fetched: &[JobStatus]) -> (Vec<JobStatus>, Verdict) {
    let updated: Vec<JobStatus> = previous
        .iter()
        .map(|prev| match fetched.iter().find(|f| f.job_id == prev.job_id) {
            Some(next) => {
                if prev.state.is_terminal() && !next.state.is_terminal() {
                    // Last-write-wins, but a terminal state should never regress.
                    warn!(
                        "job {} regressed from {:?} to {:?}",
                        prev.job_id, prev.state, next.state
                    );
                }
                next.clone()
            }
            None => prev.clone(),
        })
        .collect();

    let verdict = if updated.iter().all(|job| job.state.is_terminal()) {
        Verdict::AllTerminal
    } else {
        Verdict::StillPending
    };

    (updated, verdict)
}
