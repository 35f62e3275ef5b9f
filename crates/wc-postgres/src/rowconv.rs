//! String <-> enum conversions for the status columns, and the single place
//! a raw `sqlx::Error` becomes a [`WorkCoordinatorError`].

use wc_domain::{PerspectiveProcessingStatus, ReceptorProcessingStatus, RowStatus, WorkCoordinatorError};

pub fn row_status_to_str(status: RowStatus) -> &'static str {
    match status {
        RowStatus::Stored => "STORED",
        RowStatus::Claimed => "CLAIMED",
        RowStatus::Failed => "FAILED",
        RowStatus::DeadLettered => "DEAD_LETTERED",
    }
}

pub fn row_status_from_str(s: &str) -> RowStatus {
    match s {
        "CLAIMED" => RowStatus::Claimed,
        "FAILED" => RowStatus::Failed,
        "DEAD_LETTERED" => RowStatus::DeadLettered,
        _ => RowStatus::Stored,
    }
}

pub fn receptor_status_to_str(status: ReceptorProcessingStatus) -> &'static str {
    match status {
        ReceptorProcessingStatus::InProgress => "IN_PROGRESS",
        ReceptorProcessingStatus::Completed => "COMPLETED",
        ReceptorProcessingStatus::Failed => "FAILED",
    }
}

pub fn receptor_status_from_str(s: &str) -> ReceptorProcessingStatus {
    match s {
        "COMPLETED" => ReceptorProcessingStatus::Completed,
        "FAILED" => ReceptorProcessingStatus::Failed,
        _ => ReceptorProcessingStatus::InProgress,
    }
}

pub fn perspective_status_to_str(status: PerspectiveProcessingStatus) -> &'static str {
    match status {
        PerspectiveProcessingStatus::UpToDate => "UP_TO_DATE",
        PerspectiveProcessingStatus::Lagging => "LAGGING",
        PerspectiveProcessingStatus::Failed => "FAILED",
    }
}

pub fn perspective_status_from_str(s: &str) -> PerspectiveProcessingStatus {
    match s {
        "LAGGING" => PerspectiveProcessingStatus::Lagging,
        "FAILED" => PerspectiveProcessingStatus::Failed,
        _ => PerspectiveProcessingStatus::UpToDate,
    }
}

pub fn storage_err(context: &'static str, err: sqlx::Error) -> WorkCoordinatorError {
    WorkCoordinatorError::Storage {
        reason: format!("{context}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_status_roundtrips() {
        for status in [RowStatus::Stored, RowStatus::Claimed, RowStatus::Failed, RowStatus::DeadLettered] {
            assert_eq!(row_status_from_str(row_status_to_str(status)), status);
        }
    }

    #[test]
    fn receptor_status_roundtrips() {
        for status in [
            ReceptorProcessingStatus::InProgress,
            ReceptorProcessingStatus::Completed,
            ReceptorProcessingStatus::Failed,
        ] {
            assert_eq!(receptor_status_from_str(receptor_status_to_str(status)), status);
        }
    }

    #[test]
    fn perspective_status_roundtrips() {
        for status in [
            PerspectiveProcessingStatus::UpToDate,
            PerspectiveProcessingStatus::Lagging,
            PerspectiveProcessingStatus::Failed,
        ] {
            assert_eq!(perspective_status_from_str(perspective_status_to_str(status)), status);
        }
    }

    #[test]
    fn unknown_status_string_falls_back_to_first_variant() {
        assert_eq!(row_status_from_str("garbage"), RowStatus::Stored);
    }
}
