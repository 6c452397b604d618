//! JSON snapshot files: the proposal snapshot in, the consolidation outcome out.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use propmerge_core::{ConsolidationOutcome, SourceProposal};
use tracing::info;

use crate::StoreError;

/// Read a complete proposal snapshot: a JSON array of proposals.
pub fn read_snapshot(path: &Path) -> Result<Vec<SourceProposal>, StoreError> {
    if !path.exists() {
        return Err(StoreError::SnapshotNotFound(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    let proposals: Vec<SourceProposal> = serde_json::from_reader(reader)?;
    info!(count = proposals.len(), path = %path.display(), "read proposal snapshot");
    Ok(proposals)
}

/// Write a checked outcome as pretty-printed JSON.
///
/// The outcome is verified again first; an inconsistent audit trail is never
/// written.
pub fn write_outcome(path: &Path, outcome: &ConsolidationOutcome) -> Result<(), StoreError> {
    outcome.verify()?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, outcome)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    info!(
        retained = outcome.retained.len(),
        consumed = outcome.consumed.len(),
        path = %path.display(),
        "wrote consolidation outcome"
    );
    Ok(())
}

/// Read an outcome written by [`write_outcome`] and re-verify it.
pub fn read_outcome(path: &Path) -> Result<ConsolidationOutcome, StoreError> {
    if !path.exists() {
        return Err(StoreError::SnapshotNotFound(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    let outcome: ConsolidationOutcome = serde_json::from_reader(reader)?;
    outcome.verify()?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use propmerge_core::{ConsumptionRecord, MERGE_REASON, ProposalId, consolidate};

    const SNAPSHOT: &str = r#"[
        {
            "id": "p-2",
            "group_id": "G1",
            "split_config_fingerprint": "fp",
            "date_range": {"from": "2022-01-01", "to": "2023-12-31"},
            "effective_date_range": {"from": "2022-01-01", "to": "2023-12-31"},
            "product_codes": ["VISION"],
            "plan_codes": "[\"PLAN1\"]"
        },
        {
            "id": "p-1",
            "group_id": "G1",
            "split_config_fingerprint": "fp",
            "date_range": {"from": "2020-01-01", "to": "2021-12-31"},
            "effective_date_range": {"from": "2020-01-01", "to": "2021-12-31"},
            "product_codes": ["DENTAL"],
            "plan_codes": "*",
            "broker": "Acme"
        }
    ]"#;

    #[test]
    fn missing_snapshot_errors() {
        let result = read_snapshot(Path::new("/nonexistent/snapshot.json"));
        assert!(matches!(result, Err(StoreError::SnapshotNotFound(_))));
    }

    #[test]
    fn snapshot_to_outcome_and_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("snapshot.json");
        let output = dir.path().join("outcome.json");
        std::fs::write(&input, SNAPSHOT).unwrap();

        let proposals = read_snapshot(&input).unwrap();
        assert_eq!(proposals.len(), 2);

        let outcome = consolidate(proposals).unwrap();
        write_outcome(&output, &outcome).unwrap();

        let reread = read_outcome(&output).unwrap();
        assert_eq!(reread, outcome);
        assert_eq!(reread.retained.len(), 1);
        assert_eq!(reread.retained[0].id().as_str(), "p-1");
        assert_eq!(reread.retained[0].proposal.attributes["broker"], "Acme");
        assert_eq!(reread.reason_for(&"p-2".into()), Some(MERGE_REASON));
    }

    #[test]
    fn inconsistent_outcome_is_not_written() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("outcome.json");

        let mut outcome = consolidate(Vec::new()).unwrap();
        let ghost: ProposalId = "ghost".into();
        outcome.consumed.insert(
            "orphan".into(),
            ConsumptionRecord {
                consumed_id: "orphan".into(),
                retained_id: ghost,
                reason: MERGE_REASON.into(),
            },
        );

        let result = write_outcome(&output, &outcome);
        assert!(matches!(result, Err(StoreError::Consolidation(_))));
        assert!(!output.exists());
    }

    #[test]
    fn malformed_snapshot_is_a_json_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("snapshot.json");
        std::fs::write(&input, r#"[{"id": "p-1"}]"#).unwrap();
        assert!(matches!(read_snapshot(&input), Err(StoreError::Json(_))));
    }
}
