//! Summary card for a consolidation outcome.
//!
//! Renders the run counters, the boundary breakdown and the survivors that
//! absorbed the most proposals as a grouped, human-readable card.

use std::io::{self, Write};

use propmerge_core::{ConsolidationOutcome, ProposalId};

const MAX_LIST_ITEMS: usize = 10;

// ── Public API ──

/// Print the outcome card to stdout.
pub fn print_outcome_card(outcome: &ConsolidationOutcome) -> anyhow::Result<()> {
    let stdout = io::stdout();
    write_outcome_card(&mut stdout.lock(), outcome)?;
    Ok(())
}

/// Print what happened to one proposal to stdout.
pub fn print_explanation(outcome: &ConsolidationOutcome, id: &ProposalId) -> anyhow::Result<()> {
    let stdout = io::stdout();
    write_explanation(&mut stdout.lock(), outcome, id)?;
    Ok(())
}

pub fn write_outcome_card<W: Write>(out: &mut W, outcome: &ConsolidationOutcome) -> io::Result<()> {
    let stats = &outcome.stats;

    writeln!(out, "=== Consolidation ===")?;
    writeln!(out)?;

    writeln!(out, "Counts")?;
    writeln!(out, "  {:<26} {}", "input", stats.input)?;
    writeln!(out, "  {:<26} {}", "retained", outcome.retained.len())?;
    writeln!(out, "  {:<26} {}", "consumed", outcome.consumed.len())?;
    writeln!(out)?;

    if stats.input > 0 {
        writeln!(out, "Boundaries")?;
        writeln!(out, "  {:<26} {}", "group", stats.group_boundaries)?;
        writeln!(out, "  {:<26} {}", "fingerprint", stats.fingerprint_boundaries)?;
        writeln!(out, "  {:<26} {}", "plan conflict", stats.conflict_boundaries)?;
        writeln!(out)?;
    }

    let mut absorbing: Vec<(&ProposalId, usize)> = outcome
        .retained_by()
        .into_iter()
        .filter(|(_, consumed)| !consumed.is_empty())
        .map(|(id, consumed)| (id, consumed.len()))
        .collect();
    if absorbing.is_empty() {
        return Ok(());
    }
    absorbing.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    writeln!(out, "Survivors ({}):", absorbing.len())?;
    for (id, count) in absorbing.iter().take(MAX_LIST_ITEMS) {
        let Some(retained) = outcome.retained.iter().find(|r| r.id() == *id) else {
            continue;
        };
        let p = &retained.proposal;
        writeln!(out, "    {:<30}  absorbed {}", id.as_str(), count)?;
        writeln!(out, "      group {}  range {}", p.group_id, p.date_range)?;
        writeln!(out, "      plans {}  products {}", p.plan_codes, p.product_codes)?;
    }
    if absorbing.len() > MAX_LIST_ITEMS {
        writeln!(out, "    ... and {} more", absorbing.len() - MAX_LIST_ITEMS)?;
    }
    writeln!(out)?;
    Ok(())
}

pub fn write_explanation<W: Write>(
    out: &mut W,
    outcome: &ConsolidationOutcome,
    id: &ProposalId,
) -> io::Result<()> {
    if let Some(record) = outcome.consumed.get(id) {
        writeln!(out, "{id}: consumed by {}", record.retained_id)?;
        writeln!(out, "  reason: {}", record.reason)?;
        return Ok(());
    }
    match outcome.retained.iter().find(|r| r.id() == id) {
        Some(retained) => {
            let absorbed = outcome
                .consumed
                .values()
                .filter(|r| &r.retained_id == id)
                .count();
            let p = &retained.proposal;
            writeln!(out, "{id}: retained, absorbed {absorbed}")?;
            writeln!(out, "  range:     {}", p.date_range)?;
            writeln!(out, "  effective: {}", p.effective_date_range)?;
            writeln!(out, "  plans:     {}", p.plan_codes)?;
            writeln!(out, "  products:  {}", p.product_codes)?;
        }
        None => writeln!(out, "{id}: not part of this outcome")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use propmerge_core::{CodeSet, DateRange, SourceProposal, consolidate};

    fn outcome() -> ConsolidationOutcome {
        let year = |y: i32| DateRange::new(
            NaiveDate::from_ymd_opt(y, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(y, 12, 31),
        );
        consolidate(vec![
            SourceProposal::new("a", "G1", Some("fp"), year(2020))
                .with_plan_codes(CodeSet::MatchAll),
            SourceProposal::new("b", "G1", Some("fp"), year(2021))
                .with_plan_codes(CodeSet::from_codes(["PLAN1"])),
            SourceProposal::new("c", "G2", Some("fp"), year(2020)),
        ])
        .unwrap()
    }

    fn render<F: FnOnce(&mut Vec<u8>) -> io::Result<()>>(f: F) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn card_lists_counts_and_survivors() {
        let outcome = outcome();
        let text = render(|out| write_outcome_card(out, &outcome));
        assert!(text.contains("=== Consolidation ==="));
        assert!(text.contains("retained                   2"));
        assert!(text.contains("consumed                   1"));
        assert!(text.contains("Survivors (1):"));
        assert!(text.contains("range [2020-01-01, 2021-12-31]"));
        assert!(!text.contains("    c "));
    }

    #[test]
    fn empty_outcome_card_has_no_sections() {
        let outcome = consolidate(Vec::new()).unwrap();
        let text = render(|out| write_outcome_card(out, &outcome));
        assert!(text.contains("input                      0"));
        assert!(!text.contains("Boundaries"));
        assert!(!text.contains("Survivors"));
    }

    #[test]
    fn explain_consumed_retained_and_unknown() {
        let outcome = outcome();

        let text = render(|out| write_explanation(out, &outcome, &"b".into()));
        assert!(text.starts_with("b: consumed by a"));
        assert!(text.contains("same split configuration"));

        let text = render(|out| write_explanation(out, &outcome, &"a".into()));
        assert!(text.starts_with("a: retained, absorbed 1"));
        assert!(text.contains("plans:     *"));

        let text = render(|out| write_explanation(out, &outcome, &"zzz".into()));
        assert_eq!(text, "zzz: not part of this outcome\n");
    }
}
