//! Weight-file codec. Three fields per row: `sim_id, weight, payout`
//! (payout in hundredths of the bet). Whitespace is trimmed, blank lines
//! skipped, anything else is a hard `InvalidCsv` with the offending line.

use crate::error::OptimizerError;
use crate::model::Outcome;

pub fn parse_table_csv(data: &str) -> Result<Vec<Outcome>, OptimizerError> {
    let mut outcomes = Vec::new();

    for (line_no, raw) in data.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(OptimizerError::InvalidCsv {
                line: line_no + 1,
                reason: format!("expected 3 fields, got {}", fields.len()),
            });
        }

        let sim_id = fields[0].parse::<i64>().map_err(|e| OptimizerError::InvalidCsv {
            line: line_no + 1,
            reason: format!("invalid sim_id: {e}"),
        })?;
        let weight = fields[1].parse::<u64>().map_err(|e| OptimizerError::InvalidCsv {
            line: line_no + 1,
            reason: format!("invalid weight: {e}"),
        })?;
        let payout_cents = fields[2].parse::<u64>().map_err(|e| OptimizerError::InvalidCsv {
            line: line_no + 1,
            reason: format!("invalid payout: {e}"),
        })?;

        outcomes.push(Outcome::new(sim_id, payout_cents, weight));
    }

    Ok(outcomes)
}

/// Only the weight column, for restoring from a backup file.
pub fn parse_weights_csv(data: &str) -> Result<Vec<u64>, OptimizerError> {
    Ok(parse_table_csv(data)?.into_iter().map(|o| o.weight).collect())
}

pub fn render_table_csv(outcomes: &[Outcome]) -> String {
    let mut out = String::with_capacity(outcomes.len() * 24);
    for o in outcomes {
        out.push_str(&format!("{},{},{}\n", o.sim_id, o.weight, o.payout_cents));
    }
    out
}
