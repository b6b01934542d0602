//! Reports produced by the cleanup loop
use std::fmt::{Display, Formatter};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// A reaction left unbalanced by a pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnbalancedReaction {
    pub reaction_id: String,
    pub name: Option<String>,
    /// Equation at the time of the pass
    pub equation: String,
    /// Residual of the stoichiometries the reaction had
    pub residual: Option<IndexMap<String, f64>>,
    /// Residual with every explicit coefficient set to 1
    pub reset_residual: Option<IndexMap<String, f64>>,
    /// Why the reaction could not be examined, such as a missing formula
    pub failure: Option<String>,
}

/// Outcome of one balancing pass over a model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    /// One based pass number
    pub pass: usize,
    /// Reactions in the model when the pass started
    pub total_reactions: usize,
    /// Reactions balanced before or during the pass
    pub balanced: Vec<String>,
    pub unbalanced: Vec<UnbalancedReaction>,
    /// Omitted processes, never balanced
    pub skipped: Vec<String>,
    /// Number of unbalanced reactions each species was blamed for
    pub problematic: IndexMap<String, usize>,
    /// Species whose formula was made specific
    pub updated_species: IndexSet<String>,
    /// Reactions balanced with substituted R groups
    pub r_group_expanded: Vec<String>,
}

impl PassReport {
    pub fn new(pass: usize, total_reactions: usize) -> Self {
        PassReport {
            pass,
            total_reactions,
            ..PassReport::default()
        }
    }

    /// Fraction of the model's reactions not left unbalanced, 1 for an empty model
    pub fn balanced_fraction(&self) -> f64 {
        if self.total_reactions == 0 {
            return 1.;
        }
        let balanced = self.total_reactions.saturating_sub(self.unbalanced.len());
        balanced as f64 / self.total_reactions as f64
    }

    pub(crate) fn blame(&mut self, species_id: &str) {
        *self.problematic.entry(species_id.to_string()).or_insert(0) += 1;
    }
}

fn format_residual(residual: &Option<IndexMap<String, f64>>) -> String {
    match residual {
        Some(residual) => {
            let entries: Vec<String> = residual
                .iter()
                .map(|(element, value)| format!("{}={}", element, value))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        None => String::new(),
    }
}

impl Display for PassReport {
    /// One tab separated `UNBALANCED` line per unbalanced reaction, then a summary line
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for reaction in &self.unbalanced {
            let residual = match &reaction.failure {
                Some(failure) => failure.clone(),
                None => format_residual(&reaction.residual),
            };
            writeln!(
                f,
                "UNBALANCED\t{}\t{}\t{}\t{}\t{}",
                residual,
                format_residual(&reaction.reset_residual),
                reaction.reaction_id,
                reaction.name.as_deref().unwrap_or(""),
                reaction.equation
            )?;
        }
        write!(
            f,
            "{}/{} {:.2}% balanced",
            self.total_reactions.saturating_sub(self.unbalanced.len()),
            self.total_reactions,
            100. * self.balanced_fraction()
        )
    }
}

/// Outcome of a converged cleanup run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    /// Number of passes run, including the final unchanged one
    pub passes: usize,
    pub deleted_species: Vec<String>,
    pub deleted_reactions: Vec<String>,
    /// Balanced fraction after each pass
    pub balanced_fractions: Vec<f64>,
    /// Species whose formula was made specific in any pass
    pub updated_species: IndexSet<String>,
    pub final_pass: PassReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_unbalanced_reactions() {
        let mut report = PassReport::new(1, 4);
        report.balanced = vec!["R1".to_string(), "R2".to_string(), "R3".to_string()];
        let mut residual = IndexMap::new();
        residual.insert("C".to_string(), 1.);
        report.unbalanced.push(UnbalancedReaction {
            reaction_id: "R4".to_string(),
            name: Some("broken".to_string()),
            equation: "a -> b".to_string(),
            residual: Some(residual.clone()),
            reset_residual: Some(residual),
            failure: None,
        });
        let text = report.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "UNBALANCED\t{C=1}\t{C=1}\tR4\tbroken\ta -> b");
        assert_eq!(lines[1], "3/4 75.00% balanced");
    }

    #[test]
    fn empty_model_is_fully_balanced() {
        let report = PassReport::new(1, 0);
        assert_eq!(report.balanced_fraction(), 1.);
        assert_eq!(report.to_string(), "0/0 100.00% balanced");
    }
}
