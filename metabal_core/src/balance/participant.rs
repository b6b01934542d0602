//! Columns of the balancing problem
use std::sync::Arc;

use crate::chemistry::cofactor::Cofactor;
use crate::chemistry::formula::Formula;
use crate::metabolic_model::reaction::Side;

/// What a column of the balancing problem stands for
#[derive(Debug, Clone)]
pub enum ParticipantKind {
    /// An existing reference, `index` is its position on its side of the reaction
    Species { species_id: String, index: usize },
    /// A cofactor the balancer may add to the reaction
    Cofactor(Arc<Cofactor>),
    /// Repeating unit `unit` of the participant at position `parent`
    RepeatingUnit { parent: usize, unit: usize },
}

/// One column of the coefficient matrix
#[derive(Debug, Clone)]
pub struct Participant {
    /// Display name, used in column ids and log messages
    pub name: String,
    pub kind: ParticipantKind,
    /// Formula contributing to the element rows, for a repeating unit just the fragment
    pub formula: Formula,
    pub charge: i32,
    pub side: Side,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Current stoichiometry of an existing reference, 0 for anything else
    pub stoichiometry: f64,
}

impl Participant {
    pub fn is_repeating_unit(&self) -> bool {
        matches!(self.kind, ParticipantKind::RepeatingUnit { .. })
    }

    pub fn is_cofactor(&self) -> bool {
        matches!(self.kind, ParticipantKind::Cofactor(_))
    }

    /// Id of the referenced species, for existing references only
    pub fn species_id(&self) -> Option<&str> {
        match &self.kind {
            ParticipantKind::Species { species_id, .. } => Some(species_id),
            _ => None,
        }
    }

    /// Value the deviation terms measure against
    ///
    /// Existing references use their current stoichiometry, or 1 when `reset`; cofactors
    /// and repeating units use 0.
    pub fn target(&self, reset: bool) -> f64 {
        match self.kind {
            ParticipantKind::Species { .. } if reset => 1.,
            ParticipantKind::Species { .. } => self.stoichiometry,
            _ => 0.,
        }
    }
}
