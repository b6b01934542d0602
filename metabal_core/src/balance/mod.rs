//! Stoichiometric balancing of single reactions
//!
//! [`balancer::ReactionBalancer`] assembles a mixed integer problem from a reaction's
//! participants, solves it and applies the result through a [`plan::BalancePlan`].
pub mod balancer;
pub mod error;
pub mod matrix;
pub mod participant;
pub mod plan;
