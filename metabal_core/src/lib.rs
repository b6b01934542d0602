//! Automatic stoichiometric balancing of metabolic reactions and iterative cleanup of
//! metabolic models.
//!
//! Formulas are parsed by [`chemistry`], single reactions are balanced by
//! [`balance::balancer::ReactionBalancer`] as a mixed integer problem solved through
//! [`optimize`], and [`cleanup::cleaner::ModelCleaner`] drives the balancer over a whole
//! [`metabolic_model::model::Model`].
pub mod balance;
pub mod chemistry;
pub mod cleanup;
pub mod configuration;
pub mod metabolic_model;
pub mod optimize;
mod utils;
