//! Module providing the Model struct for representing a metabolic model.

pub mod metabolite;
pub mod model;
pub mod reaction;

/// SBO term of a simple chemical
pub const SIMPLE_CHEMICAL: u32 = 247;
/// SBO term of an omitted biological process, such reactions are never balanced
pub const OMITTED_PROCESS: u32 = 397;
