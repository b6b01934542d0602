//! Chemical formulae and the cofactors used when balancing reactions

pub mod cofactor;
pub mod formula;
pub mod formula_parse;
