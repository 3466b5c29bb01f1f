pub mod keys;
pub mod validation;
