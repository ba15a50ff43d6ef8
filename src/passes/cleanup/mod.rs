//! Generic cleaning passes.

pub mod inline_fields;
pub mod inline_methods;
pub mod remove_unused;
pub mod simplify_bits;
pub mod strip_attributes;

pub use inline_fields::InlineConstantFields;
pub use inline_methods::InlineTrivialMethods;
pub use remove_unused::RemoveUnusedClasses;
pub use simplify_bits::SimplifyBitOperations;
pub use strip_attributes::StripAttributes;
