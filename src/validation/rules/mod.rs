pub mod categories;
pub mod constraints;
