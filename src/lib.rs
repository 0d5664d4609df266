pub mod fetch;
pub mod harvest;
