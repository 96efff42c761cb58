// Script runtime: the persistent sandbox and its execution contract
// (spec.md §4.F).

pub mod sandbox;

pub use sandbox::{EvalOutcome, Sandbox};
