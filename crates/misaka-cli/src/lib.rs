//! Library half of the `misaka-cli` REPL client: the wire codec and line
//! tokenizer, kept separate from `main.rs` so they can be exercised
//! directly by tests.

pub mod resp;
pub mod tokenize;
