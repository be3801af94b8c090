//! Runtime engine: the path tree, word-by-word text simulation, CTC
//! prefix-beam search, and the action executor that drives grammar
//! callbacks as the path tree advances.

pub mod actions;
pub mod beam_search;
pub mod path_tree;
pub mod text_simulate;
pub mod token_encoding;

pub use beam_search::beam_search;
pub use text_simulate::{text_simulate, Executor};
