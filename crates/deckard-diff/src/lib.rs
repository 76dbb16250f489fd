//! Numstat parsing and change-magnitude scoring.
//!
//! Parses `git diff --numstat` output into a [`deckard_core::Diff`] and maps
//! it to a scalar score through a pluggable [`score::Scorer`].

pub mod numstat;
pub mod score;
