//! Domain types, static catalog and the progression engines shared by the
//! LilLearner server and its API consumers.
//!
//! Everything in this crate is free of I/O: the engines take the facts they
//! need as arguments and return derived values.

pub mod achievements;
pub mod api;
pub mod catalog;
pub mod domain;
pub mod report;
pub mod stats;
pub mod streak;
pub mod voice;
pub mod xp;
