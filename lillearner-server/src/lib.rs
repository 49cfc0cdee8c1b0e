//! LilLearner progression server: SQLite storage and the HTTP API over the
//! engines in `lillearner-shared`.

pub mod server;
pub mod storage;
