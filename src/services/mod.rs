//! Service layer — the realtime engine and its storage seams.
//!
//! `session`, `presence`, and `replay` are the live engine; `event` and
//! `board` own Postgres; `auth` owns accounts and tokens. Routes stay thin
//! and call down into here.

pub mod auth;
pub mod board;
pub mod event;
pub mod presence;
pub mod replay;
pub mod session;
