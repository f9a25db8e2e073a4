//! End-to-end tests over the spawned core

mod pipeline;
mod push;
