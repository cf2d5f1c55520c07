//! Named optimization knob for a worker-pool-accelerated dispatch path.
//!
//! `Bus::dispatch`/`Bus::ask` run on the calling thread (sync path) or a
//! single spawned task (async path) — see `bus::deliver` and `query::ask`.
//! A pool that fans a single dispatch out across a fixed worker set instead
//! is an explicit non-goal of the core bus; this module exists only so the
//! shape of that knob is a named, stable type the core can grow into later
//! rather than something bolted on ad hoc.

pub mod pool;
