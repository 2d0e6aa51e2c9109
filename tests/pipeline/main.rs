//! Outbox → relay → broker → consumer integration tests.

mod support;

mod atomic_create;
mod broker_outage;
mod dead_letter;
mod end_to_end;
mod idempotence;
