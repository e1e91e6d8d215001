//! Submission-service security primitives: nonce replay protection (C5) and
//! idempotency (C6), lifted out as standalone components per the spec (the
//! original embeds idempotency inside its tx engine; here it is checked
//! before any collaborator is invoked).

pub mod idempotency;
pub mod nonce;
