//! HTTP-level tests: real routes, real SQLite backend, programmable verifier. These exercise the full
//! request-to-status-code path, including identity extraction and the error-to-code mapping.

mod helpers;
mod orders;
mod payments;
