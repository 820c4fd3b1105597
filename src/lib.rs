//! Legacy motor catalog migration pipeline.
//!
//! Batch ETL that reads a JSON export of legacy engine listings, extracts
//! structured attributes out of Czech free-text fields, find-or-creates
//! brand reference documents, re-hosts listing images, and idempotently
//! creates normalized product documents in the content store.

pub mod assets;
pub mod brand;
pub mod document;
pub mod extract;
pub mod logging;
pub mod migrate;
pub mod store;

pub mod util {
    pub mod env;
}
