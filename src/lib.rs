//! Auris Tools
//!
//! Thin async clients for the services a document-processing worker talks
//! to: S3 object storage, DynamoDB items, Textract text detection jobs and
//! Gemini text generation. Each backend sits behind a narrow trait so the
//! handlers can run against in-memory substitutes.

pub mod app_state;
pub mod config;
pub mod models;
pub mod services;
pub mod util;
