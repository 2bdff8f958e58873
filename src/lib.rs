//! s3bridge - synchronous, thread-safe S3 client over an async transport

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod keys;
pub mod regions;
pub mod reply;
pub mod signer;
mod xml;

pub use client::{CredentialProvider, S3Client};
pub use config::Config;
pub use error::{S3Error, S3ErrorKind};
pub use reply::S3Reply;
