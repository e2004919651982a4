//! Postal-code lookups against ViaCEP and BrasilAPI.
//!
//! Each provider keeps its own response shape; [`Address`] only tags which
//! one produced the record.

pub mod brasilapi;
mod http;
pub mod viacep;

use std::fmt;
use std::time::Duration;

use cep_race::Race;

pub use brasilapi::BrasilApi;
pub use viacep::ViaCep;

/// Errors setting up a provider.
#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Error {}

/// A decoded record, in the shape of the provider that returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    ViaCep(viacep::Response),
    BrasilApi(brasilapi::Response),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ViaCep(response) => write!(f, "Via CEP Response: {response}"),
            Self::BrasilApi(response) => write!(f, "Brasil API Response: {response}"),
        }
    }
}

/// A race of ViaCEP against BrasilAPI, ViaCEP registered first.
///
/// # Errors
///
/// Fails if either provider's HTTP client cannot be created.
pub fn race(timeout: Duration) -> exn::Result<Race<Address>, Error> {
    Ok(Race::new(timeout)
        .with_lookup(ViaCep::new()?)
        .with_lookup(BrasilApi::new()?))
}
