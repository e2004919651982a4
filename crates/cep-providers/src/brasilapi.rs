use std::fmt;

use cep_race::cancel::Signal;
use cep_race::lookup::{self, Lookup, LookupFuture};
use exn::ResultExt;
use isahc::HttpClient;

use crate::{http, Address, Error};

const BASE_URL: &str = "https://brasilapi.com.br";

/// Address as BrasilAPI spells it.
///
/// Error bodies (`{"message": ..., "type": ..., "name": ...}`) carry none
/// of these fields and decode to an empty record.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct Response {
    pub cep: String,
    pub state: String,
    pub city: String,
    pub neighborhood: String,
    pub street: String,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{} {} {} {} {}}}",
            self.cep, self.state, self.city, self.neighborhood, self.street
        )
    }
}

/// Lookup against the BrasilAPI CEP v1 endpoint.
pub struct BrasilApi {
    client: HttpClient,
    base_url: String,
}

impl BrasilApi {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be created.
    pub fn new() -> exn::Result<Self, Error> {
        let client =
            HttpClient::new().or_raise(|| Error("create BrasilAPI HTTP client".into()))?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_owned(),
        })
    }

    /// Point the lookup at another host, e.g. a local test server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, key: &str) -> String {
        format!("{}/api/cep/v1/{key}", self.base_url)
    }

    async fn lookup(&self, key: String, cancel: Signal) -> exn::Result<Address, lookup::Error> {
        let url = self.url(&key);
        let response: Response = http::get_json(&self.client, self.name(), &url, &cancel).await?;
        Ok(Address::BrasilApi(response))
    }
}

impl Lookup for BrasilApi {
    type Record = Address;

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "BrasilAPI"
    }

    fn fetch(&self, key: String, cancel: Signal) -> LookupFuture<'_, Address> {
        Box::pin(self.lookup(key, cancel))
    }
}
