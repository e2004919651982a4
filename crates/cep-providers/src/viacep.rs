use std::fmt;

use cep_race::cancel::Signal;
use cep_race::lookup::{self, Lookup, LookupFuture};
use exn::ResultExt;
use isahc::HttpClient;

use crate::{http, Address, Error};

const BASE_URL: &str = "http://viacep.com.br";

/// Address as ViaCEP spells it.
///
/// Unknown postal codes come back as `{"erro": true}`, which decodes to a
/// record with every field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct Response {
    pub cep: String,
    pub logradouro: String,
    pub complemento: String,
    pub bairro: String,
    pub localidade: String,
    pub uf: String,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{} {} {} {} {} {}}}",
            self.cep, self.logradouro, self.complemento, self.bairro, self.localidade, self.uf
        )
    }
}

/// Lookup against `viacep.com.br`, served over plain HTTP.
pub struct ViaCep {
    client: HttpClient,
    base_url: String,
}

impl ViaCep {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be created.
    pub fn new() -> exn::Result<Self, Error> {
        let client = HttpClient::new().or_raise(|| Error("create ViaCEP HTTP client".into()))?;
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
        format!("{}/ws/{key}/json/", self.base_url)
    }

    async fn lookup(&self, key: String, cancel: Signal) -> exn::Result<Address, lookup::Error> {
        let url = self.url(&key);
        let response: Response = http::get_json(&self.client, self.name(), &url, &cancel).await?;
        Ok(Address::ViaCep(response))
    }
}

impl Lookup for ViaCep {
    type Record = Address;

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ViaCEP"
    }

    fn fetch(&self, key: String, cancel: Signal) -> LookupFuture<'_, Address> {
        Box::pin(self.lookup(key, cancel))
    }
}
