use std::time::Duration;

use cep_race::cancel::Signal;
use cep_race::lookup::{until_cancelled, Error};
use exn::ResultExt;
use isahc::prelude::*;
use isahc::{HttpClient, Request};
use serde::de::DeserializeOwned;

/// Upper bound for one exchange, independent of the race deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const USER_AGENT: &str = concat!("cep-lookup/", env!("CARGO_PKG_VERSION"));

/// GET `url` and decode the body as `T`.
///
/// The status code is logged but not interpreted: providers describe errors
/// in JSON bodies, and those are decoded like any other. Resolves to
/// [`Error::Cancelled`] as soon as `cancel` fires, dropping the transfer.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &HttpClient,
    provider: &str,
    url: &str,
    cancel: &Signal,
) -> exn::Result<T, Error> {
    let request = Request::get(url)
        .timeout(REQUEST_TIMEOUT)
        .header("User-Agent", USER_AGENT)
        .header("Accept", "application/json")
        .body(())
        .or_raise(|| Error::Request(format!("build GET {url}")))?;

    futures_lite::future::or(
        exchange(client, provider, url, request),
        until_cancelled(cancel),
    )
    .await
}

async fn exchange<T: DeserializeOwned>(
    client: &HttpClient,
    provider: &str,
    url: &str,
    request: Request<()>,
) -> exn::Result<T, Error> {
    let mut response = client
        .send_async(request)
        .await
        .or_raise(|| Error::Transport(format!("GET {url}")))?;
    tracing::debug!(provider, status = %response.status(), "response received");

    let body = response
        .text()
        .await
        .or_raise(|| Error::Body(format!("read body of GET {url}")))?;
    let decoded = serde_json::from_str(&body)
        .or_raise(|| Error::Decode(format!("{provider} response")))?;
    Ok(decoded)
}
