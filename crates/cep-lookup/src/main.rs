use std::sync::Arc;
use std::time::Duration;

use cep_race::race::Error;
use macro_rules_attribute::apply;
use smol_macros::main;

/// How long the providers get before the race is called off.
const TIMEOUT: Duration = Duration::from_secs(1);
/// Looked up when no postal code is given on the command line.
const DEFAULT_CEP: &str = "01153000";

#[apply(main!)]
async fn main(executor: Arc<async_executor::Executor<'static>>) {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,isahc=error")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cep = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CEP.to_owned());

    let race = match cep_providers::race(TIMEOUT) {
        Ok(race) => race,
        Err(e) => {
            tracing::error!(%e, "failed to set up providers");
            return;
        }
    };

    match race.run(&executor, &cep).await {
        Ok(winner) => println!("{}", winner.record),
        Err(Error::TimedOut(_)) => println!("Erro: Timeout"),
        Err(Error::AllFailed(_)) => println!("Erro: all providers failed"),
    }
}
