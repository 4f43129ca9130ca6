//! Process wiring: local chain, consumer gateway and relay under one shutdown.

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::chain::{LocalChain, SignedClient};
use crate::config::Config;
use crate::error::{OracleError, Result};
use crate::fetcher::OpenMeteoClient;
use crate::gateway::{bind_gateway, serve_gateway};
use crate::relay::Relay;

/// Run the oracle until `shutdown` fires.
///
/// The relay and the gateway share the same chain; the function returns once
/// both have stopped. The gateway follows the relay down if it fails.
pub async fn run_oracle(config: Config, shutdown: watch::Receiver<()>) -> Result<()> {
    config.validate()?;
    let ledger_config = config.ledger_config()?;
    let relayer_key = config.relayer_key()?.to_string();

    log::info!("Ledger {} (fee {})", ledger_config.address, ledger_config.fee);
    log::info!("Relayer {}", ledger_config.relayer);
    log::info!("Weather provider {}", config.weather.base_url);

    let chain = Arc::new(LocalChain::new(ledger_config));
    let client = Arc::new(SignedClient::from_key(chain.clone(), &relayer_key));
    let source = Arc::new(OpenMeteoClient::new(&config.weather)?);
    let relay = Relay::new(client, source, &config.relay);

    // A taken port fails startup before the relay starts.
    let listener = bind_gateway(&config.rpc.listen_addr()).await?;

    log::info!("Weather oracle running. Press Ctrl+C to exit.");
    run_with_gateway(relay.run(shutdown), listener, chain).await?;
    log::info!("Weather oracle stopped.");
    Ok(())
}

/// Drive `relay` to completion while the gateway serves `chain` on `listener`.
///
/// The gateway is stopped as soon as the relay returns, whether it stopped
/// cleanly or with an error.
pub async fn run_with_gateway<F>(
    relay: F,
    listener: TcpListener,
    chain: Arc<LocalChain>,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let (gateway_stop, gateway_stop_rx) = watch::channel(());
    let gateway_task = tokio::spawn(serve_gateway(listener, chain, gateway_stop_rx));

    let relay_result = relay.await;
    if let Err(e) = &relay_result {
        log::error!("Relay stopped with error: {}", e);
    }
    // Ignored when the gateway already exited on its own.
    let _ = gateway_stop.send(());

    let gateway_result = gateway_task
        .await
        .map_err(|e| OracleError::Runtime(format!("gateway task: {}", e)))?;

    relay_result?;
    gateway_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle_ledger::{Address, LedgerConfig};
    use std::time::Duration;

    fn chain() -> Arc<LocalChain> {
        Arc::new(LocalChain::new(LedgerConfig {
            address: Address::new([0xc0; 20]),
            relayer: Address::from_key("runner-test"),
            fee: 0,
        }))
    }

    #[tokio::test]
    async fn failed_relay_stops_gateway() {
        let listener = bind_gateway("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = async { Err(OracleError::Runtime("relay failed".to_string())) };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_with_gateway(relay, listener, chain()),
        )
        .await
        .expect("gateway kept running after the relay stopped");

        assert!(matches!(result, Err(OracleError::Runtime(ref m)) if m == "relay failed"));
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn finished_relay_stops_gateway() {
        let listener = bind_gateway("127.0.0.1:0").await.unwrap();
        let relay = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_with_gateway(relay, listener, chain()),
        )
        .await
        .expect("gateway kept running after the relay stopped");
        assert!(result.is_ok());
    }
}
