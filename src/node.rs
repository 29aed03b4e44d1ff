// node.rs

use std::sync::Arc;

use anyhow::bail;
use log::*;
use tokio::time::Duration;

use crate::*;

/// Runs one boot: both units side by side until the sampling unit decides
/// to power off. Returns the deep-sleep duration; the caller must then cut
/// power, which discards everything this function built.
pub async fn run_boot<Se, R, T, S>(
    state: Arc<NodeState>,
    sensor: Se,
    radio: R,
    transport: T,
    store: S,
) -> anyhow::Result<Duration>
where
    Se: TempSensor,
    R: Radio,
    T: Transport,
    S: KvStore,
{
    info!(
        "Boot: station {:?}, poll interval {} s, reporting to {}",
        state.config.station_name, state.config.poll_interval, state.config.dest_uri
    );

    let (tx, rx) = command_channel();
    let network = NetworkUnit::new(state.clone(), radio, transport, ApCache::load(store), rx);
    let sampling = SamplingUnit::new(state.clone(), sensor, NetHandle::new(state, tx));

    tokio::select! {
        res = Box::pin(sampling.run()) => res,
        res = Box::pin(network.run()) => {
            error!("network unit ended.");
            res?;
            bail!("network unit ended unexpectedly")
        }
    }
}

// EOF
