// command.rs

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::*;

/// Only a start/stop pair is ever in flight.
pub const NET_QUEUE_LEN: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NetCommand {
    Start,
    Stop,
    /// Reading already converted to the configured unit.
    Send(f32),
}

pub fn command_channel() -> (mpsc::Sender<NetCommand>, mpsc::Receiver<NetCommand>) {
    mpsc::channel(NET_QUEUE_LEN)
}

/// Producer side of the command channel, held by the sampling unit.
///
/// Each request returns the flag mark taken just before it was queued; wait
/// against that mark so only the outcome of this request can satisfy it.
pub struct NetHandle {
    state: Arc<NodeState>,
    tx: mpsc::Sender<NetCommand>,
}

impl NetHandle {
    pub fn new(state: Arc<NodeState>, tx: mpsc::Sender<NetCommand>) -> Self {
        NetHandle { state, tx }
    }

    pub async fn start(&self) -> anyhow::Result<FlagMark> {
        self.request(NetCommand::Start).await
    }

    pub async fn send(&self, value: f32) -> anyhow::Result<FlagMark> {
        self.request(NetCommand::Send(value)).await
    }

    pub async fn stop(&self) -> anyhow::Result<FlagMark> {
        self.request(NetCommand::Stop).await
    }

    async fn request(&self, cmd: NetCommand) -> anyhow::Result<FlagMark> {
        let mark = self.state.flags.mark();
        self.tx
            .send(cmd)
            .await
            .map_err(|_| anyhow!("network unit is gone, {cmd:?} not delivered"))?;
        Ok(mark)
    }
}


// EOF
