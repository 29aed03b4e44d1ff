// network.rs

use std::sync::Arc;

use anyhow::bail;
use log::*;
use tokio::{sync::mpsc, time::timeout};

use crate::*;

/// Text sent to the collector for one reading.
pub fn format_payload(station_name: &str, value: f32) -> String {
    format!("{station_name}: {value:.1}")
}

/// Sole consumer of the command channel. Commands run to completion one at a
/// time, so no two radio or transport operations ever overlap.
pub struct NetworkUnit<R, T, S> {
    state: Arc<NodeState>,
    radio: R,
    transport: T,
    cache: ApCache<S>,
    rx: mpsc::Receiver<NetCommand>,
    session_open: bool,
}

impl<R, T, S> NetworkUnit<R, T, S>
where
    R: Radio,
    T: Transport,
    S: KvStore,
{
    pub fn new(
        state: Arc<NodeState>,
        radio: R,
        transport: T,
        cache: ApCache<S>,
        rx: mpsc::Receiver<NetCommand>,
    ) -> Self {
        NetworkUnit {
            state,
            radio,
            transport,
            cache,
            rx,
            session_open: false,
        }
    }

    pub fn cache(&self) -> &ApCache<S> {
        &self.cache
    }

    /// Serves commands until every sender is gone.
    pub async fn run(mut self) -> anyhow::Result<()> {
        while let Some(cmd) = self.rx.recv().await {
            debug!("Network command {cmd:?}, flags {:?}", self.state.flags);
            match cmd {
                NetCommand::Start => self.handle_start().await,
                NetCommand::Stop => self.handle_stop().await,
                NetCommand::Send(value) => self.handle_send(value).await,
            }
        }
        info!("Network command channel closed.");
        Ok(())
    }

    pub async fn handle_start(&mut self) {
        let flags = &self.state.flags;
        if flags.is_set(NetFlag::Connected) {
            info!("WiFi already connected, ignoring start.");
            // report the live connection to whoever is waiting on this start
            flags.set(NetFlag::Connected);
            return;
        }
        if let Err(e) = self.state.config.validate() {
            error!("Not starting WiFi, config is invalid: {e:#}");
            return;
        }

        flags.clear(NetFlag::PoweredOff);
        flags.clear(NetFlag::ConnectFailed);
        flags.clear(NetFlag::LastSendOk);

        let mut hint = if self.state.config.use_ap_cache {
            self.cache.entry()
        } else {
            None
        };

        loop {
            match self.bring_up(hint).await {
                Ok(ap) => {
                    info!("WiFi connected to {ap}");
                    if hint.is_none() {
                        if let Err(e) = self.cache.store(ap) {
                            error!("Cannot save AP cache: {e:?}");
                        }
                    }
                    self.state.flags.set(NetFlag::Connected);
                    return;
                }
                Err(e) if hint.is_some() => {
                    // a stale entry points at an AP that moved or vanished;
                    // forget it and scan, but only once
                    warn!("WiFi connect with cached AP failed: {e:#}. Retrying with a scan.");
                    self.cache.invalidate();
                    hint = None;
                    if let Err(e) = self.radio.disconnect().await {
                        debug!("WiFi disconnect before retry: {e:?}");
                    }
                }
                Err(e) => {
                    error!("WiFi connection failed: {e:#}");
                    self.state.flags.set(NetFlag::ConnectFailed);
                    return;
                }
            }
        }
    }

    /// Configure, start if needed, then associate with a bounded number of reconnects.
    async fn bring_up(&mut self, hint: Option<ApCacheEntry>) -> anyhow::Result<ApCacheEntry> {
        self.radio.configure(&self.state.config, hint).await?;

        if !self.state.flags.is_set(NetFlag::Started) {
            self.radio.start().await?;
            self.state.flags.set(NetFlag::Started);
        }

        let reconnects = self.state.tunables.radio_reconnects;
        let mut attempt = 0;
        loop {
            match self.radio.connect().await {
                Ok(ap) => return Ok(ap),
                Err(e) if attempt < reconnects => {
                    let flags = &self.state.flags;
                    if flags.is_set(NetFlag::Stopping) || flags.is_set(NetFlag::PoweredOff) {
                        bail!("WiFi going down, not reconnecting: {e:#}");
                    }
                    attempt += 1;
                    info!("Retry to connect to the AP ({attempt}/{reconnects}): {e:#}");
                }
                Err(e) => {
                    bail!("gave up after {} attempts: {e:#}", attempt + 1);
                }
            }
        }
    }

    /// Tears down in reverse order of bring-up. Safe to call in any state.
    pub async fn handle_stop(&mut self) {
        let flags = &self.state.flags;
        flags.set(NetFlag::Stopping);

        if self.session_open {
            self.transport.close().await;
            self.session_open = false;
        }
        if flags.is_set(NetFlag::Connected) {
            if let Err(e) = self.radio.disconnect().await {
                warn!("WiFi disconnect failed: {e:?}");
            }
            flags.clear(NetFlag::Connected);
        }
        if flags.is_set(NetFlag::Started) {
            if let Err(e) = self.radio.stop().await {
                warn!("WiFi stop failed: {e:?}");
            }
            flags.clear(NetFlag::Started);
        }
        flags.clear(NetFlag::ConnectFailed);

        flags.clear(NetFlag::Stopping);
        flags.set(NetFlag::PoweredOff);
        info!("WiFi is off.");
    }

    /// One publish, no retry. Always ends with the send queue reported empty.
    pub async fn handle_send(&mut self, value: f32) {
        let flags = &self.state.flags;
        if !flags.is_set(NetFlag::Connected) {
            warn!("WiFi not connected, dropping reading {value:.1}");
            flags.set(NetFlag::SendQueueEmpty);
            return;
        }
        flags.clear(NetFlag::SendQueueEmpty);
        flags.clear(NetFlag::LastSendOk);

        let config = &self.state.config;
        let payload = format_payload(&config.station_name, value);
        let limit = self.state.tunables.ack_timeout;
        info!("Sending {payload:?} to {}", config.dest_uri);

        self.session_open = true;
        match timeout(limit, self.transport.put(&config.dest_uri, payload.as_bytes())).await {
            Ok(Ok(code)) if coap::is_success(code) => {
                info!("Send acknowledged with {}", coap::code_text(code));
                flags.set(NetFlag::LastSendOk);
            }
            Ok(Ok(code)) => warn!("Send rejected with {}", coap::code_text(code)),
            Ok(Err(e)) => error!("Send failed: {e:#}"),
            Err(_) => warn!("No acknowledgment within {} ms", limit.as_millis()),
        }
        flags.set(NetFlag::SendQueueEmpty);
    }
}


// EOF
