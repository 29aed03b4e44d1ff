// transport.rs

use std::{future::Future, net::SocketAddr};

use anyhow::{anyhow, bail};
use log::*;
use tokio::net::{lookup_host, UdpSocket};

use crate::coap::{self, Destination, MessageClass, MessageType, MAX_MESSAGE};

/// One reporting session towards the configured destination.
pub trait Transport {
    /// Issues one confirmable PUT and resolves with the response code.
    /// Unbounded; the caller owns the timeout.
    fn put(&mut self, uri: &str, payload: &[u8]) -> impl Future<Output = anyhow::Result<MessageClass>>;

    /// Drops whatever session state is open.
    fn close(&mut self) -> impl Future<Output = ()>;
}

pub struct CoapTransport {
    socket: Option<(UdpSocket, SocketAddr)>,
    msg_id: u16,
}

impl CoapTransport {
    /// `seed` picks the first message id; use something that differs per boot.
    pub fn new(seed: u16) -> Self {
        CoapTransport {
            socket: None,
            msg_id: seed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn next_id(&mut self) -> u16 {
        self.msg_id = self.msg_id.wrapping_add(1);
        self.msg_id
    }

    async fn open(&mut self, dest: &Destination) -> anyhow::Result<&UdpSocket> {
        let addr = lookup_host((dest.host.as_str(), dest.port))
            .await?
            .next()
            .ok_or_else(|| anyhow!("{} did not resolve", dest.host))?;

        let reuse = matches!(&self.socket, Some((_, peer)) if *peer == addr);
        if !reuse {
            let local = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(addr).await?;
            info!("CoAP session to {addr}");
            self.socket = Some((socket, addr));
        }
        match &self.socket {
            Some((s, _)) => Ok(s),
            None => bail!("CoAP socket vanished"),
        }
    }
}

impl Transport for CoapTransport {
    async fn put(&mut self, uri: &str, payload: &[u8]) -> anyhow::Result<MessageClass> {
        let dest = Destination::parse(uri)?;
        let msg_id = self.next_id();
        let token = msg_id.to_be_bytes();
        let req = coap::put_request(msg_id, &token, &dest, payload)?;

        let socket = self.open(&dest).await?;
        socket.send(&req).await?;
        debug!("CoAP PUT #{msg_id} sent, {} bytes", req.len());

        let mut buf = [0u8; MAX_MESSAGE];
        loop {
            let n = socket.recv(&mut buf).await?;
            let msg = match coap::parse_reply(&buf[..n]) {
                Ok(m) => m,
                Err(e) => {
                    debug!("CoAP ignoring datagram: {e:#}");
                    continue;
                }
            };
            let id = msg.header.message_id;
            let code = msg.header.code;

            match msg.header.get_type() {
                MessageType::Acknowledgement if id == msg_id => {
                    if code == MessageClass::Empty {
                        debug!("CoAP #{msg_id} acknowledged, waiting for separate response");
                        continue;
                    }
                    return Ok(code);
                }
                MessageType::Reset if id == msg_id => {
                    bail!("CoAP #{msg_id} reset by peer");
                }
                t @ (MessageType::Confirmable | MessageType::NonConfirmable) if msg.get_token() == &token[..] => {
                    if t == MessageType::Confirmable {
                        socket.send(&coap::empty_ack(id)?).await?;
                    }
                    return Ok(code);
                }
                t => debug!("CoAP ignoring unrelated {t:?} #{id}"),
            }
        }
    }

    async fn close(&mut self) {
        if let Some((_, peer)) = self.socket.take() {
            info!("CoAP session to {peer} closed");
        }
    }
}


// EOF
