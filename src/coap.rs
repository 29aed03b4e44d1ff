// coap.rs
//
// The one CoAP exchange per cycle: build a confirmable PUT, read the answer.

use anyhow::{anyhow, bail};
use coap_lite::{CoapOption, ContentFormat, RequestType};
use percent_encoding::percent_decode_str;
use url::Url;

pub use coap_lite::{MessageClass, MessageType, Packet, ResponseType};

pub const COAP_DEFAULT_PORT: u16 = 5683;
pub const MAX_MESSAGE: usize = 256;

/// Response class 2 (2.xx) is the only success.
pub fn is_success(code: MessageClass) -> bool {
    matches!(code, MessageClass::Response(_)) && u8::from(code) >> 5 == 2
}

/// Dotted form used on the wire docs and in logs, e.g. `2.04`.
pub fn code_text(code: MessageClass) -> String {
    let c = u8::from(code);
    format!("{}.{:02}", c >> 5, c & 0x1f)
}

/// Where readings go, parsed from `coap://host[:port]/path[?query]`.
/// Path segments and query items are kept percent-decoded, one per option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub path: Vec<String>,
    pub query: Vec<String>,
}

fn decode_part(part: &str) -> anyhow::Result<String> {
    Ok(percent_decode_str(part)
        .decode_utf8()
        .map_err(|e| anyhow!("bad percent-encoding in {part:?}: {e}"))?
        .into_owned())
}

impl Destination {
    pub fn parse(uri: &str) -> anyhow::Result<Self> {
        let url = Url::parse(uri)?;
        if url.scheme() != "coap" {
            bail!("unsupported scheme {:?} in {uri:?}", url.scheme());
        }
        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']'),
            _ => bail!("no host in {uri:?}"),
        };
        let path = match url.path_segments() {
            Some(segs) => segs
                .filter(|s| !s.is_empty())
                .map(decode_part)
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let query = match url.query() {
            Some(q) => q
                .split('&')
                .filter(|s| !s.is_empty())
                .map(decode_part)
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Destination {
            host: host.to_string(),
            port: url.port().unwrap_or(COAP_DEFAULT_PORT),
            path,
            query,
        })
    }
}

/// Confirmable PUT of a text/plain payload.
pub fn put_request(msg_id: u16, token: &[u8], dest: &Destination, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Confirmable);
    packet.header.code = MessageClass::Request(RequestType::Put);
    packet.header.message_id = msg_id;
    packet.set_token(token.to_vec());
    for seg in &dest.path {
        packet.add_option(CoapOption::UriPath, seg.as_bytes().to_vec());
    }
    for item in &dest.query {
        packet.add_option(CoapOption::UriQuery, item.as_bytes().to_vec());
    }
    packet.set_content_format(ContentFormat::TextPlain);
    packet.payload = payload.to_vec();

    let bytes = packet
        .to_bytes()
        .map_err(|e| anyhow!("cannot encode CoAP PUT: {e:?}"))?;
    if bytes.len() > MAX_MESSAGE {
        bail!("CoAP message is {} bytes, limit {MAX_MESSAGE}", bytes.len());
    }
    Ok(bytes)
}

/// Acknowledges a separate (confirmable) response.
pub fn empty_ack(msg_id: u16) -> anyhow::Result<Vec<u8>> {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Acknowledgement);
    packet.header.code = MessageClass::Empty;
    packet.header.message_id = msg_id;
    packet
        .to_bytes()
        .map_err(|e| anyhow!("cannot encode CoAP ACK: {e:?}"))
}

pub fn parse_reply(buf: &[u8]) -> anyhow::Result<Packet> {
    Packet::from_bytes(buf).map_err(|e| anyhow!("undecodable CoAP message: {e:?}"))
}


// EOF
