// Mock hardware for duty-cycle scenarios. A `World` outlives boots the same way
// the access point and the collector outlive the node's power cycles.
#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::bail;
use tempnode::{
    coap::{MessageClass, ResponseType},
    *,
};

pub const AP: ApCacheEntry = ApCacheEntry {
    channel: 6,
    bssid: [0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0x01],
};

#[derive(Clone, Debug)]
pub enum Reply {
    Code(MessageClass),
    Hang,
    Fail,
}

#[derive(Debug)]
pub struct WorldState {
    pub ap: ApCacheEntry,
    pub ap_up: bool,
    pub reply: Reply,
    pub stop_delay: Duration,
    pub stop_delay_once: bool,

    pub configures: Vec<Option<ApCacheEntry>>,
    pub starts: u32,
    pub connects: u32,
    pub scans: u32,
    pub cached_joins: u32,
    pub disconnects: u32,
    pub stops: u32,
    pub sent: Vec<String>,
    pub closes: u32,
    pub reads: u32,
}

#[derive(Clone)]
pub struct World(Arc<Mutex<WorldState>>);

impl World {
    pub fn new() -> Self {
        World(Arc::new(Mutex::new(WorldState {
            ap: AP,
            ap_up: true,
            reply: Reply::Code(MessageClass::Response(ResponseType::Changed)),
            stop_delay: Duration::ZERO,
            stop_delay_once: false,
            configures: Vec::new(),
            starts: 0,
            connects: 0,
            scans: 0,
            cached_joins: 0,
            disconnects: 0,
            stops: 0,
            sent: Vec::new(),
            closes: 0,
            reads: 0,
        })))
    }

    pub fn get(&self) -> MutexGuard<'_, WorldState> {
        self.0.lock().unwrap()
    }
}

pub struct MockRadio {
    world: World,
    hint: Option<ApCacheEntry>,
}

impl MockRadio {
    pub fn new(world: &World) -> Self {
        MockRadio {
            world: world.clone(),
            hint: None,
        }
    }
}

impl Radio for MockRadio {
    async fn configure(&mut self, _config: &NodeConfig, hint: Option<ApCacheEntry>) -> anyhow::Result<()> {
        self.world.get().configures.push(hint);
        self.hint = hint;
        Ok(())
    }

    async fn start(&mut self) -> anyhow::Result<()> {
        self.world.get().starts += 1;
        Ok(())
    }

    async fn connect(&mut self) -> anyhow::Result<ApCacheEntry> {
        let mut w = self.world.get();
        w.connects += 1;
        if self.hint.is_none() {
            w.scans += 1;
        }
        if !w.ap_up {
            bail!("no AP found");
        }
        match self.hint {
            Some(h) if h == w.ap => {
                w.cached_joins += 1;
                Ok(h)
            }
            Some(h) => bail!("no beacon on {h}"),
            None => Ok(w.ap),
        }
    }

    async fn disconnect(&mut self) -> anyhow::Result<()> {
        self.world.get().disconnects += 1;
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        let delay = {
            let mut w = self.world.get();
            w.stops += 1;
            let d = w.stop_delay;
            if w.stop_delay_once {
                w.stop_delay = Duration::ZERO;
            }
            d
        };
        sleep(delay).await;
        Ok(())
    }
}

pub struct MockTransport {
    world: World,
}

impl MockTransport {
    pub fn new(world: &World) -> Self {
        MockTransport { world: world.clone() }
    }
}

impl Transport for MockTransport {
    async fn put(&mut self, _uri: &str, payload: &[u8]) -> anyhow::Result<MessageClass> {
        let reply = {
            let mut w = self.world.get();
            w.sent.push(String::from_utf8_lossy(payload).into_owned());
            w.reply.clone()
        };
        match reply {
            Reply::Code(c) => Ok(c),
            Reply::Hang => std::future::pending().await,
            Reply::Fail => bail!("host unreachable"),
        }
    }

    async fn close(&mut self) {
        self.world.get().closes += 1;
    }
}

pub struct MockSensor {
    world: World,
    script: VecDeque<f32>,
    fallback: f32,
}

impl MockSensor {
    pub fn new(world: &World, script: &[f32], fallback: f32) -> Self {
        MockSensor {
            world: world.clone(),
            script: script.iter().copied().collect(),
            fallback,
        }
    }

    pub fn steady(world: &World, value: f32) -> Self {
        Self::new(world, &[], value)
    }
}

impl TempSensor for MockSensor {
    fn fix_configuration(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn read_temperature(&mut self) -> anyhow::Result<f32> {
        self.world.get().reads += 1;
        Ok(self.script.pop_front().unwrap_or(self.fallback))
    }
}

pub fn provision(flash: &MemStore, tweak: impl FnOnce(&mut NodeConfig)) -> NodeConfig {
    let mut cfg = NodeConfig {
        wifi_ssid: "attic-ap".into(),
        wifi_pass: "hunter22".into(),
        station_name: "attic".into(),
        use_celsius: true,
        poll_interval: 600,
        dest_uri: "coap://192.0.2.10/temp".into(),
        use_ap_cache: true,
        ..NodeConfig::default()
    };
    tweak(&mut cfg);
    cfg.to_nvs(&mut flash.clone()).unwrap();
    cfg
}

/// Everything a fresh power-on has: what flash holds, nothing else.
pub fn power_on(flash: &MemStore) -> Arc<NodeState> {
    let config = NodeConfig::from_nvs(&mut flash.clone()).expect("provisioned config");
    Arc::new(NodeState::new(config, Tunables::default()))
}

pub async fn boot(
    flash: &MemStore,
    world: &World,
    sensor: MockSensor,
) -> (Arc<NodeState>, anyhow::Result<Duration>) {
    let state = power_on(flash);
    let res = run_boot(
        state.clone(),
        sensor,
        MockRadio::new(world),
        MockTransport::new(world),
        flash.clone(),
    )
    .await;
    (state, res)
}

pub fn cached(flash: &MemStore) -> Option<ApCacheEntry> {
    ApCache::load(flash.clone()).entry()
}

pub fn assert_near(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(10),
        "expected about {expected:?}, got {actual:?}"
    );
}
