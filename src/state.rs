// state.rs

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::time::Instant;

use crate::*;

/// Everything both units and the console share during one boot.
/// None of it outlives a power cycle.
pub struct NodeState {
    pub config: NodeConfig,
    pub tunables: Tunables,
    pub flags: StatusFlags,
    pub booted: Instant,
    paused: AtomicBool,
    deep_sleep: AtomicBool,
    reset: AtomicBool,
    last_sample: AtomicU32,
}

impl NodeState {
    pub fn new(config: NodeConfig, tunables: Tunables) -> Self {
        NodeState {
            config,
            tunables,
            flags: StatusFlags::new(),
            booted: Instant::now(),
            paused: AtomicBool::new(false),
            deep_sleep: AtomicBool::new(true),
            reset: AtomicBool::new(false),
            last_sample: AtomicU32::new(NO_TEMP.to_bits()),
        }
    }

    /// Holds sampling after the cycle in progress, which still runs to its
    /// teardown. From then on no new cycle starts and the node stays powered
    /// until the next restart.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn disable_deep_sleep(&self) {
        self.deep_sleep.store(false, Ordering::Release);
    }

    pub fn deep_sleep_enabled(&self) -> bool {
        self.deep_sleep.load(Ordering::Acquire)
    }

    pub fn request_restart(&self) {
        self.reset.store(true, Ordering::Release);
    }

    pub fn restart_requested(&self) -> bool {
        self.reset.load(Ordering::Acquire)
    }

    pub fn set_last_sample(&self, value: f32) {
        self.last_sample.store(value.to_bits(), Ordering::Release);
    }

    /// Last reported reading in the configured unit, if this boot has one.
    pub fn last_sample(&self) -> Option<f32> {
        let v = f32::from_bits(self.last_sample.load(Ordering::Acquire));
        (v > NO_TEMP).then_some(v)
    }
}

// EOF
