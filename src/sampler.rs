// sampler.rs

use std::sync::Arc;

use log::*;
use tokio::time::{sleep, Duration, Instant};

use crate::*;

/// What to do with the rest of the poll interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SleepPlan {
    /// The cycle overran its interval; start the next one now.
    Immediate,
    /// Power off for this long. Ends the boot.
    DeepSleep(Duration),
    /// Stay powered and wait in place.
    Delay(Duration),
}

/// Time left in the interval, or `None` if nothing is left.
pub fn remaining_interval(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

pub fn plan_sleep(interval: Duration, elapsed: Duration, deep_sleep: bool, paused: bool) -> SleepPlan {
    match remaining_interval(interval, elapsed) {
        None => SleepPlan::Immediate,
        Some(d) if deep_sleep && !paused => SleepPlan::DeepSleep(d),
        Some(d) => SleepPlan::Delay(d),
    }
}

/// Owns the duty cycle: sample, report, tear down, sleep.
pub struct SamplingUnit<Se> {
    state: Arc<NodeState>,
    sensor: Se,
    net: NetHandle,
}

impl<Se: TempSensor> SamplingUnit<Se> {
    pub fn new(state: Arc<NodeState>, sensor: Se, net: NetHandle) -> Self {
        SamplingUnit { state, sensor, net }
    }

    /// Loops over cycles until one ends in deep sleep, and returns how long
    /// the node should stay powered off.
    pub async fn run(mut self) -> anyhow::Result<Duration> {
        fix_sensor_configuration(&mut self.sensor, &self.state.tunables);

        let interval = self.state.config.poll_interval();
        let mut cycle_start = self.state.booted;
        loop {
            if self.state.is_paused() {
                while self.state.is_paused() {
                    // all processing paused, just sleep for a long time
                    sleep(self.state.tunables.pause_delay).await;
                }
                cycle_start = Instant::now();
            }

            self.cycle().await;

            let elapsed = cycle_start.elapsed();
            let plan = plan_sleep(
                interval,
                elapsed,
                self.state.deep_sleep_enabled(),
                self.state.is_paused(),
            );
            info!(
                "Poll interval {} s, cycle took {} ms: {plan:?}",
                interval.as_secs(),
                elapsed.as_millis()
            );

            match plan {
                SleepPlan::Immediate => {
                    warn!("We took longer to send our result than our interval time - not sleeping");
                }
                // console commands may have arrived since the plan was made
                SleepPlan::DeepSleep(d)
                    if self.state.deep_sleep_enabled() && !self.state.is_paused() =>
                {
                    warn!("Deep sleep for {} us.", d.as_micros());
                    return Ok(d);
                }
                SleepPlan::DeepSleep(d) | SleepPlan::Delay(d) => {
                    warn!("Normal sleep for {} us.", d.as_micros());
                    sleep(d).await;
                }
            }
            cycle_start = Instant::now();
            info!("Waking up");
        }
    }

    /// One sample-and-report pass. Never skips the teardown.
    pub async fn cycle(&mut self) {
        let t = &self.state.tunables;
        let flags = &self.state.flags;

        info!("Starting temperature sampling.");
        let started = Instant::now();
        let sample = sample_temperature(&mut self.sensor, t, self.state.config.use_celsius);
        info!("Temperature acquisition took {} ms.", started.elapsed().as_millis());

        if let Some(v) = sample {
            self.state.set_last_sample(v);
            warn!("Read temp: {v:.1}°{}", self.state.config.unit_suffix());
        }

        info!("Waiting for WiFi");
        let connected = match self.net.start().await {
            Ok(mark) => matches!(
                flags
                    .wait_any(&[NetFlag::Connected, NetFlag::ConnectFailed], mark, t.connect_wait)
                    .await,
                Some(NetFlag::Connected)
            ),
            Err(e) => {
                error!("{e:#}");
                false
            }
        };

        if !connected {
            warn!("Timeout waiting for WiFi to come up.");
        } else if let Some(v) = sample {
            match self.net.send(v).await {
                Ok(mark) => {
                    info!("Waiting for message to send.");
                    if !flags.wait(NetFlag::SendQueueEmpty, mark, t.send_wait).await {
                        warn!("Timeout waiting for message to send.");
                    } else if !flags.is_set(NetFlag::LastSendOk) {
                        warn!("Reading was not accepted this cycle.");
                    }
                }
                Err(e) => error!("{e:#}"),
            }
        } else {
            error!("Temperature read invalid - not doing anything.");
        }

        info!("Waiting for WiFi off.");
        match self.net.stop().await {
            Ok(mark) => {
                if !flags.wait(NetFlag::PoweredOff, mark, t.poweroff_wait).await {
                    warn!("Timeout waiting for WiFi to come down.");
                }
            }
            Err(e) => error!("{e:#}"),
        }
    }
}


// EOF
