// flags.rs

use std::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use tokio::{
    sync::Notify,
    time::{timeout, Duration},
};

/// Conditions the network unit publishes for the sampling unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetFlag {
    PoweredOff,
    Stopping,
    Started,
    Connected,
    ConnectFailed,
    SendQueueEmpty,
    LastSendOk,
}

impl NetFlag {
    pub const ALL: [NetFlag; 7] = [
        NetFlag::PoweredOff,
        NetFlag::Stopping,
        NetFlag::Started,
        NetFlag::Connected,
        NetFlag::ConnectFailed,
        NetFlag::SendQueueEmpty,
        NetFlag::LastSendOk,
    ];

    fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u32 {
        1 << self as u32
    }

    fn mask(flags: &[NetFlag]) -> u32 {
        flags.iter().fold(0, |m, f| m | f.bit())
    }
}

/// A point in the history of `set` calls. Waits taken against a mark are
/// only satisfied by flags set after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlagMark(u32);

/// Written by the network unit only; everybody else reads and waits.
pub struct StatusFlags {
    bits: AtomicU32,
    seq: AtomicU32,
    last_set: [AtomicU32; NetFlag::ALL.len()],
    changed: Notify,
}

impl StatusFlags {
    /// Fresh-boot state: radio off, nothing queued.
    pub fn new() -> Self {
        StatusFlags {
            bits: AtomicU32::new(NetFlag::mask(&[NetFlag::PoweredOff, NetFlag::SendQueueEmpty])),
            seq: AtomicU32::new(0),
            last_set: Default::default(),
            changed: Notify::new(),
        }
    }

    pub fn set(&self, flag: NetFlag) {
        let n = self.seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_set[flag.index()].store(n, Ordering::Release);
        self.bits.fetch_or(flag.bit(), Ordering::AcqRel);
        self.changed.notify_waiters();
    }

    pub fn clear(&self, flag: NetFlag) {
        self.bits.fetch_and(!flag.bit(), Ordering::AcqRel);
    }

    pub fn is_set(&self, flag: NetFlag) -> bool {
        self.bits.load(Ordering::Acquire) & flag.bit() != 0
    }

    pub fn mark(&self) -> FlagMark {
        FlagMark(self.seq.load(Ordering::Acquire))
    }

    fn set_since(&self, flag: NetFlag, since: FlagMark) -> bool {
        self.is_set(flag) && self.last_set[flag.index()].load(Ordering::Acquire) > since.0
    }

    /// Returns false unless `flag` gets set after `since` and within `limit`.
    pub async fn wait(&self, flag: NetFlag, since: FlagMark, limit: Duration) -> bool {
        self.wait_any(&[flag], since, limit).await.is_some()
    }

    /// Waits until any of `flags` is set after `since` and reports which one
    /// was seen first in the order given, or `None` on timeout.
    pub async fn wait_any(&self, flags: &[NetFlag], since: FlagMark, limit: Duration) -> Option<NetFlag> {
        let observe = async {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            loop {
                // register before checking so a set() in between is not lost
                notified.as_mut().enable();
                if let Some(f) = flags.iter().copied().find(|f| self.set_since(*f, since)) {
                    return Some(f);
                }
                notified.as_mut().await;
                notified.set(self.changed.notified());
            }
        };
        timeout(limit, observe).await.ok().flatten()
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(NetFlag::ALL.iter().filter(|fl| self.is_set(**fl)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[test]
    fn boot_state() {
        let f = StatusFlags::new();
        assert!(f.is_set(NetFlag::PoweredOff));
        assert!(f.is_set(NetFlag::SendQueueEmpty));
        for fl in [NetFlag::Stopping, NetFlag::Started, NetFlag::Connected, NetFlag::ConnectFailed, NetFlag::LastSendOk] {
            assert!(!f.is_set(fl), "{fl:?}");
        }
    }

    #[test]
    fn flags_are_independent() {
        let f = StatusFlags::new();
        f.set(NetFlag::Connected);
        f.clear(NetFlag::PoweredOff);
        assert!(f.is_set(NetFlag::Connected));
        assert!(f.is_set(NetFlag::SendQueueEmpty));
        assert!(!f.is_set(NetFlag::PoweredOff));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let f = StatusFlags::new();
        let t0 = tokio::time::Instant::now();
        assert!(!f.wait(NetFlag::Connected, f.mark(), Duration::from_secs(30)).await);
        assert!(t0.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn set_after_mark_is_seen_at_once() {
        let f = StatusFlags::new();
        let m = f.mark();
        f.set(NetFlag::PoweredOff);
        assert!(f.wait(NetFlag::PoweredOff, m, Duration::ZERO).await);
    }

    #[tokio::test(start_paused = true)]
    async fn flag_left_over_from_before_mark_does_not_count() {
        let f = Arc::new(StatusFlags::new());
        assert!(f.is_set(NetFlag::SendQueueEmpty));
        let m = f.mark();
        assert!(!f.wait(NetFlag::SendQueueEmpty, m, Duration::from_secs(10)).await);

        let setter = f.clone();
        let (seen, _) = tokio::join!(f.wait(NetFlag::SendQueueEmpty, m, Duration::from_secs(10)), async move {
            sleep(Duration::from_secs(2)).await;
            setter.set(NetFlag::SendQueueEmpty);
        });
        assert!(seen);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_flag_is_not_seen() {
        let f = StatusFlags::new();
        let m = f.mark();
        f.set(NetFlag::Connected);
        f.clear(NetFlag::Connected);
        assert!(!f.wait(NetFlag::Connected, m, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_observes_later_set() {
        let f = Arc::new(StatusFlags::new());
        let setter = f.clone();
        let m = f.mark();
        let (seen, _) = tokio::join!(f.wait(NetFlag::Connected, m, Duration::from_secs(30)), async move {
            sleep(Duration::from_secs(3)).await;
            setter.set(NetFlag::Started);
            sleep(Duration::from_secs(1)).await;
            setter.set(NetFlag::Connected);
        });
        assert!(seen);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_any_reports_which() {
        let f = Arc::new(StatusFlags::new());
        let setter = f.clone();
        let m = f.mark();
        let (seen, _) = tokio::join!(
            f.wait_any(&[NetFlag::Connected, NetFlag::ConnectFailed], m, Duration::from_secs(30)),
            async move {
                sleep(Duration::from_secs(2)).await;
                setter.set(NetFlag::ConnectFailed);
            }
        );
        assert_eq!(seen, Some(NetFlag::ConnectFailed));
    }
}

// EOF
