use std::{
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
};
use tracing::{
    debug,
    warn,
};

use super::leg::RelayLeg;
use crate::domain::events::EventPosition;

/// Widest block range requested per poll.
pub const MAX_BLOCK_RANGE: u64 = 500;

/// Items buffered between the poller and the consumer.
const CHANNEL_CAPACITY: usize = 64;

/// Item delivered to a subscription consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedItem<E> {
    Event(E),
    /// Every event up to and including this block has been delivered.
    Synced(u64),
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub poll_interval: Duration,
    /// Blocks kept between the chain head and the last block read.
    pub confirmations: u64,
}

/// Running event feed. Dropping it stops the poller.
pub struct Subscription<E> {
    pub events: mpsc::Receiver<FeedItem<E>>,
    poller: JoinHandle<()>,
}

impl<E> Subscription<E> {
    pub async fn recv(&mut self) -> Option<FeedItem<E>> {
        self.events.recv().await
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

/// Starts polling `leg` for events after `resume` (or from its start block),
/// delivering them in chain order until `shutdown` flips to true.
pub fn subscribe<L: RelayLeg>(
    leg: Arc<L>,
    resume: Option<EventPosition>,
    options: PollOptions,
    shutdown: watch::Receiver<bool>,
) -> Subscription<L::Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let poller = tokio::spawn(poll(leg, resume, options, tx, shutdown));
    Subscription {
        events: rx,
        poller,
    }
}

async fn poll<L: RelayLeg>(
    leg: Arc<L>,
    resume: Option<EventPosition>,
    options: PollOptions,
    tx: mpsc::Sender<FeedItem<L::Event>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next = match resume {
        Some(position) => position.block.max(leg.start_block()),
        None => leg.start_block(),
    };

    while !*shutdown.borrow() {
        let head = match leg.head_block().await {
            Ok(head) => head,
            Err(e) => {
                warn!(leg = L::NAME, "failed to read head block: {e}");
                if !pause(options.poll_interval, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        let Some(safe) = head.checked_sub(options.confirmations) else {
            if !pause(options.poll_interval, &mut shutdown).await {
                break;
            }
            continue;
        };
        if next > safe {
            if !pause(options.poll_interval, &mut shutdown).await {
                break;
            }
            continue;
        }

        let to = safe.min(next.saturating_add(MAX_BLOCK_RANGE - 1));
        let mut events = match leg.fetch(next, to).await {
            Ok(events) => events,
            Err(e) => {
                warn!(leg = L::NAME, from = next, to, "failed to fetch events: {e}");
                if !pause(options.poll_interval, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };
        events.sort_by_key(L::position);
        debug!(leg = L::NAME, from = next, to, count = events.len(), "polled");

        for event in events {
            if resume.is_some_and(|watermark| L::position(&event) <= watermark) {
                continue;
            }
            if tx.send(FeedItem::Event(event)).await.is_err() {
                return;
            }
        }
        if tx.send(FeedItem::Synced(to)).await.is_err() {
            return;
        }
        next = to + 1;
    }
    debug!(leg = L::NAME, "subscription stopped");
}

/// Sleeps for one poll interval. Returns false once shutdown is requested.
async fn pause(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => !*shutdown.borrow(),
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        domain::events::EventPosition,
        ports::chain::ChainError,
        relayer::leg::{
            Delivery,
            Forwarded,
        },
    };

    /// Leg over a scripted list of positions.
    struct ScriptedLeg {
        head: Mutex<u64>,
        events: Vec<EventPosition>,
    }

    impl ScriptedLeg {
        fn new(head: u64, events: Vec<EventPosition>) -> Arc<Self> {
            Arc::new(Self {
                head: Mutex::new(head),
                events,
            })
        }
    }

    impl RelayLeg for ScriptedLeg {
        type Event = EventPosition;

        const NAME: &'static str = "scripted";

        fn delivery(&self) -> Delivery {
            Delivery::AtLeastOnce
        }

        fn start_block(&self) -> u64 {
            1
        }

        async fn head_block(&self) -> Result<u64, ChainError> {
            Ok(*self.head.lock().unwrap())
        }

        async fn fetch(&self, from: u64, to: u64) -> Result<Vec<EventPosition>, ChainError> {
            // Reverse order to check the subscription sorts.
            Ok(self
                .events
                .iter()
                .rev()
                .filter(|p| (from..=to).contains(&p.block))
                .copied()
                .collect())
        }

        fn position(event: &EventPosition) -> EventPosition {
            *event
        }

        async fn forward(&self, _: &EventPosition) -> Result<Forwarded, ChainError> {
            Ok(Forwarded::Skipped)
        }
    }

    fn options(confirmations: u64) -> PollOptions {
        PollOptions {
            poll_interval: Duration::from_millis(5),
            confirmations,
        }
    }

    async fn collect_until_synced<E>(sub: &mut Subscription<E>, block: u64) -> Vec<E> {
        let mut out = Vec::new();
        loop {
            match sub.recv().await {
                Some(FeedItem::Event(e)) => out.push(e),
                Some(FeedItem::Synced(b)) if b >= block => return out,
                Some(FeedItem::Synced(_)) => {}
                None => return out,
            }
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_chain_order() {
        let leg = ScriptedLeg::new(
            3,
            vec![
                EventPosition::new(1, 0),
                EventPosition::new(2, 0),
                EventPosition::new(2, 3),
                EventPosition::new(3, 1),
            ],
        );
        let (_stop, shutdown) = watch::channel(false);
        let mut sub = subscribe(leg, None, options(0), shutdown);

        let got = collect_until_synced(&mut sub, 3).await;
        assert_eq!(
            got,
            vec![
                EventPosition::new(1, 0),
                EventPosition::new(2, 0),
                EventPosition::new(2, 3),
                EventPosition::new(3, 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_resume_skips_events_at_or_before_watermark() {
        let leg = ScriptedLeg::new(
            3,
            vec![
                EventPosition::new(1, 0),
                EventPosition::new(2, 0),
                EventPosition::new(2, 1),
                EventPosition::new(3, 0),
            ],
        );
        let (_stop, shutdown) = watch::channel(false);
        let mut sub = subscribe(leg, Some(EventPosition::new(2, 0)), options(0), shutdown);

        let got = collect_until_synced(&mut sub, 3).await;
        assert_eq!(got, vec![EventPosition::new(2, 1), EventPosition::new(3, 0)]);
    }

    #[tokio::test]
    async fn test_confirmations_hold_back_recent_blocks() {
        let leg = ScriptedLeg::new(3, vec![EventPosition::new(2, 0), EventPosition::new(3, 0)]);
        let (_stop, shutdown) = watch::channel(false);
        let mut sub = subscribe(leg.clone(), None, options(1), shutdown);

        let got = collect_until_synced(&mut sub, 2).await;
        assert_eq!(got, vec![EventPosition::new(2, 0)]);

        *leg.head.lock().unwrap() = 4;
        let got = collect_until_synced(&mut sub, 3).await;
        assert_eq!(got, vec![EventPosition::new(3, 0)]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_feed() {
        let leg = ScriptedLeg::new(1, vec![]);
        let (stop, shutdown) = watch::channel(false);
        let mut sub = subscribe(leg, None, options(0), shutdown);

        assert_eq!(sub.recv().await, Some(FeedItem::Synced(1)));
        stop.send(true).unwrap();
        while sub.recv().await.is_some() {}
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_poller() {
        let leg = ScriptedLeg::new(1, vec![]);
        let (_stop, shutdown) = watch::channel(false);
        let mut sub = subscribe(Arc::clone(&leg), None, options(0), shutdown);
        assert_eq!(sub.recv().await, Some(FeedItem::Synced(1)));

        drop(sub);
        tokio::time::timeout(Duration::from_secs(1), async {
            while Arc::strong_count(&leg) > 1 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("poller still running after the subscription was dropped");
    }
}
