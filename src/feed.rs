//! Push/pull distribution of readings and alerts.
//!
//! Callbacks are invoked outside the internal lock, so a subscriber may call
//! back into the feed (e.g. `latest()` or `unsubscribe()`) without deadlock.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crate::alerts::Alert;
use crate::types::SentimentReading;

pub type ReadingCallback = Arc<dyn Fn(&SentimentReading) + Send + Sync>;
pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

#[derive(Default)]
struct FeedInner {
    next_id: u64,
    readings: BTreeMap<u64, ReadingCallback>,
    alerts: BTreeMap<u64, AlertCallback>,
    latest: Option<SentimentReading>,
    latest_by_symbol: BTreeMap<String, SentimentReading>,
    published: u64,
}

/// Cloneable handle; all clones share subscribers and the latest reading.
#[derive(Clone, Default)]
pub struct SentimentFeed {
    inner: Arc<Mutex<FeedInner>>,
}

impl std::fmt::Debug for SentimentFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentFeed")
            .field("subscribers", &self.subscriber_count())
            .field("published", &self.published())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Readings,
    Alerts,
}

/// Live subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    feed: Weak<Mutex<FeedInner>>,
    id: u64,
    channel: Channel,
    active: bool,
}

impl Subscription {
    /// Stop receiving. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.feed.upgrade() {
            if let Ok(mut g) = inner.lock() {
                match self.channel {
                    Channel::Readings => {
                        g.readings.remove(&self.id);
                    }
                    Channel::Alerts => {
                        g.alerts.remove(&self.id);
                    }
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active && self.feed.strong_count() > 0
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl SentimentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscription(&self, id: u64, channel: Channel) -> Subscription {
        Subscription {
            feed: Arc::downgrade(&self.inner),
            id,
            channel,
            active: true,
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SentimentReading) + Send + Sync + 'static,
    {
        let id = match self.inner.lock() {
            Ok(mut g) => {
                g.next_id += 1;
                let id = g.next_id;
                g.readings.insert(id, Arc::new(callback));
                id
            }
            Err(_) => 0,
        };
        self.subscription(id, Channel::Readings)
    }

    pub fn subscribe_alerts<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        let id = match self.inner.lock() {
            Ok(mut g) => {
                g.next_id += 1;
                let id = g.next_id;
                g.alerts.insert(id, Arc::new(callback));
                id
            }
            Err(_) => 0,
        };
        self.subscription(id, Channel::Alerts)
    }

    /// Record `reading` as latest and deliver it to every subscriber.
    pub fn publish(&self, reading: &SentimentReading) {
        let callbacks: Vec<ReadingCallback> = match self.inner.lock() {
            Ok(mut g) => {
                g.latest = Some(reading.clone());
                g.latest_by_symbol.insert(reading.symbol.clone(), reading.clone());
                g.published += 1;
                g.readings.values().cloned().collect()
            }
            Err(_) => return,
        };
        for cb in callbacks {
            cb(reading);
        }
    }

    pub fn publish_alert(&self, alert: &Alert) {
        let callbacks: Vec<AlertCallback> = match self.inner.lock() {
            Ok(g) => g.alerts.values().cloned().collect(),
            Err(_) => return,
        };
        for cb in callbacks {
            cb(alert);
        }
    }

    /// Most recently published reading across all symbols.
    pub fn latest(&self) -> Option<SentimentReading> {
        self.inner.lock().ok().and_then(|g| g.latest.clone())
    }

    pub fn latest_for(&self, symbol: &str) -> Option<SentimentReading> {
        self.inner
            .lock()
            .ok()
            .and_then(|g| g.latest_by_symbol.get(symbol).cloned())
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|g| g.readings.len() + g.alerts.len())
            .unwrap_or(0)
    }

    pub fn published(&self) -> u64 {
        self.inner.lock().map(|g| g.published).unwrap_or(0)
    }
}
