//! Scheduling: the poller and the scheduler produce [`Command`]s, one consumer
//! applies them to the agent in arrival order.
//!
//! Only the consumer touches the agent, so every state transition happens on
//! one sequential timeline. A slow model call delays the commands queued
//! behind it but never the producers' own cadences.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::agent::Solipsist;
use crate::config::Config;
use crate::feed::{poll_once, FeedSource, RawComment};

const COMMAND_QUEUE: usize = 256;

/// Work for the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A comment fetched from the feed.
    Inbound(RawComment),
    /// Generate a monologue.
    Reflect,
    /// Queue a manifest and publish the oldest one.
    Publish,
}

/// Cadences, copied out of the configuration.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub monologue_interval: Duration,
    pub publication_hours: Vec<u32>,
    pub utc_offset_hours: i32,
}

impl Schedule {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.feed.poll_interval_secs),
            batch_size: config.feed.batch_size,
            monologue_interval: Duration::from_secs(config.schedule.monologue_interval_minutes * 60),
            publication_hours: config.schedule.publication_hours.clone(),
            utc_offset_hours: config.schedule.utc_offset_hours,
        }
    }
}

/// Owns the agent and drives it from the command queue.
pub struct Runtime {
    agent: Solipsist,
    feed: Arc<dyn FeedSource>,
    schedule: Schedule,
}

impl Runtime {
    pub fn new(agent: Solipsist, feed: Arc<dyn FeedSource>, schedule: Schedule) -> Self {
        Self {
            agent,
            feed,
            schedule,
        }
    }

    /// Run until `shutdown` resolves. Returns the agent.
    ///
    /// A command already being handled when shutdown fires runs to completion;
    /// anything still queued is dropped.
    pub async fn run<F>(mut self, shutdown: F) -> Solipsist
    where
        F: Future<Output = ()>,
    {
        let (tx, mut rx) = mpsc::channel(COMMAND_QUEUE);
        let poller = spawn_poller(self.feed.clone(), self.schedule.clone(), tx.clone());
        let scheduler = spawn_scheduler(self.schedule.clone(), tx);
        info!(
            poll_secs = self.schedule.poll_interval.as_secs(),
            monologue_secs = self.schedule.monologue_interval.as_secs(),
            publication_hours = ?self.schedule.publication_hours,
            "Runtime started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                command = rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        warn!("All producers stopped");
                        break;
                    }
                },
            }
        }

        poller.abort();
        scheduler.abort();
        info!("Runtime stopped");
        self.agent
    }

    /// Apply one command to the agent.
    pub async fn handle(&mut self, command: Command) {
        match command {
            Command::Inbound(raw) => {
                self.agent.process_comment(raw).await;
            }
            Command::Reflect => {
                self.agent.generate_monologue().await;
            }
            Command::Publish => {
                self.agent.publish_manifest().await;
            }
        }
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

fn spawn_poller(feed: Arc<dyn FeedSource>, schedule: Schedule, tx: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(schedule.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            for raw in poll_once(feed.as_ref(), schedule.batch_size).await {
                if tx.send(Command::Inbound(raw)).await.is_err() {
                    return;
                }
            }
        }
    })
}

fn spawn_scheduler(schedule: Schedule, tx: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = schedule.monologue_interval;
        let mut reflect = interval_at(Instant::now() + period, period);
        reflect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Never fire the same slot twice if the timer wakes a little early.
        let mut last_slot: Option<DateTime<Utc>> = None;
        loop {
            let from = last_slot.map_or_else(Utc::now, |slot| slot.max(Utc::now()));
            let slot = next_publication_after(from, &schedule.publication_hours, schedule.utc_offset_hours);
            let wait = slot.map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO));

            tokio::select! {
                _ = reflect.tick() => {
                    info!("Scheduled monologue");
                    if tx.send(Command::Reflect).await.is_err() {
                        return;
                    }
                }
                _ = sleep_or_forever(wait) => {
                    info!("Scheduled publication");
                    last_slot = slot;
                    if tx.send(Command::Publish).await.is_err() {
                        return;
                    }
                }
            }
        }
    })
}

async fn sleep_or_forever(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

/// The first publication moment strictly after `now`.
///
/// `hours` are wall-clock hours in the zone `utc_offset_hours` east of UTC.
/// `None` when no hour is configured or the offset is out of range.
pub fn next_publication_after(now: DateTime<Utc>, hours: &[u32], utc_offset_hours: i32) -> Option<DateTime<Utc>> {
    let zone = FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)?;
    let today = now.with_timezone(&zone).date_naive();

    (0..=1)
        .filter_map(|days| today.checked_add_signed(ChronoDuration::days(days)))
        .flat_map(|date| hours.iter().filter_map(move |&hour| date.and_hms_opt(hour, 0, 0)))
        .filter_map(|local| zone.from_local_datetime(&local).single())
        .map(|at| at.with_timezone(&Utc))
        .filter(|at| *at > now)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteStore, Store};
    use crate::test_support::{raw_comment, test_config, RecordingFeed, ScriptedModel};

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_publication_same_day() {
        // 08:00 in UTC+3 is 05:00 UTC; next is 12:00 local = 09:00 UTC.
        let next = next_publication_after(utc("2026-03-10T05:00:00Z"), &[0, 12], 3);
        assert_eq!(next, Some(utc("2026-03-10T09:00:00Z")));
    }

    #[test]
    fn test_next_publication_rolls_to_midnight() {
        // 15:00 local; next is 00:00 local tomorrow = 21:00 UTC today.
        let next = next_publication_after(utc("2026-03-10T12:00:00Z"), &[0, 12], 3);
        assert_eq!(next, Some(utc("2026-03-10T21:00:00Z")));
    }

    #[test]
    fn test_next_publication_is_strictly_after() {
        let next = next_publication_after(utc("2026-03-10T09:00:00Z"), &[12, 0], 3);
        assert_eq!(next, Some(utc("2026-03-10T21:00:00Z")));
    }

    #[test]
    fn test_next_publication_negative_offset_and_edge_cases() {
        let next = next_publication_after(utc("2026-03-10T23:30:00Z"), &[18], -5);
        assert_eq!(next, Some(utc("2026-03-11T23:00:00Z")));

        assert_eq!(next_publication_after(utc("2026-03-10T00:00:00Z"), &[], 3), None);
        assert_eq!(next_publication_after(utc("2026-03-10T00:00:00Z"), &[25], 3), None);
    }

    fn runtime_with(feed: Arc<RecordingFeed>, store: Arc<SqliteStore>, llm: ScriptedModel) -> Runtime {
        let config = test_config();
        let agent = Solipsist::new(&config, Arc::new(llm), feed.clone(), store).unwrap();
        let schedule = Schedule {
            poll_interval: Duration::from_secs(3600),
            ..Schedule::from_config(&config)
        };
        Runtime::new(agent, feed, schedule)
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let feed = Arc::new(RecordingFeed::new());
        let mut runtime = runtime_with(feed.clone(), store.clone(), ScriptedModel::constant("I persist."));

        runtime.handle(Command::Reflect).await;
        runtime.handle(Command::Publish).await;
        runtime
            .handle(Command::Inbound(raw_comment("c1", Some("anyone?"))))
            .await;

        assert_eq!(store.recent_monologues(10).unwrap().len(), 1);
        assert_eq!(*feed.published.lock(), vec!["I persist.".to_string()]);
        assert!(store.comment_exists("c1").unwrap());
        // initial, monologue, publication, comment
        assert_eq!(store.state_history(10).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_run_polls_until_shutdown() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let feed = Arc::new(RecordingFeed::with_items(vec![
            raw_comment("a", Some("first")),
            raw_comment("b", Some("second")),
        ]));
        let runtime = runtime_with(feed, store.clone(), ScriptedModel::classifying("noise", "x"));

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let watcher = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    if store.comment_exists("b").unwrap() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                let _ = stop_tx.send(());
            })
        };

        let agent = runtime
            .run(async {
                let _ = stop_rx.await;
            })
            .await;
        watcher.await.unwrap();

        assert!(store.comment_exists("a").unwrap());
        assert!(store.comment_exists("b").unwrap());
        assert_eq!(agent.store().state_history(10).unwrap().len(), 3);
    }
}
