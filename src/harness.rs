use std::{
    collections::HashMap,
    fmt,
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};
use derivative::Derivative;
use humantime::format_duration;
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::sync_queue::{QueueError, SyncQueue};

#[derive(Debug, Error)]
pub enum HarnessError{
    #[error("invalid settings: {0}")]
    InvalidSettings(&'static str),
    #[error("unable to spawn thread {name}")]
    Spawn{
        name: String,
        #[source]
        source: io::Error
    },
    #[error("worker thread {0} panicked")]
    WorkerPanicked(String),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("queue is still shared after all workers were joined")]
    QueueStillShared,
    #[error("popped values differ from pushed ones: missing {missing:?}, unexpected {unexpected:?}, {leftover} left in queue")]
    Mismatch{
        missing: Vec<i32>,
        unexpected: Vec<i32>,
        leftover: usize
    }
}

/// Workload of one run. Missing fields in a json file fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Derivative, PartialEq, Eq)]
#[derivative(Default)]
#[serde(default)]
pub struct HarnessSettings{
    #[derivative(Default(value="2"))]
    pub producers: usize,
    #[derivative(Default(value="2"))]
    pub consumers: usize,
    #[derivative(Default(value="5"))]
    pub items_per_producer: usize,
    /// Pause after every push
    #[derivative(Default(value="100"))]
    pub producer_delay_ms: u64,
    /// Pause after every pop
    #[derivative(Default(value="150"))]
    pub consumer_delay_ms: u64,
    /// Pushed values are drawn from `0..max_value`
    #[derivative(Default(value="100"))]
    pub max_value: i32,
    #[derivative(Default(value="123"))]
    pub seed: u64
}

impl HarnessSettings{
    pub fn validate(&self) -> Result<(), HarnessError>
    {
        if self.producers == 0{
            return Err(HarnessError::InvalidSettings("need at least one producer"));
        }
        if self.consumers == 0{
            return Err(HarnessError::InvalidSettings("need at least one consumer"));
        }
        if self.items_per_producer == 0{
            return Err(HarnessError::InvalidSettings("items_per_producer has to be positive"));
        }
        if self.max_value <= 0{
            return Err(HarnessError::InvalidSettings("max_value has to be positive"));
        }
        if self.producers.checked_mul(self.items_per_producer).is_none(){
            return Err(HarnessError::InvalidSettings("workload too large"));
        }
        Ok(())
    }

    /// Only meaningful for settings that passed [`Self::validate`]
    pub fn total_items(&self) -> usize
    {
        self.producers * self.items_per_producer
    }

    /// Number of pops every consumer performs.
    ///
    /// The shares always add up to [`Self::total_items`], otherwise a consumer
    /// would block forever or values would be left behind.
    pub fn consumer_shares(&self) -> Vec<usize>
    {
        let total = self.total_items();
        let base = total / self.consumers;
        let rest = total % self.consumers;
        (0..self.consumers)
            .map(|i| base + usize::from(i < rest))
            .collect()
    }

    /// Same workload without any pauses
    pub fn without_delays(mut self) -> Self
    {
        self.producer_delay_ms = 0;
        self.consumer_delay_ms = 0;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport{
    pub settings: HarnessSettings,
    /// Values in push order, one entry per producer
    pub pushed: Vec<Vec<i32>>,
    /// Values in pop order, one entry per consumer
    pub popped: Vec<Vec<i32>>,
    /// Nodes still queued when the queue was destroyed
    pub leftover: usize,
    pub elapsed: Duration
}

impl RunReport{
    pub fn total_pushed(&self) -> usize
    {
        self.pushed.iter().map(Vec::len).sum()
    }

    pub fn total_popped(&self) -> usize
    {
        self.popped.iter().map(Vec::len).sum()
    }

    /// Checks that every pushed value was popped exactly once
    pub fn verify(&self) -> Result<(), HarnessError>
    {
        let pushed = self.pushed.iter().flatten().copied().counts();
        let popped = self.popped.iter().flatten().copied().counts();
        let missing = multiset_difference(&pushed, &popped);
        let unexpected = multiset_difference(&popped, &pushed);
        if missing.is_empty() && unexpected.is_empty() && self.leftover == 0{
            Ok(())
        } else {
            Err(
                HarnessError::Mismatch {
                    missing,
                    unexpected,
                    leftover: self.leftover
                }
            )
        }
    }
}

impl fmt::Display for RunReport{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        // format_duration prints every digit down to nanoseconds otherwise
        let elapsed = Duration::from_millis(self.elapsed.as_millis() as u64);
        write!(
            f,
            "pushed {} values from {} producers, popped {} values on {} consumers in {}",
            self.total_pushed(),
            self.pushed.len(),
            self.total_popped(),
            self.popped.len(),
            format_duration(elapsed)
        )
    }
}

/// Values counted in `a` more often than in `b`, sorted
fn multiset_difference(a: &HashMap<i32, usize>, b: &HashMap<i32, usize>) -> Vec<i32>
{
    a.iter()
        .flat_map(
            |(&value, &count)|
            {
                let extra = count.saturating_sub(b.get(&value).copied().unwrap_or(0));
                std::iter::repeat(value).take(extra)
            }
        ).sorted()
        .collect()
}

/// Upper bound for reserving result vectors up front
const PREALLOC_LIMIT: usize = 1 << 16;

fn pause(ms: u64)
{
    if ms > 0{
        thread::sleep(Duration::from_millis(ms));
    }
}

fn produce(
    queue: &SyncQueue<i32>,
    mut rng: Pcg64,
    items: usize,
    max_value: i32,
    delay_ms: u64
) -> Result<Vec<i32>, QueueError>
{
    let mut pushed = Vec::with_capacity(items.min(PREALLOC_LIMIT));
    for _ in 0..items{
        let value = rng.gen_range(0..max_value);
        queue.push(value)?;
        pushed.push(value);
        pause(delay_ms);
    }
    Ok(pushed)
}

fn consume(
    queue: &SyncQueue<i32>,
    share: usize,
    delay_ms: u64
) -> Result<Vec<i32>, QueueError>
{
    let mut popped = Vec::with_capacity(share.min(PREALLOC_LIMIT));
    for _ in 0..share{
        popped.push(queue.pop()?);
        pause(delay_ms);
    }
    Ok(popped)
}

type Worker = JoinHandle<Result<Vec<i32>, QueueError>>;

fn spawn_worker<F>(name: String, work: F) -> Result<Worker, HarnessError>
where F: FnOnce() -> Result<Vec<i32>, QueueError> + Send + 'static
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(work)
        .map_err(|source| HarnessError::Spawn { name, source })
}

/// Joins every handle before looking at any result, so no worker is left
/// running when an error is returned.
fn join_all(handles: Vec<Worker>) -> Result<Vec<Vec<i32>>, HarnessError>
{
    let results = handles.into_iter()
        .map(
            |handle|
            {
                let name = handle.thread()
                    .name()
                    .unwrap_or("unnamed")
                    .to_owned();
                match handle.join(){
                    Ok(res) => res.map_err(HarnessError::from),
                    Err(_) => Err(HarnessError::WorkerPanicked(name))
                }
            }
        ).collect_vec();
    results.into_iter().collect()
}

type Produce = fn(&SyncQueue<i32>, Pcg64, usize, i32, u64) -> Result<Vec<i32>, QueueError>;

/// Value pushed to release blocked consumers after a producer failed
const FILLER: i32 = -1;

/// Pushes enough values to satisfy every consumer share, so consumers that
/// wait for a producer which died can still be joined.
fn release_consumers(queue: &SyncQueue<i32>, total_items: usize)
{
    warn!(total_items, "producer failed, releasing consumers");
    for _ in 0..total_items{
        if queue.push(FILLER).is_err(){
            break;
        }
    }
}

/// Runs one producer/consumer workload against a fresh queue.
///
/// All workers are joined before the queue is destroyed.
pub fn run(settings: &HarnessSettings) -> Result<RunReport, HarnessError>
{
    run_with(settings, produce)
}

fn run_with(settings: &HarnessSettings, produce: Produce) -> Result<RunReport, HarnessError>
{
    settings.validate()?;
    let shares = settings.consumer_shares();
    let queue = Arc::new(SyncQueue::<i32>::new());
    let mut seeding_rng = Pcg64::seed_from_u64(settings.seed);

    debug!(
        producers = settings.producers,
        consumers = settings.consumers,
        items = settings.total_items(),
        "starting run"
    );
    let start = Instant::now();

    // Producers never wait, so the ones already running can always be joined
    // when a later spawn fails.
    let mut producers = Vec::with_capacity(settings.producers);
    for i in 0..settings.producers{
        let queue = Arc::clone(&queue);
        let rng = Pcg64::seed_from_u64(seeding_rng.gen());
        let items = settings.items_per_producer;
        let max_value = settings.max_value;
        let delay = settings.producer_delay_ms;
        let spawned = spawn_worker(
            format!("producer-{i}"),
            move || produce(&queue, rng, items, max_value, delay)
        );
        match spawned{
            Ok(handle) => producers.push(handle),
            Err(err) => {
                let _ = join_all(producers);
                return Err(err);
            }
        }
    }

    // Every producer is running now. The shares of the consumers that do get
    // spawned add up to at most the total, so they all finish.
    let mut consumers = Vec::with_capacity(settings.consumers);
    let mut spawn_error = None;
    for (i, share) in shares.into_iter().enumerate(){
        let queue = Arc::clone(&queue);
        let delay = settings.consumer_delay_ms;
        match spawn_worker(format!("consumer-{i}"), move || consume(&queue, share, delay)){
            Ok(handle) => consumers.push(handle),
            Err(err) => {
                spawn_error = Some(err);
                break;
            }
        }
    }

    let pushed = join_all(producers);
    if pushed.is_err(){
        release_consumers(&queue, settings.total_items());
    }
    let popped = join_all(consumers);
    if let Some(err) = spawn_error{
        return Err(err);
    }
    let (pushed, popped) = (pushed?, popped?);
    let elapsed = start.elapsed();
    debug!(?elapsed, "all workers joined");

    let queue = Arc::try_unwrap(queue)
        .map_err(|_| HarnessError::QueueStillShared)?;
    if !queue.is_empty()?{
        warn!(remaining = queue.len()?, "workers left values behind");
    }
    let leftover = queue.destroy()?;

    let report = RunReport{
        settings: settings.clone(),
        pushed,
        popped,
        leftover,
        elapsed
    };
    debug!("{report}");
    Ok(report)
}
