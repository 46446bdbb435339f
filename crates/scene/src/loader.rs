//! Background asset loading with bounded retries, linear backoff and a hard
//! per-attempt timeout. Results are collected by polling from the render loop,
//! which never blocks on a load.

use crate::assets::AssetSource;
use crate::config::TextureLoadConfig;
use crate::error::LoadError;
use crossbeam_channel::{after, bounded, select, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity at which a sleeping loader notices that its owner went away.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(25);

/// How many times a load is attempted and how long each attempt may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TextureLoadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// One attempt, no retries.
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
            timeout,
        }
    }

    /// Delay before the given retry (1-based).
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.backoff * retry
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TextureLoadConfig::default())
    }
}

/// Shared flag that says whether the owner of a load still exists. Revoking it
/// makes every load carrying the token report `Cancelled`.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result state of a [`PendingLoad`].
#[derive(Debug)]
pub enum LoadStatus<T> {
    Pending,
    Ready(Result<T, LoadError>),
    /// The result was already taken.
    Taken,
}

/// Handle to an in-flight load.
pub struct PendingLoad<T> {
    path: String,
    receiver: Receiver<Result<T, LoadError>>,
    token: Liveness,
    taken: bool,
}

impl<T> PendingLoad<T> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> &Liveness {
        &self.token
    }

    /// Non-blocking check. A result is handed out exactly once; a revoked token
    /// turns any late result into `Cancelled`.
    pub fn poll(&mut self) -> LoadStatus<T> {
        if self.taken {
            return LoadStatus::Taken;
        }
        if !self.token.is_alive() {
            self.taken = true;
            return LoadStatus::Ready(Err(LoadError::Cancelled(self.path.clone())));
        }
        match self.receiver.try_recv() {
            Ok(result) => {
                self.taken = true;
                LoadStatus::Ready(result)
            }
            Err(TryRecvError::Empty) => LoadStatus::Pending,
            Err(TryRecvError::Disconnected) => {
                self.taken = true;
                LoadStatus::Ready(Err(LoadError::Disconnected(self.path.clone())))
            }
        }
    }

    /// Block until the load settles or `limit` passes. Used by tools and tests.
    pub fn wait(mut self, limit: Duration) -> Result<T, LoadError> {
        let deadline = Instant::now() + limit;
        loop {
            match self.poll() {
                LoadStatus::Ready(result) => return result,
                LoadStatus::Taken => return Err(LoadError::Disconnected(self.path.clone())),
                LoadStatus::Pending => {}
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(LoadError::Timeout {
                    path: self.path.clone(),
                    timeout_ms: limit.as_millis() as u64,
                });
            }
            match self.receiver.recv_timeout((deadline - now).min(CANCEL_CHECK_INTERVAL)) {
                Ok(result) => {
                    self.taken = true;
                    if !self.token.is_alive() {
                        return Err(LoadError::Cancelled(self.path.clone()));
                    }
                    return result;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(LoadError::Disconnected(self.path.clone())),
            }
        }
    }
}

/// Fetch `path` from `source` and convert the bytes with `decode` on a worker thread.
///
/// Each attempt runs on its own thread and is abandoned once `policy.timeout`
/// passes. Failed attempts are retried after `backoff * retry`. When the token is
/// revoked the worker stops at the next check and sends nothing useful.
pub fn spawn_load<T, F>(
    source: Arc<dyn AssetSource>,
    path: impl Into<String>,
    policy: RetryPolicy,
    token: Liveness,
    decode: F,
) -> PendingLoad<T>
where
    T: Send + 'static,
    F: Fn(&str, Vec<u8>) -> Result<T, LoadError> + Send + Sync + 'static,
{
    let path = path.into();
    let (sender, receiver) = bounded(1);
    let worker_path = path.clone();
    let worker_token = token.clone();
    let spawned = std::thread::Builder::new()
        .name("asset-loader".into())
        .spawn(move || {
            let result = run_attempts(source, &worker_path, policy, &worker_token, Arc::new(decode));
            sender.send(result).ok();
        });
    if let Err(e) = spawned {
        log::error!("Could not start loader for {}: {}", path, e);
        let (sender, failed) = bounded(1);
        sender
            .send(Err(LoadError::Fetch {
                path: path.clone(),
                reason: e.to_string(),
            }))
            .ok();
        return PendingLoad {
            path,
            receiver: failed,
            token,
            taken: false,
        };
    }
    PendingLoad {
        path,
        receiver,
        token,
        taken: false,
    }
}

fn run_attempts<T, F>(
    source: Arc<dyn AssetSource>,
    path: &str,
    policy: RetryPolicy,
    token: &Liveness,
    decode: Arc<F>,
) -> Result<T, LoadError>
where
    T: Send + 'static,
    F: Fn(&str, Vec<u8>) -> Result<T, LoadError> + Send + Sync + 'static,
{
    let mut last = LoadError::Disconnected(path.to_string());
    for attempt in 1..=policy.max_attempts() {
        if attempt > 1 {
            log::warn!("Retrying {} ({}/{})", path, attempt - 1, policy.max_retries);
            if !sleep_while_alive(policy.delay_before(attempt - 1), token) {
                return Err(LoadError::Cancelled(path.to_string()));
            }
        }
        if !token.is_alive() {
            return Err(LoadError::Cancelled(path.to_string()));
        }
        match attempt_once(Arc::clone(&source), path, policy.timeout, Arc::clone(&decode)) {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("Loading {} failed (attempt {}): {}", path, attempt, e);
                last = e;
            }
        }
    }
    log::error!("Giving up on {} after {} attempts", path, policy.max_attempts());
    if policy.max_retries == 0 {
        return Err(last);
    }
    Err(LoadError::RetriesExhausted {
        path: path.to_string(),
        attempts: policy.max_attempts(),
        last: Box::new(last),
    })
}

fn attempt_once<T, F>(
    source: Arc<dyn AssetSource>,
    path: &str,
    timeout: Duration,
    decode: Arc<F>,
) -> Result<T, LoadError>
where
    T: Send + 'static,
    F: Fn(&str, Vec<u8>) -> Result<T, LoadError> + Send + Sync + 'static,
{
    let (sender, receiver) = bounded(1);
    let attempt_path = path.to_string();
    std::thread::Builder::new()
        .name("asset-fetch".into())
        .spawn(move || {
            let result = source
                .fetch(&attempt_path)
                .and_then(|bytes| decode(&attempt_path, bytes));
            sender.send(result).ok();
        })
        .map_err(|e| LoadError::Fetch {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    select! {
        recv(receiver) -> result => match result {
            Ok(result) => result,
            Err(_) => Err(LoadError::Disconnected(path.to_string())),
        },
        recv(after(timeout)) -> _ => Err(LoadError::Timeout {
            path: path.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Sleep for `total`, waking early if the token is revoked. Returns false on revoke.
fn sleep_while_alive(total: Duration, token: &Liveness) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if !token.is_alive() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(CANCEL_CHECK_INTERVAL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakySource, SlowSource};
    use crate::assets::MemorySource;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
        }
    }

    fn raw(_: &str, bytes: Vec<u8>) -> Result<Vec<u8>, LoadError> {
        Ok(bytes)
    }

    #[test]
    fn backoff_grows_with_attempt_number() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_before(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(3000));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }

    #[test]
    fn succeeds_on_third_attempt() {
        let source = FlakySource::new(2, b"ok".to_vec());
        let calls = source.calls();
        let pending = spawn_load(Arc::new(source), "/a.png", fast_policy(3), Liveness::new(), raw);
        assert_eq!(pending.wait(Duration::from_secs(5)).unwrap(), b"ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausts_after_max_retries_plus_one() {
        let source = FlakySource::new(u32::MAX, Vec::new());
        let calls = source.calls();
        let pending = spawn_load(Arc::new(source), "/a.png", fast_policy(3), Liveness::new(), raw);
        match pending.wait(Duration::from_secs(5)) {
            Err(LoadError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn unanswered_attempts_time_out() {
        let source = SlowSource::new(Duration::from_secs(2));
        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_millis(30),
        };
        let pending = spawn_load(Arc::new(source), "/slow.png", policy, Liveness::new(), raw);
        match pending.wait(Duration::from_secs(2)) {
            Err(LoadError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LoadError::Timeout { .. }));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn single_attempt_reports_the_raw_error() {
        let pending = spawn_load(
            Arc::new(MemorySource::new()),
            "/missing.glb",
            RetryPolicy::single_attempt(Duration::from_millis(200)),
            Liveness::new(),
            raw,
        );
        assert!(matches!(pending.wait(Duration::from_secs(2)), Err(LoadError::NotFound(_))));
    }

    #[test]
    fn revoked_token_reports_cancelled() {
        let source = SlowSource::new(Duration::from_millis(100));
        let token = Liveness::new();
        let mut pending = spawn_load(Arc::new(source), "/slow.png", fast_policy(0), token.clone(), raw);
        assert!(matches!(pending.poll(), LoadStatus::Pending));
        token.revoke();
        assert!(matches!(pending.poll(), LoadStatus::Ready(Err(LoadError::Cancelled(_)))));
        assert!(matches!(pending.poll(), LoadStatus::Taken));
    }

    #[test]
    fn decode_errors_are_retried() {
        let source = MemorySource::new().with("/a.png", b"not an image".to_vec());
        let pending = spawn_load(Arc::new(source), "/a.png", fast_policy(1), Liveness::new(), |path, _| {
            Err::<(), _>(LoadError::Decode {
                path: path.to_string(),
                reason: "bad".into(),
            })
        });
        match pending.wait(Duration::from_secs(2)) {
            Err(LoadError::RetriesExhausted { attempts, last, .. }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, LoadError::Decode { .. }));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
