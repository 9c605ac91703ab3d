//! The reverse proxy and deferred executor: routes synchronous function calls
//! to worker containers, queues asynchronous calls on disk and in memory, and
//! drains the queue opportunistically whenever the idle oracle permits.

use std::{
    collections::{
        HashMap,
        VecDeque,
    },
    fmt,
    path::PathBuf,
    sync::{
        atomic::{
            AtomicI32,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use errors::ErrorMetadata;
use http::{
    header::CONTENT_TYPE,
    StatusCode,
};
use parking_lot::{
    Mutex,
    RwLock,
};
use state_switcher::StateSwitcher;
use tokio::sync::mpsc;

mod executor;

/// The port every worker container listens on for `/fn` and `/health`.
pub const FN_PORT: u16 = 8000;

/// Correlation id header. On an asynchronous call it also enables persistence
/// and restart replay for that call.
pub const TFAAS_ID_HEADER: &str = "X-TFaas-ID";

/// Marks an ingress request as synchronous. Absent means asynchronous.
pub const TFAAS_SYNC_HEADER: &str = "X-TFaas-Sync";

/// The name that fans an asynchronous call out to every registered function.
pub const ALL_FUNCTIONS: &str = "all";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallStatus {
    Ok,
    Accepted,
    NotFound,
    Error,
}

/// An accepted-but-not-yet-dispatched call.
#[derive(Clone)]
pub struct QueuedCall {
    pub name: String,
    pub id: String,
    pub payload: Bytes,
}

impl fmt::Display for QueuedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(fn: {}, id: {}, payload_len: {})",
            self.name,
            self.id,
            self.payload.len()
        )
    }
}

/// The routing-table view of one function. The bounded host channel doubles as
/// the per-function concurrency gate and the worker selector: there are
/// exactly `threads` tokens, each naming one worker IP.
struct FuncEntry {
    host_tx: async_channel::Sender<String>,
    host_rx: async_channel::Receiver<String>,
    inflight: AtomicI32,
    persist_dir: PathBuf,
}

pub struct RProxyOptions {
    /// How often the executor re-probes the idle oracle.
    pub check_period: Duration,
    /// Unconditional sleep between executor dispatches.
    pub backoff_period: Duration,
    /// Root directory for persisted deferred calls, one subdirectory per
    /// function.
    pub persist_dir: PathBuf,
    /// Replay persisted calls for each function as it is added.
    pub resume: bool,
    /// Port the worker containers listen on.
    pub fn_port: u16,
}

impl RProxyOptions {
    pub fn new(
        check_period: Duration,
        backoff_period: Duration,
        persist_dir: PathBuf,
        resume: bool,
    ) -> Self {
        Self {
            check_period,
            backoff_period,
            persist_dir,
            resume,
            fn_port: FN_PORT,
        }
    }
}

pub struct RProxy {
    fns: RwLock<HashMap<String, Arc<FuncEntry>>>,
    queue: Mutex<VecDeque<QueuedCall>>,
    signal_tx: mpsc::Sender<()>,
    persist_dir: PathBuf,
    resume: bool,
    fn_port: u16,
    client: reqwest::Client,
}

impl RProxy {
    /// Creates the proxy and spawns its executor. Fails if the persistence
    /// root cannot be created.
    pub fn new(
        switcher: Arc<dyn StateSwitcher>,
        options: RProxyOptions,
    ) -> anyhow::Result<Arc<Self>> {
        std::fs::create_dir_all(&options.persist_dir)?;

        let (signal_tx, signal_rx) = mpsc::channel(1);
        let proxy = Arc::new(Self {
            fns: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            signal_tx,
            persist_dir: options.persist_dir,
            resume: options.resume,
            fn_port: options.fn_port,
            client: reqwest::Client::new(),
        });

        tokio::spawn(executor::run(
            proxy.clone(),
            switcher,
            options.check_period,
            options.backoff_period,
            signal_rx,
        ));

        Ok(proxy)
    }

    /// Publishes a function under `name`, replacing any previous entry. With
    /// resume enabled, calls persisted under the function's directory are
    /// replayed onto the queue tail.
    pub fn add(&self, name: &str, ips: Vec<String>) -> anyhow::Result<()> {
        if ips.is_empty() {
            anyhow::bail!(ErrorMetadata::bad_request("NoHandlerIps", "no ips given"));
        }

        let persist_dir = self.persist_dir.join(name);
        std::fs::create_dir_all(&persist_dir)?;

        let (host_tx, host_rx) = async_channel::bounded(ips.len());
        for ip in ips {
            host_tx
                .try_send(ip)
                .expect("fresh host channel has capacity for every ip");
        }

        let entry = Arc::new(FuncEntry {
            host_tx,
            host_rx,
            inflight: AtomicI32::new(0),
            persist_dir: persist_dir.clone(),
        });

        self.fns.write().insert(name.to_owned(), entry);

        if self.resume {
            self.replay_persisted(name, &persist_dir);
        }

        Ok(())
    }

    /// Removes a function from the routing table. Queued calls for it are not
    /// drained; they surface as NotFound at dispatch time.
    pub fn del(&self, name: &str) -> anyhow::Result<()> {
        if self.fns.write().remove(name).is_none() {
            anyhow::bail!(ErrorMetadata::not_found(
                "FunctionNotFound",
                format!("function {name} not found")
            ));
        }
        Ok(())
    }

    /// Routes one ingress request: synchronous dispatch, a single deferred
    /// call, or the all-functions fan-out (always deferred).
    pub async fn call(
        &self,
        name: &str,
        payload: Bytes,
        id: &str,
        r#async: bool,
    ) -> (CallStatus, Option<Bytes>) {
        let names: Vec<String> = if name == ALL_FUNCTIONS {
            self.fns.read().keys().cloned().collect()
        } else {
            if !r#async {
                return self.execute(name, id, payload).await;
            }
            vec![name.to_owned()]
        };

        for n in &names {
            let Some(entry) = self.fns.read().get(n).cloned() else {
                tracing::warn!("function not found: {n}");
                return (CallStatus::NotFound, None);
            };

            if !id.is_empty() {
                let p = entry.persist_dir.join(id);
                tracing::info!("creating persisted request: {}", p.display());
                if let Err(e) = std::fs::write(&p, &payload) {
                    tracing::error!("could not persist request: {e}");
                }
            }
        }

        for n in names {
            self.queue.lock().push_back(QueuedCall {
                name: n,
                id: id.to_owned(),
                payload: payload.clone(),
            });
            // wake the executor if it is parked; otherwise the signal is
            // dropped and the next periodic wake picks the call up
            let _ = self.signal_tx.try_send(());
        }

        tracing::info!("queued call {name} {id}");

        (CallStatus::Accepted, None)
    }

    /// The synchronous dispatch path: takes a host token (blocking until one
    /// of the function's workers is free), forwards the payload, and forgets
    /// the persisted record once the dispatch has completed, whatever its
    /// outcome.
    pub async fn execute(&self, name: &str, id: &str, payload: Bytes) -> (CallStatus, Option<Bytes>) {
        let Some(entry) = self.fns.read().get(name).cloned() else {
            tracing::warn!("function not found: {name}");
            return (CallStatus::NotFound, None);
        };

        entry.inflight.fetch_add(1, Ordering::SeqCst);
        let result = self.dispatch(&entry, name, id, payload).await;
        entry.inflight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn dispatch(
        &self,
        entry: &FuncEntry,
        name: &str,
        id: &str,
        payload: Bytes,
    ) -> (CallStatus, Option<Bytes>) {
        let host = match entry.host_rx.recv().await {
            Ok(host) => host,
            Err(_) => return (CallStatus::Error, None),
        };
        tracing::info!("chosen handler: {host}");

        let result = self.forward(&host, name, id, payload).await;

        entry
            .host_tx
            .try_send(host)
            .expect("host channel has capacity for the returned token");

        if !id.is_empty() {
            let p = entry.persist_dir.join(id);
            tracing::info!("removing persisted request: {}", p.display());
            if let Err(e) = std::fs::remove_file(&p) {
                tracing::error!("could not remove persisted request: {e}");
            }
        }

        result
    }

    async fn forward(
        &self,
        host: &str,
        name: &str,
        id: &str,
        payload: Bytes,
    ) -> (CallStatus, Option<Bytes>) {
        tracing::info!("start sync request {name} {id}");

        let mut req = self
            .client
            .post(format!("http://{host}:{}/fn", self.fn_port))
            .header(CONTENT_TYPE, "application/binary")
            .body(payload);
        if !id.is_empty() {
            req = req.header(TFAAS_ID_HEADER, id);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("request to {host} failed: {e}");
                return (CallStatus::Error, None);
            },
        };

        tracing::info!("end sync request {name} {id}");

        let status = resp.status();
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("could not read response from {host}: {e}");
                return (CallStatus::Error, None);
            },
        };

        if status != StatusCode::OK {
            return (CallStatus::Error, Some(body));
        }

        (CallStatus::Ok, Some(body))
    }

    fn replay_persisted(&self, name: &str, persist_dir: &PathBuf) {
        let entries = match std::fs::read_dir(persist_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("could not read directory: {e}");
                return;
            },
        };

        let mut ids: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        // Directory listing order is filesystem-dependent; sort numeric ids
        // numerically so replay matches submission order for numbered calls.
        ids.sort_by_key(|id| replay_key(id));

        for id in ids {
            tracing::info!("found persisted request: {id}");

            let p = persist_dir.join(&id);
            let payload = match std::fs::read(&p) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("could not read persisted request: {e}");
                    continue;
                },
            };

            self.queue.lock().push_back(QueuedCall {
                name: name.to_owned(),
                id,
                payload: payload.into(),
            });
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn pop_front(&self) -> Option<QueuedCall> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn total_inflight(&self) -> i32 {
        let fns = self.fns.read();
        let mut total = 0;
        for (name, entry) in fns.iter() {
            let inflight = entry.inflight.load(Ordering::SeqCst);
            tracing::debug!("inflight[{name}] == {inflight}");
            total += inflight;
        }
        total
    }

    #[cfg(test)]
    fn available_hosts(&self, name: &str) -> usize {
        self.fns
            .read()
            .get(name)
            .map(|entry| entry.host_rx.len())
            .unwrap_or(0)
    }
}

fn replay_key(id: &str) -> (u8, u64, String) {
    match id.parse::<u64>() {
        Ok(n) => (0, n, id.to_owned()),
        Err(_) => (1, 0, id.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{
                AtomicBool,
                AtomicI32,
                AtomicUsize,
                Ordering,
            },
            Arc,
        },
        time::Duration,
    };

    use axum::{
        extract::State,
        routing::{
            get,
            post,
        },
        Router,
    };
    use bytes::Bytes;
    use state_switcher::StateSwitcher;
    use tempfile::TempDir;

    use crate::{
        replay_key,
        CallStatus,
        RProxy,
        RProxyOptions,
    };

    struct TestSwitcher {
        idle: AtomicBool,
    }

    impl TestSwitcher {
        fn busy() -> Arc<Self> {
            Arc::new(Self {
                idle: AtomicBool::new(false),
            })
        }

        fn set_idle(&self, idle: bool) {
            self.idle.store(idle, Ordering::SeqCst);
        }
    }

    impl StateSwitcher for TestSwitcher {
        fn idle(&self) -> bool {
            self.idle.load(Ordering::SeqCst)
        }
    }

    #[derive(Clone)]
    struct WorkerState {
        latency: Duration,
        hits: Arc<AtomicUsize>,
        active: Arc<AtomicI32>,
        max_active: Arc<AtomicI32>,
    }

    struct Worker {
        port: u16,
        hits: Arc<AtomicUsize>,
        max_active: Arc<AtomicI32>,
    }

    async fn echo(State(st): State<WorkerState>, body: Bytes) -> Bytes {
        let active = st.active.fetch_add(1, Ordering::SeqCst) + 1;
        st.max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(st.latency).await;
        st.active.fetch_sub(1, Ordering::SeqCst);
        st.hits.fetch_add(1, Ordering::SeqCst);
        body
    }

    /// Spawns an in-process stand-in for one worker container on an ephemeral
    /// port.
    async fn spawn_worker(latency: Duration) -> anyhow::Result<Worker> {
        let state = WorkerState {
            latency,
            hits: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicI32::new(0)),
            max_active: Arc::new(AtomicI32::new(0)),
        };
        let app = Router::new()
            .route("/fn", post(echo))
            .route("/health", get(|| async {}))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Ok(Worker {
            port,
            hits: state.hits,
            max_active: state.max_active,
        })
    }

    fn options(dir: &TempDir, fn_port: u16, resume: bool) -> RProxyOptions {
        RProxyOptions {
            check_period: Duration::from_millis(20),
            backoff_period: Duration::from_millis(5),
            persist_dir: dir.path().join("persist"),
            resume,
            fn_port,
        }
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) -> anyhow::Result<()> {
        for _ in 0..500 {
            if condition() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        anyhow::bail!("condition never became true")
    }

    #[tokio::test]
    async fn test_add_requires_ips() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        assert!(proxy.add("echo", vec![]).is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_add_replaces_existing_entry() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        proxy.add("echo", vec!["10.0.0.1".into()])?;
        proxy.add(
            "echo",
            vec!["10.0.0.2".into(), "10.0.0.3".into(), "10.0.0.4".into()],
        )?;
        assert_eq!(proxy.available_hosts("echo"), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_del_unknown_function() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        assert!(proxy.del("nope").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_async_call_unknown_function() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        let (status, _) = proxy.call("nope", Bytes::from_static(b"x"), "", true).await;
        assert_eq!(status, CallStatus::NotFound);
        assert_eq!(proxy.queue_len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_call_unknown_function() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        let (status, _) = proxy.call("nope", Bytes::from_static(b"x"), "", false).await;
        assert_eq!(status, CallStatus::NotFound);
        assert_eq!(proxy.queue_len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_fan_out_empty_registry() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        let (status, _) = proxy.call("all", Bytes::from_static(b"x"), "x", true).await;
        assert_eq!(status, CallStatus::Accepted);
        assert_eq!(proxy.queue_len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_async_call_persists_and_queues() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let switcher = TestSwitcher::busy();
        let proxy = RProxy::new(switcher, options(&dir, 1, false))?;
        proxy.add("echo", vec!["10.0.0.1".into()])?;

        let (status, _) = proxy.call("echo", Bytes::from_static(b"a"), "1", true).await;
        assert_eq!(status, CallStatus::Accepted);

        let persisted = dir.path().join("persist").join("echo").join("1");
        assert_eq!(std::fs::read(&persisted)?, b"a");
        assert_eq!(proxy.queue_len(), 1);

        // The oracle reports busy, so the queue must not drain.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(proxy.queue_len(), 1);
        assert!(persisted.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fan_out_persists_per_function() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, false))?;
        proxy.add("a", vec!["10.0.0.1".into()])?;
        proxy.add("b", vec!["10.0.0.2".into()])?;

        let (status, _) = proxy.call("all", Bytes::from_static(b"p"), "x", true).await;
        assert_eq!(status, CallStatus::Accepted);
        assert!(dir.path().join("persist").join("a").join("x").exists());
        assert!(dir.path().join("persist").join("b").join("x").exists());
        assert_eq!(proxy.queue_len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_dispatch_happy_path() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let worker = spawn_worker(Duration::ZERO).await?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, worker.port, false))?;
        proxy.add("echo", vec!["127.0.0.1".into()])?;

        let (status, body) = proxy
            .call("echo", Bytes::from_static(b"hello"), "", false)
            .await;
        assert_eq!(status, CallStatus::Ok);
        assert_eq!(body.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(worker.hits.load(Ordering::SeqCst), 1);
        assert_eq!(proxy.available_hosts("echo"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_dispatch_removes_persisted_record() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let worker = spawn_worker(Duration::ZERO).await?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, worker.port, false))?;
        proxy.add("echo", vec!["127.0.0.1".into()])?;

        let persisted = dir.path().join("persist").join("echo").join("9");
        std::fs::write(&persisted, b"payload")?;

        let (status, _) = proxy
            .call("echo", Bytes::from_static(b"payload"), "9", false)
            .await;
        assert_eq!(status, CallStatus::Ok);
        assert!(!persisted.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_dispatch_unreachable_worker() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        // Nothing is listening on this port.
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 9, false))?;
        proxy.add("echo", vec!["127.0.0.1".into()])?;

        let (status, body) = proxy.call("echo", Bytes::from_static(b"x"), "", false).await;
        assert_eq!(status, CallStatus::Error);
        assert!(body.is_none());
        // The host token must come back even on a failed dispatch.
        assert_eq!(proxy.available_hosts("echo"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_executor_drains_when_idle() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let worker = spawn_worker(Duration::ZERO).await?;
        let switcher = TestSwitcher::busy();
        let proxy = RProxy::new(switcher.clone(), options(&dir, worker.port, false))?;
        proxy.add("echo", vec!["127.0.0.1".into()])?;

        let (status, _) = proxy.call("echo", Bytes::from_static(b"a"), "1", true).await;
        assert_eq!(status, CallStatus::Accepted);
        let persisted = dir.path().join("persist").join("echo").join("1");
        assert!(persisted.exists());

        switcher.set_idle(true);
        let hits = worker.hits.clone();
        wait_for(|| hits.load(Ordering::SeqCst) == 1).await?;
        wait_for(|| !persisted.exists()).await?;
        assert_eq!(proxy.queue_len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_thread_serializes_dispatches() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let worker = spawn_worker(Duration::from_millis(100)).await?;
        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, worker.port, false))?;
        proxy.add("echo", vec!["127.0.0.1".into()])?;

        let payload = Bytes::from_static(b"x");
        let (r1, r2, r3) = tokio::join!(
            proxy.call("echo", payload.clone(), "", false),
            proxy.call("echo", payload.clone(), "", false),
            proxy.call("echo", payload.clone(), "", false),
        );
        assert_eq!(r1.0, CallStatus::Ok);
        assert_eq!(r2.0, CallStatus::Ok);
        assert_eq!(r3.0, CallStatus::Ok);
        assert_eq!(worker.max_active.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_mid_queue_drops_calls() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let worker = spawn_worker(Duration::ZERO).await?;
        let switcher = TestSwitcher::busy();
        let proxy = RProxy::new(switcher.clone(), options(&dir, worker.port, false))?;
        proxy.add("f", vec!["127.0.0.1".into()])?;

        for id in 1..=5 {
            let (status, _) = proxy
                .call("f", Bytes::from_static(b"x"), &id.to_string(), true)
                .await;
            assert_eq!(status, CallStatus::Accepted);
        }
        assert_eq!(proxy.queue_len(), 5);

        proxy.del("f")?;
        switcher.set_idle(true);

        let proxy_ = proxy.clone();
        wait_for(move || proxy_.queue_len() == 0).await?;
        assert_eq!(worker.hits.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_replays_in_id_order() -> anyhow::Result<()> {
        cmd_util::env::config_test();
        let dir = TempDir::new()?;
        let persist_dir = dir.path().join("persist").join("echo");
        std::fs::create_dir_all(&persist_dir)?;
        for id in ["2", "10", "1"] {
            std::fs::write(persist_dir.join(id), id.as_bytes())?;
        }

        let proxy = RProxy::new(TestSwitcher::busy(), options(&dir, 1, true))?;
        proxy.add("echo", vec!["10.0.0.1".into()])?;

        assert_eq!(proxy.queue_len(), 3);
        let replayed: Vec<String> = std::iter::from_fn(|| proxy.pop_front())
            .map(|call| call.id)
            .collect();
        assert_eq!(replayed, vec!["1", "2", "10"]);
        Ok(())
    }

    #[test]
    fn test_replay_key_orders_numeric_ids() {
        let mut ids = vec!["10".to_owned(), "2".to_owned(), "abc".to_owned(), "1".to_owned()];
        ids.sort_by_key(|id| replay_key(id));
        assert_eq!(ids, vec!["1", "2", "10", "abc"]);
    }
}
