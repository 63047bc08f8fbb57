//! Test doubles shared by unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::{
    BackendError, BackendEvent, BackendResult, CacheBackend, CacheOptions, ConnectionManager,
    ConnectionState, MemoryBackend,
};
use crate::executor::{CachingExecutor, QueryExecutor};
use crate::query::QueryDescriptor;
use crate::error::{QueryError, QueryResult};

/// Memory backend that counts calls and can be told to fail.
pub struct RecordingBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
    failing_deletes: Mutex<Vec<String>>,
    expirations: Mutex<Vec<(String, u64)>>,
    write_delay: Mutex<Option<Duration>>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    dels: AtomicUsize,
    keys_calls: AtomicUsize,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::default(),
            failing: AtomicBool::new(false),
            failing_deletes: Mutex::new(Vec::new()),
            expirations: Mutex::new(Vec::new()),
            write_delay: Mutex::new(None),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            dels: AtomicUsize::new(0),
            keys_calls: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Make every call fail with a timeout.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `del` fail for one specific key.
    pub fn fail_delete_of(&self, key: &str) {
        self.failing_deletes.lock().push(key.to_string());
    }

    /// Make every `set` sleep before answering.
    pub fn set_write_delay(&self, delay: Duration) {
        *self.write_delay.lock() = Some(delay);
    }

    /// Write straight into the store, bypassing counters.
    pub async fn seed(&self, key: &str, value: &[u8]) {
        self.inner.set(key, value).await.unwrap();
    }

    pub async fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).await.unwrap()
    }

    pub fn expirations(&self) -> Vec<(String, u64)> {
        self.expirations.lock().clone()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn dels(&self) -> usize {
        self.dels.load(Ordering::SeqCst)
    }

    pub fn keys_calls(&self) -> usize {
        self.keys_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn check(&self) -> BackendResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::Timeout)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for RecordingBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> BackendResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        let delay = *self.write_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> BackendResult<bool> {
        self.check()?;
        self.expirations.lock().push((key.to_string(), seconds));
        self.inner.expire(key, seconds).await
    }

    async fn del(&self, key: &str) -> BackendResult<bool> {
        self.dels.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        if self.failing_deletes.lock().iter().any(|failing| failing == key) {
            return Err(BackendError::Timeout);
        }
        self.inner.del(key).await
    }

    async fn keys(&self, pattern: &str) -> BackendResult<Vec<String>> {
        self.keys_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.keys(pattern).await
    }

    async fn connect(&self) -> BackendResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::NotConnected);
        }
        self.inner.connect().await
    }

    async fn disconnect(&self) -> BackendResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.inner.subscribe()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Executor returning a fixed result and counting invocations.
pub struct CountingExecutor {
    result: Value,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl CountingExecutor {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for CountingExecutor {
    async fn execute(&self, _descriptor: &QueryDescriptor) -> QueryResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(QueryError::InvalidDescriptor("executor failure".to_string()));
        }
        Ok(self.result.clone())
    }
}

/// Connected caching executor over a recording backend.
pub async fn caching_fixture(
    result: Value,
    options: CacheOptions,
) -> (
    CachingExecutor,
    Arc<RecordingBackend>,
    Arc<CountingExecutor>,
) {
    let backend = Arc::new(RecordingBackend::new());
    let direct = Arc::new(CountingExecutor::new(result));
    let connection = ConnectionManager::new(backend.clone());
    connection.install().await;

    let executor = CachingExecutor::new(direct.clone(), connection, options);
    (executor, backend, direct)
}

/// Poll until the manager reaches `expected`, panicking after one second.
pub async fn wait_for_state(manager: &ConnectionManager, expected: ConnectionState) {
    for _ in 0..100 {
        if manager.state() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Expected state {:?}, got {:?}", expected, manager.state());
}

/// Minimal RESP server answering `+OK` to every command.
///
/// With `drop_on` set, a connection is closed as soon as that command
/// arrives, which the client sees as a dropped connection.
pub struct FakeRedis {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl FakeRedis {
    pub async fn bind(addr: SocketAddr, drop_on: Option<&'static str>) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_resp(socket, drop_on));
            }
        });
        Self { addr, task }
    }

    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_resp(socket: TcpStream, drop_on: Option<&'static str>) {
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);

    while let Some(command) = read_command(&mut reader).await {
        let name = command.first().map(String::as_str).unwrap_or_default();
        if drop_on.is_some_and(|target| name.eq_ignore_ascii_case(target)) {
            return;
        }
        if write.write_all(b"+OK\r\n").await.is_err() {
            return;
        }
    }
}

async fn read_command(reader: &mut BufReader<OwnedReadHalf>) -> Option<Vec<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line).await.ok()? == 0 {
        return None;
    }
    let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;

    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await.ok()?;
        let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf).await.ok()?;
        buf.truncate(len);
        parts.push(String::from_utf8_lossy(&buf).into_owned());
    }
    Some(parts)
}

/// An address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
