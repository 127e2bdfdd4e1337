//! Load balancing across backend MCP servers.
//!
//! Every backend has its own circuit breaker and in-flight counter. A send
//! picks one eligible backend (healthy, circuit not open) with the configured
//! [`StrategyKind`]; when none is eligible it fails with
//! [`McpError::CircuitOpen`] without touching the network. Only transport
//! failures and timeouts count against a circuit: a JSON-RPC error response
//! still proves the backend is alive.

mod circuit;
mod strategy;

pub use circuit::{Admission, CircuitBreaker, CircuitState};

use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use switchboard_core::{BalancerConfig, StrategyKind, TransportConfig};

use crate::error::McpError;
use crate::transport::{build_transport, Transport};
use crate::types::{JsonRpcRequest, JsonRpcResponse, RpcId};

use strategy::{Candidate, Selector};

struct Backend {
    id: String,
    transport: Arc<dyn Transport>,
    weight: u32,
    healthy: bool,
    circuit: CircuitBreaker,
    in_flight: Arc<AtomicUsize>,
    requests: u64,
    failures: u64,
}

struct Pool {
    backends: Vec<Backend>,
    selector: Selector,
}

impl Pool {
    fn position(&self, id: &str) -> Option<usize> {
        self.backends.iter().position(|b| b.id == id)
    }
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStats {
    pub id: String,
    pub weight: u32,
    pub healthy: bool,
    pub circuit: CircuitState,
    pub in_flight: usize,
    pub requests: u64,
    pub failures: u64,
}

/// Decrements the backend's in-flight count when the send finishes or is
/// cancelled.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One admitted send. If dropped before an outcome is recorded (the caller
/// cancelled), a claimed trial slot is handed back.
struct Ticket<'a> {
    balancer: &'a LoadBalancer,
    backend: String,
    admission: Admission,
    settled: bool,
    _in_flight: InFlight,
}

impl Ticket<'_> {
    fn settle(mut self, result: &Result<JsonRpcResponse, McpError>) {
        self.settled = true;
        self.balancer.record(&self.backend, self.admission, result);
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            let mut pool = self.balancer.pool();
            if let Some(i) = pool.position(&self.backend) {
                pool.backends[i].circuit.release_trial();
            }
        }
    }
}

pub struct LoadBalancer {
    config: BalancerConfig,
    pool: Mutex<Pool>,
    next_probe: AtomicI64,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalancer {
    pub fn new(config: BalancerConfig) -> Self {
        info!(strategy = %config.strategy, "Load balancer created");
        Self {
            pool: Mutex::new(Pool {
                backends: Vec::new(),
                selector: Selector::new(config.strategy),
            }),
            config,
            next_probe: AtomicI64::new(1),
            health_task: Mutex::new(None),
        }
    }

    pub fn strategy(&self) -> StrategyKind {
        self.pool().selector.kind()
    }

    fn pool(&self) -> MutexGuard<'_, Pool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a transport from `config`, connect it and add it to the pool.
    pub async fn add_server(
        &self,
        id: impl Into<String>,
        config: &TransportConfig,
        weight: u32,
    ) -> Result<(), McpError> {
        self.add_backend(id, build_transport(config)?, weight).await
    }

    /// Add an existing transport, connecting it first if needed. A weight
    /// of zero is treated as one.
    #[instrument(skip_all, fields(backend = tracing::field::Empty))]
    pub async fn add_backend(
        &self,
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        weight: u32,
    ) -> Result<(), McpError> {
        let id = id.into();
        tracing::Span::current().record("backend", id.as_str());
        if self.pool().position(&id).is_some() {
            return Err(McpError::InvalidParams(format!("backend '{id}' already registered")));
        }
        if !transport.is_connected() {
            transport.connect().await?;
        }

        let mut pool = self.pool();
        if pool.position(&id).is_some() {
            return Err(McpError::InvalidParams(format!("backend '{id}' already registered")));
        }
        pool.backends.push(Backend {
            id: id.clone(),
            transport,
            weight: weight.max(1),
            healthy: true,
            circuit: CircuitBreaker::new(
                self.config.failure_threshold,
                self.config.failure_window(),
                self.config.reset_timeout(),
            ),
            in_flight: Arc::new(AtomicUsize::new(0)),
            requests: 0,
            failures: 0,
        });
        pool.selector.added();
        info!(backend = %id, weight, total = pool.backends.len(), "Backend added");
        Ok(())
    }

    /// Remove a backend and close its transport. Returns whether it existed.
    pub async fn remove_server(&self, id: &str) -> bool {
        let removed = {
            let mut pool = self.pool();
            pool.position(id).map(|i| {
                pool.selector.removed(i);
                pool.backends.remove(i)
            })
        };
        match removed {
            Some(backend) => {
                if let Err(e) = backend.transport.close().await {
                    warn!(backend = %id, error = %e, "Error closing removed backend");
                }
                info!(backend = %id, "Backend removed");
                true
            }
            None => false,
        }
    }

    /// Send through the backend the strategy picks.
    pub async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        let (transport, ticket) = self.admit(None)?;
        self.dispatch(transport, ticket, request).await
    }

    /// Send through a specific backend, still honouring its circuit.
    pub async fn send_to(
        &self,
        id: &str,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, McpError> {
        let (transport, ticket) = self.admit(Some(id))?;
        self.dispatch(transport, ticket, request).await
    }

    fn admit(&self, target: Option<&str>) -> Result<(Arc<dyn Transport>, Ticket<'_>), McpError> {
        let now = Instant::now();
        let mut guard = self.pool();
        let pool = &mut *guard;

        let index = match target {
            Some(id) => {
                let i = pool
                    .position(id)
                    .ok_or_else(|| McpError::Transport(format!("unknown backend '{id}'")))?;
                let b = &pool.backends[i];
                if !(b.healthy && b.circuit.is_available(now)) {
                    return Err(McpError::CircuitOpen(id.to_string()));
                }
                i
            }
            None => {
                let candidates: Vec<Candidate> = pool
                    .backends
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| b.healthy && b.circuit.is_available(now))
                    .map(|(index, b)| Candidate {
                        index,
                        weight: b.weight,
                        in_flight: b.in_flight.load(Ordering::SeqCst),
                    })
                    .collect();
                pool.selector.pick(&candidates).ok_or_else(|| {
                    McpError::CircuitOpen(format!(
                        "no eligible backend among {}",
                        pool.backends.len()
                    ))
                })?
            }
        };

        let backend = &mut pool.backends[index];
        let admission = backend
            .circuit
            .try_acquire(now)
            .ok_or_else(|| McpError::CircuitOpen(backend.id.clone()))?;
        backend.requests += 1;
        if admission == Admission::Trial {
            info!(backend = %backend.id, "Sending half-open trial request");
        }

        let ticket = Ticket {
            balancer: self,
            backend: backend.id.clone(),
            admission,
            settled: false,
            _in_flight: InFlight::new(Arc::clone(&backend.in_flight)),
        };
        Ok((Arc::clone(&backend.transport), ticket))
    }

    async fn dispatch(
        &self,
        transport: Arc<dyn Transport>,
        ticket: Ticket<'_>,
        request: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, McpError> {
        debug!(backend = %ticket.backend, id = %request.id, method = %request.method, "Routing request");
        let result = transport.send(request).await;
        ticket.settle(&result);
        result
    }

    fn record(&self, id: &str, admission: Admission, result: &Result<JsonRpcResponse, McpError>) {
        let now = Instant::now();
        let mut pool = self.pool();
        let Some(i) = pool.position(id) else { return };
        let backend = &mut pool.backends[i];
        match result {
            Err(e) if e.is_backend_failure() => {
                backend.failures += 1;
                if backend.circuit.record_failure(now, admission) {
                    warn!(
                        backend = %id,
                        error = %e,
                        reset_ms = self.config.reset_timeout_ms,
                        "Circuit opened"
                    );
                }
            }
            _ => {
                let before = backend.circuit.state(now);
                backend.circuit.record_success(admission);
                if before != CircuitState::Closed && backend.circuit.state(now) == CircuitState::Closed {
                    info!(backend = %id, "Circuit closed");
                }
            }
        }
    }

    /// Ping every backend and mark it healthy or not. Disconnected backends
    /// get a reconnect attempt first. Circuit state is left alone.
    pub async fn check_health(&self) -> Vec<(String, bool)> {
        let targets: Vec<_> = self
            .pool()
            .backends
            .iter()
            .map(|b| (b.id.clone(), Arc::clone(&b.transport)))
            .collect();

        let probes = targets.into_iter().map(|(id, transport)| {
            let probe_id = self.next_probe.fetch_add(1, Ordering::Relaxed);
            async move {
                if !transport.is_connected() {
                    if let Err(e) = transport.connect().await {
                        debug!(backend = %id, error = %e, "Reconnect failed");
                        return (id, false);
                    }
                }
                let ping = JsonRpcRequest::new(RpcId::String(format!("health-{probe_id}")), "ping", None);
                let healthy = transport.send(ping).await.is_ok();
                (id, healthy)
            }
        });
        let results = join_all(probes).await;

        let mut pool = self.pool();
        for (id, healthy) in &results {
            if let Some(i) = pool.position(id) {
                let backend = &mut pool.backends[i];
                if backend.healthy != *healthy {
                    info!(backend = %id, healthy, "Backend health changed");
                }
                backend.healthy = *healthy;
            }
        }
        results
    }

    /// Run [`check_health`](Self::check_health) every
    /// `health_check_interval` until dropped or shut down.
    pub fn start_health_checks(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = self.config.health_check_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(balancer) = weak.upgrade() else { break };
                balancer.check_health().await;
            }
        });
        let previous = self
            .health_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn stats(&self) -> Vec<BackendStats> {
        let now = Instant::now();
        self.pool()
            .backends
            .iter()
            .map(|b| BackendStats {
                id: b.id.clone(),
                weight: b.weight,
                healthy: b.healthy,
                circuit: b.circuit.state(now),
                in_flight: b.in_flight.load(Ordering::SeqCst),
                requests: b.requests,
                failures: b.failures,
            })
            .collect()
    }

    /// Stop health checks and close every backend.
    pub async fn shutdown(&self) {
        if let Some(task) = self
            .health_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        let transports: Vec<_> = {
            let mut pool = self.pool();
            let n = pool.backends.len();
            for i in (0..n).rev() {
                pool.selector.removed(i);
            }
            pool.backends.drain(..).map(|b| (b.id, b.transport)).collect()
        };
        for (id, transport) in transports {
            if let Err(e) = transport.close().await {
                warn!(backend = %id, error = %e, "Error closing backend");
            }
        }
        info!("Load balancer shut down");
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        if let Some(task) = self
            .health_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JsonRpcNotification;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use switchboard_core::TransportKind;
    use tokio::sync::broadcast;

    /// Answers every request unless told to fail; counts what reached it.
    /// Whether a request fails is fixed when it arrives. A `delay_ms` param
    /// overrides the default delay.
    struct Scripted {
        name: &'static str,
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
        connected: AtomicBool,
        events: broadcast::Sender<JsonRpcNotification>,
    }

    impl Scripted {
        fn new(name: &'static str) -> Arc<Self> {
            Self::slow(name, Duration::ZERO)
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay,
                connected: AtomicBool::new(false),
                events: broadcast::channel(4).0,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn connect(&self) -> Result<(), McpError> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self.failing.load(Ordering::SeqCst);
            let delay = request
                .params
                .as_ref()
                .and_then(|p| p["delay_ms"].as_u64())
                .map_or(self.delay, Duration::from_millis);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if failing {
                return Err(McpError::Transport(format!("{} is down", self.name)));
            }
            Ok(JsonRpcResponse::success(request.id, json!({"backend": self.name})))
        }
        async fn notify(&self, _notification: JsonRpcNotification) -> Result<(), McpError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), McpError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        fn kind(&self) -> TransportKind {
            TransportKind::Stdio
        }
        fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
            self.events.subscribe()
        }
    }

    fn config(strategy: StrategyKind) -> BalancerConfig {
        BalancerConfig {
            strategy,
            health_check_interval_ms: 1_000,
            failure_threshold: 3,
            failure_window_ms: 60_000,
            reset_timeout_ms: 5_000,
        }
    }

    async fn balancer(strategy: StrategyKind, backends: &[(&Arc<Scripted>, u32)]) -> LoadBalancer {
        let lb = LoadBalancer::new(config(strategy));
        for (backend, weight) in backends {
            let transport: Arc<dyn Transport> = Arc::clone(backend) as Arc<dyn Transport>;
            lb.add_backend(backend.name, transport, *weight).await.unwrap();
        }
        lb
    }

    fn ping(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(id, "ping", None)
    }

    fn served_by(response: &JsonRpcResponse) -> String {
        response.result.as_ref().unwrap()["backend"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_round_robin_is_exactly_fair() {
        let (a, b, c) = (Scripted::new("a"), Scripted::new("b"), Scripted::new("c"));
        let lb = balancer(StrategyKind::RoundRobin, &[(&a, 1), (&b, 1), (&c, 1)]).await;

        for i in 0..30 {
            lb.send(ping(i)).await.unwrap();
        }
        assert_eq!((a.calls(), b.calls(), c.calls()), (10, 10, 10));
    }

    #[tokio::test]
    async fn test_open_circuit_share_is_redistributed() {
        let (a, b, c) = (Scripted::new("a"), Scripted::new("b"), Scripted::new("c"));
        let lb = balancer(StrategyKind::RoundRobin, &[(&a, 1), (&b, 1), (&c, 1)]).await;
        b.fail(true);

        // Three rounds: b fails each time and opens.
        for i in 0..9 {
            let _ = lb.send(ping(i)).await;
        }
        assert_eq!(b.calls(), 3);
        assert_eq!(lb.stats()[1].circuit, CircuitState::Open);

        for i in 0..20 {
            let response = lb.send(ping(100 + i)).await.unwrap();
            assert_ne!(served_by(&response), "b");
        }
        assert_eq!(b.calls(), 3);
        assert_eq!((a.calls(), c.calls()), (13, 13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_rejects_without_network_then_allows_one_trial() {
        let a = Scripted::slow("a", Duration::from_millis(100));
        let lb = Arc::new(balancer(StrategyKind::RoundRobin, &[(&a, 1)]).await);
        a.fail(true);

        for i in 0..3 {
            assert!(matches!(lb.send(ping(i)).await, Err(McpError::Transport(_))));
        }
        assert!(matches!(lb.send(ping(3)).await, Err(McpError::CircuitOpen(_))));
        assert_eq!(a.calls(), 3);

        tokio::time::advance(Duration::from_millis(5_000)).await;
        a.fail(false);

        let trial = tokio::spawn({
            let lb = Arc::clone(&lb);
            async move { lb.send(ping(4)).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lb.stats()[0].circuit, CircuitState::HalfOpen);
        assert!(matches!(lb.send(ping(5)).await, Err(McpError::CircuitOpen(_))));

        trial.await.unwrap().unwrap();
        assert_eq!(a.calls(), 4);
        assert_eq!(lb.stats()[0].circuit, CircuitState::Closed);
        lb.send(ping(6)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_does_not_close_open_circuit() {
        let a = Scripted::new("a");
        let lb = Arc::new(balancer(StrategyKind::RoundRobin, &[(&a, 1)]).await);

        let straggler = tokio::spawn({
            let lb = Arc::clone(&lb);
            async move {
                lb.send(JsonRpcRequest::new(0, "ping", Some(json!({"delay_ms": 1_000}))))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        a.fail(true);
        for i in 1..=3 {
            assert!(matches!(lb.send(ping(i)).await, Err(McpError::Transport(_))));
        }
        assert_eq!(lb.stats()[0].circuit, CircuitState::Open);

        // Finishes well before the reset timeout.
        straggler.await.unwrap().unwrap();
        assert_eq!(lb.stats()[0].circuit, CircuitState::Open);
        assert!(matches!(lb.send(ping(4)).await, Err(McpError::CircuitOpen(_))));
        assert_eq!(a.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens() {
        let a = Scripted::new("a");
        let lb = balancer(StrategyKind::RoundRobin, &[(&a, 1)]).await;
        a.fail(true);
        for i in 0..3 {
            let _ = lb.send(ping(i)).await;
        }

        tokio::time::advance(Duration::from_millis(5_000)).await;
        assert!(matches!(lb.send(ping(3)).await, Err(McpError::Transport(_))));
        assert_eq!(lb.stats()[0].circuit, CircuitState::Open);
        assert!(matches!(lb.send(ping(4)).await, Err(McpError::CircuitOpen(_))));
        assert_eq!(a.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_is_released() {
        let a = Scripted::slow("a", Duration::from_millis(100));
        let lb = Arc::new(balancer(StrategyKind::RoundRobin, &[(&a, 1)]).await);
        a.fail(true);
        for i in 0..3 {
            let _ = lb.send(ping(i)).await;
        }
        tokio::time::advance(Duration::from_millis(5_000)).await;
        a.fail(false);

        let trial = tokio::spawn({
            let lb = Arc::clone(&lb);
            async move { lb.send(ping(3)).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        trial.abort();
        let _ = trial.await;

        assert_eq!(lb.stats()[0].in_flight, 0);
        lb.send(ping(4)).await.unwrap();
        assert_eq!(lb.stats()[0].circuit, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_rpc_errors_do_not_trip_circuit() {
        struct Grumpy(broadcast::Sender<JsonRpcNotification>);

        #[async_trait]
        impl Transport for Grumpy {
            async fn connect(&self) -> Result<(), McpError> {
                Ok(())
            }
            async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
                Ok(JsonRpcResponse::failure(
                    Some(request.id),
                    McpError::MethodNotFound("nope".into()).to_rpc_error(),
                ))
            }
            async fn notify(&self, _n: JsonRpcNotification) -> Result<(), McpError> {
                Ok(())
            }
            async fn close(&self) -> Result<(), McpError> {
                Ok(())
            }
            fn is_connected(&self) -> bool {
                true
            }
            fn kind(&self) -> TransportKind {
                TransportKind::Http
            }
            fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
                self.0.subscribe()
            }
        }

        let lb = LoadBalancer::new(config(StrategyKind::RoundRobin));
        lb.add_backend("grumpy", Arc::new(Grumpy(broadcast::channel(1).0)), 1)
            .await
            .unwrap();
        for i in 0..10 {
            assert!(lb.send(ping(i)).await.unwrap().is_error());
        }
        assert_eq!(lb.stats()[0].circuit, CircuitState::Closed);
        assert_eq!(lb.stats()[0].failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_least_connections_prefers_idle_backend() {
        let a = Scripted::slow("a", Duration::from_millis(100));
        let b = Scripted::slow("b", Duration::from_millis(100));
        let lb = Arc::new(balancer(StrategyKind::LeastConnections, &[(&a, 1), (&b, 1)]).await);

        let busy = tokio::spawn({
            let lb = Arc::clone(&lb);
            async move { lb.send(ping(1)).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(lb.stats()[0].in_flight, 1);

        let response = lb.send(ping(2)).await.unwrap();
        assert_eq!(served_by(&response), "b");
        busy.await.unwrap().unwrap();

        // Both idle again: tie goes to the first backend.
        let response = lb.send(ping(3)).await.unwrap();
        assert_eq!(served_by(&response), "a");
    }

    #[tokio::test]
    async fn test_weighted_distribution() {
        let (a, b) = (Scripted::new("a"), Scripted::new("b"));
        let lb = balancer(StrategyKind::Weighted, &[(&a, 3), (&b, 1)]).await;
        for i in 0..40 {
            lb.send(ping(i)).await.unwrap();
        }
        assert_eq!((a.calls(), b.calls()), (30, 10));
    }

    #[tokio::test]
    async fn test_random_skips_unhealthy() {
        let (a, b) = (Scripted::new("a"), Scripted::new("b"));
        let lb = balancer(StrategyKind::Random, &[(&a, 1), (&b, 1)]).await;
        b.fail(true);
        lb.check_health().await;
        let b_probes = b.calls();

        for i in 0..25 {
            assert_eq!(served_by(&lb.send(ping(i)).await.unwrap()), "a");
        }
        assert_eq!(b.calls(), b_probes);
    }

    #[tokio::test]
    async fn test_health_checks_toggle_eligibility_only() {
        let (a, b) = (Scripted::new("a"), Scripted::new("b"));
        let lb = balancer(StrategyKind::RoundRobin, &[(&a, 1), (&b, 1)]).await;

        b.fail(true);
        let health = lb.check_health().await;
        assert_eq!(health, vec![("a".to_string(), true), ("b".to_string(), false)]);
        let stats = lb.stats();
        assert!(!stats[1].healthy);
        assert_eq!(stats[1].circuit, CircuitState::Closed);

        b.fail(false);
        lb.check_health().await;
        assert!(lb.stats()[1].healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_health_checks() {
        let a = Scripted::new("a");
        let lb = Arc::new(balancer(StrategyKind::RoundRobin, &[(&a, 1)]).await);
        lb.start_health_checks();

        a.fail(true);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!lb.stats()[0].healthy);
        assert!(matches!(lb.send(ping(1)).await, Err(McpError::CircuitOpen(_))));

        a.fail(false);
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(lb.stats()[0].healthy);
        lb.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_pool_and_targeted_sends() {
        let lb = LoadBalancer::new(config(StrategyKind::RoundRobin));
        assert!(matches!(lb.send(ping(1)).await, Err(McpError::CircuitOpen(_))));

        let (a, b) = (Scripted::new("a"), Scripted::new("b"));
        lb.add_backend("a", a.clone(), 1).await.unwrap();
        lb.add_backend("b", b.clone(), 1).await.unwrap();
        assert!(matches!(
            lb.add_backend("a", a.clone(), 1).await,
            Err(McpError::InvalidParams(_))
        ));

        for i in 0..3 {
            assert_eq!(served_by(&lb.send_to("b", ping(i)).await.unwrap()), "b");
        }
        assert!(lb.send_to("missing", ping(9)).await.is_err());

        assert!(lb.remove_server("b").await);
        assert!(!lb.remove_server("b").await);
        assert!(!b.is_connected());
        assert_eq!(served_by(&lb.send(ping(10)).await.unwrap()), "a");
    }
}
