use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{pause_async, Arbiter, RunFlag, SentencePipeline};
use crate::config::NavConfig;
use crate::health::SourceHealth;
use crate::nav_state::{current_timestamp, SharedNavState};
use crate::retry::{CollectorPhase, RetryBudget, RetryDecision};
use crate::types::Source;

/// Instrument feed over TCP (NMEA multiplexer, typically port 10110).
pub struct NetworkCollector {
    host: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    inactivity_limit: u32,
    state: SharedNavState,
    health: Arc<SourceHealth>,
    pipeline: SentencePipeline,
    budget: RetryBudget,
}

impl NetworkCollector {
    pub fn new(config: &NavConfig, state: SharedNavState, health: Arc<SourceHealth>) -> Self {
        NetworkCollector {
            host: config.net_host.clone(),
            port: config.net_port,
            connect_timeout: Duration::from_millis(config.net_connect_timeout_ms),
            read_timeout: Duration::from_millis(config.net_read_timeout_ms),
            inactivity_limit: config.net_inactivity_limit,
            state,
            health,
            pipeline: SentencePipeline::new(Arbiter::new(Source::Network, config)),
            budget: RetryBudget::new(
                "network",
                config.retry_max_attempts,
                config.retry_base_cooldown(),
            ),
        }
    }

    /// Every recognized sentence type is published from the network.
    pub fn handle_bytes(&mut self, bytes: &[u8], now: f64) -> usize {
        self.pipeline
            .feed(bytes, &self.state, &self.health, now, |_| true)
    }

    async fn connect(&self) -> io::Result<TcpStream> {
        let addr = (self.host.as_str(), self.port);
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
        }
    }

    pub async fn run(mut self, run: RunFlag) {
        log::info!("[network] feed at {}:{}", self.host, self.port);

        while run.is_running() {
            self.health.set_phase(CollectorPhase::Connecting);
            let stream = match self.connect().await {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("[network] connect to {}:{} failed: {}", self.host, self.port, e);
                    if !self.back_off(&run).await {
                        return;
                    }
                    continue;
                }
            };

            log::info!("[network] connected to {}:{}", self.host, self.port);
            self.health.set_phase(CollectorPhase::Reading);
            self.budget.record_success();
            self.pipeline.reset();

            if let Err(e) = self.read_until_idle(stream, &run).await {
                log::warn!("[network] link lost: {}", e);
                if !self.back_off(&run).await {
                    return;
                }
            }
        }
        log::info!("[network] stopped");
    }

    /// Read until the peer closes, errors, or stays silent for more than
    /// `inactivity_limit` consecutive polls.
    async fn read_until_idle(&mut self, mut stream: TcpStream, run: &RunFlag) -> io::Result<()> {
        let mut buf = [0u8; 2048];
        let mut empty_polls = 0u32;

        while run.is_running() {
            match timeout(self.read_timeout, stream.read(&mut buf)).await {
                Err(_) => {
                    empty_polls += 1;
                    if empty_polls > self.inactivity_limit {
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no data for {} polls", empty_polls),
                        ));
                    }
                }
                Ok(Ok(0)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "closed by peer",
                    ))
                }
                Ok(Ok(n)) => {
                    empty_polls = 0;
                    self.handle_bytes(&buf[..n], current_timestamp());
                }
                Ok(Err(e)) => return Err(e),
            }
        }
        Ok(())
    }

    async fn back_off(&mut self, run: &RunFlag) -> bool {
        self.health.record_failure();
        match self.budget.record_failure() {
            RetryDecision::RetryAfter(cooldown) => {
                self.health.set_phase(CollectorPhase::BackingOff);
                pause_async(run, cooldown).await;
                true
            }
            RetryDecision::Exhausted => {
                self.health.set_phase(CollectorPhase::Failed);
                log::error!(
                    "[network] giving up on {}:{}: {}",
                    self.host,
                    self.port,
                    self.budget.status()
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav_state::NavState;
    use crate::nmea::with_checksum;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn config(port: u16) -> NavConfig {
        NavConfig {
            net_host: "127.0.0.1".into(),
            net_port: port,
            net_connect_timeout_ms: 500,
            net_read_timeout_ms: 50,
            net_inactivity_limit: 2,
            retry_base_cooldown_ms: 10,
            ..NavConfig::default()
        }
    }

    fn health() -> Arc<SourceHealth> {
        Arc::new(SourceHealth::new(Source::Network, Duration::from_secs(4)))
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[test]
    fn test_multiple_sentences_in_one_read() {
        let config = NavConfig::default();
        let state = NavState::shared(config.stale_after_secs);
        let mut net = NetworkCollector::new(&config, state.clone(), health());

        let burst = format!(
            "{}\r\n{}\r\n{}\r\n",
            with_checksum("SDDPT,5.0,0.2"),
            with_checksum("IIMTW,14.0,C"),
            with_checksum("VWVHW,,T,,M,6.1,N,11.3,K")
        );
        assert_eq!(net.handle_bytes(burst.as_bytes(), 1.0), 3);
        assert!((state.depth.latest().unwrap().value - 5.2).abs() < 1e-9);
        assert_eq!(state.water_temp.source(), Some(Source::Network));
    }

    #[tokio::test]
    async fn test_reads_feed_from_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let feed = format!(
                "{}\r\n{}\r\n",
                with_checksum("GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W"),
                with_checksum("WIMWV,200.0,R,10.0,M,A")
            );
            socket.write_all(feed.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let config = config(port);
        let state = NavState::shared(config.stale_after_secs);
        let health = health();
        let run = RunFlag::new();
        let task = tokio::spawn(
            NetworkCollector::new(&config, state.clone(), health.clone()).run(run.clone()),
        );

        assert!(wait_for(|| health.report().accepted == 2).await);
        assert!(state.wind_relative.latest().is_some());
        assert!(state.network_has_precedence(current_timestamp()));
        assert_eq!(state.heading.source(), Some(Source::Network));

        run.stop();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_silent_peer_forces_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });

        let config = config(port);
        let state = NavState::shared(config.stale_after_secs);
        let health = health();
        let run = RunFlag::new();
        let task = tokio::spawn(
            NetworkCollector::new(&config, state, health.clone()).run(run.clone()),
        );

        assert!(wait_for(|| accepted.load(Ordering::SeqCst) >= 2).await);
        assert!(health.report().failures >= 1);

        run.stop();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        server.abort();
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = NavConfig {
            retry_max_attempts: Some(1),
            ..config(port)
        };
        let health = health();
        let run = RunFlag::new();
        let collector = NetworkCollector::new(&config, NavState::shared(4.0), health.clone());

        tokio::time::timeout(Duration::from_secs(5), collector.run(run))
            .await
            .unwrap();
        assert_eq!(health.phase(), CollectorPhase::Failed);
    }
}
