//! Statsd instrumentation.
//!
//! Provides a small DogStatsD-flavoured client (`stat:value|type|#tags`), a
//! high-resolution timer, an async timing wrapper and the request metrics
//! middleware used on every route.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

use crate::config::StatsdConfig;

/// Statsd client.
///
/// Cloning is cheap; all clones share the same socket or mock buffer.
#[derive(Clone)]
pub struct Statsd {
    inner: Arc<Inner>,
}

struct Inner {
    prefix: String,
    global_tags: Vec<String>,
    sink: Sink,
}

enum Sink {
    Udp(UdpSocket),
    Mock(Mutex<Vec<String>>),
    Disabled,
}

impl Statsd {
    /// Build a client from configuration.
    ///
    /// Socket setup failures are logged and leave metrics disabled rather
    /// than preventing startup.
    #[must_use]
    pub fn from_config(config: &StatsdConfig) -> Self {
        let sink = if config.mock {
            Sink::Mock(Mutex::new(Vec::new()))
        } else {
            match connect(&config.host, config.port) {
                Ok(socket) => Sink::Udp(socket),
                Err(e) => {
                    warn!(
                        host = %config.host,
                        port = config.port,
                        error = %e,
                        "Could not set up statsd socket, metrics disabled"
                    );
                    Sink::Disabled
                }
            }
        };

        Self {
            inner: Arc::new(Inner {
                prefix: config.prefix.clone(),
                global_tags: config.global_tags.to_tags(),
                sink,
            }),
        }
    }

    /// Client that buffers metrics in memory.
    #[must_use]
    pub fn mock(prefix: &str, global_tags: Vec<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                prefix: prefix.to_string(),
                global_tags,
                sink: Sink::Mock(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Lines recorded by a mock client (empty for real clients).
    #[must_use]
    pub fn recorded(&self) -> Vec<String> {
        match &self.inner.sink {
            Sink::Mock(buffer) => buffer.lock().map(|b| b.clone()).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Increment a counter by one.
    pub fn increment(&self, stat: &str, tags: &[String]) {
        self.send(stat, "1", "c", tags);
    }

    /// Record a timing in milliseconds.
    pub fn timing(&self, stat: &str, millis: f64, tags: &[String]) {
        self.send(stat, &format_value(millis), "ms", tags);
    }

    /// Record a distribution sample in milliseconds.
    pub fn distribution(&self, stat: &str, millis: f64, tags: &[String]) {
        self.send(stat, &format_value(millis), "d", tags);
    }

    fn send(&self, stat: &str, value: &str, kind: &str, tags: &[String]) {
        let line = self.format_line(stat, value, kind, tags);
        match &self.inner.sink {
            Sink::Udp(socket) => {
                if let Err(e) = socket.send(line.as_bytes()) {
                    warn!(error = %e, "error writing metrics");
                }
            }
            Sink::Mock(buffer) => {
                if let Ok(mut buffer) = buffer.lock() {
                    buffer.push(line);
                }
            }
            Sink::Disabled => {}
        }
    }

    fn format_line(&self, stat: &str, value: &str, kind: &str, tags: &[String]) -> String {
        let mut line = format!("{}{stat}:{value}|{kind}", self.inner.prefix);
        let all_tags: Vec<&str> = self
            .inner
            .global_tags
            .iter()
            .chain(tags)
            .map(String::as_str)
            .collect();
        if !all_tags.is_empty() {
            line.push_str("|#");
            line.push_str(&all_tags.join(","));
        }
        line
    }
}

fn connect(host: &str, port: u16) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((host, port))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn format_value(millis: f64) -> String {
    let rounded = (millis * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

/// High-resolution timer.
#[derive(Debug, Clone, Copy)]
pub struct HrTimer {
    start: Instant,
}

impl HrTimer {
    /// Start timing now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Milliseconds since the timer was started, with sub-millisecond precision.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// Await `future` and record its duration as a distribution.
///
/// The sample is recorded whatever the future resolves to, so failed calls
/// are timed as well.
pub async fn timed<F, T>(statsd: &Statsd, stat: &str, tags: &[String], future: F) -> T
where
    F: Future<Output = T>,
{
    let timer = HrTimer::start();
    let output = future.await;
    statsd.distribution(stat, timer.elapsed_ms(), tags);
    output
}

/// Stat key for a request: `http.<method>.<route>`.
#[must_use]
pub fn request_key(method: &str, path: &str) -> String {
    let method = if method.is_empty() {
        "unknown_method".to_string()
    } else {
        method.to_lowercase()
    };
    ["http", method.as_str(), path].join(".")
}

/// Request metrics middleware.
///
/// Records `<key>.response_time` and `<key>.status_code.<status>` once the
/// handler has produced a response.
pub async fn track_request(
    State(statsd): State<Statsd>,
    request: Request,
    next: Next,
) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unknown_path", MatchedPath::as_str)
        .to_string();
    let key = request_key(request.method().as_str(), &path);
    let timer = HrTimer::start();

    let response = next.run(request).await;

    let elapsed_ms = timer.elapsed_ms();
    info!(path = %path, elapsed_ms, "elapsedTimeInMs");
    statsd.timing(&format!("{key}.response_time"), elapsed_ms, &[]);
    statsd.increment(
        &format!("{key}.status_code.{}", response.status().as_u16()),
        &[],
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statsd() -> Statsd {
        Statsd::mock("jira_bridge.", vec!["environment:test".to_string()])
    }

    #[test]
    fn test_increment_format() {
        let statsd = statsd();
        statsd.increment("github_error_rendered", &["status:401".to_string()]);

        assert_eq!(
            statsd.recorded(),
            vec!["jira_bridge.github_error_rendered:1|c|#environment:test,status:401"]
        );
    }

    #[test]
    fn test_timing_and_distribution_format() {
        let statsd = Statsd::mock("p.", vec![]);
        statsd.timing("t", 1.5, &[]);
        statsd.distribution("d", 2.0, &[]);

        assert_eq!(statsd.recorded(), vec!["p.t:1.5|ms", "p.d:2|d"]);
    }

    #[test]
    fn test_request_key() {
        assert_eq!(
            request_key("GET", "/github/setup"),
            "http.get./github/setup"
        );
        assert_eq!(request_key("", "/"), "http.unknown_method./");
    }

    #[test]
    fn test_hr_timer_is_monotonic() {
        let timer = HrTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.elapsed_ms() >= 2.0);
    }

    #[tokio::test]
    async fn test_timed_records_failures() {
        let statsd = statsd();
        let result: Result<(), &str> =
            timed(&statsd, "webhooks.transform", &[], async { Err("failed") }).await;

        assert!(result.is_err());
        let recorded = statsd.recorded();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0].starts_with("jira_bridge.webhooks.transform:"));
        assert!(recorded[0].contains("|d|#environment:test"));
    }
}
