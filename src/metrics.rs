//! Metrics counter (C8), ported field-for-field from `ServiceMetrics` in
//! `original_source/EZ_App/service.py`. The latency ring buffer uses a
//! `VecDeque` bounded at 500 samples, the teacher's idiom for bounded
//! collections (`montana/src/net/peer.rs::BoundedInvSet`).

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

use crate::util::now_secs_f64;

const LATENCY_WINDOW: usize = 500;

#[derive(Debug, Serialize)]
pub struct TransactionStats {
    pub send_success: u64,
    pub send_failed: u64,
    pub success_rate: f64,
    pub avg_confirmation_latency_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub requests_total: u64,
    pub transactions: TransactionStats,
    pub node_online_rate: f64,
    pub error_code_distribution: HashMap<String, u64>,
}

struct Inner {
    started_at: f64,
    requests_total: u64,
    tx_send_success: u64,
    tx_send_failed: u64,
    node_status_checks: u64,
    node_status_running: u64,
    error_code_distribution: HashMap<String, u64>,
    tx_latency_ms: VecDeque<f64>,
}

pub struct ServiceMetrics {
    inner: Mutex<Inner>,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                started_at: now_secs_f64(),
                requests_total: 0,
                tx_send_success: 0,
                tx_send_failed: 0,
                node_status_checks: 0,
                node_status_running: 0,
                error_code_distribution: HashMap::new(),
                tx_latency_ms: VecDeque::with_capacity(LATENCY_WINDOW),
            }),
        }
    }

    pub fn record_response(&self, status_code: u16, error_code: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        inner.requests_total += 1;
        if let Some(code) = error_code {
            *inner.error_code_distribution.entry(code.to_string()).or_insert(0) += 1;
        } else if status_code >= 400 {
            *inner.error_code_distribution.entry("http_error".to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_tx_send(&self, ok: bool, latency_ms: Option<f64>, error_code: Option<&str>) {
        let mut inner = self.inner.lock().unwrap();
        if ok {
            inner.tx_send_success += 1;
            if let Some(latency) = latency_ms {
                if inner.tx_latency_ms.len() == LATENCY_WINDOW {
                    inner.tx_latency_ms.pop_front();
                }
                inner.tx_latency_ms.push_back(latency);
            }
        } else {
            inner.tx_send_failed += 1;
            if let Some(code) = error_code {
                *inner.error_code_distribution.entry(code.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn record_node_status(&self, status: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.node_status_checks += 1;
        if status == "running" {
            inner.node_status_running += 1;
        }
    }

    pub fn snapshot(&self, current_node_status: &str) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap();
        let tx_total = inner.tx_send_success + inner.tx_send_failed;
        let success_rate = if tx_total > 0 {
            inner.tx_send_success as f64 / tx_total as f64
        } else {
            0.0
        };
        let node_online_rate = if inner.node_status_checks > 0 {
            inner.node_status_running as f64 / inner.node_status_checks as f64
        } else if current_node_status == "running" {
            1.0
        } else {
            0.0
        };
        let avg_latency = if inner.tx_latency_ms.is_empty() {
            None
        } else {
            Some(inner.tx_latency_ms.iter().sum::<f64>() / inner.tx_latency_ms.len() as f64)
        };
        MetricsSnapshot {
            uptime_seconds: (now_secs_f64() - inner.started_at).max(0.0) as u64,
            requests_total: inner.requests_total,
            transactions: TransactionStats {
                send_success: inner.tx_send_success,
                send_failed: inner.tx_send_failed,
                success_rate: round4(success_rate),
                avg_confirmation_latency_ms: avg_latency.map(round3),
            },
            node_online_rate: round4(node_online_rate),
            error_code_distribution: inner.error_code_distribution.clone(),
        }
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_and_latency_average_reflect_recorded_sends() {
        let metrics = ServiceMetrics::new();
        metrics.record_tx_send(true, Some(10.0), None);
        metrics.record_tx_send(true, Some(20.0), None);
        metrics.record_tx_send(false, None, Some("insufficient_balance"));
        let snapshot = metrics.snapshot("running");
        assert_eq!(snapshot.transactions.send_success, 2);
        assert_eq!(snapshot.transactions.send_failed, 1);
        assert!((snapshot.transactions.success_rate - (2.0 / 3.0)).abs() < 1e-6);
        assert_eq!(snapshot.transactions.avg_confirmation_latency_ms, Some(15.0));
        assert_eq!(snapshot.error_code_distribution.get("insufficient_balance"), Some(&1));
    }

    #[test]
    fn node_online_rate_falls_back_to_current_status_when_unchecked() {
        let metrics = ServiceMetrics::new();
        let snapshot = metrics.snapshot("running");
        assert_eq!(snapshot.node_online_rate, 1.0);
        let snapshot = metrics.snapshot("stopped");
        assert_eq!(snapshot.node_online_rate, 0.0);
    }

    #[test]
    fn latency_window_stays_bounded() {
        let metrics = ServiceMetrics::new();
        for i in 0..600 {
            metrics.record_tx_send(true, Some(i as f64), None);
        }
        let snapshot = metrics.snapshot("running");
        // Average over the most recent 500 samples only (100..599).
        let expected: f64 = (100..600).sum::<i64>() as f64 / 500.0;
        assert!((snapshot.transactions.avg_confirmation_latency_ms.unwrap() - expected).abs() < 1e-6);
    }
}
