use std::collections::VecDeque;

use crate::ping::{Latency, PingStatistics};

/// One host's window as handed to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSeries {
    pub host: String,
    pub points: Vec<Latency>,
    pub statistics: PingStatistics,
}

/// Every host's window, captured at the same instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub max_points: usize,
    pub series: Vec<HostSeries>,
}

impl WindowSnapshot {
    pub fn series(&self, host: &str) -> Option<&HostSeries> {
        self.series.iter().find(|s| s.host == host)
    }
}

/// Bounded per-host history of recent latencies, oldest first.
#[derive(Debug, Clone)]
pub struct SampleStore {
    max_points: usize,
    windows: Vec<(String, VecDeque<Latency>)>,
}

impl SampleStore {
    pub fn new(hosts: &[String], max_points: usize) -> Self {
        Self {
            max_points,
            windows: hosts
                .iter()
                .map(|host| (host.clone(), VecDeque::with_capacity(max_points + 1)))
                .collect(),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.windows.iter().map(|(host, _)| host.as_str())
    }

    pub fn append(&mut self, host: &str, value: Latency) {
        let index = match self.windows.iter().position(|(h, _)| h == host) {
            Some(index) => index,
            None => {
                self.windows.push((host.to_string(), VecDeque::new()));
                self.windows.len() - 1
            }
        };

        let window = &mut self.windows[index].1;
        window.push_back(value);
        while window.len() > self.max_points {
            window.pop_front();
        }
    }

    pub fn snapshot(&self, host: &str) -> Vec<Latency> {
        self.windows
            .iter()
            .find(|(h, _)| h == host)
            .map(|(_, window)| window.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn snapshot_all(&self) -> WindowSnapshot {
        WindowSnapshot {
            max_points: self.max_points,
            series: self
                .windows
                .iter()
                .map(|(host, window)| {
                    let points: Vec<Latency> = window.iter().copied().collect();
                    HostSeries {
                        host: host.clone(),
                        statistics: PingStatistics::from_window(&points),
                        points,
                    }
                })
                .collect(),
        }
    }
}
