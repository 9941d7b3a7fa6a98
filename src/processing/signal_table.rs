//! Latest RSSI reading per (device, anchor) pair

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::core::SignalReading;
use crate::processing::parser::{parse_report, AnchorReport, ParseError};

/// Store of the most recent reading for each (device, anchor) pair
///
/// Readings are keyed by device MAC, then anchor id. Staleness is applied at
/// query time; nothing is removed unless [`SignalTable::sweep_inactive`] is called.
#[derive(Debug, Default)]
pub struct SignalTable {
    devices: RwLock<HashMap<String, BTreeMap<String, SignalReading>>>,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report received at `now_ms`, replacing any earlier reading for
    /// the same device and anchor
    pub fn ingest(&self, report: AnchorReport, now_ms: u64) {
        let AnchorReport {
            anchor_id,
            device_mac,
            rssi,
        } = report;

        debug!(anchor = %anchor_id, device = %device_mac, rssi, "Ingested anchor report");

        let reading = SignalReading {
            device_id: device_mac.clone(),
            anchor_id: anchor_id.clone(),
            rssi,
            received_at_ms: now_ms,
        };

        self.devices
            .write()
            .entry(device_mac)
            .or_default()
            .insert(anchor_id, reading);
    }

    /// Parse a textual report and ingest it
    ///
    /// Malformed reports are logged and dropped; the error is returned for
    /// callers that want it but may be ignored.
    pub fn ingest_text(&self, text: &str, now_ms: u64) -> Result<AnchorReport, ParseError> {
        match parse_report(text) {
            Ok(report) => {
                self.ingest(report.clone(), now_ms);
                Ok(report)
            }
            Err(err) => {
                warn!(error = %err, report = text, "Dropping malformed anchor report");
                Err(err)
            }
        }
    }

    /// Readings for `device_id` no older than `max_age_ms` at `now_ms`,
    /// ordered by anchor id
    pub fn fresh_readings_for(
        &self,
        device_id: &str,
        now_ms: u64,
        max_age_ms: u64,
    ) -> Vec<SignalReading> {
        let devices = self.devices.read();
        devices
            .get(device_id)
            .map(|anchors| {
                anchors
                    .values()
                    .filter(|reading| reading.age_ms(now_ms) <= max_age_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every device that has reported at least once, sorted
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains_device(&self, device_id: &str) -> bool {
        self.devices.read().contains_key(device_id)
    }

    /// Number of distinct devices
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Total stored readings across all devices
    pub fn reading_count(&self) -> usize {
        self.devices.read().values().map(BTreeMap::len).sum()
    }

    /// Remove devices whose newest reading is older than `horizon_ms`
    ///
    /// Returns the number of devices removed.
    pub fn sweep_inactive(&self, now_ms: u64, horizon_ms: u64) -> usize {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|_, anchors| {
            anchors
                .values()
                .any(|reading| reading.age_ms(now_ms) <= horizon_ms)
        });
        let removed = before - devices.len();
        if removed > 0 {
            info!(removed, remaining = devices.len(), "Evicted inactive devices");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn report(anchor: &str, mac: &str, rssi: i32) -> AnchorReport {
        AnchorReport {
            anchor_id: anchor.to_string(),
            device_mac: mac.to_string(),
            rssi,
        }
    }

    #[test]
    fn test_latest_reading_wins() {
        let table = SignalTable::new();
        table.ingest(report("A1", "dev", -70), 1_000);
        table.ingest(report("A1", "dev", -55), 2_000);

        let readings = table.fresh_readings_for("dev", 2_000, 60_000);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].rssi, -55);
        assert_eq!(readings[0].received_at_ms, 2_000);
        assert_eq!(table.reading_count(), 1);
    }

    #[test]
    fn test_staleness_boundary() {
        let table = SignalTable::new();
        let now = 100_000;
        table.ingest(report("old", "dev", -60), now - 60_001);
        table.ingest(report("edge", "dev", -60), now - 60_000);
        table.ingest(report("new", "dev", -60), now - 59_999);

        let anchors: Vec<String> = table
            .fresh_readings_for("dev", now, 60_000)
            .into_iter()
            .map(|r| r.anchor_id)
            .collect();
        assert_eq!(anchors, vec!["edge".to_string(), "new".to_string()]);
    }

    #[test]
    fn test_future_reading_counts_as_fresh() {
        let table = SignalTable::new();
        table.ingest(report("A1", "dev", -60), 5_000);
        assert_eq!(table.fresh_readings_for("dev", 4_000, 0).len(), 1);
    }

    #[test]
    fn test_unknown_device_is_empty() {
        let table = SignalTable::new();
        assert!(table.fresh_readings_for("nobody", 0, 60_000).is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_ingest_text() {
        let table = SignalTable::new();
        assert!(table.ingest_text("ESP:A1|MAC:AA:01|RSSI:-60", 10).is_ok());
        assert!(table.ingest_text("garbage", 10).is_err());

        assert_eq!(table.device_ids(), vec!["AA:01".to_string()]);
        assert_eq!(table.reading_count(), 1);
    }

    #[test]
    fn test_sweep_inactive() {
        let table = SignalTable::new();
        table.ingest(report("A1", "gone", -60), 0);
        table.ingest(report("A1", "here", -60), 0);
        table.ingest(report("A2", "here", -60), 90_000);

        assert_eq!(table.sweep_inactive(100_000, 30_000), 1);
        assert!(!table.contains_device("gone"));
        assert!(table.contains_device("here"));
        assert_eq!(table.sweep_inactive(100_000, 30_000), 0);
    }

    #[test]
    fn test_concurrent_ingest() {
        let table = Arc::new(SignalTable::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for i in 0..100 {
                        table.ingest(report(&format!("A{}", t), &format!("dev{}", i % 10), -60), i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(table.len(), 10);
        assert_eq!(table.reading_count(), 40);
    }
}
