// src/metadata/options.rs

use serde::Serialize;
use std::collections::BTreeMap;

/// A table option together with whether it means anything for the server that
/// produced it.
///
/// `value` and `valid` are independent: an invalid option still carries a value (the
/// documented default, or whatever the legacy path produced), but nothing should be
/// derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionValue<T> {
    value: T,
    valid: bool,
}

impl<T> OptionValue<T> {
    pub fn valid(value: T) -> Self {
        Self { value, valid: true }
    }

    pub fn invalid(value: T) -> Self {
        Self {
            value,
            valid: false,
        }
    }

    /// The value, only if it is meaningful for the negotiated server.
    pub fn get(&self) -> Option<&T> {
        self.valid.then_some(&self.value)
    }

    /// The stored value regardless of validity.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

pub type OptionMap = BTreeMap<String, String>;

/// The fixed option set every table and view carries, whatever the server version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableOptions {
    pub bloom_filter_fp_chance: OptionValue<f64>,
    pub caching: OptionValue<OptionMap>,
    pub comment: OptionValue<String>,
    pub compaction: OptionValue<OptionMap>,
    pub compression: OptionValue<OptionMap>,
    pub crc_check_chance: OptionValue<f64>,
    pub dclocal_read_repair_chance: OptionValue<f64>,
    pub read_repair_chance: OptionValue<f64>,
    pub default_time_to_live: OptionValue<i32>,
    pub gc_grace_seconds: OptionValue<i32>,
    pub min_index_interval: OptionValue<i32>,
    pub max_index_interval: OptionValue<i32>,
    pub memtable_flush_period_in_ms: OptionValue<i32>,
    pub speculative_retry: OptionValue<String>,
    pub cdc: OptionValue<bool>,
    pub additional_write_policy: OptionValue<String>,
    pub read_repair: OptionValue<String>,
    pub nodesync: OptionValue<OptionMap>,
}

pub const DEFAULT_BLOOM_FILTER_FP_CHANCE: f64 = 0.01;
pub const DEFAULT_CRC_CHECK_CHANCE: f64 = 1.0;
pub const DEFAULT_READ_REPAIR_CHANCE: f64 = 0.0;
pub const DEFAULT_TIME_TO_LIVE: i32 = 0;
pub const DEFAULT_GC_GRACE_SECONDS: i32 = 864_000;
pub const DEFAULT_MIN_INDEX_INTERVAL: i32 = 128;
pub const DEFAULT_MAX_INDEX_INTERVAL: i32 = 2048;
pub const DEFAULT_MEMTABLE_FLUSH_PERIOD_MS: i32 = 0;
pub const DEFAULT_SPECULATIVE_RETRY: &str = "99PERCENTILE";
pub const DEFAULT_ADDITIONAL_WRITE_POLICY: &str = "99p";
pub const DEFAULT_READ_REPAIR: &str = "BLOCKING";

impl TableOptions {
    /// Every option at its default, none of them valid.
    pub fn unsupported() -> Self {
        Self {
            bloom_filter_fp_chance: OptionValue::invalid(DEFAULT_BLOOM_FILTER_FP_CHANCE),
            caching: OptionValue::invalid(OptionMap::new()),
            comment: OptionValue::invalid(String::new()),
            compaction: OptionValue::invalid(OptionMap::new()),
            compression: OptionValue::invalid(OptionMap::new()),
            crc_check_chance: OptionValue::invalid(DEFAULT_CRC_CHECK_CHANCE),
            dclocal_read_repair_chance: OptionValue::invalid(DEFAULT_READ_REPAIR_CHANCE),
            read_repair_chance: OptionValue::invalid(DEFAULT_READ_REPAIR_CHANCE),
            default_time_to_live: OptionValue::invalid(DEFAULT_TIME_TO_LIVE),
            gc_grace_seconds: OptionValue::invalid(DEFAULT_GC_GRACE_SECONDS),
            min_index_interval: OptionValue::invalid(DEFAULT_MIN_INDEX_INTERVAL),
            max_index_interval: OptionValue::invalid(DEFAULT_MAX_INDEX_INTERVAL),
            memtable_flush_period_in_ms: OptionValue::invalid(DEFAULT_MEMTABLE_FLUSH_PERIOD_MS),
            speculative_retry: OptionValue::invalid(DEFAULT_SPECULATIVE_RETRY.to_string()),
            cdc: OptionValue::invalid(false),
            additional_write_policy: OptionValue::invalid(
                DEFAULT_ADDITIONAL_WRITE_POLICY.to_string(),
            ),
            read_repair: OptionValue::invalid(DEFAULT_READ_REPAIR.to_string()),
            nodesync: OptionValue::invalid(OptionMap::new()),
        }
    }

    pub fn is_cdc(&self) -> bool {
        *self.cdc.value()
    }

    pub fn is_cdc_valid(&self) -> bool {
        self.cdc.is_valid()
    }
}
