// src/parser/options.rs

use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    family::SchemaFamily,
    metadata::{OptionMap, OptionValue, TableOptions},
    rows::{Row, RowError},
    version::Version,
};

/// Every table option the graph tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOptionKind {
    BloomFilterFpChance,
    Caching,
    Comment,
    Compaction,
    Compression,
    CrcCheckChance,
    DcLocalReadRepairChance,
    ReadRepairChance,
    DefaultTimeToLive,
    GcGraceSeconds,
    MinIndexInterval,
    MaxIndexInterval,
    MemtableFlushPeriodInMs,
    SpeculativeRetry,
    Cdc,
    AdditionalWritePolicy,
    ReadRepair,
    NodeSync,
}

impl TableOptionKind {
    pub const ALL: [TableOptionKind; 18] = [
        TableOptionKind::BloomFilterFpChance,
        TableOptionKind::Caching,
        TableOptionKind::Comment,
        TableOptionKind::Compaction,
        TableOptionKind::Compression,
        TableOptionKind::CrcCheckChance,
        TableOptionKind::DcLocalReadRepairChance,
        TableOptionKind::ReadRepairChance,
        TableOptionKind::DefaultTimeToLive,
        TableOptionKind::GcGraceSeconds,
        TableOptionKind::MinIndexInterval,
        TableOptionKind::MaxIndexInterval,
        TableOptionKind::MemtableFlushPeriodInMs,
        TableOptionKind::SpeculativeRetry,
        TableOptionKind::Cdc,
        TableOptionKind::AdditionalWritePolicy,
        TableOptionKind::ReadRepair,
        TableOptionKind::NodeSync,
    ];

    /// The option as written in a `WITH` clause.
    pub fn cql_name(self) -> &'static str {
        use TableOptionKind::*;
        match self {
            BloomFilterFpChance => "bloom_filter_fp_chance",
            Caching => "caching",
            Comment => "comment",
            Compaction => "compaction",
            Compression => "compression",
            CrcCheckChance => "crc_check_chance",
            DcLocalReadRepairChance => "dclocal_read_repair_chance",
            ReadRepairChance => "read_repair_chance",
            DefaultTimeToLive => "default_time_to_live",
            GcGraceSeconds => "gc_grace_seconds",
            MinIndexInterval => "min_index_interval",
            MaxIndexInterval => "max_index_interval",
            MemtableFlushPeriodInMs => "memtable_flush_period_in_ms",
            SpeculativeRetry => "speculative_retry",
            Cdc => "cdc",
            AdditionalWritePolicy => "additional_write_policy",
            ReadRepair => "read_repair",
            NodeSync => "nodesync",
        }
    }

    /// Whether servers of this family and version know about the option at all.
    pub fn is_supported(self, family: SchemaFamily, version: &Version) -> bool {
        use SchemaFamily::*;
        use TableOptionKind::*;
        match self {
            BloomFilterFpChance | Caching | Comment | Compaction | Compression
            | DefaultTimeToLive | GcGraceSeconds | MinIndexInterval | MaxIndexInterval
            | MemtableFlushPeriodInMs | SpeculativeRetry => true,
            // removed in 4.0
            ReadRepairChance | DcLocalReadRepairChance => family != Cassandra4,
            CrcCheckChance => matches!(family, Cassandra3 | Cassandra4),
            Cdc => match family {
                Cassandra3 => version.next_stable() >= Version::V3_8_0,
                Cassandra4 => true,
                _ => false,
            },
            AdditionalWritePolicy | ReadRepair => family == Cassandra4,
            NodeSync => family == Cassandra3 && SchemaFamily::is_vendor_build(version),
        }
    }
}

/// Reads option columns for one family/version pair.
pub(crate) struct OptionReader<'a> {
    family: SchemaFamily,
    version: &'a Version,
}

impl<'a> OptionReader<'a> {
    pub(crate) fn new(family: SchemaFamily, version: &'a Version) -> Self {
        Self { family, version }
    }

    /// Combine support, presence and type into one [`OptionValue`].
    fn read<T>(
        &self,
        kind: TableOptionKind,
        default: T,
        value: Result<Option<T>, RowError>,
    ) -> OptionValue<T> {
        if !kind.is_supported(self.family, self.version) {
            return OptionValue::invalid(default);
        }
        match value {
            Ok(Some(value)) => OptionValue::valid(value),
            Ok(None) => OptionValue::invalid(default),
            Err(e) => {
                debug!(option = ?kind, error = %e, "ignoring unreadable table option");
                OptionValue::invalid(default)
            }
        }
    }

    fn map_column(&self, row: &Row, column: &str) -> Result<Option<OptionMap>, RowError> {
        if self.family.is_legacy() {
            row.get_json_map(column)
        } else {
            row.get_string_map(column)
        }
    }

    /// 2.x keeps the compaction class in its own column.
    fn compaction(&self, row: &Row) -> Result<Option<OptionMap>, RowError> {
        if !self.family.is_legacy() {
            return row.get_string_map("compaction");
        }
        let class = row.get_string("compaction_strategy_class")?;
        let options = row.get_json_map("compaction_strategy_options")?;
        match (class, options) {
            (None, None) => Ok(None),
            (class, options) => {
                let mut merged = options.unwrap_or_default();
                if let Some(class) = class {
                    merged.insert("class".to_string(), class.to_string());
                }
                Ok(Some(merged))
            }
        }
    }

    pub(crate) fn table_options(&self, row: &Row) -> TableOptions {
        use TableOptionKind::*;
        let d = TableOptions::unsupported();
        let legacy = self.family.is_legacy();
        let text = |column: &str| row.get_string(column).map(|v| v.map(str::to_string));

        TableOptions {
            bloom_filter_fp_chance: self.read(
                BloomFilterFpChance,
                *d.bloom_filter_fp_chance.value(),
                row.get_f64("bloom_filter_fp_chance"),
            ),
            caching: self.read(Caching, OptionMap::new(), self.map_column(row, "caching")),
            comment: self.read(Comment, String::new(), text("comment")),
            compaction: self.read(Compaction, OptionMap::new(), self.compaction(row)),
            compression: self.read(
                Compression,
                OptionMap::new(),
                self.map_column(
                    row,
                    if legacy {
                        "compression_parameters"
                    } else {
                        "compression"
                    },
                ),
            ),
            crc_check_chance: self.read(
                CrcCheckChance,
                *d.crc_check_chance.value(),
                row.get_f64("crc_check_chance"),
            ),
            dclocal_read_repair_chance: self.read(
                DcLocalReadRepairChance,
                *d.dclocal_read_repair_chance.value(),
                row.get_f64(if legacy {
                    "local_read_repair_chance"
                } else {
                    "dclocal_read_repair_chance"
                }),
            ),
            read_repair_chance: self.read(
                ReadRepairChance,
                *d.read_repair_chance.value(),
                row.get_f64("read_repair_chance"),
            ),
            default_time_to_live: self.read(
                DefaultTimeToLive,
                *d.default_time_to_live.value(),
                row.get_i32("default_time_to_live"),
            ),
            gc_grace_seconds: self.read(
                GcGraceSeconds,
                *d.gc_grace_seconds.value(),
                row.get_i32("gc_grace_seconds"),
            ),
            min_index_interval: self.read(
                MinIndexInterval,
                *d.min_index_interval.value(),
                row.get_i32("min_index_interval"),
            ),
            max_index_interval: self.read(
                MaxIndexInterval,
                *d.max_index_interval.value(),
                row.get_i32("max_index_interval"),
            ),
            memtable_flush_period_in_ms: self.read(
                MemtableFlushPeriodInMs,
                *d.memtable_flush_period_in_ms.value(),
                row.get_i32("memtable_flush_period_in_ms"),
            ),
            speculative_retry: self.read(
                SpeculativeRetry,
                d.speculative_retry.value().clone(),
                text("speculative_retry"),
            ),
            cdc: self.read(Cdc, false, row.get_bool("cdc")),
            additional_write_policy: self.read(
                AdditionalWritePolicy,
                d.additional_write_policy.value().clone(),
                text("additional_write_policy"),
            ),
            read_repair: self.read(
                ReadRepair,
                d.read_repair.value().clone(),
                text("read_repair"),
            ),
            nodesync: self.read(NodeSync, BTreeMap::new(), row.get_string_map("nodesync")),
        }
    }

    /// Virtual tables only carry a comment.
    pub(crate) fn virtual_table_options(&self, row: &Row) -> TableOptions {
        let mut options = TableOptions::unsupported();
        if let Ok(Some(comment)) = row.get_string("comment") {
            options.comment = OptionValue::valid(comment.to_string());
        }
        options
    }
}
