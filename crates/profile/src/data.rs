//! Profile metadata: target, metric table and load-map epochs.
//!
//! # Layout
//!
//! ```text
//! magic[10]="HPC_CSPROF"  version[5]="01.01"  endian[1]='l'
//! num_data:u64                              always 3
//! STR  TARGET                               target program
//! num_metrics:u32
//!   STR EVENT, NUM8 METRIC_FLAGS, NUM8 PERIOD    per metric
//! num_epochs:u32
//!   num_modules:u32
//!     STR LOAD_MODULE, vaddr:u64, mapaddr:u64    per module
//! num_ccts:u32
//! num_tramp_samples:u64
//! ```
//!
//! `num_ccts` complete trees follow the metadata.

use callpath_format::{
    FileIdentity, MetricFlags, RecordFormat, Tag, ValueFormat, MAGIC_LEN, VERSION_LEN,
};

/// Magic bytes opening every profile.
pub const PROFILE_MAGIC: [u8; MAGIC_LEN] = *b"HPC_CSPROF";

/// The only profile version written or accepted.
pub const PROFILE_VERSION: [u8; VERSION_LEN] = *b"01.01";

/// Identity written at the start of every profile.
pub const PROFILE_IDENTITY: FileIdentity = FileIdentity::new(PROFILE_MAGIC, PROFILE_VERSION);

/// Data sections declared in the profile header.
pub const NUM_DATA: u64 = 3;

/// Target program name.
pub const TARGET_TAG: Tag = Tag::new(RecordFormat::Str, 1);
/// Metric name.
pub const EVENT_TAG: Tag = Tag::new(RecordFormat::Str, 2);
/// Sample period of a metric.
pub const PERIOD_TAG: Tag = Tag::new(RecordFormat::Num8, 3);
/// Packed [`MetricFlags`].
pub const METRIC_FLAGS_TAG: Tag = Tag::new(RecordFormat::Num8, 4);
/// Load module path.
pub const LOAD_MODULE_TAG: Tag = Tag::new(RecordFormat::Str, 5);

/// One column of the metric table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    /// Event name
    pub name: String,
    /// Flags, including how the column's words are interpreted
    pub flags: MetricFlags,
    /// Sample period
    pub period: u64,
}

impl MetricDesc {
    /// Descriptor with the given name, flags and period.
    pub fn new(name: impl Into<String>, flags: MetricFlags, period: u64) -> Self {
        MetricDesc {
            name: name.into(),
            flags,
            period,
        }
    }
}

/// A module mapped into the profiled process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadModule {
    /// Path of the module
    pub name: String,
    /// Link-time base address
    pub vaddr: u64,
    /// Address the module was mapped at
    pub mapaddr: u64,
}

impl LoadModule {
    /// Module `name` linked at `vaddr` and mapped at `mapaddr`.
    pub fn new(name: impl Into<String>, vaddr: u64, mapaddr: u64) -> Self {
        LoadModule {
            name: name.into(),
            vaddr,
            mapaddr,
        }
    }

    /// Whether `ip` falls at or above this module's mapping.
    fn maps(&self, ip: u64) -> bool {
        ip >= self.mapaddr
    }
}

/// Load map in effect while a group of trees was sampled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Epoch {
    /// Modules, in the order they were recorded
    pub modules: Vec<LoadModule>,
}

impl Epoch {
    /// Module whose mapping is the closest one at or below `ip`.
    pub fn module_for(&self, ip: u64) -> Option<&LoadModule> {
        self.modules
            .iter()
            .filter(|m| m.maps(ip))
            .max_by_key(|m| m.mapaddr)
    }
}

/// Every epoch of a profile; trees name theirs by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochTable {
    /// Epochs, indexed by a tree header's epoch field
    pub epochs: Vec<Epoch>,
}

impl EpochTable {
    /// Number of epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether the table has no epochs.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Load map for `epoch`.
    pub fn get(&self, epoch: u32) -> Option<&Epoch> {
        self.epochs.get(epoch as usize)
    }

    /// Append an epoch and return its index.
    pub fn push(&mut self, epoch: Epoch) -> u32 {
        self.epochs.push(epoch);
        (self.epochs.len() - 1) as u32
    }
}

/// Everything a profile records besides its trees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileData {
    /// Profiled program
    pub target: String,
    /// Metric table; every tree carries one word per entry
    pub metrics: Vec<MetricDesc>,
    /// Load maps
    pub epochs: EpochTable,
    /// Number of trees following the metadata
    pub num_ccts: u32,
    /// Samples taken while a trampoline was active
    pub num_tramp_samples: u64,
}

impl ProfileData {
    /// Word interpretation of every metric column, in table order.
    pub fn value_formats(&self) -> Vec<ValueFormat> {
        self.metrics.iter().map(|m| m.flags.value_format).collect()
    }

    /// Metric words per tree node.
    pub fn num_metrics(&self) -> usize {
        self.metrics.len()
    }

    /// Load map for `epoch`.
    pub fn load_map(&self, epoch: u32) -> Option<&Epoch> {
        self.epochs.get(epoch)
    }
}
