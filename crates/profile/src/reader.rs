//! Profile reader.

use std::io::Read;

use callpath_cct::config::DEFAULT_MAX_RECORD_LEN;
use callpath_cct::{CallTreeBuilder, CodecConfig, ReadSummary, TreeReader};
use callpath_format::{
    read_num8_body, read_str_body, read_tag, CodecError, DecodeAlloc, FileIdentity, FormatError,
    MetricFlags, ReadLeExt, Result, Tag,
};
use tracing::{debug, warn};

use crate::data::{
    Epoch, EpochTable, LoadModule, MetricDesc, ProfileData, EVENT_TAG, LOAD_MODULE_TAG,
    METRIC_FLAGS_TAG, NUM_DATA, PERIOD_TAG, PROFILE_MAGIC, PROFILE_VERSION, TARGET_TAG,
};

/// Reads one profile: [`read_metadata`](Self::read_metadata) once, then
/// [`read_tree`](Self::read_tree) for each declared tree.
#[derive(Debug, Clone)]
pub struct ProfileReader {
    trees: TreeReader,
    max_record_len: u32,
    metadata: Option<ProfileData>,
    trees_read: u32,
}

impl Default for ProfileReader {
    fn default() -> Self {
        ProfileReader::new(TreeReader::default(), DEFAULT_MAX_RECORD_LEN)
    }
}

impl ProfileReader {
    /// Reader with explicit tree and record limits.
    pub fn new(trees: TreeReader, max_record_len: u32) -> Self {
        ProfileReader {
            trees,
            max_record_len,
            metadata: None,
            trees_read: 0,
        }
    }

    /// Reader using the configured limits.
    pub fn from_config(config: &CodecConfig) -> Self {
        ProfileReader::new(TreeReader::from_config(config), config.max_record_len)
    }

    /// Metadata, once read.
    pub fn metadata(&self) -> Option<&ProfileData> {
        self.metadata.as_ref()
    }

    /// Trees declared but not yet read.
    pub fn trees_remaining(&self) -> u32 {
        self.metadata
            .as_ref()
            .map_or(0, |m| m.num_ccts.saturating_sub(self.trees_read))
    }

    /// Load map for `epoch`, once metadata has been read.
    pub fn load_map(&self, epoch: u32) -> Option<&Epoch> {
        self.metadata.as_ref()?.load_map(epoch)
    }

    /// Read and validate the header and metadata.
    ///
    /// String payloads are staged in buffers from `alloc` and returned to it
    /// before this call returns.
    pub fn read_metadata<R, A>(&mut self, r: &mut R, alloc: &mut A) -> Result<&ProfileData>
    where
        R: Read + ?Sized,
        A: DecodeAlloc,
    {
        if self.metadata.is_some() {
            return Err(CodecError::invalid_input("profile metadata already read"));
        }
        let data = match self.read_metadata_inner(r, alloc) {
            Ok(data) => data,
            Err(e) => {
                if e.is_format() {
                    warn!(target: "callpath::profile", error = %e, "Rejected corrupt profile");
                }
                return Err(e);
            }
        };
        debug!(
            target: "callpath::profile",
            target_name = %data.target,
            num_metrics = data.metrics.len(),
            num_epochs = data.epochs.len(),
            num_ccts = data.num_ccts,
            "Profile metadata read"
        );
        self.trees = self.trees.with_epoch_limit(data.epochs.len());
        Ok(self.metadata.insert(data))
    }

    fn read_metadata_inner<R, A>(&self, r: &mut R, alloc: &mut A) -> Result<ProfileData>
    where
        R: Read + ?Sized,
        A: DecodeAlloc,
    {
        let identity = FileIdentity::decode(r)?;
        identity.check(&PROFILE_MAGIC)?;
        if identity.version != PROFILE_VERSION {
            return Err(FormatError::BadVersion(identity.version.to_vec()).into());
        }
        let num_data = r.read_u64_le()?;
        if num_data != NUM_DATA {
            return Err(FormatError::BadDataCount {
                expected: NUM_DATA,
                actual: num_data,
            }
            .into());
        }

        let max = self.max_record_len;
        let target = read_string(r, TARGET_TAG, "target string", alloc, max)?;

        let num_metrics = r.read_u32_le()?;
        let mut metrics = Vec::new();
        for _ in 0..num_metrics {
            let name = read_string(r, EVENT_TAG, "metric name", alloc, max)?;
            let flags = read_number(r, METRIC_FLAGS_TAG, "metric flags")?;
            let period = read_number(r, PERIOD_TAG, "sample period")?;
            metrics.push(MetricDesc {
                name,
                flags: MetricFlags::from_bits(flags),
                period,
            });
        }

        let num_epochs = r.read_u32_le()?;
        let mut epochs = EpochTable::default();
        for _ in 0..num_epochs {
            let num_modules = r.read_u32_le()?;
            let mut modules = Vec::new();
            for _ in 0..num_modules {
                let name = read_string(r, LOAD_MODULE_TAG, "load module", alloc, max)?;
                let vaddr = r.read_u64_le()?;
                let mapaddr = r.read_u64_le()?;
                modules.push(LoadModule {
                    name,
                    vaddr,
                    mapaddr,
                });
            }
            epochs.push(Epoch { modules });
        }

        let num_ccts = r.read_u32_le()?;
        let num_tramp_samples = r.read_u64_le()?;
        Ok(ProfileData {
            target,
            metrics,
            epochs,
            num_ccts,
            num_tramp_samples,
        })
    }

    /// Read the next tree into `builder`.
    ///
    /// A tree whose header names an epoch outside the table fails with
    /// [`FormatError::EpochOutOfRange`] before any node is built.
    pub fn read_tree<R, B, A>(
        &mut self,
        r: &mut R,
        builder: &mut B,
        alloc: &mut A,
    ) -> Result<ReadSummary<B::Handle>>
    where
        R: Read + ?Sized,
        B: CallTreeBuilder + ?Sized,
        A: DecodeAlloc,
    {
        let metadata = self
            .metadata
            .as_ref()
            .ok_or_else(|| CodecError::invalid_input("profile metadata not read"))?;
        if self.trees_read >= metadata.num_ccts {
            return Err(CodecError::invalid_input(format!(
                "all {} trees already read",
                metadata.num_ccts
            )));
        }
        let summary = self
            .trees
            .read(r, builder, alloc, metadata.num_metrics())?;
        self.trees_read += 1;
        Ok(summary)
    }
}

fn expect_tag<R: Read + ?Sized>(r: &mut R, expected: Tag, what: &'static str) -> Result<Tag> {
    let tag = read_tag(r)?;
    if tag != expected {
        return Err(FormatError::UnexpectedTag {
            expected: what,
            actual: tag.0,
        }
        .into());
    }
    Ok(tag)
}

fn read_string<R, A>(
    r: &mut R,
    expected: Tag,
    what: &'static str,
    alloc: &mut A,
    max_len: u32,
) -> Result<String>
where
    R: Read + ?Sized,
    A: DecodeAlloc,
{
    let tag = expect_tag(r, expected, what)?;
    let record = read_str_body(r, tag, alloc, max_len)?;
    let text = record.as_str().map(str::to_owned);
    alloc.free(record.bytes);
    text
}

fn read_number<R: Read + ?Sized>(r: &mut R, expected: Tag, what: &'static str) -> Result<u64> {
    let tag = expect_tag(r, expected, what)?;
    Ok(read_num8_body(r, tag)?.num)
}
