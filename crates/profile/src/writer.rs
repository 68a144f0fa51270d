//! Profile writer.
//!
//! Metadata goes first, then exactly `num_ccts` trees. Each tree is checked
//! against the metadata before any of its bytes are written.

use std::io::Write;

use callpath_cct::{CallTreeSource, CodecConfig, ConfigResult, TreeParams, TreeWriter, WriteSummary};
use callpath_format::{
    write_num8_record, write_str_record, CodecError, Result, RootConvention, WriteLeExt,
};
use tracing::{debug, info};

use crate::data::{
    ProfileData, EVENT_TAG, LOAD_MODULE_TAG, METRIC_FLAGS_TAG, NUM_DATA, PERIOD_TAG,
    PROFILE_IDENTITY, TARGET_TAG,
};

#[derive(Debug, Clone, Copy)]
struct Expected {
    num_metrics: usize,
    num_epochs: usize,
    num_ccts: u32,
}

/// Writes one profile: [`write_metadata`](Self::write_metadata) once, then
/// [`write_tree`](Self::write_tree) per tree, then [`finish`](Self::finish).
#[derive(Debug, Clone)]
pub struct ProfileWriter {
    trees: TreeWriter,
    expected: Option<Expected>,
    written: u32,
}

impl Default for ProfileWriter {
    fn default() -> Self {
        ProfileWriter::new(RootConvention::default())
    }
}

impl ProfileWriter {
    /// Writer emitting trees under `convention`.
    pub fn new(convention: RootConvention) -> Self {
        ProfileWriter {
            trees: TreeWriter::new(convention),
            expected: None,
            written: 0,
        }
    }

    /// Writer using the configured tree version.
    pub fn from_config(config: &CodecConfig) -> ConfigResult<Self> {
        Ok(ProfileWriter {
            trees: TreeWriter::from_config(config)?,
            expected: None,
            written: 0,
        })
    }

    /// Trees written so far.
    pub fn trees_written(&self) -> u32 {
        self.written
    }

    /// Write the profile header and metadata.
    pub fn write_metadata<W: Write + ?Sized>(&mut self, w: &mut W, data: &ProfileData) -> Result<()> {
        if self.expected.is_some() {
            return Err(CodecError::invalid_input("profile metadata already written"));
        }
        let num_metrics = u32::try_from(data.metrics.len())
            .map_err(|_| CodecError::invalid_input("too many metrics"))?;
        let num_epochs = u32::try_from(data.epochs.len())
            .map_err(|_| CodecError::invalid_input("too many epochs"))?;

        PROFILE_IDENTITY.encode(w)?;
        w.write_u64_le(NUM_DATA)?;
        write_str_record(w, TARGET_TAG, data.target.as_bytes())?;

        w.write_u32_le(num_metrics)?;
        for metric in &data.metrics {
            write_str_record(w, EVENT_TAG, metric.name.as_bytes())?;
            write_num8_record(w, METRIC_FLAGS_TAG, metric.flags.to_bits())?;
            write_num8_record(w, PERIOD_TAG, metric.period)?;
        }

        w.write_u32_le(num_epochs)?;
        for epoch in &data.epochs.epochs {
            let num_modules = u32::try_from(epoch.modules.len())
                .map_err(|_| CodecError::invalid_input("too many load modules"))?;
            w.write_u32_le(num_modules)?;
            for module in &epoch.modules {
                write_str_record(w, LOAD_MODULE_TAG, module.name.as_bytes())?;
                w.write_u64_le(module.vaddr)?;
                w.write_u64_le(module.mapaddr)?;
            }
        }

        w.write_u32_le(data.num_ccts)?;
        w.write_u64_le(data.num_tramp_samples)?;

        self.expected = Some(Expected {
            num_metrics: data.metrics.len(),
            num_epochs: data.epochs.len(),
            num_ccts: data.num_ccts,
        });
        debug!(
            target: "callpath::profile",
            target_name = %data.target,
            num_metrics,
            num_epochs,
            num_ccts = data.num_ccts,
            "Profile metadata written"
        );
        Ok(())
    }

    /// Write the next tree.
    ///
    /// `params.epoch` must index the epoch table and `params.num_metrics`
    /// must equal the metric table length.
    pub fn write_tree<W, S>(
        &mut self,
        w: &mut W,
        source: &S,
        root: S::Node,
        params: TreeParams,
    ) -> Result<WriteSummary>
    where
        W: Write + ?Sized,
        S: CallTreeSource + ?Sized,
    {
        let expected = self
            .expected
            .ok_or_else(|| CodecError::invalid_input("profile metadata not written"))?;
        if self.written >= expected.num_ccts {
            return Err(CodecError::invalid_input(format!(
                "profile declares {} trees",
                expected.num_ccts
            )));
        }
        if params.epoch as usize >= expected.num_epochs {
            return Err(CodecError::invalid_input(format!(
                "tree epoch {} out of range ({} epochs)",
                params.epoch, expected.num_epochs
            )));
        }
        if params.num_metrics != expected.num_metrics {
            return Err(CodecError::invalid_input(format!(
                "tree carries {} metrics, profile declares {}",
                params.num_metrics, expected.num_metrics
            )));
        }

        let summary = self.trees.write(w, source, root, params)?;
        self.written += 1;
        Ok(summary)
    }

    /// Check that every declared tree was written.
    pub fn finish(&self) -> Result<()> {
        let expected = self
            .expected
            .ok_or_else(|| CodecError::invalid_input("profile metadata not written"))?;
        if self.written != expected.num_ccts {
            return Err(CodecError::invalid_input(format!(
                "profile declares {} trees, {} written",
                expected.num_ccts, self.written
            )));
        }
        info!(
            target: "callpath::profile",
            num_ccts = self.written,
            "Profile written"
        );
        Ok(())
    }
}
