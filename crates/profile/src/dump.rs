//! Human-readable profile dump.

use std::io::{Read, Write};

use callpath_cct::{DumpSummary, TreeDumper};
use callpath_format::{CodecError, HeapAlloc, MetricFlags, Result};

use crate::data::{ProfileData, NUM_DATA, PROFILE_MAGIC, PROFILE_VERSION};
use crate::reader::ProfileReader;

/// Print the metadata, the epoch table and every tree.
///
/// Tree metrics are rendered according to the metric table's value formats.
/// Returns the metadata and one summary per tree.
pub fn dump_profile<R, W>(r: &mut R, out: &mut W) -> Result<(ProfileData, Vec<DumpSummary>)>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    dump_profile_with(ProfileReader::default(), r, out)
}

/// [`dump_profile`] with a caller-configured reader.
pub fn dump_profile_with<R, W>(
    mut reader: ProfileReader,
    r: &mut R,
    out: &mut W,
) -> Result<(ProfileData, Vec<DumpSummary>)>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let data = match reader.read_metadata(r, &mut HeapAlloc) {
        Ok(data) => data.clone(),
        Err(e) => {
            writeln!(out, "** Error reading profile metadata **")?;
            return Err(e);
        }
    };

    writeln!(out, "{{csprof_hdr:")?;
    writeln!(
        out,
        "{{fileid: (magic: {}) (ver: {}) (end: l)}}",
        String::from_utf8_lossy(&PROFILE_MAGIC),
        String::from_utf8_lossy(&PROFILE_VERSION)
    )?;
    writeln!(out, "(num_data: {NUM_DATA})}}")?;
    write_data(out, &data)?;

    for (i, epoch) in data.epochs.epochs.iter().enumerate() {
        writeln!(out, "{{epoch {i}:")?;
        for (j, lm) in epoch.modules.iter().enumerate() {
            writeln!(out, "  lm {j}: {} {:x} -> {:x}", lm.name, lm.vaddr, lm.mapaddr)?;
        }
        writeln!(out, "}}")?;
    }

    let dumper = TreeDumper::new(data.num_metrics())
        .with_value_formats(&data.value_formats())
        .with_indent("  ");
    let mut trees = Vec::new();
    for i in 0..data.num_ccts {
        writeln!(out, "{{cct {i}:")?;
        trees.push(dumper.dump(r, out)?);
        writeln!(out, "}}")?;
    }
    Ok((data, trees))
}

fn write_data<W: Write + ?Sized>(out: &mut W, data: &ProfileData) -> Result<()> {
    writeln!(out, "{{csprof_data:")?;
    writeln!(out, "  (target: {})", data.target)?;
    writeln!(out, "  (num_metrics: {})", data.metrics.len())?;
    for (i, m) in data.metrics.iter().enumerate() {
        writeln!(
            out,
            "  {{metric {i}: (name: {}) (period: {}) {}}}",
            m.name,
            m.period,
            describe_flags(m.flags)
        )?;
    }
    writeln!(
        out,
        "  (num_ccts: {}) (num_tramp_samples: {})}}",
        data.num_ccts, data.num_tramp_samples
    )
    .map_err(CodecError::from)
}

fn describe_flags(flags: MetricFlags) -> String {
    format!(
        "(flags: {:?} {:?} {:?} partner={} show={} percent={})",
        flags.kind,
        flags.value_type,
        flags.value_format,
        flags.partner,
        flags.show,
        flags.show_percent
    )
}
