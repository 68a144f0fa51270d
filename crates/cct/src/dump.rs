//! Human-readable tree dump for debugging.
//!
//! The output format is not stable and must not be parsed.

use std::io::{Read, Write};

use callpath_format::{
    read_node, CodecError, DecodeAlloc, HeapAlloc, Result, TreeHeader, ValueFormat,
    WORD_WIDTH,
};

/// Counts reported after a complete dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    /// Parsed header
    pub header: TreeHeader,
    /// Node records printed
    pub nodes: u64,
    /// LIP records printed
    pub lip_records: u64,
}

/// Renders a tree stream as text.
#[derive(Debug, Clone)]
pub struct TreeDumper {
    num_metrics: usize,
    formats: Vec<ValueFormat>,
    indent: String,
}

impl TreeDumper {
    /// Dumper for trees carrying `num_metrics` words per node.
    pub fn new(num_metrics: usize) -> Self {
        TreeDumper {
            num_metrics,
            formats: Vec::new(),
            indent: String::new(),
        }
    }

    /// Render metric `i` according to `formats[i]`; missing entries print as
    /// integers.
    pub fn with_value_formats(mut self, formats: &[ValueFormat]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Prefix every line with `indent`.
    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    /// Dump using the heap for scratch.
    pub fn dump<R, W>(&self, r: &mut R, out: &mut W) -> Result<DumpSummary>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        self.dump_with(r, out, &mut HeapAlloc)
    }

    /// Dump, taking the metric scratch row from `alloc`.
    ///
    /// On a read failure an error line is printed before the error is
    /// returned.
    pub fn dump_with<R, W, A>(&self, r: &mut R, out: &mut W, alloc: &mut A) -> Result<DumpSummary>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
        A: DecodeAlloc,
    {
        let pre = &self.indent;
        let header = match TreeHeader::decode(r) {
            Ok(h) => h,
            Err(e) => {
                writeln!(out, "{pre}** Error reading CCT header **")?;
                return Err(e);
            }
        };
        let id = header.identity();
        writeln!(out, "{pre}{{cstree_hdr:")?;
        writeln!(
            out,
            "{pre}  {{fileid: (magic: {}) (ver: {}) (end: {})}}",
            String::from_utf8_lossy(&id.magic),
            id.version_str(),
            id.endian as char
        )?;
        writeln!(
            out,
            "{pre}  (vma_sz: {}) (uint_sz: {}) (num_nodes: {}) (epoch: {})}}",
            WORD_WIDTH,
            WORD_WIDTH,
            header.num_nodes(),
            header.epoch()
        )?;
        writeln!(out)?;

        let mut metrics = alloc.alloc(self.num_metrics, 0u64)?;
        let result = self.dump_nodes(r, out, &header, &mut metrics);
        alloc.free(metrics);

        let (nodes, lip_records) = result?;
        Ok(DumpSummary {
            header,
            nodes,
            lip_records,
        })
    }

    fn dump_nodes<R, W>(
        &self,
        r: &mut R,
        out: &mut W,
        header: &TreeHeader,
        metrics: &mut [u64],
    ) -> Result<(u64, u64)>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        let pre = &self.indent;
        let mut lip_records = 0;
        for i in 0..header.num_nodes() {
            let node = match read_node(r, metrics) {
                Ok(node) => node,
                Err(e) => {
                    writeln!(out, "{pre}** Error reading CCT node {i} **")?;
                    return Err(e);
                }
            };
            let f = node.fields;
            if let Some(lip) = node.owned_lip {
                lip_records += 1;
                writeln!(out, "{pre}{{lip: (id: {}) {}}}", f.id, lip)?;
            }
            writeln!(out, "{pre}{{node: (id: {}) (id_parent: {})}}", f.id, f.id_parent)?;
            let lip_ref = if f.has_lip() {
                f.lip_ref.to_string()
            } else {
                "-".to_string()
            };
            writeln!(
                out,
                "{pre}  {{nodedata: (as: {}) (ip: {:#x}) (lip: [{}]) (sp: {:#x}) (cpid: {})",
                f.assoc, f.ip, lip_ref, f.sp, f.cpid
            )?;
            write!(out, "{pre}    (metrics:")?;
            for (m, &word) in metrics.iter().enumerate() {
                let format = self.formats.get(m).copied().unwrap_or(ValueFormat::Int);
                write!(out, " {}", format.decode(word))?;
            }
            writeln!(out, ") }}")?;
        }
        Ok((header.num_nodes(), lip_records))
    }
}

/// Dump a tree stream into a `String`.
pub fn dump_to_string<R: Read + ?Sized>(r: &mut R, num_metrics: usize) -> Result<String> {
    let mut out = Vec::new();
    let result = TreeDumper::new(num_metrics).dump(r, &mut out);
    let text = String::from_utf8(out).map_err(|e| CodecError::invalid_input(e.to_string()))?;
    result.map(|_| text)
}
