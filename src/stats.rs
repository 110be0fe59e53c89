//! Per-type file census.
//!
//! Counts every classified file by [`FileType`]. Written to the reports
//! directory as CSV and printed as a table at the end of a run so a
//! classification gap (a jump in `Unknown` or `Page_Undetected`) is visible
//! right away.

use std::collections::BTreeMap;
use std::io::Write;

use crate::models::FileType;
use crate::progress::format_number;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    counts: BTreeMap<FileType, usize>,
}

impl FileStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, file_type: FileType) {
        *self.counts.entry(file_type).or_insert(0) += 1;
    }

    pub fn get(&self, file_type: FileType) -> usize {
        self.counts.get(&file_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn pages(&self) -> usize {
        self.counts
            .iter()
            .filter(|(ty, _)| ty.is_page())
            .map(|(_, n)| n)
            .sum()
    }

    /// Non-zero counts in enum order.
    pub fn iter(&self) -> impl Iterator<Item = (FileType, usize)> + '_ {
        self.counts.iter().map(|(ty, n)| (*ty, *n))
    }

    /// `type,count` CSV, zero rows omitted.
    pub fn write_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "type,count")?;
        for (ty, n) in self.iter() {
            writeln!(out, "{},{}", ty, n)?;
        }
        out.flush()
    }

    /// Print the census table to stdout.
    pub fn print_table(&self) {
        println!("  {:<28} {:>10}", "TYPE", "FILES");
        println!("  {}", "-".repeat(39));
        for (ty, n) in self.iter() {
            println!("  {:<28} {:>10}", ty.as_str(), format_number(n as u64));
        }
        println!("  {}", "-".repeat(39));
        println!(
            "  {:<28} {:>10}",
            "total",
            format_number(self.total() as u64)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let mut stats = FileStats::new();
        stats.record(FileType::FileImage);
        stats.record(FileType::FileImage);
        stats.record(FileType::PageDocumentation);
        assert_eq!(stats.get(FileType::FileImage), 2);
        assert_eq!(stats.get(FileType::Unknown), 0);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.pages(), 1);
    }

    #[test]
    fn csv_is_in_enum_order() {
        let mut stats = FileStats::new();
        stats.record(FileType::Unknown);
        stats.record(FileType::FileText);
        stats.record(FileType::PageApi);
        let mut out = Vec::new();
        stats.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "type,count\nFile_Text,1\nPage_API,1\nUnknown,1\n"
        );
    }
}
