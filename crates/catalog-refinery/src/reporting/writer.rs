use crate::reporting::SchemaReport;
use anyhow::Result;
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes the cleaned table and its schema report to an output directory.
pub struct ReportWriter {
    output_dir: PathBuf,
    output_name: String,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
            output_name: "cleaned".to_string(),
        }
    }
}

impl ReportWriter {
    pub fn new(output_dir: PathBuf, output_name: impl Into<String>) -> Self {
        Self {
            output_dir,
            output_name: output_name.into(),
        }
    }

    /// Writer named after the input file's stem.
    pub fn for_input(output_dir: PathBuf, input: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cleaned".to_string());
        Self::new(output_dir, format!("{}_cleaned", stem))
    }

    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.csv", self.output_name))
    }

    pub fn schema_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_schema.json", self.output_name))
    }

    /// Write the table as UTF-8 CSV with a header row.
    pub fn write_table(&self, df: &mut DataFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.table_path();
        let mut file = File::create(&output_path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)?;

        info!("Dataset saved: {}", output_path.display());
        Ok(output_path)
    }

    /// Write the schema report as pretty JSON.
    pub fn write_schema(&self, report: &SchemaReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let report_path = self.schema_path();
        let mut file = File::create(&report_path)?;
        file.write_all(report.to_json()?.as_bytes())?;

        info!("Schema report saved: {}", report_path.display());
        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_input_stem() {
        let writer = ReportWriter::for_input(PathBuf::from("out"), Path::new("data/phones.csv"));
        assert_eq!(writer.table_path(), PathBuf::from("out/phones_cleaned.csv"));
        assert_eq!(
            writer.schema_path(),
            PathBuf::from("out/phones_cleaned_schema.json")
        );
    }

    #[test]
    fn test_write_table_is_utf8_csv() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("nested"), "t");
        let mut df = df!["title" => ["café", "tea"], "price" => [1.5, 2.0]].unwrap();

        let path = writer.write_table(&mut df).unwrap();
        let content = fs::read_to_string(path).unwrap();

        assert!(content.starts_with("title,price\n"));
        assert!(content.contains("café,1.5"));
    }
}
