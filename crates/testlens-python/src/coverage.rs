//! Coverage report reader.
//!
//! Understands Cobertura XML (`coverage xml`), coverage.py SQLite data files
//! (`.coverage`) and LCOV tracefiles. Results are keyed by project-relative
//! path.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use testlens_core::config::AnalysisPolicy;
use testlens_core::error::{LensError, LensResult};
use testlens_core::files::{relative_display, resolve_path};

use crate::parser::{line_of, parse_file, ParsedModule};

/// Files probed, in order, when no coverage file is named.
pub const COVERAGE_CANDIDATES: &[&str] = &[".coverage", "coverage.xml", "lcov.info", "htmlcov/index.html"];

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("coverage database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Malformed(String),
}

impl CoverageError {
    /// Attach the report path and convert to the engine error.
    pub fn into_lens_error(self, path: &str) -> LensError {
        match self {
            CoverageError::Sqlite(err) => LensError::ReadError {
                path: path.to_string(),
                message: err.to_string(),
            },
            other => LensError::unsupported_format(path, other.to_string()),
        }
    }
}

type CoverageResult<T> = Result<T, CoverageError>;

// ============================================================================
// Report Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageFormat {
    Cobertura,
    CoverageData,
    Lcov,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub filename: String,
    /// Measured lines, ascending.
    pub lines: Vec<u32>,
    pub covered: Vec<u32>,
    pub missed: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGap {
    pub file: String,
    pub uncovered_lines: Vec<u32>,
    pub coverage_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub total_lines: usize,
    pub covered_lines: usize,
    pub coverage_percentage: f64,
}

/// Response of the `get_test_coverage_info` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub coverage_file: String,
    pub format: CoverageFormat,
    pub files: BTreeMap<String, FileCoverage>,
    pub summary: CoverageSummary,
    /// Files with missed lines, sorted by path.
    pub coverage_gaps: Vec<CoverageGap>,
}

fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (covered as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Line hits per file, merged across report sections.
#[derive(Debug, Default)]
struct LineTable {
    files: BTreeMap<String, BTreeMap<u32, bool>>,
}

impl LineTable {
    fn record(&mut self, file: &str, line: u32, hit: bool) {
        let entry = self.files.entry(file.to_string()).or_default();
        let covered = entry.entry(line).or_insert(false);
        *covered |= hit;
    }

    fn into_report(self, coverage_file: &str, format: CoverageFormat) -> CoverageReport {
        let mut files = BTreeMap::new();
        let mut gaps = Vec::new();
        let mut total = 0;
        let mut covered_total = 0;
        for (name, lines) in self.files {
            let mut coverage = FileCoverage {
                filename: name.clone(),
                lines: Vec::with_capacity(lines.len()),
                covered: Vec::new(),
                missed: Vec::new(),
            };
            for (line, hit) in lines {
                coverage.lines.push(line);
                if hit {
                    coverage.covered.push(line);
                } else {
                    coverage.missed.push(line);
                }
            }
            total += coverage.lines.len();
            covered_total += coverage.covered.len();
            if !coverage.missed.is_empty() {
                gaps.push(CoverageGap {
                    file: name.clone(),
                    uncovered_lines: coverage.missed.clone(),
                    coverage_percentage: percentage(coverage.covered.len(), coverage.lines.len()),
                });
            }
            files.insert(name, coverage);
        }
        CoverageReport {
            coverage_file: coverage_file.to_string(),
            format,
            files,
            summary: CoverageSummary {
                total_lines: total,
                covered_lines: covered_total,
                coverage_percentage: percentage(covered_total, total),
            },
            coverage_gaps: gaps,
        }
    }
}

/// Project-relative name for a path recorded by a coverage tool.
fn project_name(root: &Path, recorded: &str) -> String {
    let path = Path::new(recorded);
    let name = if path.is_absolute() {
        relative_display(root, path)
    } else {
        recorded.replace('\\', "/")
    };
    name.trim_start_matches("./").to_string()
}

// ============================================================================
// Cobertura
// ============================================================================

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> CoverageResult<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn number(element: &BytesStart<'_>, key: &[u8]) -> CoverageResult<u64> {
    let Some(raw) = attribute(element, key)? else {
        return Ok(0);
    };
    raw.trim().parse::<u64>().map_err(|_| {
        CoverageError::Malformed(format!(
            "attribute {} is not a number: {}",
            String::from_utf8_lossy(key),
            raw
        ))
    })
}

/// Parse a Cobertura document.
///
/// Only the class-level `<lines>` are read; the per-method copies are skipped.
fn parse_cobertura(xml: &str, root: &Path) -> CoverageResult<LineTable> {
    let mut reader = Reader::from_str(xml);
    let mut table = LineTable::default();
    let mut sources: Vec<PathBuf> = Vec::new();
    let mut in_source = false;
    let mut in_methods = false;
    let mut current: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"source" => in_source = true,
                b"methods" => in_methods = true,
                b"class" => {
                    current = attribute(&e, b"filename")?.map(|f| resolve_recorded(root, &sources, &f));
                }
                b"line" if !in_methods => record_line(&mut table, current.as_deref(), &e)?,
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"line" && !in_methods {
                    record_line(&mut table, current.as_deref(), &e)?;
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"source" => in_source = false,
                b"methods" => in_methods = false,
                b"class" => current = None,
                _ => {}
            },
            Event::Text(text) if in_source => {
                let source = text.unescape()?.trim().to_string();
                if !source.is_empty() {
                    sources.push(PathBuf::from(source));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(table)
}

fn record_line(table: &mut LineTable, file: Option<&str>, line: &BytesStart<'_>) -> CoverageResult<()> {
    let Some(file) = file else {
        return Ok(());
    };
    let line_no = number(line, b"number")?;
    let hits = number(line, b"hits")?;
    if let Ok(line_no) = u32::try_from(line_no) {
        table.record(file, line_no, hits > 0);
    }
    Ok(())
}

/// Resolve a Cobertura filename against the report's `<source>` roots.
fn resolve_recorded(root: &Path, sources: &[PathBuf], filename: &str) -> String {
    if Path::new(filename).is_absolute() {
        return project_name(root, filename);
    }
    for source in sources {
        let candidate = root.join(source).join(filename);
        if candidate.exists() {
            return project_name(root, &candidate.to_string_lossy());
        }
    }
    project_name(root, filename)
}

// ============================================================================
// coverage.py Data File
// ============================================================================

/// Line numbers encoded in a coverage.py numbits blob.
pub fn numbits_to_lines(numbits: &[u8]) -> Vec<u32> {
    let mut lines = Vec::new();
    for (byte_index, byte) in numbits.iter().enumerate() {
        for bit in 0..8u32 {
            if byte & (1 << bit) != 0 {
                lines.push(byte_index as u32 * 8 + bit);
            }
        }
    }
    lines
}

fn table_exists(conn: &Connection, name: &str) -> CoverageResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Executed lines per recorded path.
fn executed_lines(path: &Path) -> CoverageResult<BTreeMap<String, BTreeSet<u32>>> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    if !table_exists(&conn, "file")? {
        return Err(CoverageError::Malformed(
            "not a coverage.py data file".to_string(),
        ));
    }
    let mut executed: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();

    if table_exists(&conn, "line_bits")? {
        let mut stmt = conn.prepare(
            "SELECT file.path, line_bits.numbits FROM line_bits JOIN file ON file.id = line_bits.file_id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?;
        for row in rows {
            let (file, numbits) = row?;
            executed.entry(file).or_default().extend(numbits_to_lines(&numbits));
        }
    }
    if table_exists(&conn, "arc")? {
        let mut stmt = conn.prepare(
            "SELECT file.path, arc.fromno, arc.tono FROM arc JOIN file ON file.id = arc.file_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        for row in rows {
            let (file, from, to) = row?;
            let lines = executed.entry(file).or_default();
            // Negative numbers mark code object entry and exit.
            for line in [from, to] {
                if let Ok(line) = u32::try_from(line) {
                    if line > 0 {
                        lines.insert(line);
                    }
                }
            }
        }
    }
    Ok(executed)
}

/// Start lines of every statement in a module.
pub fn statement_lines(module: &ParsedModule) -> BTreeSet<u32> {
    module
        .preorder()
        .filter(|n| {
            n.is_named()
                && (n.kind().ends_with("_statement")
                    || n.kind() == "function_definition"
                    || n.kind() == "class_definition")
        })
        .map(line_of)
        .collect()
}

fn parse_coverage_data(path: &Path, root: &Path, policy: &AnalysisPolicy) -> CoverageResult<LineTable> {
    let mut table = LineTable::default();
    for (recorded, executed) in executed_lines(path)? {
        let name = project_name(root, &recorded);
        // Statements come from the current source; fall back to executed lines
        // when the source is gone or unparsable.
        let statements = match parse_file(root, &name, policy) {
            Ok(module) => statement_lines(&module),
            Err(err) => {
                warn!(file = %name, error = %err, "cannot estimate statements from source");
                BTreeSet::new()
            }
        };
        for line in statements.union(&executed) {
            table.record(&name, *line, executed.contains(line));
        }
    }
    Ok(table)
}

// ============================================================================
// LCOV
// ============================================================================

fn parse_lcov(text: &str, root: &Path) -> CoverageResult<LineTable> {
    let mut table = LineTable::default();
    let mut current: Option<String> = None;
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if let Some(file) = line.strip_prefix("SF:") {
            current = Some(project_name(root, file.trim()));
        } else if let Some(data) = line.strip_prefix("DA:") {
            let Some(file) = current.as_deref() else {
                continue;
            };
            let mut fields = data.split(',');
            let parsed = match (fields.next(), fields.next()) {
                (Some(number), Some(hits)) => number
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .zip(hits.trim().parse::<u64>().ok()),
                _ => None,
            };
            let Some((number, hits)) = parsed else {
                return Err(CoverageError::Malformed(format!(
                    "bad DA record on line {}",
                    index + 1
                )));
            };
            table.record(file, number, hits > 0);
        } else if line == "end_of_record" {
            current = None;
        }
    }
    Ok(table)
}

// ============================================================================
// Entry Point
// ============================================================================

fn detect_format(path: &Path, rel: &str) -> LensResult<CoverageFormat> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xml" => return Ok(CoverageFormat::Cobertura),
        "info" | "lcov" => return Ok(CoverageFormat::Lcov),
        "html" | "htm" => {
            return Err(LensError::unsupported_format(
                rel,
                "HTML coverage reports are not machine-readable; generate coverage.xml",
            ))
        }
        _ => {}
    }

    let mut header = [0u8; 16];
    let is_sqlite = fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut header))
        .is_ok()
        && header.as_slice() == SQLITE_MAGIC;
    if is_sqlite || name == ".coverage" || name.starts_with(".coverage.") {
        if !is_sqlite {
            return Err(LensError::unsupported_format(
                rel,
                "coverage data file is not a SQLite database",
            ));
        }
        return Ok(CoverageFormat::CoverageData);
    }
    Err(LensError::unsupported_format(
        rel,
        "expected Cobertura XML, a coverage.py data file or an LCOV tracefile",
    ))
}

fn read_report_text(path: &Path, rel: &str) -> LensResult<String> {
    fs::read_to_string(path).map_err(|err| LensError::ReadError {
        path: rel.to_string(),
        message: err.to_string(),
    })
}

/// Read a coverage report. Without a name, probe [`COVERAGE_CANDIDATES`].
pub fn coverage_info(
    root: &Path,
    coverage_file: Option<&str>,
    policy: &AnalysisPolicy,
) -> LensResult<CoverageReport> {
    let rel = match coverage_file {
        Some(rel) => rel.to_string(),
        None => COVERAGE_CANDIDATES
            .iter()
            .find(|c| resolve_path(root, c).is_file())
            .map(|c| c.to_string())
            .ok_or_else(|| {
                LensError::not_found(format!(
                    "coverage data (tried {}); run tests with `pytest --cov --cov-report=xml` first",
                    COVERAGE_CANDIDATES.join(", ")
                ))
            })?,
    };
    let path = resolve_path(root, &rel);
    if !path.is_file() {
        return Err(LensError::not_found(rel));
    }

    let format = detect_format(&path, &rel)?;
    let table = match format {
        CoverageFormat::Cobertura => parse_cobertura(&read_report_text(&path, &rel)?, root),
        CoverageFormat::Lcov => parse_lcov(&read_report_text(&path, &rel)?, root),
        CoverageFormat::CoverageData => parse_coverage_data(&path, root, policy),
    }
    .map_err(|err| err.into_lens_error(&rel))?;

    let report = table.into_report(&rel, format);
    info!(
        file = %rel,
        files = report.files.len(),
        percentage = report.summary.coverage_percentage,
        "coverage report loaded"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const COBERTURA: &str = r#"<?xml version="1.0" ?>
<coverage version="7.4" line-rate="0.6">
  <sources>
    <source>.</source>
  </sources>
  <packages>
    <package name="pkg">
      <classes>
        <class name="mod.py" filename="pkg/mod.py">
          <methods>
            <method name="f"><lines><line number="1" hits="1"/></lines></method>
          </methods>
          <lines>
            <line number="1" hits="1"/>
            <line number="2" hits="3"/>
            <line number="4" hits="0"/>
          </lines>
        </class>
        <class name="done.py" filename="pkg/done.py">
          <lines>
            <line number="1" hits="1"/>
            <line number="2" hits="1"/>
          </lines>
        </class>
      </classes>
    </package>
  </packages>
</coverage>
"#;

    #[test]
    fn cobertura_report() {
        let dir = TempDir::new().unwrap();
        write(&dir, "coverage.xml", COBERTURA);
        let report = coverage_info(dir.path(), None, &AnalysisPolicy::default()).unwrap();

        assert_eq!(report.format, CoverageFormat::Cobertura);
        assert_eq!(report.coverage_file, "coverage.xml");
        let module = &report.files["pkg/mod.py"];
        assert_eq!(module.lines, vec![1, 2, 4]);
        assert_eq!(module.missed, vec![4]);
        assert_eq!(report.summary.total_lines, 5);
        assert_eq!(report.summary.covered_lines, 4);
        assert_eq!(report.summary.coverage_percentage, 80.0);
        assert_eq!(report.coverage_gaps.len(), 1);
        assert_eq!(report.coverage_gaps[0].file, "pkg/mod.py");
        assert_eq!(report.coverage_gaps[0].coverage_percentage, 66.67);
    }

    #[test]
    fn lcov_report() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "lcov.info",
            "TN:\nSF:app/core.py\nDA:1,1\nDA:2,0\nend_of_record\nSF:app/util.py\nDA:3,2\nend_of_record\n",
        );
        let report =
            coverage_info(dir.path(), Some("lcov.info"), &AnalysisPolicy::default()).unwrap();
        assert_eq!(report.format, CoverageFormat::Lcov);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files["app/core.py"].missed, vec![2]);
        assert_eq!(report.summary.covered_lines, 2);
    }

    /// Write a coverage.py data file recording `numbits` for one source path.
    fn write_coverage_data(dir: &TempDir, recorded: &str, numbits: u8) {
        let conn = Connection::open(dir.path().join(".coverage")).unwrap();
        conn.execute_batch(
            "CREATE TABLE file (id INTEGER PRIMARY KEY, path TEXT UNIQUE);
             CREATE TABLE line_bits (file_id INTEGER, context_id INTEGER, numbits BLOB);",
        )
        .unwrap();
        conn.execute("INSERT INTO file (id, path) VALUES (1, ?1)", [recorded])
            .unwrap();
        conn.execute(
            "INSERT INTO line_bits (file_id, context_id, numbits) VALUES (1, 1, ?1)",
            [vec![numbits]],
        )
        .unwrap();
    }

    #[test]
    fn coverage_data_file() {
        let dir = TempDir::new().unwrap();
        write(&dir, "m.py", "def f():\n    return 1\n\ndef g():\n    return 2\n");
        let recorded = dir.path().join("m.py").to_string_lossy().into_owned();
        // Lines 1, 2 and 4.
        write_coverage_data(&dir, &recorded, 0x16);

        let report = coverage_info(dir.path(), None, &AnalysisPolicy::default()).unwrap();
        assert_eq!(report.format, CoverageFormat::CoverageData);
        let m = &report.files["m.py"];
        assert_eq!(m.lines, vec![1, 2, 4, 5]);
        assert_eq!(m.covered, vec![1, 2, 4]);
        assert_eq!(m.missed, vec![5]);
    }

    #[test]
    fn coverage_data_with_broken_source() {
        let dir = TempDir::new().unwrap();
        write(&dir, "broken.py", "def f(:\n");
        let broken = dir.path().join("broken.py").to_string_lossy().into_owned();
        write_coverage_data(&dir, &broken, 0x06);

        let report = coverage_info(dir.path(), None, &AnalysisPolicy::default()).unwrap();
        let file = &report.files["broken.py"];
        assert_eq!(file.lines, vec![1, 2]);
        assert!(file.missed.is_empty());
        assert_eq!(report.summary.coverage_percentage, 100.0);
    }

    #[test]
    fn numbits_decoding() {
        assert_eq!(numbits_to_lines(&[0x16]), vec![1, 2, 4]);
        assert_eq!(numbits_to_lines(&[0x00, 0x01]), vec![8]);
        assert!(numbits_to_lines(&[]).is_empty());
    }

    #[test]
    fn missing_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let policy = AnalysisPolicy::default();
        let err = coverage_info(dir.path(), None, &policy).unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert!(err.to_string().contains("coverage.xml"));

        write(&dir, "htmlcov/index.html", "<html></html>");
        let err = coverage_info(dir.path(), None, &policy).unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");

        write(&dir, ".coverage", "!coverage.py: This is a private format");
        let err = coverage_info(dir.path(), None, &policy).unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");

        let err = coverage_info(dir.path(), Some("nope.xml"), &policy).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn malformed_xml_is_unsupported() {
        let dir = TempDir::new().unwrap();
        write(&dir, "coverage.xml", "<coverage><class filename=\"a.py\"><line number=\"x\" hits=\"1\"/></class></coverage>");
        let err = coverage_info(dir.path(), None, &AnalysisPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), "unsupported_format");
    }
}
