//! Spreadsheet decoding.
//!
//! Every supported format is flattened to [`SourceRow`]s: the data row
//! number plus `(header, cell text)` pairs. Interpretation of the cells is
//! left to the loader.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader};
use serde_json::Value;
use tracing::debug;

use crate::error::{ImportError, ImportRowError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
    Jsonl,
}

impl FileFormat {
    /// Pick the format from a file name's extension.
    pub fn from_filename(name: &str) -> Result<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            "jsonl" | "ndjson" => Ok(FileFormat::Jsonl),
            _ => Err(ImportError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// One data row. `number` is 1-based and excludes the header.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub number: usize,
    pub fields: Vec<(String, String)>,
}

impl SourceRow {
    fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.trim().is_empty())
    }
}

pub type RowResult = std::result::Result<SourceRow, ImportRowError>;

/// Decode `bytes` as `format`. Rows that cannot be decoded are returned as
/// row errors; blank rows are skipped.
pub fn read_rows(format: FileFormat, bytes: &[u8]) -> Result<Vec<RowResult>> {
    let rows = match format {
        FileFormat::Csv => read_csv(bytes)?,
        FileFormat::Xlsx | FileFormat::Xls => read_workbook(bytes)?,
        FileFormat::Jsonl => read_jsonl(bytes),
    };
    let rows: Vec<RowResult> = rows
        .into_iter()
        .filter(|r| !matches!(r, Ok(row) if row.is_blank()))
        .collect();
    debug!(?format, rows = rows.len(), "Decoded import file");
    Ok(rows)
}

// ── CSV ───────────────────────────────────────────────────────────────────────

fn read_csv(bytes: &[u8]) -> Result<Vec<RowResult>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    // Archive exports carry `#` comment preambles.
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ImportError::Unreadable(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(ImportError::Empty);
    }

    let rows = reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let number = i + 1;
            let record = record.map_err(|e| ImportRowError::unreadable(number, e.to_string()))?;
            let fields = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect();
            Ok(SourceRow { number, fields })
        })
        .collect();
    Ok(rows)
}

// ── Excel ─────────────────────────────────────────────────────────────────────

fn read_workbook(bytes: &[u8]) -> Result<Vec<RowResult>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::Empty)?
        .map_err(|e| ImportError::Unreadable(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(ImportError::Empty)?
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let rows = rows
        .enumerate()
        .map(|(i, cells)| {
            let fields = headers
                .iter()
                .zip(cells)
                .filter(|(h, _)| !h.is_empty())
                .map(|(h, cell)| (h.clone(), cell.to_string()))
                .collect();
            Ok(SourceRow { number: i + 1, fields })
        })
        .collect();
    Ok(rows)
}

// ── JSON lines ────────────────────────────────────────────────────────────────

fn read_jsonl(bytes: &[u8]) -> Vec<RowResult> {
    let text = String::from_utf8_lossy(bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes));
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let number = i + 1;
            match serde_json::from_str::<Value>(line) {
                Ok(Value::Object(obj)) => {
                    let fields = obj.into_iter().map(|(k, v)| (k, scalar_text(v))).collect();
                    Ok(SourceRow { number, fields })
                }
                Ok(_) => Err(ImportRowError::unreadable(number, "expected a JSON object")),
                Err(e) => Err(ImportRowError::unreadable(number, format!("invalid JSON: {e}"))),
            }
        })
        .collect()
}

fn scalar_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::io::Write;

    const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const PKG_RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
    const DOC_RELS_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    /// Minimal `.xlsx` with `rows` on its only sheet. Cells that parse as
    /// numbers are stored as numbers and the rest as shared strings. `None`
    /// leaves a cell out; an empty slice leaves the whole row out.
    pub(crate) fn workbook(rows: &[&[Option<&str>]]) -> Vec<u8> {
        let mut strings: Vec<String> = Vec::new();
        let mut sheet = String::new();
        for (r, cells) in rows.iter().enumerate() {
            if cells.is_empty() {
                continue;
            }
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, cell) in cells.iter().enumerate() {
                let Some(text) = cell else { continue };
                let reference = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                if text.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{reference}"><v>{text}</v></c>"#));
                } else {
                    strings.push(text.to_string());
                    sheet.push_str(&format!(r#"<c r="{reference}" t="s"><v>{}</v></c>"#, strings.len() - 1));
                }
            }
            sheet.push_str("</row>");
        }
        let shared: String = strings.iter().map(|s| format!("<si><t>{s}</t></si>")).collect();

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_RELS_NS}"><Relationship Id="rId1" Type="{DOC_RELS_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
            ),
            (
                "xl/workbook.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{MAIN_NS}" xmlns:r="{DOC_RELS_NS}"><sheets><sheet name="KOI" sheetId="1" r:id="rId1"/></sheets></workbook>"#),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PKG_RELS_NS}"><Relationship Id="rId1" Type="{DOC_RELS_NS}/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{DOC_RELS_NS}/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#),
            ),
            (
                "xl/worksheets/sheet1.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{MAIN_NS}"><sheetData>{sheet}</sheetData></worksheet>"#),
            ),
            (
                "xl/sharedStrings.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="{MAIN_NS}" count="{n}" uniqueCount="{n}">{shared}</sst>"#, n = strings.len()),
            ),
        ];

        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in parts {
            zip.start_file(name, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub(crate) const KOI_HEADER: [Option<&str>; 11] = [
        Some("kepoi_name"),
        Some("koi_disposition"),
        Some("koi_period"),
        Some("koi_duration"),
        Some("koi_prad"),
        Some("koi_srad"),
        Some("koi_smass"),
        Some("koi_steff"),
        Some("koi_depth"),
        Some("koi_impact"),
        Some("koi_teq"),
    ];

    /// Header, a complete row, a row with blank optional cells, a blank
    /// row, then a row missing its planetary radius.
    pub(crate) fn koi_workbook() -> Vec<u8> {
        workbook(&[
            &KOI_HEADER,
            &[
                Some("K00752.01"), Some("CONFIRMED"), Some("9.488036"), Some("2.9575"), Some("2.26"),
                Some("0.927"), Some("0.919"), Some("5455"), Some("615.8"), Some("0.146"), Some("793"),
            ],
            &[
                Some("K00753.01"), Some("CANDIDATE"), Some("112.305"), Some("4.507"), Some("3.14"),
                Some("0.868"), None, Some("5853"), None, Some("0.586"), None,
            ],
            &[],
            &[
                Some("K00754.01"), Some("FALSE POSITIVE"), Some("1.736952"), Some("2.406"), None,
                Some("0.791"), Some("0.836"), Some("5805"), Some("10829"), Some("0.969"), Some("1395"),
            ],
        ])
    }

    #[rstest]
    #[case("kepler.csv", FileFormat::Csv)]
    #[case("TOI.XLSX", FileFormat::Xlsx)]
    #[case("old.xls", FileFormat::Xls)]
    #[case("dump.jsonl", FileFormat::Jsonl)]
    fn test_format_from_extension(#[case] name: &str, #[case] expected: FileFormat) {
        assert_eq!(FileFormat::from_filename(name).unwrap(), expected);
    }

    #[rstest]
    #[case("planets.pdf")]
    #[case("noextension")]
    #[case("archive.csv.gz")]
    fn test_unsupported_extension(#[case] name: &str) {
        assert!(matches!(FileFormat::from_filename(name), Err(ImportError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_csv_with_bom_comments_and_blank_rows() {
        let data = b"\xEF\xBB\xBF# exported from the archive\nkepoi_name,koi_period\nK00752.01, 9.48 \n,\nK00753.01,19.9\n";
        let rows = read_rows(FileFormat::Csv, data).unwrap();
        assert_eq!(rows.len(), 2);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.number, 1);
        assert_eq!(
            first.fields,
            vec![("kepoi_name".to_string(), "K00752.01".to_string()), ("koi_period".to_string(), "9.48".to_string())]
        );
        // The blank row keeps its number slot.
        assert_eq!(rows[1].as_ref().unwrap().number, 3);
    }

    #[test]
    fn test_csv_header_only_is_empty() {
        let rows = read_rows(FileFormat::Csv, b"name,koi_period\n").unwrap();
        assert!(rows.is_empty());
        assert!(matches!(read_rows(FileFormat::Csv, b""), Err(ImportError::Empty)));
    }

    #[test]
    fn test_csv_invalid_utf8_row_is_row_error() {
        let rows = read_rows(FileFormat::Csv, b"name,koi_period\nok,1\n\xFF\xFE,2\n").unwrap();
        assert!(rows[0].is_ok());
        let err = rows[1].as_ref().unwrap_err();
        assert_eq!(err.row, 2);
        assert!(err.errors.contains("row"));
    }

    #[test]
    fn test_jsonl_rows() {
        let data = br#"{"name": "TOI-700 d", "pl_orbper": 37.42, "toi": null}

not json
[1, 2]
"#;
        let rows = read_rows(FileFormat::Jsonl, data).unwrap();
        assert_eq!(rows.len(), 3);

        let first = rows[0].as_ref().unwrap();
        assert!(first.fields.contains(&("pl_orbper".to_string(), "37.42".to_string())));
        assert!(first.fields.contains(&("toi".to_string(), String::new())));
        assert_eq!(rows[1].as_ref().unwrap_err().row, 2);
        assert_eq!(rows[2].as_ref().unwrap_err().row, 3);
    }

    #[test]
    fn test_xlsx_rows() {
        let rows = read_rows(FileFormat::Xlsx, &koi_workbook()).unwrap();
        assert_eq!(rows.len(), 3);

        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.number, 1);
        let headers: Vec<&str> = first.fields.iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(headers, KOI_HEADER.iter().flatten().copied().collect::<Vec<_>>());

        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.number, 2);
        let cell = |name: &str| second.fields.iter().find(|(h, _)| h == name).map(|(_, v)| v.as_str());
        assert_eq!(cell("kepoi_name"), Some("K00753.01"));
        assert_eq!(cell("koi_period"), Some("112.305"));
        assert_eq!(cell("koi_steff"), Some("5853"));
        assert_eq!(cell("koi_smass"), Some(""));
        assert_eq!(cell("koi_teq"), Some(""));

        // The blank sheet row keeps its number slot.
        assert_eq!(rows[2].as_ref().unwrap().number, 4);
    }

    #[test]
    fn test_garbage_workbook_is_unreadable() {
        let err = read_rows(FileFormat::Xlsx, b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, ImportError::Unreadable(_)), "got {err:?}");
    }
}
