// ==========================================
// 高校开放数据入库系统 - 文件解析器实现
// ==========================================
// 阶段 0: 文件读取、解码与解析
// 编码: UTF-8 / Windows-1252,首选编码失败时回退到另一种
// ==========================================

use crate::domain::records::StagingRow;
use crate::domain::report::{RejectReason, RowRejection};
use crate::domain::types::SourceEncoding;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::ingest_trait::{FileParser, ParsedFile};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ==========================================
// 解码
// ==========================================

/// Windows-1252 在 0x80..=0x9F 区间的字符; None 为未定义字节
const CP1252_C1: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

/// 单字节西欧编码解码（Windows-1252,Latin-1 的超集）
fn decode_single_byte(bytes: &[u8]) -> Option<String> {
    bytes
        .iter()
        .map(|&b| match b {
            0x80..=0x9F => CP1252_C1[usize::from(b - 0x80)],
            _ => Some(char::from(b)),
        })
        .collect()
}

/// 按指定编码严格解码; 失败返回 None
pub fn decode_strict(bytes: &[u8], encoding: SourceEncoding) -> Option<String> {
    match encoding {
        SourceEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
        SourceEncoding::Latin1 => decode_single_byte(bytes),
    }
}

/// 首选编码 → 回退编码
///
/// 带 UTF-8 BOM 的文件只按 UTF-8 解码; 含多字节序列的合法 UTF-8 不按单字节编码解读
pub fn decode_with_fallback(
    bytes: &[u8],
    preferred: SourceEncoding,
) -> Option<(String, SourceEncoding)> {
    if let Some(body) = bytes.strip_prefix(UTF8_BOM) {
        return decode_strict(body, SourceEncoding::Utf8).map(|s| (s, SourceEncoding::Utf8));
    }

    if preferred == SourceEncoding::Latin1 && !bytes.is_ascii() {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Some((text.to_string(), SourceEncoding::Utf8));
        }
    }

    [preferred, preferred.fallback()]
        .into_iter()
        .find_map(|enc| decode_strict(bytes, enc).map(|s| (s, enc)))
}

/// 表头规范化: TRIM + 去引号 + 小写
fn normalize_header(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_lowercase()
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    fn read_decoded(
        &self,
        file_path: &Path,
        preferred: SourceEncoding,
    ) -> ImportResult<(String, SourceEncoding)> {
        // 检查文件存在
        if !file_path.exists() {
            return Err(ImportError::FileNotFound(file_path.display().to_string()));
        }

        let bytes = std::fs::read(file_path)?;
        decode_with_fallback(&bytes, preferred).ok_or_else(|| ImportError::EncodingError {
            file: file_path.display().to_string(),
            tried: format!("{}, {}", preferred, preferred.fallback()),
        })
    }
}

impl FileParser for CsvParser {
    fn read_header(&self, file_path: &Path) -> ImportResult<Vec<String>> {
        let (text, _) = self.read_decoded(file_path, SourceEncoding::Utf8)?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeader(file_path.display().to_string()));
        }
        Ok(headers)
    }

    fn parse(&self, file_path: &Path, preferred: SourceEncoding) -> ImportResult<ParsedFile> {
        let (text, encoding) = self.read_decoded(file_path, preferred)?;
        if encoding != preferred {
            debug!(
                file = %file_path.display(),
                preferred = %preferred,
                used = %encoding,
                "首选编码解码失败,已回退"
            );
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致,由下方按行拒绝
            .from_reader(text.as_bytes());

        // 读取表头
        let header: Vec<String> = reader.headers()?.iter().map(normalize_header).collect();
        if header.iter().all(|h| h.is_empty()) {
            return Err(ImportError::MissingHeader(file_path.display().to_string()));
        }

        let mut rows = Vec::new();
        let mut malformed_rows = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let row_number = idx + 1;
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    malformed_rows.push(RowRejection {
                        row_number,
                        reason: RejectReason::MalformedRow {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            // 跳过完全空白的行
            if record.iter().all(|v| v.trim().is_empty()) {
                continue;
            }

            if record.len() != header.len() {
                malformed_rows.push(RowRejection {
                    row_number,
                    reason: RejectReason::MalformedRow {
                        message: format!("列数 {} 与表头列数 {} 不一致", record.len(), header.len()),
                    },
                });
                continue;
            }

            let values: HashMap<String, String> = header
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();

            rows.push(StagingRow { row_number, values });
        }

        Ok(ParsedFile {
            header,
            rows,
            malformed_rows,
            encoding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_csv_parser_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "cod_convocatoria, Nombre_Convocatoria ").unwrap();
        writeln!(temp_file, "C1,Ayudas de movilidad").unwrap();
        writeln!(temp_file, "C2,\"Becas, colaboración\"").unwrap();

        let parser = CsvParser;
        let parsed = parser
            .parse(temp_file.path(), SourceEncoding::Utf8)
            .unwrap();

        assert_eq!(parsed.header, vec!["cod_convocatoria", "nombre_convocatoria"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.encoding, SourceEncoding::Utf8);
        assert_eq!(
            parsed.rows[1].values.get("nombre_convocatoria"),
            Some(&"Becas, colaboración".to_string())
        );
        assert_eq!(parsed.rows[1].row_number, 2);
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let parser = CsvParser;
        let result = parser.parse(Path::new("non_existent.csv"), SourceEncoding::Utf8);
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_csv_parser_skip_blank_rows() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "a,b").unwrap();
        writeln!(temp_file, "1,2").unwrap();
        writeln!(temp_file, ",").unwrap();
        writeln!(temp_file, "3,4").unwrap();

        let parsed = CsvParser
            .parse(temp_file.path(), SourceEncoding::Utf8)
            .unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows_read(), 2);
        assert_eq!(parsed.rows[1].row_number, 3);
    }

    #[test]
    fn test_csv_parser_ragged_row_is_malformed() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "a,b,c").unwrap();
        writeln!(temp_file, "1,2,3").unwrap();
        writeln!(temp_file, "4,5").unwrap();

        let parsed = CsvParser
            .parse(temp_file.path(), SourceEncoding::Utf8)
            .unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.malformed_rows.len(), 1);
        assert_eq!(parsed.malformed_rows[0].row_number, 2);
        assert_eq!(parsed.rows_read(), 2);
    }

    #[test]
    fn test_latin1_file_falls_back_from_utf8() {
        let mut temp_file = NamedTempFile::new().unwrap();
        // "Autónoma" 的 Latin-1 编码: ó = 0xF3
        temp_file.write_all(b"des_universidad\nAut\xF3noma\n").unwrap();

        let parsed = CsvParser
            .parse(temp_file.path(), SourceEncoding::Utf8)
            .unwrap();
        assert_eq!(parsed.encoding, SourceEncoding::Latin1);
        assert_eq!(
            parsed.rows[0].values.get("des_universidad"),
            Some(&"Autónoma".to_string())
        );
    }

    #[test]
    fn test_utf8_file_is_not_read_as_single_byte() {
        let mut temp_file = NamedTempFile::new().unwrap();
        // UTF-8 的 "€" = E2 82 AC,按 Windows-1252 也能解出乱码 "â‚¬"
        writeln!(temp_file, "importe").unwrap();
        writeln!(temp_file, "12 €").unwrap();

        let parsed = CsvParser
            .parse(temp_file.path(), SourceEncoding::Latin1)
            .unwrap();
        assert_eq!(parsed.encoding, SourceEncoding::Utf8);
        assert_eq!(parsed.rows[0].values.get("importe"), Some(&"12 €".to_string()));
    }

    #[test]
    fn test_undecodable_file_is_encoding_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        // 非法 UTF-8 且含 Windows-1252 未定义字节 0x81
        temp_file.write_all(b"a\n\xFF\x81\n").unwrap();

        let result = CsvParser.parse(temp_file.path(), SourceEncoding::Utf8);
        assert!(matches!(result, Err(ImportError::EncodingError { .. })));
    }

    #[test]
    fn test_bom_forces_utf8_and_is_stripped() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"\xEF\xBB\xBFanio,importe\n2017,1\n").unwrap();

        let header = CsvParser.read_header(temp_file.path()).unwrap();
        assert_eq!(header, vec!["anio", "importe"]);

        let parsed = CsvParser
            .parse(temp_file.path(), SourceEncoding::Latin1)
            .unwrap();
        assert_eq!(parsed.encoding, SourceEncoding::Utf8);
        assert!(parsed.rows[0].values.contains_key("anio"));
    }

    #[test]
    fn test_decode_strict_single_byte_maps_cp1252() {
        assert_eq!(
            decode_strict(b"caf\xE9", SourceEncoding::Latin1),
            Some("café".to_string())
        );
        assert_eq!(
            decode_strict(b"\x93sede\x94 1.000 \x80 \x96", SourceEncoding::Latin1),
            Some("\u{201C}sede\u{201D} 1.000 € \u{2013}".to_string())
        );
        for undefined in [0x81u8, 0x8D, 0x8F, 0x90, 0x9D] {
            assert_eq!(decode_strict(&[b'x', undefined], SourceEncoding::Latin1), None);
        }
    }

    #[test]
    fn test_cp1252_file_decodes_with_utf8_preferred() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"objeto,importe\n\x93Obras\x94,1.000 \x80\n")
            .unwrap();

        let parsed = CsvParser
            .parse(temp_file.path(), SourceEncoding::Utf8)
            .unwrap();
        assert_eq!(parsed.encoding, SourceEncoding::Latin1);
        assert_eq!(
            parsed.rows[0].values.get("importe"),
            Some(&"1.000 €".to_string())
        );
    }
}
