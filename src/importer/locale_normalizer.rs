// ==========================================
// 高校开放数据入库系统 - 区域格式标准化器
// ==========================================
// 职责: 原始单元格文本 → 标准类型值（纯函数,无副作用）
// 规则: 逗号小数 / 千分位 / 紧凑日期 / 定长编码 / 文本 TRIM + NULL 标准化
// ==========================================

use crate::domain::records::CanonicalValue;
use crate::domain::types::TargetType;
use crate::importer::ingest_trait::LocaleNormalizer as LocaleNormalizerTrait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// 单元格解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldParseError {
    #[error("值为空")]
    Empty,

    #[error("无法解析为金额: {0}")]
    InvalidDecimal(String),

    #[error("金额为负数: {0}")]
    NegativeAmount(String),

    #[error("金额小数位超过两位: {0}")]
    ExcessPrecision(String),

    #[error("日期格式错误: {0}")]
    InvalidDate(String),

    #[error("日期时间格式错误: {0}")]
    InvalidTimestamp(String),

    #[error("无法解析为整数: {0}")]
    InvalidInteger(String),

    #[error("编码格式错误（期望 {width} 位数字）: {value}")]
    InvalidCode { value: String, width: usize },
}

/// 非文本字段视为空值的标记
const NULL_MARKERS: [&str; 4] = ["NA", "N/A", "NULL", "-"];

pub struct LocaleNormalizer;

impl LocaleNormalizerTrait for LocaleNormalizer {
    fn normalize(&self, raw: &str, target: TargetType) -> Result<CanonicalValue, FieldParseError> {
        match target {
            TargetType::Text => Ok(self.clean_text(raw)),
            _ => {
                let value = strip_quotes(raw.trim());
                if value.is_empty() || NULL_MARKERS.iter().any(|m| value.eq_ignore_ascii_case(m)) {
                    return Ok(CanonicalValue::Null);
                }
                match target {
                    TargetType::DecimalAmount => self.parse_amount(value).map(CanonicalValue::Decimal),
                    TargetType::CompactDate => {
                        self.parse_compact_date(value).map(CanonicalValue::Date)
                    }
                    TargetType::IsoDate => self.parse_iso_date(value).map(CanonicalValue::Date),
                    TargetType::Timestamp => {
                        self.parse_timestamp(value).map(CanonicalValue::Timestamp)
                    }
                    TargetType::FixedWidthCode { width } => {
                        self.pad_code(value, width).map(CanonicalValue::Code)
                    }
                    TargetType::Integer => self.parse_integer(value).map(CanonicalValue::Integer),
                    TargetType::Text => Ok(self.clean_text(value)),
                }
            }
        }
    }
}

impl LocaleNormalizer {
    /// 文本: TRIM + 去掉一对外层双引号; 空串 → Null
    pub fn clean_text(&self, raw: &str) -> CanonicalValue {
        let value = strip_quotes(raw.trim()).trim();
        if value.is_empty() {
            CanonicalValue::Null
        } else {
            CanonicalValue::Text(value.to_string())
        }
    }

    /// 金额: 去千分位、逗号小数转句点,定标为两位小数
    ///
    /// 超过两位的有效小数不做舍入,直接报错
    pub fn parse_amount(&self, raw: &str) -> Result<Decimal, FieldParseError> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '€')
            .collect();

        let canonical = canonicalize_separators(&compact)
            .ok_or_else(|| FieldParseError::InvalidDecimal(raw.to_string()))?;

        let amount = Decimal::from_str(&canonical)
            .map_err(|_| FieldParseError::InvalidDecimal(raw.to_string()))?;

        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(FieldParseError::NegativeAmount(raw.to_string()));
        }

        if amount.normalize().scale() > 2 {
            return Err(FieldParseError::ExcessPrecision(raw.to_string()));
        }

        let mut scaled = amount;
        scaled.rescale(2);
        Ok(scaled)
    }

    /// 紧凑日期 YYYYMMDD（兼容同列混入的 YYYY-MM-DD）
    pub fn parse_compact_date(&self, raw: &str) -> Result<NaiveDate, FieldParseError> {
        NaiveDate::parse_from_str(raw, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
            .map_err(|_| FieldParseError::InvalidDate(raw.to_string()))
    }

    /// ISO 日期 YYYY-MM-DD（兼容 DD/MM/YYYY）
    pub fn parse_iso_date(&self, raw: &str) -> Result<NaiveDate, FieldParseError> {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
            .map_err(|_| FieldParseError::InvalidDate(raw.to_string()))
    }

    /// 日期时间（多格式依次尝试,带时区的统一换算为 UTC）
    pub fn parse_timestamp(&self, raw: &str) -> Result<NaiveDateTime, FieldParseError> {
        const FORMATS: [&str; 6] = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y%m%d%H%M%S",
            "%d/%m/%Y %H:%M:%S",
        ];

        for fmt in FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Ok(ts);
            }
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.naive_utc());
        }

        // 仅日期 → 当天零点
        self.parse_iso_date(raw)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| FieldParseError::InvalidTimestamp(raw.to_string()))
    }

    /// 定长编码: 左补零到 width 位（幂等: "23" → "023", "023" → "023"）
    pub fn pad_code(&self, raw: &str, width: usize) -> Result<String, FieldParseError> {
        let invalid = || FieldParseError::InvalidCode {
            value: raw.to_string(),
            width,
        };

        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let significant = raw.trim_start_matches('0');
        if significant.len() > width {
            return Err(invalid());
        }

        Ok(format!("{:0>width$}", significant, width = width))
    }

    /// 整数（兼容 "2017.0" / "2017,0"）
    pub fn parse_integer(&self, raw: &str) -> Result<i64, FieldParseError> {
        if let Ok(v) = raw.parse::<i64>() {
            return Ok(v);
        }

        raw.split_once(['.', ','])
            .filter(|(_, frac)| !frac.is_empty() && frac.chars().all(|c| c == '0'))
            .and_then(|(int_part, _)| int_part.parse::<i64>().ok())
            .ok_or_else(|| FieldParseError::InvalidInteger(raw.to_string()))
    }
}

/// 去掉一对外层双引号
fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// 统一小数分隔符为 '.',去除千分位
///
/// - 同时出现 '.' 与 ',': 后出现者为小数点
/// - 仅出现一次 ',': 小数点（西欧格式）
/// - 仅出现一次 '.' 且形如 "1.234"（1-3 位整数 + 3 位): 千分位
/// - 同一分隔符出现多次: 千分位
fn canonicalize_separators(value: &str) -> Option<String> {
    let sign_stripped = value.strip_prefix(['-', '+']).unwrap_or(value);
    if sign_stripped.is_empty()
        || !sign_stripped
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',')
    {
        return None;
    }

    let dots = value.matches('.').count();
    let commas = value.matches(',').count();

    let canonical = match (dots, commas) {
        (0, 0) => value.to_string(),
        (1, 0) if is_thousands_group(sign_stripped) => value.replace('.', ""),
        (1, 0) => value.to_string(),
        (_, 0) => value.replace('.', ""),
        (0, 1) => value.replace(',', "."),
        (0, _) => value.replace(',', ""),
        _ => {
            let last_dot = value.rfind('.')?;
            let last_comma = value.rfind(',')?;
            if last_comma > last_dot {
                if commas > 1 {
                    return None;
                }
                value.replace('.', "").replace(',', ".")
            } else {
                if dots > 1 {
                    return None;
                }
                value.replace(',', "")
            }
        }
    };

    Some(canonical)
}

/// 单个句点是否为千分位: 前 1-3 位数字,后恰好 3 位数字
fn is_thousands_group(value: &str) -> bool {
    match value.split_once('.') {
        Some((int_part, frac)) => (1..=3).contains(&int_part.len()) && frac.len() == 3,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_comma_and_period_decimal_equivalent() {
        let normalizer = LocaleNormalizer;
        let comma = normalizer.parse_amount("1234,56").unwrap();
        let period = normalizer.parse_amount("1234.56").unwrap();
        assert_eq!(comma, dec("1234.56"));
        assert_eq!(comma, period);
    }

    #[test]
    fn test_amount_thousands_separators() {
        let normalizer = LocaleNormalizer;
        assert_eq!(normalizer.parse_amount("1.234,56").unwrap(), dec("1234.56"));
        assert_eq!(normalizer.parse_amount("1,234.56").unwrap(), dec("1234.56"));
        assert_eq!(normalizer.parse_amount("1.234.567").unwrap(), dec("1234567.00"));
        assert_eq!(normalizer.parse_amount("1 234,5").unwrap(), dec("1234.50"));
        assert_eq!(normalizer.parse_amount("12.345,6").unwrap(), dec("12345.60"));
    }

    #[test]
    fn test_lone_dot_with_three_digits_is_thousands() {
        let normalizer = LocaleNormalizer;
        assert_eq!(normalizer.parse_amount("1.234").unwrap(), dec("1234.00"));
        assert_eq!(normalizer.parse_amount("12.500").unwrap(), dec("12500.00"));
        assert_eq!(normalizer.parse_amount("999.000 €").unwrap(), dec("999000.00"));
        // 小数点仍按小数处理
        assert_eq!(normalizer.parse_amount("1234.5").unwrap(), dec("1234.50"));
        assert_eq!(normalizer.parse_amount("0.25").unwrap(), dec("0.25"));
    }

    #[test]
    fn test_amount_excess_precision_is_error() {
        let normalizer = LocaleNormalizer;
        assert!(matches!(
            normalizer.parse_amount("1234.567"),
            Err(FieldParseError::ExcessPrecision(_))
        ));
        assert!(matches!(
            normalizer.parse_amount("12.345,678"),
            Err(FieldParseError::ExcessPrecision(_))
        ));
        // 末尾零不算精度损失
        assert_eq!(normalizer.parse_amount("1,500").unwrap(), dec("1.50"));
    }

    #[test]
    fn test_amount_always_two_fraction_digits() {
        let normalizer = LocaleNormalizer;
        let value = normalizer.parse_amount("42").unwrap();
        assert_eq!(value.scale(), 2);
        assert_eq!(value.to_string(), "42.00");
    }

    #[test]
    fn test_amount_rejects_garbage_and_negative() {
        let normalizer = LocaleNormalizer;
        assert!(matches!(
            normalizer.parse_amount("doce"),
            Err(FieldParseError::InvalidDecimal(_))
        ));
        assert!(matches!(
            normalizer.parse_amount("1,2,3.4,5"),
            Err(FieldParseError::InvalidDecimal(_))
        ));
        assert!(matches!(
            normalizer.parse_amount("-10,00"),
            Err(FieldParseError::NegativeAmount(_))
        ));
    }

    #[test]
    fn test_empty_and_null_markers() {
        let normalizer = LocaleNormalizer;
        assert_eq!(
            normalizer.normalize("", TargetType::DecimalAmount).unwrap(),
            CanonicalValue::Null
        );
        assert_eq!(
            normalizer.normalize(" NA ", TargetType::DecimalAmount).unwrap(),
            CanonicalValue::Null
        );
        assert_eq!(
            normalizer.normalize("   ", TargetType::Text).unwrap(),
            CanonicalValue::Null
        );
        assert_eq!(
            normalizer.normalize("", TargetType::CompactDate).unwrap(),
            CanonicalValue::Null
        );
    }

    #[test]
    fn test_institution_code_idempotent() {
        let normalizer = LocaleNormalizer;
        assert_eq!(normalizer.pad_code("23", 3).unwrap(), "023");
        assert_eq!(normalizer.pad_code("023", 3).unwrap(), "023");
        assert_eq!(normalizer.pad_code("0023", 3).unwrap(), "023");

        let once = normalizer.pad_code("7", 3).unwrap();
        let twice = normalizer.pad_code(&once, 3).unwrap();
        assert_eq!(once, twice);

        assert_eq!(
            normalizer
                .normalize("\"23\"", TargetType::FixedWidthCode { width: 3 })
                .unwrap(),
            CanonicalValue::Code("023".to_string())
        );
    }

    #[test]
    fn test_code_rejects_non_digits_and_overflow() {
        let normalizer = LocaleNormalizer;
        assert!(normalizer.pad_code("2A", 3).is_err());
        assert!(normalizer.pad_code("1234", 3).is_err());
    }

    #[test]
    fn test_compact_date() {
        let normalizer = LocaleNormalizer;
        assert_eq!(
            normalizer.parse_compact_date("20171015").unwrap(),
            NaiveDate::from_ymd_opt(2017, 10, 15).unwrap()
        );
        assert_eq!(
            normalizer.parse_compact_date("2017-10-15").unwrap(),
            NaiveDate::from_ymd_opt(2017, 10, 15).unwrap()
        );
        assert!(normalizer.parse_compact_date("20171345").is_err());
        assert!(normalizer.parse_compact_date("15 oct").is_err());
    }

    #[test]
    fn test_iso_date_with_spanish_fallback() {
        let normalizer = LocaleNormalizer;
        assert_eq!(
            normalizer.parse_iso_date("15/10/2017").unwrap(),
            NaiveDate::from_ymd_opt(2017, 10, 15).unwrap()
        );
    }

    #[test]
    fn test_timestamp_formats() {
        let normalizer = LocaleNormalizer;
        let expected = NaiveDate::from_ymd_opt(2019, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(normalizer.parse_timestamp("2019-03-01 10:30:00").unwrap(), expected);
        assert_eq!(normalizer.parse_timestamp("2019-03-01T10:30:00").unwrap(), expected);
        assert_eq!(
            normalizer.parse_timestamp("2019-03-01T11:30:00+01:00").unwrap(),
            expected
        );
        assert_eq!(
            normalizer.parse_timestamp("2019-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2019, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(normalizer.parse_timestamp("ayer").is_err());
    }

    #[test]
    fn test_integer() {
        let normalizer = LocaleNormalizer;
        assert_eq!(normalizer.parse_integer("2017").unwrap(), 2017);
        assert_eq!(normalizer.parse_integer("2017.0").unwrap(), 2017);
        assert!(normalizer.parse_integer("2017.5").is_err());
        assert!(normalizer.parse_integer("dos mil").is_err());
    }

    #[test]
    fn test_text_trim_and_quotes() {
        let normalizer = LocaleNormalizer;
        assert_eq!(
            normalizer.clean_text("  \"Capítulo 1\"  "),
            CanonicalValue::Text("Capítulo 1".to_string())
        );
        assert_eq!(
            normalizer.clean_text("Gastos de personal "),
            CanonicalValue::Text("Gastos de personal".to_string())
        );
    }
}
