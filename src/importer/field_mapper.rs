// ==========================================
// 高校开放数据入库系统 - 字段映射器实现
// ==========================================
// 职责: 原始列 → 标准字段（按版本映射）+ 标准化 + 组装实体记录
// 行策略:
// - 必填字段格式错误 / 非空字段为空 → 拒绝整行
// - 可选字段格式错误 → 降级为空值并记录告警
// ==========================================

use crate::domain::records::{
    BudgetLine, CanonicalValue, EntityRecord, FieldWarning, Grant, GrantCall, NormalizedRow,
    ProcurementContract, RowOutcome, StagingRow,
};
use crate::domain::report::RejectReason;
use crate::domain::types::EntityType;
use crate::importer::ingest_trait::{FieldMapper as FieldMapperTrait, LocaleNormalizer as _};
use crate::importer::locale_normalizer::{FieldParseError, LocaleNormalizer};
use crate::importer::schema_registry::{EntitySchema, LayoutMapping};
use rust_decimal::Decimal;

/// 单行映射结果（告警与结果分开,拒绝行的告警同样保留）
#[derive(Debug, Clone)]
pub struct MappedRow {
    pub row_number: usize,
    pub outcome: RowOutcome,
    pub warnings: Vec<FieldWarning>,
}

pub struct FieldMapper {
    normalizer: LocaleNormalizer,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMapper {
    pub fn new() -> Self {
        Self {
            normalizer: LocaleNormalizer,
        }
    }

    /// 暂存行 → 行结果（标准化 + 组装）
    pub fn map_row(
        &self,
        row: &StagingRow,
        schema: &EntitySchema,
        layout: &LayoutMapping,
        source_year: Option<i32>,
    ) -> MappedRow {
        match self.normalize_row(row, schema, layout, source_year) {
            Ok(normalized) => MappedRow {
                row_number: row.row_number,
                outcome: self.build_record(layout.entity, &normalized),
                warnings: normalized.warnings,
            },
            Err(reason) => MappedRow {
                row_number: row.row_number,
                outcome: RowOutcome::Rejected(reason),
                warnings: Vec::new(),
            },
        }
    }

    fn build(&self, entity: EntityType, row: &NormalizedRow) -> Result<EntityRecord, RejectReason> {
        match entity {
            EntityType::BudgetExpense => Ok(EntityRecord::BudgetExpense(budget_line(row)?)),
            EntityType::BudgetIncome => Ok(EntityRecord::BudgetIncome(budget_line(row)?)),
            EntityType::GrantCall => {
                let call = GrantCall {
                    cod_convocatoria: required_string(row, "cod_convocatoria")?,
                    cod_universidad: foreign_key(row, "cod_universidad")?,
                    nombre_convocatoria: row.string("nombre_convocatoria"),
                    fecha_inicio_solicitudes: row.date("fecha_inicio_solicitudes"),
                    fecha_fin_solicitudes: row.date("fecha_fin_solicitudes"),
                    des_categoria: row.string("des_categoria"),
                };
                if let (Some(from), Some(to)) =
                    (call.fecha_inicio_solicitudes, call.fecha_fin_solicitudes)
                {
                    if from > to {
                        return Err(RejectReason::InvalidDateRange {
                            from_field: "fecha_inicio_solicitudes".to_string(),
                            to_field: "fecha_fin_solicitudes".to_string(),
                        });
                    }
                }
                Ok(EntityRecord::GrantCall(call))
            }
            EntityType::Grant => Ok(EntityRecord::Grant(Grant {
                cod_universidad: foreign_key(row, "cod_universidad")?,
                cod_convocatoria_ayuda: row.string("cod_convocatoria_ayuda"),
                cuantia_total: row.decimal("cuantia_total"),
                anio: row.year_or_source("anio"),
                fecha_concesion: row.date("fecha_concesion"),
            })),
            EntityType::ProcurementContract => {
                Ok(EntityRecord::ProcurementContract(ProcurementContract {
                    identificador: required_string(row, "identificador")?,
                    // 缺失标段统一为 ""（参与组合唯一键）
                    lote: row.string("lote").unwrap_or_default(),
                    nif_oc: foreign_key(row, "nif_oc")?,
                    primera_publicacion: row.timestamp("primera_publicacion"),
                    presupuesto_base: row.decimal("presupuesto_base"),
                    importe_adjudicacion: row.decimal("importe_adjudicacion"),
                    resultado: row.string("resultado"),
                    identificador_adjudicatario: row.string("identificador_adjudicatario"),
                    adjudicatario: row.string("adjudicatario"),
                    objeto: row.string("objeto"),
                    link_licitacion: row.string("link_licitacion"),
                    financiacion_europea: row.string("financiacion_europea"),
                }))
            }
            EntityType::Institution => Err(RejectReason::MalformedRow {
                message: "大学为种子实体,不从文件加载".to_string(),
            }),
        }
    }
}

impl FieldMapperTrait for FieldMapper {
    fn normalize_row(
        &self,
        row: &StagingRow,
        schema: &EntitySchema,
        layout: &LayoutMapping,
        source_year: Option<i32>,
    ) -> Result<NormalizedRow, RejectReason> {
        let mut normalized = NormalizedRow {
            row_number: row.row_number,
            source_year,
            ..Default::default()
        };

        for (raw_column, canonical) in &layout.columns {
            // 注册时已保证映射目标存在
            let Some(spec) = schema.field(canonical) else {
                continue;
            };
            let raw = row.values.get(raw_column).map(String::as_str).unwrap_or("");

            match self.normalizer.normalize(raw, spec.target) {
                Ok(CanonicalValue::Null) if spec.mandatory && !spec.nullable => {
                    return Err(RejectReason::MalformedField {
                        field: spec.name.to_string(),
                        message: FieldParseError::Empty.to_string(),
                    });
                }
                Ok(value) => {
                    normalized.values.insert(spec.name, value);
                }
                Err(e) if spec.mandatory => {
                    return Err(RejectReason::MalformedField {
                        field: spec.name.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    normalized.warnings.push(FieldWarning {
                        row_number: row.row_number,
                        field: spec.name.to_string(),
                        message: e.to_string(),
                    });
                    normalized.values.insert(spec.name, CanonicalValue::Null);
                }
            }
        }

        Ok(normalized)
    }

    fn build_record(&self, entity: EntityType, row: &NormalizedRow) -> RowOutcome {
        match self.build(entity, row) {
            Ok(record) => RowOutcome::Accepted(record),
            Err(reason) => RowOutcome::Rejected(reason),
        }
    }
}

// ==========================================
// 组装辅助
// ==========================================

fn budget_line(row: &NormalizedRow) -> Result<BudgetLine, RejectReason> {
    Ok(BudgetLine {
        cod_universidad: foreign_key(row, "cod_universidad")?,
        anio: row
            .integer("anio")
            .and_then(|y| i32::try_from(y).ok())
            .ok_or_else(|| missing_field("anio"))?,
        cod_partida: row.string("cod_partida"),
        des_capitulo: row.string("des_capitulo"),
        des_articulo: row.string("des_articulo"),
        des_concepto: row.string("des_concepto"),
        credito_inicial: required_decimal(row, "credito_inicial")?,
        modificaciones: required_decimal(row, "modificaciones")?,
        credito_total: required_decimal(row, "credito_total")?,
    })
}

/// 外键为空时无法解析
fn foreign_key(row: &NormalizedRow, field: &str) -> Result<String, RejectReason> {
    row.string(field)
        .ok_or_else(|| RejectReason::UnresolvedForeignKey {
            field: field.to_string(),
        })
}

fn required_string(row: &NormalizedRow, field: &str) -> Result<String, RejectReason> {
    row.string(field).ok_or_else(|| missing_field(field))
}

fn required_decimal(row: &NormalizedRow, field: &str) -> Result<Decimal, RejectReason> {
    row.decimal(field).ok_or_else(|| missing_field(field))
}

fn missing_field(field: &str) -> RejectReason {
    RejectReason::MalformedField {
        field: field.to_string(),
        message: FieldParseError::Empty.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::schema_registry::SchemaRegistry;
    use std::collections::HashMap;
    use std::str::FromStr;

    fn staging(row_number: usize, pairs: &[(&str, &str)]) -> StagingRow {
        StagingRow {
            row_number,
            values: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    fn map(entity: EntityType, version: u32, row: &StagingRow, year: Option<i32>) -> MappedRow {
        let registry = SchemaRegistry::builtin().unwrap();
        let schema = registry.schema(entity).unwrap();
        let layout = registry.lookup(entity, version).unwrap();
        FieldMapper::new().map_row(row, schema, layout, year)
    }

    fn budget_row(total: &str) -> StagingRow {
        staging(
            1,
            &[
                ("cod_universidad", "\"23\""),
                ("anio", "2017"),
                ("des_capitulo", " Gastos de personal "),
                ("des_articulo", "Funcionarios"),
                ("des_concepto", "Retribuciones básicas"),
                ("credito_inicial", "1.234,56"),
                ("modificaciones", "0"),
                ("credito_total", total),
            ],
        )
    }

    #[test]
    fn test_budget_row_accepted() {
        let mapped = map(EntityType::BudgetExpense, 1, &budget_row("1234,56"), None);
        match mapped.outcome {
            RowOutcome::Accepted(EntityRecord::BudgetExpense(line)) => {
                assert_eq!(line.cod_universidad, "023");
                assert_eq!(line.anio, 2017);
                assert_eq!(line.des_capitulo.as_deref(), Some("Gastos de personal"));
                assert_eq!(line.credito_inicial, Decimal::from_str("1234.56").unwrap());
                assert_eq!(line.credito_total, line.credito_inicial);
                assert_eq!(line.cod_partida, None);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_mandatory_amount_rejects_row() {
        let mapped = map(EntityType::BudgetIncome, 1, &budget_row("mil"), None);
        match mapped.outcome {
            RowOutcome::Rejected(reason) => {
                assert_eq!(reason.summary_key(), "malformed field: credito_total")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_budget_year_never_taken_from_file_name() {
        let mut row = budget_row("1234,56");
        row.values.insert("anio".to_string(), String::new());
        let mapped = map(EntityType::BudgetExpense, 1, &row, Some(2019));
        match mapped.outcome {
            RowOutcome::Rejected(reason) => {
                assert_eq!(reason.summary_key(), "malformed field: anio")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_empty_mandatory_amount_rejects_row() {
        let mapped = map(EntityType::BudgetIncome, 1, &budget_row(""), None);
        assert!(matches!(
            mapped.outcome,
            RowOutcome::Rejected(RejectReason::MalformedField { ref field, .. }) if field == "credito_total"
        ));
    }

    #[test]
    fn test_malformed_optional_field_degrades_with_warning() {
        let row = staging(
            7,
            &[
                ("cod_universidad", "023"),
                ("cod_convocatoria_ayuda", "C1"),
                ("cuantia_total", "mucho"),
            ],
        );
        let mapped = map(EntityType::Grant, 1, &row, Some(2017));
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.warnings[0].field, "cuantia_total");
        assert_eq!(mapped.warnings[0].row_number, 7);

        match mapped.outcome {
            RowOutcome::Accepted(EntityRecord::Grant(grant)) => {
                assert_eq!(grant.cuantia_total, None);
                assert_eq!(grant.anio, Some(2017));
                assert_eq!(grant.cod_convocatoria_ayuda.as_deref(), Some("C1"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_grant_with_empty_call_keeps_null_fk() {
        let row = staging(
            1,
            &[
                ("cod_universidad", "23"),
                ("cod_convocatoria_ayuda", ""),
                ("cuantia_total", "100"),
            ],
        );
        let mapped = map(EntityType::Grant, 1, &row, None);
        match mapped.outcome {
            RowOutcome::Accepted(EntityRecord::Grant(grant)) => {
                assert_eq!(grant.cod_convocatoria_ayuda, None)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_malformed_parent_key_is_field_error() {
        let row = staging(
            1,
            &[
                ("cod_universidad", "U-23"),
                ("cod_convocatoria_ayuda", "C1"),
                ("cuantia_total", "100"),
            ],
        );
        let mapped = map(EntityType::Grant, 1, &row, None);
        match mapped.outcome {
            RowOutcome::Rejected(reason) => {
                assert_eq!(reason.summary_key(), "malformed field: cod_universidad")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_grant_call_invalid_date_range() {
        let row = staging(
            3,
            &[
                ("cod_convocatoria", "C9"),
                ("cod_universidad", "23"),
                ("nombre_convocatoria", "Movilidad"),
                ("fecha_inicio_solicitudes", "20180301"),
                ("fecha_fin_solicitudes", "20180101"),
            ],
        );
        let mapped = map(EntityType::GrantCall, 1, &row, None);
        match mapped.outcome {
            RowOutcome::Rejected(reason) => {
                assert_eq!(reason.summary_key(), "invalid date range")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_contract_renamed_columns_and_empty_lot() {
        let row = staging(
            1,
            &[
                ("identificador", "100"),
                ("nif_oc", "Q2818013A"),
                ("primera_publicacion", "2019-03-01 10:30:00"),
                ("presupuesto_base_sin_impuestos_licitacion_o_lote", "10.000,00"),
                ("importe_adjudicacion_sin_impuestos_licitacion_o_lote", "9500,5"),
                ("resultado_licitacion_o_lote", "Adjudicada"),
                ("identificador_adjudicatario_de_la_licitacion_o_lote", "B12345678"),
                ("objeto_licitacion_o_lote", "Suministro"),
                ("link_licitacion", "https://contrataciondelestado.es/x"),
                ("columna_ignorada", "x"),
            ],
        );
        let mapped = map(EntityType::ProcurementContract, 1, &row, Some(2019));
        match mapped.outcome {
            RowOutcome::Accepted(EntityRecord::ProcurementContract(c)) => {
                assert_eq!(c.lote, "");
                assert_eq!(c.presupuesto_base, Some(Decimal::from_str("10000.00").unwrap()));
                assert_eq!(
                    c.importe_adjudicacion,
                    Some(Decimal::from_str("9500.50").unwrap())
                );
                assert_eq!(c.resultado.as_deref(), Some("Adjudicada"));
                assert!(c.primera_publicacion.is_some());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_contract_empty_tax_id_is_unresolved_fk() {
        let row = staging(
            1,
            &[
                ("identificador", "100"),
                ("nif_oc", ""),
                ("primera_publicacion", ""),
                ("presupuesto_base_sin_impuestos_licitacion_o_lote", ""),
                ("importe_adjudicacion_sin_impuestos_licitacion_o_lote", ""),
                ("resultado_licitacion_o_lote", ""),
                ("identificador_adjudicatario_de_la_licitacion_o_lote", ""),
                ("objeto_licitacion_o_lote", ""),
                ("link_licitacion", ""),
            ],
        );
        let mapped = map(EntityType::ProcurementContract, 1, &row, None);
        match mapped.outcome {
            RowOutcome::Rejected(reason) => {
                assert_eq!(reason.to_string(), "unresolved foreign key: nif_oc")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
