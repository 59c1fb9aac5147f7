// ==========================================
// 高校开放数据入库系统 - 模式注册表
// ==========================================
// 职责: 每种实体的标准目标模式 + 各历史版本的原始列映射
// 红线: 注册时即校验（必填字段必须被映射,不允许映射到未知字段）
// ==========================================

use crate::domain::types::{EntityType, TargetType};
use crate::importer::error::{ImportError, ImportResult};
use std::collections::{HashMap, HashSet};

/// 大学编码默认位数
pub const DEFAULT_CODE_WIDTH: usize = 3;

// ==========================================
// FieldSpec - 目标字段定义
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub target: TargetType,
    pub mandatory: bool, // 每个版本映射都必须提供该字段
    pub nullable: bool,  // 值可为空（外键为空时交给外键校验拒绝）
}

impl FieldSpec {
    pub fn required(name: &'static str, target: TargetType) -> Self {
        Self {
            name,
            target,
            mandatory: true,
            nullable: false,
        }
    }

    /// 外键字段: 必须映射,值为空时由外键校验拒绝
    pub fn foreign_key(name: &'static str, target: TargetType) -> Self {
        Self {
            name,
            target,
            mandatory: true,
            nullable: true,
        }
    }

    pub fn optional(name: &'static str, target: TargetType) -> Self {
        Self {
            name,
            target,
            mandatory: false,
            nullable: true,
        }
    }
}

// ==========================================
// EntitySchema - 实体标准模式
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub entity: EntityType,
    pub fields: Vec<FieldSpec>,
}

impl EntitySchema {
    pub fn new(entity: EntityType, fields: Vec<FieldSpec>) -> Self {
        Self { entity, fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn mandatory_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.mandatory)
    }
}

// ==========================================
// LayoutMapping - 原始列布局（某实体的某一版本）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutMapping {
    pub entity: EntityType,
    pub version: u32,
    pub columns: Vec<(String, &'static str)>, // 原始列名 → 标准字段名（保持声明顺序）
}

impl LayoutMapping {
    pub fn new(entity: EntityType, version: u32) -> Self {
        Self {
            entity,
            version,
            columns: Vec::new(),
        }
    }

    /// 原始列名与标准字段名不同
    pub fn map(mut self, raw: &str, canonical: &'static str) -> Self {
        self.columns.push((raw.to_lowercase(), canonical));
        self
    }

    /// 原始列名即标准字段名
    pub fn same(mut self, canonical: &[&'static str]) -> Self {
        for name in canonical {
            self.columns.push((name.to_lowercase(), *name));
        }
        self
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// 原始列集合是否为表头的子集
    pub fn matches_header(&self, header: &HashSet<&str>) -> bool {
        self.columns
            .iter()
            .all(|(raw, _)| header.contains(raw.as_str()))
    }

    /// 标准字段对应的原始列名
    pub fn raw_column_for(&self, canonical: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, c)| *c == canonical)
            .map(|(raw, _)| raw.as_str())
    }
}

// ==========================================
// SchemaRegistry
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<EntityType, EntitySchema>,
    layouts: Vec<LayoutMapping>, // 注册顺序
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_schema(&mut self, schema: EntitySchema) {
        self.schemas.insert(schema.entity, schema);
    }

    /// 注册版本映射
    ///
    /// # 错误
    /// - 实体模式未注册
    /// - 同一 (实体, 版本) 重复注册
    /// - 映射到未知字段 / 同一字段被映射两次
    /// - 必填字段未被映射
    pub fn register_layout(&mut self, layout: LayoutMapping) -> ImportResult<()> {
        let config_error = |message: String| ImportError::SchemaConfig {
            entity: layout.entity,
            version: layout.version,
            message,
        };

        let schema = self
            .schemas
            .get(&layout.entity)
            .ok_or_else(|| config_error("实体模式未注册".to_string()))?;

        if self
            .layouts
            .iter()
            .any(|l| l.entity == layout.entity && l.version == layout.version)
        {
            return Err(config_error("版本重复注册".to_string()));
        }

        let mut mapped: HashSet<&str> = HashSet::new();
        for (raw, canonical) in &layout.columns {
            if schema.field(canonical).is_none() {
                return Err(config_error(format!(
                    "列 {} 映射到未知字段 {}",
                    raw, canonical
                )));
            }
            if !mapped.insert(*canonical) {
                return Err(config_error(format!("字段 {} 被重复映射", canonical)));
            }
        }

        if let Some(missing) = schema
            .mandatory_fields()
            .find(|f| !mapped.contains(f.name))
        {
            return Err(config_error(format!("必填字段未映射: {}", missing.name)));
        }

        self.layouts.push(layout);
        Ok(())
    }

    pub fn lookup(&self, entity: EntityType, version: u32) -> ImportResult<&LayoutMapping> {
        self.layouts
            .iter()
            .find(|l| l.entity == entity && l.version == version)
            .ok_or(ImportError::UnknownSchema { entity, version })
    }

    pub fn schema(&self, entity: EntityType) -> ImportResult<&EntitySchema> {
        self.schemas
            .get(&entity)
            .ok_or(ImportError::UnknownSchema { entity, version: 0 })
    }

    /// 全部版本映射（注册顺序）
    pub fn layouts(&self) -> &[LayoutMapping] {
        &self.layouts
    }

    /// 已注册模式的实体类型（依赖顺序）
    pub fn entity_types(&self) -> Vec<EntityType> {
        EntityType::LOAD_ORDER
            .into_iter()
            .filter(|e| self.schemas.contains_key(e))
            .collect()
    }

    /// 内置模式（默认 3 位大学编码）
    pub fn builtin() -> ImportResult<Self> {
        Self::builtin_with_code_width(DEFAULT_CODE_WIDTH)
    }

    /// 内置模式与已知的历史列布局
    pub fn builtin_with_code_width(code_width: usize) -> ImportResult<Self> {
        let code = TargetType::FixedWidthCode { width: code_width };
        let mut registry = Self::new();

        // ----- 预算（支出/收入同构） -----
        for entity in [EntityType::BudgetExpense, EntityType::BudgetIncome] {
            registry.register_schema(EntitySchema::new(
                entity,
                vec![
                    FieldSpec::foreign_key("cod_universidad", code),
                    FieldSpec::required("anio", TargetType::Integer),
                    FieldSpec::optional("cod_partida", TargetType::Text),
                    FieldSpec::optional("des_capitulo", TargetType::Text),
                    FieldSpec::optional("des_articulo", TargetType::Text),
                    FieldSpec::optional("des_concepto", TargetType::Text),
                    FieldSpec::required("credito_inicial", TargetType::DecimalAmount),
                    FieldSpec::required("modificaciones", TargetType::DecimalAmount),
                    FieldSpec::required("credito_total", TargetType::DecimalAmount),
                ],
            ));

            let v1 = LayoutMapping::new(entity, 1).same(&[
                "cod_universidad",
                "anio",
                "des_capitulo",
                "des_articulo",
                "des_concepto",
                "credito_inicial",
                "modificaciones",
                "credito_total",
            ]);
            let v2 = v1.clone().same(&["cod_partida"]);
            registry.register_layout(v1)?;
            registry.register_layout(LayoutMapping { version: 2, ..v2 })?;
        }

        // ----- 资助项目征集 -----
        registry.register_schema(EntitySchema::new(
            EntityType::GrantCall,
            vec![
                FieldSpec::required("cod_convocatoria", TargetType::Text),
                FieldSpec::foreign_key("cod_universidad", code),
                FieldSpec::optional("nombre_convocatoria", TargetType::Text),
                FieldSpec::optional("fecha_inicio_solicitudes", TargetType::CompactDate),
                FieldSpec::optional("fecha_fin_solicitudes", TargetType::CompactDate),
                FieldSpec::optional("des_categoria", TargetType::Text),
            ],
        ));
        let call_v1 = LayoutMapping::new(EntityType::GrantCall, 1).same(&[
            "cod_convocatoria",
            "cod_universidad",
            "nombre_convocatoria",
            "fecha_inicio_solicitudes",
            "fecha_fin_solicitudes",
        ]);
        let call_v2 = call_v1.clone().same(&["des_categoria"]);
        registry.register_layout(call_v1)?;
        registry.register_layout(LayoutMapping {
            version: 2,
            ..call_v2
        })?;

        // ----- 资助发放 -----
        registry.register_schema(EntitySchema::new(
            EntityType::Grant,
            vec![
                FieldSpec::foreign_key("cod_universidad", code),
                FieldSpec::foreign_key("cod_convocatoria_ayuda", TargetType::Text),
                FieldSpec::optional("cuantia_total", TargetType::DecimalAmount),
                FieldSpec::optional("anio", TargetType::Integer),
                FieldSpec::optional("fecha_concesion", TargetType::CompactDate),
            ],
        ));
        let grant_v1 = LayoutMapping::new(EntityType::Grant, 1).same(&[
            "cod_universidad",
            "cod_convocatoria_ayuda",
            "cuantia_total",
        ]);
        let grant_v2 = grant_v1.clone().same(&["anio", "fecha_concesion"]);
        registry.register_layout(grant_v1)?;
        registry.register_layout(LayoutMapping {
            version: 2,
            ..grant_v2
        })?;

        // ----- 采购合同 -----
        registry.register_schema(EntitySchema::new(
            EntityType::ProcurementContract,
            vec![
                FieldSpec::required("identificador", TargetType::Text),
                FieldSpec::optional("lote", TargetType::Text),
                FieldSpec::foreign_key("nif_oc", TargetType::Text),
                FieldSpec::optional("primera_publicacion", TargetType::Timestamp),
                FieldSpec::optional("presupuesto_base", TargetType::DecimalAmount),
                FieldSpec::optional("importe_adjudicacion", TargetType::DecimalAmount),
                FieldSpec::optional("resultado", TargetType::Text),
                FieldSpec::optional("identificador_adjudicatario", TargetType::Text),
                FieldSpec::optional("adjudicatario", TargetType::Text),
                FieldSpec::optional("objeto", TargetType::Text),
                FieldSpec::optional("link_licitacion", TargetType::Text),
                FieldSpec::optional("financiacion_europea", TargetType::Text),
            ],
        ));
        let contract_v1 = LayoutMapping::new(EntityType::ProcurementContract, 1)
            .same(&["identificador", "nif_oc", "primera_publicacion"])
            .map(
                "presupuesto_base_sin_impuestos_licitacion_o_lote",
                "presupuesto_base",
            )
            .map(
                "importe_adjudicacion_sin_impuestos_licitacion_o_lote",
                "importe_adjudicacion",
            )
            .map("resultado_licitacion_o_lote", "resultado")
            .map(
                "identificador_adjudicatario_de_la_licitacion_o_lote",
                "identificador_adjudicatario",
            )
            .map("objeto_licitacion_o_lote", "objeto")
            .same(&["link_licitacion"]);
        let contract_v2 = contract_v1
            .clone()
            .same(&["lote"])
            .map("adjudicatario_licitacion_o_lote", "adjudicatario")
            .map(
                "descripcion_de_la_financiacion_europea",
                "financiacion_europea",
            );
        registry.register_layout(contract_v1)?;
        registry.register_layout(LayoutMapping {
            version: 2,
            ..contract_v2
        })?;

        Ok(registry)
    }
}
