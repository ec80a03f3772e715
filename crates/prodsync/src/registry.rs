//! 字段注册表 - 声明哪些实体字段参与变更检测
//!
//! diff 只遍历注册表（而非实体自身的字段集合），未注册的字段对本子系统完全
//! 不可见，实体新增字段不会悄悄进入审计范围。注册表是显式的有序列表，
//! 不做任何反射。

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// 字段语义类型，决定取值范围与比较规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    NullableText,
    Integer,
    NullableInteger,
    Real,
    NullableReal,
    Boolean,
    DateTime,
    /// 外键引用，仅按 id 比较，不解析被引用对象
    Reference,
    NullableReference,
}

impl FieldKind {
    /// 该类型是否允许显式 NULL（清空字段）
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            FieldKind::NullableText
                | FieldKind::NullableInteger
                | FieldKind::NullableReal
                | FieldKind::NullableReference
        )
    }

    /// 检查取值与类型是否兼容
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => self.is_nullable(),
            (FieldKind::Text | FieldKind::NullableText, FieldValue::Text(_)) => true,
            (FieldKind::Integer | FieldKind::NullableInteger, FieldValue::Integer(_)) => true,
            (FieldKind::Real | FieldKind::NullableReal, FieldValue::Real(_)) => true,
            (FieldKind::Boolean, FieldValue::Boolean(_)) => true,
            (FieldKind::DateTime, FieldValue::DateTime(_)) => true,
            (FieldKind::Reference | FieldKind::NullableReference, FieldValue::Reference(_)) => true,
            _ => false,
        }
    }
}

/// 字段取值
///
/// 数值/布尔/时间一律精确相等比较（业务标识与开关，不是测量值，无 epsilon）。
/// serde 采用显式 tag，避免 Integer/DateTime/Reference 在 JSON 里互相混淆。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// epoch 毫秒
    DateTime(i64),
    /// 被引用行的 id
    Reference(i64),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// 实体快照：字段名 → 取值。缺失的注册字段在比较时视为 NULL。
pub type Snapshot = HashMap<String, FieldValue>;

/// 注册表条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedField {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl TrackedField {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// 某一实体类型的有序字段注册表
///
/// 迭代顺序 = 声明顺序，diff 输出按此排序，台账记录因此稳定可读。
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    entity: &'static str,
    fields: Vec<TrackedField>,
}

impl FieldRegistry {
    pub fn new(entity: &'static str, fields: Vec<TrackedField>) -> Self {
        Self { entity, fields }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn fields(&self) -> &[TrackedField] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&TrackedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Product 实体的注册表：约 70 个异构字段（编码、名称、外键、理化指标、
    /// 营养值、开关、文案）。新增需要审计的字段时在这里登记。
    pub fn product() -> Self {
        use FieldKind::*;
        Self::new(
            "product",
            vec![
                // 标识与编码
                TrackedField::new("code", Text),
                TrackedField::new("name", Text),
                TrackedField::new("full_name", NullableText),
                TrackedField::new("description", NullableText),
                TrackedField::new("ean_code", NullableText),
                TrackedField::new("article_number", NullableText),
                TrackedField::new("customs_tariff_number", NullableText),
                TrackedField::new("internal_batch_prefix", NullableText),
                // 外键引用
                TrackedField::new("brand_id", NullableReference),
                TrackedField::new("category_id", NullableReference),
                TrackedField::new("product_group_id", NullableReference),
                TrackedField::new("supplier_id", NullableReference),
                TrackedField::new("manufacturer_id", NullableReference),
                TrackedField::new("recipe_id", NullableReference),
                TrackedField::new("unit_id", NullableReference),
                TrackedField::new("default_warehouse_id", NullableReference),
                TrackedField::new("responsible_user_id", NullableReference),
                TrackedField::new("country_of_origin_id", NullableReference),
                // 物理属性
                TrackedField::new("net_weight", NullableReal),
                TrackedField::new("gross_weight", NullableReal),
                TrackedField::new("tare_weight", NullableReal),
                TrackedField::new("density", NullableReal),
                TrackedField::new("volume", NullableReal),
                TrackedField::new("length_mm", NullableReal),
                TrackedField::new("width_mm", NullableReal),
                TrackedField::new("height_mm", NullableReal),
                // 包装与订货
                TrackedField::new("shelf_life_days", NullableInteger),
                TrackedField::new("min_order_quantity", NullableInteger),
                TrackedField::new("units_per_package", NullableInteger),
                TrackedField::new("packages_per_pallet", NullableInteger),
                TrackedField::new("pallet_layers", NullableInteger),
                // 存储条件
                TrackedField::new("storage_temperature_min", NullableReal),
                TrackedField::new("storage_temperature_max", NullableReal),
                TrackedField::new("humidity_min", NullableReal),
                TrackedField::new("humidity_max", NullableReal),
                // 理化指标
                TrackedField::new("ph_value", NullableReal),
                TrackedField::new("brix_value", NullableReal),
                TrackedField::new("alcohol_content", NullableReal),
                TrackedField::new("dry_matter_percent", NullableReal),
                // 营养成分（每 100g）
                TrackedField::new("energy_kj", NullableReal),
                TrackedField::new("energy_kcal", NullableReal),
                TrackedField::new("fat_g", NullableReal),
                TrackedField::new("saturated_fat_g", NullableReal),
                TrackedField::new("carbohydrates_g", NullableReal),
                TrackedField::new("sugar_g", NullableReal),
                TrackedField::new("protein_g", NullableReal),
                TrackedField::new("salt_g", NullableReal),
                TrackedField::new("fiber_g", NullableReal),
                // 开关与状态
                TrackedField::new("active", Boolean),
                TrackedField::new("blocked", Boolean),
                TrackedField::new("discontinued", Boolean),
                TrackedField::new("organic", Boolean),
                TrackedField::new("vegan", Boolean),
                TrackedField::new("vegetarian", Boolean),
                TrackedField::new("gluten_free", Boolean),
                TrackedField::new("lactose_free", Boolean),
                TrackedField::new("frozen", Boolean),
                TrackedField::new("hazardous", Boolean),
                TrackedField::new("sample_required", Boolean),
                TrackedField::new("specification_required", Boolean),
                // 文案
                TrackedField::new("declaration_text", NullableText),
                TrackedField::new("ingredients_text", NullableText),
                TrackedField::new("allergen_text", NullableText),
                TrackedField::new("storage_instructions", NullableText),
                TrackedField::new("preparation_instructions", NullableText),
                TrackedField::new("production_site", NullableText),
                TrackedField::new("quality_class", NullableText),
                // 商务
                TrackedField::new("list_price", NullableReal),
                TrackedField::new("currency", NullableText),
                TrackedField::new("vat_rate", NullableReal),
                // 规格版本
                TrackedField::new("specification_version", NullableInteger),
                TrackedField::new("specification_updated_at", DateTime),
            ],
        )
    }
}
