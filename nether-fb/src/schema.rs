//! Schema files
//!
//! A schema maps field names to vtable slots and types for every table, and
//! gives the size and field offsets of every inline struct. Schemas are plain
//! TOML so they can be shipped next to the data they describe:
//!
//! ```toml
//! root_type = "Scene"
//! endian = "little"
//! file_identifier = "NCSC"
//!
//! [tables.Scene]
//! fields = [
//!     { name = "version", slot = 0, type = "u8", default = 1 },
//!     { name = "names", slot = 1, type = "[table:Name]" },
//! ]
//!
//! [tables.Name]
//! fields = [
//!     { name = "h", slot = 0, type = "u64" },
//!     { name = "v", slot = 1, type = "string" },
//! ]
//! ```
//!
//! Type names: the scalars (`bool`, `u8`..`u64`, `i8`..`i64`, `f32`, `f64`,
//! plus the flatbuffers spellings `ubyte`, `int`, `float`, ...), `string`,
//! `table:<Name>`, `struct:<Name>` and `[<element>]` for vectors.
//!
//! Loading links every type reference; the result is always internally
//! consistent, so readers can look tables and structs up by id without
//! checking.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::buffer::{FILE_IDENTIFIER_LENGTH, RootOptions, UOFFSET_SIZE};
use crate::endian::Endian;

/// Error loading or linking a schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("root type `{0}` is not a declared table")]
    MissingRoot(String),

    #[error("{owner}.{field}: unknown type `{ty}`")]
    UnknownType {
        owner: String,
        field: String,
        ty: String,
    },

    #[error("{owner}.{field}: type `{ty}` is not allowed here")]
    InvalidPlacement {
        owner: String,
        field: String,
        ty: String,
    },

    #[error("{owner}: slot {slot} is used by both `{first}` and `{second}`")]
    DuplicateSlot {
        owner: String,
        slot: u16,
        first: String,
        second: String,
    },

    #[error("{owner}: field `{field}` is declared twice")]
    DuplicateField { owner: String, field: String },

    #[error("struct {owner}: field `{field}` ({width} bytes at offset {offset}) overflows size {size}")]
    StructOverflow {
        owner: String,
        field: String,
        offset: usize,
        width: usize,
        size: usize,
    },

    #[error("struct {0} has size 0")]
    EmptyStruct(String),

    #[error("struct {owner}: nested struct `{field}` must be smaller than its parent")]
    RecursiveStruct { owner: String, field: String },

    #[error("{owner}.{field}: default {value} does not fit type `{ty}`")]
    BadDefault {
        owner: String,
        field: String,
        value: String,
        ty: String,
    },

    #[error("file identifier `{0}` must be exactly 4 ASCII bytes")]
    BadIdentifier(String),
}

// =============================================================================
// Types
// =============================================================================

/// Primitive field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => ScalarType::Bool,
            "u8" | "ubyte" => ScalarType::U8,
            "i8" | "byte" => ScalarType::I8,
            "u16" | "ushort" => ScalarType::U16,
            "i16" | "short" => ScalarType::I16,
            "u32" | "uint" => ScalarType::U32,
            "i32" | "int" => ScalarType::I32,
            "u64" | "ulong" => ScalarType::U64,
            "i64" | "long" => ScalarType::I64,
            "f32" | "float" => ScalarType::F32,
            "f64" | "double" => ScalarType::F64,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::U8 => "u8",
            ScalarType::I8 => "i8",
            ScalarType::U16 => "u16",
            ScalarType::I16 => "i16",
            ScalarType::U32 => "u32",
            ScalarType::I32 => "i32",
            ScalarType::U64 => "u64",
            ScalarType::I64 => "i64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }

    /// Width in bytes.
    pub fn width(self) -> usize {
        match self {
            ScalarType::Bool | ScalarType::U8 | ScalarType::I8 => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::U64 | ScalarType::I64 | ScalarType::F64 => 8,
        }
    }

    /// The value an omitted field of this type stands for.
    pub fn zero(self) -> ScalarValue {
        match self {
            ScalarType::Bool => ScalarValue::Bool(false),
            ScalarType::U8 | ScalarType::U16 | ScalarType::U32 | ScalarType::U64 => {
                ScalarValue::UInt(0)
            }
            ScalarType::I8 | ScalarType::I16 | ScalarType::I32 | ScalarType::I64 => {
                ScalarValue::Int(0)
            }
            ScalarType::F32 | ScalarType::F64 => ScalarValue::Float(0.0),
        }
    }

    fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Inclusive integer range, for checking defaults.
    fn int_range(self) -> Option<(i128, i128)> {
        Some(match self {
            ScalarType::U8 => (0, u8::MAX as i128),
            ScalarType::I8 => (i8::MIN as i128, i8::MAX as i128),
            ScalarType::U16 => (0, u16::MAX as i128),
            ScalarType::I16 => (i16::MIN as i128, i16::MAX as i128),
            ScalarType::U32 => (0, u32::MAX as i128),
            ScalarType::I32 => (i32::MIN as i128, i32::MAX as i128),
            ScalarType::U64 => (0, u64::MAX as i128),
            ScalarType::I64 => (i64::MIN as i128, i64::MAX as i128),
            _ => return None,
        })
    }
}

/// A decoded scalar, widened to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Int(v) => write!(f, "{v}"),
            ScalarValue::UInt(v) => write!(f, "{v}"),
            ScalarValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Index of a table definition in its [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId(usize);

/// Index of a struct definition in its [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructId(usize);

/// Type of a vector element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Scalar(ScalarType),
    String,
    Table(TableId),
    Struct(StructId),
}

/// Type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    String,
    Table(TableId),
    Struct(StructId),
    Vector(ElementType),
}

impl FieldType {
    /// True for fields stored as a uoffset to out-of-line data.
    pub fn is_offset(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Table(_) | FieldType::Vector(_)
        )
    }
}

/// Type of a struct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructFieldType {
    Scalar(ScalarType),
    Struct(StructId),
}

/// One table field: name, vtable slot, type and optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub slot: u16,
    pub ty: FieldType,
    /// Only scalar fields carry defaults.
    pub default: Option<ScalarValue>,
}

impl FieldDef {
    /// Value an absent scalar field decodes to.
    pub fn default_value(&self) -> Option<ScalarValue> {
        match self.ty {
            FieldType::Scalar(scalar) => Some(self.default.unwrap_or(scalar.zero())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    /// Sorted by slot.
    pub fields: Vec<FieldDef>,
}

impl TableDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_slot(&self, slot: u16) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.slot == slot)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructFieldDef {
    pub name: String,
    pub offset: usize,
    pub ty: StructFieldType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub size: usize,
    /// Sorted by offset. Empty for opaque structs known only by size.
    pub fields: Vec<StructFieldDef>,
}

// =============================================================================
// Schema
// =============================================================================

/// A linked schema.
#[derive(Debug, Clone)]
pub struct Schema {
    root: TableId,
    endian: Endian,
    file_identifier: Option<[u8; FILE_IDENTIFIER_LENGTH]>,
    file_extension: Option<String>,
    tables: Vec<TableDef>,
    structs: Vec<StructDef>,
    table_index: HashMap<String, TableId>,
    struct_index: HashMap<String, StructId>,
}

impl Schema {
    /// Load and link a schema file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and link a schema from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let raw: RawSchema = toml::from_str(content)?;
        link(raw)
    }

    pub fn root(&self) -> TableId {
        self.root
    }

    pub fn root_table(&self) -> &TableDef {
        self.table(self.root)
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn file_identifier(&self) -> Option<[u8; FILE_IDENTIFIER_LENGTH]> {
        self.file_identifier
    }

    pub fn file_extension(&self) -> Option<&str> {
        self.file_extension.as_deref()
    }

    /// Root lookup options implied by the schema.
    pub fn root_options(&self) -> RootOptions {
        RootOptions {
            identifier: self.file_identifier,
        }
    }

    pub fn table(&self, id: TableId) -> &TableDef {
        &self.tables[id.0]
    }

    pub fn struct_def(&self, id: StructId) -> &StructDef {
        &self.structs[id.0]
    }

    pub fn table_by_name(&self, name: &str) -> Option<TableId> {
        self.table_index.get(name).copied()
    }

    pub fn struct_by_name(&self, name: &str) -> Option<StructId> {
        self.struct_index.get(name).copied()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.iter()
    }

    pub fn structs(&self) -> impl Iterator<Item = &StructDef> {
        self.structs.iter()
    }

    /// Stride of one vector element.
    pub fn element_width(&self, element: ElementType) -> usize {
        match element {
            ElementType::Scalar(scalar) => scalar.width(),
            ElementType::String | ElementType::Table(_) => UOFFSET_SIZE,
            ElementType::Struct(id) => self.struct_def(id).size,
        }
    }

    /// Inline width of a table field.
    pub fn field_width(&self, ty: FieldType) -> usize {
        match ty {
            FieldType::Scalar(scalar) => scalar.width(),
            FieldType::Struct(id) => self.struct_def(id).size,
            FieldType::String | FieldType::Table(_) | FieldType::Vector(_) => UOFFSET_SIZE,
        }
    }

    /// Type as written in a schema file.
    pub fn type_name(&self, ty: FieldType) -> String {
        match ty {
            FieldType::Scalar(scalar) => scalar.name().to_string(),
            FieldType::String => "string".to_string(),
            FieldType::Table(id) => format!("table:{}", self.table(id).name),
            FieldType::Struct(id) => format!("struct:{}", self.struct_def(id).name),
            FieldType::Vector(element) => format!("[{}]", self.element_name(element)),
        }
    }

    fn element_name(&self, element: ElementType) -> String {
        match element {
            ElementType::Scalar(scalar) => scalar.name().to_string(),
            ElementType::String => "string".to_string(),
            ElementType::Table(id) => format!("table:{}", self.table(id).name),
            ElementType::Struct(id) => format!("struct:{}", self.struct_def(id).name),
        }
    }
}

// =============================================================================
// TOML representation and linking
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSchema {
    root_type: String,
    #[serde(default)]
    endian: Endian,
    file_identifier: Option<String>,
    file_extension: Option<String>,
    #[serde(default)]
    tables: BTreeMap<String, RawTable>,
    #[serde(default)]
    structs: BTreeMap<String, RawStruct>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    slot: u16,
    #[serde(rename = "type")]
    ty: String,
    default: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStruct {
    size: usize,
    #[serde(default)]
    fields: Vec<RawStructField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStructField {
    name: String,
    offset: usize,
    #[serde(rename = "type")]
    ty: String,
}

/// A type string before placement checks.
enum ParsedType {
    Scalar(ScalarType),
    String,
    Table(TableId),
    Struct(StructId),
    Vector(Box<ParsedType>),
}

struct Linker {
    table_index: HashMap<String, TableId>,
    struct_index: HashMap<String, StructId>,
}

impl Linker {
    fn parse(&self, ty: &str) -> Option<ParsedType> {
        let ty = ty.trim();
        if let Some(inner) = ty.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            return self.parse(inner).map(|t| ParsedType::Vector(Box::new(t)));
        }
        if ty == "string" {
            return Some(ParsedType::String);
        }
        if let Some(name) = ty.strip_prefix("table:") {
            return self.table_index.get(name.trim()).copied().map(ParsedType::Table);
        }
        if let Some(name) = ty.strip_prefix("struct:") {
            return self.struct_index.get(name.trim()).copied().map(ParsedType::Struct);
        }
        ScalarType::parse(ty).map(ParsedType::Scalar)
    }

    fn table_field_type(&self, owner: &str, field: &str, ty: &str) -> Result<FieldType, SchemaError> {
        let parsed = self.parse(ty).ok_or_else(|| SchemaError::UnknownType {
            owner: owner.to_string(),
            field: field.to_string(),
            ty: ty.to_string(),
        })?;
        let invalid = || SchemaError::InvalidPlacement {
            owner: owner.to_string(),
            field: field.to_string(),
            ty: ty.to_string(),
        };
        Ok(match parsed {
            ParsedType::Scalar(scalar) => FieldType::Scalar(scalar),
            ParsedType::String => FieldType::String,
            ParsedType::Table(id) => FieldType::Table(id),
            ParsedType::Struct(id) => FieldType::Struct(id),
            ParsedType::Vector(element) => FieldType::Vector(match *element {
                ParsedType::Scalar(scalar) => ElementType::Scalar(scalar),
                ParsedType::String => ElementType::String,
                ParsedType::Table(id) => ElementType::Table(id),
                ParsedType::Struct(id) => ElementType::Struct(id),
                ParsedType::Vector(_) => return Err(invalid()),
            }),
        })
    }

    fn struct_field_type(
        &self,
        owner: &str,
        field: &str,
        ty: &str,
    ) -> Result<StructFieldType, SchemaError> {
        match self.parse(ty) {
            Some(ParsedType::Scalar(scalar)) => Ok(StructFieldType::Scalar(scalar)),
            Some(ParsedType::Struct(id)) => Ok(StructFieldType::Struct(id)),
            Some(_) => Err(SchemaError::InvalidPlacement {
                owner: owner.to_string(),
                field: field.to_string(),
                ty: ty.to_string(),
            }),
            None => Err(SchemaError::UnknownType {
                owner: owner.to_string(),
                field: field.to_string(),
                ty: ty.to_string(),
            }),
        }
    }
}

fn parse_default(
    owner: &str,
    field: &RawField,
    ty: FieldType,
    value: &toml::Value,
) -> Result<ScalarValue, SchemaError> {
    let bad = || SchemaError::BadDefault {
        owner: owner.to_string(),
        field: field.name.clone(),
        value: value.to_string(),
        ty: field.ty.clone(),
    };
    let FieldType::Scalar(scalar) = ty else {
        return Err(bad());
    };

    match (scalar, value) {
        (ScalarType::Bool, toml::Value::Boolean(v)) => Ok(ScalarValue::Bool(*v)),
        (s, toml::Value::Float(v)) if s.is_float() => Ok(ScalarValue::Float(*v)),
        (s, toml::Value::Integer(v)) if s.is_float() => Ok(ScalarValue::Float(*v as f64)),
        (s, toml::Value::Integer(v)) => {
            let (min, max) = s.int_range().ok_or_else(bad)?;
            let wide = *v as i128;
            if wide < min || wide > max {
                return Err(bad());
            }
            if min == 0 {
                Ok(ScalarValue::UInt(*v as u64))
            } else {
                Ok(ScalarValue::Int(*v))
            }
        }
        _ => Err(bad()),
    }
}

fn parse_identifier(text: &str) -> Result<[u8; FILE_IDENTIFIER_LENGTH], SchemaError> {
    if !text.is_ascii() {
        return Err(SchemaError::BadIdentifier(text.to_string()));
    }
    text.as_bytes()
        .try_into()
        .map_err(|_| SchemaError::BadIdentifier(text.to_string()))
}

fn link(raw: RawSchema) -> Result<Schema, SchemaError> {
    let linker = Linker {
        table_index: raw
            .tables
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), TableId(i)))
            .collect(),
        struct_index: raw
            .structs
            .keys()
            .enumerate()
            .map(|(i, name)| (name.clone(), StructId(i)))
            .collect(),
    };

    let root = linker
        .table_index
        .get(&raw.root_type)
        .copied()
        .ok_or_else(|| SchemaError::MissingRoot(raw.root_type.clone()))?;

    let file_identifier = raw
        .file_identifier
        .as_deref()
        .map(parse_identifier)
        .transpose()?;

    let mut structs = Vec::with_capacity(raw.structs.len());
    for (name, raw_struct) in &raw.structs {
        let mut fields: Vec<StructFieldDef> = Vec::with_capacity(raw_struct.fields.len());
        for raw_field in &raw_struct.fields {
            if fields.iter().any(|f| f.name == raw_field.name) {
                return Err(SchemaError::DuplicateField {
                    owner: name.clone(),
                    field: raw_field.name.clone(),
                });
            }
            let ty = linker.struct_field_type(name, &raw_field.name, &raw_field.ty)?;
            fields.push(StructFieldDef {
                name: raw_field.name.clone(),
                offset: raw_field.offset,
                ty,
            });
        }
        fields.sort_by_key(|f| f.offset);
        if raw_struct.size == 0 {
            return Err(SchemaError::EmptyStruct(name.clone()));
        }
        structs.push(StructDef {
            name: name.clone(),
            size: raw_struct.size,
            fields,
        });
    }

    // Struct sizes are all known now; check field extents.
    for def in &structs {
        for field in &def.fields {
            let width = match field.ty {
                StructFieldType::Scalar(scalar) => scalar.width(),
                StructFieldType::Struct(id) => {
                    let nested = structs[id.0].size;
                    if nested >= def.size {
                        return Err(SchemaError::RecursiveStruct {
                            owner: def.name.clone(),
                            field: field.name.clone(),
                        });
                    }
                    nested
                }
            };
            if field.offset.saturating_add(width) > def.size {
                return Err(SchemaError::StructOverflow {
                    owner: def.name.clone(),
                    field: field.name.clone(),
                    offset: field.offset,
                    width,
                    size: def.size,
                });
            }
        }
    }

    let mut tables = Vec::with_capacity(raw.tables.len());
    for (name, raw_table) in &raw.tables {
        let mut fields: Vec<FieldDef> = Vec::with_capacity(raw_table.fields.len());
        for raw_field in &raw_table.fields {
            if fields.iter().any(|f| f.name == raw_field.name) {
                return Err(SchemaError::DuplicateField {
                    owner: name.clone(),
                    field: raw_field.name.clone(),
                });
            }
            if let Some(other) = fields.iter().find(|f| f.slot == raw_field.slot) {
                return Err(SchemaError::DuplicateSlot {
                    owner: name.clone(),
                    slot: raw_field.slot,
                    first: other.name.clone(),
                    second: raw_field.name.clone(),
                });
            }
            let ty = linker.table_field_type(name, &raw_field.name, &raw_field.ty)?;
            let default = raw_field
                .default
                .as_ref()
                .map(|value| parse_default(name, raw_field, ty, value))
                .transpose()?;
            fields.push(FieldDef {
                name: raw_field.name.clone(),
                slot: raw_field.slot,
                ty,
                default,
            });
        }
        fields.sort_by_key(|f| f.slot);
        tables.push(TableDef {
            name: name.clone(),
            fields,
        });
    }

    Ok(Schema {
        root,
        endian: raw.endian,
        file_identifier,
        file_extension: raw.file_extension,
        tables,
        structs,
        table_index: linker.table_index,
        struct_index: linker.struct_index,
    })
}
