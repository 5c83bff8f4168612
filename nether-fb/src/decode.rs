//! Schema-driven decoding.
//!
//! [`Decoder`] walks a table through its [`Schema`] definition and produces a
//! [`DecodedTable`] tree. Each field is decoded on its own: a field that
//! cannot be read becomes [`FieldOutcome::Failed`] and its siblings still
//! decode. Vector elements are individual results for the same reason.

use std::cell::Cell;

use crate::buffer::Buffer;
use crate::error::{ReadError, ReadResult};
use crate::schema::{
    ElementType, FieldDef, FieldType, ScalarType, ScalarValue, Schema, StructFieldType, StructId,
    TableId,
};
use crate::structs::StructView;
use crate::table::{Field, Table};
use crate::vector::Vector;

/// Default nesting limit for tables inside tables.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default number of tables decoded per root.
pub const DEFAULT_MAX_TABLES: usize = 100_000;

/// Decoding limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Tables nested deeper than this are left undecoded.
    pub max_depth: usize,
    /// Elements decoded per vector; the stored length is always reported.
    pub max_elements: usize,
    /// Tables decoded per root. Shared subtables count once per visit.
    pub max_tables: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_elements: usize::MAX,
            max_tables: DEFAULT_MAX_TABLES,
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(ScalarValue),
    String(String),
    Table(DecodedTable),
    Struct(DecodedStruct),
    Vector(DecodedVector),
}

/// What happened to one schema field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    /// Written by the writer.
    Present(Value),
    /// Left out of the vtable; the schema default applies.
    Default(Value),
    /// Offset-typed field left out of the vtable. No default exists.
    Absent,
    /// The field could not be read.
    Failed(ReadError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedField {
    pub name: String,
    pub slot: u16,
    pub outcome: FieldOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTable {
    pub type_name: String,
    pub position: usize,
    pub fields: Vec<DecodedField>,
    /// True when the depth limit or the table budget stopped decoding here.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedStruct {
    pub type_name: String,
    pub fields: Vec<(String, Value)>,
    /// Raw bytes of a struct the schema only knows by size.
    pub opaque: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVector {
    /// Stored element count.
    pub len: usize,
    /// Decoded elements, at most `max_elements` of them. When the stored
    /// length runs past the buffer end, the first missing element is the
    /// last entry.
    pub elements: Vec<ReadResult<Value>>,
}

impl DecodedTable {
    pub fn get(&self, name: &str) -> Option<&FieldOutcome> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.outcome)
    }

    /// Every failed field or element in the tree, with its field path.
    pub fn failures(&self) -> Vec<(String, ReadError)> {
        let mut out = Vec::new();
        collect_table_failures(self, &self.type_name, &mut out);
        out
    }
}

fn collect_table_failures(table: &DecodedTable, path: &str, out: &mut Vec<(String, ReadError)>) {
    for field in &table.fields {
        let field_path = format!("{path}.{}", field.name);
        match &field.outcome {
            FieldOutcome::Failed(err) => out.push((field_path, *err)),
            FieldOutcome::Present(value) => collect_value_failures(value, &field_path, out),
            FieldOutcome::Default(_) | FieldOutcome::Absent => {}
        }
    }
}

fn collect_value_failures(value: &Value, path: &str, out: &mut Vec<(String, ReadError)>) {
    match value {
        Value::Table(table) => collect_table_failures(table, path, out),
        Value::Vector(vector) => {
            for (index, element) in vector.elements.iter().enumerate() {
                let element_path = format!("{path}[{index}]");
                match element {
                    Ok(value) => collect_value_failures(value, &element_path, out),
                    Err(err) => out.push((element_path, *err)),
                }
            }
        }
        Value::Scalar(_) | Value::String(_) | Value::Struct(_) => {}
    }
}

/// Read a scalar of a schema-given type, widened to 64 bits.
pub fn read_scalar(buffer: &Buffer, position: usize, ty: ScalarType) -> ReadResult<ScalarValue> {
    Ok(match ty {
        ScalarType::Bool => ScalarValue::Bool(buffer.read::<bool>(position)?),
        ScalarType::U8 => ScalarValue::UInt(buffer.read::<u8>(position)? as u64),
        ScalarType::I8 => ScalarValue::Int(buffer.read::<i8>(position)? as i64),
        ScalarType::U16 => ScalarValue::UInt(buffer.read::<u16>(position)? as u64),
        ScalarType::I16 => ScalarValue::Int(buffer.read::<i16>(position)? as i64),
        ScalarType::U32 => ScalarValue::UInt(buffer.read::<u32>(position)? as u64),
        ScalarType::I32 => ScalarValue::Int(buffer.read::<i32>(position)? as i64),
        ScalarType::U64 => ScalarValue::UInt(buffer.read::<u64>(position)?),
        ScalarType::I64 => ScalarValue::Int(buffer.read::<i64>(position)?),
        ScalarType::F32 => ScalarValue::Float(buffer.read::<f32>(position)? as f64),
        ScalarType::F64 => ScalarValue::Float(buffer.read::<f64>(position)?),
    })
}

/// Walks tables through a schema.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    schema: &'a Schema,
    options: DecodeOptions,
    tables_decoded: Cell<usize>,
}

impl<'a> Decoder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self::with_options(schema, DecodeOptions::default())
    }

    pub fn with_options(schema: &'a Schema, options: DecodeOptions) -> Self {
        Self {
            schema,
            options,
            tables_decoded: Cell::new(0),
        }
    }

    /// Decode a root table as the schema's root type.
    pub fn decode_root(&self, root: &Table) -> DecodedTable {
        self.tables_decoded.set(0);
        self.decode_table(root, self.schema.root(), 0)
    }

    /// Decode a table as type `id` at nesting `depth`.
    pub fn decode_table(&self, table: &Table, id: TableId, depth: usize) -> DecodedTable {
        let def = self.schema.table(id);
        let mut decoded = DecodedTable {
            type_name: def.name.clone(),
            position: table.position(),
            fields: Vec::new(),
            truncated: false,
        };
        if depth > self.options.max_depth || self.tables_decoded.get() >= self.options.max_tables {
            decoded.truncated = true;
            return decoded;
        }
        self.tables_decoded.set(self.tables_decoded.get() + 1);

        decoded.fields = def
            .fields
            .iter()
            .map(|field| DecodedField {
                name: field.name.clone(),
                slot: field.slot,
                outcome: self.decode_field(table, field, depth),
            })
            .collect();
        decoded
    }

    fn decode_field(&self, table: &Table, field: &FieldDef, depth: usize) -> FieldOutcome {
        let slot = field.slot;
        let result = match field.ty {
            FieldType::Scalar(scalar) => {
                let value = table.field_position(slot).and_then(|position| {
                    position.try_map(|position| read_scalar(table.buffer(), position, scalar))
                });
                return match value {
                    Ok(Field::Present(value)) => FieldOutcome::Present(Value::Scalar(value)),
                    Ok(Field::Absent) => FieldOutcome::Default(Value::Scalar(
                        field.default.unwrap_or(scalar.zero()),
                    )),
                    Err(err) => FieldOutcome::Failed(err),
                };
            }
            FieldType::String => table
                .string_field(slot)
                .and_then(|f| f.try_map(|s| Ok(Value::String(s.to_str()?.to_string())))),
            FieldType::Table(id) => table.table_field(slot).map(|f| {
                f.map(|child| Value::Table(self.decode_table(&child, id, depth + 1)))
            }),
            FieldType::Struct(id) => table
                .struct_field(slot, self.schema.struct_def(id).size)
                .and_then(|f| f.try_map(|view| self.decode_struct(&view, id).map(Value::Struct))),
            FieldType::Vector(element) => table
                .vector_field(slot, self.schema.element_width(element))
                .map(|f| f.map(|vector| Value::Vector(self.decode_vector(&vector, element, depth)))),
        };

        match result {
            Ok(Field::Present(value)) => FieldOutcome::Present(value),
            Ok(Field::Absent) => FieldOutcome::Absent,
            Err(err) => FieldOutcome::Failed(err),
        }
    }

    fn decode_vector(&self, vector: &Vector, element: ElementType, depth: usize) -> DecodedVector {
        // Every element past the buffer end fails the same way; stop at the first.
        let count = vector
            .len()
            .min(self.options.max_elements)
            .min(vector.available().saturating_add(1));
        let elements = (0..count)
            .map(|index| self.decode_element(vector, index, element, depth))
            .collect();
        DecodedVector {
            len: vector.len(),
            elements,
        }
    }

    fn decode_element(
        &self,
        vector: &Vector,
        index: usize,
        element: ElementType,
        depth: usize,
    ) -> ReadResult<Value> {
        match element {
            ElementType::Scalar(scalar) => {
                let position = vector.element_position(index)?;
                read_scalar(vector.buffer(), position, scalar).map(Value::Scalar)
            }
            ElementType::String => {
                let text = vector.string_at(index)?;
                Ok(Value::String(text.to_str()?.to_string()))
            }
            ElementType::Table(id) => {
                let table = vector.table_at(index)?;
                Ok(Value::Table(self.decode_table(&table, id, depth + 1)))
            }
            ElementType::Struct(id) => {
                let view = vector.struct_at(index)?;
                self.decode_struct(&view, id).map(Value::Struct)
            }
        }
    }

    fn decode_struct(&self, view: &StructView, id: StructId) -> ReadResult<DecodedStruct> {
        let def = self.schema.struct_def(id);
        if def.fields.is_empty() {
            return Ok(DecodedStruct {
                type_name: def.name.clone(),
                fields: Vec::new(),
                opaque: Some(view.bytes()?.to_vec()),
            });
        }

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let value = match field.ty {
                StructFieldType::Scalar(scalar) => Value::Scalar(read_scalar(
                    view.buffer(),
                    view.position() + field.offset,
                    scalar,
                )?),
                StructFieldType::Struct(nested) => {
                    let size = self.schema.struct_def(nested).size;
                    Value::Struct(self.decode_struct(&view.nested(field.offset, size)?, nested)?)
                }
            };
            fields.push((field.name.clone(), value));
        }
        Ok(DecodedStruct {
            type_name: def.name.clone(),
            fields,
            opaque: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::open_root;
    use crate::builder::BufferBuilder;

    const SCHEMA: &str = r#"
        root_type = "Root"

        [tables.Root]
        fields = [
            { name = "count", slot = 0, type = "u16", default = 42 },
            { name = "title", slot = 1, type = "string" },
            { name = "items", slot = 2, type = "[table:Item]" },
            { name = "origin", slot = 3, type = "struct:Vec3" },
            { name = "tags", slot = 4, type = "[string]" },
            { name = "child", slot = 5, type = "table:Root" },
        ]

        [tables.Item]
        fields = [
            { name = "id", slot = 0, type = "u32" },
            { name = "weights", slot = 1, type = "[f32]" },
        ]

        [structs.Vec3]
        size = 12
        fields = [
            { name = "x", offset = 0, type = "f32" },
            { name = "y", offset = 4, type = "f32" },
            { name = "z", offset = 8, type = "f32" },
        ]
    "#;

    fn sample() -> Buffer {
        let mut b = BufferBuilder::new();
        let weights = b.create_vector(&[0.5f32, 0.25]);
        let item = b
            .table(|t| {
                t.add_scalar::<u32>(0, 9, 0);
                t.add_offset(1, weights);
            })
            .unwrap();
        let items = b.create_offset_vector(&[item]);
        let title = b.create_string("hello");
        let mut origin = b.struct_data(12);
        origin.set(0, 1.0f32).unwrap().set(8, -1.0f32).unwrap();
        let root = b
            .table(|t| {
                t.add_offset(1, title);
                t.add_offset(2, items);
                t.add_struct(3, &origin, 4);
            })
            .unwrap();
        Buffer::new(b.finish(root, None))
    }

    #[test]
    fn test_decode_present_default_absent() {
        let schema = Schema::from_toml_str(SCHEMA).unwrap();
        let buffer = sample();
        let root = open_root(&buffer).unwrap();
        let decoded = Decoder::new(&schema).decode_root(&root);

        assert_eq!(decoded.type_name, "Root");
        assert_eq!(
            decoded.get("count"),
            Some(&FieldOutcome::Default(Value::Scalar(ScalarValue::UInt(42))))
        );
        assert_eq!(
            decoded.get("title"),
            Some(&FieldOutcome::Present(Value::String("hello".to_string())))
        );
        assert_eq!(decoded.get("tags"), Some(&FieldOutcome::Absent));
        assert_eq!(decoded.get("child"), Some(&FieldOutcome::Absent));

        let Some(FieldOutcome::Present(Value::Vector(items))) = decoded.get("items") else {
            panic!("items should be present");
        };
        assert_eq!(items.len, 1);
        let Ok(Value::Table(item)) = &items.elements[0] else {
            panic!("item should decode");
        };
        assert_eq!(
            item.get("id"),
            Some(&FieldOutcome::Present(Value::Scalar(ScalarValue::UInt(9))))
        );

        let Some(FieldOutcome::Present(Value::Struct(origin))) = decoded.get("origin") else {
            panic!("origin should be present");
        };
        assert_eq!(origin.fields[2], ("z".to_string(), Value::Scalar(ScalarValue::Float(-1.0))));
        assert!(decoded.failures().is_empty());
    }

    #[test]
    fn test_failed_field_does_not_stop_siblings() {
        let schema = Schema::from_toml_str(SCHEMA).unwrap();
        let mut bytes = sample().as_bytes().to_vec();
        // Corrupt the title's length prefix so the text runs past the end.
        let root = open_root(&Buffer::new(bytes.clone())).unwrap();
        let title = root.offset_field(1).unwrap().present().unwrap();
        bytes[title..title + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let buffer = Buffer::new(bytes);
        let root = open_root(&buffer).unwrap();
        let decoded = Decoder::new(&schema).decode_root(&root);

        assert!(matches!(
            decoded.get("title"),
            Some(FieldOutcome::Failed(ReadError::OutOfBounds { .. }))
        ));
        assert!(matches!(
            decoded.get("items"),
            Some(FieldOutcome::Present(Value::Vector(_)))
        ));
        let failures = decoded.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "Root.title");
    }

    #[test]
    fn test_depth_and_element_limits() {
        let schema = Schema::from_toml_str(SCHEMA).unwrap();
        let mut b = BufferBuilder::new();
        let inner = b.table(|t| t.add_scalar::<u16>(0, 1, 42)).unwrap();
        let tags = b.create_string_vector(&["a", "b", "c"]);
        let outer = b
            .table(|t| {
                t.add_offset(4, tags);
                t.add_offset(5, inner);
            })
            .unwrap();
        let buffer = Buffer::new(b.finish(outer, None));
        let root = open_root(&buffer).unwrap();

        let options = DecodeOptions {
            max_depth: 0,
            max_elements: 2,
            ..DecodeOptions::default()
        };
        let decoded = Decoder::with_options(&schema, options).decode_root(&root);
        let Some(FieldOutcome::Present(Value::Table(child))) = decoded.get("child") else {
            panic!("child should be present");
        };
        assert!(child.truncated);
        assert!(child.fields.is_empty());

        let Some(FieldOutcome::Present(Value::Vector(tags))) = decoded.get("tags") else {
            panic!("tags should be present");
        };
        assert_eq!(tags.len, 3);
        assert_eq!(tags.elements.len(), 2);
    }

    #[test]
    fn test_oversized_vector_length() {
        let schema = Schema::from_toml_str(SCHEMA).unwrap();
        let mut bytes = sample().as_bytes().to_vec();
        let root = open_root(&Buffer::new(bytes.clone())).unwrap();
        let items = root.offset_field(2).unwrap().present().unwrap();
        bytes[items..items + 4].copy_from_slice(&u32::MAX.to_le_bytes());

        let buffer = Buffer::new(bytes);
        let root = open_root(&buffer).unwrap();
        let decoded = Decoder::new(&schema).decode_root(&root);

        let Some(FieldOutcome::Present(Value::Vector(items))) = decoded.get("items") else {
            panic!("items should be present");
        };
        assert_eq!(items.len, u32::MAX as usize);
        let available = root.vector_field(2, 4).unwrap().present().unwrap().available();
        assert_eq!(items.elements.len(), available + 1);
        assert!(items.elements.len() < buffer.len());
        assert!(matches!(
            items.elements.last(),
            Some(Err(ReadError::OutOfBounds { .. }))
        ));

        // Siblings after the broken vector still decode.
        assert!(matches!(
            decoded.get("origin"),
            Some(FieldOutcome::Present(Value::Struct(_)))
        ));
    }

    /// `levels` tables, each holding the one below it twice in `children`.
    fn shared_chain(levels: usize) -> Buffer {
        let mut b = BufferBuilder::new();
        let mut below = b.table(|t| t.add_scalar::<u32>(0, 0, 0)).unwrap();
        for level in 1..levels {
            let children = b.create_offset_vector(&[below, below]);
            below = b
                .table(|t| {
                    t.add_scalar::<u32>(0, level as u32, 0);
                    t.add_offset(1, children);
                })
                .unwrap();
        }
        Buffer::new(b.finish(below, None))
    }

    fn expanded_tables(table: &DecodedTable) -> usize {
        if table.truncated {
            return 0;
        }
        let mut count = 1;
        if let Some(FieldOutcome::Present(Value::Vector(children))) = table.get("children") {
            for child in &children.elements {
                if let Ok(Value::Table(child)) = child {
                    count += expanded_tables(child);
                }
            }
        }
        count
    }

    #[test]
    fn test_table_budget_bounds_shared_subtables() {
        let schema = Schema::from_toml_str(
            r#"
            root_type = "Level"

            [tables.Level]
            fields = [
                { name = "depth", slot = 0, type = "u32" },
                { name = "children", slot = 1, type = "[table:Level]" },
            ]
            "#,
        )
        .unwrap();

        // Three levels expand fully: 1 + 2 + 4 tables.
        let small = shared_chain(3);
        let decoded = Decoder::new(&schema).decode_root(&open_root(&small).unwrap());
        assert_eq!(expanded_tables(&decoded), 7);

        // Forty levels would be 2^40 tables without a budget.
        let deep = shared_chain(40);
        let options = DecodeOptions {
            max_tables: 50,
            ..DecodeOptions::default()
        };
        let decoder = Decoder::with_options(&schema, options);
        let root = open_root(&deep).unwrap();
        let decoded = decoder.decode_root(&root);
        assert_eq!(expanded_tables(&decoded), 50);
        assert!(decoded.failures().is_empty());

        // The budget is per root.
        assert_eq!(decoder.decode_root(&root), decoded);
    }
}
