//! Text and JSON rendering of decoded tables

use std::io::{self, Write};

use serde_json::{Map, Value as Json, json};

use nether_fb::decode::{DecodedStruct, DecodedTable, DecodedVector, FieldOutcome, Value};
use nether_fb::schema::ScalarValue;

const INDENT: &str = "  ";

// =============================================================================
// Text
// =============================================================================

/// Write `table` as an indented tree.
pub fn write_text(out: &mut impl Write, table: &DecodedTable) -> io::Result<()> {
    writeln!(out, "{} @ {}", table.type_name, table.position)?;
    write_fields(out, table, 1)
}

fn write_fields(out: &mut impl Write, table: &DecodedTable, depth: usize) -> io::Result<()> {
    let pad = INDENT.repeat(depth);
    if table.truncated {
        return writeln!(out, "{pad}... (not expanded)");
    }

    for field in &table.fields {
        write!(out, "{pad}{}: ", field.name)?;
        match &field.outcome {
            FieldOutcome::Present(value) => write_value(out, value, depth)?,
            FieldOutcome::Default(Value::Scalar(value)) => writeln!(out, "{value} (default)")?,
            FieldOutcome::Default(value) => write_value(out, value, depth)?,
            FieldOutcome::Absent => writeln!(out, "absent")?,
            FieldOutcome::Failed(err) => writeln!(out, "<error: {err}>")?,
        }
    }
    Ok(())
}

/// Write the rest of a line starting with `value`, then any nested lines.
fn write_value(out: &mut impl Write, value: &Value, depth: usize) -> io::Result<()> {
    match value {
        Value::Scalar(value) => writeln!(out, "{value}"),
        Value::String(text) => writeln!(out, "{text:?}"),
        Value::Table(table) => {
            writeln!(out, "{} @ {}", table.type_name, table.position)?;
            write_fields(out, table, depth + 1)
        }
        Value::Struct(value) => write_struct(out, value, depth),
        Value::Vector(vector) => write_vector(out, vector, depth),
    }
}

fn write_struct(out: &mut impl Write, value: &DecodedStruct, depth: usize) -> io::Result<()> {
    if let Some(bytes) = &value.opaque {
        return writeln!(
            out,
            "{} ({} bytes) {}",
            value.type_name,
            bytes.len(),
            hex::encode(bytes)
        );
    }

    writeln!(out, "{}", value.type_name)?;
    let pad = INDENT.repeat(depth + 1);
    for (name, field) in &value.fields {
        write!(out, "{pad}{name}: ")?;
        write_value(out, field, depth + 1)?;
    }
    Ok(())
}

fn write_vector(out: &mut impl Write, vector: &DecodedVector, depth: usize) -> io::Result<()> {
    writeln!(out, "[{}]", vector.len)?;
    let pad = INDENT.repeat(depth + 1);
    for (index, element) in vector.elements.iter().enumerate() {
        write!(out, "{pad}[{index}] ")?;
        match element {
            Ok(value) => write_value(out, value, depth + 1)?,
            Err(err) => writeln!(out, "<error: {err}>")?,
        }
    }

    let hidden = vector.len - vector.elements.len();
    if hidden > 0 {
        writeln!(out, "{pad}... {hidden} more")?;
    }
    Ok(())
}

// =============================================================================
// JSON
// =============================================================================

/// `table` as a JSON object: `type`, `position` and a `fields` map.
///
/// Absent fields are `null`, failed ones `{"error": "..."}`.
pub fn to_json(table: &DecodedTable) -> Json {
    let mut fields = Map::new();
    for field in &table.fields {
        let value = match &field.outcome {
            FieldOutcome::Present(value) | FieldOutcome::Default(value) => value_json(value),
            FieldOutcome::Absent => Json::Null,
            FieldOutcome::Failed(err) => error_json(err),
        };
        fields.insert(field.name.clone(), value);
    }

    let mut object = json!({
        "type": table.type_name,
        "position": table.position,
        "fields": fields,
    });
    if table.truncated {
        object["truncated"] = Json::Bool(true);
    }
    object
}

fn value_json(value: &Value) -> Json {
    match value {
        Value::Scalar(value) => scalar_json(*value),
        Value::String(text) => Json::String(text.clone()),
        Value::Table(table) => to_json(table),
        Value::Struct(value) => struct_json(value),
        Value::Vector(vector) => {
            let elements: Vec<Json> = vector
                .elements
                .iter()
                .map(|element| match element {
                    Ok(value) => value_json(value),
                    Err(err) => error_json(err),
                })
                .collect();
            if elements.len() == vector.len {
                Json::Array(elements)
            } else {
                json!({ "len": vector.len, "elements": elements })
            }
        }
    }
}

fn scalar_json(value: ScalarValue) -> Json {
    match value {
        ScalarValue::Bool(value) => Json::Bool(value),
        ScalarValue::Int(value) => Json::from(value),
        ScalarValue::UInt(value) => Json::from(value),
        // NaN and infinities become null
        ScalarValue::Float(value) => Json::from(value),
    }
}

fn struct_json(value: &DecodedStruct) -> Json {
    if let Some(bytes) = &value.opaque {
        return json!({ "type": value.type_name, "bytes": hex::encode(bytes) });
    }
    let fields: Map<String, Json> = value
        .fields
        .iter()
        .map(|(name, field)| (name.clone(), value_json(field)))
        .collect();
    json!({ "type": value.type_name, "fields": fields })
}

fn error_json(err: &impl std::fmt::Display) -> Json {
    json!({ "error": err.to_string() })
}
