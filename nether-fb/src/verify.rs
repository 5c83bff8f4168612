//! Strict validation.
//!
//! The reader core is lazy: a corrupt field is only noticed when read. For
//! untrusted input it is often better to reject the whole buffer up front.
//! [`open_root_strict`] walks every table, vector and string reachable from
//! the root through the schema, and reports every problem it finds, not
//! just the first.

use std::fmt;

use thiserror::Error;

use crate::buffer::{Buffer, RootOptions, open_root_with};
use crate::error::ReadError;
use crate::schema::{ElementType, FieldType, Schema, TableId};
use crate::table::{Field, Table, VTABLE_HEADER_SIZE};
use crate::vector::Vector;

/// Default nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Default limit on tables visited in one pass.
pub const DEFAULT_MAX_TABLES: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    pub max_depth: usize,
    pub max_tables: usize,
    /// Check the schema's file identifier, if it declares one.
    pub check_identifier: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_tables: DEFAULT_MAX_TABLES,
            check_identifier: true,
        }
    }
}

/// What is wrong at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Issue {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("vtable size {0} is not an even number of at least 4 bytes")]
    BadVTableSize(u16),

    #[error("table nesting exceeds depth {0}")]
    TooDeep(usize),

    #[error("more than {0} tables reachable from the root")]
    TooManyTables(usize),
}

/// One problem and the field path it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// e.g. `Scene.nodes[2].child_ids`
    pub path: String,
    pub issue: Issue,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.issue)
    }
}

/// Every violation found by a strict pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buffer failed validation ({} problem", self.violations.len())?;
        if self.violations.len() != 1 {
            write!(f, "s")?;
        }
        write!(f, ")")?;
        for violation in &self.violations {
            write!(f, "\n  {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validate the whole buffer against `schema`, then return its root table.
pub fn open_root_strict(
    buffer: &Buffer,
    schema: &Schema,
    options: &VerifyOptions,
) -> Result<Table, ValidationError> {
    let mut verifier = Verifier::new(schema, options);
    let root = verifier.verify(buffer);
    match root {
        Some(root) if verifier.violations.is_empty() => Ok(root),
        _ => Err(ValidationError {
            violations: verifier.violations,
        }),
    }
}

/// Eager walk over a buffer, collecting violations.
pub struct Verifier<'a> {
    schema: &'a Schema,
    options: &'a VerifyOptions,
    tables_visited: usize,
    violations: Vec<Violation>,
}

impl<'a> Verifier<'a> {
    pub fn new(schema: &'a Schema, options: &'a VerifyOptions) -> Self {
        Self {
            schema,
            options,
            tables_visited: 0,
            violations: Vec::new(),
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Check the root pointer, then everything reachable from it.
    pub fn verify(&mut self, buffer: &Buffer) -> Option<Table> {
        let root_options = if self.options.check_identifier {
            self.schema.root_options()
        } else {
            RootOptions::default()
        };
        let root_name = self.schema.root_table().name.clone();

        match open_root_with(buffer, &root_options) {
            Ok(root) => {
                self.verify_table(&root, self.schema.root(), &root_name, 0);
                Some(root)
            }
            Err(err) => {
                self.report(&root_name, err);
                None
            }
        }
    }

    fn report(&mut self, path: &str, issue: impl Into<Issue>) {
        self.violations.push(Violation {
            path: path.to_string(),
            issue: issue.into(),
        });
    }

    fn limit_reached(&self) -> bool {
        self.tables_visited > self.options.max_tables
    }

    fn verify_table(&mut self, table: &Table, id: TableId, path: &str, depth: usize) {
        if self.limit_reached() {
            return;
        }
        if depth > self.options.max_depth {
            self.report(path, Issue::TooDeep(self.options.max_depth));
            return;
        }
        self.tables_visited += 1;
        if self.limit_reached() {
            self.report(path, Issue::TooManyTables(self.options.max_tables));
            return;
        }

        let vtable = match table.vtable() {
            Ok(vtable) => vtable,
            Err(err) => return self.report(path, err),
        };
        if (vtable.size as usize) < VTABLE_HEADER_SIZE || vtable.size % 2 != 0 {
            return self.report(path, Issue::BadVTableSize(vtable.size));
        }
        let buffer = table.buffer();
        if let Err(err) = buffer.slice(vtable.position, vtable.size as usize) {
            return self.report(path, err);
        }
        if let Err(err) = buffer.slice(table.position(), vtable.table_size as usize) {
            return self.report(path, err);
        }

        let schema = self.schema;
        for field in &schema.table(id).fields {
            let field_path = format!("{path}.{}", field.name);
            let slot = field.slot;
            let result = match field.ty {
                FieldType::Scalar(_) | FieldType::Struct(_) => table
                    .field(slot, schema.field_width(field.ty))
                    .map(|_| ()),
                FieldType::String => table.string_field(slot).and_then(|text| match text {
                    Field::Present(text) => text.to_str().map(|_| ()),
                    Field::Absent => Ok(()),
                }),
                FieldType::Table(child_id) => match table.table_field(slot) {
                    Ok(Field::Present(child)) => {
                        self.verify_table(&child, child_id, &field_path, depth + 1);
                        Ok(())
                    }
                    Ok(Field::Absent) => Ok(()),
                    Err(err) => Err(err),
                },
                FieldType::Vector(element) => {
                    match table.vector_field(slot, schema.element_width(element)) {
                        Ok(Field::Present(vector)) => {
                            self.verify_vector(&vector, element, &field_path, depth);
                            Ok(())
                        }
                        Ok(Field::Absent) => Ok(()),
                        Err(err) => Err(err),
                    }
                }
            };
            if let Err(err) = result {
                self.report(&field_path, err);
            }
        }
    }

    fn verify_vector(&mut self, vector: &Vector, element: ElementType, path: &str, depth: usize) {
        if let Err(err) = vector.as_bytes() {
            return self.report(path, err);
        }

        for index in 0..vector.len() {
            if self.limit_reached() {
                return;
            }
            let element_path = format!("{path}[{index}]");
            let result = match element {
                ElementType::Scalar(_) | ElementType::Struct(_) => Ok(()),
                ElementType::String => vector
                    .string_at(index)
                    .and_then(|text| text.to_str().map(|_| ())),
                ElementType::Table(id) => vector.table_at(index).map(|child| {
                    self.verify_table(&child, id, &element_path, depth + 1);
                }),
            };
            if let Err(err) = result {
                self.report(&element_path, err);
            }
        }
    }
}
