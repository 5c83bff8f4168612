//! Scene files
//!
//! Typed views over the serialized scene format. The same layout is described
//! by the bundled schema ([`SCENE_SCHEMA`]) for schema-driven tools; the views
//! here hard-code its slots for callers that know they hold a scene.
//!
//! # Material properties
//!
//! Material property values are not stored inline. A property holds a packed
//! `u32` value id pointing into one of the scene's value pools:
//!
//! ```text
//! bits 0..4:   value kind (bool, int, float, float2/3/4, string)
//! bits 8..20:  index into the pool for that kind
//! ```
//!
//! Vector kinds occupy consecutive entries of `float_values`.

use thiserror::Error;

use crate::buffer::{Buffer, open_root};
use crate::endian::Scalar;
use crate::error::{ReadError, ReadResult};
use crate::schema::{Schema, SchemaError};
use crate::string::StringView;
use crate::structs::StructView;
use crate::table::{Field, Table};
use crate::vector::{OFFSET_ELEMENT_WIDTH, Vector};


/// Bundled scene schema.
pub const SCENE_SCHEMA: &str = include_str!("scene/scene.toml");

/// File extension of serialized scenes.
pub const SCENE_EXTENSION: &str = "nczxscene";

/// Parse the bundled scene schema.
pub fn scene_schema() -> Result<Schema, SchemaError> {
    Schema::from_toml_str(SCENE_SCHEMA)
}

// Inline struct sizes.
pub const TRANSFORM_SIZE: usize = 144;
pub const TRANSFORM_LIMITS_SIZE: usize = 92;
pub const ANIM_STACK_SIZE: usize = 8;
pub const ANIM_LAYER_SIZE: usize = 16;
pub const TEXTURE_SIZE: usize = 72;
pub const CAMERA_SIZE: usize = 28;
pub const LIGHT_SIZE: usize = 64;
pub const SUBMESH_SIZE: usize = 48;
pub const SUBSET_SIZE: usize = 12;
pub const MATERIAL_PROP_SIZE: usize = 8;

/// Element `index` of a table vector; an absent vector reads as empty.
fn table_at(table: &Table, slot: u16, index: usize) -> ReadResult<Table> {
    match table.vector_field(slot, OFFSET_ELEMENT_WIDTH)? {
        Field::Present(vector) => vector.table_at(index),
        Field::Absent => Err(ReadError::IndexOutOfRange { index, len: 0 }),
    }
}

/// Element `index` of a struct vector; an absent vector reads as empty.
fn struct_at(table: &Table, slot: u16, size: usize, index: usize) -> ReadResult<StructView> {
    match table.vector_field(slot, size)? {
        Field::Present(vector) => vector.struct_at(index),
        Field::Absent => Err(ReadError::IndexOutOfRange { index, len: 0 }),
    }
}

macro_rules! table_view {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            table: Table,
        }

        impl $name {
            pub fn new(table: Table) -> Self {
                Self { table }
            }

            /// The underlying table.
            pub fn table(&self) -> &Table {
                &self.table
            }
        }
    };
}

// =============================================================================
// Scene
// =============================================================================

table_view!(
    /// Root table of a scene file.
    SceneView
);

impl SceneView {
    pub const VERSION: u16 = 0;
    pub const TRANSFORMS: u16 = 1;
    pub const TRANSFORMS_LIMITS: u16 = 2;
    pub const NODES: u16 = 3;
    pub const MESHES: u16 = 4;
    pub const ANIM_STACKS: u16 = 5;
    pub const ANIM_LAYERS: u16 = 6;
    pub const ANIM_CURVES: u16 = 7;
    pub const MATERIALS: u16 = 8;
    pub const TEXTURES: u16 = 9;
    pub const CAMERAS: u16 = 10;
    pub const LIGHTS: u16 = 11;
    pub const SKINS: u16 = 12;
    pub const FILES: u16 = 13;
    pub const BOOL_VALUES: u16 = 14;
    pub const INT_VALUES: u16 = 15;
    pub const FLOAT_VALUES: u16 = 16;
    pub const STRING_VALUES: u16 = 17;
    pub const NAMES: u16 = 18;

    /// Open the root of a scene buffer.
    pub fn open(buffer: &Buffer) -> ReadResult<Self> {
        open_root(buffer).map(Self::new)
    }

    pub fn version(&self) -> u8 {
        self.table.scalar(Self::VERSION, 0)
    }

    pub fn transforms(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::TRANSFORMS, TRANSFORM_SIZE)
    }

    pub fn transforms_limits(&self) -> ReadResult<Field<Vector>> {
        self.table
            .vector_field(Self::TRANSFORMS_LIMITS, TRANSFORM_LIMITS_SIZE)
    }

    pub fn nodes(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::NODES, OFFSET_ELEMENT_WIDTH)
    }

    pub fn node(&self, index: usize) -> ReadResult<NodeView> {
        table_at(&self.table, Self::NODES, index).map(NodeView::new)
    }

    pub fn meshes(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::MESHES, OFFSET_ELEMENT_WIDTH)
    }

    pub fn mesh(&self, index: usize) -> ReadResult<MeshView> {
        table_at(&self.table, Self::MESHES, index).map(MeshView::new)
    }

    pub fn anim_stacks(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::ANIM_STACKS, ANIM_STACK_SIZE)
    }

    pub fn anim_stack(&self, index: usize) -> ReadResult<AnimStack> {
        let view = struct_at(&self.table, Self::ANIM_STACKS, ANIM_STACK_SIZE, index)?;
        AnimStack::from_view(&view)
    }

    pub fn anim_layers(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::ANIM_LAYERS, ANIM_LAYER_SIZE)
    }

    pub fn anim_curves(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::ANIM_CURVES, OFFSET_ELEMENT_WIDTH)
    }

    pub fn anim_curve(&self, index: usize) -> ReadResult<AnimCurveView> {
        table_at(&self.table, Self::ANIM_CURVES, index).map(AnimCurveView::new)
    }

    pub fn materials(&self) -> ReadResult<Field<Vector>> {
        self.table
            .vector_field(Self::MATERIALS, OFFSET_ELEMENT_WIDTH)
    }

    pub fn material(&self, index: usize) -> ReadResult<MaterialView> {
        table_at(&self.table, Self::MATERIALS, index).map(MaterialView::new)
    }

    pub fn textures(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::TEXTURES, TEXTURE_SIZE)
    }

    pub fn cameras(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::CAMERAS, CAMERA_SIZE)
    }

    pub fn lights(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::LIGHTS, LIGHT_SIZE)
    }

    pub fn skins(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::SKINS, OFFSET_ELEMENT_WIDTH)
    }

    pub fn skin(&self, index: usize) -> ReadResult<SkinView> {
        table_at(&self.table, Self::SKINS, index).map(SkinView::new)
    }

    pub fn files(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::FILES, OFFSET_ELEMENT_WIDTH)
    }

    pub fn file(&self, index: usize) -> ReadResult<FileView> {
        table_at(&self.table, Self::FILES, index).map(FileView::new)
    }

    pub fn bool_values(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::BOOL_VALUES, 1)
    }

    pub fn int_values(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::INT_VALUES, 4)
    }

    pub fn float_values(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::FLOAT_VALUES, 4)
    }

    pub fn string_values(&self) -> ReadResult<Field<Vector>> {
        self.table
            .vector_field(Self::STRING_VALUES, OFFSET_ELEMENT_WIDTH)
    }

    pub fn names(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::NAMES, OFFSET_ELEMENT_WIDTH)
    }

    pub fn name(&self, index: usize) -> ReadResult<NameView> {
        table_at(&self.table, Self::NAMES, index).map(NameView::new)
    }

    /// Text of the first name entry whose hash is `hash`.
    pub fn name_by_hash(&self, hash: u64) -> ReadResult<Option<StringView>> {
        let Field::Present(names) = self.names()? else {
            return Ok(None);
        };
        for entry in names.tables() {
            let entry = NameView::new(entry?);
            if entry.h() == hash {
                return entry.v().map(Field::present);
            }
        }
        Ok(None)
    }

    /// Resolve a packed material property value id against the value pools.
    pub fn property(&self, value_id: u32) -> Result<PropertyValue, PropertyError> {
        let kind = ValueKind::from_value_id(value_id)?;
        let index = value_index(value_id);

        Ok(match kind {
            ValueKind::Bool => PropertyValue::Bool(pool_scalar(self.bool_values()?, index)?),
            ValueKind::Int => PropertyValue::Int(pool_scalar(self.int_values()?, index)?),
            ValueKind::Float => PropertyValue::Float(pool_scalar(self.float_values()?, index)?),
            ValueKind::Float2 => PropertyValue::Float2(self.floats::<2>(index)?),
            ValueKind::Float3 => PropertyValue::Float3(self.floats::<3>(index)?),
            ValueKind::Float4 => PropertyValue::Float4(self.floats::<4>(index)?),
            ValueKind::String => {
                let text = match self.string_values()? {
                    Field::Present(pool) => pool.string_at(index)?,
                    Field::Absent => return Err(ReadError::IndexOutOfRange { index, len: 0 }.into()),
                };
                PropertyValue::String(text.to_str()?.to_string())
            }
        })
    }

    /// Resolve a `Float3` or `Float4` property as four components, using
    /// `default_w` for a `Float3`.
    pub fn property_float4(&self, value_id: u32, default_w: f32) -> Result<[f32; 4], PropertyError> {
        match self.property(value_id)? {
            PropertyValue::Float4(v) => Ok(v),
            PropertyValue::Float3([x, y, z]) => Ok([x, y, z, default_w]),
            other => Err(PropertyError::KindMismatch {
                value_id,
                found: other.kind(),
            }),
        }
    }

    fn floats<const N: usize>(&self, index: usize) -> ReadResult<[f32; N]> {
        let pool = self.float_values()?;
        let mut out = [0.0; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = pool_scalar(pool.clone(), index + i)?;
        }
        Ok(out)
    }
}

fn pool_scalar<T: Scalar>(pool: Field<Vector>, index: usize) -> ReadResult<T> {
    match pool {
        Field::Present(vector) => vector.scalar_at(index),
        Field::Absent => Err(ReadError::IndexOutOfRange { index, len: 0 }),
    }
}

// =============================================================================
// Property values
// =============================================================================

/// Kind bits of a packed value id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool = 0,
    Int = 1,
    Float = 2,
    Float2 = 3,
    Float3 = 4,
    Float4 = 5,
    String = 6,
}

const VALUE_KIND_MASK: u32 = 0x000f;
const VALUE_INDEX_SHIFT: u32 = 8;
const VALUE_INDEX_MASK: u32 = 0x0fff;

impl ValueKind {
    pub fn from_value_id(value_id: u32) -> Result<Self, PropertyError> {
        Ok(match value_id & VALUE_KIND_MASK {
            0 => ValueKind::Bool,
            1 => ValueKind::Int,
            2 => ValueKind::Float,
            3 => ValueKind::Float2,
            4 => ValueKind::Float3,
            5 => ValueKind::Float4,
            6 => ValueKind::String,
            kind => return Err(PropertyError::UnknownKind { value_id, kind }),
        })
    }
}

/// Pool index of a packed value id.
pub fn value_index(value_id: u32) -> usize {
    ((value_id >> VALUE_INDEX_SHIFT) & VALUE_INDEX_MASK) as usize
}

/// Pack a kind and pool index into a value id.
pub fn pack_value_id(kind: ValueKind, index: u32) -> u32 {
    (kind as u32) | ((index & VALUE_INDEX_MASK) << VALUE_INDEX_SHIFT)
}

/// A resolved material property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    String(String),
}

impl PropertyValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Int(_) => ValueKind::Int,
            PropertyValue::Float(_) => ValueKind::Float,
            PropertyValue::Float2(_) => ValueKind::Float2,
            PropertyValue::Float3(_) => ValueKind::Float3,
            PropertyValue::Float4(_) => ValueKind::Float4,
            PropertyValue::String(_) => ValueKind::String,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("value id {value_id:#x} has unknown kind {kind}")]
    UnknownKind { value_id: u32, kind: u32 },

    #[error("value id {value_id:#x} holds a {found:?}, not a float vector")]
    KindMismatch { value_id: u32, found: ValueKind },

    #[error(transparent)]
    Read(#[from] ReadError),
}

// =============================================================================
// Child tables
// =============================================================================

table_view!(NodeView);

impl NodeView {
    pub const ID: u16 = 0;
    pub const NAME_ID: u16 = 1;
    pub const CULLING_TYPE: u16 = 2;
    pub const MESH_ID: u16 = 3;
    pub const CHILD_IDS: u16 = 4;
    pub const MATERIAL_IDS: u16 = 5;

    pub fn id(&self) -> u32 {
        self.table.scalar(Self::ID, 0)
    }

    pub fn name_id(&self) -> u64 {
        self.table.scalar(Self::NAME_ID, 0)
    }

    pub fn culling_type(&self) -> u8 {
        self.table.scalar(Self::CULLING_TYPE, 0)
    }

    pub fn mesh_id(&self) -> u32 {
        self.table.scalar(Self::MESH_ID, 0)
    }

    pub fn child_ids(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::CHILD_IDS, 4)
    }

    pub fn material_ids(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::MATERIAL_IDS, 4)
    }
}

table_view!(MeshView);

impl MeshView {
    pub const VERTICES: u16 = 0;
    pub const SUBMESHES: u16 = 1;
    pub const SUBSETS: u16 = 2;
    pub const INDICES: u16 = 3;
    pub const INDEX_TYPE: u16 = 4;

    /// Packed vertex data, format given per submesh.
    pub fn vertices(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::VERTICES, 1)
    }

    pub fn submeshes(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::SUBMESHES, SUBMESH_SIZE)
    }

    pub fn submesh(&self, index: usize) -> ReadResult<Submesh> {
        let view = struct_at(&self.table, Self::SUBMESHES, SUBMESH_SIZE, index)?;
        Submesh::from_view(&view)
    }

    pub fn subsets(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::SUBSETS, SUBSET_SIZE)
    }

    pub fn subset(&self, index: usize) -> ReadResult<Subset> {
        let view = struct_at(&self.table, Self::SUBSETS, SUBSET_SIZE, index)?;
        Subset::from_view(&view)
    }

    /// Raw index data; element width given by `index_type`.
    pub fn indices(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::INDICES, 1)
    }

    pub fn index_type(&self) -> u8 {
        self.table.scalar(Self::INDEX_TYPE, 0)
    }
}

table_view!(MaterialView);

impl MaterialView {
    pub const ID: u16 = 0;
    pub const NAME_ID: u16 = 1;
    pub const PROPS: u16 = 2;

    pub fn id(&self) -> u32 {
        self.table.scalar(Self::ID, 0)
    }

    pub fn name_id(&self) -> u64 {
        self.table.scalar(Self::NAME_ID, 0)
    }

    pub fn props(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::PROPS, MATERIAL_PROP_SIZE)
    }

    pub fn prop(&self, index: usize) -> ReadResult<MaterialProp> {
        let view = struct_at(&self.table, Self::PROPS, MATERIAL_PROP_SIZE, index)?;
        MaterialProp::from_view(&view)
    }
}

table_view!(AnimCurveView);

impl AnimCurveView {
    pub const ID: u16 = 0;
    pub const NAME_ID: u16 = 1;

    pub fn id(&self) -> u32 {
        self.table.scalar(Self::ID, 0)
    }

    pub fn name_id(&self) -> u64 {
        self.table.scalar(Self::NAME_ID, 0)
    }
}

table_view!(SkinView);

impl SkinView {
    pub const NAME_ID: u16 = 0;
    pub const LINKS_IDS: u16 = 1;

    pub fn name_id(&self) -> u64 {
        self.table.scalar(Self::NAME_ID, 0)
    }

    pub fn links_ids(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::LINKS_IDS, 4)
    }
}

table_view!(
    /// An embedded file (textures and the like).
    FileView
);

impl FileView {
    pub const ID: u16 = 0;
    pub const NAME: u16 = 1;
    pub const BUFFER: u16 = 2;

    pub fn id(&self) -> u32 {
        self.table.scalar(Self::ID, 0)
    }

    pub fn name(&self) -> ReadResult<Field<StringView>> {
        self.table.string_field(Self::NAME)
    }

    pub fn buffer(&self) -> ReadResult<Field<Vector>> {
        self.table.vector_field(Self::BUFFER, 1)
    }
}

table_view!(
    /// Name hash (`h`) and the text it was computed from (`v`).
    NameView
);

impl NameView {
    pub const H: u16 = 0;
    pub const V: u16 = 1;

    pub fn h(&self) -> u64 {
        self.table.scalar(Self::H, 0)
    }

    pub fn v(&self) -> ReadResult<Field<StringView>> {
        self.table.string_field(Self::V)
    }
}

// =============================================================================
// Inline structs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Submesh {
    pub bbox_min: [f32; 3],
    pub bbox_max: [f32; 3],
    pub base_vertex: u32,
    pub vertex_count: u32,
    pub base_index: u32,
    pub index_count: u32,
    pub base_subset: u16,
    pub subset_count: u16,
    pub vertex_format: u8,
    pub compression_type: u8,
}

fn vec3(view: &StructView, offset: usize) -> ReadResult<[f32; 3]> {
    Ok([
        view.scalar(offset)?,
        view.scalar(offset + 4)?,
        view.scalar(offset + 8)?,
    ])
}

impl Submesh {
    pub fn from_view(view: &StructView) -> ReadResult<Self> {
        Ok(Self {
            bbox_min: vec3(view, 0)?,
            bbox_max: vec3(view, 12)?,
            base_vertex: view.scalar(24)?,
            vertex_count: view.scalar(28)?,
            base_index: view.scalar(32)?,
            index_count: view.scalar(36)?,
            base_subset: view.scalar(40)?,
            subset_count: view.scalar(42)?,
            vertex_format: view.scalar(44)?,
            compression_type: view.scalar(45)?,
        })
    }
}

/// Index range drawn with one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subset {
    pub material_id: u32,
    pub base_index: u32,
    pub index_count: u32,
}

impl Subset {
    pub fn from_view(view: &StructView) -> ReadResult<Self> {
        Ok(Self {
            material_id: view.scalar(0)?,
            base_index: view.scalar(4)?,
            index_count: view.scalar(8)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialProp {
    pub name_id: u32,
    /// Packed value id, see [`SceneView::property`].
    pub value_id: u32,
}

impl MaterialProp {
    pub fn from_view(view: &StructView) -> ReadResult<Self> {
        Ok(Self {
            name_id: view.scalar(0)?,
            value_id: view.scalar(4)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimStack {
    pub id: u32,
    pub name_id: u32,
}

impl AnimStack {
    pub fn from_view(view: &StructView) -> ReadResult<Self> {
        Ok(Self {
            id: view.scalar(0)?,
            name_id: view.scalar(4)?,
        })
    }
}
