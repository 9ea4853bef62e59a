//! Parameter schemas: synthesis from catalog records, the compiled
//! validator model, and cached resolution.

pub mod compiled;
pub mod registry;
pub mod shape;
pub mod synth;

pub use compiled::{
    AcceptedCapability, CompiledSchema, NodeConfig, ShapeFactory, SubnodeSchema, SubnodeSlot,
    TypeSchema, VariantSchema,
};
pub use registry::{Resolution, SchemaRegistry, SchemaSource};
pub use shape::{Check, FieldRule, ObjectShape, SchemaError, SchemaErrorCode};
pub use synth::compile_type;
