//! Interned handles for strings, types, fields and methods.
//!
//! The source representation of a dex file is a pointer graph full of cycles
//! (instruction → type → owning class → methods → instructions). Here every
//! cross-reference is an index into a process-wide, read-only [`DexPool`]
//! instead: rewrites manipulate plain `Copy` handles and never touch
//! lifetimes. The pool is fully populated during single-threaded startup and
//! shared immutably across all methods afterwards, so it is safe to read from
//! many transform threads in parallel.

use std::{collections::HashMap, fmt};

/// Interned string handle (index into the pool's string table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(pub u32);

impl StringId {
    /// Creates a handle from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index into the string table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "string@{}", self.0)
    }
}

/// Interned type handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Creates a handle from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index into the type table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type@{}", self.0)
    }
}

/// Interned field handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldRef(pub u32);

impl FieldRef {
    /// Creates a handle from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index into the field table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field@{}", self.0)
    }
}

/// Interned method handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodRef(pub u32);

impl MethodRef {
    /// Creates a handle from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the index into the method table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "method@{}", self.0)
    }
}

/// Return type of a method prototype.
///
/// Only the distinction between void, primitives (narrow/wide) and object
/// references matters for the transform: the return-type hazard check needs
/// to know whether a returned value can carry a type across a store boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetType {
    /// `void`
    Void,
    /// A 32-bit primitive value.
    Primitive,
    /// A 64-bit primitive value (long/double).
    Wide,
    /// An object reference of the given type.
    Object(TypeId),
}

/// A type table entry.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// JVM-style type descriptor, e.g. `Ljava/lang/String;`.
    pub descriptor: String,
    /// Whether the type is defined outside the program being optimized
    /// (framework or unavailable code).
    pub external: bool,
}

/// A field table entry.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Declaring class.
    pub class: TypeId,
    /// Field name.
    pub name: String,
    /// Whether the field holds a 64-bit value.
    pub wide: bool,
}

/// A method table entry.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Declaring class.
    pub class: TypeId,
    /// Method name.
    pub name: String,
    /// Prototype return type.
    pub ret: RetType,
}

/// The read-only reference tables shared by every method.
///
/// Populated once during startup, then borrowed immutably by analyses and
/// transforms. Strings and type descriptors are deduplicated on insert.
#[derive(Debug, Default)]
pub struct DexPool {
    strings: Vec<String>,
    types: Vec<TypeDef>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    string_ids: HashMap<String, StringId>,
    type_ids: HashMap<String, TypeId>,
}

impl DexPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning the existing handle if already present.
    pub fn intern_string(&mut self, value: &str) -> StringId {
        if let Some(&id) = self.string_ids.get(value) {
            return id;
        }
        let id = StringId::new(u32::try_from(self.strings.len()).expect("string table overflow"));
        self.strings.push(value.to_string());
        self.string_ids.insert(value.to_string(), id);
        id
    }

    /// Interns a type by descriptor, returning the existing handle if present.
    ///
    /// If the type was previously interned as external and is now declared
    /// internal, the entry is upgraded.
    pub fn intern_type(&mut self, descriptor: &str, external: bool) -> TypeId {
        if let Some(&id) = self.type_ids.get(descriptor) {
            if !external {
                self.types[id.index()].external = false;
            }
            return id;
        }
        let id = TypeId::new(u32::try_from(self.types.len()).expect("type table overflow"));
        self.types.push(TypeDef {
            descriptor: descriptor.to_string(),
            external,
        });
        self.type_ids.insert(descriptor.to_string(), id);
        id
    }

    /// Adds a field definition.
    pub fn add_field(&mut self, class: TypeId, name: &str, wide: bool) -> FieldRef {
        let id = FieldRef::new(u32::try_from(self.fields.len()).expect("field table overflow"));
        self.fields.push(FieldDef {
            class,
            name: name.to_string(),
            wide,
        });
        id
    }

    /// Adds a method definition.
    pub fn add_method(&mut self, class: TypeId, name: &str, ret: RetType) -> MethodRef {
        let id = MethodRef::new(u32::try_from(self.methods.len()).expect("method table overflow"));
        self.methods.push(MethodDef {
            class,
            name: name.to_string(),
            ret,
        });
        id
    }

    /// Returns the string behind a handle.
    ///
    /// # Panics
    ///
    /// Panics on a dangling handle; handles are only ever produced by this
    /// pool, so a miss is a bug.
    #[must_use]
    pub fn string(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Returns the type entry behind a handle.
    #[must_use]
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    /// Returns the field entry behind a handle.
    #[must_use]
    pub fn field(&self, id: FieldRef) -> &FieldDef {
        &self.fields[id.index()]
    }

    /// Returns the method entry behind a handle.
    #[must_use]
    pub fn method(&self, id: MethodRef) -> &MethodDef {
        &self.methods[id.index()]
    }

    /// Looks up a previously interned type by descriptor.
    #[must_use]
    pub fn find_type(&self, descriptor: &str) -> Option<TypeId> {
        self.type_ids.get(descriptor).copied()
    }

    /// Iterates over all method handles with their definitions.
    pub fn methods(&self) -> impl Iterator<Item = (MethodRef, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodRef::new(i as u32), m))
    }
}
