//! Minimal class-file writer for building advice and classpath fixtures in tests.
//!
//! Only the structures read by [`crate::parse_class`] are emitted: the
//! constant pool, access flags, the type hierarchy, methods (without code)
//! and runtime annotations.

use crate::classfile::{Annotation, ElementValue};
use crate::descriptor::{parse_method_descriptor, TypeName};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
pub struct MethodBuilder {
    name: String,
    descriptor: String,
    access: u16,
    annotations: Vec<Annotation>,
    parameter_annotations: BTreeMap<usize, Vec<Annotation>>,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access: 0x0001,
            annotations: Vec::new(),
            parameter_annotations: BTreeMap::new(),
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn parameter_annotation(mut self, position: usize, annotation: Annotation) -> Self {
        self.parameter_annotations
            .entry(position)
            .or_default()
            .push(annotation);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    name: String,
    access: u16,
    super_class: Option<String>,
    interfaces: Vec<String>,
    methods: Vec<MethodBuilder>,
    annotations: Vec<Annotation>,
    visible: bool,
}

impl ClassFileBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: 0x0001 | 0x0020,
            super_class: Some("java.lang.Object".to_string()),
            interfaces: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            visible: true,
        }
    }

    /// Builds an interface (`ACC_INTERFACE | ACC_ABSTRACT`).
    pub fn interface_type(name: impl Into<String>) -> Self {
        let mut builder = Self::new(name);
        builder.access = 0x0001 | 0x0200 | 0x0400;
        builder
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_class(mut self, name: impl Into<String>) -> Self {
        self.super_class = Some(name.into());
        self
    }

    pub fn no_super_class(mut self) -> Self {
        self.super_class = None;
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Emit annotations as `RuntimeInvisible*` attributes (class retention).
    pub fn invisible_annotations(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::default();
        let mut body = Vec::new();

        let this_class = pool.class(&self.name);
        let super_class = self
            .super_class
            .as_ref()
            .map(|name| pool.class(name))
            .unwrap_or(0);

        put_u2(&mut body, self.access);
        put_u2(&mut body, this_class);
        put_u2(&mut body, super_class);
        put_u2(&mut body, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            let index = pool.class(interface);
            put_u2(&mut body, index);
        }
        put_u2(&mut body, 0); // fields

        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            self.write_method(method, &mut pool, &mut body);
        }

        let mut attributes = Vec::new();
        if !self.annotations.is_empty() {
            attributes.push(self.annotations_attribute(&self.annotations, &mut pool));
        }
        write_attributes(&attributes, &mut body);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        put_u2(&mut out, 0); // minor
        put_u2(&mut out, 52); // major (Java 8)
        pool.write(&mut out);
        out.extend_from_slice(&body);
        out
    }

    fn write_method(&self, method: &MethodBuilder, pool: &mut PoolWriter, out: &mut Vec<u8>) {
        put_u2(out, method.access);
        let name = pool.utf8(&method.name);
        put_u2(out, name);
        let descriptor = pool.utf8(&method.descriptor);
        put_u2(out, descriptor);

        let mut attributes = Vec::new();
        if !method.annotations.is_empty() {
            attributes.push(self.annotations_attribute(&method.annotations, pool));
        }
        if !method.parameter_annotations.is_empty() {
            let count = parse_method_descriptor(&method.descriptor)
                .map(|signature| signature.parameters.len())
                .unwrap_or(0)
                .max(
                    method
                        .parameter_annotations
                        .keys()
                        .last()
                        .map(|last| last + 1)
                        .unwrap_or(0),
                );
            let name = if self.visible {
                "RuntimeVisibleParameterAnnotations"
            } else {
                "RuntimeInvisibleParameterAnnotations"
            };
            let name_index = pool.utf8(name);
            let mut data = vec![count as u8];
            for position in 0..count {
                let annotations = method
                    .parameter_annotations
                    .get(&position)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                write_annotations(annotations, pool, &mut data);
            }
            attributes.push((name_index, data));
        }
        write_attributes(&attributes, out);
    }

    fn annotations_attribute(
        &self,
        annotations: &[Annotation],
        pool: &mut PoolWriter,
    ) -> (u16, Vec<u8>) {
        let name = if self.visible {
            "RuntimeVisibleAnnotations"
        } else {
            "RuntimeInvisibleAnnotations"
        };
        let name_index = pool.utf8(name);
        let mut data = Vec::new();
        write_annotations(annotations, pool, &mut data);
        (name_index, data)
    }
}

fn write_attributes(attributes: &[(u16, Vec<u8>)], out: &mut Vec<u8>) {
    put_u2(out, attributes.len() as u16);
    for (name_index, data) in attributes {
        put_u2(out, *name_index);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }
}

fn write_annotations(annotations: &[Annotation], pool: &mut PoolWriter, out: &mut Vec<u8>) {
    put_u2(out, annotations.len() as u16);
    for annotation in annotations {
        write_annotation(annotation, pool, out);
    }
}

fn write_annotation(annotation: &Annotation, pool: &mut PoolWriter, out: &mut Vec<u8>) {
    let descriptor = TypeName::reference(annotation.type_name.as_str()).descriptor();
    let type_index = pool.utf8(&descriptor);
    put_u2(out, type_index);
    put_u2(out, annotation.elements.len() as u16);
    for (name, value) in &annotation.elements {
        let name_index = pool.utf8(name);
        put_u2(out, name_index);
        write_element_value(value, pool, out);
    }
}

fn write_element_value(value: &ElementValue, pool: &mut PoolWriter, out: &mut Vec<u8>) {
    match value {
        ElementValue::Int(value) => {
            out.push(b'I');
            let index = pool.constant(PoolKey::Integer(*value));
            put_u2(out, index);
        }
        ElementValue::Long(value) => {
            out.push(b'J');
            let index = pool.constant(PoolKey::Long(*value));
            put_u2(out, index);
        }
        ElementValue::Float(value) => {
            out.push(b'F');
            let index = pool.constant(PoolKey::Float(value.to_bits()));
            put_u2(out, index);
        }
        ElementValue::Double(value) => {
            out.push(b'D');
            let index = pool.constant(PoolKey::Double(value.to_bits()));
            put_u2(out, index);
        }
        ElementValue::String(value) => {
            out.push(b's');
            let index = pool.utf8(value);
            put_u2(out, index);
        }
        ElementValue::Enum {
            type_name,
            constant,
        } => {
            out.push(b'e');
            let type_index = pool.utf8(&TypeName::reference(type_name.as_str()).descriptor());
            put_u2(out, type_index);
            let constant_index = pool.utf8(constant);
            put_u2(out, constant_index);
        }
        ElementValue::Class(ty) => {
            out.push(b'c');
            let index = pool.utf8(&ty.descriptor());
            put_u2(out, index);
        }
        ElementValue::Annotation(annotation) => {
            out.push(b'@');
            write_annotation(annotation, pool, out);
        }
        ElementValue::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                write_element_value(value, pool, out);
            }
        }
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolKey {
    Utf8(String),
    Class(u16),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
}

#[derive(Debug, Default)]
struct PoolWriter {
    entries: Vec<PoolKey>,
    lookup: HashMap<PoolKey, u16>,
    next: u16,
}

impl PoolWriter {
    fn utf8(&mut self, value: &str) -> u16 {
        self.constant(PoolKey::Utf8(value.to_string()))
    }

    fn class(&mut self, fqcn: &str) -> u16 {
        let name = self.utf8(&fqcn.replace('.', "/"));
        self.constant(PoolKey::Class(name))
    }

    fn constant(&mut self, key: PoolKey) -> u16 {
        if let Some(index) = self.lookup.get(&key) {
            return *index;
        }
        if self.next == 0 {
            self.next = 1;
        }
        let index = self.next;
        self.next += match key {
            PoolKey::Long(_) | PoolKey::Double(_) => 2,
            _ => 1,
        };
        self.lookup.insert(key.clone(), index);
        self.entries.push(key);
        index
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u2(out, self.next.max(1));
        for entry in &self.entries {
            match entry {
                PoolKey::Utf8(value) => {
                    out.push(1);
                    put_u2(out, value.len() as u16);
                    out.extend_from_slice(value.as_bytes());
                }
                PoolKey::Integer(value) => {
                    out.push(3);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolKey::Float(bits) => {
                    out.push(4);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolKey::Long(value) => {
                    out.push(5);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                PoolKey::Double(bits) => {
                    out.push(6);
                    out.extend_from_slice(&bits.to_be_bytes());
                }
                PoolKey::Class(name_index) => {
                    out.push(7);
                    put_u2(out, *name_index);
                }
            }
        }
    }
}
