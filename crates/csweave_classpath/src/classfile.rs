use crate::descriptor::{
    parse_field_descriptor, parse_method_descriptor, DescriptorError, MethodDescriptor, TypeName,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JVM name of instance constructors.
pub const CONSTRUCTOR: &str = "<init>";
pub const STATIC_INITIALIZER: &str = "<clinit>";

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid UTF-8 string in constant pool: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error("unknown annotation element tag '{tag}'")]
    UnknownElementTag { tag: char },
}

/// Access flags of a class or a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const ANNOTATION: u16 = 0x2000;

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub const fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    pub const fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }
}

/// Runtime (visible or invisible) annotation attached to a class, method or parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Binary name of the annotation type, e.g. `com.acme.CallSite$Before`.
    pub type_name: String,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: ElementValue) -> Self {
        self.elements.push((name.into(), value));
        self
    }

    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementValue {
    /// `byte`, `char`, `short`, `int` and `boolean` constants.
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum { type_name: String, constant: String },
    Class(TypeName),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ElementValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ElementValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_int().map(|value| value != 0)
    }

    /// Single values are treated as one-element arrays, mirroring Java's
    /// shorthand for array-valued annotation elements.
    pub fn as_slice(&self) -> &[ElementValue] {
        match self {
            ElementValue::Array(values) => values,
            other => std::slice::from_ref(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMethod {
    pub name: String,
    pub descriptor: String,
    pub signature: MethodDescriptor,
    pub access: AccessFlags,
    pub annotations: Vec<Annotation>,
    /// One annotation list per declared parameter.
    pub parameter_annotations: Vec<Vec<Annotation>>,
}

impl ParsedMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    pub fn is_initializer(&self) -> bool {
        self.name == CONSTRUCTOR || self.name == STATIC_INITIALIZER
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClass {
    pub fqcn: String,
    pub package: String,
    pub access: AccessFlags,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<ParsedMethod>,
    pub annotations: Vec<Annotation>,
}

impl ParsedClass {
    pub fn annotation(&self, type_name: &str) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|annotation| annotation.type_name == type_name)
    }
}

pub fn parse_class(bytes: &[u8]) -> Result<ParsedClass, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let constant_pool = ConstantPool::parse(&mut reader)?;

    let access = AccessFlags(reader.read_u2()?);
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(binary_to_fqcn(&constant_pool.class_name(index)?));
    }

    let fields_count = reader.read_u2()?;
    for _ in 0..fields_count {
        skip_member(&mut reader)?;
    }

    let methods_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        methods.push(parse_method(&mut reader, &constant_pool)?);
    }

    let attributes_count = reader.read_u2()?;
    let mut annotations = Vec::new();
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let slice = reader.read_slice(length)?;
        match constant_pool.utf8(name_index)? {
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let mut sub_reader = ClassReader::new(slice);
                annotations.extend(read_annotations(&mut sub_reader, &constant_pool)?);
            }
            _ => {}
        }
    }

    let fqcn = binary_to_fqcn(&constant_pool.class_name(this_class)?);
    let package = fqcn
        .rsplit_once('.')
        .map(|(pkg, _)| pkg.to_string())
        .unwrap_or_default();
    let super_class = if super_class == 0 {
        None
    } else {
        Some(binary_to_fqcn(&constant_pool.class_name(super_class)?))
    };

    Ok(ParsedClass {
        fqcn,
        package,
        access,
        super_class,
        interfaces,
        methods,
        annotations,
    })
}

fn parse_method(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<ParsedMethod, ClassParseError> {
    let access = AccessFlags(reader.read_u2()?);
    let name = constant_pool.utf8(reader.read_u2()?)?.to_string();
    let descriptor = constant_pool.utf8(reader.read_u2()?)?.to_string();
    let signature = parse_method_descriptor(&descriptor)?;

    let mut annotations = Vec::new();
    let mut parameter_annotations = vec![Vec::new(); signature.parameters.len()];

    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let slice = reader.read_slice(length)?;
        let mut sub_reader = ClassReader::new(slice);
        match constant_pool.utf8(name_index)? {
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                annotations.extend(read_annotations(&mut sub_reader, constant_pool)?);
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let declared = sub_reader.read_u1()? as usize;
                // javac may omit synthetic leading parameters; align to the tail.
                let offset = parameter_annotations.len().saturating_sub(declared);
                for position in 0..declared {
                    let annotations = read_annotations(&mut sub_reader, constant_pool)?;
                    if let Some(slot) = parameter_annotations.get_mut(offset + position) {
                        slot.extend(annotations);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(ParsedMethod {
        name,
        descriptor,
        signature,
        access,
        annotations,
        parameter_annotations,
    })
}

fn read_annotations(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<Vec<Annotation>, ClassParseError> {
    let count = reader.read_u2()?;
    let mut annotations = Vec::with_capacity(count as usize);
    for _ in 0..count {
        annotations.push(read_annotation(reader, constant_pool)?);
    }
    Ok(annotations)
}

fn read_annotation(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<Annotation, ClassParseError> {
    let type_descriptor = constant_pool.utf8(reader.read_u2()?)?;
    let type_name = match parse_field_descriptor(type_descriptor)? {
        TypeName::Reference(name) => name,
        other => other.to_string(),
    };
    let pairs = reader.read_u2()?;
    let mut elements = Vec::with_capacity(pairs as usize);
    for _ in 0..pairs {
        let name = constant_pool.utf8(reader.read_u2()?)?.to_string();
        let value = read_element_value(reader, constant_pool)?;
        elements.push((name, value));
    }
    Ok(Annotation {
        type_name,
        elements,
    })
}

fn read_element_value(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<ElementValue, ClassParseError> {
    let tag = reader.read_u1()?;
    let value = match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' => ElementValue::Int(constant_pool.int(reader.read_u2()?)?),
        b'J' => ElementValue::Long(constant_pool.long(reader.read_u2()?)?),
        b'F' => ElementValue::Float(constant_pool.float(reader.read_u2()?)?),
        b'D' => ElementValue::Double(constant_pool.double(reader.read_u2()?)?),
        b's' => ElementValue::String(constant_pool.utf8(reader.read_u2()?)?.to_string()),
        b'e' => {
            let type_descriptor = constant_pool.utf8(reader.read_u2()?)?;
            let constant = constant_pool.utf8(reader.read_u2()?)?.to_string();
            ElementValue::Enum {
                type_name: parse_field_descriptor(type_descriptor)?.to_string(),
                constant,
            }
        }
        b'c' => {
            let descriptor = constant_pool.utf8(reader.read_u2()?)?;
            if descriptor == "V" {
                ElementValue::Class(TypeName::Void)
            } else {
                ElementValue::Class(parse_field_descriptor(descriptor)?)
            }
        }
        b'@' => ElementValue::Annotation(read_annotation(reader, constant_pool)?),
        b'[' => {
            let count = reader.read_u2()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(reader, constant_pool)?);
            }
            ElementValue::Array(values)
        }
        other => return Err(ClassParseError::UnknownElementTag { tag: other as char }),
    };
    Ok(value)
}

fn binary_to_fqcn(binary_name: &str) -> String {
    binary_name.replace('/', ".")
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    Constant::Utf8(String::from_utf8(bytes.to_vec())?)
                }
                3 => Constant::Integer(reader.read_u4()? as i32),
                4 => Constant::Float(f32::from_bits(reader.read_u4()?)),
                5 | 6 => {
                    let high = reader.read_u4()? as u64;
                    let low = reader.read_u4()? as u64;
                    let bits = (high << 32) | low;
                    let value = if tag == 5 {
                        Constant::Long(bits as i64)
                    } else {
                        Constant::Double(f64::from_bits(bits))
                    };
                    // Eight-byte constants take two pool slots.
                    entries.push(value);
                    index += 1;
                    Constant::Unusable
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn int(&self, index: u16) -> Result<i32, ClassParseError> {
        match self.get(index)? {
            Constant::Integer(value) => Ok(*value),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn long(&self, index: u16) -> Result<i64, ClassParseError> {
        match self.get(index)? {
            Constant::Long(value) => Ok(*value),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn float(&self, index: u16) -> Result<f32, ClassParseError> {
        match self.get(index)? {
            Constant::Float(value) => Ok(*value),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn double(&self, index: u16) -> Result<f64, ClassParseError> {
        match self.get(index)? {
            Constant::Double(value) => Ok(*value),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassParseError> {
        const MAGIC: u32 = 0xCAFEBABE;
        if self.read_u4()? != MAGIC {
            return Err(ClassParseError::InvalidMagic);
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        Ok(self.read_slice(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        if self.pos + len > self.data.len() {
            return Err(ClassParseError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }
}

fn skip_member(reader: &mut ClassReader<'_>) -> Result<(), ClassParseError> {
    reader.read_u2()?; // access_flags
    reader.read_u2()?; // name_index
    reader.read_u2()?; // descriptor_index
    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}
