use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed descriptor `{descriptor}`: {reason}")]
pub struct DescriptorError {
    pub descriptor: String,
    pub reason: String,
}

/// JVM primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Char,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
        }
    }

    pub const fn descriptor(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    pub const fn boxed_fqcn(self) -> &'static str {
        match self {
            Primitive::Boolean => "java.lang.Boolean",
            Primitive::Byte => "java.lang.Byte",
            Primitive::Char => "java.lang.Character",
            Primitive::Short => "java.lang.Short",
            Primitive::Int => "java.lang.Integer",
            Primitive::Long => "java.lang.Long",
            Primitive::Float => "java.lang.Float",
            Primitive::Double => "java.lang.Double",
        }
    }

    /// Operand stack words occupied by a value of this type.
    pub const fn slot_width(self) -> u8 {
        match self {
            Primitive::Long | Primitive::Double => 2,
            _ => 1,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.keyword() == keyword)
    }

    pub fn from_descriptor(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.descriptor() as u8 == tag)
    }
}

/// Syntactic JVM type as written in a signature or a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypeName {
    Void,
    Primitive(Primitive),
    Reference(String),
    Array {
        element: Box<TypeName>,
        dimensions: usize,
    },
}

impl TypeName {
    pub fn reference(fqcn: impl Into<String>) -> Self {
        TypeName::Reference(fqcn.into())
    }

    pub fn array_of(element: TypeName, dimensions: usize) -> Self {
        match element {
            TypeName::Array {
                element,
                dimensions: inner,
            } => TypeName::Array {
                element,
                dimensions: inner + dimensions,
            },
            other => TypeName::Array {
                element: Box::new(other),
                dimensions,
            },
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeName::Void)
    }

    /// Array with one dimension removed; `None` for non-array types.
    pub fn component(&self) -> Option<TypeName> {
        match self {
            TypeName::Array {
                element,
                dimensions,
            } if *dimensions > 1 => Some(TypeName::Array {
                element: element.clone(),
                dimensions: dimensions - 1,
            }),
            TypeName::Array { element, .. } => Some((**element).clone()),
            _ => None,
        }
    }

    pub fn slot_width(&self) -> u8 {
        match self {
            TypeName::Void => 0,
            TypeName::Primitive(primitive) => primitive.slot_width(),
            TypeName::Reference(_) | TypeName::Array { .. } => 1,
        }
    }

    pub fn descriptor(&self) -> String {
        let mut out = String::new();
        self.write_descriptor(&mut out);
        out
    }

    fn write_descriptor(&self, out: &mut String) {
        match self {
            TypeName::Void => out.push('V'),
            TypeName::Primitive(primitive) => out.push(primitive.descriptor()),
            TypeName::Reference(name) => {
                out.push('L');
                out.push_str(&name.replace('.', "/"));
                out.push(';');
            }
            TypeName::Array {
                element,
                dimensions,
            } => {
                for _ in 0..*dimensions {
                    out.push('[');
                }
                element.write_descriptor(out);
            }
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Void => f.write_str("void"),
            TypeName::Primitive(primitive) => f.write_str(primitive.keyword()),
            TypeName::Reference(name) => f.write_str(name),
            TypeName::Array {
                element,
                dimensions,
            } => {
                write!(f, "{element}")?;
                for _ in 0..*dimensions {
                    f.write_str("[]")?;
                }
                Ok(())
            }
        }
    }
}

/// Parameter and return types of a method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub parameters: Vec<TypeName>,
    pub return_type: TypeName,
}

impl MethodDescriptor {
    pub fn new(parameters: Vec<TypeName>, return_type: TypeName) -> Self {
        Self {
            parameters,
            return_type,
        }
    }

    pub fn to_descriptor(&self) -> String {
        let mut out = String::from("(");
        for parameter in &self.parameters {
            parameter.write_descriptor(&mut out);
        }
        out.push(')');
        self.return_type.write_descriptor(&mut out);
        out
    }
}

pub fn parse_field_descriptor(descriptor: &str) -> Result<TypeName, DescriptorError> {
    let mut parser = DescriptorParser::new(descriptor);
    let ty = parser.parse_type()?;
    if parser.remaining() != 0 {
        return Err(parser.error("trailing characters"));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor, DescriptorError> {
    let mut parser = DescriptorParser::new(descriptor);
    parser.expect(b'(')?;
    let mut parameters = Vec::new();
    while !parser.peek(b')')? {
        parameters.push(parser.parse_type()?);
    }
    parser.expect(b')')?;
    let return_type = if parser.peek(b'V')? {
        parser.pos += 1;
        TypeName::Void
    } else {
        parser.parse_type()?
    };

    if parser.remaining() != 0 {
        return Err(parser.error("trailing characters"));
    }

    Ok(MethodDescriptor {
        parameters,
        return_type,
    })
}

struct DescriptorParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(descriptor: &'a str) -> Self {
        Self {
            source: descriptor,
            bytes: descriptor.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> DescriptorError {
        DescriptorError {
            descriptor: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn expect(&mut self, ch: u8) -> Result<(), DescriptorError> {
        if self.remaining() < 1 {
            return Err(self.error("unexpected end"));
        }
        if self.bytes[self.pos] != ch {
            return Err(self.error(format!("expected '{}'", ch as char)));
        }
        self.pos += 1;
        Ok(())
    }

    fn peek(&self, ch: u8) -> Result<bool, DescriptorError> {
        if self.remaining() < 1 {
            return Err(self.error("unexpected end"));
        }
        Ok(self.bytes[self.pos] == ch)
    }

    fn parse_type(&mut self) -> Result<TypeName, DescriptorError> {
        if self.remaining() == 0 {
            return Err(self.error("unexpected end"));
        }

        let tag = self.bytes[self.pos];
        if let Some(primitive) = Primitive::from_descriptor(tag) {
            self.pos += 1;
            return Ok(TypeName::Primitive(primitive));
        }
        match tag {
            b'L' => self.parse_reference_type(),
            b'[' => self.parse_array_type(),
            other => Err(self.error(format!("unexpected descriptor tag '{}'", other as char))),
        }
    }

    fn parse_reference_type(&mut self) -> Result<TypeName, DescriptorError> {
        self.expect(b'L')?;
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b';' {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() || self.pos == start {
            return Err(self.error("unterminated reference descriptor"));
        }
        let name = &self.source[start..self.pos];
        self.pos += 1; // ';'
        Ok(TypeName::Reference(name.replace('/', ".")))
    }

    fn parse_array_type(&mut self) -> Result<TypeName, DescriptorError> {
        let mut dimensions = 0;
        while self.remaining() > 0 && self.bytes[self.pos] == b'[' {
            dimensions += 1;
            self.pos += 1;
        }
        let element = self.parse_type()?;
        Ok(TypeName::array_of(element, dimensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn parses_method_descriptor_with_arrays_and_wide_types() {
        let parsed = parse_method_descriptor("(Ljava/lang/String;[[IJ)[Ljava/lang/Object;")
            .expect("valid descriptor");
        assert_eq!(
            parsed.parameters,
            vec![
                TypeName::reference("java.lang.String"),
                TypeName::array_of(TypeName::Primitive(Primitive::Int), 2),
                TypeName::Primitive(Primitive::Long),
            ]
        );
        assert_eq!(
            parsed.return_type.to_string(),
            "java.lang.Object[]".to_string()
        );
        assert_eq!(
            parsed.to_descriptor(),
            "(Ljava/lang/String;[[IJ)[Ljava/lang/Object;"
        );
    }

    #[test_case("(V)V" ; "void parameter")]
    #[test_case("(I" ; "unterminated parameter list")]
    #[test_case("()" ; "missing return type")]
    #[test_case("(L;)V" ; "empty reference name")]
    #[test_case("(Ljava/lang/String)V" ; "unterminated reference")]
    #[test_case("()VV" ; "trailing characters")]
    fn rejects_malformed_method_descriptors(descriptor: &str) {
        assert!(parse_method_descriptor(descriptor).is_err(), "{descriptor}");
    }

    #[test]
    fn component_of_multi_dimensional_array() {
        let ty = TypeName::array_of(TypeName::reference("a.B"), 2);
        assert_eq!(
            ty.component(),
            Some(TypeName::array_of(TypeName::reference("a.B"), 1))
        );
        assert_eq!(
            TypeName::array_of(TypeName::reference("a.B"), 1).component(),
            Some(TypeName::reference("a.B"))
        );
        assert_eq!(TypeName::Primitive(Primitive::Long).slot_width(), 2);
    }
}
