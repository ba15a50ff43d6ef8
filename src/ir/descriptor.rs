//! Field and method descriptor parsing.
//!
//! Descriptors are the compact textual type encoding of the class file
//! format (`I`, `[B`, `Ljava/lang/String;`, `(IJ)Ljava/lang/String;`).
//! Passes use these helpers to compute stack slot sizes, pick load/store
//! opcodes for argument spilling, and match the descriptor shapes the
//! obfuscator-specific recognizers look for.

use crate::{error::malformed_error, Result};

/// A parsed JVM type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JvmType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
    /// Class or interface type; carries the internal (slash-separated) name.
    Object(String),
    /// Array type with its element type.
    Array(Box<JvmType>),
}

impl JvmType {
    /// Parses a single field descriptor.
    pub fn parse(desc: &str) -> Result<JvmType> {
        let mut chars = desc.chars();
        let ty = Self::parse_from(&mut chars, desc)?;
        if chars.next().is_some() {
            return Err(malformed_error!("trailing characters in descriptor {}", desc));
        }
        Ok(ty)
    }

    fn parse_from(chars: &mut std::str::Chars<'_>, whole: &str) -> Result<JvmType> {
        match chars.next() {
            Some('Z') => Ok(JvmType::Boolean),
            Some('B') => Ok(JvmType::Byte),
            Some('C') => Ok(JvmType::Char),
            Some('S') => Ok(JvmType::Short),
            Some('I') => Ok(JvmType::Int),
            Some('J') => Ok(JvmType::Long),
            Some('F') => Ok(JvmType::Float),
            Some('D') => Ok(JvmType::Double),
            Some('V') => Ok(JvmType::Void),
            Some('[') => Ok(JvmType::Array(Box::new(Self::parse_from(chars, whole)?))),
            Some('L') => {
                let name: String = chars.take_while(|&c| c != ';').collect();
                if name.is_empty() {
                    return Err(malformed_error!("empty object type in {}", whole));
                }
                Ok(JvmType::Object(name))
            }
            _ => Err(malformed_error!("invalid descriptor {}", whole)),
        }
    }

    /// Number of stack slots this type occupies (2 for `long`/`double`,
    /// 0 for `void`, 1 otherwise).
    #[must_use]
    pub fn slot_size(&self) -> u8 {
        match self {
            JvmType::Long | JvmType::Double => 2,
            JvmType::Void => 0,
            _ => 1,
        }
    }

    /// Returns `true` for class, interface and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Object(_) | JvmType::Array(_))
    }

    /// Renders the type back into descriptor form.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            JvmType::Boolean => "Z".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Void => "V".into(),
            JvmType::Object(name) => format!("L{name};"),
            JvmType::Array(elem) => format!("[{}", elem.descriptor()),
        }
    }
}

/// A parsed method descriptor: parameter types plus return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(IJ)Ljava/lang/String;`.
    pub fn parse(desc: &str) -> Result<MethodDescriptor> {
        let inner = desc
            .strip_prefix('(')
            .ok_or_else(|| malformed_error!("method descriptor {} missing '('", desc))?;
        let close = inner
            .find(')')
            .ok_or_else(|| malformed_error!("method descriptor {} missing ')'", desc))?;
        let (args, ret) = inner.split_at(close);

        let mut params = Vec::new();
        let mut chars = args.chars();
        loop {
            let rest = chars.as_str();
            if rest.is_empty() {
                break;
            }
            params.push(JvmType::parse_from(&mut chars, desc)?);
        }
        let mut ret_chars = ret[1..].chars();
        let ret = JvmType::parse_from(&mut ret_chars, desc)?;
        if ret_chars.next().is_some() {
            return Err(malformed_error!("trailing characters in descriptor {}", desc));
        }
        Ok(MethodDescriptor { params, ret })
    }

    /// Total slot count of the parameters (receiver not included).
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(|p| u16::from(p.slot_size())).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_descriptors() {
        assert_eq!(JvmType::parse("I").unwrap(), JvmType::Int);
        assert_eq!(
            JvmType::parse("Ljava/lang/String;").unwrap(),
            JvmType::Object("java/lang/String".into())
        );
        assert_eq!(
            JvmType::parse("[[J").unwrap(),
            JvmType::Array(Box::new(JvmType::Array(Box::new(JvmType::Long))))
        );
        assert!(JvmType::parse("Q").is_err());
        assert!(JvmType::parse("II").is_err());
    }

    #[test]
    fn parse_method_descriptors() {
        let md = MethodDescriptor::parse("(IJLjava/lang/String;)V").unwrap();
        assert_eq!(md.params.len(), 3);
        assert_eq!(md.ret, JvmType::Void);
        assert_eq!(md.param_slots(), 4);

        let md = MethodDescriptor::parse("()J").unwrap();
        assert!(md.params.is_empty());
        assert_eq!(md.ret.slot_size(), 2);
    }

    #[test]
    fn descriptor_round_trip() {
        for d in ["I", "[B", "Ljava/lang/Object;", "[[Ljava/lang/String;"] {
            assert_eq!(JvmType::parse(d).unwrap().descriptor(), d);
        }
    }
}
