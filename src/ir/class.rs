//! Class-level representation.

use crate::ir::{method::MethodNode, Access};

/// A field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub access: Access,
    pub name: String,
    pub desc: String,
    pub signature: Option<String>,
}

impl FieldNode {
    #[must_use]
    pub fn new(access: Access, name: impl Into<String>, desc: impl Into<String>) -> Self {
        FieldNode {
            access,
            name: name.into(),
            desc: desc.into(),
            signature: None,
        }
    }
}

/// Mutable parsed bytecode of a single class.
///
/// `version` packs the class file version as `minor << 16 | major`, the way
/// the format stores it. After the pre-pass merge step the `methods`
/// sequence contains at most one static initializer.
#[derive(Debug, Clone, Default)]
pub struct ClassNode {
    pub version: u32,
    pub access: Access,
    /// Internal (slash-separated) name.
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    /// Creates an empty public class extending `java/lang/Object` with the
    /// given major version.
    #[must_use]
    pub fn new(name: impl Into<String>, major_version: u16) -> Self {
        ClassNode {
            version: u32::from(major_version),
            access: Access::PUBLIC | Access::SUPER,
            name: name.into(),
            super_name: Some("java/lang/Object".into()),
            ..ClassNode::default()
        }
    }

    /// The major component of the class file version.
    #[must_use]
    pub fn major_version(&self) -> u16 {
        (self.version & 0xffff) as u16
    }

    /// Looks up a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, desc: &str) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.name == name && m.desc == desc)
    }

    /// Looks up a method by name and descriptor, mutably.
    pub fn method_mut(&mut self, name: &str, desc: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.desc == desc)
    }

    /// The static initializer, if the class has one.
    #[must_use]
    pub fn static_initializer(&self) -> Option<&MethodNode> {
        self.methods.iter().find(|m| m.is_static_initializer())
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::method::{CLINIT_DESC, CLINIT_NAME};

    #[test]
    fn lookup_helpers() {
        let mut cn = ClassNode::new("a/B", 52);
        cn.methods
            .push(MethodNode::new(Access::STATIC, CLINIT_NAME, CLINIT_DESC));
        cn.methods
            .push(MethodNode::new(Access::PUBLIC, "run", "()V"));
        cn.fields
            .push(FieldNode::new(Access::STATIC, "K", "J"));

        assert_eq!(cn.major_version(), 52);
        assert!(cn.static_initializer().is_some());
        assert!(cn.method("run", "()V").is_some());
        assert!(cn.method("run", "(I)V").is_none());
        assert_eq!(cn.field("K").unwrap().desc, "J");
    }
}
