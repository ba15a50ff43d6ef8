//! JVM access and property flags.

use bitflags::bitflags;

bitflags! {
    /// Access and property flags of classes, fields and methods.
    ///
    /// The bit values follow the class file format; flags that only apply
    /// to one kind of member (e.g. [`Access::BRIDGE`]) simply never appear
    /// on the others.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Access: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const BRIDGE = 0x0040;
        const TRANSIENT = 0x0080;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

impl Access {
    #[must_use]
    pub fn is_static(self) -> bool {
        self.contains(Access::STATIC)
    }

    #[must_use]
    pub fn is_public(self) -> bool {
        self.contains(Access::PUBLIC)
    }

    #[must_use]
    pub fn is_abstract(self) -> bool {
        self.contains(Access::ABSTRACT)
    }

    #[must_use]
    pub fn is_native(self) -> bool {
        self.contains(Access::NATIVE)
    }

    #[must_use]
    pub fn is_interface(self) -> bool {
        self.contains(Access::INTERFACE)
    }

    #[must_use]
    pub fn is_enum(self) -> bool {
        self.contains(Access::ENUM)
    }
}
