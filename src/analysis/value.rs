//! The flat constant lattice.

use crate::ir::{Handle, JvmType, LdcConst};

/// Identity of a tracked array allocation within one analyzed method.
pub type ArrayId = usize;

/// A concrete constant the tracker can prove.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Null,
    /// Class constant (internal name or array descriptor).
    Class(String),
    MethodType(String),
    Handle(Handle),
    /// Reference to an array allocation tracked by the analyzer's side
    /// table. Only meaningful while the producing analysis is running.
    Array(ArrayId),
}

impl Constant {
    /// Widens the constant for `int`-typed stack arithmetic.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Constant::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Constant::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view used by the bitwise folder: `int` constants widen to
    /// `long`, everything else is rejected.
    #[must_use]
    pub fn as_integral(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(i64::from(*v)),
            Constant::Long(v) => Some(*v),
            _ => None,
        }
    }
}

/// Abstract value of one stack or local slot: `Unknown`, or a proven
/// [`Constant`].
///
/// The lattice is flat: joining two distinct known values yields `Unknown`.
/// Equality deliberately ignores the slot-size component so that widening
/// (an `int` flowing where a `long` half is compared) never makes two
/// otherwise equal values differ.
#[derive(Debug, Clone)]
pub struct ConstantValue {
    size: u8,
    value: Option<Constant>,
}

impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl ConstantValue {
    /// An unknown value occupying `size` stack slots (1 or 2).
    #[must_use]
    pub fn unknown(size: u8) -> Self {
        debug_assert!(size == 1 || size == 2);
        ConstantValue { size, value: None }
    }

    /// An unknown value sized after `ty`.
    #[must_use]
    pub fn unknown_of(ty: &JvmType) -> Self {
        ConstantValue::unknown(ty.slot_size().max(1))
    }

    /// A known constant; the size is derived from the constant's kind.
    #[must_use]
    pub fn known(value: Constant) -> Self {
        let size = match value {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        };
        ConstantValue {
            size,
            value: Some(value),
        }
    }

    #[must_use]
    pub fn size(&self) -> u8 {
        self.size
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        self.value.is_some()
    }

    #[must_use]
    pub fn value(&self) -> Option<&Constant> {
        self.value.as_ref()
    }

    /// Consumes the abstract value, returning the constant if known.
    #[must_use]
    pub fn into_value(self) -> Option<Constant> {
        self.value
    }

    /// The flat-lattice join: identical knowns stay, anything else
    /// degrades to `Unknown` of this slot's size.
    #[must_use]
    pub fn join(&self, other: &ConstantValue) -> ConstantValue {
        if self.value.is_some() && self.value == other.value {
            self.clone()
        } else {
            ConstantValue::unknown(self.size)
        }
    }
}

/// Maps an `LDC` constant into the analysis domain.
#[must_use]
pub fn constant_of_ldc(constant: &LdcConst) -> Constant {
    match constant {
        LdcConst::Int(v) => Constant::Int(*v),
        LdcConst::Long(v) => Constant::Long(*v),
        LdcConst::Float(v) => Constant::Float(*v),
        LdcConst::Double(v) => Constant::Double(*v),
        LdcConst::Str(v) => Constant::Str(v.clone()),
        LdcConst::Class(v) => Constant::Class(v.clone()),
        LdcConst::MethodType(v) => Constant::MethodType(v.clone()),
        LdcConst::Handle(h) => Constant::Handle(h.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_size() {
        let a = ConstantValue::known(Constant::Int(3));
        let mut b = ConstantValue::known(Constant::Int(3));
        b.size = 2;
        assert_eq!(a, b);
        assert_ne!(a, ConstantValue::known(Constant::Int(4)));
        assert_ne!(a, ConstantValue::unknown(1));
        assert_eq!(ConstantValue::unknown(1), ConstantValue::unknown(2));
    }

    #[test]
    fn join_is_flat() {
        let three = ConstantValue::known(Constant::Int(3));
        let four = ConstantValue::known(Constant::Int(4));
        assert_eq!(three.join(&three.clone()), three);
        assert!(!three.join(&four).is_known());
        assert!(!three.join(&ConstantValue::unknown(1)).is_known());
        assert!(!ConstantValue::unknown(1).join(&three).is_known());
    }

    #[test]
    fn known_sizes() {
        assert_eq!(ConstantValue::known(Constant::Int(1)).size(), 1);
        assert_eq!(ConstantValue::known(Constant::Long(1)).size(), 2);
        assert_eq!(ConstantValue::known(Constant::Double(0.5)).size(), 2);
        assert_eq!(ConstantValue::known(Constant::Str("x".into())).size(), 1);
    }
}
