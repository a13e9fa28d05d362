//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// A value object has no identity: a normalized phone number or a rendered
/// template is defined entirely by its contents, so two instances with the same
/// contents are interchangeable. Value objects are constructed validated and
/// never mutated afterwards; to "change" one, build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct PhoneNumber(String);
///
/// impl ValueObject for PhoneNumber {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
